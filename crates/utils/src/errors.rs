use thiserror::Error;

/// Error type for type and method descriptor parsing.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The descriptor string was empty where a type was expected.
    #[error("empty descriptor")]
    Empty,
    /// An unexpected character was found while parsing.
    #[error("malformed descriptor `{desc}` at offset {offset}")]
    Malformed { desc: String, offset: usize },
    /// A method descriptor did not start with `(` or never closed its parameter list.
    #[error("not a method descriptor: `{0}`")]
    NotMethod(String),
    /// Characters remained after a complete type was parsed.
    #[error("trailing data in descriptor `{0}`")]
    Trailing(String),
}

/// Error type for label and jump-table validation of a method body.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A jump, switch entry or exception region references a label that is never placed.
    #[error("{method}: label L{label} is referenced but never placed")]
    DanglingLabel { method: String, label: u32 },
    /// A label marker appears more than once in the instruction list.
    #[error("{method}: label L{label} is placed more than once")]
    DuplicateLabel { method: String, label: u32 },
    /// A lookup switch carries the same key twice.
    #[error("{method}: duplicate switch key {key}")]
    DuplicateSwitchKey { method: String, key: i32 },
    /// A range switch has a target count that does not match its bounds.
    #[error("{method}: table switch {low}..={high} has {found} targets")]
    TableSwitchArity {
        method: String,
        low: i32,
        high: i32,
        found: usize,
    },
    /// An exception region ends before (or where) it starts.
    #[error("{method}: exception region L{start}..L{end} is empty or inverted")]
    InvertedRegion { method: String, start: u32, end: u32 },
    /// An exception region catches a type that is not a throwable.
    #[error("{method}: handler catch type `{catch_type}` is not a Throwable")]
    NonThrowableCatch { method: String, catch_type: String },
}

/// Errors raised while loading a container and decoding its compiled units.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The container could not be read as a zip archive.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The manifest was not valid text.
    #[error("manifest parse error: {0}")]
    Manifest(String),
    /// A compiled unit could not be decoded.
    #[error("could not decode `{entry}`: {reason}")]
    Codec { entry: String, reason: String },
    /// Two compiled units declared the same type name.
    #[error("duplicate type `{0}` in archive")]
    DuplicateType(String),
}

/// Errors raised while encoding types and writing the output container.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The zip writer failed.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A type could not be encoded.
    #[error("could not encode `{ty}`: {reason}")]
    Codec { ty: String, reason: String },
}

/// Error type for metrics computation.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("method `{0}` has no body")]
    EmptyBody(String),
}

/// Error type for transform operations.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("generated code failed validation: {0}")]
    Validation(#[from] ValidationError),
    #[error("metrics computation failed: {0}")]
    Metrics(#[from] MetricsError),
    #[error("{0}")]
    Generic(String),
}

/// Errors that can occur during obfuscation.
#[derive(Debug, Error)]
pub enum ObfuscateError {
    /// The input container could not be loaded.
    #[error("load error: {0}")]
    Load(#[from] LoadError),
    /// The output container could not be written.
    #[error("serialize error: {0}")]
    Serialize(#[from] SerializeError),
    /// Transform application failed.
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
    /// File read/write error.
    #[error("file error: {0}")]
    File(#[from] std::io::Error),
    /// JSON report serialization error.
    #[error("report error: {0}")]
    Report(#[from] serde_json::Error),
}

/// Errors raised by the reference interpreter. A thrown exception inside the
/// interpreted program is an outcome, not one of these.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// The entry type or method does not exist.
    #[error("no method {owner}.{name}{desc}")]
    NoSuchMethod {
        owner: String,
        name: String,
        desc: String,
    },
    /// The program used an operation the interpreter does not model.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The operand stack or locals did not hold what an instruction expects.
    #[error("malformed code in {method}: {reason}")]
    Malformed { method: String, reason: String },
    /// A jump or region referenced a label the interpreter could not place.
    #[error("{method}: label L{label} is not placed")]
    MissingLabel { method: String, label: u32 },
    /// Execution exceeded the configured step budget.
    #[error("step limit of {0} exceeded")]
    StepLimit(u64),
    /// Call nesting exceeded the configured depth.
    #[error("call depth limit of {0} exceeded")]
    DepthLimit(usize),
    /// A descriptor could not be parsed.
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
    /// The verification settings are unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
}
