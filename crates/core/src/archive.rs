//! Zip container handling: splits an archive into decoded types, the manifest,
//! and opaque resources, and writes them back.

use crate::codec::ClassCodec;
use crate::hierarchy::CommonAncestorResolver;
use crate::manifest::{MANIFEST_PATH, Manifest};
use crate::program::{Program, ProgramBundle};
use classcloak_utils::errors::{LoadError, SerializeError};
use indexmap::IndexMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use tracing::debug;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// Upper bound on the buffer reserved up front for one entry.
const MAX_PREALLOC: u64 = 1 << 20;

/// Options for writing the output container.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Text written ahead of the zip data.
    pub banner: Option<String>,
    /// Archive comment.
    pub comment: Option<String>,
}

/// A loaded container.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    pub bundle: ProgramBundle,
    /// Non-class entries, carried through verbatim.
    pub resources: IndexMap<String, Vec<u8>>,
}

impl Archive {
    /// Reads a zip container, decoding every entry that carries the codec's suffix.
    pub fn read(data: &[u8], codec: &dyn ClassCodec) -> Result<Self, LoadError> {
        let mut zip = zip::ZipArchive::new(Cursor::new(data))?;
        let mut program = Program::new();
        let mut manifest = Manifest::new();
        let mut resources = IndexMap::new();

        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            // header sizes are untrusted
            let mut bytes = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
            file.read_to_end(&mut bytes)?;

            if name.eq_ignore_ascii_case(MANIFEST_PATH) {
                manifest = Manifest::parse(&bytes)?;
            } else if name.ends_with(codec.suffix()) {
                let ty = codec.decode(&name, &bytes)?;
                debug!("decoded {} from {}", ty.name, name);
                if let Some(previous) = program.insert(ty) {
                    return Err(LoadError::DuplicateType(previous.name));
                }
            } else {
                resources.insert(name, bytes);
            }
        }

        Ok(Self {
            bundle: ProgramBundle::new(program, manifest),
            resources,
        })
    }

    /// Serializes the container: optional banner, then manifest, types and resources.
    pub fn write(
        &self,
        codec: &dyn ClassCodec,
        options: &WriteOptions,
    ) -> Result<Vec<u8>, SerializeError> {
        let mut out = Cursor::new(Vec::new());
        if let Some(banner) = &options.banner {
            out.write_all(banner.as_bytes())?;
        }
        out.seek(SeekFrom::End(0))?;

        let mut zip = zip::ZipWriter::new(out);
        let file_options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file(MANIFEST_PATH, file_options)?;
        zip.write_all(self.bundle.manifest.render().as_bytes())?;

        let program = &self.bundle.program;
        let resolver = CommonAncestorResolver::with_platform(program);
        for ty in program.types() {
            let bytes = codec.encode(ty, &resolver)?;
            zip.start_file(format!("{}{}", ty.name, codec.suffix()), file_options)?;
            zip.write_all(&bytes)?;
        }

        for (name, bytes) in self
            .resources
            .iter()
            .filter(|(n, _)| !n.eq_ignore_ascii_case(MANIFEST_PATH))
        {
            zip.start_file(name.as_str(), file_options)?;
            zip.write_all(bytes)?;
        }

        if let Some(comment) = &options.comment {
            zip.set_comment(comment.clone());
        }
        Ok(zip.finish()?.into_inner())
    }
}
