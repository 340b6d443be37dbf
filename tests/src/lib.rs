//! Cross-crate tests: archives through the pipeline, checked on the reference
//! interpreter.

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod model;
#[cfg(test)]
mod transforms;
