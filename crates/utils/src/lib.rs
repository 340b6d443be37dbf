//! Shared error taxonomy for the classcloak workspace.

pub mod errors;
