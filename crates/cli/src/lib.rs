//! Command-line front end for the classcloak archive obfuscator.

pub mod commands;
