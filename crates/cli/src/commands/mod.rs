use async_trait::async_trait;
use classcloak_core::archive::Archive;
use classcloak_core::codec::JsonCodec;
use clap::Subcommand;
use std::error::Error;
use std::path::Path;

pub mod cfg;
pub mod obfuscate;
pub mod verify;

#[derive(Subcommand)]
pub enum Cmd {
    /// Write one method's control-flow graph as Graphviz to stdout or a file
    Cfg(cfg::CfgArgs),

    /// Compare an obfuscated archive with its original by running both entry points
    Verify(verify::VerifyArgs),
}

#[async_trait]
pub trait Command {
    async fn execute(self) -> Result<(), Box<dyn Error>>;
}

#[async_trait]
impl Command for Cmd {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        match self {
            Cmd::Cfg(args) => args.execute().await,
            Cmd::Verify(args) => args.execute().await,
        }
    }
}

/// Reads and decodes an archive from disk. A leading banner line is tolerated.
pub(crate) async fn load_archive(path: &Path) -> Result<Archive, Box<dyn Error>> {
    let data = tokio::fs::read(path).await?;
    Ok(Archive::read(&data, &JsonCodec)?)
}
