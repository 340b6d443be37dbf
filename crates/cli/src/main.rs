/// Entry point for the classcloak CLI, an obfuscator for archives of compiled
/// JVM-style classes.
///
/// Without a subcommand the binary obfuscates the archive named by `--input`.
/// Subcommands render a method's control-flow graph or check an obfuscated
/// archive against its original on the reference interpreter.
use classcloak_cli::commands::{Cmd, Command, obfuscate::ObfuscateArgs};
use clap::Parser;

/// Command-line interface for classcloak.
#[derive(Parser)]
#[command(name = "classcloak", version)]
#[command(about = "classcloak: renaming and control-flow obfuscation for class archives")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Cmd>,

    #[command(flatten)]
    obfuscate: ObfuscateArgs,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Runs the classcloak CLI with the provided arguments.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(command) => command.execute().await,
        None => cli.obfuscate.execute().await,
    }
}
