//! stave — keep a workspace program model in step with disk and editor buffers.
//!
//! # Usage
//!
//! ```text
//! stave init <root> [--index-file NAME]... [--classpath ENTRY]... [--ext EXT]
//! stave index [<root>] [--index-file NAME]... [--json]
//! stave status [--json]
//! stave daemon start|stop|status|sync|units
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{daemon::DaemonCommand, index::IndexArgs, init::InitArgs, status::StatusArgs};

#[derive(Parser, Debug)]
#[command(
    name = "stave",
    version,
    about = "Index a source workspace into an incrementally maintained program model",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the workspace configuration to ~/.stave/config.yaml.
    Init(InitArgs),

    /// Run one synchronization pass in-process and print the result.
    Index(IndexArgs),

    /// Show the saved configuration and daemon state.
    Status(StatusArgs),

    /// Run or talk to the background workspace server.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Index(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
