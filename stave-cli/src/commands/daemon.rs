//! `stave daemon` — run or query the background workspace server.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::Value;

use stave_core::config;
use stave_daemon::paths::socket_path;
use stave_daemon::{
    request_classpath, request_status, request_stop, request_sync, request_units, start_blocking,
    DaemonError,
};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (watcher + socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
    /// Ask the daemon to run a synchronization pass now.
    Sync,
    /// List the units in the daemon's current program model.
    Units,
    /// Replace the daemon's classpath; the program model is rebuilt.
    Classpath {
        /// Jar files or `dir/*` globs. No entries clears the classpath.
        entries: Vec<String>,
    },
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        DaemonCommand::Start => {
            let config = config::load_or_default_at(&home).context("failed to load config")?;
            start_blocking(&home, config).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => print_json(&status)?,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                print_json(&serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }))?;
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Sync => {
            let summary = request_sync(&home).context("failed to request sync")?;
            print_json(&summary)?;
        }
        DaemonCommand::Units => {
            let units = request_units(&home).context("failed to list units")?;
            print_json(&units)?;
        }
        DaemonCommand::Classpath { entries } => {
            let summary =
                request_classpath(&home, entries).context("failed to update daemon classpath")?;
            print_json(&summary)?;
        }
    }

    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render daemon JSON")?
    );
    Ok(())
}
