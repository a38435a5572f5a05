//! `stave status` — saved configuration plus live daemon state.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

use stave_core::{config, ServerConfig};
use stave_daemon::{paths::socket_path, request_status, DaemonError};

use super::home_dir;

/// Arguments for `stave status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson {
    config_path: String,
    config: Option<ServerConfig>,
    daemon: Value,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let config_path = config::config_path_at(&home);
        let config = match config::load_at(&home) {
            Ok(config) => Some(config),
            Err(stave_core::ConfigError::ConfigNotFound { .. }) => None,
            Err(err) => return Err(err).context("failed to load config"),
        };

        let daemon = match request_status(&home) {
            Ok(status) => status,
            Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                "running": false,
                "socket": socket_path(&home).display().to_string(),
            }),
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            let payload = StatusJson {
                config_path: config_path.display().to_string(),
                config,
                daemon,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        match config {
            Some(config) => print_config(&config),
            None => println!("No workspace configured. Run 'stave init <root>' first."),
        }
        print_daemon(&daemon);
        Ok(())
    }
}

fn print_config(config: &ServerConfig) {
    let root = config
        .workspace_root
        .as_ref()
        .map(|root| root.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    println!("{} {root}", "root:".bold());
    if config.index_files.is_unrestricted() {
        println!("{} all {} files", "index:".bold(), config.source_extension);
    } else {
        let names: Vec<&str> = config.index_files.names().collect();
        println!("{} {}", "index:".bold(), names.join(", "));
    }
    println!("{} {} entries", "classpath:".bold(), config.classpath.len());
    println!(
        "{} {}",
        "updated:".bold(),
        config.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

fn print_daemon(daemon: &Value) {
    if daemon["running"].as_bool() != Some(true) {
        println!("{} {}", "daemon:".bold(), "not running".bright_black());
        return;
    }
    println!(
        "{} {} ({} units, {} open buffers, pass {})",
        "daemon:".bold(),
        "running".green().bold(),
        daemon["units"],
        daemon["open_buffers"],
        daemon["passes"],
    );
}
