//! `stave index [<root>] [--index-file NAME]... [--json]`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use stave_core::{config, IndexFilter};
use stave_sync::{synchronize, FileContentsTracker, ProgramModelCache, SyncOutcome, UnitOrigin};

use super::home_dir;

/// Run one synchronization pass against the configured workspace.
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Workspace root; defaults to the root saved by `stave init`.
    pub path: Option<PathBuf>,

    /// Restrict indexing to these base file names (repeatable).
    #[arg(long = "index-file", value_name = "NAME")]
    pub index_files: Vec<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl IndexArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let mut config = config::load_or_default_at(&home).context("failed to load config")?;

        if let Some(path) = self.path.as_ref() {
            let root = path
                .canonicalize()
                .with_context(|| format!("cannot resolve path '{}'", path.display()))?;
            config.workspace_root = Some(root);
        }
        if !self.index_files.is_empty() {
            config.index_files = IndexFilter::from_names(self.index_files);
        }
        let Some(root) = config.workspace_root.clone() else {
            bail!("no workspace root: pass <root> or run `stave init <root>` first");
        };

        let tracker = FileContentsTracker::new();
        let mut cache = ProgramModelCache::new();
        let outcome = synchronize(&mut cache, &config, &tracker);

        if self.json {
            print_json(&root, &outcome)
        } else {
            print_table(&root, &outcome);
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct IndexJson<'a> {
    root: String,
    summary: stave_sync::SyncSummary,
    report: &'a stave_sync::ReconcileReport,
    units: Vec<UnitJson>,
}

#[derive(Serialize)]
struct UnitJson {
    path: String,
    uri: String,
    origin: UnitOrigin,
    bytes: usize,
    digest: String,
}

#[derive(Tabled)]
struct UnitRow {
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "origin")]
    origin: String,
    #[tabled(rename = "bytes")]
    bytes: usize,
    #[tabled(rename = "sha256")]
    digest: String,
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn print_json(root: &Path, outcome: &SyncOutcome) -> Result<()> {
    let payload = IndexJson {
        root: root.display().to_string(),
        summary: outcome.summary(),
        report: &outcome.report,
        units: outcome
            .snapshot
            .iter()
            .map(|unit| UnitJson {
                path: relative(root, &unit.path),
                uri: unit.id.to_string(),
                origin: unit.origin,
                bytes: unit.text.len(),
                digest: unit.digest.clone(),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize index JSON")?
    );
    Ok(())
}

fn print_table(root: &Path, outcome: &SyncOutcome) {
    let summary = outcome.summary();
    println!(
        "stave v{} | {} | {} units | {}ms",
        env!("CARGO_PKG_VERSION"),
        root.display(),
        summary.units,
        summary.duration_ms,
    );

    if outcome.snapshot.is_empty() {
        println!("No source files matched.");
    } else {
        let rows: Vec<UnitRow> = outcome
            .snapshot
            .iter()
            .map(|unit| UnitRow {
                file: relative(root, &unit.path),
                origin: match unit.origin {
                    UnitOrigin::Disk => "disk".to_string(),
                    UnitOrigin::Buffer => "buffer".to_string(),
                },
                bytes: unit.text.len(),
                digest: unit.digest.chars().take(12).collect(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    if outcome.report.skipped_filtered > 0 {
        println!(
            "{}",
            format!(
                "{} file(s) outside the index filter were skipped",
                outcome.report.skipped_filtered
            )
            .bright_black()
        );
    }
    for error in &outcome.report.walk_errors {
        println!("{} {error}", "warning:".yellow().bold());
    }
}
