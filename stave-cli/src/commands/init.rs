//! `stave init <root> [--index-file NAME]... [--classpath ENTRY]... [--ext EXT]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use stave_core::{config, IndexFilter, SourceExtension};

use super::home_dir;

/// Write the workspace configuration.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Workspace root directory.
    pub path: PathBuf,

    /// Base file name to index (repeatable). Omit to index every source file.
    #[arg(long = "index-file", value_name = "NAME")]
    pub index_files: Vec<String>,

    /// Classpath entry (repeatable). `dir/*` expands to the jars in `dir`.
    #[arg(long = "classpath", value_name = "ENTRY")]
    pub classpath: Vec<String>,

    /// Source file extension, with or without the leading dot.
    #[arg(long)]
    pub ext: Option<String>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let root = self
            .path
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.path.display()))?;

        let filter = IndexFilter::from_names(self.index_files);
        let mut saved = config::init_at(root.clone(), filter, self.classpath, &home)
            .with_context(|| format!("failed to init workspace '{}'", root.display()))?;
        if let Some(ext) = self.ext {
            saved.source_extension = SourceExtension::new(ext);
            config::save_at(&home, &saved).context("failed to save source extension")?;
        }

        println!("✓ Workspace root set to '{}'", root.display());
        if saved.index_files.is_unrestricted() {
            println!("  Indexing every {} file", saved.source_extension);
        } else {
            let names: Vec<&str> = saved.index_files.names().collect();
            println!("  Indexing only: {}", names.join(", "));
        }
        println!(
            "  Saved to: {}",
            config::config_path_at(&home).display()
        );
        Ok(())
    }
}
