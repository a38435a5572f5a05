//! Classpath resolution and the execution context built from it.
//!
//! Entry rules:
//! 1. `dir/*` must name a directory; its `.jar` members are used.
//! 2. A plain directory entry also contributes its `.jar` members.
//! 3. A plain file entry is used only if it is a `.jar`.
//! 4. Entries that do not exist are skipped without error.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use stave_core::ServerConfig;

const ARCHIVE_EXTENSION: &str = "jar";

/// Expand configured classpath entries into existing archive files.
pub fn resolve(entries: &[String]) -> Vec<PathBuf> {
    let mut resolved = Vec::new();
    for entry in entries {
        let (raw, must_be_dir) = match entry.strip_suffix('*') {
            Some(prefix) => (prefix, true),
            None => (entry.as_str(), false),
        };
        let path = Path::new(raw);
        if !path.exists() {
            tracing::debug!("classpath entry does not exist, skipping: {entry}");
            continue;
        }
        if path.is_dir() {
            resolved.extend(archives_in(path));
        } else if !must_be_dir && path.is_file() && is_archive(path) {
            resolved.push(path.to_path_buf());
        }
    }
    resolved
}

fn archives_in(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!("cannot list classpath directory {}: {err}", dir.display());
            return Vec::new();
        }
    };
    let mut archives: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_archive(p))
        .collect();
    archives.sort();
    archives
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == ARCHIVE_EXTENSION)
        .unwrap_or(false)
}

/// Compiler settings shared by every source unit of one program model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub classpath: Vec<PathBuf>,
    pub doc_comments: bool,
    /// SHA-256 over the resolved archives (path, size, mtime) and flags.
    pub fingerprint: String,
}

impl ExecutionContext {
    pub fn build(config: &ServerConfig) -> Self {
        let classpath = resolve(&config.classpath);
        let fingerprint = fingerprint(&classpath, config.doc_comments);
        Self {
            classpath,
            doc_comments: config.doc_comments,
            fingerprint,
        }
    }

    /// Whether a context built from `config` now would be identical.
    pub fn is_valid_for(&self, config: &ServerConfig) -> bool {
        let classpath = resolve(&config.classpath);
        fingerprint(&classpath, config.doc_comments) == self.fingerprint
    }
}

fn fingerprint(classpath: &[PathBuf], doc_comments: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update([u8::from(doc_comments)]);
    for entry in classpath {
        hasher.update(entry.to_string_lossy().as_bytes());
        hasher.update([0]);
        if let Ok(meta) = std::fs::metadata(entry) {
            hasher.update(meta.len().to_le_bytes());
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .unwrap_or_default();
            hasher.update(mtime.as_nanos().to_le_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};

    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn entry(path: &Path) -> String {
        path.to_string_lossy().to_string()
    }

    #[test]
    fn glob_expands_to_directory_archives() {
        let tmp = TempDir::new().unwrap();
        let libs = tmp.path().join("libs");
        fs::create_dir_all(&libs).unwrap();
        fs::write(libs.join("b.jar"), "b").unwrap();
        fs::write(libs.join("a.jar"), "a").unwrap();
        fs::write(libs.join("notes.txt"), "x").unwrap();
        fs::create_dir_all(libs.join("nested.jar")).unwrap();

        let resolved = resolve(&[format!("{}/*", entry(&libs))]);
        assert_eq!(resolved, vec![libs.join("a.jar"), libs.join("b.jar")]);
    }

    #[test]
    fn plain_entries_keep_only_existing_archives() {
        let tmp = TempDir::new().unwrap();
        let jar = tmp.path().join("core.jar");
        let txt = tmp.path().join("readme.txt");
        fs::write(&jar, "jar").unwrap();
        fs::write(&txt, "txt").unwrap();

        let resolved = resolve(&[
            entry(&tmp.path().join("missing.jar")),
            entry(&txt),
            entry(&jar),
        ]);
        assert_eq!(resolved, vec![jar]);
    }

    #[test]
    fn glob_on_a_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let jar = tmp.path().join("core.jar");
        fs::write(&jar, "jar").unwrap();
        assert!(resolve(&[format!("{}*", entry(&jar))]).is_empty());
    }

    #[test]
    fn context_stays_valid_until_classpath_changes() {
        let tmp = TempDir::new().unwrap();
        let jar = tmp.path().join("core.jar");
        fs::write(&jar, "jar").unwrap();

        let mut config = ServerConfig::default();
        config.classpath = vec![entry(&jar)];
        let context = ExecutionContext::build(&config);
        assert_eq!(context.classpath, vec![jar.clone()]);
        assert!(context.is_valid_for(&config));

        let old = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
        set_file_mtime(&jar, old).unwrap();
        assert!(!context.is_valid_for(&config), "archive mtime is part of the context");

        let context = ExecutionContext::build(&config);
        config.doc_comments = false;
        assert!(!context.is_valid_for(&config));
    }

    #[test]
    fn missing_entries_do_not_affect_validity() {
        let config = ServerConfig {
            classpath: vec!["/definitely/not/here.jar".to_string()],
            ..ServerConfig::default()
        };
        let context = ExecutionContext::build(&config);
        assert!(context.classpath.is_empty());
        assert!(context.is_valid_for(&ServerConfig::default()));
    }
}
