//! Server configuration persisted as YAML.
//!
//! # Storage layout
//!
//! ```text
//! ~/.stave/
//!   config.yaml   (mode 0600, directory mode 0700)
//! ```
//!
//! # API pattern
//!
//! Every function touching the file system has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::types::{FileId, IndexFilter, SourceExtension};

/// Startup configuration for the workspace synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Root of the indexed source tree. `None` means single-file mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
    #[serde(default)]
    pub index_files: IndexFilter,
    /// Archive entries; a trailing `*` expands to the `.jar` members of a directory.
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub source_extension: SourceExtension,
    /// Retain documentation comments when building source units.
    #[serde(default = "default_doc_comments")]
    pub doc_comments: bool,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_doc_comments() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            index_files: IndexFilter::unrestricted(),
            classpath: Vec::new(),
            source_extension: SourceExtension::default(),
            doc_comments: default_doc_comments(),
            updated_at: Utc::now(),
        }
    }
}

impl ServerConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Merge the options an editor sends with its initialize request.
    ///
    /// Recognized keys: `indexFiles`, `classpath`, `rootUri`, `rootPath`.
    /// Values of the wrong shape are ignored rather than rejected.
    pub fn apply_initialization_options(&mut self, options: &Value) {
        let Some(map) = options.as_object() else {
            if !options.is_null() {
                tracing::warn!("initialization options are not an object; ignoring");
            }
            return;
        };

        if let Some(index_files) = map.get("indexFiles") {
            self.index_files = IndexFilter::from_json(index_files);
        }

        if let Some(classpath) = map.get("classpath") {
            match classpath.as_array() {
                Some(entries) => {
                    self.classpath = entries
                        .iter()
                        .filter_map(|entry| entry.as_str().map(str::to_owned))
                        .collect();
                }
                None => tracing::warn!(value = %classpath, "classpath is not a list; ignoring"),
            }
        }

        let root = map
            .get("rootUri")
            .and_then(Value::as_str)
            .and_then(FileId::parse)
            .and_then(|id| id.to_path())
            .or_else(|| map.get("rootPath").and_then(Value::as_str).map(PathBuf::from));
        if let Some(root) = root {
            self.workspace_root = Some(root);
        }

        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.stave/`
pub fn state_dir_at(home: &Path) -> PathBuf {
    home.join(".stave")
}

/// `<home>/.stave/config.yaml`; pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    state_dir_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load the config from `<home>/.stave/config.yaml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<ServerConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<ServerConfig, ConfigError> {
    load_at(&home()?)
}

/// Like [`load_at`], but a missing file yields the default config.
pub fn load_or_default_at(home: &Path) -> Result<ServerConfig, ConfigError> {
    match load_at(home) {
        Err(ConfigError::ConfigNotFound { .. }) => Ok(ServerConfig::default()),
        other => other,
    }
}

/// `load_or_default_at` convenience wrapper.
pub fn load_or_default() -> Result<ServerConfig, ConfigError> {
    load_or_default_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config to `<home>/.stave/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    let dir = state_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &ServerConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// Point the config at `workspace_root` with the given filter and classpath.
///
/// Settings not named here (extension, doc comments) survive re-initialization.
pub fn init_at(
    workspace_root: PathBuf,
    index_files: IndexFilter,
    classpath: Vec<String>,
    home: &Path,
) -> Result<ServerConfig, ConfigError> {
    let mut config = load_or_default_at(home)?;
    config.workspace_root = Some(workspace_root);
    config.index_files = index_files;
    config.classpath = classpath;
    config.updated_at = Utc::now();
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(
    workspace_root: PathBuf,
    index_files: IndexFilter,
    classpath: Vec<String>,
) -> Result<ServerConfig, ConfigError> {
    init_at(workspace_root, index_files, classpath, &home()?)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
