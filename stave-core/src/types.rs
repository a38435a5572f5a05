//! Domain types shared by every stave crate.
//!
//! Identifiers are `file://` URLs so that disk paths and editor buffers meet on
//! the same key. All path fields use `PathBuf`; never `&str` or `String` for
//! filesystem paths.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable identifier of a source file: its `file://` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(Url);

impl FileId {
    /// Build an identifier from an absolute path. Relative paths yield `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        Url::from_file_path(path).ok().map(Self)
    }

    /// Parse a `file://` URI as sent by an editor.
    pub fn parse(uri: &str) -> Option<Self> {
        let url = Url::parse(uri).ok()?;
        (url.scheme() == "file").then_some(Self(url))
    }

    pub fn to_path(&self) -> Option<PathBuf> {
        self.0.to_file_path().ok()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A file on disk or in an editor buffer, addressed by path and identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    pub path: PathBuf,
    pub id: FileId,
}

impl SourceFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let id = FileId::from_path(&path)?;
        Some(Self { path, id })
    }

    pub fn from_id(id: FileId) -> Option<Self> {
        let path = id.to_path()?;
        Some(Self { path, id })
    }

    /// Final path component, lossily decoded.
    pub fn base_name(&self) -> String {
        base_name(&self.path)
    }
}

/// Final path component of `path`, or the empty string for roots.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Index filter
// ---------------------------------------------------------------------------

/// Allow-list of base file names. Empty means "index everything".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexFilter(BTreeSet<String>);

impl IndexFilter {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Blank names are dropped.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            names
                .into_iter()
                .map(Into::into)
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        )
    }

    /// Interpret an `indexFiles` value from editor initialization options.
    ///
    /// Anything that is not an array of strings means unrestricted.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::unrestricted(),
            Value::Array(items) => {
                let mut names = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(name) => names.push(name.to_string()),
                        None => {
                            tracing::warn!(
                                entry = %item,
                                "index filter contains a non-string entry; indexing is unrestricted"
                            );
                            return Self::unrestricted();
                        }
                    }
                }
                Self::from_names(names)
            }
            other => {
                tracing::warn!(
                    value = %other,
                    "index filter is not a list of file names; indexing is unrestricted"
                );
                Self::unrestricted()
            }
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.0.is_empty()
    }

    /// The single membership predicate: unrestricted, or the name is listed.
    pub fn admits(&self, base_name: &str) -> bool {
        self.0.is_empty() || self.0.contains(base_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Change set
// ---------------------------------------------------------------------------

/// Which files changed since the previous synchronization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSet {
    /// No prior model exists; every file is new.
    FirstPass,
    Changed(HashSet<FileId>),
}

impl ChangeSet {
    pub fn is_first_pass(&self) -> bool {
        matches!(self, ChangeSet::FirstPass)
    }

    pub fn contains(&self, id: &FileId) -> bool {
        match self {
            ChangeSet::FirstPass => false,
            ChangeSet::Changed(ids) => ids.contains(id),
        }
    }

    /// Whether a unit for `id` must be (re)built on this pass.
    pub fn requires_build(&self, id: &FileId) -> bool {
        match self {
            ChangeSet::FirstPass => true,
            ChangeSet::Changed(ids) => ids.contains(id),
        }
    }

    pub fn changed(&self) -> impl Iterator<Item = &FileId> {
        let ids = match self {
            ChangeSet::FirstPass => None,
            ChangeSet::Changed(ids) => Some(ids.iter()),
        };
        ids.into_iter().flatten()
    }

    pub fn len(&self) -> usize {
        match self {
            ChangeSet::FirstPass => 0,
            ChangeSet::Changed(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && !self.is_first_pass()
    }
}

// ---------------------------------------------------------------------------
// Source extension
// ---------------------------------------------------------------------------

/// The file extension recognized as source, without the leading dot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceExtension(String);

impl SourceExtension {
    pub fn new(ext: impl AsRef<str>) -> Self {
        Self(ext.as_ref().trim_start_matches('.').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Suffix match on `.<ext>`: `Foo.groovy` and a bare `.groovy` match;
    /// `groovy` and `Foo.groovyx` do not.
    pub fn matches(&self, file_name: &str) -> bool {
        file_name
            .strip_suffix(self.0.as_str())
            .is_some_and(|rest| rest.ends_with('.'))
    }
}

impl Default for SourceExtension {
    fn default() -> Self {
        Self::new("groovy")
    }
}

impl fmt::Display for SourceExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
