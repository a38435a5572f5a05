//! The program model: at most one source unit per file identifier.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use stave_core::{FileId, SourceFile};

use crate::classpath::ExecutionContext;
use crate::error::{io_err, SyncError};

/// Where a unit's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOrigin {
    Disk,
    Buffer,
}

/// Compiled representation of one file's content at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub id: FileId,
    pub path: std::path::PathBuf,
    pub origin: UnitOrigin,
    pub text: Arc<str>,
    /// SHA-256 hex of `text`.
    pub digest: String,
    /// Unique within a model; a rebuilt unit always gets a new serial.
    pub serial: u64,
}

/// Source units plus the execution context they were built against.
#[derive(Debug)]
pub struct ProgramModel {
    context: ExecutionContext,
    units: BTreeMap<FileId, SourceUnit>,
    next_serial: u64,
    passes: u64,
}

impl ProgramModel {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            units: BTreeMap::new(),
            next_serial: 1,
            passes: 0,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Read `file` from disk and add it as a new unit.
    pub fn add_source_file(&mut self, file: &SourceFile) -> Result<&SourceUnit, SyncError> {
        let bytes = std::fs::read(&file.path).map_err(|e| io_err(&file.path, e))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        self.insert(file, text, UnitOrigin::Disk)
    }

    /// Add `file` as a new unit built from editor buffer text.
    pub fn add_source_text(
        &mut self,
        file: &SourceFile,
        text: String,
    ) -> Result<&SourceUnit, SyncError> {
        self.insert(file, text, UnitOrigin::Buffer)
    }

    fn insert(
        &mut self,
        file: &SourceFile,
        text: String,
        origin: UnitOrigin,
    ) -> Result<&SourceUnit, SyncError> {
        if self.units.contains_key(&file.id) {
            return Err(SyncError::DuplicateUnit(file.id.clone()));
        }
        let serial = self.next_serial;
        self.next_serial += 1;
        let unit = SourceUnit {
            id: file.id.clone(),
            path: file.path.clone(),
            origin,
            digest: digest(&text),
            text: Arc::from(text),
            serial,
        };
        Ok(self.units.entry(file.id.clone()).or_insert(unit))
    }

    /// Remove the units for `ids`; returns how many were present.
    pub fn remove_sources<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a FileId>,
    {
        ids.into_iter()
            .filter(|id| self.units.remove(*id).is_some())
            .count()
    }

    pub fn get(&self, id: &FileId) -> Option<&SourceUnit> {
        self.units.get(id)
    }

    pub fn contains(&self, id: &FileId) -> bool {
        self.units.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceUnit> {
        self.units.values()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub(crate) fn finish_pass(&mut self) -> u64 {
        self.passes += 1;
        self.passes
    }

    /// Immutable view for readers; shares unit text.
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            units: self.units.clone(),
            fingerprint: self.context.fingerprint.clone(),
            classpath_len: self.context.classpath.len(),
            pass: self.passes,
            completed_at: Utc::now(),
        }
    }
}

fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// The state of the program model after a completed pass.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    units: BTreeMap<FileId, SourceUnit>,
    pub fingerprint: String,
    pub classpath_len: usize,
    /// Number of passes the underlying model has completed.
    pub pass: u64,
    pub completed_at: DateTime<Utc>,
}

impl ModelSnapshot {
    /// Snapshot published before any pass has run.
    pub fn empty() -> Self {
        Self {
            units: BTreeMap::new(),
            fingerprint: String::new(),
            classpath_len: 0,
            pass: 0,
            completed_at: Utc::now(),
        }
    }

    pub fn get(&self, id: &FileId) -> Option<&SourceUnit> {
        self.units.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceUnit> {
        self.units.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &FileId> {
        self.units.keys()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
