//! Live editor buffer tracking.
//!
//! The tracker is the only place buffer text lives. Every open, edit and close
//! marks the identifier changed so the next pass rebuilds it from the right
//! source: buffer text while open, disk content once closed.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use stave_core::FileId;

/// Read side of the content tracker, as consumed by a synchronization pass.
pub trait ContentTracker: Send + Sync {
    fn open_ids(&self) -> BTreeSet<FileId>;

    fn is_open(&self, id: &FileId) -> bool;

    /// Live buffer text, or `None` when the file is not open.
    fn contents(&self, id: &FileId) -> Option<String>;

    /// Identifiers changed since the previous call. Draining.
    fn take_changed(&self) -> HashSet<FileId>;
}

#[derive(Debug, Default)]
struct TrackerState {
    open: HashMap<FileId, String>,
    changed: HashSet<FileId>,
}

/// Mutex-backed [`ContentTracker`] fed by editor notifications and the
/// file-system watcher.
#[derive(Debug, Default)]
pub struct FileContentsTracker {
    inner: Mutex<TrackerState>,
}

impl FileContentsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> MutexGuard<'_, TrackerState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(err) => {
                tracing::error!("content tracker mutex poisoned; continuing with recovered guard");
                err.into_inner()
            }
        }
    }

    pub fn did_open(&self, id: FileId, text: impl Into<String>) {
        let mut state = self.lock_inner();
        state.open.insert(id.clone(), text.into());
        state.changed.insert(id);
    }

    /// Replace the full buffer text. Unknown identifiers are opened.
    pub fn did_change(&self, id: FileId, text: impl Into<String>) {
        self.did_open(id, text);
    }

    pub fn did_close(&self, id: &FileId) {
        let mut state = self.lock_inner();
        state.open.remove(id);
        state.changed.insert(id.clone());
    }

    /// Record an on-disk change observed outside the editor.
    pub fn mark_changed(&self, id: FileId) {
        self.lock_inner().changed.insert(id);
    }

    /// Number of identifiers waiting for the next pass. Non-draining.
    pub fn pending_changes(&self) -> usize {
        self.lock_inner().changed.len()
    }
}

impl ContentTracker for FileContentsTracker {
    fn open_ids(&self) -> BTreeSet<FileId> {
        self.lock_inner().open.keys().cloned().collect()
    }

    fn is_open(&self, id: &FileId) -> bool {
        self.lock_inner().open.contains_key(id)
    }

    fn contents(&self, id: &FileId) -> Option<String> {
        self.lock_inner().open.get(id).cloned()
    }

    fn take_changed(&self) -> HashSet<FileId> {
        std::mem::take(&mut self.lock_inner().changed)
    }
}
