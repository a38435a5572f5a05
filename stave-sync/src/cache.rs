//! Program model cache: reuse the model while its execution context is valid.

use stave_core::{ChangeSet, ServerConfig};

use crate::classpath::ExecutionContext;
use crate::model::ProgramModel;
use crate::tracker::ContentTracker;

/// Holds the model produced by the previous pass, if any.
#[derive(Debug, Default)]
pub struct ProgramModelCache {
    model: Option<ProgramModel>,
}

impl ProgramModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the model to reconcile and the changes it must absorb.
    ///
    /// A fresh model is built when none exists or when the execution context
    /// built from `config` differs from the cached one; the change set is then
    /// [`ChangeSet::FirstPass`]. The tracker is drained either way.
    pub fn acquire(
        &mut self,
        config: &ServerConfig,
        tracker: &dyn ContentTracker,
    ) -> (&mut ProgramModel, ChangeSet) {
        let changed = tracker.take_changed();

        let reusable = self
            .model
            .as_ref()
            .is_some_and(|model| model.context().is_valid_for(config));

        let changes = if reusable {
            ChangeSet::Changed(changed)
        } else {
            if self.model.is_some() {
                tracing::info!("execution context changed; rebuilding program model");
            }
            self.model = None;
            ChangeSet::FirstPass
        };

        let model = self
            .model
            .get_or_insert_with(|| ProgramModel::new(ExecutionContext::build(config)));
        (model, changes)
    }

    /// Replace the classpath and drop the model built against the old one.
    pub fn set_classpath(&mut self, config: &mut ServerConfig, classpath: Vec<String>) {
        config.classpath = classpath;
        self.invalidate();
    }

    pub fn invalidate(&mut self) {
        self.model = None;
    }

    pub fn current(&self) -> Option<&ProgramModel> {
        self.model.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use stave_core::{FileId, SourceFile};
    use tempfile::TempDir;

    use crate::tracker::FileContentsTracker;

    #[test]
    fn first_acquire_is_a_first_pass() {
        let tracker = FileContentsTracker::new();
        let mut cache = ProgramModelCache::new();
        let (model, changes) = cache.acquire(&ServerConfig::default(), &tracker);
        assert!(model.is_empty());
        assert!(changes.is_first_pass());
    }

    #[test]
    fn second_acquire_reuses_model_and_reports_changes() {
        let tmp = TempDir::new().unwrap();
        let file = SourceFile::from_path(tmp.path().join("A.groovy")).unwrap();
        let tracker = FileContentsTracker::new();
        let mut cache = ProgramModelCache::new();
        let config = ServerConfig::default();

        let (model, _) = cache.acquire(&config, &tracker);
        model.add_source_text(&file, "a".to_string()).unwrap();

        tracker.mark_changed(file.id.clone());
        let (model, changes) = cache.acquire(&config, &tracker);
        assert_eq!(model.len(), 1, "model reused");
        assert!(changes.contains(&file.id));
    }

    #[test]
    fn classpath_change_discards_all_units() {
        let tmp = TempDir::new().unwrap();
        let jar = tmp.path().join("lib.jar");
        fs::write(&jar, "jar").unwrap();
        let file = SourceFile::from_path(tmp.path().join("A.groovy")).unwrap();
        let tracker = FileContentsTracker::new();
        let mut cache = ProgramModelCache::new();
        let mut config = ServerConfig::default();

        let (model, _) = cache.acquire(&config, &tracker);
        model.add_source_text(&file, "a".to_string()).unwrap();

        config.classpath = vec![jar.to_string_lossy().to_string()];
        tracker.mark_changed(FileId::from_path(&tmp.path().join("B.groovy")).unwrap());
        let (model, changes) = cache.acquire(&config, &tracker);
        assert!(model.is_empty());
        assert!(changes.is_first_pass());
        assert_eq!(tracker.pending_changes(), 0, "tracker drained on rebuild");
    }

    #[test]
    fn set_classpath_invalidates() {
        let tracker = FileContentsTracker::new();
        let mut cache = ProgramModelCache::new();
        let mut config = ServerConfig::default();
        cache.acquire(&config, &tracker);
        assert!(cache.current().is_some());

        cache.set_classpath(&mut config, vec!["/nowhere/*".to_string()]);
        assert!(cache.current().is_none());
        assert_eq!(config.classpath, vec!["/nowhere/*".to_string()]);
    }
}
