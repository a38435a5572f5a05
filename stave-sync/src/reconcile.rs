//! Directory reconciler: bring the program model in line with disk and buffers.
//!
//! Pass order:
//! 1. Remove every unit whose identifier is in the change set.
//! 2. Prune units that are no longer eligible, lie outside the workspace
//!    root, or are neither open nor present on disk.
//! 3. Walk the workspace root and add disk units for eligible closed files
//!    that changed or have no unit.
//! 4. Add buffer units for eligible open files (under the root, if any).
//!
//! A unit is never replaced in place: it is removed, then a new one is added.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use stave_core::{base_name, ChangeSet, FileId, IndexFilter, SourceExtension, SourceFile};

use crate::model::{ProgramModel, UnitOrigin};
use crate::tracker::ContentTracker;

/// Which files may enter the program model.
#[derive(Debug, Clone, Copy)]
pub struct Eligibility<'a> {
    pub filter: &'a IndexFilter,
    pub extension: &'a SourceExtension,
}

impl<'a> Eligibility<'a> {
    pub fn new(filter: &'a IndexFilter, extension: &'a SourceExtension) -> Self {
        Self { filter, extension }
    }

    /// Filter first, then extension.
    pub fn admits(&self, base_name: &str) -> bool {
        self.filter.admits(base_name) && self.extension.matches(base_name)
    }
}

/// What a single reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub added_from_disk: usize,
    pub added_from_buffer: usize,
    /// Units dropped so they could be rebuilt.
    pub removed: usize,
    /// Units dropped because their file no longer belongs to the model.
    pub pruned: usize,
    /// Files under the root rejected by the index filter.
    pub skipped_filtered: usize,
    pub walk_errors: Vec<String>,
}

impl ReconcileReport {
    pub fn added(&self) -> usize {
        self.added_from_disk + self.added_from_buffer
    }
}

/// Reconcile `model` against the workspace root (if any) and open buffers.
///
/// Units are keyed in the path space of `root` as configured, so an editor
/// that reaches the same file through a symlink still hits the same unit.
/// I/O failures are logged and recorded in the report; the pass always runs to
/// completion.
pub fn reconcile(
    root: Option<&Path>,
    model: &mut ProgramModel,
    changes: &ChangeSet,
    eligibility: Eligibility<'_>,
    tracker: &dyn ContentTracker,
) -> ReconcileReport {
    let space = root.map(RootSpace::new);
    let buffers = open_buffers(space.as_ref(), tracker);
    let changes = changes_in(space.as_ref(), changes);

    let mut report = ReconcileReport {
        removed: model.remove_sources(changes.changed()),
        ..ReconcileReport::default()
    };

    report.pruned = prune(space.as_ref(), model, eligibility, &buffers);

    if let Some(space) = space.as_ref() {
        add_directory(&space.root, model, &changes, eligibility, &buffers, &mut report);
    }

    for (id, tracked) in &buffers {
        let Some(file) = SourceFile::from_id(id.clone()) else {
            continue;
        };
        add_open_buffer(&file, tracked, model, &changes, eligibility, tracker, &mut report);
    }

    report
}

/// The workspace root as configured (lexically normalized) plus its resolved
/// form, used to map symlinked or resolved paths back under the root.
#[derive(Debug)]
struct RootSpace {
    root: PathBuf,
    resolved: Option<PathBuf>,
}

impl RootSpace {
    fn new(root: &Path) -> Self {
        let root = normalize(root);
        let resolved = std::fs::canonicalize(&root).ok();
        Self { root, resolved }
    }

    /// `path` expressed under the configured root, or `None` if it lies outside.
    fn rebase(&self, path: &Path) -> Option<PathBuf> {
        let path = normalize(path);
        if path.starts_with(&self.root) {
            return Some(path);
        }
        let resolved_root = self.resolved.as_ref()?;
        let resolved = resolve(&path);
        let relative = resolved.strip_prefix(resolved_root).ok()?;
        Some(self.root.join(relative))
    }

    fn rebase_id(&self, id: &FileId) -> Option<FileId> {
        let path = id.to_path()?;
        FileId::from_path(&self.rebase(&path)?)
    }
}

/// Resolve symlinks; a file that no longer exists resolves through its parent.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Absolute path with `.` and `..` folded, without touching the file system.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Open buffers keyed by model identifier, with the identifier the tracker
/// knows them by. Without a root every buffer is kept as-is.
fn open_buffers(space: Option<&RootSpace>, tracker: &dyn ContentTracker) -> BTreeMap<FileId, FileId> {
    let mut buffers = BTreeMap::new();
    for tracked in tracker.open_ids() {
        let id = match space {
            Some(space) => match space.rebase_id(&tracked) {
                Some(id) => id,
                None => continue,
            },
            None => tracked.clone(),
        };
        buffers.insert(id, tracked);
    }
    buffers
}

fn changes_in(space: Option<&RootSpace>, changes: &ChangeSet) -> ChangeSet {
    match (space, changes) {
        (Some(space), ChangeSet::Changed(ids)) => ChangeSet::Changed(
            ids.iter()
                .map(|id| space.rebase_id(id).unwrap_or_else(|| id.clone()))
                .collect(),
        ),
        _ => changes.clone(),
    }
}

fn prune(
    space: Option<&RootSpace>,
    model: &mut ProgramModel,
    eligibility: Eligibility<'_>,
    buffers: &BTreeMap<FileId, FileId>,
) -> usize {
    let stale: Vec<FileId> = model
        .iter()
        .filter(|unit| {
            if !eligibility.admits(&base_name(&unit.path)) {
                return true;
            }
            let open = buffers.contains_key(&unit.id);
            match space {
                Some(space) => {
                    !unit.path.starts_with(&space.root) || (!open && !unit.path.is_file())
                }
                None => !open,
            }
        })
        .map(|unit| unit.id.clone())
        .collect();

    for id in &stale {
        tracing::debug!("pruning source unit no longer in the workspace: {id}");
    }
    model.remove_sources(&stale)
}

fn add_directory(
    root: &Path,
    model: &mut ProgramModel,
    changes: &ChangeSet,
    eligibility: Eligibility<'_>,
    buffers: &BTreeMap<FileId, FileId>,
    report: &mut ReconcileReport,
) {
    if !root.exists() {
        let message = format!("workspace root does not exist: {}", root.display());
        tracing::warn!("{message}");
        report.walk_errors.push(message);
        return;
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .follow_root_links(true)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("failed to walk directory for source files: {err}");
                report.walk_errors.push(err.to_string());
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }

        let name = base_name(entry.path());
        if !eligibility.filter.admits(&name) {
            report.skipped_filtered += 1;
            continue;
        }
        if !eligibility.extension.matches(&name) {
            continue;
        }
        let Some(file) = SourceFile::from_path(entry.path()) else {
            continue;
        };
        // Open files are built from their buffer in the open-buffer pass.
        if buffers.contains_key(&file.id) || !file.path.is_file() {
            continue;
        }

        let stale_origin = model
            .get(&file.id)
            .is_some_and(|unit| unit.origin != UnitOrigin::Disk);
        if model.contains(&file.id) && !changes.requires_build(&file.id) && !stale_origin {
            continue;
        }
        if stale_origin {
            report.removed += model.remove_sources([&file.id]);
        }

        match model.add_source_file(&file) {
            Ok(_) => report.added_from_disk += 1,
            Err(err) => {
                tracing::warn!("failed to read source file: {err}");
                report.walk_errors.push(err.to_string());
            }
        }
    }
}

fn add_open_buffer(
    file: &SourceFile,
    tracked: &FileId,
    model: &mut ProgramModel,
    changes: &ChangeSet,
    eligibility: Eligibility<'_>,
    tracker: &dyn ContentTracker,
    report: &mut ReconcileReport,
) {
    if !eligibility.admits(&file.base_name()) {
        return;
    }

    let stale_origin = model
        .get(&file.id)
        .is_some_and(|unit| unit.origin != UnitOrigin::Buffer);
    if model.contains(&file.id) && !changes.requires_build(&file.id) && !stale_origin {
        return;
    }
    // Closed between listing and reading; the close marks it for the next pass.
    let Some(text) = tracker.contents(tracked) else {
        return;
    };
    report.removed += model.remove_sources([&file.id]);

    match model.add_source_text(file, text) {
        Ok(_) => report.added_from_buffer += 1,
        Err(err) => tracing::warn!("failed to add open buffer: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;

    use stave_core::ServerConfig;
    use tempfile::TempDir;

    use crate::classpath::ExecutionContext;
    use crate::tracker::FileContentsTracker;

    fn setup() -> (TempDir, PathBuf, ProgramModel) {
        let tmp = TempDir::new().expect("tmp");
        let root = fs::canonicalize(tmp.path()).expect("canonical");
        let model = ProgramModel::new(ExecutionContext::build(&ServerConfig::default()));
        (tmp, root, model)
    }

    fn id(path: &Path) -> FileId {
        FileId::from_path(path).expect("id")
    }

    #[test]
    fn eligibility_applies_filter_before_extension() {
        let filter = IndexFilter::from_names(["A.groovy", "notes.txt"]);
        let ext = SourceExtension::default();
        let eligibility = Eligibility::new(&filter, &ext);
        assert!(eligibility.admits("A.groovy"));
        assert!(!eligibility.admits("B.groovy"));
        assert!(!eligibility.admits("notes.txt"));
    }

    #[test]
    fn walk_adds_eligible_files_from_nested_dirs() {
        let (_tmp, root, mut model) = setup();
        fs::create_dir_all(root.join("src/pkg")).unwrap();
        fs::write(root.join("src/pkg/A.groovy"), "class A {}").unwrap();
        fs::write(root.join("README.md"), "# readme").unwrap();

        let tracker = FileContentsTracker::new();
        let filter = IndexFilter::unrestricted();
        let ext = SourceExtension::default();
        let report = reconcile(
            Some(&root),
            &mut model,
            &ChangeSet::FirstPass,
            Eligibility::new(&filter, &ext),
            &tracker,
        );

        assert_eq!(report.added_from_disk, 1);
        assert!(model.contains(&id(&root.join("src/pkg/A.groovy"))));
        assert!(report.walk_errors.is_empty());
    }

    #[test]
    fn missing_root_is_reported_but_buffers_still_indexed() {
        let (_tmp, root, mut model) = setup();
        let missing = root.join("gone");
        let buffer = missing.join("A.groovy");

        let tracker = FileContentsTracker::new();
        tracker.did_open(id(&buffer), "class A {}");
        let filter = IndexFilter::unrestricted();
        let ext = SourceExtension::default();
        let report = reconcile(
            Some(&missing),
            &mut model,
            &ChangeSet::FirstPass,
            Eligibility::new(&filter, &ext),
            &tracker,
        );

        assert_eq!(report.walk_errors.len(), 1);
        assert_eq!(report.added_from_buffer, 1);
        assert!(model.contains(&id(&buffer)));
    }

    #[test]
    fn no_root_indexes_every_open_buffer_only() {
        let (_tmp, root, mut model) = setup();
        fs::write(root.join("Disk.groovy"), "class Disk {}").unwrap();
        let elsewhere = std::env::temp_dir().join("stave-elsewhere").join("B.groovy");

        let tracker = FileContentsTracker::new();
        tracker.did_open(id(&elsewhere), "class B {}");
        tracker.did_open(id(&root.join("notes.txt")), "not source");
        let filter = IndexFilter::unrestricted();
        let ext = SourceExtension::default();
        reconcile(
            None,
            &mut model,
            &ChangeSet::FirstPass,
            Eligibility::new(&filter, &ext),
            &tracker,
        );

        let ids: Vec<_> = model.iter().map(|u| u.id.clone()).collect();
        assert_eq!(ids, vec![id(&elsewhere)]);
    }

    #[test]
    fn closed_buffer_is_rebuilt_from_disk() {
        let (_tmp, root, mut model) = setup();
        let path = root.join("A.groovy");
        fs::write(&path, "disk").unwrap();
        let a = id(&path);

        let tracker = FileContentsTracker::new();
        tracker.did_open(a.clone(), "buffer");
        let filter = IndexFilter::unrestricted();
        let ext = SourceExtension::default();
        let eligibility = Eligibility::new(&filter, &ext);
        tracker.take_changed();
        reconcile(Some(&root), &mut model, &ChangeSet::FirstPass, eligibility, &tracker);
        assert_eq!(model.get(&a).map(|u| u.origin), Some(UnitOrigin::Buffer));

        tracker.did_close(&a);
        let changes = ChangeSet::Changed(tracker.take_changed());
        let report = reconcile(Some(&root), &mut model, &changes, eligibility, &tracker);
        let unit = model.get(&a).expect("unit");
        assert_eq!(unit.origin, UnitOrigin::Disk);
        assert_eq!(&*unit.text, "disk");
        assert_eq!(report.removed, 1);
    }

    #[test]
    fn deleted_file_is_pruned_even_without_change_notification() {
        let (_tmp, root, mut model) = setup();
        let path = root.join("A.groovy");
        fs::write(&path, "a").unwrap();

        let tracker = FileContentsTracker::new();
        let filter = IndexFilter::unrestricted();
        let ext = SourceExtension::default();
        let eligibility = Eligibility::new(&filter, &ext);
        reconcile(Some(&root), &mut model, &ChangeSet::FirstPass, eligibility, &tracker);
        assert_eq!(model.len(), 1);

        fs::remove_file(&path).unwrap();
        let report = reconcile(
            Some(&root),
            &mut model,
            &ChangeSet::Changed(HashSet::new()),
            eligibility,
            &tracker,
        );
        assert_eq!(report.pruned, 1);
        assert!(model.is_empty());
    }

    #[test]
    fn disk_unit_for_open_file_is_replaced_by_buffer_without_change_signal() {
        let (_tmp, root, mut model) = setup();
        let path = root.join("A.groovy");
        fs::write(&path, "disk").unwrap();
        let a = id(&path);

        let tracker = FileContentsTracker::new();
        let filter = IndexFilter::unrestricted();
        let ext = SourceExtension::default();
        let eligibility = Eligibility::new(&filter, &ext);
        reconcile(Some(&root), &mut model, &ChangeSet::FirstPass, eligibility, &tracker);

        tracker.did_open(a.clone(), "buffer");
        tracker.take_changed();
        reconcile(
            Some(&root),
            &mut model,
            &ChangeSet::Changed(HashSet::new()),
            eligibility,
            &tracker,
        );
        assert_eq!(model.get(&a).map(|u| &*u.text), Some("buffer"));
        assert_eq!(model.len(), 1);
    }
}
