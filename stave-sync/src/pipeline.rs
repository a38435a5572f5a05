//! Shared synchronization entrypoint used by the CLI and the daemon.

use std::time::{Duration, Instant};

use serde::Serialize;

use stave_core::ServerConfig;

use crate::cache::ProgramModelCache;
use crate::model::ModelSnapshot;
use crate::reconcile::{reconcile, Eligibility, ReconcileReport};
use crate::tracker::ContentTracker;

/// Result of one synchronization pass.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub report: ReconcileReport,
    /// The model was built from scratch on this pass.
    pub rebuilt: bool,
    pub snapshot: ModelSnapshot,
    pub duration: Duration,
}

/// Serializable one-line summary of a pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub pass: u64,
    pub rebuilt: bool,
    pub units: usize,
    pub added: usize,
    pub removed: usize,
    pub pruned: usize,
    pub walk_errors: usize,
    pub duration_ms: u128,
}

impl SyncOutcome {
    pub fn summary(&self) -> SyncSummary {
        SyncSummary {
            pass: self.snapshot.pass,
            rebuilt: self.rebuilt,
            units: self.snapshot.len(),
            added: self.report.added(),
            removed: self.report.removed,
            pruned: self.report.pruned,
            walk_errors: self.report.walk_errors.len(),
            duration_ms: self.duration.as_millis(),
        }
    }
}

/// Run one synchronization pass to completion.
///
/// This is the canonical entrypoint for both `stave index` and the daemon's
/// sync processor. Failures inside the pass degrade to partial indexing and
/// are reported in [`ReconcileReport::walk_errors`].
pub fn synchronize(
    cache: &mut ProgramModelCache,
    config: &ServerConfig,
    tracker: &dyn ContentTracker,
) -> SyncOutcome {
    let started = Instant::now();
    let (model, changes) = cache.acquire(config, tracker);
    let rebuilt = changes.is_first_pass();

    let eligibility = Eligibility::new(&config.index_files, &config.source_extension);
    let report = reconcile(
        config.workspace_root.as_deref(),
        model,
        &changes,
        eligibility,
        tracker,
    );
    model.finish_pass();
    let snapshot = model.snapshot();
    let duration = started.elapsed();

    tracing::info!(
        "sync pass {} complete: {} units ({} added, {} removed, {} pruned, {} walk errors) in {}ms",
        snapshot.pass,
        snapshot.len(),
        report.added(),
        report.removed,
        report.pruned,
        report.walk_errors.len(),
        duration.as_millis(),
    );

    SyncOutcome {
        report,
        rebuilt,
        snapshot,
        duration,
    }
}
