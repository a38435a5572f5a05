//! # stave-sync
//!
//! Incremental workspace synchronization.
//!
//! Call [`synchronize`] with a [`ProgramModelCache`], the server config and a
//! [`ContentTracker`] to bring the program model in line with the workspace
//! tree and the open editor buffers.

pub mod cache;
pub mod classpath;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod reconcile;
pub mod tracker;

pub use cache::ProgramModelCache;
pub use classpath::ExecutionContext;
pub use error::SyncError;
pub use model::{ModelSnapshot, ProgramModel, SourceUnit, UnitOrigin};
pub use pipeline::{synchronize, SyncOutcome, SyncSummary};
pub use reconcile::{reconcile, Eligibility, ReconcileReport};
pub use tracker::{ContentTracker, FileContentsTracker};
