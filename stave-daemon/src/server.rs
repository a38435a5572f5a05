//! In-process workspace server: one sync processor owns the program model.
//!
//! Writers never touch the model directly. Every mutation goes through the
//! processor's queue; the processor drains whatever is queued, runs a single
//! pass, and publishes the finished snapshot. Readers only ever see the last
//! completed pass.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

use stave_core::{FileId, IndexFilter, ServerConfig};
use stave_sync::{
    synchronize, ContentTracker, FileContentsTracker, ModelSnapshot, ProgramModelCache, SyncSummary,
};

use crate::error::DaemonError;

const QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
enum Reconfigure {
    Classpath(Vec<String>),
    IndexFiles(IndexFilter),
    /// Editor initialization options (`indexFiles`, `classpath`, `rootUri`).
    Initialize(Value),
}

struct SyncJob {
    source: &'static str,
    reconfigure: Option<Reconfigure>,
    respond_to: oneshot::Sender<Result<SyncSummary, String>>,
}

/// Point-in-time view of the server for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub started_at_unix: u64,
    pub workspace_root: Option<String>,
    pub index_files: Vec<String>,
    pub units: usize,
    pub open_buffers: usize,
    pub pending_changes: usize,
    pub passes: u64,
    pub last_sync: Option<SyncSummary>,
}

/// Cloneable handle used by request handlers and feature providers.
#[derive(Clone)]
pub struct WorkspaceHandle {
    tracker: Arc<FileContentsTracker>,
    model: Arc<RwLock<Arc<ModelSnapshot>>>,
    last_sync: Arc<RwLock<Option<SyncSummary>>>,
    config: Arc<RwLock<ServerConfig>>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown: broadcast::Sender<()>,
    started_at_unix: u64,
}

/// Spawn the sync processor on the current tokio runtime.
///
/// The processor stops when `shutdown` fires or every handle is dropped.
pub fn start(
    config: ServerConfig,
    shutdown: &broadcast::Sender<()>,
) -> (WorkspaceHandle, JoinHandle<Result<(), DaemonError>>) {
    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(QUEUE_DEPTH);
    let handle = WorkspaceHandle {
        tracker: Arc::new(FileContentsTracker::new()),
        model: Arc::new(RwLock::new(Arc::new(ModelSnapshot::empty()))),
        last_sync: Arc::new(RwLock::new(None)),
        config: Arc::new(RwLock::new(config)),
        sync_tx,
        shutdown: shutdown.clone(),
        started_at_unix: unix_seconds_now(),
    };

    let processor = {
        let handle = handle.clone();
        let shutdown_rx = shutdown.subscribe();
        // The processor must not keep its own queue alive.
        let WorkspaceHandle {
            tracker,
            model,
            last_sync,
            config,
            ..
        } = handle;
        tokio::spawn(sync_processor_task(
            tracker,
            model,
            last_sync,
            config,
            sync_rx,
            shutdown_rx,
        ))
    };

    (handle, processor)
}

impl WorkspaceHandle {
    /// The last completed pass. Never blocks on an in-flight pass.
    pub async fn current_model(&self) -> Arc<ModelSnapshot> {
        self.model.read().await.clone()
    }

    pub fn tracker(&self) -> &FileContentsTracker {
        &self.tracker
    }

    pub async fn config(&self) -> ServerConfig {
        self.config.read().await.clone()
    }

    /// Run a pass (coalesced with anything already queued) and wait for it.
    pub async fn sync(&self, source: &'static str) -> Result<SyncSummary, DaemonError> {
        self.enqueue(source, None).await
    }

    pub async fn did_open(&self, id: FileId, text: String) -> Result<SyncSummary, DaemonError> {
        self.tracker.did_open(id, text);
        self.sync("open").await
    }

    pub async fn did_change(&self, id: FileId, text: String) -> Result<SyncSummary, DaemonError> {
        self.tracker.did_change(id, text);
        self.sync("change").await
    }

    pub async fn did_close(&self, id: &FileId) -> Result<SyncSummary, DaemonError> {
        self.tracker.did_close(id);
        self.sync("close").await
    }

    /// Swap the classpath; the next pass rebuilds the model from scratch.
    pub async fn set_classpath(&self, classpath: Vec<String>) -> Result<SyncSummary, DaemonError> {
        self.enqueue("classpath", Some(Reconfigure::Classpath(classpath)))
            .await
    }

    pub async fn set_index_files(&self, filter: IndexFilter) -> Result<SyncSummary, DaemonError> {
        self.enqueue("index-files", Some(Reconfigure::IndexFiles(filter)))
            .await
    }

    /// Merge editor initialization options into the live config.
    ///
    /// A malformed `indexFiles` falls back to indexing everything.
    pub async fn initialize(&self, options: Value) -> Result<SyncSummary, DaemonError> {
        self.enqueue("initialize", Some(Reconfigure::Initialize(options)))
            .await
    }

    /// Stop the processor and every task subscribed to the same shutdown channel.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    pub async fn status(&self) -> ServerStatus {
        let config = self.config().await;
        let model = self.current_model().await;
        let last_sync = self.last_sync.read().await.clone();
        ServerStatus {
            started_at_unix: self.started_at_unix,
            workspace_root: config
                .workspace_root
                .as_ref()
                .map(|root| root.display().to_string()),
            index_files: config.index_files.names().map(str::to_owned).collect(),
            units: model.len(),
            open_buffers: self.tracker.open_ids().len(),
            pending_changes: self.tracker.pending_changes(),
            passes: model.pass,
            last_sync,
        }
    }

    async fn enqueue(
        &self,
        source: &'static str,
        reconfigure: Option<Reconfigure>,
    ) -> Result<SyncSummary, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.sync_tx
            .send(SyncJob {
                source,
                reconfigure,
                respond_to: tx,
            })
            .await
            .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;

        let outcome = rx
            .await
            .map_err(|_| DaemonError::ChannelClosed("sync response"))?;
        outcome.map_err(DaemonError::Protocol)
    }
}

async fn sync_processor_task(
    tracker: Arc<FileContentsTracker>,
    model: Arc<RwLock<Arc<ModelSnapshot>>>,
    last_sync: Arc<RwLock<Option<SyncSummary>>>,
    config: Arc<RwLock<ServerConfig>>,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    // Created on the first job, dropped on shutdown.
    let mut cache: Option<ProgramModelCache> = None;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let mut batch = vec![job];
                while let Ok(next) = sync_rx.try_recv() {
                    batch.push(next);
                }

                let mut current = cache.take().unwrap_or_default();
                let pass_config = {
                    let mut config = config.write().await;
                    for job in &batch {
                        match &job.reconfigure {
                            Some(Reconfigure::Classpath(classpath)) => {
                                current.set_classpath(&mut config, classpath.clone());
                            }
                            Some(Reconfigure::IndexFiles(filter)) => {
                                config.index_files = filter.clone();
                            }
                            Some(Reconfigure::Initialize(options)) => {
                                let before = (config.classpath.clone(), config.workspace_root.clone());
                                config.apply_initialization_options(options);
                                if before != (config.classpath.clone(), config.workspace_root.clone()) {
                                    current.invalidate();
                                }
                            }
                            None => {}
                        }
                    }
                    config.clone()
                };

                let sources: Vec<&str> = batch.iter().map(|job| job.source).collect();
                let pass_tracker = tracker.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    let outcome = synchronize(&mut current, &pass_config, &*pass_tracker);
                    (current, outcome)
                })
                .await;

                let outcome = match joined {
                    Ok((current, outcome)) => {
                        cache = Some(current);
                        let summary = outcome.summary();
                        *model.write().await = Arc::new(outcome.snapshot);
                        *last_sync.write().await = Some(summary.clone());
                        tracing::info!(
                            sources = ?sources,
                            coalesced = batch.len(),
                            units = summary.units,
                            added = summary.added,
                            removed = summary.removed,
                            pruned = summary.pruned,
                            duration_ms = summary.duration_ms,
                            "sync pass completed",
                        );
                        Ok(summary)
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "sync pass panicked; model will be rebuilt");
                        Err(format!("sync task join error: {err}"))
                    }
                };

                for job in batch {
                    let _ = job.respond_to.send(outcome.clone());
                }
            }
        }
    }

    if cache.take().is_some() {
        tracing::debug!("program model cache torn down");
    }
    Ok(())
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
