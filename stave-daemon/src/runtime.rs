use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use stave_core::{base_name, FileId, IndexFilter, ServerConfig};
use stave_sync::Eligibility;

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, stave_root, DEBOUNCE_WINDOW};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::server::{self, WorkspaceHandle};

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, config: ServerConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf, config: ServerConfig) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let (handle, processor) = server::start(config, &shutdown_tx);

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = match processor.await {
                Ok(inner) => inner,
                Err(err) => Err(DaemonError::Protocol(format!(
                    "sync processor join error: {err}"
                ))),
            };
            let _ = shutdown.send(());
            result
        })
    };

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            let result = watcher_task(handle, shutdown.subscribe()).await;
            if result.is_err() {
                let _ = shutdown.send(());
            }
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(home, handle, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    match handle.sync("startup").await {
        Ok(summary) => tracing::info!(
            units = summary.units,
            duration_ms = summary.duration_ms,
            "initial sync completed",
        ),
        Err(err) => tracing::error!(error = %err, "initial sync failed"),
    }
    drop(handle);

    let (processor_result, watcher_result, socket_result, signal_result) = tokio::join!(
        processor_handle,
        watcher_handle,
        socket_handle,
        signal_handle
    );

    handle_join("sync_processor", processor_result)?;
    handle_join("watcher", watcher_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

/// Trailing-edge debounce: fires once the window passes without a new event.
#[derive(Debug)]
struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

async fn watcher_task(
    handle: WorkspaceHandle,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let config = handle.config().await;
    let root = match config.workspace_root.as_deref().map(fs::canonicalize) {
        Some(Ok(root)) => root,
        Some(Err(err)) => {
            tracing::warn!(error = %err, "workspace root unavailable; file watching disabled");
            let _ = shutdown_rx.recv().await;
            return Ok(());
        }
        None => {
            tracing::info!("no workspace root configured; file watching disabled");
            let _ = shutdown_rx.recv().await;
            return Ok(());
        }
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut _watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    _watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::debug!(path = %root.display(), "watching workspace root");

    let mut debounce = Debouncer::new(DEBOUNCE_WINDOW);

    loop {
        let deadline = debounce.deadline();
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                if !debounce.fire(Instant::now()) {
                    continue;
                }
                match handle.sync("watcher").await {
                    Ok(summary) => tracing::info!(
                        units = summary.units,
                        added = summary.added,
                        removed = summary.removed,
                        duration_ms = summary.duration_ms,
                        "watcher-triggered sync completed",
                    ),
                    Err(err) => {
                        tracing::error!(error = %err, "watcher-triggered sync failed");
                    }
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                // The filter may change at runtime.
                let config = handle.config().await;
                let eligibility = Eligibility::new(&config.index_files, &config.source_extension);
                let mut touched = false;
                for path in &event.paths {
                    if !path.starts_with(&root) {
                        continue;
                    }
                    if eligibility.admits(&base_name(path)) {
                        if let Some(id) = FileId::from_path(path) {
                            handle.tracker().mark_changed(id);
                        }
                        touched = true;
                    } else if moves_subtree(&event.kind) {
                        touched = true;
                    }
                }
                if touched {
                    debounce.touch(Instant::now());
                }
            }
        }
    }

    Ok(())
}

async fn socket_server_task(
    home: PathBuf,
    handle: WorkspaceHandle,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let handle = handle.clone();
                let shutdown_tx = shutdown_tx.clone();
                let socket = socket.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, handle, shutdown_tx, socket).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    handle: WorkspaceHandle,
    shutdown_tx: broadcast::Sender<()>,
    socket: PathBuf,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stopping = request.cmd == "stop";
        let response = dispatch(&handle, request, &shutdown_tx, &socket).await;
        write_response(&mut writer, &response).await?;
        if stopping {
            break;
        }
    }

    Ok(())
}

/// Answer one control request against the workspace server.
async fn dispatch(
    handle: &WorkspaceHandle,
    request: DaemonRequest,
    shutdown_tx: &broadcast::Sender<()>,
    socket: &Path,
) -> DaemonResponse {
    let result = match request.cmd.as_str() {
        "status" => {
            let status = handle.status().await;
            let mut payload = json!(status);
            payload["running"] = json!(true);
            payload["socket"] = json!(socket.display().to_string());
            Ok(payload)
        }
        "sync" => handle.sync("socket").await.map(|summary| json!(summary)),
        "open" | "change" => match (parse_uri(request.uri.as_deref()), request.text) {
            (Ok(id), Some(text)) if request.cmd == "open" => {
                handle.did_open(id, text).await.map(|s| json!(s))
            }
            (Ok(id), Some(text)) => handle.did_change(id, text).await.map(|s| json!(s)),
            (Ok(_), None) => return DaemonResponse::error(format!("'{}' requires text", request.cmd)),
            (Err(message), _) => return DaemonResponse::error(message),
        },
        "close" => match parse_uri(request.uri.as_deref()) {
            Ok(id) => handle.did_close(&id).await.map(|s| json!(s)),
            Err(message) => return DaemonResponse::error(message),
        },
        "classpath" => match classpath_entries(request.entries.as_ref()) {
            Ok(entries) => handle.set_classpath(entries).await.map(|s| json!(s)),
            Err(message) => return DaemonResponse::error(message),
        },
        "index-files" => {
            let filter = IndexFilter::from_json(request.entries.as_ref().unwrap_or(&Value::Null));
            handle.set_index_files(filter).await.map(|s| json!(s))
        }
        "initialize" => {
            let options = request.options.unwrap_or(Value::Null);
            handle.initialize(options).await.map(|s| json!(s))
        }
        "units" => Ok(units_payload(handle).await),
        "stop" => {
            let _ = shutdown_tx.send(());
            Ok(json!({ "stopping": true }))
        }
        other => return DaemonResponse::error(format!("unknown command '{other}'")),
    };

    match result {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

/// Missing means "no entries"; non-string elements are dropped.
fn classpath_entries(entries: Option<&Value>) -> Result<Vec<String>, String> {
    match entries {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_owned))
            .collect()),
        Some(_) => Err("'classpath' expects a list of entries".to_string()),
    }
}

fn parse_uri(uri: Option<&str>) -> Result<FileId, String> {
    let uri = uri.ok_or_else(|| "missing 'uri'".to_string())?;
    FileId::parse(uri).ok_or_else(|| format!("not a file URI: {uri}"))
}

async fn units_payload(handle: &WorkspaceHandle) -> Value {
    let model = handle.current_model().await;
    let units: Vec<Value> = model
        .iter()
        .map(|unit| {
            json!({
                "uri": unit.id.as_str(),
                "origin": unit.origin,
                "serial": unit.serial,
                "digest": unit.digest,
                "bytes": unit.text.len(),
            })
        })
        .collect();
    json!({
        "pass": model.pass,
        "fingerprint": model.fingerprint,
        "units": units,
    })
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Kinds that can add or drop eligible files under a path the filter
/// does not name: a removed or created directory, or a rename.
fn moves_subtree(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Remove(_)
            | EventKind::Create(CreateKind::Folder)
            | EventKind::Modify(ModifyKind::Name(_))
    )
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = stave_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// `RUST_LOG` selects levels (default `info`); `STAVE_LOG_FORMAT=json`
/// switches to one JSON object per line.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("STAVE_LOG_FORMAT").is_ok_and(|format| format == "json");
    if json {
        let _ = fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
