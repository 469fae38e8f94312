use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Instant;

use hydra_core::{config, store, QualifiedName, Target};

use crate::error::{io_err, DaemonError};
use crate::paths::{hydra_root, projects_root, socket_path, DEBOUNCE_WINDOW, PROJECT_INDEX};
use crate::pipeline::{self, KeyQueue, LocalHydrator};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Last refresh request per target (Unix seconds), keyed by `project/name`.
pub type RefreshTimestamps = HashMap<String, u64>;

/// What a registry change affects.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchScope {
    All,
    Target(QualifiedName),
}

struct Shared {
    home: PathBuf,
    hydrator: Arc<LocalHydrator>,
    queue: Arc<KeyQueue>,
    refreshes: RwLock<RefreshTimestamps>,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let config = config::load_at(&home)?;
    let interval = config.trigger_interval();
    let workers = config.worker_count();

    let queue = Arc::new(KeyQueue::new());
    let (refresh_tx, refresh_rx) = mpsc::unbounded_channel::<QualifiedName>();
    let hydrator = Arc::new(pipeline::build_hydrator(
        &home,
        config,
        queue.clone(),
        refresh_tx,
    ));
    let shared = Arc::new(Shared {
        home: home.clone(),
        hydrator,
        queue,
        refreshes: RwLock::new(HashMap::new()),
        started_at_unix: unix_seconds_now(),
    });

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    tracing::info!(
        home = %home.display(),
        workers,
        interval_secs = interval.as_secs(),
        "starting hydration daemon"
    );

    let sweep_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result = sweep_task(shared, interval, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result = watcher_task(shared, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let worker_handles: Vec<_> = (0..workers)
        .map(|id| {
            let shutdown = shutdown_tx.clone();
            let shared = shared.clone();
            tokio::spawn(async move {
                let result = worker_task(id, shared, shutdown.subscribe()).await;
                let _ = shutdown.send(());
                result
            })
        })
        .collect();

    let refresh_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result = refresh_recorder_task(shared, refresh_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(shared, shutdown.clone(), shutdown.subscribe()).await;
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

    let (sweep_result, watcher_result, refresh_result, socket_result, signal_result) = tokio::join!(
        sweep_handle,
        watcher_handle,
        refresh_handle,
        socket_handle,
        signal_handle
    );
    for (id, handle) in worker_handles.into_iter().enumerate() {
        handle_join(&format!("worker-{id}"), handle.await)?;
    }

    handle_join("trigger_sweep", sweep_result)?;
    handle_join("watcher", watcher_result)?;
    handle_join("refresh_recorder", refresh_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("hydration daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Trigger stage
// ---------------------------------------------------------------------------

async fn sweep_task(
    shared: Arc<Shared>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                if let Err(err) = run_sweep(shared.clone()).await {
                    tracing::warn!(error = %err, "trigger sweep failed");
                }
            }
        }
    }
    Ok(())
}

async fn run_sweep(shared: Arc<Shared>) -> Result<(), DaemonError> {
    let enqueued = tokio::task::spawn_blocking(move || pipeline::trigger_sweep(&shared.hydrator))
        .await
        .map_err(|err| DaemonError::Protocol(format!("trigger sweep join error: {err}")))??;
    if !enqueued.is_empty() {
        tracing::info!(count = enqueued.len(), "trigger sweep scheduled targets");
    }
    Ok(())
}

async fn trigger_one(shared: Arc<Shared>, name: QualifiedName) -> Result<Value, DaemonError> {
    tokio::task::spawn_blocking(move || {
        let target = store::load_target_at(&shared.home, &name)?;
        let enqueued = pipeline::trigger_target(&shared.hydrator, &target);
        Ok::<_, DaemonError>(json!({
            "target": name.to_string(),
            "enqueued": enqueued,
        }))
    })
    .await
    .map_err(|err| DaemonError::Protocol(format!("trigger join error: {err}")))?
}

async fn watcher_task(
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let projects = projects_root(&shared.home);
    if !projects.exists() {
        fs::create_dir_all(&projects).map_err(|e| io_err(&projects, e))?;
    }
    // Event paths arrive canonicalized on some platforms.
    let projects = fs::canonicalize(&projects).unwrap_or(projects);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;

    let mut watched_dirs = HashSet::new();
    register_projects_tree(&mut watcher, &mut watched_dirs, &projects)?;

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
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

                for path in event.paths {
                    if let Some(watch_dir) = directory_to_watch(&path) {
                        if watch_dir.starts_with(&projects) && watch_dir.exists() {
                            register_projects_tree(&mut watcher, &mut watched_dirs, &watch_dir)?;
                        }
                    }

                    if !is_registry_yaml(&path, &projects) {
                        continue;
                    }
                    if !should_process_event(&mut debounce, &path, Instant::now()) {
                        continue;
                    }

                    let result = match scope_for_path(&path) {
                        Some(WatchScope::Target(name)) => {
                            tracing::debug!(target = %name, "target changed");
                            trigger_one(shared.clone(), name).await.map(|_| ())
                        }
                        Some(WatchScope::All) => run_sweep(shared.clone()).await,
                        None => Ok(()),
                    };
                    if let Err(err) = result {
                        tracing::warn!(path = %path.display(), error = %err, "watcher-triggered evaluation failed");
                    }
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Batch stage
// ---------------------------------------------------------------------------

async fn worker_task(
    id: usize,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        let key = tokio::select! {
            _ = shutdown_rx.recv() => break,
            key = shared.queue.get() => match key {
                Some(key) => key,
                None => break,
            },
        };

        let job = shared.clone();
        let report =
            tokio::task::spawn_blocking(move || pipeline::process_key(&job.hydrator, &job.queue, key))
                .await
                .map_err(|err| DaemonError::Protocol(format!("batch join error: {err}")))?;
        tracing::debug!(worker = id, key = %report.key, outcome = report.outcome, "worker finished batch");
    }

    shared.queue.shutdown();
    Ok(())
}

async fn refresh_recorder_task(
    shared: Arc<Shared>,
    mut refresh_rx: mpsc::UnboundedReceiver<QualifiedName>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            name = refresh_rx.recv() => {
                let Some(name) = name else { break };
                tracing::info!(target = %name, "refresh requested");
                shared
                    .refreshes
                    .write()
                    .await
                    .insert(name.to_string(), unix_seconds_now());
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&shared.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let shared = shared.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, shared, shutdown_tx).await {
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
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
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

        let response = match request.cmd.as_str() {
            "status" => match build_status_payload(&shared).await {
                Ok(payload) => DaemonResponse::ok(payload),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "hydrate" => handle_hydrate(&shared, request.target.as_deref()).await,
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn handle_hydrate(shared: &Arc<Shared>, target: Option<&str>) -> DaemonResponse {
    let Some(target) = target else {
        return DaemonResponse::error("hydrate requires a target");
    };
    let name = match target.parse::<QualifiedName>() {
        Ok(name) => name,
        Err(err) => return DaemonResponse::error(err),
    };

    let home = shared.home.clone();
    let requested = name.clone();
    let marked = tokio::task::spawn_blocking(move || store::request_hydration_at(&home, &requested))
        .await
        .map_err(|err| DaemonError::Protocol(format!("hydrate join error: {err}")))
        .and_then(|result| result.map_err(DaemonError::from));
    if let Err(err) = marked {
        return DaemonResponse::error(err.to_string());
    }

    match trigger_one(shared.clone(), name).await {
        Ok(payload) => DaemonResponse::ok(payload),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

async fn build_status_payload(shared: &Shared) -> Result<Value, DaemonError> {
    let home = shared.home.clone();
    let targets = tokio::task::spawn_blocking(move || store::list_targets_at(&home))
        .await
        .map_err(|err| DaemonError::Protocol(format!("status join error: {err}")))??;
    let refreshes = shared.refreshes.read().await.clone();

    Ok(status_payload(
        &shared.home,
        &targets,
        &refreshes,
        shared.queue.len(),
        shared.queue.in_flight(),
        shared.started_at_unix,
    ))
}

fn status_payload(
    home: &Path,
    targets: &[Target],
    refreshes: &RefreshTimestamps,
    queue_depth: usize,
    in_flight: usize,
    started_at_unix: u64,
) -> Value {
    let targets: Vec<Value> = targets
        .iter()
        .map(|target| {
            let name = target.qualified_name().to_string();
            let operation = target.status.current_operation.as_ref();
            json!({
                "target": name,
                "phase": operation.map(|op| op.phase.to_string()),
                "dry_sha": operation.map(|op| op.dry_sha.clone()),
                "hydrated_sha": operation.and_then(|op| op.hydrated_sha.clone()),
                "message": operation.map(|op| op.message.clone()).filter(|m| !m.is_empty()),
                "hydrate_requested": target.hydrate_requested,
                "last_refresh_at_unix": refreshes.get(&name).copied().unwrap_or(0),
            })
        })
        .collect();

    json!({
        "running": true,
        "started_at_unix": started_at_unix,
        "queue_depth": queue_depth,
        "in_flight": in_flight,
        "targets": targets,
        "socket": socket_path(home).display().to_string(),
        "projects_root": projects_root(home).display().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Watcher helpers
// ---------------------------------------------------------------------------

fn register_projects_tree(
    watcher: &mut RecommendedWatcher,
    watched_dirs: &mut HashSet<PathBuf>,
    root: &Path,
) -> Result<(), DaemonError> {
    if !root.exists() {
        fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
    }
    for dir in collect_dirs(root)? {
        let canonical = match fs::canonicalize(&dir) {
            Ok(path) => path,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&dir, err)),
        };
        if watched_dirs.insert(canonical.clone()) {
            watcher.watch(&canonical, RecursiveMode::NonRecursive)?;
            tracing::debug!(path = %canonical.display(), "watching registry directory");
        }
    }
    Ok(())
}

fn collect_dirs(root: &Path) -> Result<Vec<PathBuf>, DaemonError> {
    let mut dirs = vec![root.to_path_buf()];
    let mut cursor = 0;
    while cursor < dirs.len() {
        let current = dirs[cursor].clone();
        cursor += 1;
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&current, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if ty.is_dir() {
                dirs.push(entry.path());
            }
        }
    }
    dirs.sort();
    dirs.dedup();
    Ok(dirs)
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_registry_yaml(path: &Path, projects: &Path) -> bool {
    path.starts_with(projects)
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml"))
            .unwrap_or(false)
}

/// `<projects>/<project>/project.yaml` affects every target of the project;
/// `<projects>/<project>/<target>.yaml` affects that target.
fn scope_for_path(path: &Path) -> Option<WatchScope> {
    let file_name = path.file_name()?.to_str()?;
    if file_name == PROJECT_INDEX {
        return Some(WatchScope::All);
    }
    let target = path.file_stem()?.to_str()?;
    let project = path.parent()?.file_name()?.to_str()?;
    Some(WatchScope::Target(QualifiedName::new(project, target)))
}

fn directory_to_watch(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        Some(path.to_path_buf())
    } else {
        path.parent().map(Path::to_path_buf)
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Plumbing
// ---------------------------------------------------------------------------

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
    for dir in [hydra_root(home), projects_root(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
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

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the global `tracing` subscriber on stderr. `RUST_LOG` overrides
/// the default `info` level.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
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

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use hydra_core::{
        DrySource, HydrationOperation, HydrationPhase, HydratorStatus, ProjectName,
        SourceHydrator, SyncSource, TargetName,
    };
    use tempfile::TempDir;
    use tokio::time::advance;

    fn target(project: &str, name: &str, status: HydratorStatus) -> Target {
        let now = Utc::now();
        Target {
            name: TargetName::from(name),
            project: ProjectName::from(project),
            source_hydrator: Some(hydrator()),
            hydrate_requested: false,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn hydrator() -> SourceHydrator {
        SourceHydrator {
            dry_source: DrySource {
                repo_url: "/srv/dry".to_string(),
                target_revision: "main".to_string(),
                path: "apps/web".to_string(),
            },
            sync_source: SyncSource {
                target_branch: "env/prod".to_string(),
                path: "web".to_string(),
            },
            hydrate_to: None,
        }
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn debounce_coalesces_rapid_events() {
        let threshold = Duration::from_millis(100);
        let mut debounce = HashMap::<PathBuf, Instant>::new();
        let path = PathBuf::from("/tmp/platform/web.yaml");
        let mut triggers = 0usize;

        for _ in 0..5 {
            if should_process_event_with_threshold(&mut debounce, &path, Instant::now(), threshold)
            {
                triggers += 1;
            }
            advance(Duration::from_millis(10)).await;
        }
        assert_eq!(triggers, 1, "rapid saves should collapse to one trigger");

        advance(Duration::from_millis(150)).await;
        assert!(should_process_event_with_threshold(
            &mut debounce,
            &path,
            Instant::now(),
            threshold
        ));
    }

    #[test]
    fn registry_paths_map_to_scopes() {
        let projects = Path::new("/home/u/.hydra/projects");
        assert_eq!(
            scope_for_path(&projects.join("platform/web.yaml")),
            Some(WatchScope::Target(QualifiedName::new("platform", "web")))
        );
        assert_eq!(
            scope_for_path(&projects.join("platform/project.yaml")),
            Some(WatchScope::All)
        );

        assert!(is_registry_yaml(&projects.join("platform/web.yaml"), projects));
        assert!(!is_registry_yaml(&projects.join("platform/web.yaml.tmp"), projects));
        assert!(!is_registry_yaml(Path::new("/elsewhere/web.yaml"), projects));
    }

    #[test]
    fn status_payload_reports_phase_and_refresh() {
        let home = TempDir::new().expect("home");
        let now = Utc::now();
        let hydrated = HydratorStatus {
            current_operation: Some(HydrationOperation {
                phase: HydrationPhase::Hydrated,
                started_at: now,
                finished_at: Some(now),
                dry_sha: "abc123".to_string(),
                hydrated_sha: Some("h1".to_string()),
                message: String::new(),
                source_hydrator: hydrator(),
            }),
            last_successful_operation: None,
        };
        let targets = vec![
            target("platform", "api", HydratorStatus::default()),
            target("platform", "web", hydrated),
        ];
        let refreshes: RefreshTimestamps =
            [("platform/web".to_string(), 1_000_200u64)].into_iter().collect();

        let payload = status_payload(home.path(), &targets, &refreshes, 2, 1, 1_000_000);

        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["queue_depth"], json!(2));
        assert_eq!(payload["in_flight"], json!(1));

        let rows = payload["targets"].as_array().expect("targets array");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["target"], json!("platform/api"));
        assert_eq!(rows[0]["phase"], Value::Null);
        assert_eq!(rows[0]["last_refresh_at_unix"], json!(0));
        assert_eq!(rows[1]["phase"], json!("hydrated"));
        assert_eq!(rows[1]["dry_sha"], json!("abc123"));
        assert_eq!(rows[1]["hydrated_sha"], json!("h1"));
        assert_eq!(rows[1]["message"], Value::Null);
        assert_eq!(rows[1]["last_refresh_at_unix"], json!(1_000_200u64));
    }

    #[test]
    fn stale_socket_is_removed_before_bind() {
        let home = TempDir::new().expect("home");
        let socket = home.path().join("hydra.sock");
        fs::write(&socket, b"").expect("stale socket file");

        prepare_socket_for_bind(&socket).expect("stale socket cleared");
        assert!(!socket.exists());
    }
}
