//! Process Supervisor
//!
//! Owns the single `llama-server` child process.
//!
//! # Lifecycle
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`, plus the child
//! dying on its own (`Running -> Stopped`).
//!
//! # Ownership
//! - The slot holds at most one [`ProcessHandle`]; only this module touches it
//! - A monitor task owns the `Child`, waits for it and clears the slot
//! - `start` and `stop` are serialized by an async mutex, so a second start
//!   always waits for the first process to be fully stopped
//! - The binaries lease lives in the slot, from just before spawn until the
//!   child exits or is given up on after a failed stop

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use super::params::{display_args, RunParameters};
use crate::config::ConfigStore;
use crate::error::{ControlError, ControlResult};
use crate::events::{EventBus, ServerStatus};
use crate::logs::{LogBuffer, LogKind};
use crate::models::resolve_model_path;
use crate::setup::lease::{BinariesGuard, BinariesLease, LeaseHolder};
use crate::setup::paths::{library_search_path, server_executable, LIBRARY_PATH_VAR};

/// How long output readers may keep draining after the child exits
const READER_DRAIN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Wait after spawn before announcing the server as running
    pub settle_delay: Duration,
    /// Time allowed for a graceful exit before the child is killed
    pub grace_period: Duration,
    /// Time allowed for a killed child to be reaped
    pub kill_wait: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1000),
            grace_period: Duration::from_secs(5),
            kill_wait: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// The one live child process
struct ProcessHandle {
    generation: u64,
    pid: u32,
    model: String,
    state: ServerState,
    stop_requested: Arc<AtomicBool>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
    _lease: BinariesGuard,
}

struct Inner {
    slot: Mutex<Option<ProcessHandle>>,
    starting: AtomicBool,
    ops: AsyncMutex<()>,
    next_generation: AtomicU64,
    settings: SupervisorConfig,
    config: Arc<ConfigStore>,
    events: EventBus,
    logs: LogBuffer,
    lease: BinariesLease,
}

#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl ProcessSupervisor {
    pub fn new(
        settings: SupervisorConfig,
        config: Arc<ConfigStore>,
        events: EventBus,
        logs: LogBuffer,
        lease: BinariesLease,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                starting: AtomicBool::new(false),
                ops: AsyncMutex::new(()),
                next_generation: AtomicU64::new(1),
                settings,
                config,
                events,
                logs,
                lease,
            }),
        }
    }

    /// Current `{running, model}`; reads only the in-memory slot
    pub fn status(&self) -> ServerStatus {
        match self.inner.slot.lock().as_ref() {
            Some(handle) if handle.state == ServerState::Running => ServerStatus::running(&handle.model),
            _ => ServerStatus::stopped(),
        }
    }

    pub fn state(&self) -> ServerState {
        match self.inner.slot.lock().as_ref() {
            Some(handle) => handle.state,
            None if self.inner.starting.load(Ordering::SeqCst) => ServerState::Starting,
            None => ServerState::Stopped,
        }
    }

    /// Process id of the owned child, if any
    pub fn pid(&self) -> Option<u32> {
        self.inner.slot.lock().as_ref().map(|h| h.pid)
    }

    /// Launch `llama-server` for `model`, stopping any running instance first
    pub async fn start(&self, model: &str, params: &RunParameters) -> ControlResult<()> {
        let _ops = self.inner.ops.lock().await;
        self.stop_locked().await?;

        self.inner.starting.store(true, Ordering::SeqCst);
        let result = self.spawn_locked(model, params).await;
        self.inner.starting.store(false, Ordering::SeqCst);

        if let Err(e) = &result {
            self.inner.logs.error(format!("Failed to start server: {}", e));
        }
        result
    }

    /// Stop the owned process; a no-op when nothing runs
    pub async fn stop(&self) -> ControlResult<()> {
        let _ops = self.inner.ops.lock().await;
        self.stop_locked().await
    }

    /// Stop on application exit, logging instead of failing
    pub async fn shutdown(&self) {
        if let Err(e) = self.stop().await {
            tracing::warn!("[Supervisor] Shutdown stop failed: {}", e);
        }
    }

    async fn spawn_locked(&self, model: &str, params: &RunParameters) -> ControlResult<()> {
        let inner = &self.inner;
        let config = inner.config.load().await?;
        let model_path = resolve_model_path(&config.models_path, model).await?;
        let lease = inner.lease.try_acquire(LeaseHolder::Server)?;

        let resolved = params.resolve(&config.default_params);
        let args = resolved.to_args(&model_path);
        let binaries_dir = config.binaries_path.clone();
        let executable = server_executable(&binaries_dir);

        inner.logs.info(format!("Starting server with model: {}", model));
        inner.logs.info(format!("Args: {}", display_args(&args)));
        tracing::debug!("[Supervisor] Executable {:?}", executable);

        let mut cmd = Command::new(&executable);
        cmd.args(&args)
            .current_dir(&binaries_dir)
            .env(
                LIBRARY_PATH_VAR,
                library_search_path(&binaries_dir, std::env::var_os(LIBRARY_PATH_VAR)),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ControlError::SpawnFailed(format!("{}: {}", executable.display(), e)))?;
        let pid = child
            .id()
            .ok_or_else(|| ControlError::SpawnFailed("process exited before it could be tracked".into()))?;

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, LogKind::Info, inner.logs.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, LogKind::Error, inner.logs.clone()));
        }

        let generation = inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let stop_requested = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(false);

        *inner.slot.lock() = Some(ProcessHandle {
            generation,
            pid,
            model: model.to_string(),
            state: ServerState::Running,
            stop_requested: stop_requested.clone(),
            kill_tx: Some(kill_tx),
            exited: exit_rx,
            _lease: lease,
        });
        tracing::info!("[Supervisor] Spawned llama-server pid {} (generation {})", pid, generation);

        tokio::spawn(monitor(
            inner.clone(),
            Exit {
                generation,
                child,
                kill_rx,
                readers,
                stop_requested,
                exit_tx,
            },
        ));
        tokio::spawn(settle(inner.clone(), generation, model.to_string()));

        Ok(())
    }

    async fn stop_locked(&self) -> ControlResult<()> {
        let inner = &self.inner;
        let (generation, pid, mut exited, mut kill_tx) = {
            let mut slot = inner.slot.lock();
            let Some(handle) = slot.as_mut() else {
                return Ok(());
            };
            handle.state = ServerState::Stopping;
            handle.stop_requested.store(true, Ordering::SeqCst);
            (handle.generation, handle.pid, handle.exited.clone(), handle.kill_tx.take())
        };

        inner.logs.info("Stopping server...");

        if let Err(e) = terminate_gracefully(pid).await {
            tracing::warn!("[Supervisor] Graceful termination of {} failed: {}", pid, e);
            if let Some(tx) = kill_tx.take() {
                let _ = tx.send(());
            }
        }

        if wait_exit(&mut exited, inner.settings.grace_period).await {
            return Ok(());
        }

        tracing::warn!(
            "[Supervisor] pid {} still alive after {:?}, killing",
            pid,
            inner.settings.grace_period
        );
        if let Some(tx) = kill_tx.take() {
            let _ = tx.send(());
        }
        if wait_exit(&mut exited, inner.settings.kill_wait).await {
            return Ok(());
        }

        // Give up on the child and free the binaries directory; the monitor
        // still reaps it if it ever exits
        let detached = {
            let mut slot = inner.slot.lock();
            match slot.as_ref() {
                Some(h) if h.generation == generation => slot.take(),
                _ => None,
            }
        };
        drop(detached);
        Err(ControlError::ProcessTerminationTimeout { pid })
    }
}

/// Everything the monitor task needs to own
struct Exit {
    generation: u64,
    child: Child,
    kill_rx: oneshot::Receiver<()>,
    readers: Vec<JoinHandle<()>>,
    stop_requested: Arc<AtomicBool>,
    exit_tx: watch::Sender<bool>,
}

async fn monitor(inner: Arc<Inner>, exit: Exit) {
    let Exit {
        generation,
        mut child,
        mut kill_rx,
        readers,
        stop_requested,
        exit_tx,
    } = exit;

    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::warn!("[Supervisor] Kill failed: {}", e);
            }
            child.wait().await
        }
    };

    for mut reader in readers {
        if tokio::time::timeout(READER_DRAIN, &mut reader).await.is_err() {
            reader.abort();
        }
    }

    match &status {
        Ok(status) => {
            let message = format!("Server process exited with {}", describe_exit(status));
            if status.success() || stop_requested.load(Ordering::SeqCst) {
                inner.logs.info(message);
            } else {
                inner.logs.error(message);
            }
        }
        Err(e) => inner.logs.error(format!("Lost track of server process: {}", e)),
    }

    // Taking our handle out of the slot also releases the lease
    let (superseded, finished) = {
        let mut slot = inner.slot.lock();
        match slot.as_ref() {
            Some(handle) if handle.generation == generation => (false, slot.take()),
            Some(_) => (true, None),
            None => (false, None),
        }
    };
    drop(finished);
    if !superseded {
        inner.events.server_status(ServerStatus::stopped());
    }

    exit_tx.send_replace(true);
    tracing::debug!("[Supervisor] Generation {} finished", generation);
}

/// Announce `running` once the settle delay passes, if the same child is still alive
async fn settle(inner: Arc<Inner>, generation: u64, model: String) {
    tokio::time::sleep(inner.settings.settle_delay).await;

    let alive = inner.slot.lock().as_ref().is_some_and(|h| {
        h.generation == generation && h.state == ServerState::Running && !*h.exited.borrow()
    });

    if alive {
        inner.logs.success(format!("Server running with model: {}", model));
        inner.events.server_status(ServerStatus::running(model));
    } else {
        tracing::debug!("[Supervisor] Generation {} gone before settling", generation);
    }
}

fn spawn_reader<R>(stream: R, kind: LogKind, logs: LogBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end();
                    if !line.trim().is_empty() {
                        logs.push(line, kind);
                    }
                }
                Err(e) => {
                    tracing::debug!("[Supervisor] Output stream closed: {}", e);
                    break;
                }
            }
        }
    })
}

async fn wait_exit(exited: &mut watch::Receiver<bool>, limit: Duration) -> bool {
    // A dropped sender means the monitor is gone, which only happens after exit
    tokio::time::timeout(limit, exited.wait_for(|done| *done)).await.is_ok()
}

/// SIGTERM on Unix; whole-tree `taskkill` on Windows
#[cfg(unix)]
async fn terminate_gracefully(pid: u32) -> std::io::Result<()> {
    let status = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("kill exited with {}", status)))
    }
}

#[cfg(windows)]
async fn terminate_gracefully(pid: u32) -> std::io::Result<()> {
    let status = Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/T", "/F"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("taskkill exited with {}", status)))
    }
}

fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {} ({})", signal, signal_name(signal));
        }
    }
    "unknown status".to_string()
}

#[cfg(unix)]
fn signal_name(signal: i32) -> &'static str {
    match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        6 => "SIGABRT",
        9 => "SIGKILL",
        11 => "SIGSEGV",
        15 => "SIGTERM",
        _ => "unknown",
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::events::CoreEvent;
    use crate::setup::paths::HomeLayout;
    use crate::test_support::write_fake_server;
    use once_cell::sync::Lazy;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::broadcast;

    // Fake servers are written then executed; one test at a time avoids ETXTBSY
    static SERIAL: Lazy<AsyncMutex<()>> = Lazy::new(|| AsyncMutex::new(()));

    struct Fixture {
        home: TempDir,
        events: EventBus,
        logs: LogBuffer,
        lease: BinariesLease,
        supervisor: ProcessSupervisor,
    }

    fn fixture(script: Option<&str>) -> Fixture {
        fixture_with(
            script,
            SupervisorConfig {
                settle_delay: Duration::from_millis(100),
                grace_period: Duration::from_secs(1),
                kill_wait: Duration::from_secs(2),
            },
        )
    }

    fn fixture_with(script: Option<&str>, settings: SupervisorConfig) -> Fixture {
        let home = tempdir().unwrap();
        let layout = HomeLayout::new(home.path());
        std::fs::create_dir_all(layout.default_models_dir()).unwrap();
        std::fs::write(layout.default_models_dir().join("a.gguf"), b"gguf").unwrap();
        std::fs::write(layout.default_models_dir().join("b.gguf"), b"gguf").unwrap();
        if let Some(script) = script {
            write_fake_server(&layout.default_binaries_dir(), script);
        }

        let events = EventBus::new();
        let logs = LogBuffer::new(1000, None, events.clone());
        let lease = BinariesLease::new();
        let supervisor = ProcessSupervisor::new(
            settings,
            Arc::new(ConfigStore::new(layout)),
            events.clone(),
            logs.clone(),
            lease.clone(),
        );
        Fixture {
            home,
            events,
            logs,
            lease,
            supervisor,
        }
    }

    impl Fixture {
        fn has_log(&self, needle: &str, kind: LogKind) -> bool {
            self.logs
                .snapshot()
                .iter()
                .any(|e| e.kind == kind && e.message.contains(needle))
        }
    }

    async fn next_status(rx: &mut broadcast::Receiver<CoreEvent>, limit: Duration) -> Option<ServerStatus> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Ok(CoreEvent::ServerStatus(status))) => return Some(status),
                Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                _ => return None,
            }
        }
    }

    fn alive(pid: u32) -> bool {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    const LONG_RUNNING: &str = "echo \"listening on $6:$4\"\necho 'loading model' >&2\nexec sleep 30";

    #[tokio::test]
    async fn test_missing_model_fails_before_spawn() {
        let _serial = SERIAL.lock().await;
        let fx = fixture(Some(LONG_RUNNING));

        let err = fx
            .supervisor
            .start("model.gguf", &RunParameters {
                port: Some(8080),
                ..RunParameters::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
        assert_eq!(fx.supervisor.pid(), None);
        assert_eq!(fx.supervisor.status(), ServerStatus::stopped());
        assert_eq!(fx.lease.holder(), None);
    }

    #[tokio::test]
    async fn test_start_status_and_stop() {
        let _serial = SERIAL.lock().await;
        let fx = fixture(Some(LONG_RUNNING));
        let mut rx = fx.events.subscribe();

        fx.supervisor.start("a.gguf", &RunParameters::default()).await.unwrap();
        assert_eq!(fx.supervisor.status(), ServerStatus::running("a.gguf"));
        assert_eq!(fx.supervisor.state(), ServerState::Running);
        assert_eq!(fx.lease.holder(), Some(LeaseHolder::Server));

        let status = next_status(&mut rx, Duration::from_secs(5)).await.unwrap();
        assert_eq!(status, ServerStatus::running("a.gguf"));
        assert!(fx.has_log("listening on 127.0.0.1:8080", LogKind::Info));
        assert!(fx.has_log("loading model", LogKind::Error));
        assert!(fx.has_log("Args: -m", LogKind::Info));

        let pid = fx.supervisor.pid().unwrap();
        fx.supervisor.stop().await.unwrap();
        assert_eq!(fx.supervisor.status(), ServerStatus::stopped());
        assert_eq!(fx.supervisor.state(), ServerState::Stopped);
        assert_eq!(fx.lease.holder(), None);
        assert!(!alive(pid));
        assert!(fx.has_log("Server process exited with signal 15 (SIGTERM)", LogKind::Info));
    }

    #[tokio::test]
    async fn test_stop_without_process_is_noop() {
        let _serial = SERIAL.lock().await;
        let fx = fixture(None);
        fx.supervisor.stop().await.unwrap();
        fx.supervisor.stop().await.unwrap();
        assert_eq!(fx.supervisor.status(), ServerStatus::stopped());
    }

    #[tokio::test]
    async fn test_second_start_supersedes_first() {
        let _serial = SERIAL.lock().await;
        let fx = fixture(Some(LONG_RUNNING));

        fx.supervisor.start("a.gguf", &RunParameters::default()).await.unwrap();
        let first = fx.supervisor.pid().unwrap();

        fx.supervisor.start("b.gguf", &RunParameters::default()).await.unwrap();
        let second = fx.supervisor.pid().unwrap();

        assert_ne!(first, second);
        assert!(!alive(first));
        assert!(alive(second));
        assert_eq!(fx.supervisor.status(), ServerStatus::running("b.gguf"));

        fx.supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_self_exit_clears_status() {
        let _serial = SERIAL.lock().await;
        let fx = fixture(Some("sleep 0.3\necho 'fatal: bad args' >&2\nexit 3"));
        let mut rx = fx.events.subscribe();

        fx.supervisor.start("a.gguf", &RunParameters::default()).await.unwrap();

        let mut last = None;
        while let Some(status) = next_status(&mut rx, Duration::from_secs(5)).await {
            let done = !status.running;
            last = Some(status);
            if done {
                break;
            }
        }

        assert_eq!(last, Some(ServerStatus::stopped()));
        assert_eq!(fx.supervisor.status(), ServerStatus::stopped());
        assert_eq!(fx.supervisor.pid(), None);
        assert_eq!(fx.lease.holder(), None);
        assert!(fx.has_log("Server process exited with code 3", LogKind::Error));
        assert!(fx.has_log("fatal: bad args", LogKind::Error));
    }

    #[tokio::test]
    async fn test_immediate_crash_never_reports_running() {
        let _serial = SERIAL.lock().await;
        let fx = fixture(Some("exit 1"));
        let mut rx = fx.events.subscribe();

        fx.supervisor.start("a.gguf", &RunParameters::default()).await.unwrap();

        let mut seen = Vec::new();
        while let Some(status) = next_status(&mut rx, Duration::from_millis(600)).await {
            seen.push(status);
        }
        assert!(seen.contains(&ServerStatus::stopped()));
        assert!(seen.iter().all(|s| !s.running));
    }

    #[tokio::test]
    async fn test_stubborn_process_is_killed() {
        let _serial = SERIAL.lock().await;
        let fx = fixture(Some("trap '' TERM\nwhile true; do sleep 0.1; done"));

        fx.supervisor.start("a.gguf", &RunParameters::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let pid = fx.supervisor.pid().unwrap();

        fx.supervisor.stop().await.unwrap();
        assert!(!alive(pid));
        assert_eq!(fx.supervisor.status(), ServerStatus::stopped());
        assert!(fx.has_log("signal 9 (SIGKILL)", LogKind::Info));
    }

    #[tokio::test]
    async fn test_termination_timeout_frees_slot_and_lease() {
        let _serial = SERIAL.lock().await;
        let fx = fixture_with(
            Some("trap '' TERM\nwhile true; do sleep 0.1; done"),
            SupervisorConfig {
                settle_delay: Duration::from_millis(50),
                grace_period: Duration::from_millis(200),
                kill_wait: Duration::ZERO,
            },
        );

        fx.supervisor.start("a.gguf", &RunParameters::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let first = fx.supervisor.pid().unwrap();

        let err = fx.supervisor.stop().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProcessTerminationTimeout);
        assert_eq!(fx.supervisor.status(), ServerStatus::stopped());
        assert_eq!(fx.lease.holder(), None);

        fx.supervisor.start("b.gguf", &RunParameters::default()).await.unwrap();
        assert_ne!(fx.supervisor.pid(), Some(first));
        assert_eq!(fx.lease.holder(), Some(LeaseHolder::Server));

        let _ = fx.supervisor.stop().await;
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_failure() {
        let _serial = SERIAL.lock().await;
        let fx = fixture(None);

        let err = fx
            .supervisor
            .start("a.gguf", &RunParameters::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SpawnFailed);
        assert_eq!(fx.supervisor.state(), ServerState::Stopped);
        assert_eq!(fx.lease.holder(), None);
        assert!(fx.has_log("Failed to start server", LogKind::Error));
    }

    #[tokio::test]
    async fn test_running_server_holds_binaries_lease() {
        let _serial = SERIAL.lock().await;
        let fx = fixture(Some(LONG_RUNNING));
        fx.supervisor.start("a.gguf", &RunParameters::default()).await.unwrap();

        let err = fx.lease.try_acquire(LeaseHolder::Install).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ResourceBusy);

        fx.supervisor.stop().await.unwrap();
        assert!(fx.lease.try_acquire(LeaseHolder::Install).is_ok());
        drop(fx.home);
    }
}
