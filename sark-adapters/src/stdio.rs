//! Subprocess supervisor for MCP stdio servers (§4.2).
//!
//! Owns a child process's stdin/stdout, frames newline-delimited JSON-RPC
//! 2.0 messages over them, and enforces memory/fd/cpu/hung-process limits on
//! a fixed polling interval. The state machine follows the same
//! `match (state, event) -> Option<state>` shape used elsewhere in this
//! workspace for other lifecycle controllers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio as StdStdio;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use sysinfo::{Pid, System};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, warn};

use crate::error::{AdapterError, AdapterErrorKind, AdapterResult};

const ADAPTER_NAME: &str = "mcp-stdio";

/// Observable supervisor state (`Stopped → Starting → Running → (Restarting
/// | Stopping) → Stopped`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StdioState {
    /// No child process is running.
    Stopped,
    /// The child process is being spawned.
    Starting,
    /// The child process is running and responsive.
    Running,
    /// The child is being torn down and respawned after a breach or crash.
    Restarting,
    /// The child is being torn down and will not be respawned.
    Stopping,
}

/// Events driving [`StdioState`] transitions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StdioEvent {
    /// Supervisor asked to start the child.
    Start,
    /// The child process came up and completed its first heartbeat.
    Started,
    /// A heartbeat was missed past `hung_timeout`, or a resource limit was breached.
    NeedsRestart,
    /// The child process exited on its own while not shutting down.
    ChildExited,
    /// Graceful stop requested by the caller.
    Stop,
    /// The child has fully exited.
    Stopped,
    /// Restart budget exhausted; the supervisor gives up.
    RestartsExhausted,
}

/// Applies `event` to `current`, returning the resulting state, or `None`
/// if `event` has no valid transition from `current`.
fn next_state(current: StdioState, event: StdioEvent) -> Option<StdioState> {
    use StdioEvent::{ChildExited, NeedsRestart, RestartsExhausted, Start, Started, Stop, Stopped};
    use StdioState::{Restarting, Running, Starting, Stopped as Halted, Stopping};

    match (current, event) {
        (Halted, Start) => Some(Starting),
        (Starting, Started) => Some(Running),
        (Restarting, Started) => Some(Running),
        (Running, NeedsRestart | ChildExited) => Some(Restarting),
        (Restarting, RestartsExhausted) => Some(Halted),
        (Running | Starting | Restarting, Stop) => Some(Stopping),
        (Stopping, Stopped) => Some(Halted),
        _ => None,
    }
}

/// Configuration for one supervised child process.
#[derive(Clone, Debug)]
pub struct StdioConfig {
    /// Argv of the child process, `command[0]` is the executable.
    pub command: Vec<String>,
    /// Working directory for the child; `None` inherits the supervisor's.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables merged into the child's environment.
    pub env: HashMap<String, String>,
    /// Hard memory ceiling in MiB; the child is killed and restarted past it.
    pub max_memory_mb: u64,
    /// Hard open-file-descriptor ceiling.
    pub max_file_descriptors: u64,
    /// CPU percentage above which a warning is logged (no restart).
    pub max_cpu_percent: f32,
    /// How often resource/heartbeat enforcement polls.
    pub heartbeat_interval: Duration,
    /// Maximum silence since the last heartbeat before the child is considered hung.
    pub hung_timeout: Duration,
    /// Seconds granted for graceful shutdown (SIGTERM) before a force-kill.
    pub stop_timeout: Duration,
    /// Restart attempts allowed before the supervisor gives up permanently.
    pub max_restart_attempts: u32,
    /// Per-request timeout for `send_request`.
    pub request_timeout: Duration,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            max_memory_mb: 1024,
            max_file_descriptors: 1024,
            max_cpu_percent: 80.0,
            heartbeat_interval: Duration::from_secs(1),
            hung_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(5),
            max_restart_attempts: 5,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// A point-in-time resource reading for the supervised child.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResourceSnapshot {
    /// Resident set size in bytes.
    pub rss_bytes: u64,
    /// Open file descriptor count.
    pub fd_count: u64,
    /// CPU utilization percentage (0-100, may exceed 100 on multi-core bursts).
    pub cpu_percent: f32,
}

/// The `StdioProcess` entity (§3): observable state of the supervised child.
#[derive(Clone, Debug, Default)]
pub struct StdioProcessInfo {
    /// Argv used to launch the child.
    pub command: Vec<String>,
    /// OS process id, once started.
    pub pid: Option<u32>,
    /// Seconds since UNIX epoch of the last observed heartbeat.
    pub last_heartbeat_unix: Option<u64>,
    /// Number of restarts performed so far.
    pub restart_count: u32,
    /// Most recent resource snapshot.
    pub last_snapshot: ResourceSnapshot,
}

/// Error raised once a transport has stopped and can no longer serve requests.
#[derive(Debug, thiserror::Error)]
#[error("stdio transport stopped: {reason}")]
pub struct TransportStopped {
    /// Human-readable reason the transport is no longer usable.
    pub reason: String,
}

struct PendingRequests {
    next_id: AtomicU64,
    waiters: Mutex<HashMap<u64, oneshot::Sender<Result<Value, TransportStopped>>>>,
}

impl PendingRequests {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn register(&self, id: u64) -> oneshot::Receiver<Result<Value, TransportStopped>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id, tx);
        rx
    }

    async fn complete(&self, id: u64, result: Result<Value, TransportStopped>) {
        if let Some(tx) = self.waiters.lock().await.remove(&id) {
            let _ = tx.send(result);
        }
    }

    async fn fail_all(&self, reason: &str) {
        let mut waiters = self.waiters.lock().await;
        for (_, tx) in waiters.drain() {
            let _ = tx.send(Err(TransportStopped {
                reason: reason.to_owned(),
            }));
        }
    }
}

/// A supervised stdio child process speaking newline-delimited JSON-RPC 2.0.
pub struct StdioTransport {
    config: StdioConfig,
    state: RwLock<StdioState>,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<tokio::process::ChildStdin>>,
    pending: Arc<PendingRequests>,
    info: RwLock<StdioProcessInfo>,
    last_heartbeat: Arc<tokio::sync::Mutex<std::time::Instant>>,
    shutting_down: Arc<std::sync::atomic::AtomicBool>,
}

impl StdioTransport {
    /// Creates a supervisor for the given configuration. The child is not
    /// started until [`start`](Self::start) is called.
    #[must_use]
    pub fn new(config: StdioConfig) -> Arc<Self> {
        Arc::new(Self {
            info: RwLock::new(StdioProcessInfo {
                command: config.command.clone(),
                ..Default::default()
            }),
            config,
            state: RwLock::new(StdioState::Stopped),
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            pending: Arc::new(PendingRequests::new()),
            last_heartbeat: Arc::new(tokio::sync::Mutex::new(std::time::Instant::now())),
            shutting_down: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }

    /// Returns the current supervisor state.
    pub async fn state(&self) -> StdioState {
        *self.state.read().await
    }

    /// Returns a snapshot of the `StdioProcess` entity.
    pub async fn info(&self) -> StdioProcessInfo {
        self.info.read().await.clone()
    }

    /// Starts the child process and the background reader/monitor tasks.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterErrorKind::Connection`] if the process cannot be spawned.
    pub async fn start(self: &Arc<Self>) -> AdapterResult<()> {
        self.transition(StdioEvent::Start).await;
        self.spawn_child().await?;
        self.transition(StdioEvent::Started).await;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.monitor_loop().await;
        });

        Ok(())
    }

    /// Applies `event` to the current state, logging the transition if it
    /// actually moves the state machine. Events with no matching arm leave
    /// the state unchanged.
    async fn transition(&self, event: StdioEvent) -> StdioState {
        let mut state = self.state.write().await;
        match next_state(*state, event) {
            Some(next) => {
                debug!(from = ?*state, to = ?next, ?event, "stdio transport state transition");
                *state = next;
            }
            None => {
                warn!(current = ?*state, ?event, "stdio transport ignored event with no valid transition");
            }
        }
        *state
    }

    async fn spawn_child(self: &Arc<Self>) -> AdapterResult<()> {
        let Some((program, args)) = self.config.command.split_first() else {
            return Err(AdapterError::new(
                AdapterErrorKind::Configuration,
                ADAPTER_NAME,
                "stdio command must not be empty",
            ));
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.config.env)
            .stdin(StdStdio::piped())
            .stdout(StdStdio::piped())
            .stderr(StdStdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|err| {
            AdapterError::new(
                AdapterErrorKind::Connection,
                ADAPTER_NAME,
                format!("failed to spawn stdio child: {err}"),
            )
        })?;

        let pid = child.id();
        let stdout = child.stdout.take().expect("piped stdout");
        let stdin = child.stdin.take().expect("piped stdin");
        let stderr = child.stderr.take().expect("piped stderr");

        *self.stdin.lock().await = Some(stdin);
        *self.child.lock().await = Some(child);
        {
            let mut info = self.info.write().await;
            info.pid = pid;
            info.last_heartbeat_unix = Some(unix_now());
        }
        *self.last_heartbeat.lock().await = std::time::Instant::now();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.read_loop(stdout).await;
        });

        let this_err = Arc::clone(self);
        tokio::spawn(async move {
            this_err.drain_stderr(stderr).await;
        });

        Ok(())
    }

    async fn drain_stderr(self: Arc<Self>, stderr: tokio::process::ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "sark_adapters::stdio", pid = ?self.info.read().await.pid, "{line}");
        }
    }

    async fn read_loop(self: Arc<Self>, stdout: tokio::process::ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    *self.last_heartbeat.lock().await = std::time::Instant::now();
                    {
                        let mut info = self.info.write().await;
                        info.last_heartbeat_unix = Some(unix_now());
                    }
                    self.handle_inbound_line(&line).await;
                }
                Ok(None) => {
                    // Child closed stdout: treat as an exit.
                    if !self.shutting_down.load(Ordering::SeqCst) {
                        self.on_child_exited().await;
                    }
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "stdio transport read error");
                    return;
                }
            }
        }
    }

    async fn handle_inbound_line(&self, line: &str) {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            warn!(%line, "discarding non-JSON-RPC line from stdio child");
            return;
        };

        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            if value.get("method").is_some() {
                // Server-initiated request: out of scope for this gateway,
                // acknowledge with a generic error so the child isn't stuck.
                return;
            }
            let result = if let Some(error) = value.get("error") {
                Err(TransportStopped {
                    reason: error.to_string(),
                })
            } else {
                Ok(value.get("result").cloned().unwrap_or(Value::Null))
            };
            self.pending.complete(id, result).await;
        }
        // Notifications (no `id`) from the child are observational only.
    }

    async fn on_child_exited(self: &Arc<Self>) {
        warn!("stdio child exited unexpectedly");
        self.transition(StdioEvent::ChildExited).await;
        self.pending.fail_all("child process exited").await;
        self.attempt_restart().await;
    }

    async fn monitor_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        let mut system = System::new();
        loop {
            interval.tick().await;
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            if *self.state.read().await != StdioState::Running {
                continue;
            }

            let since_heartbeat = self.last_heartbeat.lock().await.elapsed();
            if since_heartbeat > self.config.hung_timeout {
                warn!(?since_heartbeat, "stdio child hung, restarting");
                self.transition(StdioEvent::NeedsRestart).await;
                self.pending.fail_all("hung child restarted").await;
                self.attempt_restart().await;
                continue;
            }

            let Some(pid) = self.info.read().await.pid else {
                continue;
            };
            system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
            let Some(process) = system.process(Pid::from_u32(pid)) else {
                continue;
            };

            let rss_bytes = process.memory();
            let cpu_percent = process.cpu_usage();
            let fd_count = open_fd_count(pid);

            {
                let mut info = self.info.write().await;
                info.last_snapshot = ResourceSnapshot {
                    rss_bytes,
                    fd_count,
                    cpu_percent,
                };
            }

            let max_memory_bytes = self.config.max_memory_mb * 1024 * 1024;
            if rss_bytes > max_memory_bytes {
                warn!(rss_bytes, max_memory_bytes, "stdio child exceeded memory limit");
                self.transition(StdioEvent::NeedsRestart).await;
                self.pending.fail_all("memory limit exceeded").await;
                self.attempt_restart().await;
                continue;
            }
            if fd_count > self.config.max_file_descriptors {
                warn!(fd_count, limit = self.config.max_file_descriptors, "stdio child exceeded fd limit");
                self.transition(StdioEvent::NeedsRestart).await;
                self.pending.fail_all("file descriptor limit exceeded").await;
                self.attempt_restart().await;
                continue;
            }
            if cpu_percent > self.config.max_cpu_percent {
                warn!(cpu_percent, limit = self.config.max_cpu_percent, "stdio child exceeded cpu warning threshold");
            }
        }
    }

    async fn attempt_restart(self: &Arc<Self>) {
        let restart_count = {
            let mut info = self.info.write().await;
            info.restart_count += 1;
            info.restart_count
        };

        if restart_count > self.config.max_restart_attempts {
            warn!(restart_count, "stdio child exhausted restart budget, stopping permanently");
            self.force_kill().await;
            self.transition(StdioEvent::RestartsExhausted).await;
            self.shutting_down.store(true, Ordering::SeqCst);
            return;
        }

        self.force_kill().await;
        match self.spawn_child().await {
            Ok(()) => {
                self.transition(StdioEvent::Started).await;
            }
            Err(err) => {
                warn!(error = %err, "stdio child restart failed");
                self.transition(StdioEvent::RestartsExhausted).await;
            }
        }
    }

    async fn force_kill(&self) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            let _ = child.kill().await;
        }
    }

    /// Gracefully stops the child: SIGTERM, wait up to `stop_timeout`, then
    /// force-kill. Every pending request's future completes with
    /// [`TransportStopped`].
    pub async fn stop(self: &Arc<Self>) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.transition(StdioEvent::Stop).await;

        let pid = self.info.read().await.pid;
        if let Some(pid) = pid {
            // SAFETY: sending a signal to a pid we own via the spawned child handle.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }

        let waited = tokio_timeout(self.config.stop_timeout, self.wait_for_exit()).await;
        if waited.is_err() {
            self.force_kill().await;
        }

        self.pending.fail_all("transport stopped").await;
        self.transition(StdioEvent::Stopped).await;
    }

    async fn wait_for_exit(&self) {
        loop {
            let mut guard = self.child.lock().await;
            if let Some(child) = guard.as_mut() {
                match child.try_wait() {
                    Ok(Some(_)) => return,
                    Ok(None) => {}
                    Err(_) => return,
                }
            } else {
                return;
            }
            drop(guard);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Sends a JSON-RPC request and awaits its correlated response.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterErrorKind::Timeout`] if no response arrives within
    /// the configured request timeout, or an [`AdapterErrorKind::Connection`]
    /// error if the transport has stopped.
    pub async fn send_request(&self, method: &str, params: Value) -> AdapterResult<Value> {
        if *self.state.read().await != StdioState::Running {
            return Err(AdapterError::new(
                AdapterErrorKind::Connection,
                ADAPTER_NAME,
                "stdio transport is not running",
            ));
        }

        let id = self.pending.allocate_id();
        let rx = self.pending.register(id).await;

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.write_line(&frame).await?;

        match tokio_timeout(self.config.request_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(stopped))) => Err(AdapterError::new(
                AdapterErrorKind::Connection,
                ADAPTER_NAME,
                stopped.reason,
            )),
            Ok(Err(_canceled)) => Err(AdapterError::new(
                AdapterErrorKind::Connection,
                ADAPTER_NAME,
                "stdio transport dropped the pending request",
            )),
            Err(_elapsed) => Err(AdapterError::new(
                AdapterErrorKind::Timeout,
                ADAPTER_NAME,
                format!("stdio request `{method}` timed out"),
            )),
        }
    }

    /// Sends a JSON-RPC notification (no response expected).
    ///
    /// # Errors
    ///
    /// Returns [`AdapterErrorKind::Connection`] if the write fails.
    pub async fn send_notification(&self, method: &str, params: Value) -> AdapterResult<()> {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.write_line(&frame).await
    }

    async fn write_line(&self, frame: &Value) -> AdapterResult<()> {
        let mut line = serde_json::to_vec(frame).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Protocol, ADAPTER_NAME, err.to_string())
        })?;
        line.push(b'\n');

        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(AdapterError::new(
                AdapterErrorKind::Connection,
                ADAPTER_NAME,
                "stdio transport has no active stdin handle",
            ));
        };
        stdin.write_all(&line).await.map_err(|err| {
            AdapterError::new(
                AdapterErrorKind::Connection,
                ADAPTER_NAME,
                format!("failed to write to stdio child: {err}"),
            )
        })?;
        stdin.flush().await.ok();
        *self.last_heartbeat.lock().await = std::time::Instant::now();
        Ok(())
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(target_os = "linux")]
fn open_fd_count(pid: u32) -> u64 {
    std::fs::read_dir(format!("/proc/{pid}/fd"))
        .map(|entries| entries.count() as u64)
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn open_fd_count(_pid: u32) -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_to_running_flow() {
        let state = next_state(StdioState::Stopped, StdioEvent::Start).unwrap();
        assert_eq!(state, StdioState::Starting);
        let state = next_state(state, StdioEvent::Started).unwrap();
        assert_eq!(state, StdioState::Running);
    }

    #[test]
    fn hung_child_restarts_then_recovers() {
        let state = next_state(StdioState::Running, StdioEvent::NeedsRestart).unwrap();
        assert_eq!(state, StdioState::Restarting);
        let state = next_state(state, StdioEvent::Started).unwrap();
        assert_eq!(state, StdioState::Running);
    }

    #[test]
    fn exhausted_restart_budget_stops_for_good() {
        let state = next_state(StdioState::Restarting, StdioEvent::RestartsExhausted).unwrap();
        assert_eq!(state, StdioState::Stopped);
    }

    #[test]
    fn started_event_while_stopped_is_rejected() {
        assert!(next_state(StdioState::Stopped, StdioEvent::Started).is_none());
    }

    fn echo_config() -> StdioConfig {
        StdioConfig {
            command: vec!["cat".to_owned()],
            hung_timeout: Duration::from_millis(200),
            heartbeat_interval: Duration::from_millis(20),
            request_timeout: Duration::from_millis(500),
            max_restart_attempts: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rejects_empty_command() {
        let transport = StdioTransport::new(StdioConfig::default());
        let err = transport.start().await.expect_err("empty command should fail");
        assert_eq!(err.kind(), AdapterErrorKind::Configuration);
    }

    #[tokio::test]
    async fn starts_and_stops_cleanly() {
        let transport = StdioTransport::new(echo_config());
        transport.start().await.expect("start");
        assert_eq!(transport.state().await, StdioState::Running);
        transport.stop().await;
        assert_eq!(transport.state().await, StdioState::Stopped);
    }
}
