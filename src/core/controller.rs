//! Lifecycle of the long-running filter process
//!
//! The controller owns at most one `--run` child. Start and stop hold a single
//! async mutex for their whole duration, so two requests can never both pass
//! the "not already ONLINE" check, and a stop can never interleave with a
//! start that is still waiting for readiness.
//!
//! ```text
//!            start()                   ready
//! STOPPED ───────────▶ STARTING ───────────────▶ RUNNING
//!    ▲                    │ exit / timeout          │
//!    │◀───────────────────┘                         │ stop()
//!    │                  OFFLINE                     ▼
//!    └───────────────────────────────────────── STOPPING
//! ```
//!
//! Readiness is a bounded polling loop on `--status` with exponential
//! backoff. Stop signals the held child, then sweeps for instances started by
//! an earlier server process with a `pkill -f` pattern.

use crate::audit::{AuditLog, EventType};
use crate::core::error::{Error, Result};
use crate::core::logs::tail_lines;
use crate::core::program::{FilterProgram, FirewallStatus};
use crate::validators::{interface_exists, validate_interface};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::PoisonError;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lines of filter stderr kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// How long a signalled filter gets before SIGKILL
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ControllerPhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Observable controller state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerState {
    pub phase: ControllerPhase,
    /// Interface of the filter this process started, if any
    pub interface: Option<String>,
}

impl ControllerState {
    fn stopped() -> Self {
        Self {
            phase: ControllerPhase::Stopped,
            interface: None,
        }
    }
}

/// Result of a start or stop request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlOutcome {
    pub status: FirewallStatus,
    pub message: String,
}

/// A filter child started by this process.
struct FilterHandle {
    child: Child,
    pid: Option<u32>,
    interface: String,
    /// File the child's stderr is appended to
    log_path: PathBuf,
    /// Length of that file when the child was spawned
    log_offset: u64,
}

impl FilterHandle {
    fn new(child: Child, interface: &str, log_path: PathBuf, log_offset: u64) -> Self {
        Self {
            pid: child.id(),
            child,
            interface: interface.to_string(),
            log_path,
            log_offset,
        }
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Last lines the log file gained since the child was spawned.
    async fn stderr_tail(&self) -> String {
        let bytes = match tokio::fs::read(&self.log_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Cannot read filter output from {}: {e}", self.log_path.display());
                return String::new();
            }
        };
        let start = usize::try_from(self.log_offset)
            .unwrap_or(usize::MAX)
            .min(bytes.len());
        tail_lines(&String::from_utf8_lossy(&bytes[start..]), STDERR_TAIL_LINES).join("\n")
    }

    fn signal(&self, signal: nix::sys::signal::Signal) -> nix::Result<()> {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Some(pid) = self.pid.and_then(|p| i32::try_from(p).ok()) else {
            return Ok(());
        };
        kill(Pid::from_raw(pid), signal)
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL. Returns the stderr tail.
    async fn terminate(mut self, grace: Duration) -> String {
        if let Ok(None) = self.try_wait() {
            if let Err(e) = self.signal(nix::sys::signal::Signal::SIGTERM) {
                debug!("SIGTERM to filter pid {:?} failed: {e}", self.pid);
            }
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => info!("Filter on {} exited: {status}", self.interface),
                Ok(Err(e)) => warn!("Failed to reap filter: {e}"),
                Err(_) => {
                    warn!("Filter did not exit within {grace:?}, sending SIGKILL");
                    if let Err(e) = self.child.kill().await {
                        warn!("SIGKILL failed: {e}");
                    }
                }
            }
        }
        self.stderr_tail().await
    }
}

pub struct FirewallController {
    program: FilterProgram,
    audit: AuditLog,
    /// Held for the entire duration of start and stop
    handle: Mutex<Option<FilterHandle>>,
    state: std::sync::Mutex<ControllerState>,
}

impl FirewallController {
    pub fn new(program: FilterProgram, audit: AuditLog) -> Self {
        Self {
            program,
            audit,
            handle: Mutex::new(None),
            state: std::sync::Mutex::new(ControllerState::stopped()),
        }
    }

    pub fn program(&self) -> &FilterProgram {
        &self.program
    }

    fn set_state(&self, phase: ControllerPhase, interface: Option<String>) {
        debug!("Controller phase -> {phase}");
        Self::store_state(&self.state, ControllerState { phase, interface });
    }

    fn store_state(cell: &std::sync::Mutex<ControllerState>, state: ControllerState) {
        *cell.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn load_state(&self) -> ControllerState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current state. Notices a held filter that exited on its own, unless a
    /// start or stop is in progress.
    pub fn state(&self) -> ControllerState {
        if let Ok(mut handle) = self.handle.try_lock() {
            Self::reap(&mut handle, &self.state);
        }
        self.load_state()
    }

    pub fn phase(&self) -> ControllerPhase {
        self.state().phase
    }

    pub fn running_interface(&self) -> Option<String> {
        self.state().interface
    }

    fn reap(handle: &mut Option<FilterHandle>, state: &std::sync::Mutex<ControllerState>) {
        let exited = match handle.as_mut().map(FilterHandle::try_wait) {
            Some(Ok(Some(status))) => Some(status.to_string()),
            Some(Err(e)) => Some(e.to_string()),
            _ => None,
        };
        if let Some(reason) = exited {
            warn!("Filter process exited on its own: {reason}");
            *handle = None;
            Self::store_state(state, ControllerState::stopped());
        }
    }

    /// Starts the filter on `interface` and waits until it reports ONLINE.
    pub async fn start(&self, interface: &str) -> Result<ControlOutcome> {
        let interface = validate_interface(interface).map_err(|m| Error::validation("iface", m))?;

        let mut handle = self.handle.lock().await;
        Self::reap(&mut handle, &self.state);

        if self.program.status().await == FirewallStatus::Online {
            if self.load_state().phase != ControllerPhase::Running {
                let held = handle.as_ref().map(|h| h.interface.clone());
                self.set_state(ControllerPhase::Running, held);
            }
            return Err(Error::Conflict("Firewall already running".to_string()));
        }

        let previous = self.load_state();
        self.set_state(ControllerPhase::Starting, Some(interface.clone()));

        if !interface_exists(&interface) {
            Self::store_state(&self.state, previous);
            return Err(Error::validation(
                "iface",
                format!("Network interface '{interface}' does not exist"),
            ));
        }

        // A child we still hold but that is not ONLINE is a broken filter
        if let Some(stale) = handle.take() {
            warn!("Replacing unresponsive filter on {}", stale.interface);
            stale.terminate(TERMINATE_GRACE).await;
        }

        let operation_id = Uuid::new_v4();
        info!(%operation_id, "Starting firewall on {interface}");

        match self.launch(&interface).await {
            Ok(filter) => {
                *handle = Some(filter);
                self.set_state(ControllerPhase::Running, Some(interface.clone()));
                info!(%operation_id, "Firewall ONLINE on {interface}");
                self.audit
                    .record(
                        operation_id,
                        EventType::StartFirewall,
                        true,
                        serde_json::json!({ "iface": interface }),
                        None,
                    )
                    .await;
                Ok(ControlOutcome {
                    status: FirewallStatus::Online,
                    message: "Firewall started".to_string(),
                })
            }
            Err(e) => {
                self.set_state(ControllerPhase::Stopped, None);
                warn!(%operation_id, "Firewall start failed: {e}");
                self.audit
                    .record(
                        operation_id,
                        EventType::StartFirewall,
                        false,
                        serde_json::json!({ "iface": interface }),
                        Some(e.to_string()),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Spawns `--run` and polls until ONLINE, early exit, or the start timeout.
    async fn launch(&self, interface: &str) -> Result<FilterHandle> {
        let timeouts = &self.program.config().timeouts;
        let log_path = self.program.config().log_path();
        let log_offset = tokio::fs::metadata(&log_path)
            .await
            .map_or(0, |m| m.len());
        let child = self.program.spawn_run(interface)?;
        let mut filter = FilterHandle::new(child, interface, log_path, log_offset);

        let deadline = Instant::now() + timeouts.start();
        let mut delay = timeouts.poll_initial();

        loop {
            if let Some(status) = filter.try_wait()? {
                let tail = filter.stderr_tail().await;
                if tail.trim().is_empty() {
                    return Err(Error::Execution {
                        message: format!("Filter exited ({status}) before reporting ONLINE"),
                        stderr: None,
                        exit_code: status.code(),
                    });
                }
                return Err(Error::execution(&tail, status.code()));
            }

            if self.program.status().await == FirewallStatus::Online {
                return Ok(filter);
            }

            let now = Instant::now();
            if now >= deadline {
                let tail = filter.terminate(TERMINATE_GRACE).await;
                return Err(Error::Execution {
                    message: format!(
                        "Filter did not report ONLINE within {}ms",
                        timeouts.start().as_millis()
                    ),
                    stderr: (!tail.trim().is_empty()).then_some(tail),
                    exit_code: None,
                });
            }

            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(timeouts.poll_max());
        }
    }

    /// Stops every filter instance and waits until status reports OFFLINE.
    pub async fn stop(&self) -> Result<ControlOutcome> {
        let mut handle = self.handle.lock().await;
        Self::reap(&mut handle, &self.state);

        let operation_id = Uuid::new_v4();
        let previous = self.load_state();
        info!(%operation_id, "Stopping firewall");
        self.set_state(ControllerPhase::Stopping, previous.interface.clone());

        let held = if let Some(filter) = handle.take() {
            filter.terminate(TERMINATE_GRACE).await;
            true
        } else {
            false
        };

        let swept = match self.program.terminate_matching().await {
            Ok(matched) => matched,
            Err(e) if held => {
                warn!(%operation_id, "Pattern sweep failed after stopping held filter: {e}");
                false
            }
            Err(e) => {
                let status = self.program.status().await;
                let phase = if status == FirewallStatus::Online {
                    ControllerPhase::Running
                } else {
                    ControllerPhase::Stopped
                };
                self.set_state(phase, previous.interface);
                self.audit
                    .record(
                        operation_id,
                        EventType::StopFirewall,
                        false,
                        serde_json::json!({}),
                        Some(e.to_string()),
                    )
                    .await;
                return Err(e);
            }
        };

        let status = self
            .wait_for(FirewallStatus::Offline, self.program.config().timeouts.stop())
            .await;

        let message = match status {
            FirewallStatus::Offline if held || swept => "Firewall stopped",
            FirewallStatus::Offline => "Firewall was not running",
            FirewallStatus::Online => "Stop signal sent but firewall still reports ONLINE",
        };

        if status == FirewallStatus::Online {
            warn!(%operation_id, "{message}");
            self.set_state(ControllerPhase::Running, None);
        } else {
            info!(%operation_id, "{message}");
            self.set_state(ControllerPhase::Stopped, None);
        }

        self.audit
            .record(
                operation_id,
                EventType::StopFirewall,
                status == FirewallStatus::Offline,
                serde_json::json!({ "held": held, "swept": swept }),
                None,
            )
            .await;

        Ok(ControlOutcome {
            status,
            message: message.to_string(),
        })
    }

    /// Polls status with backoff until it equals `target` or `limit` elapses.
    async fn wait_for(&self, target: FirewallStatus, limit: Duration) -> FirewallStatus {
        let timeouts = &self.program.config().timeouts;
        let deadline = Instant::now() + limit;
        let mut delay = timeouts.poll_initial();

        loop {
            let status = self.program.status().await;
            let now = Instant::now();
            if status == target || now >= deadline {
                return status;
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(timeouts.poll_max());
        }
    }
}
