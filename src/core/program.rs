//! Invocation of the external filtering program
//!
//! The program is run as `<interpreter> <program> <args>` with the configured
//! root directory as working directory. Commands that change eBPF/XDP state
//! go through [`crate::elevation`]; `--status` runs unprivileged.
//!
//! Every short-lived invocation is bounded by `timeouts.command_ms`. Expiry
//! kills the child and surfaces as [`Error::Execution`].

use crate::config::ControlConfig;
use crate::core::error::{Error, Result};
use crate::core::ports::Port;
use crate::elevation::build_elevated_command;
use serde::Serialize;
use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// Status reported by `--status`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum FirewallStatus {
    Online,
    Offline,
}

impl FirewallStatus {
    /// Only an exact `ONLINE` (after trimming) counts as online.
    pub fn from_output(stdout: &str) -> Self {
        if stdout.trim() == "ONLINE" {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

/// One filtering-program command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    Status,
    Add(Port),
    Delete(Port),
    Run(&'a str),
}

impl Operation<'_> {
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Status => vec!["--status".into()],
            Self::Add(port) => vec!["--add".into(), port.to_string()],
            Self::Delete(port) => vec!["--del".into(), port.to_string()],
            Self::Run(iface) => vec!["--run".into(), (*iface).to_string()],
        }
    }

    /// Mutating commands load or rewrite eBPF state and need root.
    pub fn requires_privilege(&self) -> bool {
        !matches!(self, Self::Status)
    }
}

/// Captured output of a completed invocation.
#[derive(Debug, Clone, Default)]
pub struct ProgramOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Handle on the filtering program described by a [`ControlConfig`].
#[derive(Clone)]
pub struct FilterProgram {
    config: Arc<ControlConfig>,
}

impl FilterProgram {
    pub fn new(config: Arc<ControlConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Builds the command for `op`, elevated when required.
    fn command(&self, op: &Operation<'_>) -> Result<Command> {
        let program = self.config.program_path();
        let args = op.args();

        let mut cmd = if op.requires_privilege() {
            let mut full: Vec<&OsStr> = vec![program.as_os_str()];
            full.extend(args.iter().map(OsStr::new));
            build_elevated_command(
                self.config.elevation,
                OsStr::new(&self.config.interpreter),
                &full,
            )?
        } else {
            let mut cmd = Command::new(&self.config.interpreter);
            cmd.arg(&program).args(&args);
            cmd
        };

        cmd.current_dir(&self.config.root_dir).stdin(Stdio::null());
        Ok(cmd)
    }

    /// Runs a short-lived command to completion.
    pub async fn invoke(&self, op: Operation<'_>) -> Result<ProgramOutput> {
        debug!("Invoking filtering program: {:?}", op.args());

        let child = self
            .command(&op)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("Failed to spawn filtering program: {e}");
                Error::Execution {
                    message: format!("Failed to spawn filtering program: {e}"),
                    stderr: None,
                    exit_code: None,
                }
            })?;

        let limit = self.config.timeouts.command();
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("Filtering program {:?} timed out after {limit:?}", op.args());
                return Err(Error::Execution {
                    message: format!(
                        "Filtering program timed out after {}ms",
                        limit.as_millis()
                    ),
                    stderr: None,
                    exit_code: None,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(ProgramOutput { stdout, stderr })
        } else {
            if op.requires_privilege() {
                error!("Filtering program {:?} failed: {}", op.args(), stderr.trim());
            }
            Err(Error::execution(&stderr, output.status.code()))
        }
    }

    /// Live status. Never fails: any error is treated as OFFLINE.
    pub async fn status(&self) -> FirewallStatus {
        match self.invoke(Operation::Status).await {
            Ok(output) => FirewallStatus::from_output(&output.stdout),
            Err(e) => {
                debug!("Status query failed, reporting OFFLINE: {e}");
                FirewallStatus::Offline
            }
        }
    }

    /// Spawns the long-running `--run <iface>` filter without waiting for it.
    ///
    /// stdout is discarded and stderr is appended to the log file, so the
    /// filter never writes into a pipe that dies with this process. It runs in
    /// its own process group and does not receive the terminal's Ctrl-C.
    pub fn spawn_run(&self, iface: &str) -> Result<Child> {
        let op = Operation::Run(iface);
        info!("Launching filter: {:?}", op.args());

        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.config.log_path())?;

        self.command(&op)?
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .process_group(0)
            .spawn()
            .map_err(|e| {
                error!("Failed to spawn filter: {e}");
                Error::Execution {
                    message: format!("Failed to spawn filter: {e}"),
                    stderr: None,
                    exit_code: None,
                }
            })
    }

    /// Sends SIGTERM to every `--run` instance matching the kill pattern,
    /// including ones started by an earlier server process.
    ///
    /// Returns whether anything matched.
    pub async fn terminate_matching(&self) -> Result<bool> {
        let pattern = self.config.kill_pattern();
        let args = [OsStr::new("-TERM"), OsStr::new("-f"), OsStr::new(&pattern)];

        let mut cmd = build_elevated_command(self.config.elevation, OsStr::new("pkill"), &args)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("pkill not found, cannot sweep for filter processes started elsewhere");
                return Ok(false);
            }
            Err(e) => {
                return Err(Error::Execution {
                    message: format!("Failed to spawn pkill: {e}"),
                    stderr: None,
                    exit_code: None,
                });
            }
        };

        let limit = self.config.timeouts.command();
        let output = tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| Error::Execution {
                message: format!("pkill timed out after {}ms", limit.as_millis()),
                stderr: None,
                exit_code: None,
            })??;

        // pkill: 0 = signalled, 1 = nothing matched. The elevation wrapper
        // also exits 1 when it refuses, but then it says so on stderr.
        let stderr = String::from_utf8_lossy(&output.stderr);
        match output.status.code() {
            Some(0) => {
                info!("Sent SIGTERM to filter processes matching {pattern:?}");
                Ok(true)
            }
            Some(1) if stderr.trim().is_empty() => Ok(false),
            code => {
                error!("Pattern sweep failed: {}", stderr.trim());
                Err(Error::execution(&stderr, code))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::MockFirewall;

    fn program(mock: &MockFirewall) -> FilterProgram {
        FilterProgram::new(Arc::new(mock.config()))
    }

    #[test]
    fn test_status_parsing_is_exact() {
        assert_eq!(FirewallStatus::from_output("ONLINE\n"), FirewallStatus::Online);
        assert_eq!(FirewallStatus::from_output("  ONLINE  "), FirewallStatus::Online);
        assert_eq!(FirewallStatus::from_output("online"), FirewallStatus::Offline);
        assert_eq!(FirewallStatus::from_output("ONLINE?"), FirewallStatus::Offline);
        assert_eq!(FirewallStatus::from_output(""), FirewallStatus::Offline);
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&FirewallStatus::Online).unwrap(), "\"ONLINE\"");
        assert_eq!(FirewallStatus::Offline.to_string(), "OFFLINE");
    }

    #[test]
    fn test_operation_arguments() {
        let port = Port::new(8080).unwrap();
        assert_eq!(Operation::Add(port).args(), vec!["--add", "8080"]);
        assert_eq!(Operation::Delete(port).args(), vec!["--del", "8080"]);
        assert_eq!(Operation::Run("eth0").args(), vec!["--run", "eth0"]);
        assert!(!Operation::Status.requires_privilege());
        assert!(Operation::Run("lo").requires_privilege());
    }

    #[tokio::test]
    async fn test_status_from_mock() {
        let mock = MockFirewall::new();
        let program = program(&mock);

        assert_eq!(program.status().await, FirewallStatus::Offline);
        mock.set_online(true);
        assert_eq!(program.status().await, FirewallStatus::Online);
    }

    #[tokio::test]
    async fn test_missing_program_is_offline() {
        let mock = MockFirewall::new();
        let mut config = mock.config();
        config.program = "does_not_exist.sh".into();
        let program = FilterProgram::new(Arc::new(config));

        assert_eq!(program.status().await, FirewallStatus::Offline);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_execution_error() {
        let mock = MockFirewall::new();
        let mut config = mock.config();
        config.interpreter = "portgate_no_such_interpreter".into();
        let program = FilterProgram::new(Arc::new(config));

        let err = program.invoke(Operation::Status).await.unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
        assert_eq!(program.status().await, FirewallStatus::Offline);
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let mock = MockFirewall::new();
        mock.fail_with("Permission denied: need root");
        let program = program(&mock);

        let err = program
            .invoke(Operation::Add(Port::new(9000).unwrap()))
            .await
            .unwrap_err();
        assert_eq!(err.stderr(), Some("Permission denied: need root"));
        assert!(matches!(err, Error::Execution { exit_code: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_execution_error() {
        let mock = MockFirewall::new();
        std::fs::write(mock.path("slow.sh"), "sleep 5\n").unwrap();
        let mut config = mock.config();
        config.program = "slow.sh".into();
        config.timeouts.command_ms = 100;
        let program = FilterProgram::new(Arc::new(config));

        let started = std::time::Instant::now();
        let err = program.invoke(Operation::Status).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < std::time::Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_add_updates_live_config() {
        let mock = MockFirewall::new();
        let program = program(&mock);

        program.invoke(Operation::Add(Port::new(8443).unwrap())).await.unwrap();
        assert!(mock.read_conf().contains("custom_ports = 8443"));
        assert_eq!(mock.count("--add"), 1);
    }

    #[tokio::test]
    async fn test_terminate_matching_with_nothing_running() {
        let mock = MockFirewall::new();
        let program = program(&mock);

        assert!(!program.terminate_matching().await.unwrap());
    }
}
