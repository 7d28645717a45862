//! Control plane configuration
//!
//! Every component receives a [`ControlConfig`] at construction. Nothing reads
//! the process working directory or global state after startup.
//!
//! The file format is JSON; every field is optional and falls back to the
//! defaults below. Relative paths are resolved against `root_dir`.

use crate::utils::{get_config_dir, write_atomic};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Config directory not available")]
    ConfigDirUnavailable,

    #[error("Config already exists at {0} (use --force to overwrite)")]
    AlreadyExists(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How mutating filtering-program commands gain root
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ElevationMethod {
    /// Direct when running as root, otherwise `sudo -n`, then `pkexec`
    #[default]
    Auto,
    Sudo,
    Run0,
    Pkexec,
    /// Never elevate (root deployments, tests)
    None,
}

/// Timeouts and readiness polling, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Limit for `--status`, `--add`, `--del` and the kill sweep
    pub command_ms: u64,
    /// How long `start` waits for the filter to report ONLINE
    pub start_ms: u64,
    /// How long `stop` waits for the filter to report OFFLINE
    pub stop_ms: u64,
    /// First readiness poll interval; doubles up to `poll_max_ms`
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_ms: 10_000,
            start_ms: 10_000,
            stop_ms: 5_000,
            poll_initial_ms: 100,
            poll_max_ms: 1_000,
        }
    }
}

impl Timeouts {
    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_millis(self.stop_ms)
    }

    pub fn poll_initial(&self) -> Duration {
        Duration::from_millis(self.poll_initial_ms.max(1))
    }

    pub fn poll_max(&self) -> Duration {
        Duration::from_millis(self.poll_max_ms.max(self.poll_initial_ms).max(1))
    }
}

/// Complete control plane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// HTTP listen address
    pub listen: SocketAddr,
    /// Base directory for every relative path below
    pub root_dir: PathBuf,
    /// Persisted `{ports, lastUpdateTs}` record
    pub state_file: PathBuf,
    /// Live configuration written by the filtering program
    pub firewall_conf: PathBuf,
    /// Filtering program script
    pub program: PathBuf,
    /// Interpreter used to run `program`
    pub interpreter: String,
    /// Log written by the filtering program, served by `/api/logs`
    pub log_file: PathBuf,
    pub static_dir: PathBuf,
    /// Served for `GET /`
    pub index_file: String,
    /// Interface used by `start` when the request names none
    pub default_interface: String,
    pub elevation: ElevationMethod,
    /// Overrides the `pkill -f` pattern used by `stop`
    pub kill_pattern: Option<String>,
    /// Audit log path; defaults to the XDG state directory
    pub audit_log: Option<PathBuf>,
    pub timeouts: Timeouts,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            root_dir: PathBuf::from("."),
            state_file: PathBuf::from("data.json"),
            firewall_conf: PathBuf::from("firewall.conf"),
            program: PathBuf::from("firewall.py"),
            interpreter: "python3".to_string(),
            log_file: PathBuf::from("firewall.log"),
            static_dir: PathBuf::from("."),
            index_file: "fd.html".to_string(),
            default_interface: "lo".to_string(),
            elevation: ElevationMethod::Auto,
            kill_pattern: None,
            audit_log: None,
            timeouts: Timeouts::default(),
        }
    }
}

impl ControlConfig {
    /// Creates a default config rooted at `root_dir`.
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Resolves a configured path against `root_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.resolve(&self.state_file)
    }

    pub fn firewall_conf_path(&self) -> PathBuf {
        self.resolve(&self.firewall_conf)
    }

    pub fn program_path(&self) -> PathBuf {
        self.resolve(&self.program)
    }

    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.log_file)
    }

    pub fn static_path(&self) -> PathBuf {
        self.resolve(&self.static_dir)
    }

    /// Pattern matching every `--run` instance of the filtering program.
    ///
    /// The `[-]` bracket keeps the pattern from matching the command line of
    /// the `sudo pkill` invocation that carries it.
    pub fn kill_pattern(&self) -> String {
        self.kill_pattern
            .clone()
            .unwrap_or_else(|| format!("{}.*[-]-run", self.program_path().display()))
    }

    /// Applies the `PORT` environment variable to the listen address.
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            self.listen.set_port(port);
        }
    }
}

/// Default location of the config file (`~/.config/portgate/config.json`).
pub fn default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.json"))
}

/// Loads configuration.
///
/// An explicit path must exist and parse. Without one, the XDG config file is
/// used when present and defaults otherwise.
pub async fn load_config(path: Option<&Path>) -> Result<ControlConfig, ConfigError> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(ControlConfig::default()),
        },
    };

    let json = match tokio::fs::read_to_string(&path).await {
        Ok(json) => json,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ControlConfig::default());
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };

    serde_json::from_str(&json).map_err(|source| ConfigError::Parse { path, source })
}

/// Saves the config using the atomic write pattern.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub async fn save_config(
    config: &ControlConfig,
    path: &Path,
    force: bool,
) -> Result<(), ConfigError> {
    if !force && tokio::fs::try_exists(path).await? {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    write_atomic(path, json.into_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_legacy_layout() {
        let config = ControlConfig::default();
        assert_eq!(config.listen.port(), 3000);
        assert_eq!(config.default_interface, "lo");
        assert_eq!(config.interpreter, "python3");
        assert_eq!(config.state_path(), PathBuf::from("./data.json"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ControlConfig =
            serde_json::from_str(r#"{"root_dir": "/srv/fw", "timeouts": {"start_ms": 2500}}"#)
                .unwrap();
        assert_eq!(config.firewall_conf_path(), PathBuf::from("/srv/fw/firewall.conf"));
        assert_eq!(config.timeouts.start_ms, 2500);
        assert_eq!(config.timeouts.stop_ms, 5000);
    }

    #[test]
    fn test_absolute_paths_are_not_rebased() {
        let mut config = ControlConfig::with_root("/srv/fw");
        config.log_file = PathBuf::from("/var/log/firewall.log");
        assert_eq!(config.log_path(), PathBuf::from("/var/log/firewall.log"));
    }

    #[test]
    fn test_kill_pattern_does_not_match_itself() {
        let config = ControlConfig::with_root("/srv/fw");
        let pattern = config.kill_pattern();
        assert_eq!(pattern, "/srv/fw/firewall.py.*[-]-run");
        assert!(!pattern.contains("--run"));
    }

    #[test]
    fn test_elevation_method_parsing() {
        assert_eq!("SUDO".parse::<ElevationMethod>().unwrap(), ElevationMethod::Sudo);
        assert_eq!(ElevationMethod::None.to_string(), "none");
        assert!("doas".parse::<ElevationMethod>().is_err());
    }

    #[test]
    fn test_poll_max_never_below_initial() {
        let timeouts = Timeouts {
            poll_initial_ms: 500,
            poll_max_ms: 100,
            ..Timeouts::default()
        };
        assert_eq!(timeouts.poll_max(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_explicit_missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("missing.json"))).await;
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = ControlConfig::with_root("/opt/firewall");

        save_config(&config, &path, false).await.unwrap();
        let loaded = load_config(Some(&path)).await.unwrap();
        assert_eq!(loaded.root_dir, PathBuf::from("/opt/firewall"));

        let again = save_config(&config, &path, false).await;
        assert!(matches!(again, Err(ConfigError::AlreadyExists(_))));
        save_config(&config, &path, true).await.unwrap();
    }
}
