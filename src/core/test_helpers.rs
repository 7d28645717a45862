//! Shared test utilities for core module tests
//!
//! Provides a throwaway filtering-program environment so tests never touch a
//! real eBPF filter or require elevation. This module is only compiled in test mode.

use crate::config::{ControlConfig, ElevationMethod, Timeouts};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Mutex for tests that need exclusive access to environment variables.
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("PORTGATE_ELEVATION_METHOD", "sudo");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("PORTGATE_ELEVATION_METHOD");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

const MOCK_SCRIPT: &str = include_str!("../../tests/mock_firewall.sh");

/// A temporary root directory holding the mock filtering program.
///
/// The mock keeps all of its state in files next to the script, so every test
/// gets an isolated filter. See `tests/mock_firewall.sh` for the knobs.
pub struct MockFirewall {
    dir: TempDir,
}

impl MockFirewall {
    /// Creates the environment with `default_ports = 22,80` and no custom ports.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join("mock_firewall.sh"), MOCK_SCRIPT).expect("write mock");
        let mock = Self { dir };
        mock.write_conf("default_ports = 22,80\ncustom_ports = \n");
        mock
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Config pointing at the mock with short timeouts and no elevation.
    pub fn config(&self) -> ControlConfig {
        ControlConfig {
            root_dir: self.root().to_path_buf(),
            program: PathBuf::from("mock_firewall.sh"),
            interpreter: "sh".to_string(),
            audit_log: Some(self.path("audit.log")),
            elevation: ElevationMethod::None,
            timeouts: Timeouts {
                command_ms: 5_000,
                start_ms: 3_000,
                stop_ms: 3_000,
                poll_initial_ms: 20,
                poll_max_ms: 200,
            },
            ..ControlConfig::default()
        }
    }

    pub fn write_conf(&self, contents: &str) {
        std::fs::write(self.path("firewall.conf"), contents).expect("write firewall.conf");
    }

    pub fn read_conf(&self) -> String {
        std::fs::read_to_string(self.path("firewall.conf")).unwrap_or_default()
    }

    /// Makes every mutating command fail with `stderr`.
    pub fn fail_with(&self, stderr: &str) {
        std::fs::write(self.path("fail"), stderr).expect("write fail marker");
    }

    /// Pretends a filter started by someone else is running.
    pub fn set_online(&self, online: bool) {
        let marker = self.path("running");
        if online {
            std::fs::write(marker, "").expect("write running marker");
        } else {
            let _ = std::fs::remove_file(marker);
        }
    }

    /// Arguments of every invocation, oldest first.
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(self.path("invocations.log"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    /// Number of invocations whose first argument is `flag`.
    pub fn count(&self, flag: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|line| line.split_whitespace().next() == Some(flag))
            .count()
    }
}

impl Default for MockFirewall {
    fn default() -> Self {
        Self::new()
    }
}
