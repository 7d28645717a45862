//! Privilege elevation for filtering-program operations
//!
//! portgate runs as an unprivileged user and only elevates for the operations
//! that touch eBPF/XDP state:
//!
//! - **`--add` / `--del`**: rewriting the live port configuration
//! - **`--run`**: the long-running filter itself
//! - **`pkill`**: terminating filter instances on stop
//!
//! `--status` always runs unprivileged.
//!
//! # Elevation Strategy
//!
//! The server has no terminal to prompt on, so every method must be
//! non-interactive or pre-authorized:
//!
//! - **Root**: run the command directly
//! - **Auto (default)**: `sudo -n` when available, `pkexec` otherwise
//! - **Explicit**: `sudo`, `run0`, `pkexec` or `none` from the configuration
//!
//! # Environment Variables
//!
//! - `PORTGATE_ELEVATION_METHOD`: Force a specific elevation method when the
//!   configuration says `auto` (`sudo`, `run0`, `pkexec`, `none`). An explicit
//!   method in the configuration is never overridden.
//! - `PORTGATE_TEST_NO_ELEVATION`: Bypass elevation entirely (for testing only).
//!
//! # Security
//!
//! - Commands are constructed without shell interpolation
//! - Inputs (ports, interface names) are validated before reaching this module
//! - Wrapper binaries are checked for availability before use

use crate::config::ElevationMethod;
use std::ffi::OsStr;
use std::io;
use tokio::process::Command;

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `PORTGATE_ELEVATION_METHOD`
    #[error("Invalid PORTGATE_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec, none")]
    InvalidMethod(String),

    /// Neither sudo nor pkexec is installed and we are not root
    #[error("No elevation method available: install sudo or run as root")]
    NoMethodAvailable,

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                if full_path.is_file() {
                    Some(full_path)
                } else {
                    None
                }
            })
        })
        .is_some()
}

/// Resolves the effective method: test bypass, explicit configuration, then
/// the environment override for `auto`.
fn effective_method(configured: ElevationMethod) -> Result<ElevationMethod, ElevationError> {
    if std::env::var("PORTGATE_TEST_NO_ELEVATION").is_ok() {
        return Ok(ElevationMethod::None);
    }
    if configured != ElevationMethod::Auto {
        return Ok(configured);
    }

    match std::env::var("PORTGATE_ELEVATION_METHOD") {
        Ok(method) if !method.is_empty() => method
            .parse::<ElevationMethod>()
            .map_err(|_| ElevationError::InvalidMethod(method.to_lowercase())),
        _ => Ok(configured),
    }
}

fn wrapped(wrapper: &str, extra: &[&str], program: &OsStr, args: &[&OsStr]) -> Command {
    let mut cmd = Command::new(wrapper);
    cmd.args(extra).arg(program).args(args);
    cmd
}

fn direct(program: &OsStr, args: &[&OsStr]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Builds a command that runs `program args...` with root privileges.
///
/// Callers must validate arguments first; they are passed through verbatim.
pub fn build_elevated_command(
    configured: ElevationMethod,
    program: &OsStr,
    args: &[&OsStr],
) -> Result<Command, ElevationError> {
    let method = effective_method(configured)?;

    if method == ElevationMethod::None || nix::unistd::getuid().is_root() {
        return Ok(direct(program, args));
    }

    match method {
        ElevationMethod::Sudo => {
            if !binary_exists("sudo") {
                return Err(ElevationError::MethodNotAvailable("sudo".into()));
            }
            // -n: fail instead of prompting, there is nobody to answer
            Ok(wrapped("sudo", &["-n"], program, args))
        }
        ElevationMethod::Run0 => {
            if !binary_exists("run0") {
                return Err(ElevationError::MethodNotAvailable("run0".into()));
            }
            Ok(wrapped("run0", &["--no-ask-password"], program, args))
        }
        ElevationMethod::Pkexec => {
            if !binary_exists("pkexec") {
                return Err(ElevationError::MethodNotAvailable("pkexec".into()));
            }
            Ok(wrapped("pkexec", &[], program, args))
        }
        ElevationMethod::Auto => {
            if binary_exists("sudo") {
                Ok(wrapped("sudo", &["-n"], program, args))
            } else if binary_exists("pkexec") {
                Ok(wrapped("pkexec", &[], program, args))
            } else {
                Err(ElevationError::NoMethodAvailable)
            }
        }
        ElevationMethod::None => Ok(direct(program, args)),
    }
}
