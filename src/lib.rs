//! portgate - control plane for an eBPF/XDP port filter
//!
//! Manages the lifecycle of an external, privileged filtering program and the
//! set of ports it lets through, behind a small HTTP/JSON API.
//!
//! # Architecture
//!
//! - [`core`] - Port state, filtering-program invocation, start/stop control
//! - [`api`] - HTTP routes, static UI assets and the accept loop
//! - [`audit`] - Audit logging for all privileged operations
//! - [`validators`] - Input validation before anything is elevated
//! - [`elevation`] - sudo / run0 / pkexec command construction
//! - [`config`] - Configuration loading and persistence
//! - [`utils`] - XDG directories and atomic writes
//!
//! # Safety Features
//!
//! - Port changes are refused while the filter is ONLINE
//! - Start and stop are serialized; a second start cannot spawn a second filter
//! - Every external invocation has a timeout
//! - Atomic state writes with `0o600` permissions
//! - Static serving never exposes the program, its config or logs

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use crate::config::ControlConfig;
pub use crate::core::error::{Error, Result};
pub use crate::core::ports::{Port, PortSet};
