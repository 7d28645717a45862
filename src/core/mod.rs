//! Core control-plane functionality
//!
//! - [`ports`]: validated port and port-set types
//! - [`state_store`]: persisted `{ports, lastUpdateTs}` record
//! - [`live_config`]: parser for the filtering program's `firewall.conf`
//! - [`program`]: invocation of the filtering program
//! - [`controller`]: start/stop state machine for the long-running filter
//! - [`reconcile`]: merged port view and guarded port mutations
//! - [`well_known`]: service names for common ports
//! - [`logs`]: tail of the filtering program's log
//! - [`error`]: error types shared by all of the above

pub mod controller;
pub mod error;
pub mod live_config;
pub mod logs;
pub mod ports;
pub mod program;
pub mod reconcile;
pub mod state_store;
pub mod well_known;

#[cfg(test)]
pub mod test_helpers;
