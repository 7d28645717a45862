//! HTTP/JSON surface
//!
//! Handlers only translate between HTTP and the core: they validate input,
//! call one core operation and map its result onto a status code.
//!
//! - [`routes`]: request dispatch
//! - [`response`]: JSON bodies and error mapping
//! - [`server`]: TCP accept loop
//! - [`static_files`]: UI assets

pub mod response;
pub mod routes;
pub mod server;
pub mod static_files;

use crate::audit::AuditLog;
use crate::config::ControlConfig;
use crate::core::controller::FirewallController;
use crate::core::live_config::LiveConfigReader;
use crate::core::program::FilterProgram;
use crate::core::reconcile::PortReconciler;
use crate::core::state_store::StateStore;
use std::sync::Arc;

pub use routes::handle;
pub use server::ApiServer;

/// Everything a request handler needs, built once at startup.
pub struct AppContext {
    pub config: Arc<ControlConfig>,
    pub controller: Arc<FirewallController>,
    pub ports: PortReconciler,
}

impl AppContext {
    pub fn new(config: ControlConfig) -> Self {
        let audit = AuditLog::from_config(config.audit_log.as_deref());
        Self::with_audit(config, audit)
    }

    pub fn with_audit(config: ControlConfig, audit: AuditLog) -> Self {
        let config = Arc::new(config);
        let controller = Arc::new(FirewallController::new(
            FilterProgram::new(config.clone()),
            audit.clone(),
        ));
        let ports = PortReconciler::new(
            StateStore::new(config.state_path()),
            LiveConfigReader::new(config.firewall_conf_path()),
            controller.clone(),
            audit,
        );
        Self {
            config,
            controller,
            ports,
        }
    }
}
