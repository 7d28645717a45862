//! Reconciliation of persisted intent with enforced truth
//!
//! Two views of "which ports are open" exist: the [`StateRecord`] this server
//! writes, and the live configuration the filtering program maintains. The
//! live view wins whenever it can be read; the record is the fallback.
//!
//! Port mutations are only allowed while the firewall is OFFLINE. The check is
//! made freshly for every request and happens before any external invocation.

use crate::audit::{AuditLog, EventType};
use crate::core::controller::{ControllerPhase, FirewallController};
use crate::core::error::{Error, Result};
use crate::core::live_config::LiveConfigReader;
use crate::core::ports::{Port, PortSet};
use crate::core::program::{FirewallStatus, Operation};
use crate::core::state_store::{StateRecord, StateStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Ports actually enforced when known, otherwise the persisted intent.
pub fn merge_ports(enforced: Option<&PortSet>, record: &StateRecord) -> PortSet {
    match enforced {
        Some(ports) => ports.clone(),
        None => record.ports.iter().copied().collect(),
    }
}

/// Body of `GET /api/state` and of successful port mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedState {
    /// Ascending, unique
    pub ports: Vec<u16>,
    pub last_update_ts: i64,
    pub status: FirewallStatus,
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Add,
    Remove,
}

impl Mutation {
    fn operation(self, port: Port) -> Operation<'static> {
        match self {
            Self::Add => Operation::Add(port),
            Self::Remove => Operation::Delete(port),
        }
    }

    fn event(self) -> EventType {
        match self {
            Self::Add => EventType::AddPort,
            Self::Remove => EventType::RemovePort,
        }
    }

    fn apply(self, record: &mut StateRecord, port: Port) {
        match self {
            Self::Add => record.add_port(port.get()),
            Self::Remove => record.remove_port(port.get()),
        }
        record.touch();
    }
}

pub struct PortReconciler {
    store: StateStore,
    live: LiveConfigReader,
    controller: Arc<FirewallController>,
    audit: AuditLog,
}

impl PortReconciler {
    pub fn new(
        store: StateStore,
        live: LiveConfigReader,
        controller: Arc<FirewallController>,
        audit: AuditLog,
    ) -> Self {
        Self {
            store,
            live,
            controller,
            audit,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Current merged view with a fresh status query.
    pub async fn merged_state(&self) -> MergedState {
        let record = self.store.read().await;
        self.merge(&record).await
    }

    async fn merge(&self, record: &StateRecord) -> MergedState {
        let enforced = self.live.read_ports().await;
        let status = self.controller.program().status().await;
        MergedState {
            ports: merge_ports(enforced.as_ref(), record).to_vec(),
            last_update_ts: record.last_update_ts,
            status,
        }
    }

    pub async fn add_port(&self, port: Port) -> Result<MergedState> {
        self.mutate(Mutation::Add, port).await
    }

    pub async fn remove_port(&self, port: Port) -> Result<MergedState> {
        self.mutate(Mutation::Remove, port).await
    }

    async fn mutate(&self, mutation: Mutation, port: Port) -> Result<MergedState> {
        self.ensure_offline().await?;

        let operation_id = Uuid::new_v4();
        let details = serde_json::json!({ "port": port.get() });

        if let Err(e) = self
            .controller
            .program()
            .invoke(mutation.operation(port))
            .await
        {
            warn!(%operation_id, "{mutation:?} port {port} failed: {e}");
            self.audit
                .record(operation_id, mutation.event(), false, details, Some(e.to_string()))
                .await;
            return Err(e);
        }

        let record = self.store.update(|r| mutation.apply(r, port)).await?;
        info!(%operation_id, "{mutation:?} port {port}");
        self.audit
            .record(operation_id, mutation.event(), true, details, None)
            .await;

        Ok(self.merge(&record).await)
    }

    async fn ensure_offline(&self) -> Result<()> {
        if self.controller.phase() == ControllerPhase::Starting {
            return Err(Error::Conflict(
                "Cannot modify ports while firewall is starting".to_string(),
            ));
        }
        if self.controller.program().status().await == FirewallStatus::Online {
            return Err(Error::Conflict(
                "Cannot modify ports while firewall is running".to_string(),
            ));
        }
        Ok(())
    }
}
