/// Audit logging for privileged operations
///
/// Every start, stop and port mutation is recorded as one JSON line, whether
/// it succeeded or not. Audit failures never fail the operation itself.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StartFirewall,
    StopFirewall,
    AddPort,
    RemovePort,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Correlates the entry with tracing output for the same request
    pub operation_id: Uuid,

    pub event_type: EventType,

    /// Whether the operation succeeded
    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(
        operation_id: Uuid,
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            operation_id,
            event_type,
            success,
            details,
            error,
        }
    }
}

/// Audit log writer. A log without a path discards events.
#[derive(Debug, Clone)]
pub struct AuditLog {
    log_path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self { log_path }
    }

    /// Uses the configured path, or `audit.log` in the XDG state directory.
    pub fn from_config(configured: Option<&Path>) -> Self {
        if let Some(path) = configured {
            return Self::new(Some(path.to_path_buf()));
        }
        if let Err(e) = crate::utils::ensure_state_dir() {
            tracing::warn!("Failed to create state directory, audit log disabled: {e}");
            return Self::disabled();
        }
        Self::new(crate::utils::get_state_dir().map(|dir| dir.join("audit.log")))
    }

    pub fn disabled() -> Self {
        Self { log_path: None }
    }

    /// Appends an event to the audit log
    ///
    /// Events are written as JSON-lines format (one JSON object per line)
    pub async fn log(&self, event: &AuditEvent) -> std::io::Result<()> {
        let Some(path) = &self.log_path else {
            return Ok(());
        };
        let mut json = serde_json::to_string(event)?;
        json.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Records an event, downgrading write failures to a warning.
    pub async fn record(
        &self,
        operation_id: Uuid,
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) {
        let event = AuditEvent::new(operation_id, event_type, success, details, error);
        if let Err(e) = self.log(&event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }

    /// Reads the most recent events, newest first
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let Some(path) = &self.log_path else {
            return Ok(Vec::new());
        };
        let content = tokio::fs::read_to_string(path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect();

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = AuditEvent::new(
            Uuid::nil(),
            EventType::AddPort,
            false,
            serde_json::json!({"port": 8080}),
            Some("Permission denied".to_string()),
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("add_port"));
        assert!(json.contains("Permission denied"));
        assert!(json.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = concat!(
            r#"{"timestamp":"2024-01-01T00:00:00Z","#,
            r#""operation_id":"00000000-0000-0000-0000-000000000000","#,
            r#""event_type":"stop_firewall","success":true,"details":{},"error":null}"#,
        );
        let event: AuditEvent = serde_json::from_str(json).unwrap();

        assert!(event.success);
        assert_eq!(event.event_type, EventType::StopFirewall);
    }

    #[tokio::test]
    async fn test_append_and_read_recent() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(Some(dir.path().join("audit.log")));

        for port in [80u16, 443, 8080] {
            audit
                .record(
                    Uuid::new_v4(),
                    EventType::AddPort,
                    true,
                    serde_json::json!({ "port": port }),
                    None,
                )
                .await;
        }

        let recent = audit.read_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].details["port"], 8080);
        assert_eq!(recent[1].details["port"], 443);
    }

    #[tokio::test]
    async fn test_disabled_log_is_noop() {
        let audit = AuditLog::disabled();
        audit
            .record(Uuid::new_v4(), EventType::StartFirewall, true, serde_json::json!({}), None)
            .await;
        assert!(audit.read_recent(10).await.unwrap().is_empty());
    }
}
