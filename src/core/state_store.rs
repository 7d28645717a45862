//! Persisted port record
//!
//! The record is the write-intent log of the control plane: which ports the
//! operator asked for and when the list last changed. It is only mutated after
//! the filtering program accepted the change.
//!
//! A missing or corrupt file is never an error for readers. It is replaced by
//! [`StateRecord::initial`] and persisted, so the next read sees the same data.

use crate::utils::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Ports seeded into a fresh record: HTTP, HTTPS, SSH, SMTP, DNS.
pub const DEFAULT_PORTS: [u16; 5] = [80, 443, 22, 25, 53];

/// `{ports, lastUpdateTs}` as stored on disk.
///
/// `ports` keeps insertion order; callers that present it sort it first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRecord {
    pub ports: Vec<u16>,
    /// Milliseconds since the Unix epoch
    pub last_update_ts: i64,
}

impl StateRecord {
    pub fn initial() -> Self {
        Self {
            ports: DEFAULT_PORTS.to_vec(),
            last_update_ts: now_millis(),
        }
    }

    /// Appends `port` unless already present.
    pub fn add_port(&mut self, port: u16) {
        if !self.ports.contains(&port) {
            self.ports.push(port);
        }
    }

    pub fn remove_port(&mut self, port: u16) {
        self.ports.retain(|p| *p != port);
    }

    pub fn touch(&mut self) {
        self.last_update_ts = now_millis();
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// File-backed store for the [`StateRecord`].
pub struct StateStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the record, self-healing to the initial record when the file is
    /// absent or unparseable.
    pub async fn read(&self) -> StateRecord {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => match serde_json::from_str::<StateRecord>(&json) {
                Ok(record) => return record,
                Err(e) => warn!("State file {:?} is corrupt ({e}), reinitializing", self.path),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file at {:?}, creating default record", self.path);
            }
            Err(e) => warn!("Failed to read state file {:?}: {e}, reinitializing", self.path),
        }

        let record = StateRecord::initial();
        if let Err(e) = self.write(&record).await {
            warn!("Failed to persist default state record: {e}");
        }
        record
    }

    /// Replaces the stored record atomically.
    pub async fn write(&self, record: &StateRecord) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        write_atomic(&self.path, json.into_bytes()).await
    }

    /// Read-modify-write under the store lock.
    pub async fn update<F>(&self, f: F) -> std::io::Result<StateRecord>
    where
        F: FnOnce(&mut StateRecord),
    {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read().await;
        f(&mut record);
        self.write(&record).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_self_heals_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("data.json"));

        let first = store.read().await;
        assert_eq!(first.ports, vec![80, 443, 22, 25, 53]);
        assert!(store.path().exists());

        let second = store.read().await;
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_corrupt_file_self_heals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = StateStore::new(&path);
        let record = store.read().await;
        assert_eq!(record.ports, DEFAULT_PORTS.to_vec());

        let on_disk: StateRecord =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, record);
    }

    #[tokio::test]
    async fn test_out_of_range_port_counts_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"ports":[70000],"lastUpdateTs":1}"#).unwrap();

        let record = StateStore::new(&path).read().await;
        assert_eq!(record.ports, DEFAULT_PORTS.to_vec());
    }

    #[tokio::test]
    async fn test_existing_record_is_read_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"ports":[8080,22],"lastUpdateTs":1700000000000}"#).unwrap();

        let record = StateStore::new(&path).read().await;
        assert_eq!(record.ports, vec![8080, 22]);
        assert_eq!(record.last_update_ts, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn test_update_serializes_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(StateStore::new(dir.path().join("data.json")));

        let mut handles = Vec::new();
        for port in 1000..1020u16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update(|r| r.add_port(port)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let record = store.read().await;
        for port in 1000..1020u16 {
            assert!(record.ports.contains(&port), "lost update for {port}");
        }
    }

    #[test]
    fn test_record_wire_format() {
        let record = StateRecord {
            ports: vec![80],
            last_update_ts: 42,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"ports":[80],"lastUpdateTs":42}"#);
    }

    #[test]
    fn test_add_and_remove_port() {
        let mut record = StateRecord::initial();
        record.add_port(22);
        assert_eq!(record.ports.len(), 5);
        record.add_port(8080);
        assert_eq!(record.ports.last(), Some(&8080));
        record.remove_port(443);
        assert!(!record.ports.contains(&443));
    }
}
