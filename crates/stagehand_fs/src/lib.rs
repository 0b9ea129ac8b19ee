//! # Stagehand FileSystem History
//!
//! A [`HistoryStore`] keeping every created environment in one JSON file.
//!
//! ## Features
//!
//! * **Atomic Writes**: The list is written to a temporary file and renamed over the old one, so a crash never leaves a half-written history.
//! * **Forward compatible**: Unknown fields in stored records are kept and written back.
//!
//! ## Usage
//!
//! ```no_run
//! use stagehand_fs::JsonHistoryStore;
//!
//! let history = JsonHistoryStore::new("./environments.json");
//! ```

use stagehand_core::prelude::*;

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

async fn atomic_write(path: &Path, data: Bytes) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(StorageError::Io)?;
    }

    let tmp_path = path.with_extension("tmp");

    fs::write(&tmp_path, data).await.map_err(StorageError::Io)?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(StorageError::Io)?;

    Ok(())
}

#[derive(Clone)]
pub struct JsonHistoryStore {
    path: PathBuf,
    /// Serialises read-modify-write cycles within this process.
    lock: Arc<Mutex<()>>,
}

impl JsonHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored list as written. A missing or empty file is an empty history.
    async fn load(&self) -> Result<Vec<HistoryRecord>, StorageError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_slice(&data)?)
    }
}

impl HistoryStore for JsonHistoryStore {
    async fn record(&self, record: HistoryRecord) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;

        let mut records = self.load().await?;
        upsert(&mut records, record);

        let data = serde_json::to_vec_pretty(&records)?;
        atomic_write(&self.path, Bytes::from(data)).await?;

        tracing::debug!(path = %self.path.display(), records = records.len(), "History saved");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<HistoryRecord>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(newest_first(self.load().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(identity: &str, port: u16) -> HistoryRecord {
        HistoryRecord {
            identity: identity.into(),
            port,
            version: "19.0".into(),
            url: format!("http://localhost:{port}"),
            created_at: Utc::now(),
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(dir.path().join("history.json"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn records_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/history.json");

        JsonHistoryStore::new(&path)
            .record(record("odoo-aaaa-db", 49153))
            .await
            .unwrap();

        let reopened = JsonHistoryStore::new(&path);
        let records = reopened.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity, "odoo-aaaa-db");
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn same_identity_and_port_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(dir.path().join("history.json"));

        store.record(record("a", 1)).await.unwrap();
        store.record(record("b", 2)).await.unwrap();
        let mut again = record("a", 1);
        again.version = "17.0".into();
        store.record(again).await.unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.iter().filter(|r| r.identity == "a").count(), 1);
        assert_eq!(records[0].version, "17.0");
    }

    #[tokio::test]
    async fn list_is_newest_first_regardless_of_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut old = record("old", 1);
        old.created_at = Utc::now() - Duration::days(1);
        let new = record("new", 2);
        std::fs::write(&path, serde_json::to_vec(&vec![old, new]).unwrap()).unwrap();

        let records = JsonHistoryStore::new(&path).list().await.unwrap();
        assert_eq!(records[0].identity, "new");
    }

    #[tokio::test]
    async fn concurrent_records_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(dir.path().join("history.json"));

        let handles: Vec<_> = (0..10u16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.record(record("env", 1000 + i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.list().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn unknown_fields_survive_a_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{"identity":"kept","port":1,"version":"17.0","url":"http://localhost:1",
                 "created_at":"2026-01-01T00:00:00Z","owner":"ops","tags":["demo"]}]"#,
        )
        .unwrap();

        JsonHistoryStore::new(&path)
            .record(record("added", 2))
            .await
            .unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let kept = raw
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["identity"] == "kept")
            .unwrap();
        assert_eq!(kept["owner"], "ops");
        assert_eq!(kept["tags"], serde_json::json!(["demo"]));
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonHistoryStore::new(&path).list().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
