use stagehand_core::prelude::*;

use std::sync::{Arc, Mutex, PoisonError};

/// History kept in memory for the lifetime of the value.
#[derive(Clone, Default)]
pub struct MemoryHistory {
    records: Arc<Mutex<Vec<HistoryRecord>>>,
    failing: bool,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every read and write fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

impl HistoryStore for MemoryHistory {
    async fn record(&self, record: HistoryRecord) -> Result<(), StorageError> {
        if self.failing {
            return Err(StorageError::System("history store is read-only".into()));
        }
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        upsert(&mut records, record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<HistoryRecord>, StorageError> {
        if self.failing {
            return Err(StorageError::System("history store is unavailable".into()));
        }
        let records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(newest_first(records))
    }
}
