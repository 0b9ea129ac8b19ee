use crate::store::JobRecorder;
use crate::workload::WorkloadInstance;

use chrono::Utc;
use stagehand_core::prelude::*;

pub fn history_record(workload: &WorkloadInstance) -> HistoryRecord {
    HistoryRecord {
        identity: workload.endpoint.database.clone(),
        port: workload.host_port,
        version: workload.version.clone(),
        url: workload.url.clone(),
        created_at: Utc::now(),
        extra: Default::default(),
    }
}

/// Upserts the environment into the history. A storage failure is logged, nothing more.
pub async fn record_environment<H: HistoryStore>(
    history: &H,
    recorder: &JobRecorder,
    record: HistoryRecord,
) -> bool {
    let identity = record.identity.clone();
    match history.record(record).await {
        Ok(()) => {
            recorder.info(
                LogCode::HistoryRecorded,
                format!("Environment '{identity}' saved to history."),
            );
            true
        }
        Err(e) => {
            recorder.warn(
                LogCode::HistoryFailed,
                format!("Could not save environment to history: {e}"),
            );
            false
        }
    }
}
