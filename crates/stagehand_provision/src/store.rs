//! Process-wide registry of provisioning jobs.
//!
//! The map lives for the lifetime of the process; jobs are never persisted or evicted.
//! Each entry has a single writer (the job's worker, through a [`JobRecorder`]) and any
//! number of readers that receive cloned snapshots.

use stagehand_core::prelude::*;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new pending job and returns its id.
    ///
    /// Rejects a request without capabilities before anything is stored.
    pub fn create(&self, request: ProvisionRequest) -> Result<String, JobError> {
        if request.capabilities.is_empty() {
            return Err(JobError::InvalidRequest(
                "No capabilities provided for execution.".into(),
            ));
        }

        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let id = loop {
            let candidate = uuid::Uuid::new_v4().simple().to_string();
            if !jobs.contains_key(&candidate) {
                break candidate;
            }
        };
        jobs.insert(id.clone(), Job::new(id.clone(), request));

        Ok(id)
    }

    /// A consistent snapshot of the job.
    pub fn get(&self, id: &str) -> Result<Job, JobError> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The write handle for a job. Only the job's worker should hold one.
    pub fn recorder(&self, id: &str) -> JobRecorder {
        JobRecorder {
            store: self.clone(),
            id: id.to_string(),
        }
    }

    /// Applies `f` to a non-terminal job. Returns `false` if the job is unknown or
    /// already terminal, in which case nothing changes.
    fn mutate(&self, id: &str, f: impl FnOnce(&mut Job)) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        match jobs.get_mut(id) {
            Some(job) if !job.status.is_terminal() => {
                f(job);
                job.updated_at = Utc::now();
                true
            }
            Some(job) => {
                tracing::warn!(job_id = %id, status = %job.status, "Ignoring update to a finished job");
                false
            }
            None => false,
        }
    }
}

/// Appends to a job's log and moves it through its statuses.
///
/// Every append is mirrored to `tracing`.
#[derive(Clone)]
pub struct JobRecorder {
    store: JobStore,
    id: String,
}

impl JobRecorder {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn log(&self, severity: Severity, code: Option<LogCode>, message: impl Into<String>) {
        let entry = LogEntry::new(severity, code, message);
        match severity {
            Severity::Info => tracing::info!(job_id = %self.id, code = ?code, "{}", entry.message),
            Severity::Warn => tracing::warn!(job_id = %self.id, code = ?code, "{}", entry.message),
            Severity::Error => tracing::error!(job_id = %self.id, code = ?code, "{}", entry.message),
        }
        self.store.mutate(&self.id, |job| job.log.push(entry));
    }

    /// A progress line without an outcome code.
    pub fn note(&self, message: impl Into<String>) {
        self.log(Severity::Info, None, message);
    }

    pub fn info(&self, code: LogCode, message: impl Into<String>) {
        self.log(Severity::Info, Some(code), message);
    }

    pub fn warn(&self, code: LogCode, message: impl Into<String>) {
        self.log(Severity::Warn, Some(code), message);
    }

    pub fn error(&self, code: LogCode, message: impl Into<String>) {
        self.log(Severity::Error, Some(code), message);
    }

    pub fn start(&self) {
        self.store.mutate(&self.id, |job| {
            job.status = JobStatus::Running;
            job.log.push(LogEntry::new(
                Severity::Info,
                Some(LogCode::Started),
                "Starting environment creation...",
            ));
        });
    }

    /// Marks the job completed. The final line and the status change land together.
    pub fn complete(&self, url: impl Into<String>) -> bool {
        let url = url.into();
        tracing::info!(job_id = %self.id, url = %url, "Job completed");
        self.store.mutate(&self.id, |job| {
            job.log.push(LogEntry::new(
                Severity::Info,
                Some(LogCode::Completed),
                format!("Environment ready at {url}"),
            ));
            job.result_url = Some(url);
            job.status = JobStatus::Completed;
        })
    }

    pub fn fail(&self) -> bool {
        tracing::warn!(job_id = %self.id, "Job failed");
        self.store.mutate(&self.id, |job| {
            job.status = JobStatus::Failed;
        })
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.store.get(&self.id).ok().map(|job| job.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn request() -> ProvisionRequest {
        ProvisionRequest::new(["base"])
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = JobStore::new();
        assert!(matches!(store.get("nope"), Err(JobError::NotFound(_))));
    }

    #[test]
    fn empty_request_creates_nothing() {
        let store = JobStore::new();
        let err = store.create(ProvisionRequest::default()).unwrap_err();
        assert!(matches!(err, JobError::InvalidRequest(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn created_job_is_pending() {
        let store = JobStore::new();
        let id = store.create(request()).unwrap();
        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.id, id);
        assert_eq!(id.len(), 32);
    }

    #[test]
    fn concurrent_creates_yield_distinct_ids() {
        let store = JobStore::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..64)
                        .map(|_| store.create(request()).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(ids.len(), 16 * 64);
        assert_eq!(store.len(), 16 * 64);
    }

    #[test]
    fn finished_jobs_are_frozen() {
        let store = JobStore::new();
        let id = store.create(request()).unwrap();
        let recorder = store.recorder(&id);

        recorder.start();
        recorder.note("working");
        assert!(recorder.complete("http://localhost:1234"));
        let frozen = store.get(&id).unwrap();

        recorder.note("late line");
        recorder.error(LogCode::Failed, "late failure");
        assert!(!recorder.fail());
        recorder.start();

        let after = store.get(&id).unwrap();
        assert_eq!(after.status, JobStatus::Completed);
        assert_eq!(after.log, frozen.log);
        assert_eq!(after.result_url.as_deref(), Some("http://localhost:1234"));
    }

    #[test]
    fn log_keeps_insertion_order() {
        let store = JobStore::new();
        let id = store.create(request()).unwrap();
        let recorder = store.recorder(&id);
        recorder.start();
        recorder.note("one");
        recorder.warn(LogCode::SubnetFallback, "two");
        recorder.info(LogCode::NetworkCreated, "three");

        let lines = store.get(&id).unwrap().rendered_log();
        assert_eq!(
            lines,
            vec![
                "Request to create environment received.",
                "Starting environment creation...",
                "one",
                "Warning: two",
                "three",
            ]
        );
    }
}
