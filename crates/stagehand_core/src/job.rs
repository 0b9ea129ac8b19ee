use crate::error::JobError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A request to provision a new environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProvisionRequest {
    /// Capabilities (modules) the workload installs on first boot.
    ///
    /// Order is passed through to the workload as a hint; it resolves dependencies itself.
    pub capabilities: Vec<String>,
    /// Remote sources (git URLs) fetched and mounted as extension directories.
    #[serde(default)]
    pub extension_sources: Vec<String>,
    /// Extensions to install after boot. If empty, mounted directories are scanned instead.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Workload version tag. If [`None`], the configured default is used.
    #[serde(default)]
    pub version: Option<String>,
}

impl ProvisionRequest {
    pub fn new<I, S>(capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Trims names, drops blanks and duplicates (first occurrence wins) and rejects
    /// a request without any capability.
    pub fn normalized(mut self) -> Result<Self, JobError> {
        self.capabilities = dedup_names(self.capabilities);
        self.extensions = dedup_names(self.extensions);
        self.extension_sources = dedup_names(self.extension_sources);
        self.version = self
            .version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if self.capabilities.is_empty() {
            return Err(JobError::InvalidRequest(
                "No capabilities provided for execution.".into(),
            ));
        }

        Ok(self)
    }
}

fn dedup_names(names: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Returned to the submitter as soon as the job is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobAccepted {
    pub job_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Machine-readable outcome attached to a [`LogEntry`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LogCode {
    Accepted,
    Started,
    BackendUnavailable,
    SourceFetched,
    SourceFetchFailed,
    LocalExtensionDetected,
    CapabilityAdded,
    NetworkCreated,
    SubnetFallback,
    SubnetFound,
    AddressSpaceExhausted,
    DependencyStarted,
    Credential,
    WorkloadStarted,
    WorkloadReady,
    ReadinessTimeout,
    ManagementUnreachable,
    AuthenticationFailed,
    RegistryRefreshed,
    RegistryLocked,
    RegistryRefreshFailed,
    ExtensionsDiscovered,
    ExtensionInstalled,
    ExtensionSkipped,
    ExtensionNotFound,
    ExtensionFailed,
    HistoryRecorded,
    HistoryFailed,
    CleanupStarted,
    ResourceRemoved,
    CleanupComplete,
    CleanupFailed,
    DeadlineExceeded,
    Failed,
    Completed,
}

/// One line of a job's log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<LogCode>,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(severity: Severity, code: Option<LogCode>, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            code,
            at: Utc::now(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Info => write!(f, "{}", self.message),
            Severity::Warn => write!(f, "Warning: {}", self.message),
            Severity::Error => write!(f, "Error: {}", self.message),
        }
    }
}

/// Tracked state of one provisioning request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Append-only; insertion order is the only record of what happened.
    pub log: Vec<LogEntry>,
    /// Set only on success.
    pub result_url: Option<String>,
    pub request: ProvisionRequest,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, request: ProvisionRequest) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            log: vec![LogEntry::new(
                Severity::Info,
                Some(LogCode::Accepted),
                "Request to create environment received.",
            )],
            result_url: None,
            request,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_code(&self, code: LogCode) -> bool {
        self.log.iter().any(|e| e.code == Some(code))
    }

    pub fn rendered_log(&self) -> Vec<String> {
        self.log.iter().map(ToString::to_string).collect()
    }
}

/// What a polling client sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub status: JobStatus,
    pub log: Vec<String>,
    pub entries: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            log: job.rendered_log(),
            entries: job.log.clone(),
            result_url: job.result_url.clone(),
        }
    }
}
