use crate::job::LogCode;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached (not installed, daemon stopped, socket missing).
    /// Maps to **HTTP 503 Service Unavailable**.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Default network allocation failed because every predefined address pool is in use.
    /// Recoverable through the deterministic subnet search.
    /// Maps to **HTTP 409 Conflict**.
    #[error("Address space exhausted: {0}")]
    AddressSpaceExhausted(String),

    /// The requested network or instance does not exist.
    /// Maps to **HTTP 404 Not Found**.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The backend rejected the parameters (bad image, name clash, bad mount).
    /// Maps to **HTTP 400 Bad Request**.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Any other backend failure.
    /// Maps to **HTTP 500 Internal Server Error**.
    #[error("Backend system failure: {0}")]
    System(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagementError {
    /// The workload's management interface did not answer.
    #[error("Management interface unreachable: {0}")]
    Unreachable(String),

    /// The workload is busy with a scheduled task holding a lock. Safe to retry.
    #[error("Management operation locked: {0}")]
    Locked(String),

    /// The login was rejected.
    #[error("Authentication failed for '{0}'")]
    AuthenticationFailed(String),

    /// The workload answered with an application error.
    #[error("Management call failed: {0}")]
    Rpc(String),

    /// The response could not be read or decoded.
    #[error("Management transport error: {0}")]
    Transport(String),
}

impl ManagementError {
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    /// The provisioning request was rejected before a job was created.
    /// Maps to **HTTP 400 Bad Request**.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No job with this id exists.
    /// Maps to **HTTP 404 Not Found**.
    #[error("Job {0} not found")]
    NotFound(String),

    /// A mandatory backend operation failed.
    /// Maps to **HTTP 500 Internal Server Error**.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The fallback subnet search scanned the whole range without a free block.
    #[error(
        "Failed to find an available /{prefix} subnet between {start} and {end}. \
         This suggests heavy network usage on this host"
    )]
    SubnetSearchExhausted { start: String, end: String, prefix: u8 },

    /// An instance did not reach its running state in time.
    #[error("{what} did not become ready within {secs}s")]
    ReadinessTimeout { what: String, secs: u64 },

    /// The mandatory steps of the job did not finish before the job deadline.
    #[error("Job exceeded its deadline of {0}s")]
    DeadlineExceeded(u64),

    /// Generic failure.
    /// Maps to **HTTP 500 Internal Server Error**.
    #[error("Job system failure: {0}")]
    System(String),
}

impl JobError {
    /// Machine-readable code attached to the log entry reporting this error.
    pub fn code(&self) -> LogCode {
        match self {
            Self::Backend(BackendError::Unavailable(_)) => LogCode::BackendUnavailable,
            Self::Backend(BackendError::AddressSpaceExhausted(_))
            | Self::SubnetSearchExhausted { .. } => LogCode::AddressSpaceExhausted,
            Self::ReadinessTimeout { .. } => LogCode::ReadinessTimeout,
            Self::DeadlineExceeded(_) => LogCode::DeadlineExceeded,
            _ => LogCode::Failed,
        }
    }

    /// An instruction for the operator, when there is a concrete one.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Backend(BackendError::Unavailable(_)) => {
                Some("Please ensure Docker is installed and running, then try again.")
            }
            Self::Backend(BackendError::AddressSpaceExhausted(_))
            | Self::SubnetSearchExhausted { .. } => Some(
                "Clean up unused networks with 'docker network prune' \
                 (inspect them with 'docker network ls') and try again.",
            ),
            Self::DeadlineExceeded(_) | Self::ReadinessTimeout { .. } => {
                Some("The host may be overloaded. Check 'docker ps -a' and the container logs.")
            }
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    /// Low-level I/O error.
    /// Maps to **HTTP 500 Internal Server Error**.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    /// Maps to **HTTP 500 Internal Server Error**.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested file or source was not found.
    /// Maps to **HTTP 404 Not Found**.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Generic failure (e.g. an external fetch command exited non-zero).
    /// Maps to **HTTP 500 Internal Server Error**.
    #[error("Storage system failure: {0}")]
    System(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_points_at_network_prune() {
        let err = JobError::SubnetSearchExhausted {
            start: "172.17.0.0".into(),
            end: "172.31.255.255".into(),
            prefix: 24,
        };
        assert_eq!(err.code(), LogCode::AddressSpaceExhausted);
        assert!(err.remediation().unwrap().contains("docker network prune"));
    }

    #[test]
    fn unavailable_backend_is_a_configuration_error() {
        let err = JobError::from(BackendError::Unavailable("no socket".into()));
        assert_eq!(err.code(), LogCode::BackendUnavailable);
        assert!(err.remediation().unwrap().contains("Docker"));
        assert_eq!(err.to_string(), "Backend unavailable: no socket");
    }

    #[test]
    fn generic_errors_have_no_remediation() {
        let err = JobError::System("boom".into());
        assert_eq!(err.code(), LogCode::Failed);
        assert!(err.remediation().is_none());
    }
}
