//! # Stagehand Provision
//!
//! The asynchronous provisioning pipeline.
//!
//! A [`Provisioner`](orchestrator::Provisioner) accepts a request, registers a job in the
//! [`JobStore`](store::JobStore) and hands it to a background task that runs:
//!
//! 1. **Network allocation**, with a deterministic subnet search when the backend's default pools are exhausted.
//! 2. **Dependency provisioning**: the data store the workload needs.
//! 3. **Workload provisioning**: the application itself, published on a host port.
//! 4. **Extension installation**: best-effort registration of mounted extensions.
//! 5. **History recording**.
//!
//! A failure in steps 1 to 3 rolls back every resource carrying the job's name prefix
//! and marks the job failed. Clients poll the store until the job is terminal.

pub mod cleanup;
pub mod config;
pub mod dependency;
pub mod history;
pub mod installer;
pub mod network;
pub mod orchestrator;
pub mod readiness;
pub mod retry;
pub mod sources;
pub mod store;
pub mod workload;

pub mod prelude {
    pub use super::cleanup::{CleanupReport, rollback};
    pub use super::config::{JobNames, ProvisionConfig};
    pub use super::installer::{ExtensionInstaller, InstallOutcome, InstallPhase};
    pub use super::network::{Ipv4Block, SubnetSearch, allocate_network};
    pub use super::orchestrator::Provisioner;
    pub use super::retry::{Backoff, RetryPolicy, retry};
    pub use super::sources::{ExtensionPlan, GitFetcher};
    pub use super::store::{JobRecorder, JobStore};
}
