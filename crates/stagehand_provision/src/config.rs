use crate::network::SubnetSearch;
use crate::retry::{Backoff, RetryPolicy};

use stagehand_core::prelude::{defaults, *};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables of the provisioning pipeline.
///
/// The defaults reproduce the behaviour of a single-host development setup.
#[derive(Clone, Debug)]
pub struct ProvisionConfig {
    /// Prefix of every resource name. Jobs use `<namespace>-<first 8 chars of job id>`.
    pub namespace: String,
    pub database_image: String,
    pub database_user: String,
    /// Image repository of the workload; the requested version is used as tag.
    pub workload_image: String,
    /// Version used when the request doesn't name one.
    pub default_version: String,
    /// Port the workload listens on inside its instance.
    pub workload_port: u16,
    /// Host used in the URL handed to users.
    pub public_host: String,
    /// Host used by the orchestrator itself to reach the management interface.
    pub management_host: String,
    /// Default application login, used for post-boot extension installs.
    pub admin: Credentials,
    /// Where extension directories are mounted inside the workload.
    pub extension_mount: String,
    /// Built-in addons path, kept after the extension mount in `--addons-path`.
    pub base_addons_path: String,
    /// A local extension directory mounted into every environment, if it carries a manifest.
    pub local_extension_dir: Option<PathBuf>,
    /// Capabilities the local extension needs at first boot.
    pub local_extension_requires: Vec<String>,
    /// Fetched extension sources land in `<work_dir>/<prefix>/extra_addons`.
    pub work_dir: PathBuf,
    /// Bound on fetching a single extension source. Expiry skips the source.
    pub fetch_timeout: Duration,
    /// Pause after the data store reports running.
    pub database_settle: Duration,
    /// Pause after the workload reports running.
    pub workload_settle: Duration,
    /// Upper bound for an instance to report running.
    pub ready_timeout: Duration,
    pub ready_poll: Duration,
    /// How often the installer probes the management interface before giving up.
    pub management_attempts: u32,
    pub management_poll: Duration,
    /// Pause after a registry refresh so the workload can finish scanning.
    pub registry_settle: Duration,
    /// Retry policy for registry operations that hit a scheduled-task lock.
    pub lock_retry: RetryPolicy,
    pub subnet_search: SubnetSearch,
    /// Bound on the mandatory steps of a job.
    pub job_deadline: Duration,
    /// Bound on the post-boot installer. Expiry abandons the remaining installs only.
    pub install_deadline: Duration,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            namespace: defaults::NAMESPACE.to_string(),
            database_image: defaults::DATABASE_IMAGE.to_string(),
            database_user: defaults::DATABASE_USER.to_string(),
            workload_image: defaults::WORKLOAD_IMAGE.to_string(),
            default_version: defaults::VERSION.to_string(),
            workload_port: defaults::WORKLOAD_PORT,
            public_host: defaults::PUBLIC_HOST.to_string(),
            management_host: "127.0.0.1".to_string(),
            admin: Credentials {
                login: defaults::ADMIN_LOGIN.to_string(),
                password: defaults::ADMIN_PASSWORD.to_string(),
            },
            extension_mount: defaults::EXTENSION_MOUNT.to_string(),
            base_addons_path: defaults::BASE_ADDONS_PATH.to_string(),
            local_extension_dir: None,
            local_extension_requires: vec!["website".to_string()],
            work_dir: std::env::temp_dir(),
            fetch_timeout: Duration::from_secs(5 * 60),
            database_settle: Duration::from_secs(10),
            workload_settle: Duration::from_secs(45),
            ready_timeout: Duration::from_secs(120),
            ready_poll: Duration::from_millis(500),
            management_attempts: 40,
            management_poll: Duration::from_secs(2),
            registry_settle: Duration::from_secs(3),
            lock_retry: RetryPolicy {
                max_attempts: 5,
                backoff: Backoff::Linear(Duration::from_secs(5)),
            },
            subnet_search: SubnetSearch::default(),
            job_deadline: Duration::from_secs(15 * 60),
            install_deadline: Duration::from_secs(30 * 60),
        }
    }
}

impl ProvisionConfig {
    /// Drops every pause and poll interval to zero. Attempt caps are kept.
    ///
    /// Meant for in-memory backends where nothing needs time to settle.
    pub fn without_waits(mut self) -> Self {
        self.database_settle = Duration::ZERO;
        self.workload_settle = Duration::ZERO;
        self.ready_poll = Duration::ZERO;
        self.management_poll = Duration::ZERO;
        self.registry_settle = Duration::ZERO;
        self.lock_retry.backoff = Backoff::Fixed(Duration::ZERO);
        self
    }

    pub fn workload_image_for(&self, version: &str) -> String {
        format!("{}:{}", self.workload_image, version)
    }
}

/// Resource names derived from a job id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobNames {
    /// Shared by every resource of the job; cleanup removes everything carrying it.
    pub prefix: String,
    pub network: String,
    pub database_instance: String,
    pub workload_instance: String,
    /// The database the workload creates and serves.
    pub database: String,
}

impl JobNames {
    pub fn new(config: &ProvisionConfig, job_id: &str) -> Self {
        let short = job_id.get(..8).unwrap_or(job_id);
        let prefix = format!("{}-{}", config.namespace, short);
        Self {
            network: format!("{prefix}-net"),
            database_instance: format!("{prefix}-db"),
            workload_instance: format!("{prefix}-app"),
            database: format!("{prefix}-db"),
            prefix,
        }
    }

    /// Directory receiving fetched extension sources for this job.
    pub fn sources_dir(&self, config: &ProvisionConfig) -> PathBuf {
        config.work_dir.join(&self.prefix).join("extra_addons")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_share_the_job_prefix() {
        let config = ProvisionConfig::default();
        let names = JobNames::new(&config, "0123456789abcdef0123456789abcdef");

        assert_eq!(names.prefix, "odoo-01234567");
        assert_eq!(names.network, "odoo-01234567-net");
        assert_eq!(names.database_instance, "odoo-01234567-db");
        assert_eq!(names.workload_instance, "odoo-01234567-app");
        for name in [&names.network, &names.database_instance, &names.workload_instance] {
            assert!(name.starts_with(&names.prefix));
        }
    }

    #[test]
    fn short_ids_are_used_whole() {
        let names = JobNames::new(&ProvisionConfig::default(), "abc");
        assert_eq!(names.prefix, "odoo-abc");
    }

    #[test]
    fn without_waits_keeps_attempt_caps() {
        let config = ProvisionConfig::default().without_waits();
        assert_eq!(config.workload_settle, Duration::ZERO);
        assert_eq!(config.lock_retry.max_attempts, 5);
        assert_eq!(config.management_attempts, 40);
    }

    #[test]
    fn image_tag_follows_version() {
        let config = ProvisionConfig::default();
        assert_eq!(config.workload_image_for("17.0"), "odoo:17.0");
    }
}
