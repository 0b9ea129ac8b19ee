use crate::cleanup::rollback;
use crate::config::{JobNames, ProvisionConfig};
use crate::dependency::{job_labels, start_database};
use crate::history::{history_record, record_environment};
use crate::installer::{ExtensionInstaller, install_targets};
use crate::network::allocate_network;
use crate::sources::{ExtensionPlan, prepare_extensions};
use crate::store::{JobRecorder, JobStore};
use crate::workload::{WorkloadInstance, start_workload};

use futures::FutureExt;
use stagehand_core::prelude::*;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Accepts provisioning requests and runs each one as an independent background task.
///
/// Cloning is cheap; clones share the job store.
#[derive(Clone)]
pub struct Provisioner<S: ProvisionServices> {
    services: S,
    store: JobStore,
    config: Arc<ProvisionConfig>,
}

impl<S: ProvisionServices> Provisioner<S> {
    pub fn new(services: S, config: ProvisionConfig) -> Self {
        Self {
            services,
            store: JobStore::new(),
            config: Arc::new(config),
        }
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Registers the job and spawns its worker. Returns as soon as the job exists.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: ProvisionRequest) -> Result<JobAccepted, JobError> {
        let request = request.normalized()?;
        let job_id = self.store.create(request.clone())?;
        tracing::info!(job_id = %job_id, capabilities = ?request.capabilities, "Provisioning job accepted");

        let this = self.clone();
        let recorder = self.store.recorder(&job_id);
        let span = tracing::info_span!("provision", job_id = %job_id);
        tokio::spawn(async move { this.supervise(recorder, request).await }.instrument(span));

        Ok(JobAccepted { job_id })
    }

    pub fn status(&self, job_id: &str) -> Result<Job, JobError> {
        self.store.get(job_id)
    }

    pub async fn history(&self) -> Result<Vec<HistoryRecord>, StorageError> {
        self.services.history().list().await
    }

    /// Polls the store until the job is terminal or `timeout` passes, returning the last
    /// snapshot either way.
    pub async fn wait_terminal(&self, job_id: &str, timeout: Duration) -> Result<Job, JobError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.store.get(job_id)?;
            if job.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Ok(job);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Runs the job and turns a panic anywhere in it into a failed, rolled-back job.
    async fn supervise(self, recorder: JobRecorder, request: ProvisionRequest) {
        let run = AssertUnwindSafe(self.run_job(&recorder, &request)).catch_unwind();
        if let Err(panic) = run.await {
            let detail = panic_message(&*panic);
            tracing::error!(job_id = %recorder.id(), %detail, "Provisioning task panicked");
            recorder.error(LogCode::Failed, format!("Internal error: {detail}"));
            let names = JobNames::new(&self.config, recorder.id());
            rollback(self.services.backend(), &recorder, &names.prefix).await;
            recorder.fail();
        }
    }

    async fn run_job(&self, recorder: &JobRecorder, request: &ProvisionRequest) {
        let config = &*self.config;
        let names = JobNames::new(config, recorder.id());
        let version = request
            .version
            .clone()
            .unwrap_or_else(|| config.default_version.clone());

        recorder.start();

        if let Err(e) = self.services.backend().ping().await {
            let err = JobError::from(e);
            self.report_error(recorder, &err);
            recorder.fail();
            return;
        }

        let plan = prepare_extensions(self.services.fetcher(), recorder, config, &names, request).await;

        let mandatory = self.provision(recorder, &names, &plan, &version);
        let result = match tokio::time::timeout(config.job_deadline, mandatory).await {
            Ok(result) => result,
            Err(_) => Err(JobError::DeadlineExceeded(config.job_deadline.as_secs())),
        };

        let workload = match result {
            Ok(workload) => workload,
            Err(e) => {
                self.report_error(recorder, &e);
                rollback(self.services.backend(), recorder, &names.prefix).await;
                if let Some(dir) = &plan.sources_dir {
                    remove_sources(recorder, dir).await;
                }
                recorder.fail();
                return;
            }
        };

        recorder.info(
            LogCode::WorkloadReady,
            format!("Workload is reachable at {}", workload.url),
        );
        recorder.note(format!(
            "Log in with '{}' / '{}' and database '{}'.",
            config.admin.login, config.admin.password, names.database
        ));

        if plan.has_mounts() || !plan.extensions.is_empty() {
            self.install_extensions(recorder, &plan, &workload).await;
        }

        record_environment(self.services.history(), recorder, history_record(&workload)).await;

        recorder.complete(workload.url);
    }

    /// The mandatory steps. Any error here fails the job and triggers rollback.
    async fn provision(
        &self,
        recorder: &JobRecorder,
        names: &JobNames,
        plan: &ExtensionPlan,
        version: &str,
    ) -> Result<WorkloadInstance, JobError> {
        let config = &*self.config;
        let backend = self.services.backend();

        let spec = NetworkSpec {
            name: names.network.clone(),
            labels: job_labels(recorder.id(), names),
            ..Default::default()
        };
        let network = allocate_network(backend, recorder, spec, &config.subnet_search).await?;

        let database = start_database(backend, recorder, config, names, &network).await?;

        start_workload(
            backend, recorder, config, names, &network, &database, plan, version,
        )
        .await
    }

    /// Runs the installer in its own task so nothing it does, a panic included, can
    /// reach the job's outcome.
    async fn install_extensions(
        &self,
        recorder: &JobRecorder,
        plan: &ExtensionPlan,
        workload: &WorkloadInstance,
    ) {
        let targets = install_targets(plan, recorder);
        let management = self.services.management().clone();
        let config = self.config.clone();
        let task_recorder = recorder.clone();
        let endpoint = workload.endpoint.clone();

        let deadline = config.install_deadline;
        let mut task = tokio::spawn(
            async move {
                ExtensionInstaller::new(&management, &task_recorder, &config)
                    .run(&endpoint, &targets)
                    .await
            }
            .in_current_span(),
        );

        match tokio::time::timeout(deadline, &mut task).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => recorder.warn(
                LogCode::ExtensionFailed,
                format!("Extension installation aborted: {e}"),
            ),
            Err(_) => {
                task.abort();
                recorder.warn(
                    LogCode::ExtensionFailed,
                    format!(
                        "Extension installation gave up after {}s; install the rest manually.",
                        deadline.as_secs()
                    ),
                );
            }
        }
    }

    fn report_error(&self, recorder: &JobRecorder, err: &JobError) {
        recorder.error(err.code(), err.to_string());
        if let Some(hint) = err.remediation() {
            recorder.error(err.code(), hint);
        }
    }
}

async fn remove_sources(recorder: &JobRecorder, dir: &std::path::Path) {
    // The per-job directory is the parent of `extra_addons`.
    let target = dir.parent().unwrap_or(dir);
    match tokio::fs::remove_dir_all(target).await {
        Ok(()) => recorder.note(format!("Removed fetched sources at {}", target.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => recorder.warn(
            LogCode::CleanupFailed,
            format!("Could not remove {}: {e}", target.display()),
        ),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
