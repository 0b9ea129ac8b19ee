use crate::config::{JobNames, ProvisionConfig};
use crate::readiness::wait_until_ready;
use crate::store::JobRecorder;

use stagehand_core::prelude::{defaults, labels, *};
use std::collections::BTreeMap;

/// The backing data store of one environment.
#[derive(Debug, Clone)]
pub struct DatabaseInstance {
    pub info: InstanceInfo,
    /// Name the workload uses to reach the data store on the job network.
    pub host: String,
    pub user: String,
    pub password: String,
}

/// A fresh 12 character credential.
pub fn generate_secret() -> String {
    let mut secret = uuid::Uuid::new_v4().simple().to_string();
    secret.truncate(12);
    secret
}

pub(crate) fn job_labels(job_id: &str, names: &JobNames) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::JOB.to_string(), job_id.to_string()),
        (labels::NAMESPACE.to_string(), names.prefix.clone()),
    ])
}

pub fn database_spec(
    config: &ProvisionConfig,
    names: &JobNames,
    network: &NetworkInfo,
    password: &str,
    labels: BTreeMap<String, String>,
) -> InstanceSpec {
    InstanceSpec {
        name: names.database_instance.clone(),
        image: config.database_image.clone(),
        hostname: Some(names.database_instance.clone()),
        network: network.name.clone(),
        env: vec![
            ("POSTGRES_USER".into(), config.database_user.clone()),
            ("POSTGRES_PASSWORD".into(), password.to_string()),
            ("POSTGRES_DB".into(), defaults::DATABASE_MAINTENANCE_DB.into()),
        ],
        labels,
        ..Default::default()
    }
}

/// Starts the data store with a new credential and waits for it to settle.
///
/// The credential is written to the job log; this is a development-mode concession.
pub async fn start_database<B: ResourceBackend>(
    backend: &B,
    recorder: &JobRecorder,
    config: &ProvisionConfig,
    names: &JobNames,
    network: &NetworkInfo,
) -> Result<DatabaseInstance, JobError> {
    let password = generate_secret();
    let spec = database_spec(
        config,
        names,
        network,
        &password,
        job_labels(recorder.id(), names),
    );

    recorder.note(format!(
        "Provisioning database instance ({})...",
        config.database_image
    ));
    let info = backend.run_instance(&spec).await?;
    recorder.info(
        LogCode::DependencyStarted,
        format!("Database instance '{}' started.", info.short_id()),
    );
    recorder.info(
        LogCode::Credential,
        format!("Database user: '{}'", config.database_user),
    );
    recorder.info(LogCode::Credential, format!("Database password: {password}"));

    recorder.note("Waiting for database to initialize...");
    let info = wait_until_ready(
        backend,
        &info,
        "Database instance",
        config.ready_timeout,
        config.ready_poll,
        config.database_settle,
    )
    .await?;

    Ok(DatabaseInstance {
        info,
        host: names.database_instance.clone(),
        user: config.database_user.clone(),
        password,
    })
}
