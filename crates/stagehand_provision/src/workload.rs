use crate::config::{JobNames, ProvisionConfig};
use crate::dependency::{DatabaseInstance, generate_secret, job_labels};
use crate::readiness::wait_until_ready;
use crate::sources::ExtensionPlan;
use crate::store::JobRecorder;

use stagehand_core::prelude::*;
use std::collections::BTreeMap;

/// The application instance of one environment, reachable from the host.
#[derive(Debug, Clone)]
pub struct WorkloadInstance {
    pub info: InstanceInfo,
    pub host_port: u16,
    /// URL handed to users.
    pub url: String,
    /// Where the orchestrator reaches the management interface.
    pub endpoint: Endpoint,
    pub version: String,
}

/// Arguments for the workload entrypoint: target database and first-boot capabilities.
///
/// The extension search path is only overridden when something is mounted; an empty
/// mount directory in `--addons-path` keeps the workload from booting.
pub fn workload_command(
    config: &ProvisionConfig,
    database: &str,
    capabilities: &[String],
    with_mounts: bool,
) -> Vec<String> {
    let mut cmd = vec![
        format!("--database={database}"),
        format!("--init={}", capabilities.join(",")),
    ];
    if with_mounts {
        cmd.push(format!(
            "--addons-path={},{}",
            config.extension_mount, config.base_addons_path
        ));
    }
    cmd
}

#[allow(clippy::too_many_arguments)]
pub fn workload_spec(
    config: &ProvisionConfig,
    names: &JobNames,
    network: &NetworkInfo,
    database: &DatabaseInstance,
    plan: &ExtensionPlan,
    version: &str,
    master_password: &str,
    labels: BTreeMap<String, String>,
) -> InstanceSpec {
    InstanceSpec {
        name: names.workload_instance.clone(),
        image: config.workload_image_for(version),
        hostname: None,
        network: network.name.clone(),
        env: vec![
            ("HOST".into(), database.host.clone()),
            ("USER".into(), database.user.clone()),
            ("PASSWORD".into(), database.password.clone()),
            ("MASTER_PASSWORD".into(), master_password.to_string()),
        ],
        cmd: workload_command(config, &names.database, &plan.capabilities, plan.has_mounts()),
        mounts: plan.mounts.clone(),
        publish: Some(config.workload_port),
        labels,
    }
}

/// Starts the workload with its capabilities, waits for it to run and resolves the
/// host port it was published on.
#[allow(clippy::too_many_arguments)]
pub async fn start_workload<B: ResourceBackend>(
    backend: &B,
    recorder: &JobRecorder,
    config: &ProvisionConfig,
    names: &JobNames,
    network: &NetworkInfo,
    database: &DatabaseInstance,
    plan: &ExtensionPlan,
    version: &str,
) -> Result<WorkloadInstance, JobError> {
    let master_password = generate_secret();
    let spec = workload_spec(
        config,
        names,
        network,
        database,
        plan,
        version,
        &master_password,
        job_labels(recorder.id(), names),
    );

    recorder.note(format!(
        "Provisioning workload instance ({}) with capabilities: {}",
        spec.image,
        plan.capabilities.join(", ")
    ));
    let info = backend.run_instance(&spec).await?;
    recorder.info(
        LogCode::WorkloadStarted,
        format!("Workload instance '{}' started.", info.short_id()),
    );
    recorder.info(
        LogCode::Credential,
        format!("Master password: {master_password}"),
    );

    recorder.note("Waiting for workload to initialize (this may take a minute)...");
    let info = wait_until_ready(
        backend,
        &info,
        "Workload instance",
        config.ready_timeout,
        config.ready_poll,
        config.workload_settle,
    )
    .await?;

    let info = match info.host_port {
        Some(_) => info,
        None => backend.inspect_instance(&info.id).await?,
    };
    let Some(host_port) = info.host_port else {
        return Err(JobError::System(format!(
            "no host port published for {} on port {}",
            info.name, config.workload_port
        )));
    };

    Ok(WorkloadInstance {
        url: format!("http://{}:{host_port}", config.public_host),
        endpoint: Endpoint {
            base_url: format!("http://{}:{host_port}", config.management_host),
            database: names.database.clone(),
        },
        host_port,
        info,
        version: version.to_string(),
    })
}
