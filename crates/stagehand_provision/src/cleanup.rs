use crate::store::JobRecorder;

use stagehand_core::prelude::*;

/// What a rollback managed to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub instances: Vec<String>,
    pub networks: Vec<String>,
    pub errors: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Force-removes every instance and network whose name starts with `prefix`.
///
/// Matches by prefix rather than by the ids created in this run, so leftovers of
/// half-finished steps go too. Never fails; problems end up in the log and the report.
pub async fn rollback<B: ResourceBackend>(
    backend: &B,
    recorder: &JobRecorder,
    prefix: &str,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    recorder.info(
        LogCode::CleanupStarted,
        format!("Cleaning up resources for {prefix}..."),
    );

    // Instances first; a network with attached endpoints can't be removed.
    match backend.list_instances(prefix).await {
        Ok(instances) => {
            for instance in instances {
                match backend.remove_instance(&instance.id).await {
                    Ok(()) => {
                        recorder.info(
                            LogCode::ResourceRemoved,
                            format!("Removed instance {}", instance.name),
                        );
                        report.instances.push(instance.name);
                    }
                    Err(e) => report
                        .errors
                        .push(format!("instance {}: {e}", instance.name)),
                }
            }
        }
        Err(e) => report.errors.push(format!("listing instances: {e}")),
    }

    match backend.list_networks(Some(prefix)).await {
        Ok(networks) => {
            for network in networks {
                match backend.remove_network(&network.id).await {
                    Ok(()) => {
                        recorder.info(
                            LogCode::ResourceRemoved,
                            format!("Removed network {}", network.name),
                        );
                        report.networks.push(network.name);
                    }
                    Err(e) => report
                        .errors
                        .push(format!("network {}: {e}", network.name)),
                }
            }
        }
        Err(e) => report.errors.push(format!("listing networks: {e}")),
    }

    if report.is_clean() {
        recorder.info(LogCode::CleanupComplete, "Cleanup complete.");
    } else {
        recorder.warn(
            LogCode::CleanupFailed,
            format!("Cleanup encountered an error: {}", report.errors.join("; ")),
        );
        recorder.warn(
            LogCode::CleanupFailed,
            format!(
                "Some resources may need manual removal: \
                 'docker ps -a --filter name={prefix}' and 'docker network ls --filter name={prefix}'"
            ),
        );
    }

    report
}
