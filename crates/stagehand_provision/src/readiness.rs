use stagehand_core::prelude::*;

use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Polls the backend until the instance reports running, then pauses for `settle`.
///
/// Fails with [`JobError::ReadinessTimeout`] if it doesn't run within `timeout`.
pub async fn wait_until_ready<B: ResourceBackend>(
    backend: &B,
    instance: &InstanceInfo,
    what: &str,
    timeout: Duration,
    poll: Duration,
    settle: Duration,
) -> Result<InstanceInfo, JobError> {
    let deadline = Instant::now() + timeout;
    let info = loop {
        let info = backend.inspect_instance(&instance.id).await?;
        if info.running {
            break info;
        }
        if Instant::now() >= deadline {
            return Err(JobError::ReadinessTimeout {
                what: what.to_string(),
                secs: timeout.as_secs(),
            });
        }
        sleep(poll).await;
    };

    tracing::debug!(instance = %info.name, settle_ms = settle.as_millis() as u64, "Instance running, settling");
    sleep(settle).await;

    Ok(info)
}
