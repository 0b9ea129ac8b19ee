//! Second-phase setup of a running workload.
//!
//! Extensions mounted into the workload are unknown to its registry until it rescans
//! the search path, so they are registered and installed over the management
//! interface once the workload answers. Nothing here can fail the job: every problem
//! is logged as a warning and the installer stops or moves on.

use crate::config::ProvisionConfig;
use crate::retry::retry;
use crate::sources::{ExtensionPlan, discover_extensions};
use crate::store::JobRecorder;

use stagehand_core::prelude::*;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Connecting,
    Authenticating,
    RefreshingRegistry,
    Installing,
    Done,
}

/// What the installer got through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// The last phase entered. Anything short of [`InstallPhase::Done`] means it stopped early.
    pub phase: InstallPhase,
    pub installed: Vec<String>,
    /// Already installed or queued, left alone.
    pub skipped: Vec<String>,
    /// Unknown to the registry.
    pub missing: Vec<String>,
    pub failed: Vec<String>,
}

impl Default for InstallOutcome {
    fn default() -> Self {
        Self {
            phase: InstallPhase::Connecting,
            installed: Vec::new(),
            skipped: Vec::new(),
            missing: Vec::new(),
            failed: Vec::new(),
        }
    }
}

enum Step {
    Connecting,
    Authenticating,
    Refreshing(Session),
    Installing(Session),
    Done,
}

impl Step {
    fn phase(&self) -> InstallPhase {
        match self {
            Self::Connecting => InstallPhase::Connecting,
            Self::Authenticating => InstallPhase::Authenticating,
            Self::Refreshing(_) => InstallPhase::RefreshingRegistry,
            Self::Installing(_) => InstallPhase::Installing,
            Self::Done => InstallPhase::Done,
        }
    }
}

/// The extensions to install: the requested ones, or whatever carries a manifest in
/// the mounted directories.
pub fn install_targets(plan: &ExtensionPlan, recorder: &JobRecorder) -> Vec<String> {
    if !plan.extensions.is_empty() {
        return plan.extensions.clone();
    }

    let found = discover_extensions(&plan.scan_dirs);
    if !found.is_empty() {
        recorder.info(
            LogCode::ExtensionsDiscovered,
            format!("Discovered extensions: {}", found.join(", ")),
        );
    }
    found
}

/// Drives a workload's registry through connect, login, rescan and install.
pub struct ExtensionInstaller<'a, M> {
    management: &'a M,
    recorder: &'a JobRecorder,
    config: &'a ProvisionConfig,
}

impl<'a, M: ManagementApi> ExtensionInstaller<'a, M> {
    pub fn new(management: &'a M, recorder: &'a JobRecorder, config: &'a ProvisionConfig) -> Self {
        Self {
            management,
            recorder,
            config,
        }
    }

    pub async fn run(&self, endpoint: &Endpoint, targets: &[String]) -> InstallOutcome {
        let mut outcome = InstallOutcome::default();
        if targets.is_empty() {
            self.recorder.note("No extensions to install.");
            outcome.phase = InstallPhase::Done;
            return outcome;
        }

        self.recorder.note(format!(
            "Installing extensions: {}",
            targets.join(", ")
        ));

        let mut step = Step::Connecting;
        loop {
            outcome.phase = step.phase();
            step = match step {
                Step::Connecting => {
                    if !self.connect(endpoint).await {
                        return outcome;
                    }
                    Step::Authenticating
                }
                Step::Authenticating => {
                    match self.management.authenticate(endpoint, &self.config.admin).await {
                        Ok(session) => Step::Refreshing(session),
                        Err(e) => {
                            self.recorder.warn(
                                LogCode::AuthenticationFailed,
                                format!("Could not log in to the workload: {e}"),
                            );
                            return outcome;
                        }
                    }
                }
                Step::Refreshing(session) => {
                    self.refresh(&session).await;
                    Step::Installing(session)
                }
                Step::Installing(session) => {
                    for name in targets {
                        self.install(&session, name, &mut outcome).await;
                    }
                    Step::Done
                }
                Step::Done => {
                    tracing::debug!(
                        job_id = %self.recorder.id(),
                        installed = outcome.installed.len(),
                        skipped = outcome.skipped.len(),
                        missing = outcome.missing.len(),
                        failed = outcome.failed.len(),
                        "Extension installer finished"
                    );
                    return outcome;
                }
            };
        }
    }

    async fn connect(&self, endpoint: &Endpoint) -> bool {
        self.recorder
            .note("Waiting for the management interface to respond...");
        let attempts = self.config.management_attempts.max(1);

        for attempt in 1..=attempts {
            match self.management.version(endpoint).await {
                Ok(version) => {
                    self.recorder
                        .note(format!("Management interface is up (server {version})."));
                    return true;
                }
                Err(e) => {
                    tracing::debug!(job_id = %self.recorder.id(), attempt, error = %e, "Management interface not ready");
                }
            }
            if attempt < attempts {
                sleep(self.config.management_poll).await;
            }
        }

        self.recorder.warn(
            LogCode::ManagementUnreachable,
            format!(
                "Management interface did not respond after {attempts} attempts; \
                 skipping extension installation."
            ),
        );
        false
    }

    fn on_locked(&self, what: &str) -> impl FnMut(u32, Duration, &ManagementError) {
        let max = self.config.lock_retry.max_attempts;
        let what = what.to_string();
        move |attempt, delay, _| {
            self.recorder.warn(
                LogCode::RegistryLocked,
                format!(
                    "{what} is locked by a running task (attempt {attempt}/{max}); \
                     retrying in {}s...",
                    delay.as_secs()
                ),
            );
        }
    }

    async fn refresh(&self, session: &Session) {
        self.recorder.note("Updating the extension registry...");
        let management = self.management;

        let res = retry(
            &self.config.lock_retry,
            move |_| management.refresh_registry(session),
            ManagementError::is_locked,
            self.on_locked("Registry update"),
        )
        .await;

        match res {
            Ok(()) => {
                self.recorder
                    .info(LogCode::RegistryRefreshed, "Extension registry updated.");
                sleep(self.config.registry_settle).await;
            }
            Err(e) => self.recorder.warn(
                LogCode::RegistryRefreshFailed,
                format!("Could not update the extension registry: {e}. Continuing."),
            ),
        }
    }

    async fn install(&self, session: &Session, name: &str, outcome: &mut InstallOutcome) {
        let management = self.management;

        let found = retry(
            &self.config.lock_retry,
            move |_| management.find_extension(session, name),
            ManagementError::is_locked,
            self.on_locked("Registry lookup"),
        )
        .await;

        let extension = match found {
            Ok(Some(extension)) => extension,
            Ok(None) => {
                self.recorder.warn(
                    LogCode::ExtensionNotFound,
                    format!("Extension '{name}' not found in the registry; skipping."),
                );
                outcome.missing.push(name.to_string());
                return;
            }
            Err(e) => {
                self.recorder.warn(
                    LogCode::ExtensionFailed,
                    format!("Could not look up extension '{name}': {e}"),
                );
                outcome.failed.push(name.to_string());
                return;
            }
        };

        if extension.state != ExtensionState::Uninstalled {
            self.recorder.info(
                LogCode::ExtensionSkipped,
                format!("Extension '{name}' is {}; skipping.", extension.state),
            );
            outcome.skipped.push(name.to_string());
            return;
        }

        self.recorder
            .note(format!("Installing extension '{name}'..."));
        let extension = &extension;
        let res = retry(
            &self.config.lock_retry,
            move |_| management.install_extension(session, extension),
            ManagementError::is_locked,
            self.on_locked("Installation"),
        )
        .await;

        match res {
            Ok(()) => {
                self.recorder.info(
                    LogCode::ExtensionInstalled,
                    format!("Extension '{name}' installed."),
                );
                outcome.installed.push(name.to_string());
            }
            Err(e) => {
                self.recorder.warn(
                    LogCode::ExtensionFailed,
                    format!("Failed to install extension '{name}': {e}"),
                );
                outcome.failed.push(name.to_string());
            }
        }
    }
}
