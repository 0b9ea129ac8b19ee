use stagehand_core::prelude::*;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    extensions: BTreeMap<String, ExtensionState>,
    unreachable_calls: Option<u32>,
    reject_login: bool,
    refresh_locks: u32,
    install_locks: u32,
    refresh_error: Option<ManagementError>,
    install_error: Option<ManagementError>,
    panic_on_install: bool,
    hang_on_install: bool,
    calls: Vec<String>,
}

/// A workload registry driven by a script.
///
/// Extensions registered with [`with_extension`](Self::with_extension) are the ones the
/// registry knows; everything else is reported as missing.
#[derive(Clone, Default)]
pub struct ScriptedManagement {
    state: Arc<Mutex<State>>,
}

impl ScriptedManagement {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_extension(self, name: &str, state: ExtensionState) -> Self {
        self.state().extensions.insert(name.to_string(), state);
        self
    }

    /// Never answers.
    pub fn unreachable(self) -> Self {
        self.state().unreachable_calls = Some(u32::MAX);
        self
    }

    /// Fails the first `calls` probes, then answers.
    pub fn unreachable_for(self, calls: u32) -> Self {
        self.state().unreachable_calls = Some(calls);
        self
    }

    pub fn rejecting_login(self) -> Self {
        self.state().reject_login = true;
        self
    }

    /// The next `count` registry refreshes report a scheduled-task lock.
    pub fn locked_refreshes(self, count: u32) -> Self {
        self.state().refresh_locks = count;
        self
    }

    /// The next `count` installs report a scheduled-task lock.
    pub fn locked_installs(self, count: u32) -> Self {
        self.state().install_locks = count;
        self
    }

    pub fn failing_refresh(self, error: ManagementError) -> Self {
        self.state().refresh_error = Some(error);
        self
    }

    pub fn failing_installs(self, error: ManagementError) -> Self {
        self.state().install_error = Some(error);
        self
    }

    /// Installing panics, as a stand-in for a bug in the installer path.
    pub fn panicking_installs(self) -> Self {
        self.state().panic_on_install = true;
        self
    }

    /// Installing never returns.
    pub fn hanging_installs(self) -> Self {
        self.state().hang_on_install = true;
        self
    }

    /// Names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn state_of(&self, name: &str) -> Option<ExtensionState> {
        self.state().extensions.get(name).cloned()
    }
}

impl ManagementApi for ScriptedManagement {
    async fn version(&self, _endpoint: &Endpoint) -> Result<String, ManagementError> {
        let mut state = self.state();
        state.calls.push("version".into());
        if let Some(remaining) = state.unreachable_calls.as_mut()
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ManagementError::Unreachable("Connection refused".into()));
        }
        Ok("19.0".into())
    }

    async fn authenticate(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Session, ManagementError> {
        let mut state = self.state();
        state.calls.push("authenticate".into());
        if state.reject_login {
            return Err(ManagementError::AuthenticationFailed(
                credentials.login.clone(),
            ));
        }
        Ok(Session {
            endpoint: endpoint.clone(),
            uid: 2,
            password: credentials.password.clone(),
        })
    }

    async fn refresh_registry(&self, _session: &Session) -> Result<(), ManagementError> {
        let mut state = self.state();
        state.calls.push("refresh_registry".into());
        if state.refresh_locks > 0 {
            state.refresh_locks -= 1;
            return Err(ManagementError::Locked(
                "could not obtain lock on row in relation \"ir_cron\"".into(),
            ));
        }
        match state.refresh_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn find_extension(
        &self,
        _session: &Session,
        name: &str,
    ) -> Result<Option<ExtensionRecord>, ManagementError> {
        let mut state = self.state();
        state.calls.push(format!("find_extension:{name}"));
        Ok(state
            .extensions
            .iter()
            .enumerate()
            .find(|(_, (n, _))| n.as_str() == name)
            .map(|(i, (n, s))| ExtensionRecord {
                id: i as i64 + 1,
                name: n.clone(),
                state: s.clone(),
            }))
    }

    async fn install_extension(
        &self,
        _session: &Session,
        extension: &ExtensionRecord,
    ) -> Result<(), ManagementError> {
        let hang = {
            let mut state = self.state();
            state.calls.push(format!("install_extension:{}", extension.name));
            state.hang_on_install
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state();
        if state.panic_on_install {
            drop(state);
            panic!("simulated crash while installing {}", extension.name);
        }
        if state.install_locks > 0 {
            state.install_locks -= 1;
            return Err(ManagementError::Locked("Invalid Operation".into()));
        }
        if let Some(e) = state.install_error.clone() {
            return Err(e);
        }
        state
            .extensions
            .insert(extension.name.clone(), ExtensionState::Installed);
        Ok(())
    }
}
