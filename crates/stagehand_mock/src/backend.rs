use stagehand_core::prelude::*;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const EXHAUSTED: &str = "could not find an available, non-overlapping IPv4 address pool \
                         among the defaults to assign to the network";

#[derive(Debug, Clone)]
struct NetworkEntry {
    info: NetworkInfo,
    spec: NetworkSpec,
}

#[derive(Debug, Clone)]
struct InstanceEntry {
    info: InstanceInfo,
    spec: InstanceSpec,
}

#[derive(Debug)]
struct State {
    networks: Vec<NetworkEntry>,
    instances: Vec<InstanceEntry>,
    next_id: u64,
    next_port: u16,
    next_pool: u8,
    unavailable: bool,
    exhausted_pools: bool,
    failing_suffixes: Vec<String>,
    stuck: bool,
    unpublished: bool,
    run_delay: Duration,
}

impl Default for State {
    fn default() -> Self {
        Self {
            networks: Vec::new(),
            instances: Vec::new(),
            next_id: 1,
            next_port: 49152,
            next_pool: 0,
            unavailable: false,
            exhausted_pools: false,
            failing_suffixes: Vec::new(),
            stuck: false,
            unpublished: false,
            run_delay: Duration::ZERO,
        }
    }
}

impl State {
    fn id(&mut self, kind: &str) -> String {
        let id = format!("{kind}{:060x}", self.next_id);
        self.next_id += 1;
        id
    }
}

/// A container runtime that lives in a mutex.
///
/// Default networks get `10.<n>.0.0/16` blocks; published ports count up from 49152.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call fails with [`BackendError::Unavailable`].
    pub fn unavailable(self) -> Self {
        self.state().unavailable = true;
        self
    }

    /// Networks without an explicit subnet fail with [`BackendError::AddressSpaceExhausted`].
    pub fn with_exhausted_pools(self) -> Self {
        self.state().exhausted_pools = true;
        self
    }

    /// Registers a network that exists before any job runs.
    pub fn with_network(self, name: &str, subnet: &str) -> Self {
        {
            let mut state = self.state();
            let id = state.id("net");
            state.networks.push(NetworkEntry {
                info: NetworkInfo {
                    id,
                    name: name.to_string(),
                    subnets: vec![subnet.to_string()],
                },
                spec: NetworkSpec {
                    name: name.to_string(),
                    subnet: Some(subnet.to_string()),
                    ..Default::default()
                },
            });
        }
        self
    }

    /// Starting an instance whose name ends with `suffix` fails.
    pub fn failing_instance(self, suffix: &str) -> Self {
        self.state().failing_suffixes.push(suffix.to_string());
        self
    }

    /// Instances are created but never report running.
    pub fn stuck_instances(self) -> Self {
        self.state().stuck = true;
        self
    }

    /// Published ports are never assigned.
    pub fn without_published_ports(self) -> Self {
        self.state().unpublished = true;
        self
    }

    /// Every instance start takes this long.
    pub fn with_run_delay(self, delay: Duration) -> Self {
        self.state().run_delay = delay;
        self
    }

    pub fn networks(&self) -> Vec<NetworkInfo> {
        self.state().networks.iter().map(|n| n.info.clone()).collect()
    }

    pub fn network_spec(&self, name: &str) -> Option<NetworkSpec> {
        self.state()
            .networks
            .iter()
            .find(|n| n.info.name == name)
            .map(|n| n.spec.clone())
    }

    pub fn instances(&self) -> Vec<InstanceInfo> {
        self.state().instances.iter().map(|i| i.info.clone()).collect()
    }

    /// The [`InstanceSpec`] an instance was started with.
    pub fn instance_spec(&self, name: &str) -> Option<InstanceSpec> {
        self.state()
            .instances
            .iter()
            .find(|i| i.info.name == name)
            .map(|i| i.spec.clone())
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.state().unavailable {
            return Err(BackendError::Unavailable(
                "Cannot connect to the mock daemon".into(),
            ));
        }
        Ok(())
    }
}

impl ResourceBackend for InMemoryBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        self.check_available()
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkInfo, BackendError> {
        self.check_available()?;
        let mut state = self.state();

        if state.networks.iter().any(|n| n.info.name == spec.name) {
            return Err(BackendError::InvalidRequest(format!(
                "network with name {} already exists",
                spec.name
            )));
        }

        let subnet = match &spec.subnet {
            Some(subnet) => {
                if state.networks.iter().any(|n| n.info.subnets.contains(subnet)) {
                    return Err(BackendError::InvalidRequest(
                        "Pool overlaps with other one on this address space".into(),
                    ));
                }
                subnet.clone()
            }
            None if state.exhausted_pools => {
                return Err(BackendError::AddressSpaceExhausted(EXHAUSTED.into()));
            }
            None => {
                let pool = state.next_pool;
                state.next_pool = state.next_pool.wrapping_add(1);
                format!("10.{pool}.0.0/16")
            }
        };

        let info = NetworkInfo {
            id: state.id("net"),
            name: spec.name.clone(),
            subnets: vec![subnet],
        };
        state.networks.push(NetworkEntry {
            info: info.clone(),
            spec: spec.clone(),
        });

        Ok(info)
    }

    async fn list_networks(&self, name_prefix: Option<&str>) -> Result<Vec<NetworkInfo>, BackendError> {
        self.check_available()?;
        Ok(self
            .state()
            .networks
            .iter()
            .filter(|n| name_prefix.is_none_or(|p| n.info.name.starts_with(p)))
            .map(|n| n.info.clone())
            .collect())
    }

    async fn remove_network(&self, id: &str) -> Result<(), BackendError> {
        self.check_available()?;
        let mut state = self.state();
        let Some(pos) = state
            .networks
            .iter()
            .position(|n| n.info.id == id || n.info.name == id)
        else {
            return Err(BackendError::NotFound(format!("network {id}")));
        };

        let name = state.networks[pos].info.name.clone();
        if state.instances.iter().any(|i| i.spec.network == name) {
            return Err(BackendError::InvalidRequest(format!(
                "error while removing network: network {name} has active endpoints"
            )));
        }

        state.networks.remove(pos);
        Ok(())
    }

    async fn run_instance(&self, spec: &InstanceSpec) -> Result<InstanceInfo, BackendError> {
        self.check_available()?;
        let delay = self.state().run_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.instances.iter().any(|i| i.info.name == spec.name) {
            return Err(BackendError::InvalidRequest(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }
        if !state.networks.iter().any(|n| n.info.name == spec.network) {
            return Err(BackendError::NotFound(format!("network {}", spec.network)));
        }

        let failing = state
            .failing_suffixes
            .iter()
            .any(|s| spec.name.ends_with(s.as_str()));

        let host_port = match spec.publish {
            Some(_) if !state.unpublished => {
                let port = state.next_port;
                state.next_port = state.next_port.wrapping_add(1);
                Some(port)
            }
            _ => None,
        };
        let info = InstanceInfo {
            id: state.id("ctr"),
            name: spec.name.clone(),
            running: !state.stuck && !failing,
            host_port,
        };

        // The container exists even when it fails to start, like a real runtime.
        state.instances.push(InstanceEntry {
            info: info.clone(),
            spec: spec.clone(),
        });

        if failing {
            return Err(BackendError::System(format!(
                "failed to start container {}: simulated failure",
                spec.name
            )));
        }

        Ok(info)
    }

    async fn inspect_instance(&self, id: &str) -> Result<InstanceInfo, BackendError> {
        self.check_available()?;
        self.state()
            .instances
            .iter()
            .find(|i| i.info.id == id || i.info.name == id)
            .map(|i| i.info.clone())
            .ok_or_else(|| BackendError::NotFound(format!("No such container: {id}")))
    }

    async fn list_instances(&self, name_prefix: &str) -> Result<Vec<InstanceInfo>, BackendError> {
        self.check_available()?;
        Ok(self
            .state()
            .instances
            .iter()
            .filter(|i| i.info.name.starts_with(name_prefix))
            .map(|i| i.info.clone())
            .collect())
    }

    async fn remove_instance(&self, id: &str) -> Result<(), BackendError> {
        self.check_available()?;
        let mut state = self.state();
        let before = state.instances.len();
        state.instances.retain(|i| i.info.id != id && i.info.name != id);
        if state.instances.len() == before {
            return Err(BackendError::NotFound(format!("No such container: {id}")));
        }
        Ok(())
    }
}
