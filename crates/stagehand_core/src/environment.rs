use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A request to the [`ResourceBackend`](crate::traits::ResourceBackend) for an isolated network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    /// Explicit CIDR block. If [`None`], the backend picks one from its default pools.
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub labels: BTreeMap<String, String>,
}

/// A network as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
    /// CIDR blocks claimed by this network. May include IPv6 blocks.
    pub subnets: Vec<String>,
}

/// A host directory made visible inside an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

impl Mount {
    pub fn read_write(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// `source:target:mode`, the bind syntax understood by container runtimes.
    pub fn to_bind(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{}", self.source.display(), self.target, mode)
    }
}

/// A request to the backend to create and start an instance (container).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    pub image: String,
    pub hostname: Option<String>,
    /// Name of the network to attach to.
    pub network: String,
    pub env: Vec<(String, String)>,
    /// Arguments passed to the image entrypoint. Empty keeps the image default.
    pub cmd: Vec<String>,
    pub mounts: Vec<Mount>,
    /// Container port to publish on a host port chosen by the backend.
    pub publish: Option<u16>,
    pub labels: BTreeMap<String, String>,
}

/// An instance as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: String,
    pub name: String,
    pub running: bool,
    /// Host port bound to the published container port, once assigned.
    pub host_port: Option<u16>,
}

impl InstanceInfo {
    /// First 12 characters of the id, the form operators usually see.
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}
