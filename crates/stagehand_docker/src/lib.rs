//! # Stagehand Docker
//!
//! A [`ResourceBackend`] talking to the local Docker daemon through `bollard`.
//!
//! Networks are user-defined bridges; instances are containers attached to one of them.
//! Name filters sent to the daemon match substrings, so every listing is narrowed to a
//! real prefix match before it is returned.

use stagehand_core::prelude::*;

use bollard::Docker;
use bollard::config::ContainerCreateBody;
use bollard::errors::Error as DockerError;
use bollard::models::{
    ContainerInspectResponse, HostConfig, Ipam, IpamConfig, Network, NetworkCreateRequest,
    PortBinding,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, ListContainersOptions, ListNetworksOptions,
    RemoveContainerOptions,
};
use futures::TryStreamExt;
use std::collections::HashMap;

#[derive(Clone)]
pub struct DockerBackend {
    client: Docker,
}

impl DockerBackend {
    /// Connects to the local Docker socket (defaults to /var/run/docker.sock on Linux)
    pub fn connect_local() -> Result<Self, BackendError> {
        let client = Docker::connect_with_local_defaults().map_err(|e| {
            BackendError::Unavailable(format!("Failed to connect to Docker: {}", e))
        })?;
        Ok(Self { client })
    }

    pub fn from_client(client: Docker) -> Self {
        Self { client }
    }

    async fn pull_image(&self, image: &str) -> Result<(), BackendError> {
        let (repository, tag) = image_reference(image);
        tracing::info!(image, "Pulling image");

        let options = CreateImageOptions {
            from_image: Some(repository.to_string()),
            tag: Some(tag.to_string()),
            ..Default::default()
        };
        let progress: Vec<_> = self
            .client
            .create_image(Some(options), None, None)
            .try_collect()
            .await
            .map_err(|e| match map_error(e) {
                BackendError::NotFound(m) | BackendError::System(m) => {
                    BackendError::System(format!("Failed to pull {image}: {m}"))
                }
                other => other,
            })?;

        tracing::debug!(image, updates = progress.len(), "Image pulled");
        Ok(())
    }
}

/// Splits an image reference into repository and tag, defaulting to `latest`.
///
/// A colon before the last `/` belongs to a registry port, not a tag.
pub fn image_reference(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repository, tag)) if !tag.contains('/') => (repository, tag),
        _ => (image, "latest"),
    }
}

/// Whether a create failed only because the image is not present locally.
pub fn is_missing_image(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError { status_code: 404, message }
            if message.to_lowercase().contains("no such image")
    )
}

/// Sorts daemon errors into the backend error kinds the orchestrator acts on.
pub fn map_error(err: DockerError) -> BackendError {
    match err {
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => classify(status_code, message),
        DockerError::IOError { err } => BackendError::Unavailable(err.to_string()),
        DockerError::SocketNotFoundError(path) => {
            BackendError::Unavailable(format!("Docker socket not found at {path}"))
        }
        DockerError::RequestTimeoutError => {
            BackendError::Unavailable("Timed out talking to the Docker daemon".into())
        }
        other => BackendError::System(other.to_string()),
    }
}

/// Maps a daemon response by status code and message.
///
/// The daemon reports exhausted default pools as a plain 4xx/5xx with one of two
/// well-known messages, depending on version.
pub fn classify(status_code: u16, message: String) -> BackendError {
    let lower = message.to_lowercase();
    if lower.contains("fully subnetted") || lower.contains("non-overlapping ipv4 address pool") {
        return BackendError::AddressSpaceExhausted(message);
    }
    match status_code {
        404 => BackendError::NotFound(message),
        400 | 403 | 409 => BackendError::InvalidRequest(message),
        _ => BackendError::System(message),
    }
}

fn name_filter(prefix: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([("name".to_string(), vec![prefix.to_string()])])
}

fn port_key(port: u16) -> String {
    format!("{port}/tcp")
}

pub fn network_request(spec: &NetworkSpec) -> NetworkCreateRequest {
    let ipam = spec.subnet.as_ref().map(|subnet| Ipam {
        config: Some(vec![IpamConfig {
            subnet: Some(subnet.clone()),
            gateway: spec.gateway.clone(),
            ..Default::default()
        }]),
        ..Default::default()
    });

    NetworkCreateRequest {
        name: spec.name.clone(),
        driver: Some("bridge".to_string()),
        labels: Some(spec.labels.clone().into_iter().collect()),
        ipam,
        ..Default::default()
    }
}

pub fn container_body(spec: &InstanceSpec) -> ContainerCreateBody {
    let env: Vec<String> = spec
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    let binds: Vec<String> = spec.mounts.iter().map(Mount::to_bind).collect();

    let port_bindings = spec.publish.map(|port| {
        HashMap::from([(
            port_key(port),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: None,
            }]),
        )])
    });

    ContainerCreateBody {
        image: Some(spec.image.clone()),
        hostname: spec.hostname.clone(),
        cmd: (!spec.cmd.is_empty()).then(|| spec.cmd.clone()),
        env: Some(env),
        labels: Some(spec.labels.clone().into_iter().collect()),
        host_config: Some(HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            network_mode: Some(spec.network.clone()),
            port_bindings,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn network_info(network: Network) -> NetworkInfo {
    let subnets = network
        .ipam
        .and_then(|ipam| ipam.config)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| c.subnet)
        .collect();

    NetworkInfo {
        id: network.id.unwrap_or_default(),
        name: network.name.unwrap_or_default(),
        subnets,
    }
}

/// The host port bound to the first published TCP port, if the daemon assigned one.
pub fn published_port(inspect: &ContainerInspectResponse) -> Option<u16> {
    inspect
        .network_settings
        .as_ref()?
        .ports
        .as_ref()?
        .iter()
        .filter(|(key, _)| key.ends_with("/tcp"))
        .filter_map(|(_, bindings)| bindings.as_ref())
        .flatten()
        .find_map(|b| b.host_port.as_deref()?.parse().ok())
}

fn instance_info(inspect: ContainerInspectResponse) -> InstanceInfo {
    let host_port = published_port(&inspect);
    let running = inspect
        .state
        .as_ref()
        .and_then(|s| s.running)
        .unwrap_or(false);

    InstanceInfo {
        id: inspect.id.unwrap_or_default(),
        name: inspect
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        running,
        host_port,
    }
}

impl ResourceBackend for DockerBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        self.client.version().await.map_err(|e| match map_error(e) {
            BackendError::Unavailable(m) | BackendError::System(m) => {
                BackendError::Unavailable(format!("Docker unavailable: {m}"))
            }
            other => other,
        })?;

        Ok(())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkInfo, BackendError> {
        self.client
            .create_network(network_request(spec))
            .await
            .map_err(map_error)?;

        let network = self
            .client
            .inspect_network(&spec.name, None)
            .await
            .map_err(map_error)?;

        tracing::debug!(network = %spec.name, subnet = ?spec.subnet, "Docker network created");

        Ok(network_info(Network {
            id: network.id,
            name: network.name,
            ipam: network.ipam,
            ..Default::default()
        }))
    }

    async fn list_networks(&self, name_prefix: Option<&str>) -> Result<Vec<NetworkInfo>, BackendError> {
        let options = ListNetworksOptions {
            filters: name_prefix.map(name_filter),
            ..Default::default()
        };

        let networks = self
            .client
            .list_networks(Some(options))
            .await
            .map_err(map_error)?;

        Ok(networks
            .into_iter()
            .map(network_info)
            .filter(|n| name_prefix.is_none_or(|p| n.name.starts_with(p)))
            .collect())
    }

    async fn remove_network(&self, id: &str) -> Result<(), BackendError> {
        self.client.remove_network(id).await.map_err(map_error)
    }

    async fn run_instance(&self, spec: &InstanceSpec) -> Result<InstanceInfo, BackendError> {
        let options = || CreateContainerOptions {
            name: spec.name.clone().into(),
            ..Default::default()
        };

        let created = match self
            .client
            .create_container(Some(options()), container_body(spec))
            .await
        {
            Err(e) if is_missing_image(&e) => {
                self.pull_image(&spec.image).await?;
                self.client
                    .create_container(Some(options()), container_body(spec))
                    .await
                    .map_err(map_error)?
            }
            other => other.map_err(map_error)?,
        };

        self.client
            .start_container(spec.name.as_str(), None)
            .await
            .map_err(|e| match map_error(e) {
                BackendError::System(m) | BackendError::InvalidRequest(m) => {
                    BackendError::System(format!("Failed to start {}: {}", spec.name, m))
                }
                other => other,
            })?;

        tracing::debug!(container = %spec.name, id = %created.id, image = %spec.image, "Docker container started");

        self.inspect_instance(&created.id).await
    }

    async fn inspect_instance(&self, id: &str) -> Result<InstanceInfo, BackendError> {
        let inspect = self
            .client
            .inspect_container(id, None)
            .await
            .map_err(map_error)?;

        Ok(instance_info(inspect))
    }

    async fn list_instances(&self, name_prefix: &str) -> Result<Vec<InstanceInfo>, BackendError> {
        let options = ListContainersOptions {
            all: true,
            filters: Some(name_filter(name_prefix)),
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(map_error)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let name = c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .find(|n| n.starts_with(name_prefix))?;
                Some(InstanceInfo {
                    id: c.id.unwrap_or_default(),
                    name,
                    running: c.state.is_some_and(|s| s.to_string() == "running"),
                    host_port: None,
                })
            })
            .collect())
    }

    async fn remove_instance(&self, id: &str) -> Result<(), BackendError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        self.client
            .remove_container(id, Some(options))
            .await
            .map_err(map_error)
    }
}
