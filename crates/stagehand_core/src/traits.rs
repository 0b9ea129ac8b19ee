use crate::environment::*;
use crate::error::*;
use crate::history::HistoryRecord;
use crate::management::*;

use std::path::Path;

/// A trait for injecting the container/network runtime into the orchestrator.
pub trait ResourceBackend: Send + Sync + 'static + Clone {
    /// Checks that the backend is reachable.
    ///
    /// Fails with [`BackendError::Unavailable`] when it is not.
    fn ping(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Creates an isolated network.
    ///
    /// Must fail with [`BackendError::AddressSpaceExhausted`] (and nothing else) when the
    /// default address pools are used up, so the caller can fall back to an explicit subnet.
    fn create_network(
        &self,
        spec: &NetworkSpec,
    ) -> impl Future<Output = Result<NetworkInfo, BackendError>> + Send;

    /// Lists networks, optionally only those whose name starts with `name_prefix`.
    fn list_networks(
        &self,
        name_prefix: Option<&str>,
    ) -> impl Future<Output = Result<Vec<NetworkInfo>, BackendError>> + Send;

    /// Removes a network by id or name.
    fn remove_network(&self, id: &str) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Creates and starts an instance.
    fn run_instance(
        &self,
        spec: &InstanceSpec,
    ) -> impl Future<Output = Result<InstanceInfo, BackendError>> + Send;

    /// Re-reads the live state of an instance (running flag, assigned host port).
    fn inspect_instance(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<InstanceInfo, BackendError>> + Send;

    /// Lists instances (running or not) whose name starts with `name_prefix`.
    fn list_instances(
        &self,
        name_prefix: &str,
    ) -> impl Future<Output = Result<Vec<InstanceInfo>, BackendError>> + Send;

    /// Force-removes an instance, stopping it first if needed.
    fn remove_instance(&self, id: &str) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// A trait for the management surface of a running workload.
pub trait ManagementApi: Send + Sync + 'static + Clone {
    /// Cheap call used to find out whether the workload answers at all.
    fn version(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<String, ManagementError>> + Send;

    fn authenticate(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Session, ManagementError>> + Send;

    /// Asks the workload to rescan its extension search path.
    fn refresh_registry(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<(), ManagementError>> + Send;

    /// Looks up an extension by name. [`None`] if the registry doesn't know it.
    fn find_extension(
        &self,
        session: &Session,
        name: &str,
    ) -> impl Future<Output = Result<Option<ExtensionRecord>, ManagementError>> + Send;

    fn install_extension(
        &self,
        session: &Session,
        extension: &ExtensionRecord,
    ) -> impl Future<Output = Result<(), ManagementError>> + Send;
}

/// A trait for persisting the list of created environments.
pub trait HistoryStore: Send + Sync + 'static + Clone {
    /// Upserts a record, deduplicating by (identity, port).
    fn record(
        &self,
        record: HistoryRecord,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// All records, newest first.
    fn list(&self) -> impl Future<Output = Result<Vec<HistoryRecord>, StorageError>> + Send;
}

/// A trait for fetching remote extension sources onto the local filesystem.
pub trait SourceFetcher: Send + Sync + 'static + Clone {
    fn fetch(
        &self,
        source: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Bundles every collaborator the orchestrator needs.
pub trait ProvisionServices: Send + Sync + 'static + Clone {
    type Backend: ResourceBackend;
    type Management: ManagementApi;
    type History: HistoryStore;
    type Fetcher: SourceFetcher;

    fn backend(&self) -> &Self::Backend;
    fn management(&self) -> &Self::Management;
    fn history(&self) -> &Self::History;
    fn fetcher(&self) -> &Self::Fetcher;
}

/// The default set of services.
#[derive(Clone)]
pub struct CoreServices<B, M, H, F> {
    pub backend: B,
    pub management: M,
    pub history: H,
    pub fetcher: F,
}

impl<B, M, H, F> ProvisionServices for CoreServices<B, M, H, F>
where
    B: ResourceBackend,
    M: ManagementApi,
    H: HistoryStore,
    F: SourceFetcher,
{
    type Backend = B;
    type Management = M;
    type History = H;
    type Fetcher = F;

    fn backend(&self) -> &B {
        &self.backend
    }
    fn management(&self) -> &M {
        &self.management
    }
    fn history(&self) -> &H {
        &self.history
    }
    fn fetcher(&self) -> &F {
        &self.fetcher
    }
}
