//! # Stagehand
//![![License](https://img.shields.io/badge/license-MIT%2FApache-blue.svg)](https://github.com/stagehand-rs/stagehand#license)
//!
//! Provisions disposable multi-container application environments on demand: an isolated
//! network, a database instance and an application instance, with extensions installed
//! after boot. Clients submit a request, get a job id back immediately and poll it.
//!
//! This crate serves as an entry point, re-exporting the core types and the orchestrator,
//! and optionally including the server and the backend implementations via feature flags.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **`server`** | Includes the Axum-based HTTP surface (`stagehand_server`). |
//! | **`docker`** | Resource backend for the Docker Engine API (`stagehand_docker`). |
//! | **`odoo`** | JSON-RPC management client for the workload (`stagehand_odoo`). |
//! | **`fs`** | History store on the local filesystem (`stagehand_fs`). |
//! | **`mock`** | In-memory collaborators for development and tests (`stagehand_mock`). |
//!
//! ## Example: Docker Server
//!
//! ```toml
//! [dependencies]
//! stagehand = { version = "0.3", features = ["server", "docker", "odoo", "fs"] }
//! ```
//!
//! ```rust,no_run
//! use stagehand::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let services = CoreServices {
//!         backend: DockerBackend::connect_local().unwrap(),
//!         management: OdooRpc::new(),
//!         history: JsonHistoryStore::new("./environments.json"),
//!         fetcher: GitFetcher,
//!     };
//!
//!     // Build
//!     let provisioner = Provisioner::new(services, ProvisionConfig::default());
//!     let app = StagehandServer::default().build(provisioner);
//!
//!     // Serve
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub use stagehand_core::*;

pub mod provision {
    pub use stagehand_provision::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use stagehand_server::*;
}

#[cfg(feature = "docker")]
pub mod docker {
    pub use stagehand_docker::*;
}

#[cfg(feature = "odoo")]
pub mod odoo {
    pub use stagehand_odoo::*;
}

#[cfg(feature = "fs")]
pub mod fs {
    pub use stagehand_fs::*;
}

#[cfg(feature = "mock")]
pub mod mock {
    pub use stagehand_mock::*;
}

pub mod prelude {
    pub use stagehand_core::prelude::*;
    pub use stagehand_provision::prelude::*;

    #[cfg(feature = "server")]
    pub use stagehand_server::prelude::*;

    #[cfg(feature = "docker")]
    pub use stagehand_docker::DockerBackend;

    #[cfg(feature = "odoo")]
    pub use stagehand_odoo::OdooRpc;

    #[cfg(feature = "fs")]
    pub use stagehand_fs::JsonHistoryStore;

    #[cfg(feature = "mock")]
    pub use stagehand_mock::{
        InMemoryBackend, MemoryHistory, MockServices, ScriptedFetcher, ScriptedManagement,
        mock_services,
    };
}
