//! # Stagehand Server
//!
//! An Axum-based HTTP surface for the provisioning orchestrator.
//!
//! Provides the [`StagehandServer`] builder, which wraps a [`Provisioner`](stagehand_provision::prelude::Provisioner)
//! in a router clients use to submit environments and poll their jobs.
//!
//! ## Routes
//!
//! * **`GET /health`**: liveness, answers `OK`.
//! * **`POST /environments`**: submits a request, answers `202` with the job id.
//! * **`GET /environments/jobs/{id}`**: the job's status, log and result url.
//! * **`GET /environments/history`**: every environment created so far, newest first.
//!
//! ## Example
//!
//! ```no_run
//! use stagehand_server::prelude::*;
//! use stagehand_provision::prelude::*;
//! use stagehand_mock::*;
//!
//! # async fn run() {
//! let services = mock_services(InMemoryBackend::new(), ScriptedManagement::new());
//! let provisioner = Provisioner::new(services, ProvisionConfig::default());
//!
//! let app = StagehandServer::default().build(provisioner);
//! # }
//! ```

mod api;
mod server;

pub mod state;

pub use server::{ServerConfig, StagehandServer};

pub mod prelude {
    pub use crate::state::*;
    pub use crate::{ServerConfig, StagehandServer};
}
