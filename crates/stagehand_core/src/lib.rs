//! # Stagehand Core
//!
//! Types and traits shared by the stagehand crates.
//!
//! Defines the contract between the provisioning orchestrator and the systems it drives.
//!
//! - **[`Job`](job::Job)**: Mutable, polled state of one provisioning request.
//! - **[`ResourceBackend`](traits::ResourceBackend)**: Trait for the runtime that creates networks and instances (e.g. Docker).
//! - **[`ManagementApi`](traits::ManagementApi)**: Trait for the in-band management surface of a running workload.
//! - **[`HistoryStore`](traits::HistoryStore)**: Trait for persisting the list of created environments.

pub mod constants;
pub mod environment;
pub mod error;
pub mod history;
pub mod job;
pub mod management;
pub mod traits;

pub mod prelude {
    pub use super::constants::*;
    pub use super::environment::*;
    pub use super::error::*;
    pub use super::history::*;
    pub use super::job::*;
    pub use super::management::*;
    pub use super::traits::*;
}
