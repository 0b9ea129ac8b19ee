//! # Stagehand Mock
//!
//! In-memory collaborators for development and testing.
//!
//! Nothing here touches a container runtime, the network or the disk. Every type can be
//! told to misbehave (exhausted address pools, failing instances, a locked registry...)
//! so failure paths can be exercised deterministically.
//!
//! **DO NOT use this in production!!!**
//!
//! ## Usage
//!
//! ```rust
//! # use stagehand_mock::*;
//! # fn main() {
//! let services = mock_services(
//!     InMemoryBackend::new().with_exhausted_pools(),
//!     ScriptedManagement::new(),
//! );
//! # }
//! ```

mod backend;
mod fetcher;
mod history;
mod management;

pub use backend::InMemoryBackend;
pub use fetcher::ScriptedFetcher;
pub use history::MemoryHistory;
pub use management::ScriptedManagement;

use stagehand_core::prelude::CoreServices;

pub type MockServices =
    CoreServices<InMemoryBackend, ScriptedManagement, MemoryHistory, ScriptedFetcher>;

/// Bundles a backend and a management mock with an empty history and a fetcher that
/// knows no sources.
pub fn mock_services(backend: InMemoryBackend, management: ScriptedManagement) -> MockServices {
    CoreServices {
        backend,
        management,
        history: MemoryHistory::new(),
        fetcher: ScriptedFetcher::new(),
    }
}
