//! # Mock Server Example
//!
//! Showcases a [`StagehandServer`] backed entirely by in-memory collaborators. Jobs run
//! through every step without Docker, so the API can be explored with `curl`.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --example mock_server --features "server mock"
//!
//! curl -X POST localhost:3000/environments -H 'content-type: application/json' \
//!     -d '{"capabilities":["crm","sale"]}'
//! curl localhost:3000/environments/jobs/<job_id>
//! ```

use stagehand::prelude::*;
use std::env;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // Don't use this in production! Nothing is actually created.
    let services = mock_services(InMemoryBackend::new(), ScriptedManagement::new());

    // Skip the settle waits, the mock backend is ready immediately.
    let config = ProvisionConfig::default().without_waits();

    // Build App
    let provisioner = Provisioner::new(services, config);
    let app = StagehandServer::default().build(provisioner);

    // Serve
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");
    println!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
