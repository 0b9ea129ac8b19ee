//! # Docker Server Example
//!
//! Showcases a [`StagehandServer`] creating real environments on the local Docker daemon,
//! installing extensions over JSON-RPC and recording them in a JSON file.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --example docker_server --features "server docker odoo fs"
//! ```

use stagehand::prelude::*;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Providers & Services
    let services = CoreServices {
        backend: DockerBackend::connect_local()?,
        management: OdooRpc::new(),
        history: JsonHistoryStore::new("./environments.json"),
        fetcher: GitFetcher,
    };

    // Mount a local extension into every environment, e.g. `LOCAL_EXTENSIONS=./my_module`.
    let config = ProvisionConfig {
        local_extension_dir: env::var("LOCAL_EXTENSIONS").ok().map(Into::into),
        ..ProvisionConfig::default()
    };

    // Build App
    let provisioner = Provisioner::new(services, config);
    let app = StagehandServer::default().build(provisioner);

    // Serve
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");
    println!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
