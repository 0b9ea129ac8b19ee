use stagehand_core::prelude::*;
use stagehand_docker::DockerBackend;
use stagehand_fs::JsonHistoryStore;
use stagehand_odoo::OdooRpc;
use stagehand_provision::prelude::*;
use stagehand_server::prelude::*;

use anyhow::Context;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address the HTTP API listens on.
    #[arg(long, env = "STAGEHAND_BIND", default_value = "0.0.0.0:3000")]
    pub bind: String,

    /// Where created environments are recorded.
    #[arg(long, env = "STAGEHAND_HISTORY_FILE", default_value = "environments.json")]
    pub history_file: PathBuf,

    /// Workload version used when a request names none.
    #[arg(long, env = "STAGEHAND_DEFAULT_VERSION")]
    pub default_version: Option<String>,

    /// A local extension directory mounted into every environment.
    #[arg(long, env = "STAGEHAND_LOCAL_EXTENSIONS")]
    pub local_extensions: Option<PathBuf>,

    /// Host name used in the environment URLs handed to clients.
    #[arg(long, env = "STAGEHAND_PUBLIC_HOST")]
    pub public_host: Option<String>,

    /// Upper bound for the mandatory steps of one job.
    #[arg(long, env = "STAGEHAND_JOB_DEADLINE_SECS")]
    pub job_deadline_secs: Option<u64>,

    /// Directory fetched extension sources are cloned into.
    #[arg(long, env = "STAGEHAND_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Path the environment routes are mounted under.
    #[arg(long, env = "STAGEHAND_ROUTE_PREFIX", default_value = "")]
    pub route_prefix: String,
}

impl ServeArgs {
    /// Folds the flags into the defaults. Unset flags keep the default.
    pub fn provision_config(&self) -> ProvisionConfig {
        let mut config = ProvisionConfig::default();
        if let Some(version) = &self.default_version {
            config.default_version = version.clone();
        }
        if let Some(dir) = &self.local_extensions {
            config.local_extension_dir = Some(dir.clone());
        }
        if let Some(host) = &self.public_host {
            config.public_host = host.clone();
        }
        if let Some(secs) = self.job_deadline_secs {
            config.job_deadline = Duration::from_secs(secs);
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        config
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            route_prefix: self.route_prefix.clone(),
        }
    }
}

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let backend = DockerBackend::connect_local().context("connecting to the Docker daemon")?;
    let services = CoreServices {
        backend,
        management: OdooRpc::new(),
        history: JsonHistoryStore::new(&args.history_file),
        fetcher: GitFetcher,
    };

    let provisioner = Provisioner::new(services, args.provision_config());
    let app = StagehandServer::new(args.server_config()).build(provisioner);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    tracing::info!(
        bind = %args.bind,
        history = %args.history_file.display(),
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
    }
}
