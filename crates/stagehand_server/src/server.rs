use crate::{api, prelude::*};
use stagehand_core::prelude::*;
use stagehand_provision::prelude::*;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// The builder for the Stagehand Server.
#[derive(Clone, Debug, Default)]
pub struct StagehandServer {
    config: ServerConfig,
}

impl StagehandServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    /// Path the environment routes are mounted under, e.g. `/api`.
    ///
    /// Defaults to the root. `/health` is never prefixed.
    pub route_prefix: String,
}

impl StagehandServer {
    pub fn build<S: ProvisionServices>(self, provisioner: Provisioner<S>) -> Router {
        let ServerConfig { route_prefix } = self.config;

        let environments = Router::new()
            .route(routes::ENVIRONMENTS, post(api::submit_environment))
            .route(routes::ENVIRONMENT_JOB_BY_ID, get(api::job_status))
            .route(routes::ENVIRONMENT_HISTORY, get(api::history));

        let prefix = route_prefix.trim_matches('/');
        let environments = if prefix.is_empty() {
            environments
        } else {
            Router::new().nest(&format!("/{prefix}"), environments)
        };

        Router::new()
            .route(routes::HEALTH, get(|| async { "OK" }))
            .merge(environments)
            .layer(TraceLayer::new_for_http())
            .with_state(AppState { provisioner })
    }
}
