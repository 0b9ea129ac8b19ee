use crate::prelude::*;

use stagehand_core::prelude::*;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Some(err) = self.0.downcast_ref::<JobError>() {
            return match err {
                JobError::InvalidRequest(_) => (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "status": "invalid_request", "error": err.to_string() })),
                ),
                JobError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, Json(json!({ "status": "not_found" })))
                }
                _ => {
                    error!("Internal Server JobError: {:?}", self.0);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "status": "error", "error": "Job Error" })),
                    )
                }
            }
            .into_response();
        }

        if let Some(err) = self.0.downcast_ref::<StorageError>() {
            return match err {
                StorageError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                _ => {
                    error!("Internal Server StorageError: {:?}", self.0);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Storage Error".to_string(),
                    )
                }
            }
            .into_response();
        }

        error!("Internal Server Error: {:?}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// POST /environments
pub async fn submit_environment<S: ProvisionServices>(
    State(state): State<AppState<S>>,
    Json(request): Json<ProvisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let accepted = state.provisioner.submit(request)?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /environments/jobs/{id}
pub async fn job_status<S: ProvisionServices>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.provisioner.status(&id)?;
    Ok(Json(JobView::from(&job)))
}

/// GET /environments/history
pub async fn history<S: ProvisionServices>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.provisioner.history().await?;
    Ok(Json(records))
}
