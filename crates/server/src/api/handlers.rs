use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use arrwarden_core::{SanitizedConfig, SupervisorStatus, WorkerStatus};

use crate::metrics;
use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub config_hash: String,
    pub restarts: u64,
    #[serde(flatten)]
    pub supervisor: SupervisorStatus,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
    })
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: VERSION.to_string(),
        config_hash: state.config_hash(),
        restarts: state.restarts(),
        supervisor: state.supervisor().status(),
    })
}

pub async fn get_instance_status(
    State(state): State<Arc<AppState>>,
    Path(instance): Path<String>,
) -> Result<Json<WorkerStatus>, (StatusCode, Json<ErrorResponse>)> {
    state
        .supervisor()
        .status()
        .workers
        .into_iter()
        .find(|w| w.instance == instance)
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("No running worker for instance '{}'", instance),
                }),
            )
        })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    metrics::collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}
