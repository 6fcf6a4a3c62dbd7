use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use std::path::Path;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub staging_dir: String,
    pub staging_writable: bool,
    pub remote_bucket: Option<String>,
    pub version: String,
}

/// Creates and drops an anonymous temp file in `dir`
async fn is_writable(dir: &Path) -> bool {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || tempfile::tempfile_in(&dir).is_ok())
        .await
        .unwrap_or(false)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let staging_dir = &state.upload_service.config().staging_dir;
    let staging_writable = is_writable(staging_dir).await;

    let remote_bucket = Some(state.remote_store.bucket.clone()).filter(|b| !b.is_empty());

    Json(HealthResponse {
        status: "ok".to_string(),
        staging_dir: staging_dir.display().to_string(),
        staging_writable,
        remote_bucket,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
