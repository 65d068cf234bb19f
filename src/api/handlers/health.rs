use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::JSend;
use crate::config::StorageBackend;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage_backend: String,
    pub version: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    let storage_backend = match state.config.storage.backend {
        StorageBackend::Local => "local",
        StorageBackend::S3 => "s3",
    };

    JSend::success(HealthResponse {
        status: "ok".to_string(),
        storage_backend: storage_backend.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
