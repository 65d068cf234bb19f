use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::auth::Caller;
use crate::deletion::{self, DeleteOutcome, DeletionError};
use crate::issuer::{IssueError, SignedUploadGrant, UploadDescriptor};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct DeleteObjectRequest {
    pub key: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeleteObjectResponse {
    pub key: String,
    pub outcome: DeleteOutcome,
}

// ============================================================================
// Handlers
// ============================================================================

/// Route: POST /api/s3/upload (behind the guard)
pub async fn issue_upload_url(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    AppJson(descriptor): AppJson<UploadDescriptor>,
) -> Result<Json<JSend<SignedUploadGrant>>, ApiError> {
    let grant = state
        .issuer
        .issue(&descriptor)
        .await
        .map_err(|e| match e {
            IssueError::Validation(errors) => ApiError::Invalid(errors),
            IssueError::Store(e) => {
                tracing::error!(error = %e, "Failed to sign upload URL");
                ApiError::internal("Error getting presigned url")
            }
        })?;

    tracing::info!(
        user_id = %identity.user_id,
        storage_key = %grant.storage_key,
        "Issued upload URL"
    );
    Ok(JSend::success(grant))
}

/// Route: DELETE /api/s3/delete
pub async fn delete_upload(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    AppJson(req): AppJson<DeleteObjectRequest>,
) -> Result<Json<JSend<DeleteObjectResponse>>, ApiError> {
    let outcome = deletion::delete_object(state.object_store.as_ref(), &identity, &req.key)
        .await
        .map_err(|e| match e {
            DeletionError::InvalidKey(msg) => ApiError::bad_request(msg),
            DeletionError::Store(e) => {
                tracing::error!(error = %e, storage_key = %req.key, "Failed to delete object");
                ApiError::internal("Could not delete the file")
            }
        })?;

    Ok(JSend::success(DeleteObjectResponse {
        key: req.key.trim().to_string(),
        outcome,
    }))
}
