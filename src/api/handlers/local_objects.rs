use axum::body::{Body, Bytes};
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::api::response::ApiError;
use crate::object_store::{LocalStore, ObjectStoreError, SignedPutParams};
use crate::AppState;

fn local_store(state: &AppState) -> Result<&LocalStore, ApiError> {
    state
        .local_store
        .as_deref()
        .ok_or_else(|| ApiError::not_found("Local storage is not enabled"))
}

/// Accept the byte transfer for a local signed upload URL.
/// Route: PUT /_local/objects/:key
pub async fn receive_signed_put(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let store = local_store(&state)?;

    let params: SignedPutParams = serde_qs::from_str(query.as_deref().unwrap_or_default())
        .map_err(|_| ApiError::forbidden("Upload URL is missing its signature parameters"))?;

    store
        .verify(&key, &params, Utc::now())
        .map_err(|e| ApiError::forbidden(e.to_string()))?;

    // The transfer must match what was signed
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    if content_type != Some(params.content_type.as_str()) {
        return Err(ApiError::bad_request(
            "Content-Type does not match the signed upload",
        ));
    }
    if body.len() as u64 != params.content_length {
        return Err(ApiError::bad_request(format!(
            "Body length {} does not match the signed length {}",
            body.len(),
            params.content_length
        )));
    }

    store.put(&key, body).await.map_err(|e| match e {
        ObjectStoreError::InvalidKey(_) => ApiError::bad_request(e.to_string()),
        _ => ApiError::internal(format!("Failed to store object: {e}")),
    })?;

    tracing::debug!(storage_key = %key, bytes = params.content_length, "Stored object");
    Ok(StatusCode::OK)
}

/// Serve a locally stored object for rendering.
/// Route: GET /_local/objects/:key
pub async fn serve_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let store = local_store(&state)?;

    let (file, len) = store.open(&key).await.map_err(|e| match e {
        ObjectStoreError::NotFound(_) => ApiError::not_found("Object not found"),
        ObjectStoreError::InvalidKey(_) => ApiError::bad_request(e.to_string()),
        _ => ApiError::internal(format!("Failed to retrieve object: {e}")),
    })?;

    let mut response = (StatusCode::OK, Body::from_stream(ReaderStream::new(file))).into_response();
    let headers = response.headers_mut();

    let mime_type = mime_guess::from_path(&key).first_or_octet_stream();
    headers.insert(
        header::CONTENT_TYPE,
        mime_type
            .as_ref()
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, header::HeaderValue::from(len));

    // Keys are never reused, so objects are immutable
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    Ok(response)
}
