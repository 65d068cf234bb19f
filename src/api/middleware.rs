use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::api::response::ApiError;
use crate::auth::Caller;
use crate::guard::{Decision, BOT_MESSAGE, RATE_LIMIT_MESSAGE};
use crate::AppState;

/// Run the rate/abuse guard before the wrapped handler.
/// A guard failure rejects the request; it never lets traffic through.
pub async fn enforce_guard(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let decision = state
        .guard
        .check(&identity.user_id, request.headers())
        .map_err(|e| {
            tracing::error!(error = %e, user_id = %identity.user_id, "Guard check failed");
            ApiError::internal("Request could not be verified")
        })?;

    match decision {
        Decision::Allow => Ok(next.run(request).await),
        Decision::DenyBot => Err(ApiError::forbidden(BOT_MESSAGE)),
        Decision::DenyRateLimit { retry_after } => {
            Err(ApiError::rate_limited(RATE_LIMIT_MESSAGE, retry_after))
        }
    }
}
