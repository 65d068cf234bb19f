use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::validation::{FieldError, ValidationErrors};

// ============================================================================
// JSend envelopes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JSendStatus {
    Error,
    Fail,
    Success,
}

/// `{"status":"success","data":...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct JSend<T> {
    pub data: T,
    pub status: JSendStatus,
}

impl<T: Serialize> JSend<T> {
    pub fn success(data: T) -> Json<JSend<T>> {
        Json(JSend {
            data,
            status: JSendStatus::Success,
        })
    }
}

/// `{"status":"fail","data":{"message":...,"errors":[...]}}`, sent with 4xx.
#[derive(Debug, Serialize, Deserialize)]
pub struct JSendFail {
    pub data: FailData,
    pub status: JSendStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailData {
    pub message: String,
    /// Per-field rule failures; omitted when the failure is not about input fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

/// `{"status":"error","message":...}`, sent with 5xx.
#[derive(Debug, Serialize, Deserialize)]
pub struct JSendError {
    pub message: String,
    pub status: JSendStatus,
}

fn fail(code: StatusCode, message: String, errors: Vec<FieldError>) -> Response {
    let body = JSendFail {
        data: FailData { message, errors },
        status: JSendStatus::Fail,
    };
    (code, Json(body)).into_response()
}

// ============================================================================
// Handler errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    /// 4xx with a message only
    Fail(StatusCode, String),
    /// 400 listing every failed field rule
    Invalid(ValidationErrors),
    /// 429 with `Retry-After`
    RateLimited { message: String, retry_after: Duration },
    /// 5xx
    Error(StatusCode, String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::UNAUTHORIZED, message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::FORBIDDEN, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::NOT_FOUND, message.into())
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Duration) -> Self {
        ApiError::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Fail(code, message) => fail(code, message, Vec::new()),
            ApiError::Invalid(errors) => fail(
                StatusCode::BAD_REQUEST,
                "Invalid request body".to_string(),
                errors.0,
            ),
            ApiError::RateLimited {
                message,
                retry_after,
            } => {
                let mut response = fail(StatusCode::TOO_MANY_REQUESTS, message, Vec::new());
                // Whole seconds, rounded up
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            ApiError::Error(code, message) => {
                let body = JSendError {
                    message,
                    status: JSendStatus::Error,
                };
                (code, Json(body)).into_response()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // Well-formed JSON of the wrong shape reads as a field error
            JsonRejection::JsonDataError(err) => {
                let mut errors = ValidationErrors::default();
                errors.push("body", err.body_text());
                ApiError::Invalid(errors)
            }
            JsonRejection::JsonSyntaxError(_) => {
                ApiError::bad_request("Request body is not valid JSON")
            }
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::bad_request("Expected Content-Type: application/json")
            }
            other => ApiError::bad_request(other.body_text()),
        }
    }
}

/// `axum::Json` whose rejection is a JSend `ApiError`.
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}
