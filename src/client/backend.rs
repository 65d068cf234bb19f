use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{header, Client, StatusCode};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::state::LocalFile;
use super::UploadError;
use crate::api::handlers::{DeleteObjectRequest, DeleteObjectResponse};
use crate::api::response::{JSend, JSendError, JSendFail};
use crate::deletion::DeleteOutcome;
use crate::issuer::{SignedUploadGrant, UploadDescriptor};
use crate::validation::ValidationErrors;

const CHUNK_SIZE: usize = 64 * 1024;

/// One step of a byte transfer. A transfer stream yields any number of
/// `Progress` events followed by exactly one `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Progress(u8),
    /// The storage backend answered with this HTTP status
    Completed { status: u16 },
    /// No response was received
    Failed(String),
}

pub type TransferStream = BoxStream<'static, TransferEvent>;

/// The network collaborators of the uploader.
#[async_trait]
pub trait UploadBackend: Send + Sync {
    async fn request_grant(
        &self,
        descriptor: &UploadDescriptor,
    ) -> Result<SignedUploadGrant, UploadError>;
    /// Start sending `file` to the grant's URL.
    fn transfer(&self, grant: &SignedUploadGrant, file: &LocalFile) -> TransferStream;
    async fn delete_object(&self, key: &str) -> Result<DeleteOutcome, UploadError>;
    /// Where an already stored object can be rendered from.
    fn preview_url(&self, key: &str) -> String;
}

/// Rounded share of `sent` in `total`, capped at 100.
pub fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.saturating_mul(100) + total / 2) / total).min(100) as u8
}

/// Talks to the upload API over HTTP and sends bytes straight to storage.
pub struct HttpBackend {
    base_url: String,
    client: Client,
    public_url: String,
    session_token: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, session_token: &str) -> Result<Self, reqwest::Error> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .user_agent(concat!("lms-uploads/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            public_url: format!("{base_url}/_local/objects"),
            base_url,
            client,
            session_token: session_token.to_string(),
        })
    }

    /// Render stored objects from `url` instead of the local object route.
    pub fn with_public_url(mut self, url: &str) -> Self {
        self.public_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl UploadBackend for HttpBackend {
    async fn request_grant(
        &self,
        descriptor: &UploadDescriptor,
    ) -> Result<SignedUploadGrant, UploadError> {
        let resp = self
            .client
            .post(format!("{}/api/s3/upload", self.base_url))
            .bearer_auth(&self.session_token)
            .json(descriptor)
            .send()
            .await
            .map_err(|e| UploadError::Internal(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: JSend<SignedUploadGrant> = resp
            .json()
            .await
            .map_err(|e| UploadError::Internal(format!("Malformed grant response: {e}")))?;
        Ok(body.data)
    }

    fn transfer(&self, grant: &SignedUploadGrant, file: &LocalFile) -> TransferStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let url = grant.upload_url.clone();
        let content_type = file.content_type.clone();
        let data = file.data.clone();

        tokio::spawn(async move {
            let total = data.len() as u64;
            let chunks: Vec<Bytes> = (0..data.len())
                .step_by(CHUNK_SIZE)
                .map(|start| data.slice(start..(start + CHUNK_SIZE).min(data.len())))
                .collect();

            let _ = tx.send(TransferEvent::Progress(0));

            // Progress is counted as chunks are handed to the transport
            let progress_tx = tx.clone();
            let mut sent = 0u64;
            let body = stream::iter(chunks).map(move |chunk| {
                sent += chunk.len() as u64;
                let _ = progress_tx.send(TransferEvent::Progress(percent(sent, total)));
                Ok::<_, std::io::Error>(chunk)
            });

            let result = client
                .put(&url)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, total)
                .body(reqwest::Body::wrap_stream(body))
                .send()
                .await;

            let event = match result {
                Ok(resp) => TransferEvent::Completed {
                    status: resp.status().as_u16(),
                },
                Err(e) => TransferEvent::Failed(e.to_string()),
            };
            let _ = tx.send(event);
        });

        UnboundedReceiverStream::new(rx).boxed()
    }

    async fn delete_object(&self, key: &str) -> Result<DeleteOutcome, UploadError> {
        let resp = self
            .client
            .delete(format!("{}/api/s3/delete", self.base_url))
            .bearer_auth(&self.session_token)
            .json(&DeleteObjectRequest {
                key: key.to_string(),
            })
            .send()
            .await
            .map_err(|e| UploadError::DeletionFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(match error_from_response(resp).await {
                UploadError::Unauthorized => UploadError::Unauthorized,
                other => UploadError::DeletionFailed(other.to_string()),
            });
        }

        let body: JSend<DeleteObjectResponse> = resp
            .json()
            .await
            .map_err(|e| UploadError::DeletionFailed(format!("Malformed delete response: {e}")))?;
        Ok(body.data.outcome)
    }

    fn preview_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_url)
    }
}

/// Map a JSend fail/error response onto the client error taxonomy.
async fn error_from_response(resp: reqwest::Response) -> UploadError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();

    let (message, errors) = match serde_json::from_str::<JSendFail>(&text) {
        Ok(fail) => (fail.data.message, fail.data.errors),
        Err(_) => match serde_json::from_str::<JSendError>(&text) {
            Ok(error) => (error.message, Vec::new()),
            Err(_) => (format!("Request failed with status {status}"), Vec::new()),
        },
    };

    match status {
        StatusCode::BAD_REQUEST => {
            let mut errors = ValidationErrors(errors);
            if errors.is_empty() {
                errors.push("request", message);
            }
            UploadError::Validation(errors)
        }
        StatusCode::UNAUTHORIZED => UploadError::Unauthorized,
        StatusCode::FORBIDDEN => UploadError::BotSuspected(message),
        StatusCode::TOO_MANY_REQUESTS => UploadError::RateLimited(message),
        _ => UploadError::Internal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_and_caps() {
        assert_eq!(percent(0, 200), 0);
        assert_eq!(percent(1, 200), 1);
        assert_eq!(percent(100, 200), 50);
        assert_eq!(percent(199, 200), 100);
        assert_eq!(percent(300, 200), 100);
        assert_eq!(percent(0, 0), 100);
    }
}
