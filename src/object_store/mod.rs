mod local;
mod s3;

pub use local::{LocalStore, SignedPutParams};
pub use s3::S3Store;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Signature rejected: {0}")]
    Signature(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A write URL scoped to one key, with content type and length pinned.
#[derive(Debug, Clone)]
pub struct PresignedPut {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of removing an object. Removing a missing object is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Abstraction over object storage backends reachable through signed URLs.
/// Keys are opaque single path segments generated by the issuer.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        content_length: u64,
        ttl: Duration,
    ) -> Result<PresignedPut, ObjectStoreError>;
    async fn delete(&self, key: &str) -> Result<DeleteOutcome, ObjectStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
    /// URL the stored object can be rendered from.
    fn public_url(&self, key: &str) -> String;
}

/// Reject keys that could escape a single path segment.
pub fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\'])
        || key.chars().any(char::is_control)
    {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
