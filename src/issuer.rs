//! Signed-URL issuer: validates an upload request and mints a write grant.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::validation::ValidationErrors;

/// Longest file-name suffix kept in a storage key.
const MAX_KEY_NAME_LEN: usize = 128;

/// What the client intends to upload. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDescriptor {
    pub file_name: String,
    pub content_type: String,
    #[serde(alias = "size")]
    pub size_bytes: i64,
    #[serde(default)]
    pub is_image: bool,
}

impl UploadDescriptor {
    pub fn validate(&self, max_size: u64) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if self.file_name.trim().is_empty() {
            errors.push("fileName", "File name is required");
        }
        if self.content_type.trim().is_empty() {
            errors.push("contentType", "Content-Type is required");
        } else if self.is_image && !self.content_type.starts_with("image/") {
            errors.push("contentType", "Content-Type must be an image type");
        }
        if self.size_bytes <= 0 {
            errors.push("sizeBytes", "Size is required");
        } else if self.size_bytes as u64 > max_size {
            errors.push(
                "sizeBytes",
                format!("Size exceeds the maximum of {max_size} bytes"),
            );
        }

        errors.into_result(())
    }
}

/// A time-limited write URL plus the key the object will live under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUploadGrant {
    pub upload_url: String,
    pub storage_key: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Invalid upload request: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("Failed to sign upload URL: {0}")]
    Store(#[from] ObjectStoreError),
}

pub struct Issuer {
    store: Arc<dyn ObjectStore>,
    ttl: Duration,
    max_size: u64,
}

impl Issuer {
    pub fn new(store: Arc<dyn ObjectStore>, ttl: Duration, max_size: u64) -> Self {
        Self {
            store,
            ttl,
            max_size,
        }
    }

    /// Validate `descriptor` and sign a PUT for a fresh key with its content
    /// type and length pinned. Nothing is recorded.
    pub async fn issue(
        &self,
        descriptor: &UploadDescriptor,
    ) -> Result<SignedUploadGrant, IssueError> {
        descriptor.validate(self.max_size)?;

        let storage_key = generate_storage_key(&descriptor.file_name);
        let presigned = self
            .store
            .presign_put(
                &storage_key,
                descriptor.content_type.trim(),
                descriptor.size_bytes as u64,
                self.ttl,
            )
            .await?;

        tracing::debug!(
            storage_key = %storage_key,
            content_type = %descriptor.content_type,
            size_bytes = descriptor.size_bytes,
            "Issued upload grant"
        );

        Ok(SignedUploadGrant {
            upload_url: presigned.url,
            storage_key,
            expires_at: presigned.expires_at,
        })
    }
}

/// `{uuid}-{file name}` with the name reduced to a safe single path segment.
pub fn generate_storage_key(file_name: &str) -> String {
    format!("{}-{}", uuid::Uuid::new_v4(), sanitize_file_name(file_name))
}

fn sanitize_file_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();

    // Keep the tail so the extension survives
    let start = cleaned.len().saturating_sub(MAX_KEY_NAME_LEN);
    let tail = cleaned[start..].trim_start_matches('.');
    if tail.is_empty() {
        "file".to_string()
    } else {
        tail.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_readable_suffix() {
        assert_eq!(sanitize_file_name("cover.png"), "cover.png");
        assert_eq!(sanitize_file_name("my photo (1).JPG"), "my-photo--1-.JPG");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "-..-etc-passwd");
        assert_eq!(sanitize_file_name("ünï.png"), "-n-.png");
        assert_eq!(sanitize_file_name(".."), "file");
    }

    #[test]
    fn test_sanitize_truncates_from_front() {
        let long = format!("{}.png", "a".repeat(300));
        let cleaned = sanitize_file_name(&long);
        assert_eq!(cleaned.len(), MAX_KEY_NAME_LEN);
        assert!(cleaned.ends_with(".png"));
    }

    #[test]
    fn test_descriptor_accepts_legacy_size_field() {
        let descriptor: UploadDescriptor = serde_json::from_str(
            r#"{"fileName":"a.png","contentType":"image/png","size":10,"isImage":true}"#,
        )
        .unwrap();
        assert_eq!(descriptor.size_bytes, 10);
    }

    #[test]
    fn test_validation_collects_every_field() {
        let descriptor = UploadDescriptor {
            file_name: " ".to_string(),
            content_type: String::new(),
            size_bytes: 0,
            is_image: false,
        };
        let errors = descriptor.validate(1024).unwrap_err();
        assert!(errors.has_field("fileName"));
        assert!(errors.has_field("contentType"));
        assert!(errors.has_field("sizeBytes"));
    }

    #[test]
    fn test_image_hint_requires_image_type() {
        let descriptor = UploadDescriptor {
            file_name: "notes.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: 10,
            is_image: true,
        };
        assert!(descriptor.validate(1024).unwrap_err().has_field("contentType"));
    }
}
