use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use chrono::Utc;

use super::{validate_key, DeleteOutcome, ObjectStore, ObjectStoreError, PresignedPut};
use crate::config::S3Config;

/// S3-compatible object store, addressed path-style (`{endpoint}/{bucket}/{key}`).
pub struct S3Store {
    bucket: String,
    client: Client,
    public_url: String,
}

impl S3Store {
    pub fn new(config: &S3Config) -> Result<Self, anyhow::Error> {
        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| anyhow::anyhow!("S3 bucket is not configured"))?;
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("S3 endpoint is not configured"))?
            .trim_end_matches('/')
            .to_string();
        reqwest::Url::parse(&endpoint)?;

        let credentials = Credentials::new(
            config.access_key_id.clone().unwrap_or_default(),
            config.secret_access_key.clone().unwrap_or_default(),
            None,
            None,
            "lms-uploads",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .retry_config(
                RetryConfig::standard()
                    .with_max_attempts(3)
                    .with_retry_mode(RetryMode::Adaptive),
            )
            // Tigris, MinIO and R2 all want the bucket in the path
            .force_path_style(true)
            .build();

        let public_url = config
            .public_url
            .clone()
            .unwrap_or_else(|| format!("{endpoint}/{bucket}"))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            bucket,
            client: Client::from_conf(s3_config),
            public_url,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        content_length: u64,
        ttl: Duration,
    ) -> Result<PresignedPut, ObjectStoreError> {
        validate_key(key)?;

        let content_length = i64::try_from(content_length)
            .map_err(|_| ObjectStoreError::Backend("Content length out of range".to_string()))?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| ObjectStoreError::Backend(format!("Invalid TTL: {e}")))?;
        let presigning_config = PresigningConfig::builder()
            .expires_in(ttl)
            .build()
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(content_length)
            .presigned(presigning_config)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key, "S3 presign failed");
                ObjectStoreError::Backend(e.to_string())
            })?;

        Ok(PresignedPut {
            url: presigned.uri().to_string(),
            expires_at,
        })
    }

    async fn delete(&self, key: &str) -> Result<DeleteOutcome, ObjectStoreError> {
        validate_key(key)?;

        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            // S3 answers 204 for missing keys too; only some compatible stores send 404
            Err(e) if e.raw_response().map(|r| r.status().as_u16()) == Some(404) => {
                Ok(DeleteOutcome::NotFound)
            }
            Err(e) => {
                tracing::error!(error = %e, bucket = %self.bucket, key, "S3 delete failed");
                Err(ObjectStoreError::Backend(format!("S3 delete failed: {e}")))
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        validate_key(key)?;

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), HeadObjectError::NotFound(_)) =>
            {
                Ok(false)
            }
            Err(e) => Err(ObjectStoreError::Backend(format!("S3 head failed: {e}"))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(endpoint: &str, public_url: Option<&str>) -> S3Store {
        S3Store::new(&S3Config {
            bucket: Some("lms-next-app".to_string()),
            region: "auto".to_string(),
            endpoint: Some(endpoint.to_string()),
            access_key_id: Some("AKID".to_string()),
            secret_access_key: Some("secret".to_string()),
            public_url: public_url.map(str::to_string),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_presigned_put_is_path_style_with_ttl() {
        let store = store("https://fly.storage.tigris.dev", None);
        let grant = store
            .presign_put("abc-cover.png", "image/png", 204800, Duration::from_secs(360))
            .await
            .unwrap();

        assert!(grant
            .url
            .starts_with("https://fly.storage.tigris.dev/lms-next-app/abc-cover.png?"));
        assert!(grant.url.contains("X-Amz-Expires=360"));
        assert!(grant.url.contains("X-Amz-Signature="));
        let remaining = grant.expires_at - Utc::now();
        assert!(remaining.num_seconds() > 350 && remaining.num_seconds() <= 360);
    }

    #[test]
    fn test_public_url_defaults_to_path_style_endpoint() {
        let store = store("http://localhost:9000/", None);
        assert_eq!(store.public_url("k"), "http://localhost:9000/lms-next-app/k");
    }

    #[test]
    fn test_public_url_uses_configured_base() {
        let store = store(
            "https://fly.storage.tigris.dev",
            Some("https://lms-next-app.t3.storage.dev/"),
        );
        assert_eq!(
            store.public_url("abc-cover.png"),
            "https://lms-next-app.t3.storage.dev/abc-cover.png"
        );
    }

    #[tokio::test]
    async fn test_presign_rejects_path_keys() {
        let store = store("https://fly.storage.tigris.dev", None);
        let result = store
            .presign_put("../etc", "image/png", 1, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(ObjectStoreError::InvalidKey(_))));
    }

    #[test]
    fn test_missing_bucket_is_rejected() {
        let result = S3Store::new(&S3Config {
            endpoint: Some("https://fly.storage.tigris.dev".to_string()),
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
