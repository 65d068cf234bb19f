use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{validate_key, DeleteOutcome, ObjectStore, ObjectStoreError, PresignedPut};

/// Query parameters carried by a local signed upload URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPutParams {
    pub expires: i64,
    pub content_type: String,
    pub content_length: u64,
    pub signature: String,
}

/// Local filesystem object store for development and testing.
/// Signed URLs point back at this process (`/_local/objects/:key`).
pub struct LocalStore {
    base_path: PathBuf,
    public_base_url: String,
    signing_key: hmac::Key,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(
        base_path: P,
        public_base_url: &str,
        signing_secret: &[u8],
    ) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signing_key: hmac::Key::new(hmac::HMAC_SHA256, signing_secret),
        })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/_local/objects/{}", self.public_base_url, key)
    }

    fn signing_payload(key: &str, content_type: &str, content_length: u64, expires: i64) -> String {
        format!("PUT\n{key}\n{content_type}\n{content_length}\n{expires}")
    }

    pub fn sign(&self, key: &str, content_type: &str, content_length: u64, expires: i64) -> String {
        let payload = Self::signing_payload(key, content_type, content_length, expires);
        let tag = hmac::sign(&self.signing_key, payload.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(tag.as_ref())
    }

    /// Check a signed upload URL's parameters for `key` at time `now`.
    pub fn verify(
        &self,
        key: &str,
        params: &SignedPutParams,
        now: DateTime<Utc>,
    ) -> Result<(), ObjectStoreError> {
        let tag = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&params.signature)
            .map_err(|_| ObjectStoreError::Signature("malformed signature".to_string()))?;

        let payload = Self::signing_payload(
            key,
            &params.content_type,
            params.content_length,
            params.expires,
        );
        hmac::verify(&self.signing_key, payload.as_bytes(), &tag)
            .map_err(|_| ObjectStoreError::Signature("signature mismatch".to_string()))?;

        if now.timestamp() > params.expires {
            return Err(ObjectStoreError::Signature("upload URL expired".to_string()));
        }

        Ok(())
    }

    pub async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key)?;
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a stored object for streaming, with its length.
    pub async fn open(&self, key: &str) -> Result<(tokio::fs::File, u64), ObjectStoreError> {
        let path = self.object_path(key)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();
        Ok((file, len))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        content_length: u64,
        ttl: Duration,
    ) -> Result<PresignedPut, ObjectStoreError> {
        validate_key(key)?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| ObjectStoreError::Backend(format!("Invalid TTL: {e}")))?;
        let expires = expires_at.timestamp();

        let params = SignedPutParams {
            expires,
            content_type: content_type.to_string(),
            content_length,
            signature: self.sign(key, content_type, content_length, expires),
        };
        let query = serde_qs::to_string(&params)
            .map_err(|e| ObjectStoreError::Backend(format!("Failed to encode URL: {e}")))?;

        Ok(PresignedPut {
            url: format!("{}?{query}", self.object_url(key)),
            expires_at,
        })
    }

    async fn delete(&self, key: &str) -> Result<DeleteOutcome, ObjectStoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn public_url(&self, key: &str) -> String {
        self.object_url(key)
    }
}
