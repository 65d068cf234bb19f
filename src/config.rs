use std::collections::HashMap;

use thiserror::Error;

use crate::guard::GuardMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub auth: AuthConfig,
    pub guard: GuardConfig,
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    /// Externally reachable base URL of this process (used for local signed URLs)
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    /// Validity window of an issued upload URL
    pub grant_ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub mode: GuardMode,
    pub window_seconds: u64,
    pub max_requests: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Session token -> user id
    pub sessions: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// HMAC secret for local signed upload URLs
    pub local_signing_secret: String,
    pub s3: S3Config,
}

#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub bucket: Option<String>,
    pub region: String,
    /// S3-compatible endpoint, e.g. https://fly.storage.tigris.dev
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Base URL objects are rendered from (defaults to the path-style endpoint URL)
    pub public_url: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 5 * 1024 * 1024,
            grant_ttl_seconds: 360,
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            mode: GuardMode::Live,
            window_seconds: 60,
            max_requests: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./files".to_string(),
            local_signing_secret: String::new(),
            s3: S3Config {
                region: "auto".to_string(),
                ..Default::default()
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}", bind_address.replace("0.0.0.0", "localhost")));

        let max_upload_size = env_parse("MAX_UPLOAD_SIZE", 5 * 1024 * 1024)?; // 5MB
        let grant_ttl_seconds = env_parse("UPLOAD_URL_TTL_SECONDS", 360)?;

        let guard_mode = match std::env::var("GUARD_MODE")
            .unwrap_or_else(|_| "live".to_string())
            .to_lowercase()
            .as_str()
        {
            "dry_run" | "dry-run" | "dryrun" => GuardMode::DryRun,
            _ => GuardMode::Live,
        };
        let window_seconds = env_parse("GUARD_WINDOW_SECONDS", 60)?;
        let max_requests = env_parse("GUARD_MAX_REQUESTS", 5)?;

        let sessions = std::env::var("SESSION_TOKENS")
            .map(|raw| parse_session_tokens(&raw))
            .unwrap_or_default();

        let storage_backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" => StorageBackend::S3,
            _ => StorageBackend::Local,
        };

        let local_storage_path =
            std::env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./files".to_string());
        let local_signing_secret = std::env::var("LOCAL_SIGNING_SECRET")
            .unwrap_or_else(|_| uuid::Uuid::new_v4().simple().to_string());

        let s3 = S3Config {
            bucket: std::env::var("S3_BUCKET_NAME").ok(),
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "auto".to_string()),
            endpoint: std::env::var("AWS_ENDPOINT_URL_S3").ok(),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
            public_url: std::env::var("S3_PUBLIC_URL").ok(),
        };

        let config = Config {
            auth: AuthConfig { sessions },
            guard: GuardConfig {
                mode: guard_mode,
                window_seconds,
                max_requests,
            },
            node: NodeConfig {
                bind_address,
                public_base_url: public_base_url.trim_end_matches('/').to_string(),
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_storage_path,
                local_signing_secret,
                s3,
            },
            upload: UploadConfig {
                max_upload_size,
                grant_ttl_seconds,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.upload.grant_ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "UPLOAD_URL_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }

        if self.guard.window_seconds == 0 || self.guard.max_requests == 0 {
            return Err(ConfigError::ValidationError(
                "GUARD_WINDOW_SECONDS and GUARD_MAX_REQUESTS must be greater than 0".to_string(),
            ));
        }

        match self.storage.backend {
            StorageBackend::Local => {
                if self.storage.local_signing_secret.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "LOCAL_SIGNING_SECRET cannot be empty".to_string(),
                    ));
                }
            }
            StorageBackend::S3 => {
                let s3 = &self.storage.s3;
                for (name, value) in [
                    ("S3_BUCKET_NAME", &s3.bucket),
                    ("AWS_ENDPOINT_URL_S3", &s3.endpoint),
                    ("AWS_ACCESS_KEY_ID", &s3.access_key_id),
                    ("AWS_SECRET_ACCESS_KEY", &s3.secret_access_key),
                ] {
                    if value.as_deref().map_or(true, str::is_empty) {
                        return Err(ConfigError::ValidationError(format!(
                            "{name} is required when STORAGE_BACKEND=s3"
                        )));
                    }
                }
            }
        }

        if self.auth.sessions.is_empty() {
            tracing::warn!("SESSION_TOKENS is empty; every authenticated route will reject callers");
        }

        Ok(())
    }
}

/// `default` when `name` is unset; a set but unparsable value is an error.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "{name} must be a non-negative integer, got {raw:?}"
            ))
        }),
        Err(_) => Ok(default),
    }
}

/// Parse `token=user_id` pairs separated by commas.
pub fn parse_session_tokens(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (token, user) = pair.split_once('=')?;
            let (token, user) = (token.trim(), user.trim());
            if token.is_empty() || user.is_empty() {
                None
            } else {
                Some((token.to_string(), user.to_string()))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_tokens_skips_malformed_pairs() {
        let sessions = parse_session_tokens("abc=u1, def = u2 ,broken,=u3,ghi=");
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.get("abc").map(String::as_str), Some("u1"));
        assert_eq!(sessions.get("def").map(String::as_str), Some("u2"));
    }

    #[test]
    fn test_env_parse_rejects_malformed_numbers() {
        std::env::remove_var("LMS_UPLOADS_TEST_NUMBER");
        assert_eq!(env_parse("LMS_UPLOADS_TEST_NUMBER", 360u64).unwrap(), 360);

        std::env::set_var("LMS_UPLOADS_TEST_NUMBER", " 42 ");
        assert_eq!(env_parse("LMS_UPLOADS_TEST_NUMBER", 360u64).unwrap(), 42);

        std::env::set_var("LMS_UPLOADS_TEST_NUMBER", "abc");
        let err = env_parse("LMS_UPLOADS_TEST_NUMBER", 360u64).unwrap_err();
        assert!(err.to_string().contains("LMS_UPLOADS_TEST_NUMBER"));
        std::env::remove_var("LMS_UPLOADS_TEST_NUMBER");
    }

    #[test]
    fn test_s3_backend_requires_credentials() {
        let config = Config {
            auth: AuthConfig::default(),
            guard: GuardConfig::default(),
            node: NodeConfig::default(),
            storage: StorageConfig {
                backend: StorageBackend::S3,
                ..Default::default()
            },
            upload: UploadConfig::default(),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("S3_BUCKET_NAME"));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = Config {
            auth: AuthConfig::default(),
            guard: GuardConfig::default(),
            node: NodeConfig::default(),
            storage: StorageConfig {
                local_signing_secret: "secret".to_string(),
                ..Default::default()
            },
            upload: UploadConfig {
                grant_ttl_seconds: 0,
                ..Default::default()
            },
        };
        assert!(config.validate().is_err());
    }
}
