//! Shared test helpers for in-crate router tests.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AuthConfig, Config, GuardConfig, NodeConfig, StorageConfig, UploadConfig};
use crate::guard::GuardMode;
use crate::object_store::LocalStore;
use crate::AppState;

pub const TEST_TOKEN: &str = "test-session-token";
pub const TEST_USER: &str = "u1";

/// Create a test AppState backed by a local object store in a temporary directory.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        auth: AuthConfig {
            sessions: HashMap::from([(TEST_TOKEN.to_string(), TEST_USER.to_string())]),
        },
        guard: GuardConfig {
            mode: GuardMode::Live,
            window_seconds: 60,
            max_requests: 5,
        },
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            public_base_url: "http://uploads.test".to_string(),
        },
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
            local_signing_secret: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        },
        upload: UploadConfig {
            max_upload_size: 1024 * 1024, // 1MB for tests
            grant_ttl_seconds: 360,
        },
    };

    let store = Arc::new(
        LocalStore::new(
            &files_dir,
            &config.node.public_base_url,
            config.storage.local_signing_secret.as_bytes(),
        )
        .expect("Failed to create test object store"),
    );

    Arc::new(AppState::new(config, store.clone(), Some(store)))
}
