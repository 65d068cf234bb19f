//! End-to-end: the uploader talks to a running server backed by the local store.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use lms_uploads::client::{DropConstraints, HttpBackend, LocalFile, Phase, UploadError, Uploader};
use lms_uploads::config::{
    AuthConfig, Config, GuardConfig, NodeConfig, StorageConfig, UploadConfig,
};
use lms_uploads::deletion::DeleteOutcome;
use lms_uploads::guard::{GuardMode, RATE_LIMIT_MESSAGE};
use lms_uploads::object_store::{LocalStore, ObjectStore};
use lms_uploads::{api, AppState};

const TOKEN: &str = "flow-session";

struct TestServer {
    base_url: String,
    store: Arc<LocalStore>,
    _dir: tempfile::TempDir,
}

async fn spawn_server(max_requests: u32) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");

    let config = Config {
        auth: AuthConfig {
            sessions: HashMap::from([(TOKEN.to_string(), "author-1".to_string())]),
        },
        guard: GuardConfig {
            mode: GuardMode::Live,
            window_seconds: 60,
            max_requests,
        },
        node: NodeConfig {
            bind_address: addr.to_string(),
            public_base_url: base_url.clone(),
        },
        storage: StorageConfig {
            local_storage_path: dir.path().to_string_lossy().to_string(),
            local_signing_secret: "flow-secret".to_string(),
            ..Default::default()
        },
        upload: UploadConfig::default(),
    };

    let store = Arc::new(
        LocalStore::new(dir.path(), &base_url, config.storage.local_signing_secret.as_bytes())
            .unwrap(),
    );
    let state = Arc::new(AppState::new(config, store.clone(), Some(store.clone())));
    let app = api::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url,
        store,
        _dir: dir,
    }
}

fn uploader(server: &TestServer, token: &str) -> Uploader<HttpBackend> {
    let (tx, _rx) = mpsc::unbounded_channel();
    let backend = HttpBackend::new(&server.base_url, token).unwrap();
    Uploader::new(backend, DropConstraints::default(), tx)
}

#[tokio::test]
async fn test_upload_then_delete_over_http() {
    let server = spawn_server(5).await;
    let mut uploader = uploader(&server, TOKEN);

    // Several chunks so progress is reported along the way
    let data: Vec<u8> = (0..204_800u32).map(|i| (i % 251) as u8).collect();
    let phase = uploader
        .on_drop(vec![LocalFile::new("cover.png", "image/png", data.clone())])
        .await;

    assert_eq!(phase, Phase::Uploaded);
    let key = uploader.state().storage_key.clone().unwrap();
    assert!(key.ends_with("-cover.png"));
    assert_eq!(uploader.state().progress_percent, 100);
    assert_eq!(server.store.get(&key).await.unwrap().as_ref(), &data[..]);

    assert_eq!(uploader.delete().await.unwrap(), DeleteOutcome::Deleted);
    assert_eq!(uploader.state().phase, Phase::Idle);
    assert!(!server.store.exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_rate_limited_grant_surfaces_message() {
    let server = spawn_server(1).await;
    let mut uploader = uploader(&server, TOKEN);
    let file = LocalFile::new("a.png", "image/png", vec![1u8; 32]);

    assert_eq!(uploader.on_drop(vec![file.clone()]).await, Phase::Uploaded);
    uploader.delete().await.unwrap();

    uploader.select(vec![file]).unwrap();
    assert_eq!(
        uploader.upload().await,
        Err(UploadError::RateLimited(RATE_LIMIT_MESSAGE.to_string()))
    );
    assert_eq!(uploader.state().phase, Phase::Error);
}

#[tokio::test]
async fn test_unknown_session_is_unauthorized() {
    let server = spawn_server(5).await;
    let mut uploader = uploader(&server, "not-a-session");

    uploader
        .select(vec![LocalFile::new("a.png", "image/png", vec![1u8; 32])])
        .unwrap();
    assert_eq!(uploader.upload().await, Err(UploadError::Unauthorized));
}
