use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lms_uploads::{
    api,
    config::{Config, StorageBackend},
    object_store as obj,
    AppState,
};

/// `LOG_FORMAT` picks the output: `gcp` (Cloud Logging), `json`, or plain text.
fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    match std::env::var("LOG_FORMAT")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "gcp" => registry.with(tracing_stackdriver::layer()).init(),
        "json" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(false),
            )
            .init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "lms-uploads starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize object store backend
    let (object_store, local_store): (Arc<dyn obj::ObjectStore>, Option<Arc<obj::LocalStore>>) =
        match config.storage.backend {
            StorageBackend::Local => {
                let store = Arc::new(obj::LocalStore::new(
                    &config.storage.local_storage_path,
                    &config.node.public_base_url,
                    config.storage.local_signing_secret.as_bytes(),
                )?);
                info!(
                    "Using local storage backend at: {}",
                    config.storage.local_storage_path
                );
                (store.clone() as Arc<dyn obj::ObjectStore>, Some(store))
            }
            StorageBackend::S3 => {
                let store = obj::S3Store::new(&config.storage.s3)?;
                info!(
                    bucket = config.storage.s3.bucket.as_deref().unwrap_or_default(),
                    "Using S3 storage backend"
                );
                (Arc::new(store) as Arc<dyn obj::ObjectStore>, None)
            }
        };

    let state = Arc::new(AppState::new(config.clone(), object_store, local_store));

    // Sweep expired rate windows so the counter map stays bounded
    let sweeper = {
        let state = Arc::clone(&state);
        let period = Duration::from_secs(config.guard.window_seconds);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match state.guard.limiter().sweep(Instant::now()) {
                    Ok(removed) if removed > 0 => {
                        tracing::debug!(removed, "Swept expired rate windows");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Failed to sweep rate windows"),
                }
            }
        })
    };

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.node.bind_address).await?;
    info!("Listening on: {}", config.node.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down background tasks");
    sweeper.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
