//! lms-uploads - signed-URL upload broker for course authoring
//!
//! This crate provides the upload path for course thumbnails and media:
//! - A signed-URL issuer that mints time-limited, payload-pinned write URLs
//! - A rate/abuse guard in front of issuance
//! - Swappable object storage backends (local filesystem, S3-compatible)
//! - A client-side upload state machine with progress reporting and deletion

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod course;
pub mod deletion;
pub mod guard;
pub mod issuer;
pub mod object_store;
#[cfg(test)]
pub mod testutil;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use auth::SessionStore;
use config::Config;
use guard::UploadGuard;
use issuer::Issuer;
use object_store::{LocalStore, ObjectStore};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub guard: UploadGuard,
    pub issuer: Issuer,
    /// Set when the local backend is active; this process then receives the transfers
    pub local_store: Option<Arc<LocalStore>>,
    pub object_store: Arc<dyn ObjectStore>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(
        config: Config,
        object_store: Arc<dyn ObjectStore>,
        local_store: Option<Arc<LocalStore>>,
    ) -> Self {
        let issuer = Issuer::new(
            Arc::clone(&object_store),
            Duration::from_secs(config.upload.grant_ttl_seconds),
            config.upload.max_upload_size,
        );

        Self {
            guard: UploadGuard::new(&config.guard),
            issuer,
            local_store,
            object_store,
            sessions: SessionStore::new(config.auth.sessions.clone()),
            config,
        }
    }
}
