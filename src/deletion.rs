//! Server half of object deletion.

use thiserror::Error;

pub use crate::object_store::DeleteOutcome;
use crate::auth::Identity;
use crate::object_store::{validate_key, ObjectStore, ObjectStoreError};

#[derive(Debug, Error)]
pub enum DeletionError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Failed to delete object: {0}")]
    Store(ObjectStoreError),
}

/// Remove the object at `key` on behalf of `caller`.
/// Deleting a key that is already gone reports `NotFound` rather than failing.
pub async fn delete_object(
    store: &dyn ObjectStore,
    caller: &Identity,
    key: &str,
) -> Result<DeleteOutcome, DeletionError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(DeletionError::InvalidKey("key is required".to_string()));
    }
    validate_key(key).map_err(|e| DeletionError::InvalidKey(e.to_string()))?;

    let outcome = store.delete(key).await.map_err(DeletionError::Store)?;

    tracing::info!(
        storage_key = %key,
        user_id = %caller.user_id,
        ?outcome,
        "Deleted object"
    );
    Ok(outcome)
}
