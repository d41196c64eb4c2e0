use thiserror::Error;
use uuid::Uuid;
use vector_store::StoreError;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(Uuid),

    #[error("Collection '{0}' is unavailable, operation rejected")]
    CollectionUnavailable(String),

    /// The batch record was written but one or more derived stock items were
    /// not. The parent exists; callers may retry the children against it.
    #[error("Batch {batch_id} created but stock items were not all written: {details}")]
    PartiallyApplied { batch_id: Uuid, details: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InventoryResult<T> = Result<T, InventoryError>;

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Internal(format!("JSON error: {}", err))
    }
}

impl From<validator::ValidationErrors> for InventoryError {
    fn from(err: validator::ValidationErrors) -> Self {
        InventoryError::Validation(err.to_string())
    }
}
