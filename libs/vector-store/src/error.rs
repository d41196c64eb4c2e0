use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Remote(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<qdrant_client::QdrantError> for StoreError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        classify_remote_message(err.to_string())
    }
}

/// Map a raw remote error message onto the taxonomy. The gRPC API reports
/// a duplicate create as AlreadyExists and a missing collection as
/// NotFound; callers need both distinguishable from transport failures.
fn classify_remote_message(message: String) -> StoreError {
    if message.contains("already exists") || message.contains("AlreadyExists") {
        StoreError::Conflict(message)
    } else if message.contains("doesn't exist")
        || message.contains("Not found")
        || message.contains("NotFound")
    {
        StoreError::CollectionNotFound(message)
    } else {
        StoreError::Remote(message)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Internal(format!("JSON error: {}", err))
    }
}

impl StoreError {
    /// Whether the error indicates a lost create race rather than a failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Whether the error reports absence rather than a failed operation.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::CollectionNotFound(_))
    }
}
