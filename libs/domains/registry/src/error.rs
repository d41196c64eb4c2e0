use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Control plane unreachable: {0}")]
    Unreachable(String),

    #[error("Control plane rejected event: {0}")]
    Rejected(String),

    #[error("Signature chain broken at sequence {sequence}")]
    ChainBroken { sequence: i64 },

    #[error("Durability file error: {0}")]
    Durability(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
