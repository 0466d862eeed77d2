use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("User not found: {0}")]
    NotFound(i64),

    #[error("User already exists: {0}")]
    AlreadyExists(i64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UserStoreError>;
