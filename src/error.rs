//! Error types for Memory Fabric

use thiserror::Error;

/// Result type alias used throughout Memory Fabric
pub type Result<T> = std::result::Result<T, FabricError>;

/// Top-level error type for Memory Fabric operations
#[derive(Error, Debug)]
pub enum FabricError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Backend does not support this capability: {0}")]
    MissingCapability(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FabricError {
    /// HTTP status code this error should be reported under.
    pub fn status_code(&self) -> u16 {
        match self {
            FabricError::NotFound(_) => 404,
            FabricError::InvalidInput(_) => 400,
            FabricError::Auth(_) => 401,
            FabricError::MissingCapability(_) => 501,
            _ => 500,
        }
    }
}
