//! Error types for Crosscast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosscastError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl CrosscastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosscastError::InvalidInput(_) => 3,
            CrosscastError::Platform(PlatformError::Authentication(_)) => 2,
            CrosscastError::Platform(_) => 1,
            CrosscastError::Config(_) => 1,
            CrosscastError::Storage(_) => 1,
            CrosscastError::NotFound(_) => 1,
            CrosscastError::InvalidState(_) => 1,
        }
    }

    /// Whether a retry with backoff could succeed
    ///
    /// Only platform-level network and rate-limit failures are worth
    /// retrying; everything else is surfaced immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            CrosscastError::Platform(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    SerializeError(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

impl PlatformError {
    /// Transient errors may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::Network(_) | PlatformError::RateLimit(_)
        )
    }
}
