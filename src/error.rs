use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Key/value storage failure (wraps rusqlite::Error)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backup document did not have the expected shape
    #[error("Invalid backup: {0}")]
    InvalidBackup(String),

    /// Failure reported by a collaborator (playlist source, sync target)
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
