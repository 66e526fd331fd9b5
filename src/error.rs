use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Session negotiation failed: {0}")]
    SessionError(String),

    #[error("Part {part_index} failed after {attempts} attempt(s): {cause}")]
    PartUploadError {
        part_index: u64,
        attempts: u32,
        #[source]
        cause: Box<Error>,
    },

    #[error("Finalize failed: {0}")]
    FinalizeError(String),

    #[error("Upload failed: {0}")]
    UploadError(String),

    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Upload cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
