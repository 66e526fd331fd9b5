//! Chunked uploads of local files to the OOMOL remote cache

pub mod config;
pub mod error;
pub mod file_config;

pub mod api;
pub mod upload;

pub use config::Config;
pub use error::{Error, Result};

// Re-export commonly used types
pub use api::{Backend, Client};
pub use upload::progress::ProgressSink;
pub use upload::{RetryPolicy, UploadOptions, upload_file, upload_with_backend};
