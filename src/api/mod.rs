pub mod client;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use client::{Client, FinalizeData, InitSessionData, PresignedUrlPart, PresignedUrls};

/// Remote side of an upload: session negotiation, part storage and URL lookup.
///
/// [`Client`] talks to the real HTTP API; the upload core only sees this trait.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Opens an upload session for a file of `size` bytes.
    async fn init_session(&self, file_extension: &str, size: u64) -> Result<InitSessionData>;

    /// Performs one PUT of `data` to a presigned part URL.
    async fn put_part(&self, url: &str, data: Bytes) -> Result<()>;

    /// Looks up the durable URL of a completed session.
    async fn fetch_url(&self, upload_id: &str) -> Result<FinalizeData>;

    /// Uploads a whole file in one request and returns its URL.
    async fn upload_whole(&self, file_name: &str, data: Bytes) -> Result<String>;
}
