use crate::api::Backend;
use crate::error::{Error, Result};
use crate::upload::progress::ProgressReporter;
use bytes::Bytes;
use log::info;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Uploads a whole file in a single request.
///
/// # Errors
///
/// Returns an error if:
/// - The file path is invalid or cannot be converted to a filename
/// - File reading fails
/// - The upload request fails or the response carries no URL
/// - `cancel` fires before the request completes
pub async fn upload_single_part<B: Backend + ?Sized>(
    backend: &B,
    file_path: &Path,
    cancel: &CancellationToken,
    reporter: &ProgressReporter,
) -> Result<String> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::ConfigError("Invalid filename".to_string()))?;

    let data = Bytes::from(tokio::fs::read(file_path).await?);
    info!("Uploading {} ({} MB)", filename, data.len() / 1024 / 1024);

    let url = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = backend.upload_whole(filename, data) => result,
    }?;
    reporter.finish();

    info!("Uploaded {filename}: {url}");
    Ok(url)
}
