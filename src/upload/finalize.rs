use crate::api::Backend;
use crate::error::{Error, Result};
use crate::upload::progress::ProgressReporter;
use log::info;

/// Exchanges a fully uploaded session for its durable URL.
///
/// Reports 100 to the host once the URL is known. Never retried here.
///
/// # Errors
///
/// Returns [`Error::FinalizeError`] if the request fails, the backend answers
/// with a non-success status, or the response carries no URL.
pub async fn finalize<B: Backend + ?Sized>(
    backend: &B,
    upload_id: &str,
    reporter: &ProgressReporter,
) -> Result<String> {
    let data = backend.fetch_url(upload_id).await.map_err(|e| match e {
        Error::FinalizeError(_) => e,
        other => Error::FinalizeError(other.to_string()),
    })?;

    let url = data
        .url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| Error::FinalizeError("Response is missing url".to_string()))?;

    info!("Upload {upload_id} finalized: {url}");
    reporter.finish();

    Ok(url)
}
