use crate::api::Backend;
use crate::error::{Error, Result};
use crate::upload::UploadOptions;
use crate::upload::coordinator::{self, CoordinatorOptions, PartJob};
use crate::upload::finalize::finalize;
use crate::upload::progress::{PartProgress, ProgressReporter};
use crate::upload::segment::segment_and_read;
use crate::upload::session::negotiate;
use bytes::Bytes;
use log::info;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Uploads a file using the chunked protocol: negotiate, upload parts, finalize.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read or is empty
/// - Session negotiation fails or returns an incomplete session
/// - Any part exhausts its retry budget
/// - The upload is cancelled
/// - Finalizing the session fails
pub async fn upload_multipart<B: Backend + ?Sized + 'static>(
    backend: Arc<B>,
    file_path: &Path,
    options: &UploadOptions,
    cancel: &CancellationToken,
    reporter: &Arc<ProgressReporter>,
) -> Result<String> {
    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::ConfigError("Invalid filename".to_string()))?;
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    let data = Bytes::from(tokio::fs::read(file_path).await?);
    let file_size = data.len() as u64;
    if file_size == 0 {
        return Err(Error::ConfigError(format!("File is empty: {filename}")));
    }

    info!(
        "Uploading {} ({} MB) using chunked upload",
        filename,
        file_size / 1024 / 1024
    );

    // Step 1: Negotiate the session
    let session = negotiate(&*backend, extension, file_size).await?;

    // Step 2: Upload parts
    let jobs = segment_and_read(&data, session.part_size, session.total_parts)?
        .into_iter()
        .map(|(part, bytes)| {
            Ok(PartJob {
                url: session.url_for(part.index)?.to_string(),
                part,
                data: bytes,
            })
        })
        .collect::<Result<Vec<PartJob>>>()?;

    let progress = Arc::new(PartProgress::new(session.total_parts, reporter.clone()));
    let coordinator_options = CoordinatorOptions {
        parallel: options.parallel,
        retry: options.retry.clone(),
        cancel_on_failure: options.cancel_on_failure,
    };
    coordinator::upload_parts(backend.clone(), jobs, &coordinator_options, cancel, progress)
        .await?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Step 3: Exchange the session for a durable URL
    finalize(&*backend, &session.upload_id, reporter).await
}
