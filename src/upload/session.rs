use crate::api::{Backend, InitSessionData};
use crate::error::{Error, Result};
use crate::upload::segment;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

/// Backend-issued state for one chunked upload. Read-only once negotiated.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    pub part_size: u64,
    pub total_parts: u64,
    pub presigned_urls: BTreeMap<u64, String>,
    /// Parts the backend already holds. Informational only.
    pub uploaded_parts: BTreeSet<u64>,
}

impl UploadSession {
    /// Validates a raw init response against the size of the file being uploaded.
    ///
    /// # Errors
    ///
    /// Returns a session error if a required field is missing, the part layout
    /// does not cover `file_size`, or any part in `1..=total_parts` has no URL.
    pub fn from_response(data: InitSessionData, file_size: u64) -> Result<Self> {
        let upload_id = data
            .upload_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::SessionError("Response is missing upload_id".to_string()))?;

        let part_size = data
            .part_size
            .filter(|&size| size > 0)
            .ok_or_else(|| Error::SessionError("Response is missing part_size".to_string()))?;

        let total_parts = data
            .total_parts
            .filter(|&total| total > 0)
            .ok_or_else(|| Error::SessionError("Response is missing total_parts".to_string()))?;

        let expected = segment::total_parts(file_size, part_size);
        if total_parts != expected {
            return Err(Error::SessionError(format!(
                "Backend announced {total_parts} parts but {file_size} bytes in parts of {part_size} need {expected}"
            )));
        }

        let presigned_urls = data
            .presigned_urls
            .ok_or_else(|| Error::SessionError("Response is missing presigned_urls".to_string()))?
            .into_map()?;

        if let Some(missing) = (1..=total_parts).find(|i| {
            presigned_urls
                .get(i)
                .is_none_or(|url| url.trim().is_empty())
        }) {
            return Err(Error::SessionError(format!(
                "No presigned URL for part {missing} of {total_parts}"
            )));
        }

        Ok(Self {
            upload_id,
            part_size,
            total_parts,
            presigned_urls,
            uploaded_parts: data.uploaded_parts.unwrap_or_default().into_iter().collect(),
        })
    }

    /// Presigned URL for a 1-based part index.
    ///
    /// # Errors
    ///
    /// Returns a session error if the index has no URL.
    pub fn url_for(&self, index: u64) -> Result<&str> {
        self.presigned_urls
            .get(&index)
            .map(String::as_str)
            .ok_or_else(|| Error::SessionError(format!("No presigned URL for part {index}")))
    }
}

/// Opens an upload session with the backend. Never retried here.
///
/// # Errors
///
/// Returns [`Error::SessionError`] if the request fails, the backend answers
/// with a non-success status, or the response is incomplete.
pub async fn negotiate<B: Backend + ?Sized>(
    backend: &B,
    file_extension: &str,
    file_size: u64,
) -> Result<UploadSession> {
    debug!("Negotiating upload session for {file_size} bytes (.{file_extension})");

    let data = backend
        .init_session(file_extension, file_size)
        .await
        .map_err(|e| match e {
            Error::SessionError(_) => e,
            other => Error::SessionError(other.to_string()),
        })?;

    let session = UploadSession::from_response(data, file_size)?;

    info!(
        "Upload session {} negotiated - {} parts of {} bytes",
        session.upload_id, session.total_parts, session.part_size
    );

    Ok(session)
}
