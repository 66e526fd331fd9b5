use crate::api::Backend;
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use reqwest::Client as HttpClient;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct Client {
    config: Config,
    http: HttpClient,
}

/// Every backend response wraps its payload in `{"data": ...}`
#[derive(Deserialize, Debug)]
pub struct Envelope<T> {
    pub data: Option<T>,
}

/// Request for opening a chunked upload session
#[derive(Serialize, Debug)]
#[serde(rename_all = "snake_case")]
pub struct InitSessionRequest {
    pub file_extension: String,
    pub size: u64,
}

/// Raw session payload; fields are validated by the session negotiator
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct InitSessionData {
    pub upload_id: Option<String>,
    pub part_size: Option<u64>,
    pub total_parts: Option<u64>,
    pub uploaded_parts: Option<Vec<u64>>,
    pub presigned_urls: Option<PresignedUrls>,
}

/// Presigned URLs either keyed by part number or listed with their part number
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum PresignedUrls {
    ByPartNumber(BTreeMap<String, String>),
    List(Vec<PresignedUrlPart>),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct PresignedUrlPart {
    pub part_number: u64,
    pub url: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct FinalizeData {
    pub url: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SingleUploadData {
    presigned_url: Option<String>,
}

impl PresignedUrls {
    /// Flattens either representation into a part-number ordered map.
    ///
    /// # Errors
    ///
    /// Returns a session error if a map key is not a part number.
    pub fn into_map(self) -> Result<BTreeMap<u64, String>> {
        match self {
            PresignedUrls::ByPartNumber(map) => map
                .into_iter()
                .map(|(key, url)| {
                    key.trim()
                        .parse::<u64>()
                        .map(|index| (index, url))
                        .map_err(|_| Error::SessionError(format!("Invalid part number '{key}'")))
                })
                .collect(),
            PresignedUrls::List(parts) => {
                Ok(parts.into_iter().map(|p| (p.part_number, p.url)).collect())
            }
        }
    }
}

fn parse_envelope<T: DeserializeOwned>(
    body: &str,
    wrap: impl Fn(String) -> Error,
) -> Result<Option<T>> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| wrap(format!("Failed to parse response: {e}. Body was: {body}")))?;
    Ok(envelope.data)
}

impl Client {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            http: HttpClient::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl Backend for Client {
    /// Open a chunked upload session
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails or if the server returns a non-success status code.
    async fn init_session(&self, file_extension: &str, size: u64) -> Result<InitSessionData> {
        let url = self.config.init_url();
        debug!("Initiating upload session at: {url}");

        let request = InitSessionRequest {
            file_extension: file_extension.to_string(),
            size,
        };

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.config.api_key.clone())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SessionError(format!("Status {status}: {body}")));
        }

        let body = response.text().await?;
        debug!("Init response body: {body}");

        parse_envelope::<InitSessionData>(&body, Error::SessionError)?
            .ok_or_else(|| Error::SessionError("Response is missing data".to_string()))
    }

    /// Upload one part to its presigned URL
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails or if the server returns a non-success status code.
    async fn put_part(&self, url: &str, data: Bytes) -> Result<()> {
        let response = self
            .http
            .put(url)
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UploadError(format!("Status {status}")));
        }

        Ok(())
    }

    /// Look up the durable URL of an upload session
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails or if the server returns a non-success status code.
    async fn fetch_url(&self, upload_id: &str) -> Result<FinalizeData> {
        let url = self.config.finalize_url(upload_id);
        debug!("Fetching URL for upload {upload_id} from: {url}");

        let response = self
            .http
            .get(&url)
            .header("Authorization", self.config.api_key.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::FinalizeError(format!("Status {status}: {body}")));
        }

        let body = response.text().await?;
        debug!("Finalize response body: {body}");

        Ok(parse_envelope::<FinalizeData>(&body, Error::FinalizeError)?.unwrap_or_default())
    }

    /// Upload a whole file as a single form post
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails, the server returns a non-success
    /// status code, or the response carries no URL.
    async fn upload_whole(&self, file_name: &str, data: Bytes) -> Result<String> {
        let url = self.config.single_upload_url();
        info!("Uploading {} bytes to {url}", data.len());

        let form = Form::new().part("file", Part::stream(data).file_name(file_name.to_string()));

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.config.api_key.clone())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UploadError(format!("Status {status}: {body}")));
        }

        let body = response.text().await?;
        debug!("Upload response body: {body}");

        parse_envelope::<SingleUploadData>(&body, Error::UploadError)?
            .and_then(|d| d.presigned_url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::UploadError("No presigned URL received from server".to_string()))
    }
}
