use crate::error::{Error, Result};
use url::Url;

pub const DEFAULT_API_URL: &str = "https://console.oomol.com";

const REMOTE_CACHE_PATH: &str = "/api/tasks/files/remote-cache";

#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
}

impl Config {
    /// Creates a new Config instance with the provided parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `api_key` is empty
    /// - `api_url` is not an absolute http(s) URL
    pub fn new(api_key: String, api_url: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::ConfigError("API key cannot be empty".to_string()));
        }

        let parsed = Url::parse(&api_url)
            .map_err(|e| Error::ConfigError(format!("Invalid API URL '{api_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::ConfigError(format!(
                "API URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        Ok(Self {
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn single_upload_url(&self) -> String {
        format!("{}{REMOTE_CACHE_PATH}", self.api_url)
    }

    #[must_use]
    pub fn init_url(&self) -> String {
        format!("{}{REMOTE_CACHE_PATH}/init", self.api_url)
    }

    #[must_use]
    pub fn finalize_url(&self, upload_id: &str) -> String {
        format!("{}{REMOTE_CACHE_PATH}/{upload_id}/url", self.api_url)
    }
}
