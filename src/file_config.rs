use crate::error::Result;
use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration loaded from JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
}

impl FileConfig {
    /// Load config from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        debug!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: FileConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Load config with fallback priority:
    /// 1. Explicit path (if provided)
    /// 2. Project directory (./remote-cache.json or ./.remote-cache/config.json)
    /// 3. User config directory (~/.config/remote-cache/config.json)
    ///
    /// # Errors
    ///
    /// Returns an error only if an explicit path is provided but cannot be read
    pub fn load_with_fallback(explicit_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load_from_path(path);
        }

        let mut candidates = vec![
            PathBuf::from("./remote-cache.json"),
            PathBuf::from("./.remote-cache/config.json"),
        ];
        if let Some(proj_dirs) = ProjectDirs::from("", "", "remote-cache") {
            candidates.push(proj_dirs.config_dir().join("config.json"));
        }

        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_path(path) {
                Ok(config) => {
                    debug!("Loaded config from {}", path.display());
                    return Ok(config);
                }
                Err(e) => {
                    debug!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }

        debug!("No config file found, using defaults");
        Ok(FileConfig::default())
    }

    /// Merge with another config, preferring values from self
    #[must_use]
    pub fn merge_with(&self, other: &FileConfig) -> Self {
        FileConfig {
            api_key: self.api_key.clone().or_else(|| other.api_key.clone()),
            api_url: self.api_url.clone().or_else(|| other.api_url.clone()),
            parallel: self.parallel.or(other.parallel),
            retries: self.retries.or(other.retries),
            backoff_ms: self.backoff_ms.or(other.backoff_ms),
        }
    }
}
