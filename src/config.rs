// src/config.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_LISTING_URL: &str = "https://www.duragloss.com/sds-sheets/";
pub const DEFAULT_BASE_URL: &str = "https://www.duragloss.com";
pub const DEFAULT_SNAPSHOT_PATH: &str = "duragloss.html";
pub const DEFAULT_LEDGER_PATH: &str = "pdf_links.txt";
pub const DEFAULT_OUTPUT_DIR: &str = "PDFs";
pub const DEFAULT_EXTENSION: &str = ".pdf";
pub const DEFAULT_MEDIA_TYPE: &str = "application/pdf";
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 5 * 60;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Everything the pipeline needs to know about the site and local storage.
///
/// Every field has a default, so a JSON config file only has to name the
/// values it wants to change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The page rendered in the browser to discover document links.
    pub listing_url: String,
    /// Origin prepended to site-relative links.
    pub base_url: String,
    /// Cached rendered markup of the listing page.
    pub snapshot_path: PathBuf,
    /// Append-only record of links already processed.
    pub ledger_path: PathBuf,
    /// Where downloaded documents are written.
    pub output_dir: PathBuf,
    /// Suffix an anchor's href must end with (case-insensitive).
    pub extension: String,
    /// Token the response's Content-Type must contain.
    pub media_type: String,
    pub download_timeout_secs: u64,
    pub render_timeout_secs: u64,
    pub user_agent: String,
    /// Chrome/Chromium binary; falls back to `CHROMIUM_PATH`, then auto-detection.
    pub chrome_executable: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            extension: DEFAULT_EXTENSION.to_string(),
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            render_timeout_secs: DEFAULT_RENDER_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chrome_executable: None,
        }
    }
}

impl Config {
    /// Loads a JSON config file and validates it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that URLs parse and that the link filters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.listing_url).map_err(|source| ConfigError::InvalidUrl {
            field: "listing_url",
            value: self.listing_url.clone(),
            source,
        })?;
        self.base_origin()?;
        if self.extension.trim().is_empty() {
            return Err(ConfigError::Empty("extension"));
        }
        if self.media_type.trim().is_empty() {
            return Err(ConfigError::Empty("media_type"));
        }
        if self.download_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("download_timeout_secs"));
        }
        if self.render_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("render_timeout_secs"));
        }
        Ok(())
    }

    /// The parsed base URL used to resolve site-relative links.
    pub fn base_origin(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidUrl {
            field: "base_url",
            value: self.base_url.clone(),
            source,
        })
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}
