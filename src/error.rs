// src/error.rs

use std::path::PathBuf;

/// Problems loading or validating a `Config`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {field} '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Failures while driving the headless browser.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to build browser config: {0}")]
    Config(String),

    #[error("failed to prepare browser profile directory: {0}")]
    Profile(#[source] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("render timed out after {0}s")]
    Timeout(u64),
}

/// Why a single link was not saved.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("no usable filename can be derived from {0}")]
    InvalidFilename(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid content type '{found}' (expected {expected})")]
    ContentType { found: String, expected: String },

    #[error("received 0 bytes; not creating file")]
    EmptyBody,

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
