// src/downloader/mod.rs

use std::path::{Path, PathBuf};

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::error::DownloadError;

pub mod sanitize;
pub use sanitize::sanitize_filename;

/// What happened to a link that did not fail.
#[derive(Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The document was fetched, validated and written.
    Saved { path: PathBuf, bytes: usize },
    /// A file with the target name was already on disk; nothing was fetched.
    AlreadyPresent(PathBuf),
}

/// Fetches documents and persists each one at most once.
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    media_type: String,
}

impl Downloader {
    /// Creates a Downloader whose client enforces the configured timeout.
    pub fn new(config: &Config) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.download_timeout())
            .build()?;

        Ok(Self {
            client,
            media_type: config.media_type.to_ascii_lowercase(),
        })
    }

    /// Downloads `url` into `dir` unless a file for it already exists.
    ///
    /// A file appears under the target name only if the response is a 2xx,
    /// declares the expected media type and has a non-empty body.
    pub async fn download(&self, url: &str, dir: &Path) -> Result<DownloadOutcome, DownloadError> {
        let filename = sanitize_filename(url);
        if filename.is_empty() || filename == "." || filename == ".." {
            return Err(DownloadError::InvalidFilename(url.to_string()));
        }

        let path = dir.join(&filename);
        if is_file(&path).await {
            return Ok(DownloadOutcome::AlreadyPresent(path));
        }

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.to_ascii_lowercase().contains(&self.media_type) {
            return Err(DownloadError::ContentType {
                found: content_type,
                expected: self.media_type.clone(),
            });
        }

        // Buffer everything so a truncated transfer never reaches the disk.
        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(DownloadError::EmptyBody);
        }

        write_atomically(&path, &body).await?;

        Ok(DownloadOutcome::Saved {
            path,
            bytes: body.len(),
        })
    }
}

async fn is_file(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file())
}

/// Writes to a hidden sibling and renames it into place.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.part", file_name));

    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(source) = result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(DownloadError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
