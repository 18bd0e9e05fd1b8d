// src/spider/renderer.rs

//! Headless browser rendering for pages that only reveal their links after
//! JavaScript has run.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::RenderError;

/// Anything that can turn a URL into its fully rendered markup.
#[allow(async_fn_in_trait)]
pub trait PageRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderError>;
}

/// Renders pages in a short-lived headless Chromium instance.
///
/// Each call launches its own browser with a throwaway profile directory.
/// Browser startup, navigation and extraction share one overall timeout.
pub struct ChromeRenderer {
    timeout: Duration,
    executable: Option<PathBuf>,
    user_agent: String,
}

impl ChromeRenderer {
    pub fn new(config: &Config) -> Self {
        Self {
            timeout: config.render_timeout(),
            executable: config.chrome_executable.clone(),
            user_agent: config.user_agent.clone(),
        }
    }

    /// Configured path first, then `CHROMIUM_PATH`. `None` lets chromiumoxide
    /// search the usual install locations.
    fn resolve_executable(&self) -> Option<PathBuf> {
        self.pick_executable(std::env::var_os("CHROMIUM_PATH"))
    }

    fn pick_executable(&self, chromium_path: Option<OsString>) -> Option<PathBuf> {
        if let Some(path) = &self.executable {
            return Some(path.clone());
        }
        let path = PathBuf::from(chromium_path?);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            Some(path)
        } else {
            warn!("CHROMIUM_PATH points to a missing file: {}", path.display());
            None
        }
    }

    fn browser_config(&self, profile_dir: &Path) -> Result<BrowserConfig, RenderError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .user_data_dir(profile_dir)
            .request_timeout(self.timeout)
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-setuid-sandbox")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg(format!("--user-agent={}", self.user_agent));

        if let Some(executable) = self.resolve_executable() {
            builder = builder.chrome_executable(executable);
        }

        builder.build().map_err(RenderError::Config)
    }

    async fn render_in_browser(&self, url: &str, profile_dir: &Path) -> Result<String, RenderError> {
        let config = self.browser_config(profile_dir)?;
        let (browser, mut handler) = Browser::launch(config).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {:?}", e);
                }
            }
        });

        let mut session = BrowserSession { browser, handler };
        let result = session.outer_html(url).await;
        session.shutdown().await;
        result
    }
}

impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        info!("Rendering {} in headless browser", url);

        let profile_dir =
            std::env::temp_dir().join(format!("sds_harvest_chrome_{}", std::process::id()));
        std::fs::create_dir_all(&profile_dir).map_err(RenderError::Profile)?;

        // On timeout the session is dropped, which kills the browser.
        let outcome = tokio::time::timeout(self.timeout, self.render_in_browser(url, &profile_dir)).await;

        if let Err(e) = std::fs::remove_dir_all(&profile_dir) {
            warn!("Failed to remove browser profile {}: {}", profile_dir.display(), e);
        }

        match outcome {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout(self.timeout.as_secs())),
        }
    }
}

/// A launched browser plus the task pumping its CDP events.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn outer_html(&self, url: &str) -> Result<String, RenderError> {
        let page = self.browser.new_page(url).await?;
        page.wait_for_navigation().await?;
        let html = page.content().await?;
        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }
        Ok(html)
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Failed to wait for browser exit: {}", e);
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(executable: Option<PathBuf>) -> ChromeRenderer {
        ChromeRenderer::new(&Config {
            chrome_executable: executable,
            ..Config::default()
        })
    }

    #[test]
    fn configured_executable_wins_over_environment() {
        let dir = tempfile::tempdir().unwrap();
        let from_env = dir.path().join("chromium-env");
        std::fs::write(&from_env, b"").unwrap();
        let configured = PathBuf::from("/opt/custom/chrome");

        let picked = renderer(Some(configured.clone())).pick_executable(Some(from_env.into()));
        assert_eq!(picked, Some(configured));
    }

    #[test]
    fn environment_path_is_used_when_it_exists() {
        let dir = tempfile::tempdir().unwrap();
        let from_env = dir.path().join("chromium-env");
        std::fs::write(&from_env, b"").unwrap();

        let picked = renderer(None).pick_executable(Some(from_env.clone().into()));
        assert_eq!(picked, Some(from_env));
    }

    #[test]
    fn missing_environment_path_falls_back_to_detection() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-chrome");

        assert_eq!(renderer(None).pick_executable(Some(missing.into())), None);
        assert_eq!(renderer(None).pick_executable(None), None);
    }

    #[test]
    fn timeout_comes_from_config() {
        let chrome = ChromeRenderer::new(&Config {
            render_timeout_secs: 42,
            ..Config::default()
        });
        assert_eq!(chrome.timeout, Duration::from_secs(42));
    }
}
