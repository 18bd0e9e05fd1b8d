// src/spider/mod.rs

use std::path::Path;

use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::downloader::{DownloadOutcome, Downloader};
use crate::error::ConfigError;
use crate::ledger::Ledger;

pub mod extractor;
pub mod renderer;

use extractor::{dedup_links, extract_document_links, normalize_link};
use renderer::PageRenderer;

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Every discovered link was visited, whatever happened to each one.
    Done,
    /// The snapshot could not be read; no links were processed.
    Aborted,
}

/// Whether there is a snapshot on disk to read links from.
enum Snapshot {
    Ready,
    NotRendered,
}

/// The Spider runs render → extract → dedup → download for one listing page.
pub struct Spider<R> {
    config: Config,
    base: Url,
    renderer: R,
    downloader: Downloader,
}

impl<R: PageRenderer> Spider<R> {
    pub fn new(config: Config, renderer: R, downloader: Downloader) -> Result<Self, ConfigError> {
        let base = config.base_origin()?;
        Ok(Self {
            config,
            base,
            renderer,
            downloader,
        })
    }

    /// Runs the full pipeline. Per-link failures are logged and never stop the run.
    pub async fn run(&self) -> RunState {
        let snapshot = self.ensure_snapshot().await;
        self.ensure_output_dir();

        let links = match snapshot {
            Snapshot::Ready => match self.load_links().await {
                Some(links) => links,
                None => return RunState::Aborted,
            },
            Snapshot::NotRendered => Vec::new(),
        };
        info!("Found {} unique document links", links.len());

        let mut ledger = Ledger::open(&self.config.ledger_path);
        if !ledger.is_empty() {
            debug!("Ledger {} holds {} links", ledger.path().display(), ledger.len());
        }

        for link in &links {
            self.process_link(link, &mut ledger).await;
        }

        info!("Finished processing links from {}", self.config.listing_url);
        RunState::Done
    }

    /// Renders (if needed) and extracts links without downloading anything.
    /// Returns `None` when the snapshot exists but cannot be read.
    pub async fn discover(&self) -> Option<Vec<String>> {
        match self.ensure_snapshot().await {
            Snapshot::Ready => self.load_links().await,
            Snapshot::NotRendered => Some(Vec::new()),
        }
    }

    /// Renders the listing page once and caches it. An existing snapshot is
    /// never refreshed; delete it to force a re-render.
    async fn ensure_snapshot(&self) -> Snapshot {
        let path = &self.config.snapshot_path;
        if path.is_file() {
            debug!("Using cached snapshot {}", path.display());
            return Snapshot::Ready;
        }

        let url = &self.config.listing_url;
        info!("Scraping: {}", url);
        let markup = match self.renderer.render(url).await {
            Ok(markup) => markup,
            Err(e) => {
                error!("Failed to render {}: {}", url, e);
                String::new()
            }
        };

        if markup.trim().is_empty() {
            warn!("Rendering {} produced no markup; snapshot not written", url);
            return Snapshot::NotRendered;
        }

        match tokio::fs::write(path, markup.as_bytes()).await {
            Ok(()) => info!("Saved snapshot to {}", path.display()),
            Err(e) => error!("Failed to save snapshot {}: {}", path.display(), e),
        }
        Snapshot::Ready
    }

    fn ensure_output_dir(&self) {
        let dir = &self.config.output_dir;
        if dir.is_dir() {
            return;
        }
        if let Err(e) = create_dir(dir) {
            error!("Failed to create output directory {}: {}", dir.display(), e);
        }
    }

    async fn load_links(&self) -> Option<Vec<String>> {
        let path = &self.config.snapshot_path;
        let markup = match tokio::fs::read_to_string(path).await {
            Ok(markup) => markup,
            Err(e) => {
                error!("Failed to read snapshot {}: {}", path.display(), e);
                return None;
            }
        };

        let raw = dedup_links(extract_document_links(&markup, &self.config.extension));
        let absolute = raw.into_iter().filter_map(|link| {
            let normalized = normalize_link(&link, &self.base);
            if normalized.is_none() {
                warn!("Skipping link that cannot be made absolute: {}", link);
            }
            normalized
        });
        // "/a.pdf" and "https://base/a.pdf" collapse once normalized.
        Some(dedup_links(absolute))
    }

    async fn process_link(&self, link: &str, ledger: &mut Ledger) {
        if ledger.contains(link) {
            info!("Link already processed, skipping: {}", link);
            return;
        }

        match self.downloader.download(link, &self.config.output_dir).await {
            Ok(DownloadOutcome::Saved { path, bytes }) => {
                info!("Downloaded {} bytes: {} -> {}", bytes, link, path.display());
            }
            Ok(DownloadOutcome::AlreadyPresent(path)) => {
                info!("File already exists, skipping: {}", path.display());
            }
            Err(e) => {
                warn!("Failed to download {}: {}", link, e);
                return;
            }
        }

        if let Err(e) = ledger.record(link) {
            warn!("Failed to record {} in {}: {}", link, ledger.path().display(), e);
        }
    }
}

/// Creates `dir` as rwxr-xr-x.
fn create_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PDF_BYTES: &[u8] = b"%PDF-1.7\n%%EOF\n";

    /// Returns canned markup, or a render error when there is none.
    struct FakeRenderer {
        markup: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeRenderer {
        fn new(markup: Option<String>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let renderer = Self {
                markup,
                calls: calls.clone(),
            };
            (renderer, calls)
        }
    }

    impl PageRenderer for FakeRenderer {
        async fn render(&self, _url: &str) -> Result<String, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.markup.clone().ok_or(RenderError::Timeout(300))
        }
    }

    fn test_config(dir: &Path, base: &str) -> Config {
        Config {
            listing_url: format!("{}/sds-sheets/", base),
            base_url: base.to_string(),
            snapshot_path: dir.join("listing.html"),
            ledger_path: dir.join("pdf_links.txt"),
            output_dir: dir.join("PDFs"),
            download_timeout_secs: 5,
            ..Config::default()
        }
    }

    fn spider(config: Config, renderer: FakeRenderer) -> Spider<FakeRenderer> {
        let downloader = Downloader::new(&config).unwrap();
        Spider::new(config, renderer, downloader).unwrap()
    }

    fn read_ledger(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    fn output_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[tokio::test]
    async fn downloads_only_valid_documents_and_records_them() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let good = server
            .mock("GET", "/docs/a.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(PDF_BYTES)
            .expect(1)
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/docs/b.PDF")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;
        let html_page = server
            .mock("GET", "/docs/c.pdf")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .expect(1)
            .create_async()
            .await;

        let markup = format!(
            r#"<html><body>
                <a href="/docs/a.pdf">A</a>
                <a href="/docs/a.pdf">A again</a>
                <a href="/docs/b.PDF">B</a>
                <a href="/docs/notes.txt">Notes</a>
                <a href="{base}/docs/c.pdf">C</a>
                <a href="{base}/docs/a.pdf">A absolute</a>
            </body></html>"#
        );
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &base);
        let (renderer, calls) = FakeRenderer::new(Some(markup));

        let state = spider(config.clone(), renderer).run().await;

        assert_eq!(state, RunState::Done);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(config.snapshot_path.is_file());
        assert_eq!(output_files(&config.output_dir), vec![config.output_dir.join("a.pdf")]);
        assert_eq!(std::fs::read(config.output_dir.join("a.pdf")).unwrap(), PDF_BYTES);
        assert_eq!(read_ledger(&config.ledger_path), vec![format!("{base}/docs/a.pdf")]);
        good.assert_async().await;
        missing.assert_async().await;
        html_page.assert_async().await;
    }

    #[tokio::test]
    async fn ledger_entries_skip_the_network() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let mock = server
            .mock("GET", "/docs/a.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(PDF_BYTES)
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &base);
        std::fs::write(&config.ledger_path, format!("{base}/docs/a.pdf\n")).unwrap();
        let (renderer, _) = FakeRenderer::new(Some(r#"<a href="/docs/a.pdf">A</a>"#.to_string()));

        assert_eq!(spider(config.clone(), renderer).run().await, RunState::Done);

        assert!(output_files(&config.output_dir).is_empty());
        assert_eq!(read_ledger(&config.ledger_path).len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn existing_file_skips_the_network_and_is_recorded() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let mock = server
            .mock("GET", "/docs/a.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(PDF_BYTES)
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &base);
        std::fs::create_dir_all(&config.output_dir).unwrap();
        std::fs::write(config.output_dir.join("a.pdf"), b"already here").unwrap();
        let (renderer, _) = FakeRenderer::new(Some(r#"<a href="/docs/a.pdf">A</a>"#.to_string()));

        assert_eq!(spider(config.clone(), renderer).run().await, RunState::Done);

        assert_eq!(
            std::fs::read(config.output_dir.join("a.pdf")).unwrap(),
            b"already here"
        );
        assert_eq!(read_ledger(&config.ledger_path), vec![format!("{base}/docs/a.pdf")]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn second_run_issues_no_requests() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let mock = server
            .mock("GET", "/docs/a.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(PDF_BYTES)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &base);
        let markup = r#"<a href="/docs/a.pdf">A</a>"#.to_string();

        let (first, first_calls) = FakeRenderer::new(Some(markup.clone()));
        assert_eq!(spider(config.clone(), first).run().await, RunState::Done);
        let (second, second_calls) = FakeRenderer::new(Some(markup));
        assert_eq!(spider(config.clone(), second).run().await, RunState::Done);

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(read_ledger(&config.ledger_path).len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unwritable_ledger_does_not_stop_downloads() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let mut mocks = Vec::new();
        for path in ["/docs/a.pdf", "/docs/b.pdf"] {
            let mock = server
                .mock("GET", path)
                .with_status(200)
                .with_header("content-type", "application/pdf")
                .with_body(PDF_BYTES)
                .expect(1)
                .create_async()
                .await;
            mocks.push(mock);
        }

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), &base);
        config.ledger_path = dir.path().join("ledger-dir");
        std::fs::create_dir(&config.ledger_path).unwrap();
        let (renderer, _) = FakeRenderer::new(Some(
            r#"<a href="/docs/a.pdf">A</a><a href="/docs/b.pdf">B</a>"#.to_string(),
        ));

        let state = spider(config.clone(), renderer).run().await;

        assert_eq!(state, RunState::Done);
        assert_eq!(
            output_files(&config.output_dir),
            vec![config.output_dir.join("a.pdf"), config.output_dir.join("b.pdf")]
        );
        assert!(output_files(&config.ledger_path).is_empty());
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn cached_snapshot_is_not_rerendered() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "https://www.duragloss.com");
        std::fs::write(
            &config.snapshot_path,
            r#"<a href="/sds/one.pdf">1</a><a href="https://cdn.test/two.PDF">2</a>"#,
        )
        .unwrap();
        let (renderer, calls) = FakeRenderer::new(Some("<a href=\"/other.pdf\">x</a>".to_string()));

        let links = spider(config, renderer).discover().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            links,
            vec!["https://www.duragloss.com/sds/one.pdf", "https://cdn.test/two.PDF"]
        );
    }

    #[tokio::test]
    async fn failed_render_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "https://www.duragloss.com");
        let (renderer, calls) = FakeRenderer::new(None);

        let state = spider(config.clone(), renderer).run().await;

        assert_eq!(state, RunState::Done);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!config.snapshot_path.exists());
        assert!(config.output_dir.is_dir());
        assert!(!config.ledger_path.exists());
    }

    #[tokio::test]
    async fn empty_render_writes_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "https://www.duragloss.com");
        let (renderer, _) = FakeRenderer::new(Some("  \n".to_string()));

        let links = spider(config.clone(), renderer).discover().await;

        assert_eq!(links, Some(Vec::new()));
        assert!(!config.snapshot_path.exists());
    }

    #[tokio::test]
    async fn unreadable_snapshot_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), "https://www.duragloss.com");
        // A directory in place of the snapshot can be neither written nor read.
        config.snapshot_path = dir.path().join("snapshot-dir");
        std::fs::create_dir(&config.snapshot_path).unwrap();
        let (renderer, _) = FakeRenderer::new(Some(r#"<a href="/a.pdf">A</a>"#.to_string()));

        let state = spider(config.clone(), renderer).run().await;

        assert_eq!(state, RunState::Aborted);
        assert!(!config.ledger_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_dir_is_created_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "https://www.duragloss.com");
        std::fs::write(&config.snapshot_path, "<p>no links here</p>").unwrap();
        let (renderer, _) = FakeRenderer::new(None);

        assert_eq!(spider(config.clone(), renderer).run().await, RunState::Done);

        let mode = std::fs::metadata(&config.output_dir).unwrap().permissions().mode();
        // The process umask can only remove bits.
        assert_eq!(mode & 0o700, 0o700);
        assert_eq!(mode & 0o022, 0);
    }
}
