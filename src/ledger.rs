// src/ledger.rs

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Append-only record of links that have already been handled.
///
/// The file holds one absolute link per line. It is loaded once when the
/// ledger is opened; `record` appends to both the file and the in-memory set.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    seen: HashSet<String>,
    // Set when the file on disk does not end with a newline.
    needs_newline: bool,
}

impl Ledger {
    /// Opens the ledger at `path`. A missing or unreadable file is an empty ledger.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No ledger at {}, starting empty", path.display());
                String::new()
            }
            Err(e) => {
                warn!("Failed to read ledger {}: {}; treating as empty", path.display(), e);
                String::new()
            }
        };
        let seen = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        let needs_newline = !content.is_empty() && !content.ends_with('\n');
        Self { path, seen, needs_newline }
    }

    /// True if `link` was recorded as a whole line.
    pub fn contains(&self, link: &str) -> bool {
        self.seen.contains(link)
    }

    /// Appends `link`, creating the ledger file if needed.
    pub fn record(&mut self, link: &str) -> io::Result<()> {
        if self.seen.contains(link) {
            return Ok(());
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if self.needs_newline {
            writeln!(file)?;
            self.needs_newline = false;
        }
        writeln!(file, "{}", link)?;
        self.seen.insert(link.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
