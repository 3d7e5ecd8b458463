//! Remote PDF documents
//!
//! The file is downloaded to a scratch path, handed to a
//! [`DocumentConverter`], and the scratch file is removed on every exit
//! path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{DocumentError, Error, Result};
use crate::output::{Frontmatter, RenderedDocument};

/// File stem used when the URL has no usable last segment
pub const DOCUMENT_FALLBACK_NAME: &str = "document";

/// Turns a local document into Markdown
pub trait DocumentConverter: Send + Sync {
    /// Convert the file at `path`
    fn convert(&self, path: &Path) -> Result<String>;
}

/// Text extraction with `pdf-extract`
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractConverter;

impl DocumentConverter for PdfExtractConverter {
    fn convert(&self, path: &Path) -> Result<String> {
        let text = pdf_extract::extract_text(path)
            .map_err(|e| Error::generic(e.to_string()))?;
        Ok(reflow_paragraphs(&text))
    }
}

/// Join hard-wrapped lines into paragraphs separated by blank lines
pub fn reflow_paragraphs(text: &str) -> String {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    paragraphs.join("\n\n")
}

/// Uniquely named `.pdf` file, removed when dropped
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(dir: &Path) -> Self {
        let path = dir.join(format!("scrape-to-md-{}.pdf", uuid::Uuid::new_v4()));
        Self { path }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file"),
        }
    }
}

/// Downloads and converts remote documents
#[derive(Clone)]
pub struct DocumentScraper {
    http: reqwest::Client,
    converter: Arc<dyn DocumentConverter>,
    scratch_dir: PathBuf,
}

impl Default for DocumentScraper {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), Arc::new(PdfExtractConverter))
    }
}

impl DocumentScraper {
    /// Scraper using the system temp dir for scratch files
    pub fn new(http: reqwest::Client, converter: Arc<dyn DocumentConverter>) -> Self {
        Self {
            http,
            converter,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Put scratch files somewhere else
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(dest, &bytes).await?;
        debug!(bytes = bytes.len(), path = %dest.display(), "Downloaded document");
        Ok(())
    }

    /// Download `url` and convert it
    #[instrument(skip(self))]
    pub async fn scrape(&self, url: &str) -> Result<RenderedDocument> {
        let scratch = ScratchFile::new(&self.scratch_dir);

        self.download(url, &scratch.path)
            .await
            .map_err(|e| DocumentError::DownloadFailed(e.to_string()))?;

        let converter = Arc::clone(&self.converter);
        let path = scratch.path.clone();
        let markdown = tokio::task::spawn_blocking(move || converter.convert(&path))
            .await
            .map_err(|e| DocumentError::ConversionFailed(e.to_string()))?
            .map_err(|e| DocumentError::ConversionFailed(e.to_string()))?;

        drop(scratch);

        let name = document_name(url);
        Ok(RenderedDocument {
            header: Frontmatter::document(url),
            body: markdown,
            name_hint: name,
            fallback_name: DOCUMENT_FALLBACK_NAME.to_string(),
        })
    }
}

/// Last path segment of `url`, percent-decoded, without its `.pdf` suffix
pub fn document_name(url: &str) -> String {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return String::new();
    };
    let raw = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_default();
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let segment = decoded.as_ref();

    let lower = segment.to_ascii_lowercase();
    match lower.strip_suffix(".pdf") {
        Some(stem) => segment[..stem.len()].to_string(),
        None => segment.to_string(),
    }
}
