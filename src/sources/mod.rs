//! Converters from a URL to a [`RenderedDocument`](crate::output::RenderedDocument)
//!
//! - [`web`] - rendered pages, through the daemon or a one-off browser
//! - [`video`] - video transcripts and metadata
//! - [`document`] - remote PDF documents

pub mod document;
pub mod video;
pub mod web;

pub use document::{DocumentConverter, DocumentScraper, PdfExtractConverter};
pub use video::{MetadataSource, TranscriptSource, VideoMetadata, VideoScraper};
pub use web::{DaemonStrategy, StandaloneStrategy, WebPage, WebScraper, WebStrategy};

use std::fmt;
use std::sync::Arc;

/// Sink for user-facing progress lines (`Starting daemon...`, fallback
/// warnings). Silent unless the CLI installs one.
#[derive(Clone)]
pub struct Progress(Arc<dyn Fn(&str) + Send + Sync>);

impl Progress {
    /// Drop every message
    pub fn silent() -> Self {
        Self(Arc::new(|_| {}))
    }

    /// Print messages on stderr
    pub fn stderr() -> Self {
        Self(Arc::new(|msg| eprintln!("{msg}")))
    }

    /// Forward messages to a closure
    pub fn new(f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Report one message
    pub fn report(&self, msg: &str) {
        (self.0)(msg)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::silent()
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Progress")
    }
}
