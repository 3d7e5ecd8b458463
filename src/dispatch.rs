//! Routes a URL to the source that handles its kind and writes the result

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::classify::{classify, UrlKind};
use crate::config::Config;
use crate::error::Result;
use crate::output::{write_document, RenderedDocument};
use crate::sources::{DocumentScraper, Progress, VideoScraper, WebScraper};

/// One scraper per URL kind
pub struct Dispatcher {
    web: WebScraper,
    video: VideoScraper,
    document: DocumentScraper,
}

impl Dispatcher {
    /// Dispatcher over explicit scrapers
    pub fn new(web: WebScraper, video: VideoScraper, document: DocumentScraper) -> Self {
        Self {
            web,
            video,
            document,
        }
    }

    /// Production scrapers for `config`
    pub fn from_config(config: &Config, progress: Progress) -> Self {
        Self::new(
            WebScraper::from_config(config, progress),
            VideoScraper::default(),
            DocumentScraper::default(),
        )
    }

    /// Scrape `url` into a document without writing it
    #[instrument(skip(self))]
    pub async fn render(&self, url: &str) -> Result<RenderedDocument> {
        let kind = classify(url);
        info!(%kind, "Scraping");

        match kind {
            UrlKind::Video => self.video.scrape(url).await,
            UrlKind::Document => self.document.scrape(url).await,
            UrlKind::Web => Ok(self.web.fetch(url).await?.into_document()),
        }
    }

    /// Scrape `url` and write it under `dir`, returning the new file's path
    pub async fn scrape_to_file(&self, url: &str, dir: &Path) -> Result<PathBuf> {
        let doc = self.render(url).await?;
        let path = write_document(dir, &doc)?;
        info!(path = %path.display(), "Saved");
        Ok(path)
    }
}
