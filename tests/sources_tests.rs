//! Video and document source tests
//!
//! Remote collaborators are served by `wiremock`; the PDF converter and the
//! metadata tool are replaced with stubs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scrape_to_md::dispatch::Dispatcher;
use scrape_to_md::error::{Error, Result, VideoError};
use scrape_to_md::output::parse_document;
use scrape_to_md::sources::video::{extract_video_id, YoutubeTranscripts};
use scrape_to_md::sources::{
    DocumentConverter, DocumentScraper, MetadataSource, Progress, TranscriptSource, VideoMetadata,
    VideoScraper, WebScraper,
};

struct StubMetadata(Option<VideoMetadata>);

#[async_trait]
impl MetadataSource for StubMetadata {
    async fn fetch_metadata(&self, video_id: &str) -> Result<VideoMetadata> {
        self.0
            .clone()
            .ok_or_else(|| VideoError::MetadataFailed(format!("no metadata for {video_id}")).into())
    }
}

struct StubTranscript(Option<String>);

#[async_trait]
impl TranscriptSource for StubTranscript {
    async fn fetch_transcript(&self, _video_id: &str) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

struct FailingTranscript;

#[async_trait]
impl TranscriptSource for FailingTranscript {
    async fn fetch_transcript(&self, _video_id: &str) -> Result<Option<String>> {
        Err(Error::generic("transcripts disabled"))
    }
}

fn full_metadata() -> VideoMetadata {
    VideoMetadata {
        title: Some("Rust in 100 Seconds".to_string()),
        description: Some("A quick tour.".to_string()),
        duration: Some(3725.0),
        upload_date: Some("20210915".to_string()),
    }
}

#[test]
fn test_extract_video_id_shapes() {
    assert_eq!(extract_video_id("https://youtu.be/abc123").unwrap(), "abc123");
    assert_eq!(extract_video_id("https://youtu.be/abc123?t=42").unwrap(), "abc123");
    assert_eq!(
        extract_video_id("https://www.youtube.com/watch?v=abc123&t=42").unwrap(),
        "abc123"
    );
    assert_eq!(
        extract_video_id("https://youtube.com/watch?feature=share&v=xyz").unwrap(),
        "xyz"
    );

    let err = extract_video_id("https://www.youtube.com/channel/UC123").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Could not extract video ID from URL: https://www.youtube.com/channel/UC123"
    );
}

#[tokio::test]
async fn test_video_document_with_metadata_and_transcript() {
    let scraper = VideoScraper::new(
        Box::new(StubTranscript(Some("hello\nworld".to_string()))),
        Box::new(StubMetadata(Some(full_metadata()))),
    );

    let doc = scraper.scrape("https://youtu.be/abc123").await.unwrap();
    let (header, body) = parse_document(&doc.to_markdown().unwrap()).unwrap();

    assert_eq!(header.source, "YouTube");
    assert_eq!(header.title.as_deref(), Some("Rust in 100 Seconds"));
    assert_eq!(header.video_id.as_deref(), Some("abc123"));
    assert_eq!(header.duration.as_deref(), Some("1:02:05"));
    assert_eq!(header.upload_date.as_deref(), Some("20210915"));
    assert_eq!(
        body,
        "# Rust in 100 Seconds\n\n**URL**: https://youtu.be/abc123\n\n## Description\n\nA quick tour.\n\n## Transcript\n\nhello\nworld"
    );
    assert_eq!(doc.file_stem(), "Rust_in_100_Seconds");
}

#[tokio::test]
async fn test_video_survives_failing_collaborators() {
    let scraper = VideoScraper::new(Box::new(FailingTranscript), Box::new(StubMetadata(None)));

    let doc = scraper
        .scrape("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        .await
        .unwrap();

    assert_eq!(doc.header.title.as_deref(), Some("dQw4w9WgXcQ"));
    assert_eq!(doc.header.duration.as_deref(), Some(""));
    assert_eq!(doc.header.upload_date.as_deref(), Some(""));
    assert!(doc.body.ends_with("## Transcript\n\n*Transcript not available*"));
}

#[tokio::test]
async fn test_video_rejects_unknown_url_shape() {
    let scraper = VideoScraper::new(Box::new(StubTranscript(None)), Box::new(StubMetadata(None)));
    let err = scraper.scrape("https://youtube.com/").await.unwrap_err();
    assert!(matches!(err, Error::Video(VideoError::InvalidVideoUrl(_))));
}

#[tokio::test]
async fn test_transcript_from_caption_track() {
    let server = MockServer::start().await;
    let track_url = format!("{}/api/timedtext?v=abc123&lang=en", server.uri());
    let watch_page = format!(
        r#"<html><script>var ytInitialPlayerResponse = {{"captions":{{"playerCaptionsTracklistRenderer":{{"captionTracks":[{{"baseUrl":"{track_url}","languageCode":"en","kind":"asr"}}]}}}}}};</script></html>"#
    );

    Mock::given(method("GET"))
        .and(path("/watch"))
        .and(query_param("v", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(watch_page))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/timedtext"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<transcript><text start="0" dur="1">First &amp;amp; foremost</text><text start="1" dur="1">second line</text></transcript>"#,
        ))
        .mount(&server)
        .await;

    let source = YoutubeTranscripts::default().with_base_url(server.uri());
    let transcript = source.fetch_transcript("abc123").await.unwrap();
    assert_eq!(transcript.as_deref(), Some("First & foremost\nsecond line"));
}

#[tokio::test]
async fn test_transcript_absent_without_tracks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>no captions</html>"))
        .mount(&server)
        .await;

    let source = YoutubeTranscripts::default().with_base_url(server.uri());
    assert_eq!(source.fetch_transcript("abc123").await.unwrap(), None);
}

/// Converter recording the paths it saw
struct StubConverter {
    seen: Mutex<Vec<PathBuf>>,
    fail: bool,
}

impl StubConverter {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            fail,
        })
    }
}

impl DocumentConverter for StubConverter {
    fn convert(&self, path: &Path) -> Result<String> {
        self.seen.lock().push(path.to_path_buf());
        if self.fail {
            return Err(Error::generic("not a PDF"));
        }
        let bytes = std::fs::read(path)?;
        Ok(format!("Converted {} bytes", bytes.len()))
    }
}

fn scratch_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

async fn pdf_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/papers/Report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 fake".to_vec()))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_document_converted_and_scratch_removed() {
    let server = pdf_server().await;
    let scratch = tempfile::tempdir().unwrap();
    let converter = StubConverter::new(false);
    let scraper = DocumentScraper::new(reqwest::Client::new(), converter.clone())
        .with_scratch_dir(scratch.path());

    let url = format!("{}/papers/Report.pdf", server.uri());
    let doc = scraper.scrape(&url).await.unwrap();

    assert_eq!(doc.body, "Converted 13 bytes");
    assert_eq!(doc.header.source, "PDF");
    assert_eq!(doc.header.url, url);
    assert!(doc.header.title.is_none());
    assert_eq!(doc.file_stem(), "Report");

    let seen = converter.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].extension().and_then(|e| e.to_str()), Some("pdf"));
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_document_name_is_percent_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
        .mount(&server)
        .await;

    let scratch = tempfile::tempdir().unwrap();
    let scraper = DocumentScraper::new(reqwest::Client::new(), StubConverter::new(false))
        .with_scratch_dir(scratch.path());

    let doc = scraper
        .scrape(&format!("{}/papers/My%20Paper.pdf", server.uri()))
        .await
        .unwrap();
    assert_eq!(doc.file_stem(), "My_Paper");
}

#[tokio::test]
async fn test_document_download_failure_cleans_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let scratch = tempfile::tempdir().unwrap();
    let converter = StubConverter::new(false);
    let scraper = DocumentScraper::new(reqwest::Client::new(), converter.clone())
        .with_scratch_dir(scratch.path());

    let err = scraper
        .scrape(&format!("{}/missing.pdf", server.uri()))
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("Failed to download PDF: "));
    assert!(converter.seen.lock().is_empty());
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_document_conversion_failure_cleans_up() {
    let server = pdf_server().await;
    let scratch = tempfile::tempdir().unwrap();
    let scraper = DocumentScraper::new(reqwest::Client::new(), StubConverter::new(true))
        .with_scratch_dir(scratch.path());

    let err = scraper
        .scrape(&format!("{}/papers/Report.pdf", server.uri()))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Failed to convert PDF: not a PDF");
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_dispatcher_routes_by_kind() {
    let server = pdf_server().await;
    let scratch = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let dispatcher = Dispatcher::new(
        WebScraper::new(Vec::new(), Progress::silent()),
        VideoScraper::new(
            Box::new(StubTranscript(None)),
            Box::new(StubMetadata(Some(full_metadata()))),
        ),
        DocumentScraper::new(reqwest::Client::new(), StubConverter::new(false))
            .with_scratch_dir(scratch.path()),
    );

    let video = dispatcher
        .scrape_to_file("https://youtube.com/watch?v=abc123", out.path())
        .await
        .unwrap();
    assert_eq!(video.file_name().unwrap(), "Rust_in_100_Seconds.md");

    let pdf_url = format!("{}/papers/Report.pdf", server.uri());
    let first = dispatcher.scrape_to_file(&pdf_url, out.path()).await.unwrap();
    let second = dispatcher.scrape_to_file(&pdf_url, out.path()).await.unwrap();
    assert_eq!(first.file_name().unwrap(), "Report.md");
    assert_eq!(second.file_name().unwrap(), "Report_1.md");

    // No web strategy configured
    assert!(dispatcher.render("https://example.com/page").await.is_err());
}
