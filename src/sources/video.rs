//! Video transcripts
//!
//! Builds a document from two best-effort collaborators: a transcript
//! source (caption tracks of the watch page) and a metadata source
//! (`yt-dlp`). Either may fail without failing the scrape.

use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{Result, VideoError};
use crate::output::{Frontmatter, RenderedDocument};

/// Body text used when no transcript could be fetched
pub const TRANSCRIPT_PLACEHOLDER: &str = "*Transcript not available*";

/// Source label written into the metadata header
pub const VIDEO_SOURCE_LABEL: &str = "YouTube";

const DEFAULT_BASE_URL: &str = "https://www.youtube.com";
const TRANSCRIPT_LANGUAGE: &str = "en";

/// Extract the video identifier from a short link (`youtu.be/ID`) or a
/// canonical watch URL (`?v=ID`).
pub fn extract_video_id(url: &str) -> Result<String> {
    let invalid = || VideoError::InvalidVideoUrl(url.to_string());
    let parsed = Url::parse(url.trim()).map_err(|_| invalid())?;
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();

    let id = if host == "youtu.be" || host.ends_with(".youtu.be") {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .map(str::to_string)
    } else {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
    };

    id.filter(|id| !id.is_empty()).ok_or_else(|| invalid().into())
}

/// Format seconds as `H:MM:SS` from one hour up, `M:SS` below. Zero or
/// unknown durations format as an empty string.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return String::new();
    }
    let total = seconds as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Video details reported by the metadata tool
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VideoMetadata {
    /// Video title
    #[serde(default)]
    pub title: Option<String>,
    /// Description text
    #[serde(default)]
    pub description: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Upload date as `YYYYMMDD`
    #[serde(default)]
    pub upload_date: Option<String>,
}

/// Fetches a transcript for a video
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Transcript text, `None` when the video has none
    async fn fetch_transcript(&self, video_id: &str) -> Result<Option<String>>;
}

/// Fetches video metadata
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Title, description, duration and upload date
    async fn fetch_metadata(&self, video_id: &str) -> Result<VideoMetadata>;
}

#[derive(Debug, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode", default)]
    language_code: String,
    #[serde(default)]
    kind: Option<String>,
}

/// Reads caption tracks from the watch page and downloads the English one
#[derive(Debug, Clone)]
pub struct YoutubeTranscripts {
    http: reqwest::Client,
    base_url: String,
}

impl Default for YoutubeTranscripts {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl YoutubeTranscripts {
    /// Transcript source using `http`
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the watch-page lookups at another host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let text = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

/// Parse the `captionTracks` array embedded in a watch page
fn caption_tracks(page: &str) -> Vec<CaptionTrack> {
    const MARKER: &str = "\"captionTracks\":";
    let Some(start) = page.find(MARKER) else {
        return Vec::new();
    };

    let rest = &page[start + MARKER.len()..];
    serde_json::Deserializer::from_str(rest)
        .into_iter::<Vec<CaptionTrack>>()
        .next()
        .and_then(|parsed| parsed.ok())
        .unwrap_or_default()
}

/// Prefer manual English captions, then regional English, then generated
fn pick_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    let is_english = |t: &&CaptionTrack| {
        t.language_code == TRANSCRIPT_LANGUAGE
            || t.language_code.starts_with(&format!("{TRANSCRIPT_LANGUAGE}-"))
    };
    let is_generated = |t: &&CaptionTrack| t.kind.as_deref() == Some("asr");

    tracks
        .iter()
        .filter(is_english)
        .find(|t| t.language_code == TRANSCRIPT_LANGUAGE && !is_generated(t))
        .or_else(|| tracks.iter().filter(is_english).find(|t| !is_generated(t)))
        .or_else(|| tracks.iter().find(is_english))
}

fn cue_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").expect("static regex"))
}

/// Decode entities; caption text is often escaped twice
fn decode_entities(raw: &str) -> String {
    let mut text = raw.to_string();
    for _ in 0..2 {
        if !text.contains('&') {
            break;
        }
        match htmlescape::decode_html(&text) {
            Ok(decoded) => text = decoded,
            Err(_) => break,
        }
    }
    text
}

/// Cue texts of a timed-text document, one per line
pub fn parse_timed_text(xml: &str) -> Option<String> {
    let lines: Vec<String> = cue_pattern()
        .captures_iter(xml)
        .map(|cap| decode_entities(&cap[1]).replace('\n', " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[async_trait]
impl TranscriptSource for YoutubeTranscripts {
    #[instrument(skip(self))]
    async fn fetch_transcript(&self, video_id: &str) -> Result<Option<String>> {
        let watch_url = format!("{}/watch?v={}", self.base_url, video_id);
        let page = self.get_text(&watch_url).await?;

        let tracks = caption_tracks(&page);
        let Some(track) = pick_track(&tracks) else {
            debug!(tracks = tracks.len(), "No English caption track");
            return Ok(None);
        };

        let xml = self.get_text(&track.base_url).await?;
        Ok(parse_timed_text(&xml))
    }
}

/// Runs `yt-dlp -j --skip-download`
#[derive(Debug, Clone)]
pub struct YtDlpMetadata {
    program: PathBuf,
}

impl Default for YtDlpMetadata {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
        }
    }
}

impl YtDlpMetadata {
    /// Use another executable
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MetadataSource for YtDlpMetadata {
    #[instrument(skip(self))]
    async fn fetch_metadata(&self, video_id: &str) -> Result<VideoMetadata> {
        let url = format!("{DEFAULT_BASE_URL}/watch?v={video_id}");
        let output = Command::new(&self.program)
            .args(["-j", "--skip-download", &url])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VideoError::MetadataFailed(format!("{}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::MetadataFailed(stderr.trim().to_string()).into());
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| VideoError::MetadataFailed(e.to_string()).into())
    }
}

/// Turns a video URL into a document
pub struct VideoScraper {
    transcripts: Box<dyn TranscriptSource>,
    metadata: Box<dyn MetadataSource>,
}

impl Default for VideoScraper {
    fn default() -> Self {
        Self::new(
            Box::new(YoutubeTranscripts::default()),
            Box::new(YtDlpMetadata::default()),
        )
    }
}

impl VideoScraper {
    /// Scraper over explicit collaborators
    pub fn new(transcripts: Box<dyn TranscriptSource>, metadata: Box<dyn MetadataSource>) -> Self {
        Self {
            transcripts,
            metadata,
        }
    }

    /// Scrape `url`. Only an unrecognized URL shape is an error.
    #[instrument(skip(self))]
    pub async fn scrape(&self, url: &str) -> Result<RenderedDocument> {
        let video_id = extract_video_id(url)?;

        let transcript = match self.transcripts.fetch_transcript(&video_id).await {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!(error = %e, "Transcript unavailable");
                None
            }
        };

        let metadata = match self.metadata.fetch_metadata(&video_id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "Metadata unavailable, using video ID");
                VideoMetadata::default()
            }
        };

        Ok(render_video(url, &video_id, metadata, transcript))
    }
}

/// Assemble the video document
pub fn render_video(
    url: &str,
    video_id: &str,
    metadata: VideoMetadata,
    transcript: Option<String>,
) -> RenderedDocument {
    let title = metadata
        .title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| video_id.to_string());
    let description = metadata.description.unwrap_or_default();
    let duration = metadata.duration.map(format_duration).unwrap_or_default();

    let header = Frontmatter {
        url: url.to_string(),
        title: Some(title.clone()),
        source: VIDEO_SOURCE_LABEL.to_string(),
        video_id: Some(video_id.to_string()),
        duration: Some(duration),
        upload_date: Some(metadata.upload_date.unwrap_or_default()),
    };

    let transcript = transcript
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| TRANSCRIPT_PLACEHOLDER.to_string());

    let body = format!(
        "# {title}\n\n**URL**: {url}\n\n## Description\n\n{description}\n\n## Transcript\n\n{transcript}"
    );

    RenderedDocument {
        header,
        body,
        name_hint: title,
        fallback_name: video_id.to_string(),
    }
}
