//! Markdown output files
//!
//! Every source produces a [`RenderedDocument`]: a YAML metadata header, a
//! Markdown body and a name hint. Writing picks a sanitized file name and
//! never overwrites an existing file.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Maximum number of title characters used for a file name
pub const MAX_SLUG_CHARS: usize = 50;

const FENCE: &str = "---";

/// Metadata header fields, serialized in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frontmatter {
    /// Source URL
    pub url: String,
    /// Document title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Source label (`web`, `YouTube`, `PDF`)
    pub source: String,
    /// Video identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    /// Formatted video duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Upload date as reported by the platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
}

impl Frontmatter {
    /// Header for a rendered web page
    pub fn web(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: Some(title.into()),
            source: "web".to_string(),
            ..Default::default()
        }
    }

    /// Header for a converted document
    pub fn document(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source: "PDF".to_string(),
            ..Default::default()
        }
    }
}

/// A Markdown file ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// Metadata header
    pub header: Frontmatter,
    /// Markdown body
    pub body: String,
    /// Raw text the file name is derived from
    pub name_hint: String,
    /// File stem used when the hint sanitizes to nothing
    pub fallback_name: String,
}

impl RenderedDocument {
    /// Serialize header and body into file content
    pub fn to_markdown(&self) -> Result<String> {
        render_document(&self.header, &self.body)
    }

    /// File stem for this document
    pub fn file_stem(&self) -> String {
        let slug = sanitize_filename(&self.name_hint);
        if slug.is_empty() {
            sanitize_filename(&self.fallback_name)
        } else {
            slug
        }
    }
}

/// Render a header and body as `---\n<yaml>---\n\n<body>\n`
pub fn render_document(header: &Frontmatter, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(header)?;
    Ok(format!("{FENCE}\n{yaml}{FENCE}\n\n{}\n", body.trim_end()))
}

/// Split file content back into its header and body
pub fn parse_document(text: &str) -> Result<(Frontmatter, String)> {
    let rest = text
        .strip_prefix("---\n")
        .ok_or_else(|| Error::generic("Missing metadata header"))?;

    // The closing fence is the first line consisting of exactly `---`
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches('\n') == FENCE {
            let header: Frontmatter = serde_yaml::from_str(&rest[..offset])?;
            let body = &rest[offset + line.len()..];
            let body = body.strip_prefix('\n').unwrap_or(body);
            return Ok((header, body.trim_end_matches('\n').to_string()));
        }
        offset += line.len();
    }

    Err(Error::generic("Unterminated metadata header"))
}

/// Turn a title into a file-name-safe slug.
///
/// Takes the first 50 characters, maps every non-alphanumeric character to
/// `_`, collapses `_` runs and trims them from both ends. May return an
/// empty string.
pub fn sanitize_filename(title: &str) -> String {
    let mapped: String = title
        .chars()
        .take(MAX_SLUG_CHARS)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();

    mapped
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Create `dir/stem.md`, or `stem_1.md`, `stem_2.md`, … if taken.
///
/// Files are opened with create-new semantics so a concurrently created
/// file of the same name is never truncated.
pub fn write_unique(dir: &Path, stem: &str, content: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let mut counter: u32 = 0;
    loop {
        let name = if counter == 0 {
            format!("{stem}.md")
        } else {
            format!("{stem}_{counter}.md")
        };
        let path = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(content.as_bytes())?;
                debug!(path = %path.display(), "wrote output file");
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write a rendered document into `dir`
pub fn write_document(dir: &Path, doc: &RenderedDocument) -> Result<PathBuf> {
    let content = doc.to_markdown()?;
    write_unique(dir, &doc.file_stem(), &content)
}
