//! Main content extraction
//!
//! This module finds the readable part of a page and converts it to
//! Markdown. Selection mirrors what readers expect: an article or main
//! element when one carries real text, otherwise the densest paragraph
//! container, otherwise the whole body.

use std::sync::OnceLock;

use htmd::HtmlToMarkdown;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Minimum text length for a candidate to count as main content
const MIN_MAIN_TEXT_CHARS: usize = 200;

/// Candidate main-content selectors, most specific first
const MAIN_SELECTORS: [&str; 12] = [
    "article",
    "main",
    "[role=\"main\"]",
    "[role=\"article\"]",
    ".article",
    ".post",
    ".content",
    ".entry-content",
    ".post-content",
    "#content",
    "#main-content",
    ".main-content",
];

/// Elements dropped before conversion
const BOILERPLATE_TAGS: [&str; 11] = [
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "iframe", "svg",
    "template",
];

/// Extracted content from a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// Content as markdown
    pub markdown: String,
    /// Word count of the markdown
    pub word_count: usize,
    /// Whether content came from an article/main element
    pub from_main: bool,
}

/// Content extraction functionality
pub struct ContentExtractor;

impl ContentExtractor {
    /// Extract readable Markdown from a full HTML document.
    ///
    /// Returns `None` when nothing readable is left.
    pub fn extract(html: &str) -> Option<String> {
        Self::extract_content(html).map(|c| c.markdown)
    }

    /// Extract readable content with details about how it was found
    #[instrument(skip(html), fields(html_len = html.len()))]
    pub fn extract_content(html: &str) -> Option<ExtractedContent> {
        let document = Html::parse_document(html);
        let (fragment, from_main) = Self::find_main_content(&document)?;
        let markdown = Self::html_to_markdown(&fragment)?;

        let word_count = markdown.split_whitespace().count();
        debug!(word_count, from_main, "Extracted content");

        Some(ExtractedContent {
            markdown,
            word_count,
            from_main,
        })
    }

    /// Convert the whole body, skipping main-content detection
    pub fn extract_full(html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let body = Self::body_html(&document)?;
        Self::html_to_markdown(&body)
    }

    /// Wrap an element's inner markup in a minimal document so extraction
    /// treats it as the article.
    pub fn wrap_fragment(inner_html: &str) -> String {
        format!("<html><body><article>{inner_html}</article></body></html>")
    }

    /// Find the main content element using various strategies
    fn find_main_content(document: &Html) -> Option<(String, bool)> {
        // Strategy 1: well-known article/main containers
        for raw in MAIN_SELECTORS {
            let Ok(selector) = Selector::parse(raw) else {
                continue;
            };
            if let Some(el) = document
                .select(&selector)
                .find(|el| text_len(el) > MIN_MAIN_TEXT_CHARS)
            {
                return Some((el.inner_html(), true));
            }
        }

        // Strategy 2: the container with the most paragraph text
        if let Some(el) = Self::densest_container(document) {
            return Some((el.inner_html(), false));
        }

        // Fallback: the body
        Self::body_html(document).map(|html| (html, false))
    }

    fn densest_container(document: &Html) -> Option<ElementRef<'_>> {
        let containers = Selector::parse("div, section, td").ok()?;

        document
            .select(&containers)
            .map(|el| {
                let score: usize = el
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|child| child.value().name() == "p")
                    .map(|p| text_len(&p))
                    .sum();
                (el, score)
            })
            .filter(|(_, score)| *score > MIN_MAIN_TEXT_CHARS)
            .max_by_key(|(_, score)| *score)
            .map(|(el, _)| el)
    }

    fn body_html(document: &Html) -> Option<String> {
        let body = Selector::parse("body").ok()?;
        document.select(&body).next().map(|el| el.inner_html())
    }

    /// Convert HTML to markdown, keeping links and images
    fn html_to_markdown(html: &str) -> Option<String> {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(BOILERPLATE_TAGS.to_vec())
            .build();

        let markdown = match converter.convert(html) {
            Ok(md) => md,
            Err(e) => {
                warn!("Markdown conversion failed: {}", e);
                return None;
            }
        };

        let cleaned = blank_runs().replace_all(&markdown, "\n\n");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned.to_string())
        }
    }
}

fn text_len(el: &ElementRef<'_>) -> usize {
    el.text().map(|t| t.trim().chars().count()).sum()
}

fn blank_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*(\n[ \t]*){2,}").expect("static regex"))
}
