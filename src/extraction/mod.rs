//! Content extraction module
//!
//! This module turns rendered page HTML into readable Markdown, keeping
//! links and images and dropping navigation and other boilerplate.

pub mod content;

pub use content::{ContentExtractor, ExtractedContent};
