//! Feed fetching, normalization and ingestion.

mod ingest;
mod normalizer;

pub use ingest::{ingest_batch, ingest_feed, BatchReport, FeedFailure, IngestReport};
pub use normalizer::{parse_feed, ContentCandidate, FeedNormalizer, NormalizedFeed};

use serde::{Deserialize, Serialize};

use crate::canonical::is_http_url;
use crate::db::ContentKind;

/// What a feed publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Blog,
    Podcast,
    Video,
}

impl FeedKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blog => "blog",
            Self::Podcast => "podcast",
            Self::Video => "video",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "blog" | "article" => Some(Self::Blog),
            "podcast" => Some(Self::Podcast),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// Kind of content items produced from this feed.
    #[must_use]
    pub fn content_kind(&self) -> ContentKind {
        match self {
            Self::Blog => ContentKind::Article,
            Self::Podcast => ContentKind::Podcast,
            Self::Video => ContentKind::Video,
        }
    }
}

/// A configured feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    pub kind: FeedKind,
}

impl FeedSource {
    #[must_use]
    pub fn new(url: impl Into<String>, kind: FeedKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    /// Parse `kind=url` or a bare URL (treated as a blog feed).
    ///
    /// # Errors
    ///
    /// Returns a description of the problem for unknown kinds or non-HTTP URLs.
    pub fn parse(entry: &str) -> Result<Self, String> {
        let entry = entry.trim();
        let (kind, url) = match entry.split_once('=') {
            Some((kind, url)) if !kind.contains('/') && !kind.contains(':') => {
                let kind = FeedKind::parse(kind)
                    .ok_or_else(|| format!("unknown feed kind '{kind}' in '{entry}'"))?;
                (kind, url.trim())
            }
            _ => (FeedKind::Blog, entry),
        };

        if !is_http_url(url) {
            return Err(format!("feed URL must be http(s): '{url}'"));
        }
        Ok(Self::new(url, kind))
    }
}
