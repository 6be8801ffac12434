use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, MediaObject};
use serde::Serialize;
use tracing::debug;

use super::{FeedKind, FeedSource};
use crate::canonical::is_http_url;
use crate::constants::{MAX_EXCERPT_CHARS, MAX_TITLE_CHARS, USER_AGENT};
use crate::error::PromotionError;
use crate::text::{collapse_whitespace, first_image_src, html_to_text, truncate_chars};

/// One promotable item found in a feed, independent of feed format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentCandidate {
    pub title: String,
    pub source_url: String,
    pub excerpt: Option<String>,
    pub image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Fetches feeds over HTTP.
#[derive(Debug, Clone)]
pub struct FeedNormalizer {
    client: reqwest::Client,
}

impl FeedNormalizer {
    /// Create a normalizer whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch and parse a feed.
    ///
    /// Any network, HTTP status or parse problem is reported as a single
    /// [`PromotionError::FeedUnavailable`].
    pub async fn fetch(&self, source: &FeedSource) -> Result<NormalizedFeed, PromotionError> {
        let unavailable = |reason: String| PromotionError::FeedUnavailable {
            feed_url: source.url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&source.url)
            .header(
                reqwest::header::ACCEPT,
                "application/rss+xml, application/atom+xml, application/feed+json, application/xml;q=0.9, */*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| unavailable(format!("failed to read body: {e}")))?;

        parse_feed(&body, source.kind).map_err(|e| unavailable(format!("unparseable feed: {e}")))
    }
}

/// A parsed feed whose entries are normalized on demand.
#[derive(Debug)]
pub struct NormalizedFeed {
    kind: FeedKind,
    entries: Vec<Entry>,
}

impl NormalizedFeed {
    #[must_use]
    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Number of raw entries, including ones that will be skipped.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Normalized candidates, lazily. Entries without a usable link are skipped.
    pub fn candidates(self) -> impl Iterator<Item = ContentCandidate> {
        let kind = self.kind;
        self.entries
            .into_iter()
            .filter_map(move |entry| normalize_entry(entry, kind))
    }
}

/// Parse raw feed bytes (RSS, Atom or JSON Feed).
///
/// # Errors
///
/// Returns the parser error when the bytes are not a recognizable feed.
pub fn parse_feed(
    bytes: &[u8],
    kind: FeedKind,
) -> Result<NormalizedFeed, feed_rs::parser::ParseFeedError> {
    let feed = feed_rs::parser::parse(bytes)?;
    Ok(NormalizedFeed {
        kind,
        entries: feed.entries,
    })
}

fn normalize_entry(entry: Entry, kind: FeedKind) -> Option<ContentCandidate> {
    let Some(source_url) = entry_url(&entry, kind) else {
        debug!(entry_id = %entry.id, "Skipping feed entry without a usable link");
        return None;
    };

    let title = entry
        .title
        .as_ref()
        .map(|t| html_to_text(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| source_url.clone());

    Some(ContentCandidate {
        title: truncate_chars(&title, MAX_TITLE_CHARS),
        excerpt: entry_excerpt(&entry, kind).map(|e| truncate_chars(&e, MAX_EXCERPT_CHARS)),
        image_url: entry_image(&entry),
        published_at: entry.published.or(entry.updated),
        source_url,
    })
}

fn entry_url(entry: &Entry, kind: FeedKind) -> Option<String> {
    let page_link = entry
        .links
        .iter()
        .filter(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .map(|l| l.href.trim())
        .find(|href| is_http_url(href))
        .or_else(|| {
            entry
                .links
                .iter()
                .map(|l| l.href.trim())
                .find(|href| is_http_url(href) && kind != FeedKind::Podcast)
        });

    if let Some(href) = page_link {
        return Some(href.to_string());
    }

    // Episodes without a web page are identified by their audio file
    if kind == FeedKind::Podcast {
        if let Some(enclosure) = media_urls(&entry.media).find(|u| is_http_url(u)) {
            return Some(enclosure);
        }
    }

    is_http_url(&entry.id).then(|| entry.id.trim().to_string())
}

fn entry_excerpt(entry: &Entry, kind: FeedKind) -> Option<String> {
    let media_description = || {
        entry
            .media
            .iter()
            .filter_map(|m| m.description.as_ref())
            .map(|d| collapse_whitespace(&d.content))
            .find(|d| !d.is_empty())
    };
    let summary = || {
        entry
            .summary
            .as_ref()
            .map(|s| html_to_text(&s.content))
            .filter(|s| !s.is_empty())
    };
    let body = || {
        entry
            .content
            .as_ref()
            .and_then(|c| c.body.as_deref())
            .map(html_to_text)
            .filter(|s| !s.is_empty())
    };

    match kind {
        FeedKind::Video => media_description().or_else(summary).or_else(body),
        FeedKind::Blog | FeedKind::Podcast => summary().or_else(body).or_else(media_description),
    }
}

fn entry_image(entry: &Entry) -> Option<String> {
    let thumbnail = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.trim().to_string())
        .find(|uri| is_http_url(uri));
    if thumbnail.is_some() {
        return thumbnail;
    }

    let image_enclosure = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .filter(|c| {
            c.content_type
                .as_ref()
                .is_some_and(|ct| ct.to_string().starts_with("image/"))
        })
        .filter_map(|c| c.url.as_ref().map(ToString::to_string))
        .next();
    if image_enclosure.is_some() {
        return image_enclosure;
    }

    entry
        .summary
        .as_ref()
        .and_then(|s| first_image_src(&s.content))
        .or_else(|| {
            entry
                .content
                .as_ref()
                .and_then(|c| c.body.as_deref())
                .and_then(first_image_src)
        })
}

fn media_urls(media: &[MediaObject]) -> impl Iterator<Item = String> + '_ {
    media
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(|c| c.url.as_ref().map(ToString::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOG_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <link>https://blog.example.com</link>
    <description>Posts</description>
    <item>
      <title>Hardening &lt;b&gt;SSH&lt;/b&gt; in 2024</title>
      <link>https://blog.example.com/ssh-hardening</link>
      <guid>https://blog.example.com/?p=1</guid>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <description><![CDATA[<p>Five settings you should change today.</p><img src="https://blog.example.com/ssh.png">]]></description>
    </item>
    <item>
      <title>No link here</title>
      <guid isPermaLink="false">post-without-link</guid>
      <description>Orphan entry</description>
    </item>
  </channel>
</rss>"#;

    const PODCAST_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Example Podcast</title>
    <link>https://pod.example.com</link>
    <description>Episodes</description>
    <item>
      <title>Episode 12: Incident Response</title>
      <guid isPermaLink="false">ep-12</guid>
      <description>We talk about on-call.</description>
      <enclosure url="https://cdn.example.com/ep12.mp3" length="1234" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    const VIDEO_ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:media="http://search.yahoo.com/mrss/" xmlns:yt="http://www.youtube.com/xml/schemas/2015">
  <id>yt:channel:abc</id>
  <title>Example Channel</title>
  <updated>2024-02-01T00:00:00+00:00</updated>
  <entry>
    <id>yt:video:xyz</id>
    <title>Threat Modeling Basics</title>
    <link rel="alternate" href="https://www.youtube.com/watch?v=xyz"/>
    <published>2024-02-01T00:00:00+00:00</published>
    <updated>2024-02-02T00:00:00+00:00</updated>
    <media:group>
      <media:title>Threat Modeling Basics</media:title>
      <media:thumbnail url="https://i.ytimg.com/vi/xyz/hqdefault.jpg" width="480" height="360"/>
      <media:description>A walkthrough of STRIDE.</media:description>
    </media:group>
  </entry>
</feed>"#;

    #[test]
    fn test_blog_entry_normalized() {
        let feed = parse_feed(BLOG_RSS.as_bytes(), FeedKind::Blog).unwrap();
        assert_eq!(feed.entry_count(), 2);
        let candidates: Vec<_> = feed.candidates().collect();
        assert_eq!(candidates.len(), 1);

        let post = &candidates[0];
        assert_eq!(post.source_url, "https://blog.example.com/ssh-hardening");
        assert_eq!(post.title, "Hardening SSH in 2024");
        assert_eq!(
            post.excerpt.as_deref(),
            Some("Five settings you should change today.")
        );
        assert_eq!(
            post.image_url.as_deref(),
            Some("https://blog.example.com/ssh.png")
        );
        assert!(post.published_at.is_some());
    }

    #[test]
    fn test_podcast_falls_back_to_enclosure() {
        let feed = parse_feed(PODCAST_RSS.as_bytes(), FeedKind::Podcast).unwrap();
        let candidates: Vec<_> = feed.candidates().collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source_url, "https://cdn.example.com/ep12.mp3");
        assert_eq!(candidates[0].title, "Episode 12: Incident Response");
        assert_eq!(
            candidates[0].excerpt.as_deref(),
            Some("We talk about on-call.")
        );
    }

    #[test]
    fn test_video_uses_media_group() {
        let feed = parse_feed(VIDEO_ATOM.as_bytes(), FeedKind::Video).unwrap();
        let candidates: Vec<_> = feed.candidates().collect();
        assert_eq!(candidates.len(), 1);

        let video = &candidates[0];
        assert_eq!(video.source_url, "https://www.youtube.com/watch?v=xyz");
        assert_eq!(video.excerpt.as_deref(), Some("A walkthrough of STRIDE."));
        assert_eq!(
            video.image_url.as_deref(),
            Some("https://i.ytimg.com/vi/xyz/hqdefault.jpg")
        );
        assert_eq!(
            video.published_at.map(|d| d.to_rfc3339()),
            Some("2024-02-01T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_long_title_truncated() {
        let long_title = "word ".repeat(100);
        let rss = format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>
            <item><title>{long_title}</title><link>https://example.com/long</link></item>
            </channel></rss>"#
        );
        let feed = parse_feed(rss.as_bytes(), FeedKind::Blog).unwrap();
        let candidate = feed.candidates().next().unwrap();
        assert!(candidate.title.chars().count() <= MAX_TITLE_CHARS);
        assert!(candidate.title.ends_with('…'));
    }

    #[test]
    fn test_malformed_feed_is_error() {
        assert!(parse_feed(b"this is not a feed", FeedKind::Blog).is_err());
    }
}
