use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_url, url_hash};
use crate::platform::Platform;

/// Format a timestamp the way the schema stores them.
#[must_use]
pub fn db_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp.
#[must_use]
pub fn parse_db_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Kind of promotable content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Article,
    Video,
    Podcast,
}

impl ContentKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Video => "video",
            Self::Podcast => "podcast",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "article" | "blog" => Some(Self::Article),
            "video" => Some(Self::Video),
            "podcast" => Some(Self::Podcast),
            _ => None,
        }
    }
}

/// A piece of content discovered from a feed or submitted by hand.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContentItem {
    pub id: i64,
    pub url: String,
    pub canonical_url: String,
    pub url_hash: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub image_url: Option<String>,
    /// Admin-supplied copy that replaces generated text
    pub fixed_copy: Option<String>,
    pub context: Option<String>,
    pub utm_campaign: Option<String>,
    pub kind: String,
    pub published_at: Option<String>,
    pub submitted_by: Option<i64>,
    pub created_at: String,
}

impl ContentItem {
    #[must_use]
    pub fn content_kind(&self) -> ContentKind {
        ContentKind::from_str(&self.kind).unwrap_or(ContentKind::Article)
    }

    #[must_use]
    pub fn published_at_utc(&self) -> Option<DateTime<Utc>> {
        self.published_at.as_deref().and_then(parse_db_timestamp)
    }
}

/// Data for inserting a content item.
#[derive(Debug, Clone)]
pub struct NewContentItem {
    pub url: String,
    pub canonical_url: String,
    pub url_hash: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub image_url: Option<String>,
    pub fixed_copy: Option<String>,
    pub context: Option<String>,
    pub utm_campaign: Option<String>,
    pub kind: ContentKind,
    pub published_at: Option<String>,
    pub submitted_by: Option<i64>,
}

impl NewContentItem {
    /// Start a new item, deriving its canonical identity from `url`.
    #[must_use]
    pub fn new(url: &str, title: &str, kind: ContentKind) -> Self {
        let canonical = canonical_url(url);
        Self {
            url: url.to_string(),
            url_hash: url_hash(&canonical),
            canonical_url: canonical,
            title: title.to_string(),
            excerpt: None,
            image_url: None,
            fixed_copy: None,
            context: None,
            utm_campaign: None,
            kind,
            published_at: None,
            submitted_by: None,
        }
    }
}

/// A user who promotes content.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub bio: Option<String>,
    /// Example posts used as style guidance, one per paragraph
    pub example_posts: Option<String>,
    pub slack_id: Option<String>,
    pub autonomous_mode: bool,
    pub created_at: String,
}

/// Data for inserting a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub bio: Option<String>,
    pub example_posts: Option<String>,
    pub slack_id: Option<String>,
    pub autonomous_mode: bool,
}

/// OAuth credentials for one user on one platform.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlatformToken {
    pub user_id: i64,
    pub platform: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<String>,
    /// Platform-side member id (the LinkedIn person id)
    pub member_id: Option<String>,
    pub revoked_at: Option<String>,
    pub updated_at: String,
}

impl PlatformToken {
    #[must_use]
    pub fn platform_enum(&self) -> Option<Platform> {
        Platform::parse(&self.platform)
    }

    #[must_use]
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        self.expires_at.as_deref().and_then(parse_db_timestamp)
    }
}

/// Data for storing a freshly granted token.
#[derive(Debug, Clone)]
pub struct NewPlatformToken {
    pub user_id: i64,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub member_id: Option<String>,
}

/// Outcome recorded for a (user, content, platform) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareStatus {
    /// The post was published on the platform
    Success,
    /// The user was told about the content
    Notified,
}

impl ShareStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Notified => "notified",
        }
    }
}

/// A completed share or delivered notification.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShareRecord {
    pub id: i64,
    pub user_id: i64,
    pub content_id: i64,
    pub platform: String,
    pub status: String,
    pub post_content: Option<String>,
    pub post_url: Option<String>,
    pub created_at: String,
}

/// Data for inserting a share record.
#[derive(Debug, Clone)]
pub struct NewShare {
    pub user_id: i64,
    pub content_id: i64,
    pub platform: Platform,
    pub status: ShareStatus,
    pub post_content: Option<String>,
    pub post_url: Option<String>,
}

/// A row of the job status registry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: String,
    pub kind: String,
    pub payload: String,
    pub state: String,
    pub result: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub enqueued_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    /// Worker that claimed the job
    pub worker_id: Option<String>,
}
