//! Background jobs: submission, execution and status.
//!
//! Callers submit a [`JobPayload`] through [`JobQueue::submit`] and get a
//! [`JobId`] back immediately. A [`JobWorker`] (possibly in another process)
//! claims the job from the `jobs` table, runs its handler and records the
//! terminal state. Callers poll [`JobQueue::status`] until the job is done.

mod handlers;
pub mod poll;
mod queue;
mod worker;

pub use handlers::{JobContext, JobHandlers};
pub use queue::JobQueue;
pub use worker::JobWorker;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feeds::{FeedKind, FeedSource};
use crate::platform::Platform;

pub type JobId = Uuid;

/// The fixed set of job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    IngestFeed,
    IngestBatch,
    GenerateCopy,
    PublishPost,
    NotifySweep,
    AnnounceContent,
    RefreshTokens,
}

impl JobKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IngestFeed => "ingest-feed",
            Self::IngestBatch => "ingest-batch",
            Self::GenerateCopy => "generate-copy",
            Self::PublishPost => "publish-post",
            Self::NotifySweep => "notify-sweep",
            Self::AnnounceContent => "announce-content",
            Self::RefreshTokens => "refresh-tokens",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ingest-feed" => Some(Self::IngestFeed),
            "ingest-batch" => Some(Self::IngestBatch),
            "generate-copy" => Some(Self::GenerateCopy),
            "publish-post" => Some(Self::PublishPost),
            "notify-sweep" => Some(Self::NotifySweep),
            "announce-content" => Some(Self::AnnounceContent),
            "refresh-tokens" => Some(Self::RefreshTokens),
            _ => None,
        }
    }
}

/// Job descriptor: the kind plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobPayload {
    IngestFeed {
        feed_url: String,
        feed_kind: FeedKind,
    },
    /// Several feeds in one job, reported together
    IngestBatch {
        feeds: Vec<FeedSource>,
    },
    GenerateCopy {
        content_id: i64,
        user_id: i64,
        platform: Platform,
    },
    PublishPost {
        content_id: i64,
        user_id: i64,
        platform: Platform,
        /// Post text; generated inside the job when absent
        text: Option<String>,
    },
    NotifySweep,
    /// Ask everyone to promote one item
    AnnounceContent {
        content_id: i64,
    },
    RefreshTokens,
}

impl JobPayload {
    #[must_use]
    pub fn kind(&self) -> JobKind {
        match self {
            Self::IngestFeed { .. } => JobKind::IngestFeed,
            Self::IngestBatch { .. } => JobKind::IngestBatch,
            Self::GenerateCopy { .. } => JobKind::GenerateCopy,
            Self::PublishPost { .. } => JobKind::PublishPost,
            Self::NotifySweep => JobKind::NotifySweep,
            Self::AnnounceContent { .. } => JobKind::AnnounceContent,
            Self::RefreshTokens => JobKind::RefreshTokens,
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Success,
    Failure,
}

impl JobState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// User-safe description of why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

/// What a caller sees when polling a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub enqueued_at: String,
    pub finished_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serialization_is_tagged() {
        let payload = JobPayload::PublishPost {
            content_id: 7,
            user_id: 3,
            platform: Platform::Linkedin,
            text: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "publish-post");
        assert_eq!(json["platform"], "linkedin");

        let sweep = serde_json::to_string(&JobPayload::NotifySweep).unwrap();
        assert_eq!(sweep, r#"{"kind":"notify-sweep"}"#);
        let back: JobPayload = serde_json::from_str(&sweep).unwrap();
        assert_eq!(back, JobPayload::NotifySweep);
    }

    #[test]
    fn test_kind_names_match_payload_tags() {
        let payload = JobPayload::IngestFeed {
            feed_url: "https://example.com/feed".to_string(),
            feed_kind: FeedKind::Blog,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], payload.kind().as_str());
        assert_eq!(JobKind::from_str("refresh-tokens"), Some(JobKind::RefreshTokens));

        let announce = JobPayload::AnnounceContent { content_id: 4 };
        let json = serde_json::to_value(&announce).unwrap();
        assert_eq!(json["kind"], announce.kind().as_str());
        assert_eq!(JobKind::from_str("announce-content"), Some(JobKind::AnnounceContent));
    }

    #[test]
    fn test_state_terminality() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Success.is_terminal());
        assert!(JobState::Failure.is_terminal());
        assert_eq!(serde_json::to_string(&JobState::Success).unwrap(), "\"SUCCESS\"");
    }
}
