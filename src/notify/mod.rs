//! Telling users about content they have not shared yet.

mod announce;
mod slack;
mod sweep;

pub use announce::{announce_content, AnnouncementReport};
pub use slack::SlackNotifier;
pub use sweep::{run_sweep, SweepReport, SweepSettings, UserFailure};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Who a digest is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: i64,
    pub display_name: String,
    pub email: String,
    pub slack_id: Option<String>,
}

/// One piece of content in a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationItem {
    pub content_id: i64,
    pub title: String,
    pub url: String,
    pub excerpt: Option<String>,
    /// Link into the app that starts promoting this item
    pub promote_url: String,
}

/// A digest of new content for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: Recipient,
    pub items: Vec<NotificationItem>,
}

/// What happened to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Delivered in this many messages
    Sent { messages: usize },
    /// Not delivered; the items stay eligible for the next sweep
    Skipped { reason: &'static str },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Request(String),
    #[error("notification rejected: {0}")]
    Api(String),
}

/// A channel that can deliver digests.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<Delivery, NotifyError>;

    /// Find the channel id of the account registered under `email`.
    ///
    /// `Ok(None)` means the channel has no such account.
    async fn lookup_slack_id(&self, _email: &str) -> Result<Option<String>, NotifyError> {
        Ok(None)
    }

    /// Ask everyone to promote a single item.
    async fn announce(&self, _item: &NotificationItem) -> Result<Delivery, NotifyError> {
        Ok(Delivery::Skipped {
            reason: "announcements not supported",
        })
    }
}

/// Writes digests to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<Delivery, NotifyError> {
        for item in &notification.items {
            info!(
                user_id = notification.recipient.user_id,
                content_id = item.content_id,
                title = %item.title,
                promote_url = %item.promote_url,
                "Content ready to promote"
            );
        }
        Ok(Delivery::Skipped {
            reason: "no notification channel configured",
        })
    }

    async fn announce(&self, item: &NotificationItem) -> Result<Delivery, NotifyError> {
        info!(
            content_id = item.content_id,
            title = %item.title,
            promote_url = %item.promote_url,
            "Announcement logged only"
        );
        Ok(Delivery::Skipped {
            reason: "no notification channel configured",
        })
    }
}
