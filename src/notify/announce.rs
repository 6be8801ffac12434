//! One-off announcements asking everyone to promote a single item.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use super::{Delivery, NotificationItem, Notifier};
use crate::db::ContentItem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnouncementReport {
    pub content_id: i64,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<&'static str>,
}

/// Send one announcement for `content` through `notifier`.
///
/// Announcements write no share records; every user stays eligible for the
/// item in later sweeps.
pub async fn announce_content(
    notifier: &dyn Notifier,
    content: &ContentItem,
    base_url: &str,
) -> Result<AnnouncementReport> {
    let item = NotificationItem {
        content_id: content.id,
        title: content.title.clone(),
        url: content.url.clone(),
        excerpt: content.excerpt.clone(),
        promote_url: format!("{base_url}/?promote={}", content.id),
    };

    let delivery = notifier
        .announce(&item)
        .await
        .with_context(|| format!("Failed to announce content {}", content.id))?;
    let report = match delivery {
        Delivery::Sent { .. } => AnnouncementReport {
            content_id: content.id,
            delivered: true,
            skipped_reason: None,
        },
        Delivery::Skipped { reason } => AnnouncementReport {
            content_id: content.id,
            delivered: false,
            skipped_reason: Some(reason),
        },
    };
    info!(
        content_id = content.id,
        delivered = report.delivered,
        "Announcement finished"
    );
    Ok(report)
}
