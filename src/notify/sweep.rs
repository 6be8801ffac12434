//! The periodic sweep that turns recent content into notifications or posts.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Delivery, Notification, NotificationItem, Notifier, Recipient};
use crate::config::Config;
use crate::db::{
    any_share_exists, db_timestamp, get_share, insert_share_if_absent, list_content_created_since,
    list_platform_tokens_for_user, list_users, set_user_slack_id, ContentItem, Database, NewShare,
    ShareStatus, User,
};
use crate::jobs::{JobId, JobPayload, JobQueue};
use crate::platform::Platform;
use crate::profile::UserVoiceProfile;

/// Inputs of a sweep that come from configuration.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub lookback: Duration,
    /// Platform whose share records decide what a digest includes
    pub notify_platform: Platform,
    pub base_url: String,
    pub token_skew: Duration,
}

impl SweepSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            lookback: config.notify_lookback,
            notify_platform: config.notify_platform,
            base_url: config.base_url.clone(),
            token_skew: config.token_refresh_skew,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFailure {
    pub user_id: i64,
    pub message: String,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub content_considered: usize,
    pub users_notified: usize,
    pub items_notified: usize,
    /// Users with something to hear about but no way to reach them
    pub users_skipped: Vec<i64>,
    pub publish_jobs: Vec<JobId>,
    pub failures: Vec<UserFailure>,
}

enum UserOutcome {
    Nothing,
    Notified { items: usize },
    Skipped,
    Queued(Vec<JobId>),
}

/// Notify or auto-publish recent content for every user.
///
/// A failure for one user is recorded in the report and the sweep moves on.
pub async fn run_sweep(
    db: &Database,
    queue: &JobQueue,
    notifier: &dyn Notifier,
    settings: &SweepSettings,
) -> Result<SweepReport> {
    let now = Utc::now();
    let lookback = chrono::Duration::from_std(settings.lookback)?;
    let since = db_timestamp(now - lookback);
    let content = list_content_created_since(db.pool(), &since).await?;

    let mut report = SweepReport {
        content_considered: content.len(),
        ..SweepReport::default()
    };
    if content.is_empty() {
        info!(since = %since, "Notify sweep: no recent content");
        return Ok(report);
    }

    for user in list_users(db.pool()).await? {
        let user_id = user.id;
        match sweep_user(db, queue, notifier, settings, user, &content).await {
            Ok(UserOutcome::Nothing) => {}
            Ok(UserOutcome::Notified { items }) => {
                report.users_notified += 1;
                report.items_notified += items;
            }
            Ok(UserOutcome::Skipped) => report.users_skipped.push(user_id),
            Ok(UserOutcome::Queued(jobs)) => report.publish_jobs.extend(jobs),
            Err(e) => {
                warn!(user_id, "Notify sweep failed for user: {e:#}");
                report.failures.push(UserFailure {
                    user_id,
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        content = report.content_considered,
        users_notified = report.users_notified,
        items_notified = report.items_notified,
        skipped = report.users_skipped.len(),
        publish_jobs = report.publish_jobs.len(),
        failures = report.failures.len(),
        "Notify sweep complete"
    );
    Ok(report)
}

async fn sweep_user(
    db: &Database,
    queue: &JobQueue,
    notifier: &dyn Notifier,
    settings: &SweepSettings,
    user: User,
    content: &[ContentItem],
) -> Result<UserOutcome> {
    let pool = db.pool();
    let tokens = list_platform_tokens_for_user(pool, user.id).await?;
    let skew = chrono::Duration::from_std(settings.token_skew)?;
    let profile = UserVoiceProfile::from_parts(user, &tokens, Utc::now(), skew);

    if profile.is_autonomous() {
        let mut jobs = Vec::new();
        for platform in profile.active_platforms() {
            for item in content {
                if get_share(pool, profile.user_id, item.id, platform, ShareStatus::Success)
                    .await?
                    .is_some()
                {
                    continue;
                }
                let job_id = queue
                    .submit(JobPayload::PublishPost {
                        content_id: item.id,
                        user_id: profile.user_id,
                        platform,
                        text: None,
                    })
                    .await?;
                jobs.push(job_id);
            }
        }
        return Ok(if jobs.is_empty() {
            UserOutcome::Nothing
        } else {
            UserOutcome::Queued(jobs)
        });
    }

    let mut pending = Vec::new();
    for item in content {
        if !any_share_exists(pool, profile.user_id, item.id, settings.notify_platform).await? {
            pending.push(item);
        }
    }
    if pending.is_empty() {
        return Ok(UserOutcome::Nothing);
    }

    let slack_id = match profile.slack_id.clone() {
        Some(id) => Some(id),
        None => resolve_slack_id(db, notifier, profile.user_id, &profile.email).await?,
    };

    let notification = Notification {
        recipient: Recipient {
            user_id: profile.user_id,
            display_name: profile.display_name.clone(),
            email: profile.email.clone(),
            slack_id,
        },
        items: pending
            .iter()
            .map(|item| NotificationItem {
                content_id: item.id,
                title: item.title.clone(),
                url: item.url.clone(),
                excerpt: item.excerpt.clone(),
                promote_url: format!("{}/?promote={}", settings.base_url, item.id),
            })
            .collect(),
    };

    match notifier.notify(&notification).await? {
        Delivery::Sent { .. } => {
            for item in &pending {
                insert_share_if_absent(
                    pool,
                    &NewShare {
                        user_id: profile.user_id,
                        content_id: item.id,
                        platform: settings.notify_platform,
                        status: ShareStatus::Notified,
                        post_content: None,
                        post_url: None,
                    },
                )
                .await?;
            }
            Ok(UserOutcome::Notified {
                items: pending.len(),
            })
        }
        Delivery::Skipped { reason } => {
            info!(user_id = profile.user_id, reason, "Notification not delivered");
            Ok(UserOutcome::Skipped)
        }
    }
}

/// Look up a missing Slack id by email and store it for later sweeps.
async fn resolve_slack_id(
    db: &Database,
    notifier: &dyn Notifier,
    user_id: i64,
    email: &str,
) -> Result<Option<String>> {
    if email.trim().is_empty() {
        return Ok(None);
    }
    let Some(slack_id) = notifier.lookup_slack_id(email).await? else {
        debug!(user_id, "No Slack account for user's email");
        return Ok(None);
    };
    set_user_slack_id(db.pool(), user_id, &slack_id).await?;
    info!(user_id, slack_id = %slack_id, "Stored Slack id");
    Ok(Some(slack_id))
}
