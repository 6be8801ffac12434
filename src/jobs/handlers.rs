use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use super::{JobPayload, JobQueue};
use crate::config::Config;
use crate::db::{get_content_item, get_share, ContentItem, Database, ShareStatus};
use crate::error::PromotionError;
use crate::feeds::{ingest_batch, ingest_feed, FeedKind, FeedNormalizer, FeedSource};
use crate::generate::CopyGenerator;
use crate::notify::{announce_content, run_sweep, Notifier, SweepSettings};
use crate::platform::Platform;
use crate::profile::{load_voice_profile, UserVoiceProfile};
use crate::publish::{PlatformPublisher, PublishOutcome};
use crate::text::char_len;

/// Everything job handlers need, shared by all jobs a worker runs.
#[derive(Clone)]
pub struct JobContext {
    pub db: Database,
    pub queue: JobQueue,
    pub normalizer: Arc<FeedNormalizer>,
    pub generator: CopyGenerator,
    pub publisher: PlatformPublisher,
    pub notifier: Arc<dyn Notifier>,
    pub sweep: SweepSettings,
    pub token_refresh_window: Duration,
    pub token_skew: Duration,
}

impl JobContext {
    /// Wire a context from configuration and the already-built services.
    #[must_use]
    pub fn new(
        config: &Config,
        queue: JobQueue,
        normalizer: Arc<FeedNormalizer>,
        generator: CopyGenerator,
        publisher: PlatformPublisher,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db: queue.database().clone(),
            queue,
            normalizer,
            generator,
            publisher,
            notifier,
            sweep: SweepSettings::from_config(config),
            token_refresh_window: config.token_refresh_window,
            token_skew: config.token_refresh_skew,
        }
    }
}

/// Runs one job payload to completion.
///
/// Each payload variant has exactly one handler. The returned JSON becomes
/// the job's result.
#[derive(Clone)]
pub struct JobHandlers {
    ctx: JobContext,
}

impl JobHandlers {
    #[must_use]
    pub fn new(ctx: JobContext) -> Self {
        Self { ctx }
    }

    pub async fn dispatch(&self, payload: JobPayload) -> Result<Value, PromotionError> {
        match payload {
            JobPayload::IngestFeed {
                feed_url,
                feed_kind,
            } => self.ingest_feed(feed_url, feed_kind).await,
            JobPayload::IngestBatch { feeds } => self.ingest_batch(&feeds).await,
            JobPayload::GenerateCopy {
                content_id,
                user_id,
                platform,
            } => self.generate_copy(content_id, user_id, platform).await,
            JobPayload::PublishPost {
                content_id,
                user_id,
                platform,
                text,
            } => self.publish_post(content_id, user_id, platform, text).await,
            JobPayload::NotifySweep => self.notify_sweep().await,
            JobPayload::AnnounceContent { content_id } => self.announce(content_id).await,
            JobPayload::RefreshTokens => self.refresh_tokens().await,
        }
    }

    async fn ingest_feed(&self, feed_url: String, kind: FeedKind) -> Result<Value, PromotionError> {
        let source = FeedSource::new(feed_url, kind);
        let report = ingest_feed(&self.ctx.db, &self.ctx.normalizer, &source).await?;
        to_json(&report)
    }

    async fn ingest_batch(&self, feeds: &[FeedSource]) -> Result<Value, PromotionError> {
        let batch = ingest_batch(&self.ctx.db, &self.ctx.normalizer, feeds).await;
        info!(
            feeds = feeds.len(),
            created = batch.created(),
            failures = batch.failures.len(),
            "Feed batch ingested"
        );
        to_json(&batch)
    }

    async fn generate_copy(
        &self,
        content_id: i64,
        user_id: i64,
        platform: Platform,
    ) -> Result<Value, PromotionError> {
        let content = self.content(content_id).await?;
        let profile = self.profile(user_id).await?;
        let copy = self.ctx.generator.generate(&content, &profile, platform).await?;

        Ok(json!({
            "content_id": content_id,
            "user_id": user_id,
            "platform": platform,
            "text": copy.text,
            "length": char_len(&copy.text),
            "source": copy.source,
            "attempts": copy.attempts,
        }))
    }

    async fn publish_post(
        &self,
        content_id: i64,
        user_id: i64,
        platform: Platform,
        text: Option<String>,
    ) -> Result<Value, PromotionError> {
        let content = self.content(content_id).await?;
        let profile = self.profile(user_id).await?;

        // Skip generation when nothing would be posted anyway
        if let Some(share) =
            get_share(self.ctx.db.pool(), user_id, content_id, platform, ShareStatus::Success).await?
        {
            return Ok(outcome_json(&PublishOutcome::AlreadyShared(share)));
        }
        if !profile.authorization(platform).is_active() {
            return Err(PromotionError::AuthorizationRequired { platform });
        }

        let text = match text.filter(|t| !t.trim().is_empty()) {
            Some(text) => {
                if char_len(&text) > platform.max_length() {
                    return Err(PromotionError::PublishRejected {
                        platform,
                        message: format!(
                            "post is longer than {} characters",
                            platform.max_length()
                        ),
                    });
                }
                text
            }
            None => {
                self.ctx
                    .generator
                    .generate(&content, &profile, platform)
                    .await?
                    .text
            }
        };

        let outcome = self
            .ctx
            .publisher
            .publish(user_id, platform, &text, content_id)
            .await?;
        Ok(outcome_json(&outcome))
    }

    async fn notify_sweep(&self) -> Result<Value, PromotionError> {
        let report = run_sweep(
            &self.ctx.db,
            &self.ctx.queue,
            self.ctx.notifier.as_ref(),
            &self.ctx.sweep,
        )
        .await?;
        to_json(&report)
    }

    async fn announce(&self, content_id: i64) -> Result<Value, PromotionError> {
        let content = self.content(content_id).await?;
        let report = announce_content(
            self.ctx.notifier.as_ref(),
            &content,
            &self.ctx.sweep.base_url,
        )
        .await?;
        to_json(&report)
    }

    async fn refresh_tokens(&self) -> Result<Value, PromotionError> {
        let report = self
            .ctx
            .publisher
            .refresh_expiring(self.ctx.token_refresh_window)
            .await?;
        to_json(&report)
    }

    async fn content(&self, content_id: i64) -> Result<ContentItem, PromotionError> {
        get_content_item(self.ctx.db.pool(), content_id)
            .await?
            .ok_or_else(|| PromotionError::NotFound(format!("content item {content_id}")))
    }

    async fn profile(&self, user_id: i64) -> Result<UserVoiceProfile, PromotionError> {
        let skew = chrono::Duration::from_std(self.ctx.token_skew)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let profile = load_voice_profile(self.ctx.db.pool(), user_id, Utc::now(), skew).await?;
        profile.ok_or_else(|| PromotionError::NotFound(format!("user {user_id}")))
    }
}

fn outcome_json(outcome: &PublishOutcome) -> Value {
    let share = outcome.share();
    let status = match outcome {
        PublishOutcome::Posted(_) => "posted",
        PublishOutcome::AlreadyShared(_) => "already_shared",
    };
    info!(
        user_id = share.user_id,
        content_id = share.content_id,
        platform = %share.platform,
        status,
        "Publish job finished"
    );
    json!({
        "status": status,
        "share_id": share.id,
        "platform": share.platform,
        "post_url": share.post_url,
        "text": share.post_content,
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, PromotionError> {
    serde_json::to_value(value).map_err(|e| PromotionError::Internal(e.into()))
}
