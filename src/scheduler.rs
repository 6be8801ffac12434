//! Timers that submit ingestion, notification and token refresh jobs.
//!
//! Ticks only submit jobs; all work happens in the job worker, which may run
//! in another process.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::feeds::FeedSource;
use crate::jobs::{JobId, JobPayload, JobQueue};

/// Parse a cron expression, accepting the 5-field form without seconds.
///
/// # Errors
///
/// Returns the parser's error for an invalid expression.
pub fn parse_schedule(expr: &str) -> Result<cron::Schedule, cron::error::Error> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    cron::Schedule::from_str(&normalized)
}

/// First occurrence of `schedule` strictly after `after`.
#[must_use]
pub fn next_run_after(schedule: &cron::Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Submit one `ingest-feed` job per configured feed.
pub async fn submit_ingestion_tick(queue: &JobQueue, feeds: &[FeedSource]) -> Result<Vec<JobId>> {
    let mut ids = Vec::with_capacity(feeds.len());
    for feed in feeds {
        let id = queue
            .submit(JobPayload::IngestFeed {
                feed_url: feed.url.clone(),
                feed_kind: feed.kind,
            })
            .await?;
        ids.push(id);
    }
    Ok(ids)
}

/// Submit a single `ingest-batch` job covering every configured feed.
pub async fn submit_ingestion_batch(queue: &JobQueue, feeds: &[FeedSource]) -> Result<JobId> {
    queue
        .submit(JobPayload::IngestBatch {
            feeds: feeds.to_vec(),
        })
        .await
}

pub async fn submit_notify_sweep(queue: &JobQueue) -> Result<JobId> {
    queue.submit(JobPayload::NotifySweep).await
}

pub async fn submit_token_refresh(queue: &JobQueue) -> Result<JobId> {
    queue.submit(JobPayload::RefreshTokens).await
}

/// The three promotion timers.
pub struct Scheduler {
    queue: JobQueue,
    feeds: Vec<FeedSource>,
    ingest_interval: Duration,
    notify: cron::Schedule,
    token_refresh: cron::Schedule,
}

impl Scheduler {
    /// # Errors
    ///
    /// Returns an error if either cron schedule is invalid.
    pub fn new(config: &Config, queue: JobQueue) -> Result<Self> {
        let notify = parse_schedule(&config.notify_schedule)
            .with_context(|| format!("Invalid NOTIFY_SCHEDULE: {}", config.notify_schedule))?;
        let token_refresh = parse_schedule(&config.token_refresh_schedule).with_context(|| {
            format!(
                "Invalid TOKEN_REFRESH_SCHEDULE: {}",
                config.token_refresh_schedule
            )
        })?;

        Ok(Self {
            queue,
            feeds: config.content_feeds.clone(),
            ingest_interval: config.ingest_interval,
            notify,
            token_refresh,
        })
    }

    /// Run until `shutdown` is cancelled. The first ingestion tick fires immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ingest = tokio::time::interval(self.ingest_interval.max(Duration::from_secs(1)));
        ingest.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let started = Utc::now();
        let mut notify = CronTimer::new(self.notify.clone(), started);
        let mut token_refresh = CronTimer::new(self.token_refresh.clone(), started);

        info!(
            feeds = self.feeds.len(),
            ingest_interval_secs = self.ingest_interval.as_secs(),
            next_notify = ?notify.next_due(),
            next_token_refresh = ?token_refresh.next_due(),
            "Scheduler started"
        );

        loop {
            let notify_due = notify.next_due();
            let refresh_due = token_refresh.next_due();

            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ingest.tick() => {
                    match submit_ingestion_tick(&self.queue, &self.feeds).await {
                        Ok(ids) => debug!(jobs = ids.len(), "Ingestion tick"),
                        Err(e) => error!("Failed to submit ingestion jobs: {e:#}"),
                    }
                }
                () = sleep_until_due(notify_due) => {
                    notify.mark_fired(notify_due, Utc::now());
                    match submit_notify_sweep(&self.queue).await {
                        Ok(id) => info!(job_id = %id, "Notify sweep submitted"),
                        Err(e) => error!("Failed to submit notify sweep: {e:#}"),
                    }
                }
                () = sleep_until_due(refresh_due) => {
                    token_refresh.mark_fired(refresh_due, Utc::now());
                    match submit_token_refresh(&self.queue).await {
                        Ok(id) => info!(job_id = %id, "Token refresh submitted"),
                        Err(e) => error!("Failed to submit token refresh: {e:#}"),
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }
}

/// A cron schedule and the last occurrence it fired for.
///
/// The next occurrence is always computed from the last one fired, so an
/// occurrence fires at most once however the wall clock moves.
#[derive(Debug)]
struct CronTimer {
    schedule: cron::Schedule,
    last_fired: DateTime<Utc>,
}

impl CronTimer {
    fn new(schedule: cron::Schedule, start: DateTime<Utc>) -> Self {
        Self {
            schedule,
            last_fired: start,
        }
    }

    fn next_due(&self) -> Option<DateTime<Utc>> {
        next_run_after(&self.schedule, self.last_fired)
    }

    /// Record that `due` fired at `now`. Occurrences missed before `now` are skipped.
    fn mark_fired(&mut self, due: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        if let Some(due) = due {
            self.last_fired = due.max(now);
        }
    }
}

/// Sleep until `due`, or forever if there is no next occurrence.
async fn sleep_until_due(due: Option<DateTime<Utc>>) {
    let Some(due) = due else {
        return std::future::pending().await;
    };
    // A due time already in the past fires at once
    let delay = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(delay).await;
}
