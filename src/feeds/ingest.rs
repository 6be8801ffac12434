use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ContentCandidate, FeedKind, FeedNormalizer, FeedSource};
use crate::db::{db_timestamp, Database, NewContentItem};
use crate::dedup;
use crate::error::PromotionError;

/// What happened when one feed was ingested.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub feed_url: String,
    pub kind: Option<FeedKind>,
    /// Entries the feed contained
    pub seen: usize,
    /// New content items stored
    pub created: usize,
    /// Entries already stored or without a usable link
    pub skipped: usize,
    /// Entries that could not be stored
    pub errors: usize,
    pub content_ids: Vec<i64>,
}

/// A feed in a batch that could not be read.
#[derive(Debug, Clone, Serialize)]
pub struct FeedFailure {
    pub feed_url: String,
    pub message: String,
}

/// Outcome of ingesting several feeds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub reports: Vec<IngestReport>,
    pub failures: Vec<FeedFailure>,
}

impl BatchReport {
    #[must_use]
    pub fn created(&self) -> usize {
        self.reports.iter().map(|r| r.created).sum()
    }
}

/// Fetch one feed and store every entry not seen before.
///
/// Only a feed-level problem is an error; a bad entry is logged and counted.
pub async fn ingest_feed(
    db: &Database,
    normalizer: &FeedNormalizer,
    source: &FeedSource,
) -> Result<IngestReport, PromotionError> {
    let feed = normalizer.fetch(source).await?;
    let kind = feed.kind();

    let mut report = IngestReport {
        feed_url: source.url.clone(),
        kind: Some(kind),
        seen: feed.entry_count(),
        ..IngestReport::default()
    };

    for candidate in feed.candidates() {
        let item = new_content_item(&candidate, kind);
        match dedup::record(db.pool(), &item).await {
            Ok(outcome) if outcome.created => {
                report.created += 1;
                report.content_ids.push(outcome.content_id);
            }
            Ok(_) => {
                debug!(url = %candidate.source_url, "Content already ingested");
            }
            Err(e) => {
                warn!(url = %candidate.source_url, "Failed to store feed entry: {e:#}");
                report.errors += 1;
            }
        }
    }
    report.skipped = report.seen - report.created - report.errors;

    info!(
        feed_url = %source.url,
        seen = report.seen,
        created = report.created,
        skipped = report.skipped,
        errors = report.errors,
        "Feed ingested"
    );
    Ok(report)
}

/// Ingest several feeds. One unavailable feed never stops the others.
pub async fn ingest_batch(
    db: &Database,
    normalizer: &FeedNormalizer,
    sources: &[FeedSource],
) -> BatchReport {
    let mut batch = BatchReport::default();
    let mut seen_urls = HashSet::new();

    for source in sources {
        if !seen_urls.insert(source.url.as_str()) {
            debug!(feed_url = %source.url, "Skipping duplicate feed in batch");
            continue;
        }

        match ingest_feed(db, normalizer, source).await {
            Ok(report) => batch.reports.push(report),
            Err(e) => {
                warn!(feed_url = %source.url, "Feed ingestion failed: {e}");
                batch.failures.push(FeedFailure {
                    feed_url: source.url.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    batch
}

fn new_content_item(candidate: &ContentCandidate, kind: FeedKind) -> NewContentItem {
    let mut item = NewContentItem::new(&candidate.source_url, &candidate.title, kind.content_kind());
    item.excerpt = candidate.excerpt.clone();
    item.image_url = candidate.image_url.clone();
    item.published_at = candidate.published_at.map(db_timestamp);
    item
}
