//! Canonical-identity checks for content items.
//!
//! The store's UNIQUE constraint on the URL hash is the only arbiter: two
//! concurrent [`record`] calls for the same URL produce exactly one row and
//! exactly one `created == true`.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::canonical::{canonical_url, url_hash};
use crate::db::{
    content_hash_exists, get_content_by_hash, insert_content_if_absent, NewContentItem,
};

/// Result of recording a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    /// Whether this call inserted the row
    pub created: bool,
    /// ID of the stored item, whether new or pre-existing
    pub content_id: i64,
}

/// Whether content with this URL (after canonicalization) is already stored.
pub async fn exists(pool: &SqlitePool, url: &str) -> Result<bool> {
    content_hash_exists(pool, &url_hash(&canonical_url(url))).await
}

/// Store `item` unless its canonical URL is already present.
pub async fn record(pool: &SqlitePool, item: &NewContentItem) -> Result<RecordOutcome> {
    if let Some(content_id) = insert_content_if_absent(pool, item).await? {
        debug!(content_id, url = %item.canonical_url, "Recorded new content item");
        return Ok(RecordOutcome {
            created: true,
            content_id,
        });
    }

    let existing = get_content_by_hash(pool, &item.url_hash)
        .await?
        .ok_or_else(|| anyhow::anyhow!("content row vanished after conflict: {}", item.url))?;
    Ok(RecordOutcome {
        created: false,
        content_id: existing.id,
    })
}
