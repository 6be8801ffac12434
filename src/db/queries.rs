use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{
    db_timestamp, ContentItem, JobRow, NewContentItem, NewPlatformToken, NewShare, NewUser,
    PlatformToken, ShareRecord, ShareStatus, User,
};
use crate::platform::Platform;

// ========== Content ==========

/// Get a content item by ID.
pub async fn get_content_item(pool: &SqlitePool, id: i64) -> Result<Option<ContentItem>> {
    sqlx::query_as("SELECT * FROM content_items WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch content item")
}

/// Get a content item by the hash of its canonical URL.
pub async fn get_content_by_hash(pool: &SqlitePool, url_hash: &str) -> Result<Option<ContentItem>> {
    sqlx::query_as("SELECT * FROM content_items WHERE url_hash = ?")
        .bind(url_hash)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch content item by hash")
}

/// Check whether a content item with this canonical URL hash exists.
pub async fn content_hash_exists(pool: &SqlitePool, url_hash: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM content_items WHERE url_hash = ?")
        .bind(url_hash)
        .fetch_optional(pool)
        .await
        .context("Failed to check content existence")?;
    Ok(row.is_some())
}

/// Insert a content item unless one with the same URL hash exists.
///
/// Returns the new row ID, or `None` when the item was already present.
pub async fn insert_content_if_absent(
    pool: &SqlitePool,
    item: &NewContentItem,
) -> Result<Option<i64>> {
    let result = sqlx::query(
        r"
        INSERT INTO content_items (
            url, canonical_url, url_hash, title, excerpt, image_url, fixed_copy,
            context, utm_campaign, kind, published_at, submitted_by
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(url_hash) DO NOTHING
        ",
    )
    .bind(&item.url)
    .bind(&item.canonical_url)
    .bind(&item.url_hash)
    .bind(&item.title)
    .bind(&item.excerpt)
    .bind(&item.image_url)
    .bind(&item.fixed_copy)
    .bind(&item.context)
    .bind(&item.utm_campaign)
    .bind(item.kind.as_str())
    .bind(&item.published_at)
    .bind(item.submitted_by)
    .execute(pool)
    .await
    .context("Failed to insert content item")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(result.last_insert_rowid()))
}

/// Content created at or after `since`, oldest first.
pub async fn list_content_created_since(
    pool: &SqlitePool,
    since: &str,
) -> Result<Vec<ContentItem>> {
    sqlx::query_as("SELECT * FROM content_items WHERE created_at >= ? ORDER BY created_at, id")
        .bind(since)
        .fetch_all(pool)
        .await
        .context("Failed to list recent content")
}

/// Delete a content item. Its share records go with it.
pub async fn delete_content_item(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM content_items WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete content item")?;
    Ok(result.rows_affected() > 0)
}

// ========== Users ==========

/// Insert a new user, returning its ID.
pub async fn insert_user(pool: &SqlitePool, user: &NewUser) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO users (email, name, bio, example_posts, slack_id, autonomous_mode)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.bio)
    .bind(&user.example_posts)
    .bind(&user.slack_id)
    .bind(user.autonomous_mode)
    .execute(pool)
    .await
    .context("Failed to insert user")?;

    Ok(result.last_insert_rowid())
}

/// Get a user by ID.
pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user")
}

/// All users, in ID order.
pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>> {
    sqlx::query_as("SELECT * FROM users ORDER BY id")
        .fetch_all(pool)
        .await
        .context("Failed to list users")
}

/// Remember a user's Slack id once it has been looked up.
pub async fn set_user_slack_id(pool: &SqlitePool, user_id: i64, slack_id: &str) -> Result<()> {
    sqlx::query("UPDATE users SET slack_id = ? WHERE id = ?")
        .bind(slack_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to store Slack id")?;
    Ok(())
}

// ========== Platform Tokens ==========

/// Get the stored token for a user on a platform.
pub async fn get_platform_token(
    pool: &SqlitePool,
    user_id: i64,
    platform: Platform,
) -> Result<Option<PlatformToken>> {
    sqlx::query_as("SELECT * FROM platform_tokens WHERE user_id = ? AND platform = ?")
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(pool)
        .await
        .context("Failed to fetch platform token")
}

/// All tokens stored for a user.
pub async fn list_platform_tokens_for_user(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<PlatformToken>> {
    sqlx::query_as("SELECT * FROM platform_tokens WHERE user_id = ? ORDER BY platform")
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list platform tokens")
}

/// Store a granted token, replacing whatever was there and clearing revocation.
///
/// A grant without a refresh token keeps the previously stored refresh token.
pub async fn upsert_platform_token(pool: &SqlitePool, token: &NewPlatformToken) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO platform_tokens (
            user_id, platform, access_token, refresh_token, expires_at, member_id,
            revoked_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, NULL, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ON CONFLICT(user_id, platform) DO UPDATE SET
            access_token = excluded.access_token,
            refresh_token = COALESCE(excluded.refresh_token, platform_tokens.refresh_token),
            expires_at = excluded.expires_at,
            member_id = COALESCE(excluded.member_id, platform_tokens.member_id),
            revoked_at = NULL,
            updated_at = excluded.updated_at
        ",
    )
    .bind(token.user_id)
    .bind(token.platform.as_str())
    .bind(&token.access_token)
    .bind(&token.refresh_token)
    .bind(token.expires_at.map(db_timestamp))
    .bind(&token.member_id)
    .execute(pool)
    .await
    .context("Failed to store platform token")?;
    Ok(())
}

/// Drop a user's credentials for a platform and mark them revoked.
pub async fn revoke_platform_token(pool: &SqlitePool, user_id: i64, platform: Platform) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO platform_tokens (user_id, platform, revoked_at, updated_at)
        VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'), strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ON CONFLICT(user_id, platform) DO UPDATE SET
            access_token = NULL,
            refresh_token = NULL,
            expires_at = NULL,
            revoked_at = excluded.revoked_at,
            updated_at = excluded.updated_at
        ",
    )
    .bind(user_id)
    .bind(platform.as_str())
    .execute(pool)
    .await
    .context("Failed to revoke platform token")?;
    Ok(())
}

/// Live, refreshable tokens on `platform` that expire before `cutoff`.
pub async fn list_tokens_expiring_before(
    pool: &SqlitePool,
    platform: Platform,
    cutoff: &str,
) -> Result<Vec<PlatformToken>> {
    sqlx::query_as(
        r"
        SELECT * FROM platform_tokens
        WHERE platform = ?
          AND revoked_at IS NULL
          AND refresh_token IS NOT NULL
          AND expires_at IS NOT NULL
          AND expires_at < ?
        ORDER BY expires_at
        ",
    )
    .bind(platform.as_str())
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .context("Failed to list expiring tokens")
}

// ========== Shares ==========

/// Record a share unless the same (user, content, platform, status) exists.
///
/// Returns the new row ID, or `None` if a matching record was already there.
pub async fn insert_share_if_absent(pool: &SqlitePool, share: &NewShare) -> Result<Option<i64>> {
    let result = sqlx::query(
        r"
        INSERT INTO shares (user_id, content_id, platform, status, post_content, post_url)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, content_id, platform, status) DO NOTHING
        ",
    )
    .bind(share.user_id)
    .bind(share.content_id)
    .bind(share.platform.as_str())
    .bind(share.status.as_str())
    .bind(&share.post_content)
    .bind(&share.post_url)
    .execute(pool)
    .await
    .context("Failed to insert share record")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(result.last_insert_rowid()))
}

/// Get the share record for a triple with the given status.
pub async fn get_share(
    pool: &SqlitePool,
    user_id: i64,
    content_id: i64,
    platform: Platform,
    status: ShareStatus,
) -> Result<Option<ShareRecord>> {
    sqlx::query_as(
        r"
        SELECT * FROM shares
        WHERE user_id = ? AND content_id = ? AND platform = ? AND status = ?
        ",
    )
    .bind(user_id)
    .bind(content_id)
    .bind(platform.as_str())
    .bind(status.as_str())
    .fetch_optional(pool)
    .await
    .context("Failed to fetch share record")
}

/// Whether any share record (posted or notified) exists for a triple.
pub async fn any_share_exists(
    pool: &SqlitePool,
    user_id: i64,
    content_id: i64,
    platform: Platform,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM shares WHERE user_id = ? AND content_id = ? AND platform = ? LIMIT 1",
    )
    .bind(user_id)
    .bind(content_id)
    .bind(platform.as_str())
    .fetch_optional(pool)
    .await
    .context("Failed to check share existence")?;
    Ok(row.is_some())
}

/// All share records for a content item.
pub async fn list_shares_for_content(pool: &SqlitePool, content_id: i64) -> Result<Vec<ShareRecord>> {
    sqlx::query_as("SELECT * FROM shares WHERE content_id = ? ORDER BY id")
        .bind(content_id)
        .fetch_all(pool)
        .await
        .context("Failed to list share records")
}

/// All share records for a user.
pub async fn list_shares_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<ShareRecord>> {
    sqlx::query_as("SELECT * FROM shares WHERE user_id = ? ORDER BY id")
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list share records")
}

// ========== Jobs ==========

/// Register a pending job.
pub async fn insert_job(pool: &SqlitePool, id: &str, kind: &str, payload: &str) -> Result<()> {
    sqlx::query("INSERT INTO jobs (id, kind, payload, state) VALUES (?, ?, ?, 'pending')")
        .bind(id)
        .bind(kind)
        .bind(payload)
        .execute(pool)
        .await
        .context("Failed to insert job")?;
    Ok(())
}

/// Get a job by ID.
pub async fn get_job(pool: &SqlitePool, id: &str) -> Result<Option<JobRow>> {
    sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch job")
}

/// Move up to `limit` pending jobs to running for `worker_id` and return them,
/// oldest first.
///
/// The select and update happen in one statement, so two workers sharing the
/// database never claim the same job.
pub async fn claim_pending_jobs(
    pool: &SqlitePool,
    worker_id: &str,
    limit: i64,
) -> Result<Vec<JobRow>> {
    let mut rows: Vec<JobRow> = sqlx::query_as(
        r"
        UPDATE jobs
        SET state = 'running', worker_id = ?,
            started_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        WHERE id IN (
            SELECT id FROM jobs
            WHERE state = 'pending'
            ORDER BY enqueued_at, rowid
            LIMIT ?
        )
        RETURNING *
        ",
    )
    .bind(worker_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to claim pending jobs")?;

    rows.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
    Ok(rows)
}

/// Mark a running job successful. Terminal states are never overwritten.
pub async fn complete_job(pool: &SqlitePool, id: &str, result: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE jobs
        SET state = 'success', result = ?, finished_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        WHERE id = ? AND state = 'running'
        ",
    )
    .bind(result)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to mark job complete")?;
    Ok(())
}

/// Mark a running job failed. Terminal states are never overwritten.
pub async fn fail_job(pool: &SqlitePool, id: &str, code: &str, message: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE jobs
        SET state = 'failure', error_code = ?, error_message = ?,
            finished_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        WHERE id = ? AND state = 'running'
        ",
    )
    .bind(code)
    .bind(message)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to mark job failed")?;
    Ok(())
}

/// Fail the jobs `worker_id` left running when it went away.
///
/// Jobs held by other workers are not touched.
pub async fn fail_interrupted_jobs(
    pool: &SqlitePool,
    worker_id: &str,
    code: &str,
    message: &str,
) -> Result<u64> {
    let result = sqlx::query(
        r"
        UPDATE jobs
        SET state = 'failure', error_code = ?, error_message = ?,
            finished_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        WHERE state = 'running' AND worker_id = ?
        ",
    )
    .bind(code)
    .bind(message)
    .bind(worker_id)
    .execute(pool)
    .await
    .context("Failed to fail interrupted jobs")?;
    Ok(result.rows_affected())
}

/// Delete terminal jobs that finished before `cutoff`.
pub async fn delete_finished_jobs_before(pool: &SqlitePool, cutoff: &str) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM jobs WHERE state IN ('success', 'failure') AND finished_at < ?",
    )
    .bind(cutoff)
    .execute(pool)
    .await
    .context("Failed to delete old jobs")?;
    Ok(result.rows_affected())
}
