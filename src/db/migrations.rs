use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    if current_version < 3 {
        debug!("Running migration v3");
        run_migration_v3(pool).await?;
        set_schema_version(pool, 3).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Timestamps are stored as `YYYY-MM-DDTHH:MM:SSZ` so that string comparison
/// orders them chronologically.
async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: content, users, tokens and shares");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            bio TEXT,
            example_posts TEXT,
            slack_id TEXT,
            autonomous_mode INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS content_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            canonical_url TEXT NOT NULL,
            url_hash TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            excerpt TEXT,
            image_url TEXT,
            fixed_copy TEXT,
            context TEXT,
            utm_campaign TEXT,
            kind TEXT NOT NULL DEFAULT 'article',
            published_at TEXT,
            submitted_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create content_items table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_content_items_created_at ON content_items(created_at)",
    )
    .execute(pool)
    .await
    .context("Failed to create content_items created_at index")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS platform_tokens (
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            platform TEXT NOT NULL,
            access_token TEXT,
            refresh_token TEXT,
            expires_at TEXT,
            member_id TEXT,
            revoked_at TEXT,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            PRIMARY KEY (user_id, platform)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create platform_tokens table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS shares (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content_id INTEGER NOT NULL REFERENCES content_items(id) ON DELETE CASCADE,
            platform TEXT NOT NULL,
            status TEXT NOT NULL,
            post_content TEXT,
            post_url TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            UNIQUE (user_id, content_id, platform, status)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create shares table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_shares_content ON shares(content_id)")
        .execute(pool)
        .await
        .context("Failed to create shares content index")?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: job status registry");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            result TEXT,
            error_code TEXT,
            error_message TEXT,
            enqueued_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            started_at TEXT,
            finished_at TEXT
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create jobs table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state, enqueued_at)")
        .execute(pool)
        .await
        .context("Failed to create jobs state index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_finished_at ON jobs(finished_at)")
        .execute(pool)
        .await
        .context("Failed to create jobs finished_at index")?;

    Ok(())
}

/// Record which worker claimed a job.
async fn run_migration_v3(pool: &SqlitePool) -> Result<()> {
    sqlx::query("ALTER TABLE jobs ADD COLUMN worker_id TEXT")
        .execute(pool)
        .await
        .context("Failed to add jobs.worker_id")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_worker ON jobs(worker_id, state)")
        .execute(pool)
        .await
        .context("Failed to create jobs worker index")?;

    Ok(())
}
