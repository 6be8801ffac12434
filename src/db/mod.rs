mod migrations;
mod models;
mod queries;

pub use models::*;
pub use queries::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

/// Handle to the SQLite store shared by the web and worker tiers.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails, migrations fail, or the file
    /// is not writable.
    pub async fn new(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // The web process and the worker process write to the same file;
            // without a busy timeout the loser of a write race fails immediately.
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let db = Self { pool };
        db.run_migrations().await?;
        db.verify_writable(path).await?;

        Ok(db)
    }

    async fn verify_writable(&self, path: &Path) -> Result<()> {
        // Beginning a transaction needs write access, so a read-only mount
        // shows up here instead of on the first job.
        let tx = self.pool.begin().await.with_context(|| {
            format!(
                "SQLite database is not writable (path: {}). Check volume mount permissions",
                path.display()
            )
        })?;

        tx.commit()
            .await
            .context("Failed to commit SQLite writability check")?;
        Ok(())
    }

    async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
