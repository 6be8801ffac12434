use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use super::{JobError, JobId, JobKind, JobPayload, JobState, JobStatus};
use crate::db::{get_job, insert_job, Database, JobRow};

/// Submission and status side of the job executor.
///
/// Cheap to clone; clones share the same wake-up signal so a worker in this
/// process starts on new jobs without waiting for its next poll.
#[derive(Debug, Clone)]
pub struct JobQueue {
    db: Database,
    wake: Arc<Notify>,
}

impl JobQueue {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            wake: Arc::new(Notify::new()),
        }
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Register a job and return its ID. The job is never run inline.
    pub async fn submit(&self, payload: JobPayload) -> Result<JobId> {
        let id = Uuid::new_v4();
        let kind = payload.kind();
        let body = serde_json::to_string(&payload).context("Failed to serialize job payload")?;

        insert_job(self.db.pool(), &id.to_string(), kind.as_str(), &body).await?;
        debug!(job_id = %id, kind = kind.as_str(), "Job submitted");

        self.wake.notify_one();
        Ok(id)
    }

    /// Current status of a job, or `None` if the ID is unknown (or purged).
    pub async fn status(&self, id: JobId) -> Result<Option<JobStatus>> {
        let row = get_job(self.db.pool(), &id.to_string()).await?;
        row.map(|row| status_from_row(id, row)).transpose()
    }

    pub(super) fn wake_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }
}

fn status_from_row(id: JobId, row: JobRow) -> Result<JobStatus> {
    let kind = JobKind::from_str(&row.kind)
        .with_context(|| format!("Unknown job kind in registry: {}", row.kind))?;
    let state = JobState::from_str(&row.state)
        .with_context(|| format!("Unknown job state in registry: {}", row.state))?;

    let result = row
        .result
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("Stored job result is not valid JSON")?;

    let error = match (state, row.error_code, row.error_message) {
        (JobState::Failure, code, message) => Some(JobError {
            code: code.unwrap_or_else(|| "internal".to_string()),
            message: message.unwrap_or_else(|| "An internal error occurred".to_string()),
        }),
        _ => None,
    };

    Ok(JobStatus {
        id,
        kind,
        state,
        result,
        error,
        enqueued_at: row.enqueued_at,
        finished_at: row.finished_at,
    })
}
