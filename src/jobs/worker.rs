use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{JobHandlers, JobPayload, JobQueue};
use crate::config::Config;
use crate::db::{
    claim_pending_jobs, complete_job, db_timestamp, delete_finished_jobs_before, fail_interrupted_jobs,
    fail_job, Database, JobRow,
};

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);
const INTERRUPTED_CODE: &str = "interrupted";
const INTERRUPTED_MESSAGE: &str = "The job was interrupted by a restart. Please submit it again";
const INTERNAL_CODE: &str = "internal";
const INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Job worker pool.
///
/// Claims pending jobs from the registry and runs each on its own task,
/// never more than `concurrency` at once.
pub struct JobWorker {
    worker_id: String,
    queue: JobQueue,
    handlers: JobHandlers,
    semaphore: Arc<Semaphore>,
    poll_interval: Duration,
    retention: Duration,
}

impl JobWorker {
    #[must_use]
    pub fn new(config: &Config, queue: JobQueue, handlers: JobHandlers) -> Self {
        Self {
            worker_id: config.worker_id.clone(),
            queue,
            handlers,
            semaphore: Arc::new(Semaphore::new(config.worker_concurrency.max(1))),
            poll_interval: config.job_poll_interval,
            retention: config.job_retention,
        }
    }

    /// Fail jobs this worker's previous run left running.
    ///
    /// Their side effects may or may not have happened, so they are not
    /// rerun; callers see a failure and resubmit. Jobs claimed under another
    /// worker id are left alone.
    pub async fn recover_on_startup(&self) -> Result<u64> {
        let count = fail_interrupted_jobs(
            self.queue.database().pool(),
            &self.worker_id,
            INTERRUPTED_CODE,
            INTERRUPTED_MESSAGE,
        )
        .await?;
        if count > 0 {
            warn!(
                count,
                worker_id = %self.worker_id,
                "Failed jobs interrupted by a previous shutdown"
            );
        }
        Ok(count)
    }

    /// Run the worker loop until `shutdown` is cancelled.
    ///
    /// Jobs already started are left to finish on their own tasks.
    pub async fn run(&self, shutdown: CancellationToken) {
        let wake = self.queue.wake_signal();
        let mut purge = tokio::time::interval(PURGE_INTERVAL);

        info!(
            worker_id = %self.worker_id,
            concurrency = self.semaphore.available_permits(),
            "Job worker started"
        );

        loop {
            match self.dispatch_available().await {
                Ok(0) => {}
                Ok(count) => debug!(count, "Dispatched jobs"),
                Err(e) => error!("Error claiming jobs: {e:#}"),
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = wake.notified() => {}
                () = tokio::time::sleep(self.poll_interval) => {}
                _ = purge.tick() => {
                    if let Err(e) = self.purge_finished().await {
                        error!("Error purging finished jobs: {e:#}");
                    }
                }
            }
        }

        info!("Job worker stopped");
    }

    /// Claim as many pending jobs as there are free slots and start them.
    pub async fn dispatch_available(&self) -> Result<usize> {
        let free = self.semaphore.available_permits();
        if free == 0 {
            return Ok(0);
        }

        let rows = claim_pending_jobs(
            self.queue.database().pool(),
            &self.worker_id,
            i64::try_from(free).unwrap_or(i64::MAX),
        )
        .await?;
        let count = rows.len();

        for row in rows {
            let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
            let handlers = self.handlers.clone();
            let db = self.queue.database().clone();
            let wake = self.queue.wake_signal();

            tokio::spawn(async move {
                run_job(&handlers, &db, row).await;
                // Free the slot before waking the loop so it can be reclaimed
                drop(permit);
                wake.notify_one();
            });
        }

        Ok(count)
    }

    async fn purge_finished(&self) -> Result<u64> {
        let retention = chrono::Duration::from_std(self.retention)?;
        let cutoff = db_timestamp(Utc::now() - retention);
        let deleted = delete_finished_jobs_before(self.queue.database().pool(), &cutoff).await?;
        if deleted > 0 {
            info!(count = deleted, "Purged finished jobs");
        }
        Ok(deleted)
    }
}

async fn run_job(handlers: &JobHandlers, db: &Database, row: JobRow) {
    let job_id = row.id;
    let payload: JobPayload = match serde_json::from_str(&row.payload) {
        Ok(payload) => payload,
        Err(e) => {
            error!(job_id = %job_id, "Unreadable job payload: {e}");
            record_failure(db, &job_id, INTERNAL_CODE, INTERNAL_MESSAGE).await;
            return;
        }
    };

    let kind = payload.kind();
    debug!(job_id = %job_id, kind = kind.as_str(), "Running job");

    // Run the handler on its own task so a panic fails the job instead of the worker
    let task_handlers = handlers.clone();
    let outcome = tokio::spawn(async move { task_handlers.dispatch(payload).await }).await;

    match outcome {
        Ok(Ok(result)) => {
            if let Err(e) = complete_job(db.pool(), &job_id, &result.to_string()).await {
                error!(job_id = %job_id, "Failed to record job result: {e:#}");
                return;
            }
            info!(job_id = %job_id, kind = kind.as_str(), "Job succeeded");
        }
        Ok(Err(e)) => {
            warn!(
                job_id = %job_id,
                kind = kind.as_str(),
                code = e.code(),
                "Job failed: {e:#}"
            );
            record_failure(db, &job_id, e.code(), &e.user_message()).await;
        }
        Err(e) => {
            error!(job_id = %job_id, kind = kind.as_str(), "Job task panicked: {e}");
            record_failure(db, &job_id, INTERNAL_CODE, INTERNAL_MESSAGE).await;
        }
    }
}

async fn record_failure(db: &Database, job_id: &str, code: &str, message: &str) {
    if let Err(e) = fail_job(db.pool(), job_id, code, message).await {
        error!(job_id = %job_id, "Failed to record job failure: {e:#}");
    }
}
