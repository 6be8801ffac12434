//! Caller-side waiting for a submitted job.

use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::Instant;

use super::{JobId, JobQueue, JobStatus};

/// Where a job stood when the caller stopped waiting.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The job reached SUCCESS or FAILURE
    Finished(JobStatus),
    /// Still pending or running after `max_wait`; check back later
    StillProcessing(JobStatus),
}

/// Poll `id` every `interval` until it is terminal or `max_wait` passes.
///
/// # Errors
///
/// Returns an error if the job is unknown or the registry cannot be read.
pub async fn wait_for_terminal(
    queue: &JobQueue,
    id: JobId,
    interval: Duration,
    max_wait: Duration,
) -> Result<PollOutcome> {
    let deadline = Instant::now() + max_wait;
    loop {
        let Some(status) = queue.status(id).await? else {
            bail!("Unknown job {id}");
        };
        if status.state.is_terminal() {
            return Ok(PollOutcome::Finished(status));
        }
        if Instant::now() + interval > deadline {
            return Ok(PollOutcome::StillProcessing(status));
        }
        tokio::time::sleep(interval).await;
    }
}
