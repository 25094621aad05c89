use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use rulegrid_core::{JobId, JobStatusReport, JobStatusSource, Scope};

use crate::Clock;

pub const UNKNOWN_STATUS_MESSAGE: &str = "Expansion job returned no recognizable status";
pub const GENERIC_FAILURE_MESSAGE: &str = "Expansion job failed";

/// Lifecycle of a remote expansion job. `Done` and `Error` are absorbing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Processing,
    Done,
    Error { message: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error { .. })
    }

    pub fn is_outstanding(&self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionJob {
    pub id: JobId,
    pub scope: Scope,
    pub submitted_at: DateTime<Utc>,
    pub state: JobState,
    pub completed_at: Option<DateTime<Utc>>,
    /// Submission to completion; only set on `Done`.
    pub elapsed: Option<Duration>,
}

impl ExpansionJob {
    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            JobState::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Result of driving a tracker with [`JobTracker::run_until_terminal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Finished(JobState),
    Cancelled,
}

/// State machine for one remote expansion job.
pub struct JobTracker {
    job: ExpansionJob,
    clock: Arc<dyn Clock>,
    polls: u32,
}

impl JobTracker {
    pub fn new(id: JobId, scope: Scope, clock: Arc<dyn Clock>) -> Self {
        let submitted_at = clock.now();
        counter!("rulegrid_expansion_jobs_submitted").increment(1);
        info!("Tracking expansion job {} for scope {}", id, scope);
        Self {
            job: ExpansionJob {
                id,
                scope,
                submitted_at,
                state: JobState::Pending,
                completed_at: None,
                elapsed: None,
            },
            clock,
            polls: 0,
        }
    }

    pub fn job(&self) -> &ExpansionJob {
        &self.job
    }

    pub fn state(&self) -> &JobState {
        &self.job.state
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn into_job(self) -> ExpansionJob {
        self.job
    }

    /// Apply one status observation. `None` is an absent or unreadable status.
    pub fn apply_report(&mut self, report: Option<JobStatusReport>) -> &JobState {
        if self.job.state.is_terminal() {
            debug!(
                "Ignoring status for job {} already in {:?}",
                self.job.id, self.job.state
            );
            return &self.job.state;
        }

        let next = match report {
            Some(r) if r.is_processing => JobState::Processing,
            Some(r) if r.is_ok => JobState::Done,
            Some(r) if r.message.trim().is_empty() => JobState::Error {
                message: GENERIC_FAILURE_MESSAGE.to_string(),
            },
            Some(r) => JobState::Error { message: r.message },
            None => JobState::Error {
                message: UNKNOWN_STATUS_MESSAGE.to_string(),
            },
        };
        self.transition(next);
        &self.job.state
    }

    fn transition(&mut self, next: JobState) {
        match &next {
            JobState::Done => {
                let now = self.clock.now();
                let elapsed = (now - self.job.submitted_at).to_std().unwrap_or_default();
                self.job.completed_at = Some(now);
                self.job.elapsed = Some(elapsed);
                counter!("rulegrid_expansion_jobs_completed").increment(1);
                histogram!("rulegrid_expansion_job_seconds").record(elapsed.as_secs_f64());
                info!(
                    "Expansion job {} completed in {:.3}s",
                    self.job.id,
                    elapsed.as_secs_f64()
                );
            }
            JobState::Error { message } => {
                self.job.completed_at = Some(self.clock.now());
                counter!("rulegrid_expansion_jobs_failed").increment(1);
                error!("Expansion job {} failed: {}", self.job.id, message);
            }
            JobState::Processing | JobState::Pending => {
                debug!("Expansion job {} is {:?}", self.job.id, next);
            }
        }
        self.job.state = next;
    }

    /// Read the status resource once and advance.
    pub async fn poll(&mut self, source: &dyn JobStatusSource) -> &JobState {
        if self.job.state.is_terminal() {
            return &self.job.state;
        }
        self.polls += 1;
        match source.get_status(self.job.id).await {
            Ok(report) => self.apply_report(report),
            Err(e) => {
                self.transition(JobState::Error {
                    message: format!("Status fetch failed: {}", e),
                });
                &self.job.state
            }
        }
    }

    /// Poll on a fixed interval until the job is terminal or `cancel` fires.
    ///
    /// The first poll happens one interval after the call. Cancelling never
    /// touches the job state.
    pub async fn run_until_terminal(
        &mut self,
        source: &dyn JobStatusSource,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        if self.job.state.is_terminal() {
            return PollOutcome::Finished(self.job.state.clone());
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Stopped polling expansion job {}", self.job.id);
                    return PollOutcome::Cancelled;
                }
                _ = ticker.tick() => {
                    if self.poll(source).await.is_terminal() {
                        return PollOutcome::Finished(self.job.state.clone());
                    }
                }
            }
        }
    }
}
