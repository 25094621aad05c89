use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rulegrid_core::{JobId, JobStatusSource, Result, RuleGridError, Scope};

use crate::{Clock, ExpansionJob, JobState, JobTracker, PollOutcome};

/// Holds at most one expansion job for a rule-area scope.
///
/// A job stays in the slot until its terminal outcome is taken with
/// [`JobSlot::take_outcome`]. New submissions are refused while the held job
/// is still pending or processing.
pub struct JobSlot {
    scope: Scope,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    current: Option<JobTracker>,
    cancel: CancellationToken,
}

impl JobSlot {
    pub fn new(scope: Scope, clock: Arc<dyn Clock>, poll_interval: Duration) -> Self {
        Self {
            scope,
            clock,
            poll_interval,
            current: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn current(&self) -> Option<&ExpansionJob> {
        self.current.as_ref().map(JobTracker::job)
    }

    pub fn is_outstanding(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|t| t.state().is_outstanding())
    }

    /// Fails with `JobInProgress` while a held job is not terminal.
    pub fn ensure_idle(&self) -> Result<()> {
        match &self.current {
            Some(tracker) if tracker.state().is_outstanding() => {
                Err(RuleGridError::JobInProgress {
                    scope: self.scope.clone(),
                    job_id: tracker.job().id,
                })
            }
            _ => Ok(()),
        }
    }

    /// Start tracking a freshly submitted job.
    pub fn begin(&mut self, job_id: JobId) -> Result<&ExpansionJob> {
        self.ensure_idle()?;
        if let Some(previous) = self.current.take() {
            warn!(
                "Discarding undelivered outcome of job {} ({:?})",
                previous.job().id,
                previous.state()
            );
        }
        self.cancel = CancellationToken::new();
        let tracker = JobTracker::new(job_id, self.scope.clone(), self.clock.clone());
        Ok(self.current.insert(tracker).job())
    }

    /// Single poll of the held job, if any.
    pub async fn poll_once(&mut self, source: &dyn JobStatusSource) -> Option<JobState> {
        let tracker = self.current.as_mut()?;
        Some(tracker.poll(source).await.clone())
    }

    /// Poll the held job on the configured interval until terminal or stopped.
    pub async fn drive(&mut self, source: &dyn JobStatusSource) -> Option<PollOutcome> {
        let token = self.cancel.clone();
        let interval = self.poll_interval;
        let tracker = self.current.as_mut()?;
        let outcome = tracker.run_until_terminal(source, interval, &token).await;
        if outcome == PollOutcome::Cancelled {
            // A later drive() may resume polling the same job.
            self.cancel = CancellationToken::new();
        }
        Some(outcome)
    }

    /// Handle that stops an in-flight [`JobSlot::drive`] from another task.
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Remove and return the held job once it is terminal.
    pub fn take_outcome(&mut self) -> Option<ExpansionJob> {
        if !self.current.as_ref()?.state().is_terminal() {
            return None;
        }
        self.current.take().map(JobTracker::into_job)
    }

    /// Forget the held job regardless of state. Writes it already caused stay applied.
    pub fn abandon(&mut self) -> Option<ExpansionJob> {
        self.cancel.cancel();
        let job = self.current.take().map(JobTracker::into_job);
        if let Some(ref job) = job {
            info!("Abandoned expansion job {} in {:?}", job.id, job.state);
        }
        job
    }
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use rulegrid_core::JobStatusReport;
    use uuid::Uuid;

    fn slot() -> JobSlot {
        JobSlot::new(
            Scope::new("proj", "area"),
            Arc::new(ManualClock::default()),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn second_submission_is_rejected_while_outstanding() {
        let mut slot = slot();
        let first = slot.begin(Uuid::new_v4()).unwrap().id;

        match slot.begin(Uuid::new_v4()) {
            Err(RuleGridError::JobInProgress { job_id, scope }) => {
                assert_eq!(job_id, first);
                assert_eq!(scope, Scope::new("proj", "area"));
            }
            other => panic!("expected JobInProgress, got {:?}", other.map(|j| j.id)),
        }
        assert_eq!(slot.current().unwrap().id, first);
    }

    #[test]
    fn outcome_is_delivered_once() {
        let mut slot = slot();
        slot.begin(Uuid::new_v4()).unwrap();
        assert!(slot.take_outcome().is_none());

        slot.current
            .as_mut()
            .unwrap()
            .apply_report(Some(JobStatusReport::done()));
        assert!(!slot.is_outstanding());

        let job = slot.take_outcome().unwrap();
        assert_eq!(job.state, JobState::Done);
        assert!(slot.current().is_none());
        assert!(slot.take_outcome().is_none());
    }

    #[test]
    fn terminal_job_does_not_block_next_submission() {
        let mut slot = slot();
        slot.begin(Uuid::new_v4()).unwrap();
        slot.current
            .as_mut()
            .unwrap()
            .apply_report(Some(JobStatusReport::failed("nope")));
        let next = Uuid::new_v4();
        assert_eq!(slot.begin(next).unwrap().id, next);
    }

    #[test]
    fn abandon_clears_outstanding_job() {
        let mut slot = slot();
        slot.begin(Uuid::new_v4()).unwrap();
        let job = slot.abandon().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert!(slot.ensure_idle().is_ok());
    }
}
