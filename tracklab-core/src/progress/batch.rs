//! Batch progress reducer
//!
//! A batch multiplexes N jobs over one stream. Every job-level event carries
//! the `batch_index` it belongs to and is handed to that job's own
//! [`JobProgress`]; the other jobs never see it.

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::domain::step::{STEP_COUNT, StepId, StepStatus};
use crate::events::{BatchCompletion, BatchResult, Failure, ProgressEvent};

use super::comparison::ComparisonTable;
use super::job::{JobPhase, JobProgress};
use super::{ProgressLimits, StreamControl};

/// Lifecycle of the batch as a whole
#[derive(Debug, Clone, PartialEq)]
pub enum BatchPhase {
    Running,
    /// Every job reached a terminal phase; `batch_complete` may still follow
    Settled,
    /// `batch_complete` arrived
    Completed { results: Vec<BatchResult> },
    /// Batch-wide error event or the stream was given up
    Errored { message: String },
}

impl BatchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchPhase::Completed { .. } | BatchPhase::Errored { .. })
    }
}

/// Cross-job state of one step position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepRollup {
    /// Every job completed the step
    pub all_done: bool,
    /// At least one job is running the step
    pub any_running: bool,
    /// At least one job failed the step
    pub any_failed: bool,
}

#[derive(Debug, Clone)]
pub struct BatchProgress {
    batch_id: Uuid,
    track_ids: Vec<Uuid>,
    jobs: Vec<JobProgress>,
    phase: BatchPhase,
    transport_failures: u32,
    last_transport_error: Option<String>,
    limits: ProgressLimits,
}

impl BatchProgress {
    /// Batch with one pending job per track id, indexed in the given order
    pub fn new(batch_id: Uuid, track_ids: Vec<Uuid>) -> Self {
        Self::with_limits(batch_id, track_ids, ProgressLimits::default())
    }

    pub fn with_limits(batch_id: Uuid, track_ids: Vec<Uuid>, limits: ProgressLimits) -> Self {
        let jobs = track_ids
            .iter()
            .map(|_| JobProgress::with_limits(limits))
            .collect();
        Self {
            batch_id,
            track_ids,
            jobs,
            phase: BatchPhase::Running,
            transport_failures: 0,
            last_transport_error: None,
            limits,
        }
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn track_ids(&self) -> &[Uuid] {
        &self.track_ids
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> &[JobProgress] {
        &self.jobs
    }

    pub fn job(&self, batch_index: usize) -> Option<&JobProgress> {
        self.jobs.get(batch_index)
    }

    pub fn phase(&self) -> &BatchPhase {
        &self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Every job finished but the batch result is still outstanding
    pub fn is_settled(&self) -> bool {
        self.phase == BatchPhase::Settled
    }

    /// How long a settled batch waits for `batch_complete`
    pub fn settle_grace(&self) -> Duration {
        self.limits.settle_grace
    }

    /// Completed steps summed over all jobs
    pub fn completed_count(&self) -> usize {
        self.jobs.iter().map(JobProgress::completed_count).sum()
    }

    pub fn total_steps(&self) -> usize {
        self.jobs.len() * STEP_COUNT
    }

    /// Fraction of all job steps completed, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        match self.total_steps() {
            0 => 0.0,
            total => self.completed_count() as f64 / total as f64,
        }
    }

    /// Apply one decoded event from the shared batch stream
    pub fn apply(&mut self, event: &ProgressEvent) -> StreamControl {
        if self.is_terminal() {
            return StreamControl::Close;
        }
        self.transport_failures = 0;
        self.last_transport_error = None;

        match event {
            ProgressEvent::BatchComplete(done) => self.complete(done),
            // only `batch_complete` is still expected once settled
            _ if self.is_settled() => StreamControl::Close,
            ProgressEvent::Error(failure) if failure.batch_index.is_none() => self.fail(failure),
            routed => {
                if let Some(job) = self.routed_job(routed.batch_index()) {
                    job.apply(routed);
                }
                if !self.jobs.is_empty() && self.jobs.iter().all(JobProgress::is_terminal) {
                    self.phase = BatchPhase::Settled;
                }
                StreamControl::Continue
            }
        }
    }

    /// Record a transport-level failure on the shared stream
    ///
    /// Once the bound is reached every still-running job is marked errored
    /// and the batch gives up the stream.
    pub fn transport_failure(&mut self, reason: &str) -> StreamControl {
        if self.is_terminal() || self.is_settled() {
            return StreamControl::Close;
        }
        self.transport_failures += 1;
        self.last_transport_error = Some(reason.to_string());

        if self.transport_failures >= self.limits.max_transport_failures {
            let message = format!("Connection lost: {}", reason);
            self.error_running_jobs(&message, None);
            self.phase = BatchPhase::Errored { message };
            return StreamControl::Close;
        }
        StreamControl::Continue
    }

    pub fn consecutive_transport_failures(&self) -> u32 {
        self.transport_failures
    }

    pub fn last_transport_error(&self) -> Option<&str> {
        self.last_transport_error.as_deref()
    }

    /// Register a cancel request for every job that accepts one
    ///
    /// Returns the indices of the jobs the caller should cancel.
    pub fn request_cancel(&mut self, now: Instant) -> Vec<usize> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.jobs
            .iter_mut()
            .enumerate()
            .filter_map(|(index, job)| job.request_cancel(now).then_some(index))
            .collect()
    }

    pub fn is_cancelling(&self, now: Instant) -> bool {
        self.jobs.iter().any(|job| job.is_cancelling(now))
    }

    /// Cross-job status of one step position
    pub fn rollup(&self, step: StepId) -> StepRollup {
        if self.jobs.is_empty() {
            return StepRollup::default();
        }
        let statuses = || self.jobs.iter().map(|job| job.step(step).status);
        StepRollup {
            all_done: statuses().all(|s| s == StepStatus::Completed),
            any_running: statuses().any(|s| s == StepStatus::Running),
            any_failed: statuses().any(|s| s == StepStatus::Failed),
        }
    }

    /// Comparison of the step's results, once every job completed it
    pub fn comparison(&self, step: StepId) -> Option<ComparisonTable> {
        ComparisonTable::build(step, &self.jobs)
    }

    /// Final duration reported by `batch_complete` for a job
    pub fn result(&self, batch_index: usize) -> Option<&BatchResult> {
        match &self.phase {
            BatchPhase::Completed { results } => results
                .iter()
                .find(|r| usize::try_from(r.batch_index).ok() == Some(batch_index)),
            _ => None,
        }
    }

    fn routed_job(&mut self, batch_index: Option<i64>) -> Option<&mut JobProgress> {
        let index = usize::try_from(batch_index?).ok()?;
        self.jobs.get_mut(index)
    }

    fn complete(&mut self, done: &BatchCompletion) -> StreamControl {
        for result in &done.results {
            let Ok(index) = usize::try_from(result.batch_index) else {
                continue;
            };
            if let Some(job) = self.jobs.get_mut(index) {
                let phase = settled_phase(job, result);
                job.settle(phase);
            }
        }
        self.phase = BatchPhase::Completed {
            results: done.results.clone(),
        };
        StreamControl::Close
    }

    fn fail(&mut self, failure: &Failure) -> StreamControl {
        let failed_step = failure.failed_step.as_deref().and_then(StepId::parse);
        self.error_running_jobs(&failure.error, failed_step);
        self.phase = BatchPhase::Errored {
            message: failure.error.clone(),
        };
        StreamControl::Close
    }

    fn error_running_jobs(&mut self, message: &str, failed_step: Option<StepId>) {
        for job in self.jobs.iter_mut().filter(|job| !job.is_terminal()) {
            job.settle(JobPhase::Errored {
                message: message.to_string(),
                failed_step,
            });
        }
    }
}

/// Job phase dictated by a `batch_complete` result
fn settled_phase(job: &JobProgress, result: &BatchResult) -> JobPhase {
    match result.status.as_str() {
        "completed" => {
            let total_tokens = match job.phase() {
                JobPhase::Completed { total_tokens, .. } => *total_tokens,
                _ => None,
            };
            JobPhase::Completed {
                total_duration_seconds: result.duration_sec,
                total_tokens,
                inferred: false,
            }
        }
        "cancelled" => match job.phase() {
            JobPhase::Cancelled { .. } => job.phase().clone(),
            _ => JobPhase::Cancelled {
                completed_steps: job.completed_steps(),
                last_step: None,
            },
        },
        _ => {
            let failed_step = match job.phase() {
                JobPhase::Errored { failed_step, .. } => *failed_step,
                _ => None,
            };
            JobPhase::Errored {
                message: result
                    .error
                    .clone()
                    .unwrap_or_else(|| "Generation failed".to_string()),
                failed_step,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Cancellation, Completion, StepUpdate};
    use proptest::prelude::*;
    use serde_json::json;

    fn batch(n: usize) -> BatchProgress {
        BatchProgress::new(Uuid::new_v4(), (0..n).map(|_| Uuid::new_v4()).collect())
    }

    fn update(index: i64, step: StepId, status: StepStatus) -> ProgressEvent {
        ProgressEvent::StepUpdate(StepUpdate {
            step: step.short_name().to_string(),
            status,
            description: None,
            duration_sec: None,
            tokens_used: None,
            summary: None,
            track_id: None,
            batch_index: Some(index),
        })
    }

    fn result(index: i64, status: &str, error: Option<&str>) -> BatchResult {
        BatchResult {
            track_id: None,
            batch_index: index,
            status: status.to_string(),
            duration_sec: Some(30.0),
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_events_are_isolated_per_index() {
        let mut batch = batch(3);
        batch.apply(&update(1, StepId::B1, StepStatus::Completed));

        assert_eq!(batch.job(1).unwrap().completed_count(), 1);
        assert_eq!(batch.job(0).unwrap().completed_count(), 0);
        assert_eq!(batch.job(2).unwrap().completed_count(), 0);
        assert_eq!(batch.completed_count(), 1);
        assert_eq!(batch.total_steps(), 24);
    }

    #[test]
    fn test_out_of_range_and_missing_indices_are_ignored() {
        let mut batch = batch(2);
        assert_eq!(
            batch.apply(&update(2, StepId::B1, StepStatus::Completed)),
            StreamControl::Continue
        );
        batch.apply(&update(-1, StepId::B1, StepStatus::Completed));
        batch.apply(&ProgressEvent::Complete(Completion::default()));

        assert_eq!(batch.completed_count(), 0);
        assert!(batch.jobs().iter().all(|job| !job.is_terminal()));
    }

    #[test]
    fn test_comparison_revealed_when_last_job_completes() {
        let mut batch = batch(2);
        let completed = |index: i64, count: u64| {
            ProgressEvent::StepUpdate(StepUpdate {
                step: "B2".to_string(),
                status: StepStatus::Completed,
                description: None,
                duration_sec: Some(3.0),
                tokens_used: None,
                summary: json!({"competencies_count": count}).as_object().cloned(),
                track_id: None,
                batch_index: Some(index),
            })
        };

        batch.apply(&completed(0, 5));
        assert!(batch.comparison(StepId::B2).is_none());
        assert!(!batch.rollup(StepId::B2).all_done);

        batch.apply(&completed(1, 6));
        let table = batch.comparison(StepId::B2).unwrap();
        assert!(batch.rollup(StepId::B2).all_done);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].key, "competencies_count");
        assert!(table.rows[0].differs);
    }

    #[test]
    fn test_rollup_tracks_running_and_failed() {
        let mut batch = batch(2);
        batch.apply(&update(0, StepId::B3, StepStatus::Running));
        batch.apply(&update(1, StepId::B3, StepStatus::Failed));

        let rollup = batch.rollup(StepId::B3);
        assert!(rollup.any_running);
        assert!(rollup.any_failed);
        assert!(!rollup.all_done);
    }

    #[test]
    fn test_job_terminal_events_route_by_index() {
        let mut batch = batch(2);
        batch.apply(&ProgressEvent::Cancelled(Cancellation {
            completed_steps: vec![],
            last_step: None,
            batch_index: Some(0),
        }));

        assert!(matches!(batch.job(0).unwrap().phase(), JobPhase::Cancelled { .. }));
        assert_eq!(batch.job(1).unwrap().phase(), &JobPhase::Running);
        assert_eq!(batch.phase(), &BatchPhase::Running);
    }

    #[test]
    fn test_batch_complete_overrides_fallback_completion() {
        let mut batch = batch(2);
        for step in StepId::ALL {
            batch.apply(&update(0, step, StepStatus::Completed));
        }
        assert!(matches!(
            batch.job(0).unwrap().phase(),
            JobPhase::Completed { inferred: true, .. }
        ));

        let control = batch.apply(&ProgressEvent::BatchComplete(BatchCompletion {
            results: vec![
                result(0, "failed", Some("B8 validation rejected track")),
                result(1, "completed", None),
            ],
        }));

        assert_eq!(control, StreamControl::Close);
        assert!(batch.is_terminal());
        assert_eq!(
            batch.job(0).unwrap().phase(),
            &JobPhase::Errored {
                message: "B8 validation rejected track".to_string(),
                failed_step: None,
            }
        );
        assert_eq!(
            batch.job(1).unwrap().phase(),
            &JobPhase::Completed {
                total_duration_seconds: Some(30.0),
                total_tokens: None,
                inferred: false,
            }
        );
        assert_eq!(batch.result(1).unwrap().duration_sec, Some(30.0));
    }

    #[test]
    fn test_batch_settles_once_every_job_is_terminal() {
        let mut batch = batch(2);
        for index in 0..2 {
            for step in StepId::ALL {
                assert_eq!(
                    batch.apply(&update(index, step, StepStatus::Completed)),
                    StreamControl::Continue
                );
            }
        }

        assert!(batch.is_settled());
        assert!(!batch.is_terminal());
        assert_eq!(
            batch.transport_failure("connection closed by server"),
            StreamControl::Close
        );
        assert_eq!(batch.phase(), &BatchPhase::Settled);
        assert!(batch.jobs().iter().all(|job| matches!(
            job.phase(),
            JobPhase::Completed { inferred: true, .. }
        )));
    }

    #[test]
    fn test_settled_batch_still_takes_batch_complete() {
        let mut batch = batch(2);
        for index in 0..2 {
            for step in StepId::ALL {
                batch.apply(&update(index, step, StepStatus::Completed));
            }
        }

        let control = batch.apply(&ProgressEvent::BatchComplete(BatchCompletion {
            results: vec![result(0, "completed", None), result(1, "completed", None)],
        }));

        assert_eq!(control, StreamControl::Close);
        assert!(matches!(batch.phase(), BatchPhase::Completed { .. }));
        assert_eq!(
            batch.job(0).unwrap().phase(),
            &JobPhase::Completed {
                total_duration_seconds: Some(30.0),
                total_tokens: None,
                inferred: false,
            }
        );
    }

    #[test]
    fn test_settled_batch_closes_on_any_other_event() {
        let mut batch = batch(1);
        batch.apply(&ProgressEvent::Error(Failure {
            error: "timeout".to_string(),
            failed_step: Some("B4".to_string()),
            batch_index: Some(0),
        }));
        assert!(batch.is_settled());

        let control = batch.apply(&ProgressEvent::Error(Failure {
            error: "Batch not found".to_string(),
            failed_step: None,
            batch_index: None,
        }));
        assert_eq!(control, StreamControl::Close);
        assert_eq!(batch.phase(), &BatchPhase::Settled);
    }

    #[test]
    fn test_batch_wide_error_errors_running_jobs() {
        let mut batch = batch(3);
        batch.apply(&ProgressEvent::Complete(Completion {
            batch_index: Some(2),
            ..Default::default()
        }));

        let control = batch.apply(&ProgressEvent::Error(Failure {
            error: "Batch not found".to_string(),
            failed_step: None,
            batch_index: None,
        }));

        assert_eq!(control, StreamControl::Close);
        assert!(matches!(batch.job(0).unwrap().phase(), JobPhase::Errored { .. }));
        assert!(matches!(batch.job(1).unwrap().phase(), JobPhase::Errored { .. }));
        assert!(matches!(batch.job(2).unwrap().phase(), JobPhase::Completed { .. }));
        assert_eq!(
            batch.phase(),
            &BatchPhase::Errored {
                message: "Batch not found".to_string()
            }
        );
    }

    #[test]
    fn test_indexed_error_only_fails_that_job() {
        let mut batch = batch(2);
        let control = batch.apply(&ProgressEvent::Error(Failure {
            error: "timeout".to_string(),
            failed_step: Some("B4".to_string()),
            batch_index: Some(1),
        }));

        assert_eq!(control, StreamControl::Continue);
        assert_eq!(batch.job(0).unwrap().phase(), &JobPhase::Running);
        assert_eq!(
            batch.job(1).unwrap().phase(),
            &JobPhase::Errored {
                message: "timeout".to_string(),
                failed_step: Some(StepId::B4),
            }
        );
    }

    #[test]
    fn test_terminal_batch_ignores_events() {
        let mut batch = batch(2);
        batch.apply(&ProgressEvent::BatchComplete(BatchCompletion::default()));
        assert_eq!(
            batch.apply(&update(0, StepId::B1, StepStatus::Completed)),
            StreamControl::Close
        );
        assert_eq!(batch.completed_count(), 0);
    }

    #[test]
    fn test_transport_give_up_errors_batch() {
        let mut batch = batch(2);
        assert_eq!(batch.transport_failure("eof"), StreamControl::Continue);
        assert_eq!(batch.transport_failure("eof"), StreamControl::Continue);
        assert_eq!(batch.transport_failure("eof"), StreamControl::Close);
        assert!(
            batch
                .jobs()
                .iter()
                .all(|job| matches!(job.phase(), JobPhase::Errored { .. }))
        );
    }

    #[test]
    fn test_cancel_request_covers_running_jobs() {
        let mut batch = batch(3);
        batch.apply(&ProgressEvent::Complete(Completion {
            batch_index: Some(0),
            ..Default::default()
        }));

        let now = Instant::now();
        assert_eq!(batch.request_cancel(now), vec![1, 2]);
        assert!(batch.is_cancelling(now));
        assert!(batch.request_cancel(now).is_empty());
    }

    #[test]
    fn test_empty_batch_has_zero_progress() {
        let batch = batch(0);
        assert!(batch.is_empty());
        assert_eq!(batch.progress(), 0.0);
        assert!(batch.comparison(StepId::B1).is_none());
    }

    proptest! {
        #[test]
        fn events_only_touch_their_job(
            events in proptest::collection::vec((0i64..3, 0usize..STEP_COUNT), 1..30),
            target in 0i64..3,
        ) {
            let mut batch = batch(3);
            for (index, step) in &events {
                if *index == target {
                    batch.apply(&update(*index, StepId::ALL[*step], StepStatus::Completed));
                }
            }
            for (index, job) in batch.jobs().iter().enumerate() {
                if index as i64 != target {
                    prop_assert_eq!(job.completed_count(), 0);
                }
            }
        }
    }
}
