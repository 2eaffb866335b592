//! Bulk evaluation of a project.
//!
//! A batch is a set of per-story jobs plus a supervisor task that counts
//! outcomes as they arrive. Member jobs run independently: one failure
//! never stops the others.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::{EvaluationResult, StoryKey};
use crate::evaluation::job::{EvaluationHandle, JobOutcome};
use crate::evaluation::store::EvaluationStore;
use crate::metrics::METRICS;
use crate::obs;

/// Counts of a batch's member outcomes so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub submitted: usize,
    pub rated: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchProgress {
    pub fn completed(&self) -> usize {
        self.rated + self.failed + self.cancelled
    }

    pub fn is_complete(&self) -> bool {
        self.completed() >= self.submitted
    }

    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a JobOutcome>) -> Self {
        let mut progress = BatchProgress::default();
        for outcome in outcomes {
            progress.submitted += 1;
            progress.record(outcome);
        }
        progress
    }

    fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Rated { .. } => self.rated += 1,
            JobOutcome::Failed { .. } => self.failed += 1,
            JobOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryOutcome {
    pub story_key: StoryKey,
    pub outcome: JobOutcome,
}

/// Final tally of a finished batch. Outcomes keep submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub project_key: String,
    pub outcomes: Vec<StoryOutcome>,
    pub progress: BatchProgress,
}

impl BatchReport {
    pub fn results(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.outcomes.iter().filter_map(|o| o.outcome.result())
    }

    /// `(story, reason)` for every failed member.
    pub fn failures(&self) -> impl Iterator<Item = (&StoryKey, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            JobOutcome::Failed { reason } => Some((&o.story_key, reason.as_str())),
            _ => None,
        })
    }
}

#[derive(Debug, Default)]
struct Counters {
    rated: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl Counters {
    fn record(&self, outcome: &JobOutcome) {
        let counter = match outcome {
            JobOutcome::Rated { .. } => &self.rated,
            JobOutcome::Failed { .. } => &self.failed,
            JobOutcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Caller-side view of a running batch.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    batch_id: Uuid,
    project_key: String,
    handles: Vec<EvaluationHandle>,
    counters: Arc<Counters>,
    report: watch::Receiver<Option<BatchReport>>,
}

impl BatchHandle {
    /// Start the supervisor for an already registered batch.
    pub(crate) fn spawn(
        batch_id: Uuid,
        project_key: String,
        handles: Vec<EvaluationHandle>,
        store: Arc<EvaluationStore>,
    ) -> Self {
        let counters = Arc::new(Counters::default());
        let (report_tx, report_rx) = watch::channel(None);

        let supervised = handles.clone();
        let tally = Arc::clone(&counters);
        let project = project_key.clone();
        let span = tracing::info_span!("storygrade.batch", batch_id = %batch_id, project_key = %project_key);

        tokio::spawn(
            async move {
                let outcomes = join_all(supervised.iter().map(|handle| {
                    let tally = Arc::clone(&tally);
                    async move {
                        let outcome = handle.wait().await;
                        tally.record(&outcome);
                        StoryOutcome {
                            story_key: handle.story_key().clone(),
                            outcome,
                        }
                    }
                }))
                .await;

                let progress = BatchProgress::from_outcomes(outcomes.iter().map(|o| &o.outcome));
                store.forget_batch(batch_id);
                obs::emit_batch_finished(batch_id, &project, &progress);
                METRICS.flush();

                report_tx.send_replace(Some(BatchReport {
                    batch_id,
                    project_key: project,
                    outcomes,
                    progress,
                }));
            }
            .instrument(span),
        );

        Self {
            batch_id,
            project_key,
            handles,
            counters,
            report: report_rx,
        }
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    /// One handle per submitted story, in submission order.
    pub fn handles(&self) -> &[EvaluationHandle] {
        &self.handles
    }

    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            submitted: self.handles.len(),
            rated: self.counters.rated.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            cancelled: self.counters.cancelled.load(Ordering::SeqCst),
        }
    }

    /// Wait until every member job has ended.
    pub async fn wait(&self) -> BatchReport {
        let mut rx = self.report.clone();
        let report = rx.wait_for(|r| r.is_some()).await.map(|r| (*r).clone());
        match report {
            Ok(Some(report)) => report,
            // Supervisor gone (runtime shutting down): report what is known.
            _ => BatchReport {
                batch_id: self.batch_id,
                project_key: self.project_key.clone(),
                outcomes: self
                    .handles
                    .iter()
                    .filter_map(|h| {
                        h.outcome().map(|outcome| StoryOutcome {
                            story_key: h.story_key().clone(),
                            outcome,
                        })
                    })
                    .collect(),
                progress: self.progress(),
            },
        }
    }
}
