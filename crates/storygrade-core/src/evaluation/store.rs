//! Process-wide registry of story evaluations.
//!
//! Each story key owns one slot holding its job state, the in-flight job (if
//! any) and the latest result. Every read and write of a slot goes through
//! one mutex, which is what makes the single-flight rule hold: claiming a
//! slot and checking for a running job happen in the same critical section.
//!
//! Subscribers see a job's event before its handle resolves.
//!
//! Completions are applied in completion order. A completion is accepted
//! only if its sequence number matches the job currently in flight for that
//! story, so cancelled or superseded jobs can never overwrite a newer state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::domain::{EvaluationResult, StoryKey};
use crate::evaluation::error::{EvalResult, EvaluationError};
use crate::evaluation::events::EvaluationEvent;
use crate::evaluation::job::{EvaluationHandle, JobOutcome, JobState, JobTicket};
use crate::metrics::METRICS;
use crate::obs;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Snapshot of one story's slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryStatus {
    pub story_key: StoryKey,
    pub state: JobState,
    /// Last successful rating; kept when later attempts fail.
    pub latest: Option<EvaluationResult>,
    pub last_failure: Option<String>,
    /// Job id of the running evaluation, if any.
    pub in_flight: Option<Uuid>,
}

struct InFlight {
    sequence: u64,
    handle: EvaluationHandle,
    outcome_tx: watch::Sender<Option<JobOutcome>>,
    cancel_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct StorySlot {
    state: JobState,
    in_flight: Option<InFlight>,
    latest: Option<EvaluationResult>,
    last_failure: Option<String>,
}

impl StorySlot {
    /// Detach the in-flight job if it is the one numbered `sequence`.
    fn take_current(&mut self, sequence: u64) -> Option<InFlight> {
        match &self.in_flight {
            Some(current) if current.sequence == sequence => self.in_flight.take(),
            _ => None,
        }
    }
}

/// Result of asking the store for a job.
pub(crate) enum Claim {
    /// Nothing was running; the caller must spawn the job for `ticket`.
    Started {
        ticket: JobTicket,
        handle: EvaluationHandle,
    },
    /// A job was already running; here is its handle.
    Joined(EvaluationHandle),
}

/// Single owner of all evaluation state.
pub struct EvaluationStore {
    slots: Mutex<HashMap<StoryKey, StorySlot>>,
    batches: Mutex<HashMap<Uuid, Vec<(StoryKey, u64)>>>,
    next_sequence: AtomicU64,
    events: broadcast::Sender<EvaluationEvent>,
}

impl Default for EvaluationStore {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EvaluationStore {
    /// `event_capacity` bounds how far a slow event subscriber may lag.
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            slots: Mutex::new(HashMap::new()),
            batches: Mutex::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
            events,
        }
    }

    // Slot updates never panic midway, so a poisoned lock still guards
    // consistent data.
    fn slots(&self) -> MutexGuard<'_, HashMap<StoryKey, StorySlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn batches(&self) -> MutexGuard<'_, HashMap<Uuid, Vec<(StoryKey, u64)>>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: EvaluationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Receive every lifecycle event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EvaluationEvent> {
        self.events.subscribe()
    }

    /// Start a job for `key`, or join the one already running.
    pub(crate) fn claim(&self, key: &StoryKey) -> Claim {
        let mut slots = self.slots();
        let slot = slots.entry(key.clone()).or_default();

        if let Some(current) = &slot.in_flight {
            let handle = current.handle.clone();
            drop(slots);
            METRICS.inc_joined();
            obs::emit_evaluation_joined(key, handle.job_id());
            return Claim::Joined(handle);
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let job_id = Uuid::new_v4();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = EvaluationHandle::new(job_id, key.clone(), sequence, outcome_rx);

        slot.state = JobState::Evaluating;
        slot.in_flight = Some(InFlight {
            sequence,
            handle: handle.clone(),
            outcome_tx,
            cancel_tx,
        });
        drop(slots);

        METRICS.inc_started();
        obs::emit_evaluation_started(key, job_id, sequence);
        self.publish(EvaluationEvent::Started {
            story_key: key.clone(),
            job_id,
        });

        Claim::Started {
            ticket: JobTicket {
                story_key: key.clone(),
                job_id,
                sequence,
                cancel: cancel_rx,
            },
            handle,
        }
    }

    /// Record a successful rating. Returns `false` if the completion was
    /// stale and discarded.
    pub(crate) fn complete(&self, result: EvaluationResult) -> EvalResult<bool> {
        let key = result.story_key.clone();
        let sequence = result.sequence;

        let mut slots = self.slots();
        let slot = slots.get_mut(&key).ok_or_else(|| {
            EvaluationError::Invariant(format!("completion for unknown story {key}"))
        })?;
        let Some(finished) = slot.take_current(sequence) else {
            drop(slots);
            self.discard_stale(&key, sequence);
            return Ok(false);
        };
        slot.state = JobState::Rated;
        slot.latest = Some(result.clone());
        slot.last_failure = None;
        drop(slots);

        let job_id = finished.handle.job_id();
        let overall_score = result.overall_score;

        METRICS.inc_rated();
        obs::emit_evaluation_rated(&key, job_id, overall_score);
        self.publish(EvaluationEvent::Rated {
            story_key: key,
            job_id,
            overall_score,
        });
        finished
            .outcome_tx
            .send_replace(Some(JobOutcome::Rated { result }));
        Ok(true)
    }

    /// Record a failed attempt. The previous rating, if any, is kept.
    pub(crate) fn fail(&self, key: &StoryKey, sequence: u64, reason: String) -> EvalResult<bool> {
        let mut slots = self.slots();
        let slot = slots.get_mut(key).ok_or_else(|| {
            EvaluationError::Invariant(format!("failure for unknown story {key}"))
        })?;
        let Some(finished) = slot.take_current(sequence) else {
            drop(slots);
            self.discard_stale(key, sequence);
            return Ok(false);
        };
        slot.state = JobState::Failed {
            reason: reason.clone(),
        };
        slot.last_failure = Some(reason.clone());
        drop(slots);

        let job_id = finished.handle.job_id();

        METRICS.inc_failed();
        obs::emit_evaluation_failed(key, job_id, &reason);
        self.publish(EvaluationEvent::Failed {
            story_key: key.clone(),
            job_id,
            reason: reason.clone(),
        });
        finished
            .outcome_tx
            .send_replace(Some(JobOutcome::Failed { reason }));
        Ok(true)
    }

    fn discard_stale(&self, key: &StoryKey, sequence: u64) {
        METRICS.inc_stale();
        obs::emit_stale_discarded(key, sequence);
    }

    /// Cancel the running job for `key`. Returns whether one was running.
    pub fn cancel_story(&self, key: &StoryKey) -> bool {
        let mut slots = self.slots();
        let cancelled = match slots.get_mut(key) {
            Some(slot) => {
                let taken = slot.in_flight.take();
                if taken.is_some() {
                    slot.state = JobState::Idle;
                }
                taken
            }
            None => None,
        };
        drop(slots);

        match cancelled {
            Some(job) => {
                self.finish_cancelled(key, job);
                true
            }
            None => false,
        }
    }

    /// Cancel `key` only if job `sequence` is still the one running.
    fn cancel_if_current(&self, key: &StoryKey, sequence: u64) -> bool {
        let mut slots = self.slots();
        let cancelled = slots.get_mut(key).and_then(|slot| {
            let taken = slot.take_current(sequence);
            if taken.is_some() {
                slot.state = JobState::Idle;
            }
            taken
        });
        drop(slots);

        match cancelled {
            Some(job) => {
                self.finish_cancelled(key, job);
                true
            }
            None => false,
        }
    }

    fn finish_cancelled(&self, key: &StoryKey, job: InFlight) {
        let job_id = job.handle.job_id();
        job.cancel_tx.send_replace(true);

        METRICS.inc_cancelled();
        obs::emit_evaluation_cancelled(key, job_id);
        self.publish(EvaluationEvent::Cancelled {
            story_key: key.clone(),
            job_id,
        });
        job.outcome_tx.send_replace(Some(JobOutcome::Cancelled));
    }

    pub(crate) fn register_batch(&self, batch_id: Uuid, members: Vec<(StoryKey, u64)>) {
        self.batches().insert(batch_id, members);
    }

    pub(crate) fn forget_batch(&self, batch_id: Uuid) {
        self.batches().remove(&batch_id);
    }

    /// Cancel every job of a batch that is still running. Jobs that already
    /// ended, or that were superseded by a newer request, are left alone.
    pub fn cancel_batch(&self, batch_id: Uuid) -> usize {
        let members = self.batches().get(&batch_id).cloned().unwrap_or_default();
        members
            .iter()
            .filter(|(key, sequence)| self.cancel_if_current(key, *sequence))
            .count()
    }

    /// Latest successful rating for a story.
    pub fn result(&self, key: &StoryKey) -> Option<EvaluationResult> {
        self.slots().get(key).and_then(|slot| slot.latest.clone())
    }

    pub fn status(&self, key: &StoryKey) -> StoryStatus {
        let slots = self.slots();
        match slots.get(key) {
            Some(slot) => StoryStatus {
                story_key: key.clone(),
                state: slot.state.clone(),
                latest: slot.latest.clone(),
                last_failure: slot.last_failure.clone(),
                in_flight: slot.in_flight.as_ref().map(|f| f.handle.job_id()),
            },
            None => StoryStatus {
                story_key: key.clone(),
                state: JobState::Idle,
                latest: None,
                last_failure: None,
                in_flight: None,
            },
        }
    }

    /// Latest ratings of every story in a project, ordered by key.
    pub fn results_for_project(&self, project_key: &str) -> Vec<EvaluationResult> {
        let mut results: Vec<EvaluationResult> = self
            .slots()
            .iter()
            .filter(|(key, _)| key.project_key() == project_key)
            .filter_map(|(_, slot)| slot.latest.clone())
            .collect();
        results.sort_by(|a, b| a.story_key.cmp(&b.story_key));
        results
    }

    pub fn in_flight_count(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| slot.in_flight.is_some())
            .count()
    }
}
