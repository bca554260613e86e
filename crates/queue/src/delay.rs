//! Delay queue with per-job dedup identity.
//!
//! Holds job markers keyed by id (`job:<category>:<batch-key>`) with a
//! scheduled fire time. `schedule` is a compare-and-add: a second call
//! with the same id is a no-op and does not reset the fire time. Fired
//! markers are visible to one worker at a time; if that worker dies
//! without completing, the marker becomes claimable again after the
//! visibility timeout.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::error::QueueError;

/// Job data carried from producer to worker alongside the marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// Category wire string (`doc-change` / `comment`).
    pub category: String,
    /// Batch key the marker coalesces under.
    pub batch_key: String,
    /// Producer-supplied context, logged when the marker fires.
    #[serde(default)]
    pub log_meta: serde_json::Value,
    /// Set by the engine after a non-empty drain; `None` means the
    /// marker ends after completion.
    #[serde(default)]
    pub reschedule_delay_ms: Option<u64>,
}

impl JobEnvelope {
    pub fn reschedule_delay(&self) -> Option<Duration> {
        self.reschedule_delay_ms.map(Duration::from_millis)
    }
}

/// Outcome of a `schedule` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A new marker was created.
    Added,
    /// A marker with this id already exists; nothing changed.
    AlreadyPresent,
}

/// A fired marker handed to exactly one worker.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job_id: String,
    pub envelope: JobEnvelope,
}

/// Trait for delay queue backends.
#[async_trait]
pub trait DelayQueue: Send + Sync {
    /// Compare-and-add a marker. If a job with `job_id` already exists
    /// the call is a no-op (the existing fire time is kept).
    async fn schedule(
        &self,
        job_id: &str,
        envelope: JobEnvelope,
        delay: Duration,
    ) -> Result<ScheduleOutcome, QueueError>;

    /// Block until a due marker can be claimed for `worker_id`.
    ///
    /// The claim is exclusive until `complete` or until the visibility
    /// timeout elapses, whichever comes first.
    async fn claim(&self, worker_id: &str) -> Result<ClaimedJob, QueueError>;

    /// Acknowledge a fired marker. With `reschedule` the same marker is
    /// re-armed to fire after that delay; without, the marker ends.
    async fn complete(&self, job_id: &str, reschedule: Option<Duration>)
        -> Result<(), QueueError>;
}

struct Claim {
    worker_id: String,
    visible_again_at: Instant,
}

struct JobState {
    envelope: JobEnvelope,
    fire_at: Instant,
    claim: Option<Claim>,
}

impl JobState {
    /// Earliest instant at which a worker may claim this job.
    fn available_at(&self) -> Instant {
        match &self.claim {
            None => self.fire_at,
            Some(c) => self.fire_at.max(c.visible_again_at),
        }
    }
}

/// In-process delay queue driven by the tokio clock, so paused-clock
/// tests are deterministic.
pub struct MemoryDelayQueue {
    jobs: Mutex<HashMap<String, JobState>>,
    wake: Notify,
    visibility_timeout: Duration,
}

impl MemoryDelayQueue {
    pub fn new() -> Self {
        Self::with_visibility_timeout(Duration::from_secs(600))
    }

    /// Visibility timeout bounds how long a dead worker can hold a
    /// claim; it must exceed the longest handler deadline.
    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            wake: Notify::new(),
            visibility_timeout,
        }
    }

    /// Number of markers currently held (any state). Test hook.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

impl Default for MemoryDelayQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DelayQueue for MemoryDelayQueue {
    async fn schedule(
        &self,
        job_id: &str,
        envelope: JobEnvelope,
        delay: Duration,
    ) -> Result<ScheduleOutcome, QueueError> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(job_id) {
            return Ok(ScheduleOutcome::AlreadyPresent);
        }
        jobs.insert(
            job_id.to_string(),
            JobState {
                envelope,
                fire_at: Instant::now() + delay,
                claim: None,
            },
        );
        drop(jobs);
        // notify_one stores a permit when no worker is parked, so a
        // schedule racing a worker's park/unpark cannot be missed.
        self.wake.notify_one();
        Ok(ScheduleOutcome::Added)
    }

    async fn claim(&self, worker_id: &str) -> Result<ClaimedJob, QueueError> {
        loop {
            let next_wake = {
                let mut jobs = self.jobs.lock().await;
                let now = Instant::now();

                let due_id = jobs
                    .iter()
                    .filter(|(_, job)| job.available_at() <= now)
                    .min_by_key(|(_, job)| job.fire_at)
                    .map(|(id, _)| id.clone());

                if let Some(id) = due_id {
                    if let Some(job) = jobs.get_mut(&id) {
                        if let Some(prev) = &job.claim {
                            tracing::warn!(
                                job_id = %id,
                                previous_worker = %prev.worker_id,
                                "reclaiming marker whose visibility timeout elapsed"
                            );
                        }
                        job.claim = Some(Claim {
                            worker_id: worker_id.to_string(),
                            visible_again_at: now + self.visibility_timeout,
                        });
                        return Ok(ClaimedJob {
                            job_id: id,
                            envelope: job.envelope.clone(),
                        });
                    }
                }

                jobs.values().map(JobState::available_at).min()
            };

            match next_wake {
                Some(at) => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => self.wake.notified().await,
            }
        }
    }

    async fn complete(
        &self,
        job_id: &str,
        reschedule: Option<Duration>,
    ) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().await;
        match reschedule {
            Some(delay) => {
                if let Some(job) = jobs.get_mut(job_id) {
                    job.fire_at = Instant::now() + delay;
                    job.claim = None;
                    drop(jobs);
                    self.wake.notify_one();
                } else {
                    tracing::debug!(job_id, "complete for unknown marker ignored");
                }
            }
            None => {
                if jobs.remove(job_id).is_none() {
                    tracing::debug!(job_id, "complete for unknown marker ignored");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(category: &str, key: &str) -> JobEnvelope {
        JobEnvelope {
            category: category.to_string(),
            batch_key: key.to_string(),
            log_meta: serde_json::Value::Null,
            reschedule_delay_ms: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_is_compare_and_add() {
        let queue = MemoryDelayQueue::new();
        let out = queue
            .schedule("job:comment:d:1", envelope("comment", "d:1"), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(out, ScheduleOutcome::Added);

        // Second call must neither fail nor reset the fire time.
        let out = queue
            .schedule("job:comment:d:1", envelope("comment", "d:1"), Duration::from_secs(999))
            .await
            .unwrap();
        assert_eq!(out, ScheduleOutcome::AlreadyPresent);

        tokio::time::advance(Duration::from_secs(31)).await;
        let claimed = queue.claim("w1").await.unwrap();
        assert_eq!(claimed.job_id, "job:comment:d:1");
    }

    #[tokio::test(start_paused = true)]
    async fn claim_blocks_until_due() {
        let queue = std::sync::Arc::new(MemoryDelayQueue::new());
        queue
            .schedule("job:comment:d:2", envelope("comment", "d:2"), Duration::from_secs(30))
            .await
            .unwrap();

        let q = queue.clone();
        let start = Instant::now();
        let claimed = tokio::spawn(async move { q.claim("w1").await.unwrap() })
            .await
            .unwrap();
        assert_eq!(claimed.envelope.batch_key, "d:2");
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn claimed_marker_invisible_to_other_workers() {
        let queue = std::sync::Arc::new(MemoryDelayQueue::new());
        queue
            .schedule("job:comment:d:3", envelope("comment", "d:3"), Duration::from_millis(1))
            .await
            .unwrap();
        queue
            .schedule("job:comment:d:4", envelope("comment", "d:4"), Duration::from_millis(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(2)).await;
        let first = queue.claim("w1").await.unwrap();
        let second = queue.claim("w2").await.unwrap();
        assert_ne!(first.job_id, second.job_id);
    }

    #[tokio::test(start_paused = true)]
    async fn visibility_timeout_redelivers() {
        let queue = MemoryDelayQueue::with_visibility_timeout(Duration::from_secs(60));
        queue
            .schedule("job:comment:d:5", envelope("comment", "d:5"), Duration::from_millis(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(2)).await;
        let first = queue.claim("w1").await.unwrap();
        // w1 never completes; after the visibility timeout another
        // worker picks the marker up again.
        let second = queue.claim("w2").await.unwrap();
        assert_eq!(first.job_id, second.job_id);
    }

    #[tokio::test(start_paused = true)]
    async fn complete_with_reschedule_rearms() {
        let queue = MemoryDelayQueue::new();
        queue
            .schedule("job:comment:d:6", envelope("comment", "d:6"), Duration::from_millis(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(2)).await;
        let claimed = queue.claim("w1").await.unwrap();
        queue
            .complete(&claimed.job_id, Some(Duration::from_secs(180)))
            .await
            .unwrap();

        // Still present, but not claimable before the throttle elapses.
        assert_eq!(queue.len().await, 1);
        let start = Instant::now();
        let again = queue.claim("w1").await.unwrap();
        assert_eq!(again.job_id, claimed.job_id);
        assert!(start.elapsed() >= Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn complete_without_reschedule_removes() {
        let queue = MemoryDelayQueue::new();
        queue
            .schedule("job:comment:d:7", envelope("comment", "d:7"), Duration::from_millis(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(2)).await;
        let claimed = queue.claim("w1").await.unwrap();
        queue.complete(&claimed.job_id, None).await.unwrap();
        assert!(queue.is_empty().await);

        // The id is free again: a fresh schedule creates a new marker.
        let out = queue
            .schedule("job:comment:d:7", envelope("comment", "d:7"), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(out, ScheduleOutcome::Added);
    }

    #[tokio::test]
    async fn complete_unknown_marker_is_harmless() {
        let queue = MemoryDelayQueue::new();
        queue.complete("job:comment:nope", None).await.unwrap();
        queue
            .complete("job:comment:nope", Some(Duration::from_secs(1)))
            .await
            .unwrap();
    }
}
