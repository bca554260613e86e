//! Batched-jobs engine.
//!
//! Producers call [`BatchedJobs::add`] to append a payload under a
//! `(category, batch-key)` marker; workers claim fired markers, drain
//! the accumulated batch, and invoke the installed handler. A marker
//! fires once after `first_delay`, then no faster than `throttle` for
//! as long as payloads keep arriving; a fire that drains nothing ends
//! the marker, and the next `add` restarts the cycle.
//!
//! Delivery is drain-then-handle: payloads are popped before the
//! handler runs. If the handler fails or exceeds its deadline, the
//! drained batch is re-appended and retried at the next fire, so
//! nothing is lost while the process lives. A crash between drain and
//! re-append loses that one batch (at-most-once under crash).

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::Notify;

use docpost_core::{Category, DocpostError, ScheduleRegistry};

use crate::delay::{ClaimedJob, DelayQueue, JobEnvelope, ScheduleOutcome};
use crate::error::QueueError;
use crate::store::BatchStore;

/// Opaque per-event record, encoded by the producer.
pub type Payload = Vec<u8>;

/// Consumes a drained batch. Installed exactly once per process.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(
        &self,
        category: Category,
        batch_key: &str,
        payloads: Vec<Payload>,
    ) -> Result<(), DocpostError>;
}

fn job_id(category: Category, batch_key: &str) -> String {
    format!("job:{}:{}", category, batch_key)
}

fn payload_key(job_id: &str) -> String {
    format!("payload:{job_id}")
}

/// Multi-producer, multi-worker batching engine over a shared batch
/// store and delay queue.
pub struct BatchedJobs {
    store: Arc<dyn BatchStore>,
    queue: Arc<dyn DelayQueue>,
    registry: ScheduleRegistry,
    handler: OnceLock<Arc<dyn BatchHandler>>,
}

impl BatchedJobs {
    pub fn new(
        store: Arc<dyn BatchStore>,
        queue: Arc<dyn DelayQueue>,
        registry: ScheduleRegistry,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
            handler: OnceLock::new(),
        }
    }

    /// Install the batch handler. Errors if one is already installed.
    pub fn set_handler(&self, handler: Arc<dyn BatchHandler>) -> Result<(), QueueError> {
        self.handler
            .set(handler)
            .map_err(|_| QueueError::HandlerInstalled)
    }

    /// Append `payload` under `(category, batch_key)` and ensure a
    /// marker exists for it.
    ///
    /// The marker create is a compare-and-add on the delay queue: when
    /// a marker is already pending (or currently claimed by a worker)
    /// the existing fire time is kept, which is what coalesces bursts
    /// into one delivery.
    pub async fn add(
        &self,
        category: Category,
        batch_key: &str,
        log_meta: serde_json::Value,
        payload: Payload,
    ) -> Result<(), QueueError> {
        let schedule = self.registry.get(category);
        let jid = job_id(category, batch_key);
        self.store.append(&payload_key(&jid), payload).await?;

        let envelope = JobEnvelope {
            category: category.as_str().to_string(),
            batch_key: batch_key.to_string(),
            log_meta,
            reschedule_delay_ms: None,
        };
        match self
            .queue
            .schedule(&jid, envelope, schedule.first_delay)
            .await?
        {
            ScheduleOutcome::Added => {
                tracing::debug!(job_id = %jid, delay_ms = schedule.first_delay.as_millis() as u64, "marker created");
            }
            ScheduleOutcome::AlreadyPresent => {}
        }
        Ok(())
    }

    /// Claim-and-fire loop for one worker. Returns when `shutdown` is
    /// notified.
    pub async fn run_worker(&self, worker_id: &str, shutdown: Arc<Notify>) {
        tracing::info!(worker_id, "batch worker started");
        loop {
            let claimed = tokio::select! {
                _ = shutdown.notified() => break,
                claimed = self.queue.claim(worker_id) => claimed,
            };
            let claimed = match claimed {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(worker_id, error = %e, "claim failed");
                    continue;
                }
            };
            if let Err(e) = self.fire(claimed).await {
                tracing::warn!(worker_id, error = %e, "marker processing failed");
            }
        }
        tracing::info!(worker_id, "batch worker stopped");
    }

    /// Process one fired marker: drain, invoke handler, reschedule.
    async fn fire(&self, mut claimed: ClaimedJob) -> Result<(), QueueError> {
        let Some(category) = Category::parse(&claimed.envelope.category) else {
            tracing::warn!(
                job_id = %claimed.job_id,
                category = %claimed.envelope.category,
                "unknown category; discarding job"
            );
            return self.queue.complete(&claimed.job_id, None).await;
        };
        let schedule = self.registry.get(category);
        let store_key = payload_key(&claimed.job_id);

        let payloads = self.store.drain(&store_key).await?;
        if payloads.is_empty() {
            // A fire that drains nothing ends the marker; the next
            // add restarts the cycle with first_delay.
            self.queue.complete(&claimed.job_id, None).await?;
            // An add racing the removal may have appended after our
            // drain. Best-effort recheck so its payload is not left
            // without a marker.
            if self.store.exists(&store_key).await? {
                let envelope = JobEnvelope {
                    category: claimed.envelope.category.clone(),
                    batch_key: claimed.envelope.batch_key.clone(),
                    log_meta: claimed.envelope.log_meta.clone(),
                    reschedule_delay_ms: None,
                };
                self.queue
                    .schedule(&claimed.job_id, envelope, schedule.first_delay)
                    .await?;
            }
            return Ok(());
        }

        // Non-empty drain: the marker survives and fires again no
        // sooner than `throttle` from now.
        claimed.envelope.reschedule_delay_ms = Some(schedule.throttle.as_millis() as u64);

        let outcome = match self.handler.get() {
            None => Err(QueueError::NoHandler),
            Some(handler) => {
                tracing::info!(
                    job_id = %claimed.job_id,
                    batch_size = payloads.len(),
                    meta = %claimed.envelope.log_meta,
                    "firing batch"
                );
                let deadline = schedule.handler_deadline();
                match tokio::time::timeout(
                    deadline,
                    handler.handle(category, &claimed.envelope.batch_key, payloads.clone()),
                )
                .await
                {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(QueueError::Handler(e.to_string())),
                    Err(_) => Err(QueueError::Deadline(deadline.as_millis() as u64)),
                }
            }
        };

        if let Err(e) = &outcome {
            tracing::warn!(
                job_id = %claimed.job_id,
                batch_size = payloads.len(),
                error = %e,
                "handler failed; batch re-staged for next fire"
            );
            // Re-append the drained batch so it rides the rescheduled
            // marker. Payloads appended concurrently during the
            // handler run land ahead of these in the list.
            for payload in payloads {
                self.store.append(&store_key, payload).await?;
            }
        } else {
            tracing::info!(job_id = %claimed.job_id, "batch handled");
        }

        self.queue
            .complete(&claimed.job_id, claimed.envelope.reschedule_delay())
            .await
    }
}
