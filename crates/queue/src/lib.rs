pub mod delay;
pub mod engine;
pub mod error;
pub mod store;

pub use delay::{ClaimedJob, DelayQueue, JobEnvelope, MemoryDelayQueue, ScheduleOutcome};
pub use engine::{BatchHandler, BatchedJobs, Payload};
pub use error::QueueError;
pub use store::{BatchStore, MemoryBatchStore};
