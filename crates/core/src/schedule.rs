//! Per-category delivery schedules.
//!
//! Each notification category has a `first_delay` (applied when a
//! marker is created for an empty batch) and a `throttle` (minimum
//! spacing between successive deliveries for the same marker).
//! The registry is an immutable value built once at startup and handed
//! to the engine by constructor injection; tests override schedules by
//! constructing their own registry before wiring components.

use std::time::Duration;

use crate::config::SchedulesConfig;
use crate::types::Category;

/// Delivery timing for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Delay before the first delivery after a drained state.
    pub first_delay: Duration,
    /// Minimum spacing between successive deliveries.
    pub throttle: Duration,
}

impl Schedule {
    pub const fn new(first_delay: Duration, throttle: Duration) -> Self {
        Self { first_delay, throttle }
    }

    /// Deadline for a single handler invocation: `throttle − ε`,
    /// floored at one second so tiny test throttles still get a
    /// usable window.
    pub fn handler_deadline(&self) -> Duration {
        const EPSILON: Duration = Duration::from_secs(5);
        self.throttle
            .checked_sub(EPSILON)
            .filter(|d| *d >= Duration::from_secs(1))
            .unwrap_or(Duration::from_secs(1))
    }
}

/// Immutable map from category to its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRegistry {
    doc_change: Schedule,
    comment: Schedule,
}

impl ScheduleRegistry {
    pub const fn new(doc_change: Schedule, comment: Schedule) -> Self {
        Self { doc_change, comment }
    }

    pub fn from_config(cfg: &SchedulesConfig) -> Self {
        Self {
            doc_change: Schedule::new(
                Duration::from_millis(cfg.doc_change.first_delay_ms),
                Duration::from_millis(cfg.doc_change.throttle_ms),
            ),
            comment: Schedule::new(
                Duration::from_millis(cfg.comment.first_delay_ms),
                Duration::from_millis(cfg.comment.throttle_ms),
            ),
        }
    }

    pub fn get(&self, category: Category) -> &Schedule {
        match category {
            Category::DocChange => &self.doc_change,
            Category::Comment => &self.comment,
        }
    }
}

impl Default for ScheduleRegistry {
    /// Production defaults: doc-change 60s/300s, comment 30s/180s.
    fn default() -> Self {
        Self::new(
            Schedule::new(Duration::from_secs(60), Duration::from_secs(300)),
            Schedule::new(Duration::from_secs(30), Duration::from_secs(180)),
        )
    }
}
