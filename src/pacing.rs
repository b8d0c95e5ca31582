//! Time budget and rate-limit pacing for the enrichment loop

use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Wall-clock budget for one invocation
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Starts the clock now.
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_exceeded(&self) -> bool {
        self.elapsed() >= self.budget
    }
}

/// Cooperative pauses between groups of completion calls.
///
/// Callers invoke the pause *between* groups, never before the first one.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    pub sub_batch_delay: Duration,
    pub batch_delay: Duration,
}

impl Pacer {
    pub const fn new(sub_batch_delay: Duration, batch_delay: Duration) -> Self {
        Self {
            sub_batch_delay,
            batch_delay,
        }
    }

    /// No pauses at all
    pub const fn unpaced() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub async fn after_sub_batch(&self) {
        if !self.sub_batch_delay.is_zero() {
            sleep(self.sub_batch_delay).await;
        }
    }

    pub async fn after_batch(&self) {
        if !self.batch_delay.is_zero() {
            sleep(self.batch_delay).await;
        }
    }
}
