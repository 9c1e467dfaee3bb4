//! Coalescing trigger (debounce)

use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Holds at most one pending deadline. Scheduling again before it fires
/// replaces it, so a burst of events produces a single invocation once the
/// source has been quiet for `delay`.
#[derive(Debug)]
pub struct CoalescingTrigger {
    delay: Duration,
    deadline: Option<Instant>,
}

impl CoalescingTrigger {
    /// Create an idle trigger
    pub fn new(delay: Duration) -> Self {
        CoalescingTrigger {
            delay,
            deadline: None,
        }
    }

    /// Quiet period before firing
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)arm the trigger, replacing any pending deadline
    pub fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    /// Whether a deadline is pending
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolve once the pending deadline passes; never resolves while idle.
    ///
    /// Cancel safe: dropping the future keeps the deadline armed.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
