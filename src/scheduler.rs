//! Fire-and-forget timeout scheduling
//!
//! There is no cancellation: a timer armed for a candidate always fires,
//! and the engine's guard check decides whether the firing still matters.
//! Delivery is at-least-once; handlers must tolerate duplicates.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Scheduler {
    delay: Duration,
}

impl Scheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `task` after the configured delay.
    pub fn arm<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_arm_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(Duration::from_millis(20));

        let counter = Arc::clone(&fired);
        scheduler.arm(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_arm_does_not_block_caller() {
        let scheduler = Scheduler::new(Duration::from_secs(3600));
        scheduler.arm(async {});
        // Arming returns immediately even though the task sleeps for an hour
        assert_eq!(scheduler.delay(), Duration::from_secs(3600));
    }
}
