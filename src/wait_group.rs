// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Outstanding Work Tracking
//!
//! [`WaitGroup`] counts handler invocations that are in flight and lets the
//! shutdown sequence wait until none are left.
//!
//! The count lives in an atomic and transitions to zero are broadcast through a
//! [`Notify`]. A waiter registers interest before it reads the count, so a
//! `leave()` racing with `wait()` cannot be missed.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::Notify;
use tracing::warn;

/// Counter of in-flight work with a "drained" signal.
#[derive(Debug, Default)]
pub struct WaitGroup {
    count: AtomicUsize,
    drained: Notify,
}

impl WaitGroup {
    /// Creates a drained wait group.
    pub fn new() -> WaitGroup {
        WaitGroup::default()
    }

    /// Records the start of one unit of work.
    pub fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Records the end of one unit of work, waking every waiter when the count
    /// reaches zero.
    ///
    /// A `leave()` without a matching `enter()` is ignored.
    pub fn leave(&self) {
        match self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_sub(1))
        {
            Ok(1) => self.drained.notify_waiters(),
            Ok(_) => {}
            Err(_) => warn!("wait group left without a matching enter"),
        }
    }

    /// Number of units of work currently in flight.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Whether no unit of work is in flight.
    pub fn is_drained(&self) -> bool {
        self.count() == 0
    }

    /// Waits until the count is zero.
    ///
    /// Returns immediately when nothing is in flight. Otherwise returns on the
    /// next transition to zero, even if new work enters before the waiter is
    /// polled again.
    pub async fn wait(&self) {
        let notified = self.drained.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_drained() {
            return;
        }

        notified.await;
    }

    /// Enters the group and returns a guard that leaves it when dropped.
    pub fn guard(self: &Arc<Self>) -> WaitGroupGuard {
        self.enter();
        WaitGroupGuard {
            group: self.clone(),
        }
    }
}

/// Leaves its [`WaitGroup`] on drop.
#[derive(Debug)]
pub struct WaitGroupGuard {
    group: Arc<WaitGroup>,
}

impl Drop for WaitGroupGuard {
    fn drop(&mut self) {
        self.group.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn wait_returns_immediately_when_empty() {
        let wg = WaitGroup::new();

        assert!(timeout(SHORT, wg.wait()).await.is_ok());
    }

    #[tokio::test]
    async fn wait_blocks_until_every_enter_has_left() {
        let wg = Arc::new(WaitGroup::new());
        wg.enter();
        wg.enter();

        let waiter = tokio::spawn({
            let wg = wg.clone();
            async move { wg.wait().await }
        });

        wg.leave();
        tokio::time::sleep(SHORT).await;
        assert!(!waiter.is_finished());
        assert_eq!(wg.count(), 1);

        wg.leave();
        assert!(timeout(SHORT, waiter).await.is_ok());
        assert!(wg.is_drained());
    }

    #[tokio::test]
    async fn wakeup_is_not_lost_when_leave_races_wait() {
        for _ in 0..100 {
            let wg = Arc::new(WaitGroup::new());
            wg.enter();

            let leaver = tokio::spawn({
                let wg = wg.clone();
                async move { wg.leave() }
            });

            assert!(timeout(Duration::from_secs(1), wg.wait()).await.is_ok());
            leaver.await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_guards_drain_to_zero() {
        let wg = Arc::new(WaitGroup::new());
        let mut tasks = vec![];

        for i in 0..32 {
            let guard = wg.guard();
            tasks.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(i % 5)).await;
                drop(guard);
            }));
        }

        assert!(timeout(Duration::from_secs(2), wg.wait()).await.is_ok());
        assert_eq!(wg.count(), 0);
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[test]
    fn unmatched_leave_keeps_count_at_zero() {
        let wg = WaitGroup::new();

        wg.leave();

        assert_eq!(wg.count(), 0);
        wg.enter();
        assert_eq!(wg.count(), 1);
    }
}
