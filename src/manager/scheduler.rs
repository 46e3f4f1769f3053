//! RefreshScheduler: owned timer resource of the RingManager
//!
//! Holds at most one periodic task. Starting replaces (and aborts) the
//! previous one; cancelling is idempotent and also happens on drop.
//! One-shot timers are fire-and-forget.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

#[derive(Default)]
pub struct RefreshScheduler {
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tick` every `period`, first run one period from now
    pub fn start_periodic<F, Fut>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut timer = time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;
                tick().await;
            }
        });

        let previous = self
            .periodic
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop the periodic task; returns whether one was running
    pub fn cancel(&self) -> bool {
        let handle = self
            .periodic
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.periodic
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Run `task` once after `delay`
    pub fn schedule_once<Fut>(&self, delay: Duration, task: Fut) -> JoinHandle<()>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            time::sleep(delay).await;
            task.await;
        })
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
