//! Periodic eviction of idle workflow slots.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::Dispatcher;

/// Sweeps the registry of a [`Dispatcher`] on a fixed period.
///
/// Slots are also expired lazily on access, so the sweep only bounds memory:
/// missing a tick never lets a stale slot act.
pub struct IdleReaper {
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl IdleReaper {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let interval = dispatcher.settings().reap_interval;
        Self {
            dispatcher,
            interval,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One sweep; returns the number of slots evicted.
    pub async fn run_once(&self) -> usize {
        let evicted = self.dispatcher.reap_idle_slots().await;
        if evicted > 0 {
            tracing::info!(evicted, "idle workflows evicted");
        } else {
            tracing::debug!("idle sweep found nothing to evict");
        }
        evicted
    }

    /// Runs forever on the current runtime. Abort the handle to stop it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            tracing::info!(interval_secs = self.interval.as_secs(), "idle reaper started");
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
