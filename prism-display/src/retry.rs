//! Background retry loop for failed reverts
//!
//! When a revert fails (a display got unplugged mid-session, a transient
//! driver error) the journal stays on disk and this timer keeps retrying on
//! a fixed cadence until the system is back in its original state or the
//! timer is disarmed.
//!
//! The timer deadline lives inside [`SettingsEngine`], so every operation
//! on it (arming, disarming, the worker's due-check and reschedule) happens
//! under the same mutex that serializes apply and revert. At any instant at
//! most one thread is inside the engine.

use crate::settings::SettingsEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

/// Cadence between revert attempts.
const RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Single background worker sharing the engine mutex with the facade, so a
/// retry never overlaps a foreground apply or revert.
pub(crate) struct RetryTimer {
    notify: Arc<Notify>,
    worker: JoinHandle<()>,
}

impl RetryTimer {
    pub(crate) fn spawn(settings: Arc<Mutex<SettingsEngine>>) -> Self {
        let notify = Arc::new(Notify::new());
        let worker = tokio::spawn(run(Arc::clone(&notify), settings));
        Self { notify, worker }
    }

    /// Schedules a revert attempt one interval from now. The caller already
    /// holds the engine lock, so the worker cannot observe a half-updated
    /// schedule.
    pub(crate) fn arm(&self, engine: &mut SettingsEngine) {
        engine.next_wake_up = Some(Instant::now() + RETRY_INTERVAL);
        self.notify.notify_one();
        debug!("revert retry timer armed");
    }

    /// Cancels any scheduled attempt.
    pub(crate) fn disarm(&self, engine: &mut SettingsEngine) {
        let disarmed = engine.next_wake_up.take().is_some();
        self.notify.notify_one();
        if disarmed {
            debug!("revert retry timer disarmed");
        }
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run(notify: Arc<Notify>, settings: Arc<Mutex<SettingsEngine>>) {
    loop {
        let deadline = settings.lock().await.next_wake_up;
        let Some(deadline) = deadline else {
            notify.notified().await;
            continue;
        };

        tokio::select! {
            _ = sleep_until(deadline) => {}
            // The schedule changed; start over with the new deadline.
            _ = notify.notified() => continue,
        }

        let mut engine = settings.lock().await;

        // The deadline may have been cleared or moved while waiting for the
        // engine lock; this re-check guards against such spurious wake-ups.
        let still_due = matches!(engine.next_wake_up, Some(deadline) if deadline <= Instant::now());
        if !still_due {
            continue;
        }

        info!("retrying to revert display settings");
        let reverted = engine.revert_settings().await;

        engine.next_wake_up = if reverted {
            None
        } else {
            Some(Instant::now() + RETRY_INTERVAL)
        };
    }
}
