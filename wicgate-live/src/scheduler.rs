//! Recurring poll timer, recovery timer and the `init`/`stop` lifecycle.

use crate::store::{Control, LiveStore};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

impl LiveStore {
    /// Start polling. Refreshes immediately, then every poll interval.
    /// Calling it again while initialized does nothing.
    pub fn init(&self) {
        let mut control = self.control();
        if control.initialized {
            debug!("live store already initialized");
            return;
        }

        control.initialized = true;
        control.hidden = self.inner.environment.is_hidden();
        self.inner.state.send_modify(|s| s.is_initialized = true);

        self.install_listener(&mut control);
        if !control.hidden {
            self.start_poll_timer(&mut control);
        }
        let generation = control.generation;
        drop(control);

        info!(
            interval_secs = self.inner.config.poll_interval.as_secs(),
            "live store initialized"
        );
        self.spawn_fetch(generation);
    }

    /// Tear down timers and listeners and abort the in-flight refresh.
    /// Last-known servers, profiles and error are kept.
    pub fn stop(&self) {
        let mut control = self.control();
        if let Some(timer) = control.poll_timer.take() {
            timer.abort();
        }
        if let Some(timer) = control.recovery_timer.take() {
            timer.abort();
        }
        if let Some(listener) = control.listener.take() {
            listener.abort();
        }
        control.cancel_in_flight();
        control.generation += 1;
        control.hidden = false;
        let was_initialized = std::mem::replace(&mut control.initialized, false);
        drop(control);

        self.inner.state.send_if_modified(|s| {
            let changed = s.is_initialized;
            s.is_initialized = false;
            changed
        });
        if was_initialized {
            info!("live store stopped");
        }
    }

    /// Replace the recurring timer. First tick is one interval from now.
    pub(crate) fn start_poll_timer(&self, control: &mut Control) {
        if let Some(timer) = control.poll_timer.take() {
            timer.abort();
        }

        let period = self.inner.config.poll_interval;
        let generation = control.generation;
        let weak = Arc::downgrade(&self.inner);
        control.poll_timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                LiveStore { inner }.spawn_fetch(generation);
            }
        }));
        debug!("poll timer started");
    }

    /// Replace the recovery timer with a one-shot refresh one interval from now.
    pub(crate) fn arm_recovery_timer(&self, control: &mut Control) {
        if let Some(timer) = control.recovery_timer.take() {
            timer.abort();
        }

        control.recovery_epoch += 1;
        let epoch = control.recovery_epoch;
        let generation = control.generation;
        let delay = self.inner.config.poll_interval;
        let weak = Arc::downgrade(&self.inner);
        control.recovery_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let store = LiveStore { inner };
            {
                let mut control = store.control();
                if control.recovery_epoch == epoch {
                    control.recovery_timer = None;
                }
            }
            info!("attempting recovery refresh");
            store.fetch_for(generation).await;
        }));
        debug!(delay_secs = delay.as_secs(), "recovery timer armed");
    }
}
