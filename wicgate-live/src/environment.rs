//! Page visibility and connectivity signals, and how the store reacts to them.

use crate::store::{Control, LiveStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvSignal {
    /// The page stopped being visible.
    Hidden,
    /// The page became visible again.
    Visible,
    /// Network connectivity came back.
    Online,
}

/// Broadcast hub for [`EnvSignal`]s, plus the current visibility.
///
/// Clones share the same channel.
#[derive(Clone)]
pub struct Environment {
    signals: broadcast::Sender<EnvSignal>,
    hidden: Arc<AtomicBool>,
}

impl Environment {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(32);
        Self {
            signals,
            hidden: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::SeqCst)
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::SeqCst);
        self.emit(if hidden {
            EnvSignal::Hidden
        } else {
            EnvSignal::Visible
        });
    }

    pub fn notify_online(&self) {
        self.emit(EnvSignal::Online);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnvSignal> {
        self.signals.subscribe()
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.signals.receiver_count()
    }

    fn emit(&self, signal: EnvSignal) {
        if self.signals.send(signal).is_err() {
            debug!(?signal, "no listeners for environment signal");
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveStore {
    /// Subscribe to the environment; the handle is kept so `stop()` can drop it.
    pub(crate) fn install_listener(&self, control: &mut Control) {
        if let Some(listener) = control.listener.take() {
            listener.abort();
        }

        let mut signals = self.inner.environment.subscribe();
        let weak = Arc::downgrade(&self.inner);
        control.listener = Some(tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(signal) => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        LiveStore { inner }.handle_signal(signal);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "environment signals lagged, resyncing visibility");
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        let store = LiveStore { inner };
                        let signal = if store.inner.environment.is_hidden() {
                            EnvSignal::Hidden
                        } else {
                            EnvSignal::Visible
                        };
                        store.handle_signal(signal);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    pub(crate) fn handle_signal(&self, signal: EnvSignal) {
        let mut control = self.control();
        if !control.initialized {
            return;
        }

        match signal {
            EnvSignal::Hidden => {
                control.hidden = true;
                if let Some(timer) = control.poll_timer.take() {
                    timer.abort();
                    debug!("page hidden, polling paused");
                }
            }
            EnvSignal::Visible => {
                control.hidden = false;
                let online = self.inner.state.borrow().is_online;
                if control.poll_timer.is_none() && online {
                    self.start_poll_timer(&mut control);
                    let generation = control.generation;
                    drop(control);
                    debug!("page visible, resuming polling");
                    self.spawn_fetch(generation);
                }
            }
            EnvSignal::Online => {
                if let Some(timer) = control.recovery_timer.take() {
                    timer.abort();
                }
                // A hidden page keeps polling paused; Visible restarts it.
                if !control.hidden && control.poll_timer.is_none() {
                    self.start_poll_timer(&mut control);
                }
                let generation = control.generation;
                drop(control);
                info!("connectivity restored, refreshing");
                self.spawn_fetch(generation);
            }
        }
    }
}
