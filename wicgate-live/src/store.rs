//! Synchronization state and the public handle consumers hold.

use crate::environment::Environment;
use crate::models::{OnlineProfile, OnlineResponse, ServerEntry};
use crate::retry::{self, CycleResult, RetryPolicy};
use crate::source::OnlineSource;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polling cadence and retry behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Recurring refresh interval, also the delay before a recovery attempt.
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(90),
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything consumers render from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub servers: Vec<ServerEntry>,
    pub profiles: Vec<OnlineProfile>,
    /// Only true while the very first refresh is unsettled.
    pub loading: bool,
    pub error: Option<String>,
    pub is_online: bool,
    /// Unix milliseconds of the last successful refresh.
    pub last_fetched_at: Option<i64>,
    pub is_initialized: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            profiles: Vec::new(),
            loading: false,
            error: None,
            is_online: true,
            last_fetched_at: None,
            is_initialized: false,
        }
    }
}

impl SyncState {
    pub fn player_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn players_online(&self) -> bool {
        self.player_count() > 0
    }
}

/// How a call to [`LiveStore::fetch_data`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A new snapshot was applied.
    Refreshed,
    /// Every attempt failed; the error is in the state.
    Failed,
    /// Another refresh was already in flight.
    Skipped,
    /// Aborted by `stop()`; state untouched.
    Cancelled,
}

pub(crate) struct InFlight {
    id: u64,
    token: CancellationToken,
}

/// Scheduler bookkeeping. Never held across an `.await`.
#[derive(Default)]
pub(crate) struct Control {
    pub(crate) initialized: bool,
    pub(crate) hidden: bool,
    /// Bumped by `stop()`; refreshes queued under an older value never start.
    pub(crate) generation: u64,
    settled_once: bool,
    next_cycle: u64,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) poll_timer: Option<JoinHandle<()>>,
    pub(crate) recovery_timer: Option<JoinHandle<()>>,
    pub(crate) recovery_epoch: u64,
    pub(crate) listener: Option<JoinHandle<()>>,
}

impl Control {
    pub(crate) fn cancel_in_flight(&mut self) {
        if let Some(cycle) = self.in_flight.take() {
            cycle.token.cancel();
        }
    }
}

pub(crate) struct Inner {
    pub(crate) source: Arc<dyn OnlineSource>,
    pub(crate) config: SyncConfig,
    pub(crate) environment: Environment,
    pub(crate) state: watch::Sender<SyncState>,
    pub(crate) control: Mutex<Control>,
}

/// Handle to the live online-player data.
///
/// Cloning is cheap and every clone sees the same state. The owner calls
/// [`init`](Self::init) once and [`stop`](Self::stop) on teardown.
#[derive(Clone)]
pub struct LiveStore {
    pub(crate) inner: Arc<Inner>,
}

impl LiveStore {
    pub fn new(source: Arc<dyn OnlineSource>, config: SyncConfig, environment: Environment) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                environment,
                state,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn environment(&self) -> &Environment {
        &self.inner.environment
    }

    /// Copy of the current state.
    pub fn state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    pub fn servers(&self) -> Vec<ServerEntry> {
        self.inner.state.borrow().servers.clone()
    }

    pub fn profiles(&self) -> Vec<OnlineProfile> {
        self.inner.state.borrow().profiles.clone()
    }

    pub fn loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    pub fn is_online(&self) -> bool {
        self.inner.state.borrow().is_online
    }

    pub fn last_fetched_at(&self) -> Option<i64> {
        self.inner.state.borrow().last_fetched_at
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.borrow().is_initialized
    }

    pub fn player_count(&self) -> usize {
        self.inner.state.borrow().player_count()
    }

    pub fn players_online(&self) -> bool {
        self.inner.state.borrow().players_online()
    }

    /// Refresh now, retrying per the policy.
    ///
    /// Returns [`FetchOutcome::Skipped`] immediately when a refresh is already
    /// in flight. Never fails; errors land in the state.
    pub async fn fetch_data(&self) -> FetchOutcome {
        self.run_fetch(None).await
    }

    /// Refresh on behalf of the lifecycle started under `generation`.
    pub(crate) async fn fetch_for(&self, generation: u64) -> FetchOutcome {
        self.run_fetch(Some(generation)).await
    }

    async fn run_fetch(&self, generation: Option<u64>) -> FetchOutcome {
        let mut guard = match self.begin_cycle(generation) {
            Ok(guard) => guard,
            Err(outcome) => return outcome,
        };

        let result = retry::run_cycle(
            self.inner.source.as_ref(),
            &self.inner.config.retry,
            &guard.token,
        )
        .await;

        guard.armed = false;
        self.finish_cycle(guard.id, &guard.token, result)
    }

    /// Fire-and-forget refresh used by timers and signal handlers.
    ///
    /// The caller passes the generation it read under the control lock, so a
    /// task still queued when `stop()` runs does nothing.
    pub(crate) fn spawn_fetch(&self, generation: u64) {
        let store = self.clone();
        tokio::spawn(async move {
            store.fetch_for(generation).await;
        });
    }

    pub(crate) fn control(&self) -> MutexGuard<'_, Control> {
        self.inner
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_cycle(&self, generation: Option<u64>) -> Result<CycleGuard<'_>, FetchOutcome> {
        let mut control = self.control();
        if let Some(generation) = generation {
            if !control.initialized || control.generation != generation {
                debug!(generation, "store stopped, dropping queued refresh");
                return Err(FetchOutcome::Cancelled);
            }
        }
        if control.in_flight.is_some() {
            debug!("refresh already in flight, skipping");
            return Err(FetchOutcome::Skipped);
        }

        control.next_cycle += 1;
        let id = control.next_cycle;
        let token = CancellationToken::new();
        control.in_flight = Some(InFlight {
            id,
            token: token.clone(),
        });

        if !control.settled_once {
            self.inner.state.send_if_modified(|s| {
                let changed = !s.loading;
                s.loading = true;
                changed
            });
        }

        Ok(CycleGuard {
            store: self,
            id,
            token,
            armed: true,
        })
    }

    fn finish_cycle(&self, id: u64, token: &CancellationToken, result: CycleResult) -> FetchOutcome {
        let mut control = self.control();
        let owns_slot = control.in_flight.as_ref().is_some_and(|f| f.id == id);
        if owns_slot {
            control.in_flight = None;
        }
        if token.is_cancelled() || !owns_slot {
            debug!(cycle = id, "refresh cancelled");
            return FetchOutcome::Cancelled;
        }

        match result {
            CycleResult::Cancelled => {
                debug!(cycle = id, "refresh cancelled");
                FetchOutcome::Cancelled
            }
            CycleResult::Fetched(OnlineResponse { servers, profiles }) => {
                let fetched_at = now_millis();
                let (server_count, player_count) = (servers.len(), profiles.len());
                let mut was_offline = false;
                self.inner.state.send_modify(|s| {
                    was_offline = !s.is_online;
                    s.servers = servers;
                    s.profiles = profiles;
                    s.last_fetched_at = Some(fetched_at);
                    s.error = None;
                    s.is_online = true;
                    s.loading = false;
                });
                control.settled_once = true;

                if let Some(timer) = control.recovery_timer.take() {
                    timer.abort();
                }
                if control.initialized && !control.hidden && control.poll_timer.is_none() {
                    self.start_poll_timer(&mut control);
                }

                if was_offline {
                    info!(
                        servers = server_count,
                        players = player_count,
                        "live data source reachable again"
                    );
                } else {
                    debug!(
                        servers = server_count,
                        players = player_count,
                        "live data refreshed"
                    );
                }
                FetchOutcome::Refreshed
            }
            CycleResult::Exhausted(err) => {
                let message = err.to_string();
                self.inner.state.send_modify(|s| {
                    s.error = Some(message);
                    s.is_online = false;
                    s.loading = false;
                });
                control.settled_once = true;

                warn!(
                    error = %err,
                    attempts = self.inner.config.retry.max_attempts(),
                    "refresh failed, suspending polling"
                );
                if let Some(timer) = control.poll_timer.take() {
                    timer.abort();
                }
                if control.initialized {
                    self.arm_recovery_timer(&mut control);
                }
                FetchOutcome::Failed
            }
        }
    }
}

/// Owns the in-flight slot for one cycle; releases it if the cycle's future
/// is dropped before it settles.
struct CycleGuard<'a> {
    store: &'a LiveStore,
    id: u64,
    token: CancellationToken,
    armed: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.token.cancel();
        let mut control = self.store.control();
        if control.in_flight.as_ref().is_some_and(|f| f.id == self.id) {
            control.in_flight = None;
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
