use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{Instant, sleep};
use wicgate_live::{
    Environment, FetchOutcome, Id, LiveStore, OnlineProfile, OnlineResponse, OnlineSource,
    Result, ServerEntry, SyncConfig, SyncError,
};

const INTERVAL: Duration = Duration::from_secs(90);

/// Source double: counts dispatched requests and replies with whatever it was told.
struct ScriptedSource {
    calls: AtomicUsize,
    reply: Mutex<Result<OnlineResponse>>,
    gate: Option<Semaphore>,
}

impl ScriptedSource {
    fn new(reply: Result<OnlineResponse>, gated: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply: Mutex::new(reply),
            gate: gated.then(|| Semaphore::new(0)),
        })
    }

    fn ok(response: OnlineResponse) -> Arc<Self> {
        Self::new(Ok(response), false)
    }

    fn failing() -> Arc<Self> {
        Self::new(Err(SyncError::Transport("Network error".into())), false)
    }

    fn gated(response: OnlineResponse) -> Arc<Self> {
        Self::new(Ok(response), true)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn reply_with(&self, reply: Result<OnlineResponse>) {
        *self.reply.lock().unwrap() = reply;
    }

    /// Let one gated request through.
    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl OnlineSource for ScriptedSource {
    async fn fetch_online(&self) -> Result<OnlineResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.reply.lock().unwrap().clone()
    }
}

fn snapshot(players: usize) -> OnlineResponse {
    OnlineResponse {
        servers: vec![ServerEntry {
            server_id: Id::from(1),
            server_name: "EU".to_string(),
        }],
        profiles: (0..players)
            .map(|i| OnlineProfile {
                profile_id: Id::from(9 + i as i64),
                server_id: Id::from(1),
                profile_name: format!("X{i}"),
                rank: None,
                short_name: None,
                tag_format: None,
            })
            .collect(),
    }
}

fn build(source: &Arc<ScriptedSource>) -> (LiveStore, Environment) {
    let env = Environment::new();
    let store = LiveStore::new(source.clone(), SyncConfig::default(), env.clone());
    (store, env)
}

/// Let spawned tasks run to idle, moving the paused clock by 1ms.
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

// =============================================================================
// FETCH TESTS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_overlapping_fetch_is_skipped() {
    // GIVEN: A refresh blocked inside the network call
    let source = ScriptedSource::gated(snapshot(1));
    let (store, _env) = build(&source);
    let first = tokio::spawn({
        let store = store.clone();
        async move { store.fetch_data().await }
    });
    settle().await;

    // WHEN: A second refresh is requested
    let second = store.fetch_data().await;

    // THEN: It returns without issuing a request
    assert_eq!(second, FetchOutcome::Skipped);
    assert_eq!(source.calls(), 1);

    source.release();
    assert_eq!(first.await.unwrap(), FetchOutcome::Refreshed);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_failure_makes_four_attempts() {
    // GIVEN: A source that always fails
    let source = ScriptedSource::failing();
    let (store, _env) = build(&source);
    let started = Instant::now();

    // WHEN: Refreshing once
    let outcome = store.fetch_data().await;

    // THEN: 1 attempt + 3 retries spaced 1s, 2s, 4s, then the error is surfaced
    assert_eq!(outcome, FetchOutcome::Failed);
    assert_eq!(source.calls(), 4);
    assert_eq!(started.elapsed(), Duration::from_secs(7));
    assert_eq!(store.error().as_deref(), Some("Network error"));
    assert!(!store.is_online());
    assert!(!store.loading());
}

#[tokio::test(start_paused = true)]
async fn test_http_error_message_is_surfaced() {
    // GIVEN: A source answering 500 with an API message
    let source = ScriptedSource::new(
        Err(SyncError::Http {
            status: 500,
            message: "Server error".into(),
        }),
        false,
    );
    let (store, _env) = build(&source);

    // WHEN: Refreshing
    store.fetch_data().await;

    // THEN: Status and message end up in the display string
    assert_eq!(store.error().as_deref(), Some("HTTP 500: Server error"));
    assert!(!store.is_online());
}

#[tokio::test(start_paused = true)]
async fn test_success_after_failure_clears_error() {
    // GIVEN: A store whose last refresh failed
    let source = ScriptedSource::failing();
    let (store, _env) = build(&source);
    store.fetch_data().await;
    assert!(store.error().is_some());

    // WHEN: The next refresh succeeds
    source.reply_with(Ok(snapshot(1)));
    let outcome = store.fetch_data().await;

    // THEN: The error is gone and the store is online again
    assert_eq!(outcome, FetchOutcome::Refreshed);
    assert!(store.error().is_none());
    assert!(store.is_online());
    assert!(store.last_fetched_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_replaced_as_a_whole() {
    // GIVEN: A store fed one server and one profile
    let source = ScriptedSource::ok(snapshot(1));
    let (store, _env) = build(&source);
    let mut updates = store.subscribe();

    // WHEN: Refreshing
    store.fetch_data().await;

    // THEN: Counts reflect the payload
    assert_eq!(store.player_count(), 1);
    assert!(store.players_online());
    assert_eq!(store.servers()[0].server_name, "EU");
    assert!(updates.has_changed().unwrap());
    let seen = updates.borrow_and_update().clone();
    assert_eq!(seen.player_count(), 1);

    // WHEN: The next payload has no profiles
    source.reply_with(Ok(OnlineResponse {
        servers: Vec::new(),
        profiles: Vec::new(),
    }));
    store.fetch_data().await;

    // THEN: Both lists and the derived fields change together
    let state = store.state();
    assert_eq!(state.player_count(), 0);
    assert!(!state.players_online());
    assert!(state.servers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_loading_only_during_first_refresh() {
    // GIVEN: A gated source and a fresh store
    let source = ScriptedSource::gated(snapshot(1));
    let (store, _env) = build(&source);
    assert!(!store.loading());

    // WHEN: The first refresh is in flight
    let first = tokio::spawn({
        let store = store.clone();
        async move { store.fetch_data().await }
    });
    settle().await;

    // THEN: loading is set until it settles
    assert!(store.loading());
    source.release();
    first.await.unwrap();
    assert!(!store.loading());

    // WHEN: A later refresh is in flight
    let second = tokio::spawn({
        let store = store.clone();
        async move { store.fetch_data().await }
    });
    settle().await;

    // THEN: loading stays false
    assert_eq!(source.calls(), 2);
    assert!(!store.loading());
    source.release();
    second.await.unwrap();
    assert!(!store.loading());
}

// =============================================================================
// LIFECYCLE TESTS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_init_polls_every_interval() {
    // GIVEN: An initialized store
    let source = ScriptedSource::ok(snapshot(2));
    let (store, _env) = build(&source);
    store.init();
    settle().await;
    assert_eq!(source.calls(), 1);
    assert!(store.is_initialized());

    // WHEN: One polling interval passes
    sleep(INTERVAL).await;

    // THEN: One more refresh happened
    assert_eq!(source.calls(), 2);
    assert_eq!(store.player_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_init_is_idempotent() {
    // GIVEN: A fresh store
    let source = ScriptedSource::ok(snapshot(1));
    let (store, env) = build(&source);

    // WHEN: init is called repeatedly
    store.init();
    store.init();
    store.init();
    settle().await;

    // THEN: Only one refresh and one listener exist
    assert_eq!(source.calls(), 1);
    assert_eq!(env.listener_count(), 1);

    sleep(INTERVAL).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_polling_and_listeners() {
    // GIVEN: An initialized store that has refreshed once
    let source = ScriptedSource::ok(snapshot(1));
    let (store, env) = build(&source);
    store.init();
    settle().await;

    // WHEN: Stopped and time moves past several intervals
    store.stop();
    settle().await;
    sleep(INTERVAL * 3).await;
    env.notify_online();
    settle().await;

    // THEN: Nothing else is fetched, data is kept
    assert_eq!(source.calls(), 1);
    assert!(!store.is_initialized());
    assert_eq!(env.listener_count(), 0);
    assert_eq!(store.player_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_right_after_init_fetches_nothing() {
    // GIVEN: A store whose initial refresh is queued but not yet started
    let source = ScriptedSource::ok(snapshot(1));
    let (store, _env) = build(&source);
    store.init();

    // WHEN: Stopped before the runtime gets to it
    store.stop();
    sleep(Duration::from_secs(200)).await;

    // THEN: No request went out and the state is untouched
    assert_eq!(source.calls(), 0);
    assert!(store.last_fetched_at().is_none());
    assert_eq!(store.player_count(), 0);
    assert!(!store.is_initialized());
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_in_flight_silently() {
    // GIVEN: An initialized store whose first refresh hangs
    let source = ScriptedSource::gated(snapshot(1));
    let (store, _env) = build(&source);
    let pending = tokio::spawn({
        let store = store.clone();
        async move { store.fetch_data().await }
    });
    settle().await;

    // WHEN: The store is stopped
    store.stop();

    // THEN: The refresh ends as cancelled without touching error state
    assert_eq!(pending.await.unwrap(), FetchOutcome::Cancelled);
    assert!(store.error().is_none());
    assert!(store.is_online());

    // AND: The guard is free again
    source.release();
    assert_eq!(store.fetch_data().await, FetchOutcome::Refreshed);
}

#[tokio::test(start_paused = true)]
async fn test_reinit_after_stop() {
    // GIVEN: A store that was started and stopped
    let source = ScriptedSource::ok(snapshot(1));
    let (store, _env) = build(&source);
    store.init();
    settle().await;
    store.stop();

    // WHEN: Started again
    store.init();
    settle().await;

    // THEN: It refreshes immediately and polls again
    assert_eq!(source.calls(), 2);
    sleep(INTERVAL).await;
    assert_eq!(source.calls(), 3);
}

// =============================================================================
// RECOVERY TESTS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_recovery_attempt_one_interval_after_exhaustion() {
    // GIVEN: An initialized store against a dead source
    let source = ScriptedSource::failing();
    let (store, _env) = build(&source);
    store.init();

    // WHEN: The first cycle exhausts its retries (t = 7s)
    sleep(Duration::from_secs(8)).await;

    // THEN: Offline, and the regular 90s tick does not fire
    assert_eq!(source.calls(), 4);
    assert!(!store.is_online());
    sleep(Duration::from_millis(88_500)).await; // t = 96.5s
    assert_eq!(source.calls(), 4);

    // AND: Exactly one new attempt starts at t = 97s
    sleep(Duration::from_secs(1)).await; // t = 97.5s
    assert_eq!(source.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_successful_recovery_restarts_polling() {
    // GIVEN: A store that went offline at t = 7s
    let source = ScriptedSource::failing();
    let (store, _env) = build(&source);
    store.init();
    sleep(Duration::from_secs(8)).await;

    // WHEN: The source comes back before the recovery attempt at t = 97s
    source.reply_with(Ok(snapshot(1)));
    sleep(Duration::from_secs(90)).await; // t = 98s

    // THEN: Recovery succeeded and the recurring timer runs from there
    assert_eq!(source.calls(), 5);
    assert!(store.is_online());
    assert!(store.error().is_none());
    sleep(Duration::from_secs(88)).await; // t = 186s
    assert_eq!(source.calls(), 5);
    sleep(Duration::from_secs(2)).await; // t = 188s
    assert_eq!(source.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_online_event_refreshes_immediately() {
    // GIVEN: A store that went offline at t = 7s
    let source = ScriptedSource::failing();
    let (store, env) = build(&source);
    store.init();
    sleep(Duration::from_secs(8)).await;
    assert!(!store.is_online());

    // WHEN: Connectivity returns
    source.reply_with(Ok(snapshot(1)));
    env.notify_online();
    settle().await;

    // THEN: A refresh happens without waiting for the recovery timer
    assert_eq!(source.calls(), 5);
    assert!(store.is_online());

    // AND: The recovery attempt at t = 97s was cancelled; polling resumed from t = 8s
    sleep(Duration::from_millis(89_500)).await; // t = 97.5s
    assert_eq!(source.calls(), 5);
    sleep(Duration::from_secs(1)).await; // t = 98.5s
    assert_eq!(source.calls(), 6);
}

// =============================================================================
// VISIBILITY TESTS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_hidden_page_pauses_polling() {
    // GIVEN: An initialized store
    let source = ScriptedSource::ok(snapshot(1));
    let (store, env) = build(&source);
    store.init();
    settle().await;

    // WHEN: The page is hidden for several intervals
    env.set_hidden(true);
    settle().await;
    sleep(INTERVAL * 3).await;

    // THEN: Nothing was fetched
    assert_eq!(source.calls(), 1);

    // WHEN: The page becomes visible
    env.set_hidden(false);
    settle().await;

    // THEN: It refreshes at once and polls again
    assert_eq!(source.calls(), 2);
    sleep(INTERVAL).await;
    assert_eq!(source.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_visibility_signals_do_not_stack_timers() {
    // GIVEN: An initialized, visible store
    let source = ScriptedSource::ok(snapshot(1));
    let (store, env) = build(&source);
    store.init();
    settle().await;

    // WHEN: Visible is signalled several times while already polling
    env.set_hidden(false);
    env.set_hidden(false);
    env.set_hidden(false);
    settle().await;

    // THEN: No extra refreshes, and still one per interval
    assert_eq!(source.calls(), 1);
    sleep(INTERVAL).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_visible_while_offline_leaves_recovery_to_timer() {
    // GIVEN: A store that went offline
    let source = ScriptedSource::failing();
    let (store, env) = build(&source);
    store.init();
    sleep(Duration::from_secs(8)).await;

    // WHEN: The page is hidden and shown again
    env.set_hidden(true);
    env.set_hidden(false);
    settle().await;

    // THEN: No immediate refresh
    assert_eq!(source.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_init_while_hidden_fetches_once_without_polling() {
    // GIVEN: A page that is already hidden
    let source = ScriptedSource::ok(snapshot(1));
    let (store, env) = build(&source);
    env.set_hidden(true);

    // WHEN: The store starts
    store.init();
    settle().await;
    sleep(INTERVAL * 2).await;

    // THEN: Only the initial refresh ran
    assert_eq!(source.calls(), 1);

    env.set_hidden(false);
    settle().await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_online_event_while_hidden_keeps_polling_paused() {
    // GIVEN: An initialized store on a hidden page
    let source = ScriptedSource::ok(snapshot(1));
    let (store, env) = build(&source);
    store.init();
    settle().await;
    env.set_hidden(true);
    settle().await;

    // WHEN: Connectivity is signalled
    env.notify_online();
    settle().await;

    // THEN: One immediate refresh, but no recurring polling while hidden
    assert_eq!(source.calls(), 2);
    sleep(INTERVAL * 2).await;
    assert_eq!(source.calls(), 2);

    // WHEN: The page becomes visible
    env.set_hidden(false);
    settle().await;

    // THEN: Polling resumes
    assert_eq!(source.calls(), 3);
    sleep(INTERVAL).await;
    assert_eq!(source.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_visibility_burst_beyond_channel_capacity_ends_paused() {
    // GIVEN: An initialized, visible store
    let source = ScriptedSource::ok(snapshot(1));
    let (store, env) = build(&source);
    store.init();
    settle().await;

    // WHEN: More visibility changes arrive than the listener can buffer, ending hidden
    for i in 0..41 {
        env.set_hidden(i % 2 == 0);
    }
    settle().await;
    assert!(env.is_hidden());

    // THEN: Polling is paused
    let after_burst = source.calls();
    sleep(INTERVAL * 3).await;
    assert_eq!(source.calls(), after_burst);

    // AND: Showing the page resumes it
    env.set_hidden(false);
    settle().await;
    assert_eq!(source.calls(), after_burst + 1);
    sleep(INTERVAL).await;
    assert_eq!(source.calls(), after_burst + 2);
}
