//! One logical refresh: bounded attempts with a fixed backoff schedule.

use crate::error::SyncError;
use crate::models::OnlineResponse;
use crate::source::OnlineSource;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry budget and backoff schedule for a refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before retry `n` is `delays[n]`; the last entry is reused past the end.
    pub delays: Vec<Duration>,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay to wait after failed attempt `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delays
            .get(attempt as usize)
            .or(self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug)]
pub(crate) enum CycleResult {
    Fetched(OnlineResponse),
    Exhausted(SyncError),
    Cancelled,
}

/// Run attempts until one succeeds, the budget runs out, or `token` fires.
///
/// The token is checked before each dispatch, raced against the request and
/// every backoff sleep, and checked again before a result is handed back.
pub(crate) async fn run_cycle(
    source: &dyn OnlineSource,
    policy: &RetryPolicy,
    token: &CancellationToken,
) -> CycleResult {
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return CycleResult::Cancelled;
        }

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return CycleResult::Cancelled,
            res = tokio::time::timeout(policy.attempt_timeout, source.fetch_online()) => match res {
                Ok(inner) => inner,
                Err(_) => Err(SyncError::Timeout(policy.attempt_timeout)),
            },
        };

        if token.is_cancelled() {
            return CycleResult::Cancelled;
        }

        let err = match result {
            Ok(snapshot) => {
                debug!(attempt, "refresh attempt succeeded");
                return CycleResult::Fetched(snapshot);
            }
            Err(err) => err,
        };

        if attempt >= policy.max_retries {
            return CycleResult::Exhausted(err);
        }

        let delay = policy.delay_for(attempt);
        warn!(
            attempt = attempt + 1,
            max_attempts = policy.max_attempts(),
            error = %err,
            "refresh attempt failed, retrying in {}ms",
            delay.as_millis()
        );

        tokio::select! {
            biased;
            _ = token.cancelled() => return CycleResult::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    struct Flaky {
        failures_left: AtomicUsize,
        calls: Mutex<Vec<Instant>>,
    }

    impl Flaky {
        fn new(failures: usize) -> Self {
            Self {
                failures_left: AtomicUsize::new(failures),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OnlineSource for Flaky {
        async fn fetch_online(&self) -> Result<OnlineResponse> {
            self.calls.lock().unwrap().push(Instant::now());
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(SyncError::Transport("connection refused".into()));
            }
            Ok(OnlineResponse::default())
        }
    }

    struct Hangs;

    #[async_trait]
    impl OnlineSource for Hangs {
        async fn fetch_online(&self) -> Result<OnlineResponse> {
            std::future::pending::<Result<OnlineResponse>>().await
        }
    }

    #[test]
    fn test_delay_schedule_reuses_last_entry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(7), Duration::from_secs(4));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_empty_schedule_means_no_delay() {
        let policy = RetryPolicy {
            delays: Vec::new(),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_four_attempts_with_backoff() {
        let source = Flaky::new(usize::MAX);
        let token = CancellationToken::new();

        let result = run_cycle(&source, &RetryPolicy::default(), &token).await;

        assert!(matches!(result, CycleResult::Exhausted(SyncError::Transport(_))));
        let times = source.call_times();
        assert_eq!(times.len(), 4);
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_within_budget() {
        let source = Flaky::new(2);
        let token = CancellationToken::new();

        let result = run_cycle(&source, &RetryPolicy::default(), &token).await;

        assert!(matches!(result, CycleResult::Fetched(_)));
        assert_eq!(source.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_is_silent() {
        let source = Flaky::new(usize::MAX);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let result = run_cycle(&source, &RetryPolicy::default(), &token).await;

        assert!(matches!(result, CycleResult::Cancelled));
        assert_eq!(source.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_never_dispatches() {
        let source = Flaky::new(0);
        let token = CancellationToken::new();
        token.cancel();

        let result = run_cycle(&source, &RetryPolicy::default(), &token).await;

        assert!(matches!(result, CycleResult::Cancelled));
        assert!(source.call_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_times_out() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        let token = CancellationToken::new();

        let result = run_cycle(&Hangs, &policy, &token).await;

        match result {
            CycleResult::Exhausted(err) => {
                assert_eq!(err, SyncError::Timeout(Duration::from_secs(10)));
                assert_eq!(err.to_string(), "request timed out after 10s");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
