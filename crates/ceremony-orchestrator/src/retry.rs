//! Bounded polling with a fixed delay
//!
//! Worst-case wait is `attempts * delay`; there is no backoff.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use ceremony_core::{ContextError, RunContext};

/// Fixed-delay retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn fixed(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Liveness probe budget: 10 pings, one second apart
pub const LIVENESS_RETRY: RetryPolicy = RetryPolicy::fixed(10, Duration::from_secs(1));

/// Group descriptor retrieval budget: 10 reads, one second apart
pub const GROUP_RETRY: RetryPolicy = RetryPolicy::fixed(10, Duration::from_secs(1));

/// Call `probe` until it yields a value or the budget is spent
///
/// Returns `Ok(None)` once every attempt came back empty. Each attempt and
/// delay is bounded by `ctx`.
pub async fn poll_bounded<T, F, Fut>(
    ctx: &RunContext,
    policy: RetryPolicy,
    mut probe: F,
) -> Result<Option<T>, ContextError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=policy.attempts {
        if let Some(value) = ctx.run(probe()).await? {
            return Ok(Some(value));
        }
        debug!("Attempt {}/{} came back empty", attempt, policy.attempts);
        if attempt < policy.attempts {
            ctx.sleep(policy.delay).await?;
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    async fn probe_until(ready_at: u32, calls: &AtomicU32) -> Option<u32> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        (n >= ready_at).then_some(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_attempt() {
        let ctx = RunContext::with_timeout(Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = poll_bounded(&ctx, LIVENESS_RETRY, || probe_until(10, &calls))
            .await
            .unwrap();

        assert_eq!(result, Some(10));
        assert_eq!(started.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget() {
        let ctx = RunContext::with_timeout(Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let result = poll_bounded(&ctx, LIVENESS_RETRY, || probe_until(11, &calls))
            .await
            .unwrap();

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_does_not_sleep() {
        let ctx = RunContext::with_timeout(Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = poll_bounded(&ctx, GROUP_RETRY, || probe_until(1, &calls))
            .await
            .unwrap();

        assert_eq!(result, Some(1));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_polling_short() {
        let ctx = RunContext::with_timeout(Duration::from_millis(2500));
        let calls = AtomicU32::new(0);

        let result = poll_bounded(&ctx, LIVENESS_RETRY, || probe_until(100, &calls)).await;

        assert_eq!(result, Err(ContextError::DeadlineExceeded));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
