//! Waiter — retry a convergence check with a fixed delay and budget.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use strata_core::WaiterConfig;

use crate::clock::Clock;

/// Outcome of one convergence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    /// The awaited state has been reached.
    Ready,
    /// Not there yet; carries the observed state for diagnostics.
    Pending(String),
}

impl Poll {
    pub fn pending(state: impl Into<String>) -> Self {
        Poll::Pending(state.into())
    }
}

#[derive(Debug, Error)]
pub enum WaitError<E> {
    /// The retry budget ran out before the check reported ready.
    #[error("timed out waiting for {operation} after {attempts} attempts (last state: {last_state})")]
    Timeout {
        operation: String,
        attempts: u32,
        last_state: String,
    },

    /// The check itself failed; not retried.
    #[error("{0}")]
    Check(E),
}

/// Bounded polling loop.
#[derive(Clone)]
pub struct Waiter {
    name: String,
    retries: u32,
    delay: Duration,
    clock: Arc<dyn Clock>,
}

impl Waiter {
    pub fn new(name: impl Into<String>, retries: u32, delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            retries,
            delay,
            clock,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &WaiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(name, config.retries, config.delay(), clock)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke `check` until it returns [`Poll::Ready`] or an error, sleeping
    /// `delay` between attempts. Performs at most `retries` invocations.
    pub async fn wait<F, Fut, E>(&self, mut check: F) -> Result<(), WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Poll, E>>,
    {
        let mut last_state = String::from("never checked");

        for attempt in 1..=self.retries {
            match check().await {
                Ok(Poll::Ready) => {
                    debug!(operation = %self.name, attempt, "wait complete");
                    return Ok(());
                }
                Ok(Poll::Pending(state)) => {
                    debug!(operation = %self.name, attempt, %state, "still waiting");
                    last_state = state;
                }
                Err(err) => return Err(WaitError::Check(err)),
            }

            if attempt < self.retries {
                self.clock.sleep(self.delay).await;
            }
        }

        warn!(operation = %self.name, retries = self.retries, %last_state, "wait timed out");
        Err(WaitError::Timeout {
            operation: self.name.clone(),
            attempts: self.retries,
            last_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn waiter(retries: u32, clock: &ManualClock) -> Waiter {
        Waiter::new(
            "test operation",
            retries,
            Duration::from_secs(10),
            Arc::new(clock.clone()),
        )
    }

    /// Check that becomes ready on the `k`-th call.
    async fn ready_on(k: u32, calls: &AtomicU32) -> Result<Poll, String> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= k {
            Ok(Poll::Ready)
        } else {
            Ok(Poll::pending(format!("attempt {n}")))
        }
    }

    #[tokio::test]
    async fn succeeds_after_exactly_k_invocations() {
        for (k, retries) in [(1, 1), (1, 5), (3, 5), (5, 5)] {
            let clock = ManualClock::new();
            let calls = AtomicU32::new(0);
            waiter(retries, &clock)
                .wait(|| ready_on(k, &calls))
                .await
                .unwrap();

            assert_eq!(calls.load(Ordering::SeqCst), k);
            assert_eq!(clock.sleeps(), u64::from(k - 1));
            assert_eq!(clock.elapsed(), Duration::from_secs(10 * u64::from(k - 1)));
        }
    }

    #[tokio::test]
    async fn times_out_when_budget_is_smaller_than_k() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);
        let err = waiter(3, &clock)
            .wait(|| ready_on(4, &calls))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            WaitError::Timeout {
                operation,
                attempts,
                last_state,
            } => {
                assert_eq!(operation, "test operation");
                assert_eq!(attempts, 3);
                assert_eq!(last_state, "attempt 3");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn check_errors_abort_immediately() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);
        let err = waiter(10, &clock)
            .wait(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Poll, _>("access denied".to_string())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Check(ref msg) if msg == "access denied"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(clock.sleeps(), 0);
    }

    #[tokio::test]
    async fn zero_budget_never_checks() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);
        let err = waiter(0, &clock)
            .wait(|| ready_on(1, &calls))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(err.to_string().contains("never checked"));
    }

    #[test]
    fn from_config_uses_configured_budget() {
        let config = WaiterConfig {
            retries: 7,
            delay_secs: 3,
            propagation_delay_secs: 1,
        };
        let waiter = Waiter::from_config("asg", &config, Arc::new(ManualClock::new()));
        assert_eq!(waiter.retries, 7);
        assert_eq!(waiter.delay, Duration::from_secs(3));
        assert_eq!(waiter.name(), "asg");
    }
}
