//! Readiness - 条件が成り立つまでポーリングで待つ

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::AwaitError;

/// How often to poll and how long to keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub overall: Duration,
}

impl WaitPolicy {
    pub fn new(poll_interval: Duration, overall: Duration) -> Self {
        Self {
            poll_interval,
            overall,
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_secs(5))
    }
}

/// Poll `predicate` every `poll_interval` until it holds or `overall` has
/// passed. The predicate is always checked at least once. An `overall` too
/// large to add to the current instant means no deadline.
pub async fn await_condition<P>(
    mut predicate: P,
    poll_interval: Duration,
    overall: Duration,
) -> Result<(), AwaitError>
where
    P: FnMut() -> bool,
{
    await_condition_async(
        move || std::future::ready(predicate()),
        poll_interval,
        overall,
    )
    .await
}

/// Async flavour of [`await_condition`], for probes that do I/O.
pub async fn await_condition_async<P, Fut>(
    mut predicate: P,
    poll_interval: Duration,
    overall: Duration,
) -> Result<(), AwaitError>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = Instant::now();
    let deadline = started.checked_add(overall);
    let mut attempts = 0_u32;
    loop {
        attempts += 1;
        if predicate().await {
            tracing::debug!(attempts, elapsed = ?started.elapsed(), "condition met");
            return Ok(());
        }
        let now = Instant::now();
        let pause = match deadline {
            Some(deadline) if now >= deadline => {
                tracing::debug!(attempts, "condition not met before deadline");
                return Err(AwaitError::Timeout { waited: overall });
            }
            Some(deadline) => poll_interval.min(deadline - now),
            None => poll_interval,
        };
        tokio::time::sleep(pause).await;
    }
}
