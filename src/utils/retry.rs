use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Delay policy for retried operations.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// Fixed list of delays. Attempt `n` (zero-based) waits `delays[n]`
    /// before retrying; the list length bounds the number of retries.
    Schedule(Vec<Duration>),
    /// Exponential backoff with a cap.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max_delay: Duration,
    },
}

impl RetryStrategy {
    pub fn get_delay(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::Schedule(delays) => delays
                .get(attempt as usize)
                .or_else(|| delays.last())
                .copied()
                .unwrap_or(Duration::ZERO),
            RetryStrategy::Exponential { initial, multiplier, max_delay } => {
                let delay = initial.as_secs_f64() * multiplier.powf(attempt as f64);
                std::cmp::min(Duration::from_secs_f64(delay), *max_delay)
            }
        }
    }

    /// Retries allowed by this strategy. `Exponential` is unbounded here;
    /// callers pass their own attempt cap to `retry_with`.
    pub fn schedule_len(&self) -> Option<u32> {
        match self {
            RetryStrategy::Schedule(delays) => Some(delays.len() as u32),
            RetryStrategy::Exponential { .. } => None,
        }
    }
}

/// Runs `operation` up to `max_attempts` times, waiting per `strategy`
/// between failures. `should_retry` decides whether an error is worth
/// another attempt; the first non-retryable error is returned as-is.
pub async fn retry_with<F, Fut, T, E>(
    strategy: &RetryStrategy,
    max_attempts: u32,
    should_retry: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if attempt >= max_attempts || !should_retry(&error) {
                    return Err(error);
                }

                let delay = strategy.get_delay(attempt - 1);
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        }
    }
}
