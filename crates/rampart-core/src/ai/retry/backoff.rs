//! Backoff scheduling and the retry executor.
//!
//! Delay for attempt n is `min_delay * 2^(n-1)` capped at `max_delay`, with
//! a uniform ±jitter applied so concurrent callers do not retry in
//! lockstep. A server-supplied Retry-After override bypasses the formula
//! entirely. The wait is a single cancellable sleep: cancellation resolves
//! it immediately with a distinct outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::ai::error::AiError;

/// HTTP statuses worth retrying: rate limits and transient server errors.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Classification contract for retryable errors.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;

    /// Server-supplied wait override, used verbatim instead of backoff math.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Retry policy for a single call. Immutable once supplied.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first; coerced up to at least 1.
    pub attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Fractional jitter, e.g. 0.1 = ±10% of the computed delay.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            min_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

/// Invoked with (attempt, max_attempts, error) before each wait.
pub type RetryObserver = Arc<dyn Fn(u32, u32, &AiError) + Send + Sync>;

/// Execution scope threaded through a retrying call.
///
/// Collaborators are explicit here rather than stashed in ambient storage,
/// so a call site shows exactly what cancels it and who observes retries.
#[derive(Clone, Default)]
pub struct RetryScope {
    /// Aborts the backoff wait immediately when triggered.
    pub cancel: CancellationToken,
    pub on_retry: Option<RetryObserver>,
}

/// Run `operation` with retry. Returns the success value, the final error
/// verbatim when attempts are exhausted or the error is not retryable, or
/// `AiError::Cancelled` when the scope is cancelled during a wait.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    scope: &RetryScope,
    mut operation: F,
) -> Result<T, AiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AiError>>,
{
    let max_attempts = config.attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = compute_delay(config, attempt, err.retry_after());
                if let Some(observer) = &scope.on_retry {
                    observer(attempt, max_attempts, &err);
                }
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient failure"
                );
                tokio::select! {
                    biased;
                    _ = scope.cancel.cancelled() => return Err(AiError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn compute_delay(config: &RetryConfig, attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(after) = retry_after {
        if after > Duration::ZERO {
            return after;
        }
    }

    let exponential = config.min_delay.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
    let capped = exponential.min(config.max_delay.as_secs_f64());
    let span = config.jitter.abs() * capped;
    let jittered = capped + rand::thread_rng().gen_range(-span..=span);
    if jittered <= 0.0 {
        config.min_delay
    } else {
        Duration::from_secs_f64(jittered)
    }
}

/// Parse a Retry-After header value: either an integer count of seconds or
/// an HTTP date. A date already in the past yields no override.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return (secs > 0).then(|| Duration::from_secs(secs));
    }
    let when = httpdate::parse_http_date(value).ok()?;
    when.duration_since(SystemTime::now())
        .ok()
        .filter(|remaining| *remaining > Duration::ZERO)
}
