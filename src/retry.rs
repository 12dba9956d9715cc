//! Retry logic with exponential backoff
//!
//! This module provides a retry combinator decoupled from the operation it wraps.
//! The same combinator drives per-candidate downloads and the final upload call,
//! each with its own [`RetryConfig`].
//!
//! # Example
//!
//! ```no_run
//! use filler_dl::retry::{IsRetryable, with_retry};
//! use filler_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, "example", || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{Backoff, RetryConfig};
use crate::error::{Error, ProviderError, UploadError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, rate limiting, connection reset) should return `true`.
/// Permanent failures (not found, unparseable responses, bad configuration) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Quota/auth rejections are retried with the same cap as network failures
            Error::Provider(ProviderError::Network { .. })
            | Error::Provider(ProviderError::QuotaOrAuth { .. }) => true,
            Error::Provider(ProviderError::Http { status, .. }) => *status >= 500,
            Error::Provider(_) => false,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Upload(UploadError::Command { .. }) => true,
            // A response without the identifier will not improve on a second call
            Error::Upload(_) => false,
            Error::ExternalTool(msg) => {
                msg.contains("timeout") || msg.contains("timed out") || msg.contains("temporary")
            }
            Error::Config { .. }
            | Error::InsufficientSize { .. }
            | Error::AllProvidersExhausted { .. }
            | Error::Concat(_)
            | Error::MissingSecret { .. }
            | Error::Serialization(_)
            | Error::InsufficientSpace { .. }
            | Error::DiskSpaceCheckFailed(_)
            | Error::NotSupported(_)
            | Error::Cancelled => false,
        }
    }
}

/// Delay to wait after the failed attempt with 1-based index `attempt`
///
/// Exponential backoff is `base_delay * 2^attempt`, fixed backoff is `base_delay`;
/// both are capped at `max_delay`. The sequence is non-decreasing in `attempt`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let delay = match config.backoff {
        Backoff::Fixed => config.base_delay,
        Backoff::Exponential => 2u32
            .checked_pow(attempt)
            .and_then(|factor| config.base_delay.checked_mul(factor))
            .unwrap_or(config.max_delay),
    };
    delay.min(config.max_delay)
}

/// Execute an async operation, retrying transient failures with backoff
///
/// # Arguments
///
/// * `config` - Retry configuration (total attempts, base delay, backoff kind, cap, jitter)
/// * `label` - Operation name used in log lines
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error once `max_attempts` attempts
/// are used up. No delay follows a successful attempt or the final allowed attempt.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt: u32 = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(operation = label, attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff_delay(config, attempt);
                let delay = if config.jitter { add_jitter(delay) } else { delay };

                tracing::warn!(
                    operation = label,
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        operation = label,
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        operation = label,
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
