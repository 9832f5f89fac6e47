//! Retry with exponential backoff for external endpoint calls.
//!
//! `to`/`enrich`/`wireTap` network I/O and saga database I/O are the
//! suspension points named in §5; a timeout there raises a retryable
//! failure. This classifies transient vs. permanent failures and
//! retries only the former.

use super::error::ExecutionError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32)) as u64;
        let delay_ms = delay_ms.min(self.max_backoff_ms);
        let delay_ms = if self.jitter {
            delay_ms + (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64
        } else {
            delay_ms
        };
        Duration::from_millis(delay_ms)
    }
}

/// Endpoint timeouts and transport failures are transient; everything
/// else (uncaught saga preconditions, resolution failures) is permanent.
pub fn classify_error(error: &ExecutionError) -> ErrorClass {
    match error {
        ExecutionError::Timeout(_) | ExecutionError::Transport(_) => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

pub async fn retry_with_backoff<F, Fut, T>(config: &RetryConfig, operation_name: &str, mut f: F) -> Result<T, ExecutionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExecutionError>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            info!(operation = operation_name, attempt, max_retries = config.max_retries, "retrying endpoint call");
            tokio::time::sleep(config.backoff_delay(attempt - 1)).await;
        }

        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let class = classify_error(&e);
                debug!(operation = operation_name, attempt, ?class, "endpoint call failed");
                if class == ErrorClass::Permanent {
                    return Err(e);
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.expect("loop runs at least once"))
}
