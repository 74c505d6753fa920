//! Backoff helper for transient store faults.
//!
//! Every protocol step that touches the store goes through [`with_retry`].
//! Non-retryable errors surface immediately; retryable ones are retried
//! with exponential backoff until the policy's attempts run out.
//! A `max_attempts` of `None` never gives up, which the acknowledgment
//! path uses for the read-counter decrement: dropping that decrement
//! would leak the message until its TTL.

use reliq_config::RetryPolicy;
use reliq_store::{Result, StoreError};
use std::time::Duration;
use tracing::{debug, warn};

/// Run `operation` under the given retry policy.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded on attempt {}",
                        operation_name, attempt
                    );
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if let Some(max) = policy.max_attempts
                    && attempt >= max
                {
                    warn!(
                        "Operation '{}' failed after {} attempts: {}",
                        operation_name, attempt, e
                    );
                    return Err(e);
                }

                let delay = delay_for_attempt(policy, attempt);
                debug!(
                    "Operation '{}' failed on attempt {} ({}), retrying in {:?}",
                    operation_name, attempt, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

/// Exponential backoff delay for a 1-based attempt number.
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    let base = policy.initial_delay.as_secs_f64() * policy.multiplier.powi(exponent);
    let capped = Duration::from_secs_f64(base.min(policy.max_delay.as_secs_f64()));

    if policy.jitter { add_jitter(capped) } else { capped }
}

/// Add up to 10% jitter to avoid thundering herd
fn add_jitter(delay: Duration) -> Duration {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or(0)
        .hash(&mut hasher);

    let jitter_factor = (hasher.finish() % 1000) as f64 / 1000.0;
    let jitter = delay.as_secs_f64() * 0.1 * jitter_factor;

    Duration::from_secs_f64(delay.as_secs_f64() + jitter)
}
