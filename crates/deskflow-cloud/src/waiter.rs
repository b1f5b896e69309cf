//! Poll a resource until it settles
//!
//! Fixed-interval polling with an optional attempt limit and deadline.
//! Sleeps race a [`CancellationToken`] so a shutdown does not have to wait
//! out a full interval.

use crate::cancel::CancellationToken;
use crate::error::{CloudError, Result};
use crate::resource::ResourceKind;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Outcome of mapping one describe result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// Not terminal yet; poll again after the interval
    Pending,
    /// Terminal success carrying whatever the next stage needs
    Settled(T),
    /// Terminal failure with a human-readable reason
    Failed(String),
}

/// Polling configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    /// Delay between two describe calls
    pub interval: Duration,
    /// Give up once this much time has passed since the first describe
    pub timeout: Option<Duration>,
    /// Give up after this many describe calls
    pub max_attempts: Option<u32>,
}

impl WaitConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            max_attempts: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether the wait can end in `Timeout`
    pub fn is_bounded(&self) -> bool {
        self.timeout.is_some() || self.max_attempts.is_some()
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

/// Poll `describe` until `classify` reports a terminal outcome.
///
/// * `Ok(Some(item))` is passed to `classify`.
/// * `Ok(None)` (no result for a known id) counts as pending.
/// * `Err(_)` from `describe` is returned unchanged; only pending states are retried.
///
/// # Returns
/// * `Ok(T)` - the payload of the first `Settled` outcome
/// * `Err(CloudError::ResourceFailed)` - the first `Failed` outcome, no further describe calls
/// * `Err(CloudError::Timeout)` - attempt limit or deadline reached while pending
/// * `Err(CloudError::Cancelled)` - the token was cancelled
pub async fn wait_until_settled<I, T, D, Fut, C>(
    kind: ResourceKind,
    id: &str,
    config: &WaitConfig,
    cancel: &CancellationToken,
    mut describe: D,
    mut classify: C,
) -> Result<T>
where
    D: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<I>>>,
    C: FnMut(I) -> PollOutcome<T>,
{
    let started = Instant::now();
    // An unrepresentable deadline is no deadline
    let deadline = config.timeout.and_then(|t| started.checked_add(t));
    let mut attempt: u32 = 0;

    if !config.is_bounded() {
        tracing::debug!("Waiting for {} {} without a bound", kind, id);
    }

    loop {
        if let Some(reason) = cancel.reason() {
            return Err(CloudError::Cancelled(reason));
        }

        attempt += 1;
        let described = tokio::select! {
            result = describe() => result?,
            _ = cancel.cancelled() => return Err(cancelled(cancel)),
        };
        match described {
            Some(item) => match classify(item) {
                PollOutcome::Settled(value) => {
                    tracing::debug!("{} {} settled after {} attempts", kind, id, attempt);
                    return Ok(value);
                }
                PollOutcome::Failed(reason) => {
                    return Err(CloudError::ResourceFailed {
                        kind,
                        id: id.to_string(),
                        reason,
                    });
                }
                PollOutcome::Pending => {
                    tracing::debug!("{} {} still pending (attempt {})", kind, id, attempt);
                }
            },
            None => {
                tracing::warn!(
                    "describe returned no {} for {} (attempt {}), retrying",
                    kind,
                    id,
                    attempt
                );
            }
        }

        if config.max_attempts.is_some_and(|max| attempt >= max) {
            return Err(timeout(kind, id, attempt, started));
        }

        let delay = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(timeout(kind, id, attempt, started));
                }
                remaining.min(config.interval)
            }
            None => config.interval,
        };

        tokio::select! {
            _ = sleep(delay) => {}
            _ = cancel.cancelled() => return Err(cancelled(cancel)),
        }
    }
}

fn cancelled(cancel: &CancellationToken) -> CloudError {
    CloudError::Cancelled(cancel.reason().unwrap_or_else(|| "cancelled".to_string()))
}

fn timeout(kind: ResourceKind, id: &str, attempts: u32, started: Instant) -> CloudError {
    CloudError::Timeout {
        kind,
        id: id.to_string(),
        attempts,
        elapsed: started.elapsed(),
    }
}
