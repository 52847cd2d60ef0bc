// Retry Utility: shared retry-with-backoff logic for file attempts, playlist
// fetches and segment fetches.
//
// Delay before attempt n+1 is n² × base_delay plus uniform jitter in [0, max_jitter).

use crate::DownloadError;
use rand::RngExt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included. Never below 1.
    pub max_attempts: u32,
    /// Base delay, scaled by the square of the failed attempt number.
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the random jitter added to every delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Policy allowing `retries` retries after the first try.
    pub fn from_retries(retries: u32, base_delay: Duration) -> Self {
        Self::new(retries.saturating_add(1), base_delay)
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Deterministic part of the delay that follows failed attempt `attempt` (1-indexed).
    pub fn min_delay_after(&self, attempt: u32) -> Duration {
        let factor = attempt.saturating_mul(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
    }

    /// Full delay that follows failed attempt `attempt`, jitter included.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.min_delay_after(attempt);
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return base;
        }
        let jitter = Duration::from_millis(rand::rng().random_range(0..jitter_ms));
        base.saturating_add(jitter)
    }
}

/// Outcome of one attempt as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Transient,
    Fatal,
}

/// Attempting → Succeeded | Retrying → Attempting | Exhausted | Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    Retrying { attempt: u32, delay: Duration },
    Succeeded { attempt: u32 },
    Failed { attempt: u32 },
    Exhausted { attempts: u32 },
}

impl RetryState {
    pub fn initial() -> Self {
        Self::Attempting { attempt: 1 }
    }

    /// Feed the outcome of the current attempt. Only meaningful while `Attempting`.
    pub fn advance(self, outcome: AttemptOutcome, policy: &RetryPolicy) -> Self {
        let Self::Attempting { attempt } = self else {
            return self;
        };
        match outcome {
            AttemptOutcome::Success => Self::Succeeded { attempt },
            AttemptOutcome::Fatal => Self::Failed { attempt },
            AttemptOutcome::Transient if attempt >= policy.max_attempts.max(1) => {
                Self::Exhausted { attempts: attempt }
            }
            AttemptOutcome::Transient => Self::Retrying {
                attempt,
                delay: policy.delay_after(attempt),
            },
        }
    }

    /// Leave the backoff wait. Only meaningful while `Retrying`.
    pub fn next_attempt(self) -> Self {
        match self {
            Self::Retrying { attempt, .. } => Self::Attempting {
                attempt: attempt + 1,
            },
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Failed { .. } | Self::Exhausted { .. }
        )
    }
}

/// Result of a single attempt, used by the caller to signal retryability.
pub enum RetryAction<T> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed with a retryable error (network, any HTTP status, I/O).
    Retry(DownloadError),
    /// Operation failed with a non-retryable error (parse error, cancellation).
    Fail(DownloadError),
}

impl<T> RetryAction<T> {
    /// Classify a plain result with [`DownloadError::is_retryable`].
    pub fn from_result(result: Result<T, DownloadError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) if err.is_retryable() => Self::Retry(err),
            Err(err) => Self::Fail(err),
        }
    }
}

/// What the driver hands back when the state machine does not end in success.
#[derive(Debug)]
pub struct RetryFailure {
    pub attempts: u32,
    pub exhausted: bool,
    pub error: DownloadError,
}

impl RetryFailure {
    /// Wrap exhaustion in [`DownloadError::RetriesExhausted`]; fatal errors pass through.
    pub fn into_error(self) -> DownloadError {
        if self.exhausted {
            DownloadError::RetriesExhausted {
                attempts: self.attempts,
                source: Box::new(self.error),
            }
        } else {
            self.error
        }
    }
}

/// Execute an async operation with retry-and-backoff.
///
/// The `operation` closure receives the current attempt number (1-indexed) and
/// returns a [`RetryAction`] indicating whether the result is a success,
/// retryable failure, or permanent failure.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, RetryFailure>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let mut state = RetryState::initial();
    let mut last_error = None;

    loop {
        match state {
            RetryState::Attempting { attempt } => {
                if token.is_cancelled() {
                    return Err(RetryFailure {
                        attempts: attempt - 1,
                        exhausted: false,
                        error: DownloadError::Cancelled,
                    });
                }

                let (outcome, value) = match operation(attempt).await {
                    RetryAction::Success(value) => (AttemptOutcome::Success, Some(value)),
                    RetryAction::Retry(err) => {
                        last_error = Some(err);
                        (AttemptOutcome::Transient, None)
                    }
                    RetryAction::Fail(err) => {
                        last_error = Some(err);
                        (AttemptOutcome::Fatal, None)
                    }
                };

                state = state.advance(outcome, policy);
                if let Some(value) = value {
                    debug!(attempt, "Attempt succeeded");
                    return Ok(value);
                }
            }
            RetryState::Retrying { attempt, delay } => {
                warn!(
                    attempt,
                    max = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error.as_ref().map(ToString::to_string).unwrap_or_default(),
                    "Retrying after transient error"
                );
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(RetryFailure {
                            attempts: attempt,
                            exhausted: false,
                            error: DownloadError::Cancelled,
                        });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                state = state.next_attempt();
            }
            RetryState::Failed { attempt } => {
                return Err(RetryFailure {
                    attempts: attempt,
                    exhausted: false,
                    error: last_error.unwrap_or(DownloadError::Cancelled),
                });
            }
            RetryState::Exhausted { attempts } => {
                return Err(RetryFailure {
                    attempts,
                    exhausted: true,
                    error: last_error.unwrap_or(DownloadError::Cancelled),
                });
            }
            RetryState::Succeeded { .. } => unreachable!("success returns from the attempt arm"),
        }
    }
}

/// Classify a reqwest error as a timeout for clearer reporting.
pub(crate) fn classify_reqwest_error(e: reqwest::Error) -> DownloadError {
    if e.is_timeout() {
        DownloadError::Timeout {
            reason: e.to_string(),
        }
    } else {
        DownloadError::from(e)
    }
}
