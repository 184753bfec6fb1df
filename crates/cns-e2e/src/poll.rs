//! Condition poller.
//!
//! Repeatedly evaluates a caller-supplied condition at a fixed interval until
//! it reports done, reports an error, the timeout elapses, or the wait is
//! cancelled. Every evaluation is expected to perform its own fresh read of
//! remote state.
//!
//! Evaluation `n` is scheduled at `start + (n - 1) * interval`. The deadline
//! is checked after each evaluation, so an evaluation that lands exactly on
//! the deadline still counts. When an evaluation runs past its next slot, the
//! following one starts a full interval after it finished, and no evaluation
//! starts after the deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
pub use tokio_util::sync::CancellationToken;

/// Default cadence between evaluations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default overall deadline for a wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PollSpecError {
    #[error("poll interval must be greater than zero")]
    ZeroInterval,
    #[error("poll timeout must be greater than zero")]
    ZeroTimeout,
}

/// Timing for one logical wait.
///
/// A timeout shorter than the interval is valid: the condition is evaluated
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    interval: Duration,
    timeout: Duration,
}

impl PollSpec {
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self, PollSpecError> {
        if interval.is_zero() {
            return Err(PollSpecError::ZeroInterval);
        }
        if timeout.is_zero() {
            return Err(PollSpecError::ZeroTimeout);
        }
        Ok(Self { interval, timeout })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for PollSpec {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Terminal result of a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<E> {
    /// The condition reported done.
    Success,
    /// The deadline passed without the condition ever reporting done.
    TimedOut,
    /// The condition reported an error; no further evaluations were made.
    Failed(E),
    /// The cancellation token fired.
    Cancelled,
}

impl<E> PollOutcome<E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn map_err<F, E2>(self, f: F) -> PollOutcome<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            Self::Success => PollOutcome::Success,
            Self::TimedOut => PollOutcome::TimedOut,
            Self::Failed(e) => PollOutcome::Failed(f(e)),
            Self::Cancelled => PollOutcome::Cancelled,
        }
    }

    pub fn into_result(self) -> Result<(), PollError<E>> {
        match self {
            Self::Success => Ok(()),
            Self::TimedOut => Err(PollError::TimedOut),
            Self::Failed(e) => Err(PollError::Failed(e)),
            Self::Cancelled => Err(PollError::Cancelled),
        }
    }
}

/// Error form of a non-successful [`PollOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError<E> {
    #[error("operation did not complete within the deadline")]
    TimedOut,
    #[error("operation failed: {0}")]
    Failed(E),
    #[error("operation was cancelled")]
    Cancelled,
}

/// Poll `condition` until it is done, fails, times out, or `cancel` fires.
///
/// `Ok(true)` ends the wait with [`PollOutcome::Success`], `Ok(false)` keeps
/// polling, and `Err(e)` ends it at once with [`PollOutcome::Failed`]. The
/// poller puts no bound on a single evaluation; a hung condition can overrun
/// the timeout unless the token is cancelled.
pub async fn poll<F, Fut, E>(
    spec: &PollSpec,
    cancel: &CancellationToken,
    mut condition: F,
) -> PollOutcome<E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }

        attempt = attempt.saturating_add(1);
        let evaluated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            result = condition() => result,
        };

        match evaluated {
            Ok(true) => return PollOutcome::Success,
            Err(e) => return PollOutcome::Failed(e),
            Ok(false) => {}
        }

        let next = match spec.interval.checked_mul(attempt) {
            Some(offset) if offset <= spec.timeout => offset,
            _ => return PollOutcome::TimedOut,
        };
        if start.elapsed() > spec.timeout {
            return PollOutcome::TimedOut;
        }

        tracing::trace!(
            attempt,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Condition not met yet"
        );

        // A slot missed by a slow evaluation is pushed back a full interval.
        let scheduled = start + next;
        let now = Instant::now();
        let wake = if scheduled > now {
            scheduled
        } else {
            now + spec.interval
        };
        if wake > start + spec.timeout {
            return PollOutcome::TimedOut;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = sleep_until(wake) => {}
        }
    }
}

/// [`poll`] without external cancellation.
pub async fn poll_until<F, Fut, E>(spec: &PollSpec, condition: F) -> PollOutcome<E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    poll(spec, &CancellationToken::new(), condition).await
}
