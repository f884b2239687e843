//! Convergence polling primitives.
//!
//! This library provides the loop every cluster wait is built on: observe an
//! eventually-consistent system, classify the observation, and either stop or
//! wait and look again. Key concepts:
//!
//! - **Probe**: one observation step that yields a [`ProbeOutcome`].
//! - **Policy**: how often to look, how long to keep looking, and what to do
//!   when the observation itself errors ([`PollPolicy`]).
//! - **Convergence**: the probe reporting [`ProbeOutcome::Satisfied`] before
//!   the deadline.
//!
//! # Invariants
//!
//! - Every loop has a deadline; there is no way to build an unbounded poll
//! - A timeout is reported differently from a fatal observation
//! - Loops share no state; two polls never wait on each other
//! - In-flight observations are never cancelled, the loop only stops
//!   scheduling new ones

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default interval between probe attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest interval a policy accepts; anything below is raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default deadline for a single convergence wait.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// Result of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<T> {
    /// Target state reached; carries whatever the probe observed.
    Satisfied(T),

    /// Not there yet; keep waiting. Carries a human-readable reason.
    NotYet(String),

    /// The observation rules out convergence; stop immediately.
    Fatal(String),
}

impl<T> ProbeOutcome<T> {
    pub fn not_yet(reason: impl Into<String>) -> Self {
        Self::NotYet(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    /// Returns true if the target state has been reached.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied(_))
    }

    /// Returns true if the loop must stop without converging.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Map the satisfied value, leaving the other outcomes untouched.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ProbeOutcome<U> {
        match self {
            Self::Satisfied(v) => ProbeOutcome::Satisfied(f(v)),
            Self::NotYet(reason) => ProbeOutcome::NotYet(reason),
            Self::Fatal(reason) => ProbeOutcome::Fatal(reason),
        }
    }
}

/// What to do when the probe itself returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Treat the error as "not yet" and keep polling.
    #[default]
    Retry,

    /// Return the error to the caller without further attempts.
    Propagate,
}

/// Polling policy: fixed interval, mandatory deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
    deadline: Duration,
    on_error: ErrorPolicy,
}

impl PollPolicy {
    /// Create a policy that retries probe errors. The interval is clamped to
    /// [`MIN_POLL_INTERVAL`].
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval: interval.max(MIN_POLL_INTERVAL),
            deadline,
            on_error: ErrorPolicy::Retry,
        }
    }

    /// Default interval, given deadline.
    pub fn with_deadline(deadline: Duration) -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, deadline)
    }

    /// Override the probe error policy.
    #[must_use]
    pub fn on_error(mut self, on_error: ErrorPolicy) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.on_error
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_DEADLINE)
    }
}

/// Convergence errors.
#[derive(Debug, Error)]
pub enum ConvergeError<E> {
    /// The deadline passed without the probe being satisfied.
    #[error(
        "timed out after {elapsed:?} waiting for {condition} \
         ({attempts} attempts, last observation: {last_observation})"
    )]
    Timeout {
        condition: String,
        elapsed: Duration,
        attempts: u32,
        last_observation: String,
    },

    /// The probe reported an outcome that can never converge.
    #[error("{condition} failed: {reason}")]
    Fatal { condition: String, reason: String },

    /// The probe errored and the policy said not to retry.
    #[error("probe for {condition} failed: {source}")]
    Probe {
        condition: String,
        #[source]
        source: E,
    },
}

impl<E> ConvergeError<E> {
    /// Returns true if this is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if the probe reported a fatal outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Name of the condition that did not converge.
    pub fn condition(&self) -> &str {
        match self {
            Self::Timeout { condition, .. }
            | Self::Fatal { condition, .. }
            | Self::Probe { condition, .. } => condition,
        }
    }
}

/// Run `probe` until it is satisfied, reports a fatal outcome, or the
/// deadline elapses.
///
/// The deadline is measured from entry. After each unsatisfied attempt the
/// task sleeps for the policy interval (shortened to whatever is left of the
/// deadline), so the last attempt lands on or just after the deadline.
pub async fn poll<T, E, F, Fut>(
    policy: &PollPolicy,
    condition: &str,
    mut probe: F,
) -> Result<T, ConvergeError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ProbeOutcome<T>, E>>,
    E: std::error::Error,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    debug!(
        condition,
        interval_ms = policy.interval.as_millis() as u64,
        deadline_secs = policy.deadline.as_secs(),
        "Waiting for condition"
    );

    loop {
        attempts += 1;

        let reason = match probe().await {
            Ok(ProbeOutcome::Satisfied(value)) => {
                info!(
                    condition,
                    attempts,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Condition satisfied"
                );
                return Ok(value);
            }
            Ok(ProbeOutcome::Fatal(reason)) => {
                warn!(condition, attempts, reason = %reason, "Condition failed");
                return Err(ConvergeError::Fatal {
                    condition: condition.to_string(),
                    reason,
                });
            }
            Ok(ProbeOutcome::NotYet(reason)) => reason,
            Err(e) => match policy.on_error {
                ErrorPolicy::Propagate => {
                    warn!(condition, attempts, error = %e, "Probe error, not retrying");
                    return Err(ConvergeError::Probe {
                        condition: condition.to_string(),
                        source: e,
                    });
                }
                ErrorPolicy::Retry => format!("probe error: {e}"),
            },
        };

        let elapsed = start.elapsed();
        let remaining = policy.deadline.saturating_sub(elapsed);
        if remaining.is_zero() {
            warn!(
                condition,
                attempts,
                elapsed_secs = elapsed.as_secs(),
                last_observation = %reason,
                "Condition did not converge before deadline"
            );
            return Err(ConvergeError::Timeout {
                condition: condition.to_string(),
                elapsed,
                attempts,
                last_observation: reason,
            });
        }

        info!(condition, attempts, reason = %reason, "Continuing to wait");
        tokio::time::sleep(policy.interval.min(remaining)).await;
    }
}

/// Like [`poll`], but with the observation and its classification split.
///
/// `observe` performs the side-effecting read; `predicate` is a pure mapping
/// from that observation to an outcome, testable on its own.
pub async fn poll_until<O, T, E, F, Fut, P>(
    policy: &PollPolicy,
    condition: &str,
    mut observe: F,
    predicate: P,
) -> Result<T, ConvergeError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<O, E>>,
    P: Fn(O) -> ProbeOutcome<T>,
    E: std::error::Error,
{
    let predicate = &predicate;
    poll(policy, condition, move || {
        let observation = observe();
        async move { observation.await.map(predicate) }
    })
    .await
}
