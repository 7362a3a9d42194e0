//! Convergence poller.
//!
//! Drives an [`Observer`] until the resource reports a target status, fails,
//! or runs out of time. The calling task blocks for the whole wait.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use crate::cancel::CancelSignal;
use crate::error::{ConvergeError, Result};
use crate::fault::{FaultClass, classify};
use crate::observer::{DELETED, Observer, resolve_not_found};
use crate::transport::ApiError;

/// What to do with a status that is neither target nor pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnexpectedStatus {
    /// Stop with [`ConvergeError::DomainState`].
    #[default]
    ImmediateOrDomainError,
    /// Keep polling as if the status were pending.
    ImplicitPending,
}

/// Describes one convergence run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    pub target: BTreeSet<String>,
    pub pending: BTreeSet<String>,
    pub timeout: Duration,
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    pub unexpected: UnexpectedStatus,
    /// Consecutive target observations required before success.
    pub continuous_target_occurrence: u32,
}

impl OperationSpec {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new<I, S>(target: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target: target.into_iter().map(Into::into).collect(),
            pending: BTreeSet::new(),
            timeout,
            initial_delay: Duration::ZERO,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            unexpected: UnexpectedStatus::default(),
            continuous_target_occurrence: 1,
        }
    }

    pub fn with_pending<I, S>(mut self, pending: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending = pending.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_unexpected(mut self, policy: UnexpectedStatus) -> Self {
        self.unexpected = policy;
        self
    }

    pub fn with_continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = occurrences;
        self
    }

    pub fn expects_deleted(&self) -> bool {
        self.target.contains(DELETED)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(ConvergeError::InvalidSpec("target set is empty".into()));
        }
        if let Some(overlap) = self.target.intersection(&self.pending).next() {
            return Err(ConvergeError::InvalidSpec(format!(
                "status {overlap:?} is both target and pending"
            )));
        }
        if self.timeout.is_zero() {
            return Err(ConvergeError::InvalidSpec("timeout must be positive".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConvergeError::InvalidSpec("poll interval must be positive".into()));
        }
        if self.continuous_target_occurrence == 0 {
            return Err(ConvergeError::InvalidSpec(
                "continuous target occurrence must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn describe_target(&self) -> String {
        self.target.iter().cloned().collect::<Vec<_>>().join("|")
    }
}

/// Successful end of a convergence run.
#[derive(Debug, Clone, PartialEq)]
pub struct Converged<T> {
    /// Last observed payload; `None` when the resource converged to deletion.
    pub object: Option<T>,
    pub status: String,
}

enum Wake {
    Elapsed,
    Cancelled,
}

async fn pause(cancel: &mut CancelSignal, until: Instant) -> Wake {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Wake::Cancelled,
        _ = sleep_until(until) => Wake::Elapsed,
    }
}

/// Failed convergence run together with the last payload the observer
/// returned, so callers can report on the object as it was last seen.
#[derive(Debug)]
pub struct WaitFailure<T> {
    pub error: ConvergeError,
    /// `None` when the run failed before any probe returned a payload.
    pub last: Option<T>,
}

impl<T> From<ConvergeError> for WaitFailure<T> {
    fn from(error: ConvergeError) -> Self {
        Self { error, last: None }
    }
}

/// Poll `observer` for `id` until it converges according to `spec`.
///
/// Returns [`ConvergeError::Fatal`] for non-retryable probe failures,
/// [`ConvergeError::DomainState`] for unexpected statuses,
/// [`ConvergeError::Timeout`] when the deadline passes and
/// [`ConvergeError::Cancelled`] when `cancel` fires. Transient probe failures
/// are absorbed and polling continues.
pub async fn wait_for<O>(
    spec: &OperationSpec,
    observer: &O,
    id: &str,
    cancel: &CancelSignal,
) -> Result<Converged<O::Object>>
where
    O: Observer + ?Sized,
{
    wait_for_with_last(spec, observer, id, cancel)
        .await
        .map_err(|failure| failure.error)
}

/// Same as [`wait_for`], but a failure keeps the last observed payload.
pub async fn wait_for_with_last<O>(
    spec: &OperationSpec,
    observer: &O,
    id: &str,
    cancel: &CancelSignal,
) -> std::result::Result<Converged<O::Object>, WaitFailure<O::Object>>
where
    O: Observer + ?Sized,
{
    spec.validate()?;

    let mut cancel = cancel.clone();
    let started = Instant::now();
    let deadline = started + spec.timeout;
    let expects_deleted = spec.expects_deleted();
    let mut last_status: Option<String> = None;
    let mut last: Option<O::Object> = None;
    let mut target_hits: u32 = 0;

    let timed_out = |last_status: Option<String>, last: Option<O::Object>| WaitFailure {
        error: ConvergeError::Timeout {
            target: spec.describe_target(),
            last_status,
            waited: started.elapsed(),
        },
        last,
    };
    let cancelled = |last: Option<O::Object>| WaitFailure {
        error: ConvergeError::Cancelled,
        last,
    };

    debug!(id, target = %spec.describe_target(), "waiting for convergence");

    if !spec.initial_delay.is_zero() {
        if let Wake::Cancelled = pause(&mut cancel, (started + spec.initial_delay).min(deadline)).await {
            return Err(cancelled(last));
        }
    }

    loop {
        if Instant::now() >= deadline {
            return Err(timed_out(last_status, last));
        }

        let probe = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(last)),
            _ = sleep_until(deadline) => return Err(timed_out(last_status, last)),
            probe = observer.observe(id) => probe,
        };

        match resolve_not_found(probe, expects_deleted) {
            Err(e) if classify(&e) == FaultClass::Retryable => {
                debug!(id, error = %e, "transient probe failure");
            }
            Err(e) => {
                return Err(WaitFailure {
                    error: e.into(),
                    last,
                });
            }
            Ok(observation) => {
                trace!(id, status = %observation.status, "observed");

                if observation.vanished && !expects_deleted {
                    let error = ApiError::not_found(format!(
                        "{id} disappeared while waiting for {}",
                        spec.describe_target()
                    ));
                    return Err(WaitFailure {
                        error: error.into(),
                        last,
                    });
                }

                if spec.target.contains(&observation.status) {
                    target_hits += 1;
                    if target_hits >= spec.continuous_target_occurrence {
                        debug!(id, status = %observation.status, "converged");
                        return Ok(Converged {
                            object: observation.object,
                            status: observation.status,
                        });
                    }
                } else {
                    target_hits = 0;
                    let pending = spec.pending.contains(&observation.status);
                    if !pending && spec.unexpected == UnexpectedStatus::ImmediateOrDomainError {
                        return Err(WaitFailure {
                            error: ConvergeError::DomainState {
                                status: observation.status,
                                reason: observation.reason,
                            },
                            last: observation.object.or(last),
                        });
                    }
                }

                last_status = Some(observation.status);
                if observation.object.is_some() {
                    last = observation.object;
                }
            }
        }

        let next = (Instant::now() + spec.poll_interval).min(deadline);
        if let Wake::Cancelled = pause(&mut cancel, next).await {
            return Err(cancelled(last));
        }
    }
}
