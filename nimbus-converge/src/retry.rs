//! Bounded retry for single mutating calls.
//!
//! Wraps one create/update/delete request. The multi-minute convergence wait
//! that usually follows is the poller's job, not this one.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::error::{ConvergeError, Result};
use crate::fault::{FaultClass, classify};
use crate::transport::ApiError;

/// Timing for [`retry_on_transient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Overall budget; no attempt starts after it.
    pub timeout: Duration,
    /// Pause after the first transient failure.
    pub interval: Duration,
    /// Upper bound for the doubling pause. Equal to `interval` for a fixed pause.
    pub max_interval: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);
    pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10);

    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Self::DEFAULT_INTERVAL,
            max_interval: Self::DEFAULT_MAX_INTERVAL,
        }
    }

    /// Fixed pause between attempts.
    pub fn fixed(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            max_interval: interval,
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or the policy deadline passes.
///
/// Fatal failures are returned after the first attempt. Transient ones are
/// absorbed until the deadline, after which the last one is returned.
pub async fn retry_on_transient<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ApiError>>,
{
    let mut cancel = cancel.clone();
    let deadline = Instant::now() + policy.timeout;
    let mut pause = policy.interval;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConvergeError::Cancelled),
            outcome = op() => outcome,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if classify(&err) == FaultClass::Fatal {
            return Err(err.into());
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(attempt, error = %err, "retry budget exhausted");
            return Err(err.into());
        }

        debug!(attempt, error = %err, "transient failure, retrying");

        let wake = (now + pause).min(deadline);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConvergeError::Cancelled),
            _ = sleep_until(wake) => {}
        }

        pause = (pause * 2).min(policy.max_interval);
    }
}
