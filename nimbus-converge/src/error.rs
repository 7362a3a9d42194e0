//! Convergence error types.

use std::time::Duration;

use thiserror::Error;

use crate::identity::IdentityError;
use crate::transport::ApiError;

/// Errors surfaced to resource controllers.
///
/// Callers are expected to tell these apart: a resource that settled in an
/// unexpected state (`DomainState`) needs different messaging than one that
/// never settled (`Timeout`) or a request the backend refused (`Fatal`).
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Backend rejected the request, or a probe failed with a non-retryable fault.
    #[error("backend error: {0}")]
    Fatal(#[from] ApiError),

    /// Deadline passed while the resource was still pending.
    #[error(
        "timed out after {waited:?} waiting for {target} (last status: {})",
        status_or_none(.last_status)
    )]
    Timeout {
        target: String,
        last_status: Option<String>,
        waited: Duration,
    },

    /// Caller aborted the surrounding operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Remote side reached a status that is neither target nor pending.
    #[error("resource entered unexpected status {status}{}", reason_suffix(.reason))]
    DomainState {
        status: String,
        reason: Option<String>,
    },

    /// The operation spec violates its own invariants.
    #[error("invalid operation spec: {0}")]
    InvalidSpec(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl ConvergeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConvergeError::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConvergeError::Cancelled)
    }

    /// Status string attached to a domain failure.
    pub fn domain_status(&self) -> Option<&str> {
        match self {
            ConvergeError::DomainState { status, .. } => Some(status),
            _ => None,
        }
    }
}

fn status_or_none(status: &Option<String>) -> &str {
    status.as_deref().unwrap_or("none")
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

/// Result type for convergence operations.
pub type Result<T> = std::result::Result<T, ConvergeError>;
