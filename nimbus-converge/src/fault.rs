//! Transient fault classification.
//!
//! The decision is made from the transport status code alone, never from
//! the error message.

use crate::error::ConvergeError;
use crate::transport::ApiError;

/// Whether a failed remote call is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    Retryable,
    Fatal,
}

/// Anything that can be classified as a fault.
pub trait Classify {
    /// HTTP status carried by the error, if any.
    fn status_code(&self) -> Option<u16>;

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Server-side codes that resolve without caller intervention.
pub const TRANSIENT_SERVER_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Concurrent modification on the remote side; it settles on its own.
pub const CONFLICT_STATUS: u16 = 409;

pub fn classify<E: Classify + ?Sized>(err: &E) -> FaultClass {
    if err.is_cancelled() {
        return FaultClass::Fatal;
    }

    match err.status_code() {
        Some(code) if TRANSIENT_SERVER_STATUSES.contains(&code) => FaultClass::Retryable,
        Some(CONFLICT_STATUS) => FaultClass::Retryable,
        _ => FaultClass::Fatal,
    }
}

impl Classify for ApiError {
    fn status_code(&self) -> Option<u16> {
        self.status
    }
}

impl Classify for ConvergeError {
    fn status_code(&self) -> Option<u16> {
        match self {
            ConvergeError::Fatal(e) => e.status,
            _ => None,
        }
    }

    fn is_cancelled(&self) -> bool {
        ConvergeError::is_cancelled(self)
    }
}

/// Treats "not found" after a delete call as a completed deletion.
pub fn check_deleted(result: Result<(), ApiError>) -> Result<(), ApiError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}
