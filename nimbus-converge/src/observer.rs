//! Remote state observation.
//!
//! An [`Observer`] performs exactly one probe per call. Backends implement it
//! differently, but every implementation reports through [`Observation`] so
//! the poller never needs to know which backend it is talking to.

use std::sync::Arc;

use async_trait::async_trait;

use crate::transport::ApiError;

/// Synthetic status reported for resources the backend no longer knows.
pub const DELETED: &str = "DELETED";

/// Outcome of one successful probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T> {
    /// Observed payload. Absent when the resource is gone.
    pub object: Option<T>,
    /// Normalized status label.
    pub status: String,
    /// Backend-supplied explanation, mostly for error states.
    pub reason: Option<String>,
    /// Set when the status was synthesized from a missing resource.
    pub vanished: bool,
}

impl<T> Observation<T> {
    pub fn new(object: T, status: impl Into<String>) -> Self {
        Self {
            object: Some(object),
            status: status.into(),
            reason: None,
            vanished: false,
        }
    }

    /// The resource could not be found.
    pub fn deleted() -> Self {
        Self {
            object: None,
            status: DELETED.to_string(),
            reason: None,
            vanished: true,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Observation<U> {
        Observation {
            object: self.object.map(f),
            status: self.status,
            reason: self.reason,
            vanished: self.vanished,
        }
    }
}

/// One synchronous probe against the remote control plane.
#[async_trait]
pub trait Observer: Send + Sync {
    type Object: Send;

    async fn observe(&self, id: &str) -> Result<Observation<Self::Object>, ApiError>;
}

#[async_trait]
impl<O: Observer + ?Sized> Observer for Arc<O> {
    type Object = O::Object;

    async fn observe(&self, id: &str) -> Result<Observation<Self::Object>, ApiError> {
        (**self).observe(id).await
    }
}

/// Apply the not-found rule to one probe result.
///
/// A 404 counts as a `DELETED` observation only when the caller is waiting
/// for deletion. Otherwise the 404 stays an error: a resource vanishing
/// mid-create is never success.
pub fn resolve_not_found<T>(
    probe: Result<Observation<T>, ApiError>,
    expects_deleted: bool,
) -> Result<Observation<T>, ApiError> {
    match probe {
        Err(e) if e.is_not_found() && expects_deleted => Ok(Observation::deleted()),
        other => other,
    }
}
