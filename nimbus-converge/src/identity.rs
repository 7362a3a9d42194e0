//! Parent-scoped resource identifiers.
//!
//! Child resources (node groups inside a cluster, interfaces on a NAS volume)
//! are addressed by a single opaque string `parent/child`, created once when
//! the child is created and never rewritten.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("unable to determine parent and child from id {0:?}")]
    Malformed(String),

    #[error("invalid reference {0:?}: expected <id>[/<parent_id>]")]
    ImportRef(String),
}

pub fn encode(parent_id: &str, child_id: &str) -> String {
    format!("{parent_id}{SEPARATOR}{child_id}")
}

/// Split a composite id into `(parent, child)`.
///
/// A composite id has exactly two non-empty segments. Anything else is
/// rejected, so for every id this accepts the child equals
/// [`normalize_child_ref`] of the same id.
pub fn decode(id: &str) -> Result<(String, String), IdentityError> {
    let mut parts = id.split(SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(parent), Some(child), None) if !parent.is_empty() && !child.is_empty() => {
            Ok((parent.to_string(), child.to_string()))
        }
        _ => Err(IdentityError::Malformed(id.to_string())),
    }
}

/// Accept either a composite id or a bare child id and return the child id,
/// which is always the last segment.
pub fn normalize_child_ref(reference: &str) -> &str {
    reference
        .rsplit_once(SEPARATOR)
        .map_or(reference, |(_, child)| child)
}

/// Parse an import reference of the form `<id>[/<parent_id>]`.
pub fn split_import_ref(reference: &str) -> Result<(String, Option<String>), IdentityError> {
    let mut parts = reference.splitn(2, SEPARATOR);
    let id = parts.next().unwrap_or_default();
    if id.is_empty() {
        return Err(IdentityError::ImportRef(reference.to_string()));
    }
    let parent = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
    Ok((id.to_string(), parent))
}

/// Decoded `parent/child` identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    parent: String,
    child: String,
}

impl CompositeId {
    pub fn new(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
        }
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn child(&self) -> &str {
        &self.child
    }

    pub fn encode(&self) -> String {
        encode(&self.parent, &self.child)
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.parent, self.child)
    }
}

impl FromStr for CompositeId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (parent, child) = decode(s)?;
        Ok(Self { parent, child })
    }
}
