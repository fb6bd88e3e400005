//! Remote store contract
//!
//! The engine talks to the version-aware graph store only through the
//! [`RemoteStore`] trait:
//!
//! - a write fully replaces a node's current representation and records it as
//!   a new immutable historical representation;
//! - a read returns the current representation, or `None` when the node does
//!   not exist;
//! - the history of a node is a list of [`HistoryRef`]s ordered by a
//!   store-wide, strictly increasing sequence number;
//! - a search enumerates node keys matching a glob pattern, where `*` never
//!   crosses a `/`.
//!
//! Writes accept a [`Precondition`] so read-modify-write sequences can detect
//! a concurrent writer instead of silently overwriting its change.
//!
//! Two implementations are provided: [`InMemoryStore`] for tests and embedding,
//! and [`FsStore`] which persists nodes and their history on disk.

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::InMemoryStore;

use crate::error::{RefsyncError, Result};
use crate::key::NodeKey;
use crate::representation::{ETag, Representation};
use chrono::{DateTime, Utc};
use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Condition a write must satisfy to be applied
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Precondition {
    /// Unconditional write
    #[default]
    None,
    /// The current representation must carry this tag
    IfMatch(ETag),
    /// The node must not exist yet
    IfAbsent,
}

impl Precondition {
    /// Precondition guarding a rewrite of what was just read
    pub fn from_read(current: Option<&StoredRepresentation>) -> Self {
        match current {
            Some(stored) => Precondition::IfMatch(stored.etag.clone()),
            None => Precondition::IfAbsent,
        }
    }

    /// Check the precondition against the node's current tag
    pub fn check(&self, key: &NodeKey, current: Option<&ETag>) -> Result<()> {
        let failed = |expected: String| RefsyncError::PreconditionFailed {
            key: key.path(),
            expected,
            actual: current.map(|t| t.to_string()).unwrap_or_else(|| "absent".to_string()),
        };
        match (self, current) {
            (Precondition::None, _) => Ok(()),
            (Precondition::IfMatch(expected), Some(actual)) if expected == actual => Ok(()),
            (Precondition::IfMatch(expected), _) => Err(failed(expected.to_string())),
            (Precondition::IfAbsent, None) => Ok(()),
            (Precondition::IfAbsent, Some(_)) => Err(failed("absent".to_string())),
        }
    }
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Node written
    pub key: NodeKey,
    /// Sequence number of the new historical representation
    pub seq: u64,
    /// Tag of the new current representation
    pub etag: ETag,
    /// Write timestamp
    pub created_at: DateTime<Utc>,
}

/// Current representation of a node with its store metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRepresentation {
    /// Representation content
    pub representation: Representation,
    /// Content tag
    pub etag: ETag,
    /// Sequence number of the write that produced it
    pub seq: u64,
    /// Write timestamp
    pub created_at: DateTime<Utc>,
}

/// Reference to one historical representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryRef {
    /// Node the representation belongs to
    pub key: NodeKey,
    /// Store-wide sequence number, strictly increasing across writes
    pub seq: u64,
    /// Write timestamp
    pub created_at: DateTime<Utc>,
}

/// Historical representation as persisted by the stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HistoryEntry {
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub representation: Representation,
}

/// Read/write contract of the version-aware graph store
pub trait RemoteStore: Send + Sync {
    /// Replace the current representation of a node
    ///
    /// Every successful write creates exactly one new historical representation.
    fn write(&self, key: &NodeKey, representation: &Representation, precondition: &Precondition) -> Result<WriteReceipt>;

    /// Current representation, or `None` if the node does not exist
    fn read(&self, key: &NodeKey) -> Result<Option<StoredRepresentation>>;

    /// Historical representations of a node, oldest first
    fn read_history(&self, key: &NodeKey) -> Result<Vec<HistoryRef>>;

    /// Content of one historical representation
    fn read_at(&self, reference: &HistoryRef) -> Result<Representation>;

    /// Keys of existing nodes whose path matches a glob pattern, sorted by path
    fn search(&self, pattern: &str) -> Result<Vec<NodeKey>>;
}

impl<S: RemoteStore + ?Sized> RemoteStore for &S {
    fn write(&self, key: &NodeKey, representation: &Representation, precondition: &Precondition) -> Result<WriteReceipt> {
        (**self).write(key, representation, precondition)
    }

    fn read(&self, key: &NodeKey) -> Result<Option<StoredRepresentation>> {
        (**self).read(key)
    }

    fn read_history(&self, key: &NodeKey) -> Result<Vec<HistoryRef>> {
        (**self).read_history(key)
    }

    fn read_at(&self, reference: &HistoryRef) -> Result<Representation> {
        (**self).read_at(reference)
    }

    fn search(&self, pattern: &str) -> Result<Vec<NodeKey>> {
        (**self).search(pattern)
    }
}

impl<S: RemoteStore + ?Sized> RemoteStore for Arc<S> {
    fn write(&self, key: &NodeKey, representation: &Representation, precondition: &Precondition) -> Result<WriteReceipt> {
        (**self).write(key, representation, precondition)
    }

    fn read(&self, key: &NodeKey) -> Result<Option<StoredRepresentation>> {
        (**self).read(key)
    }

    fn read_history(&self, key: &NodeKey) -> Result<Vec<HistoryRef>> {
        (**self).read_history(key)
    }

    fn read_at(&self, reference: &HistoryRef) -> Result<Representation> {
        (**self).read_at(reference)
    }

    fn search(&self, pattern: &str) -> Result<Vec<NodeKey>> {
        (**self).search(pattern)
    }
}

impl<S: RemoteStore + ?Sized> RemoteStore for Box<S> {
    fn write(&self, key: &NodeKey, representation: &Representation, precondition: &Precondition) -> Result<WriteReceipt> {
        (**self).write(key, representation, precondition)
    }

    fn read(&self, key: &NodeKey) -> Result<Option<StoredRepresentation>> {
        (**self).read(key)
    }

    fn read_history(&self, key: &NodeKey) -> Result<Vec<HistoryRef>> {
        (**self).read_history(key)
    }

    fn read_at(&self, reference: &HistoryRef) -> Result<Representation> {
        (**self).read_at(reference)
    }

    fn search(&self, pattern: &str) -> Result<Vec<NodeKey>> {
        (**self).search(pattern)
    }
}

/// Compile a search pattern; `*` and `?` never match `/`
pub(crate) fn compile_pattern(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern.trim_matches('/'))
        .literal_separator(true)
        .build()?;
    Ok(glob.compile_matcher())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_check() {
        let key = NodeKey::record("acv", "1");
        let tag = ETag::new("abc");
        let other = ETag::new("def");

        assert!(Precondition::None.check(&key, None).is_ok());
        assert!(Precondition::IfAbsent.check(&key, None).is_ok());
        assert!(Precondition::IfAbsent.check(&key, Some(&tag)).is_err());
        assert!(Precondition::IfMatch(tag.clone()).check(&key, Some(&tag)).is_ok());

        let err = Precondition::IfMatch(tag.clone()).check(&key, Some(&other)).unwrap_err();
        assert!(matches!(err, RefsyncError::PreconditionFailed { ref actual, .. } if actual == "def"));
        assert!(Precondition::IfMatch(tag).check(&key, None).is_err());
    }

    #[test]
    fn test_pattern_does_not_cross_segments() {
        let matcher = compile_pattern("records/acv/*").unwrap();
        assert!(matcher.is_match("records/acv/12"));
        assert!(!matcher.is_match("records/acv/D1/documents"));
        assert!(!matcher.is_match("records/aev/12"));

        let deep = compile_pattern("records/acv/**").unwrap();
        assert!(deep.is_match("records/acv/D1/documents/1"));
    }
}
