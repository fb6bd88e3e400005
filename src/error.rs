//! Error types for the refsync library
//!
//! This module defines the error taxonomy used across the crate. Three kinds of
//! failure exist:
//!
//! - **Validation** errors describe a malformed ledger row (ambiguous or missing
//!   parent, duplicate id, unparsable rule). The row's node is never written.
//! - **Transport** errors describe a single failed interaction with the remote
//!   store. Inside a run they are recorded per node and processing continues.
//! - **Consistency hazards** (lost updates on read-modify-write, concurrent
//!   writers) cannot be detected by the engine in general. Where the store
//!   supports preconditions they surface as [`RefsyncError::PreconditionFailed`].
//!
//! Only unrecoverable conditions (unreadable snapshot, unit mismatch, broken
//! store layout) are returned as `Err` from run-level operations; everything
//! else ends up in a [`RunReport`](crate::types::RunReport).

use std::fmt;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type alias for Results in the refsync library
pub type Result<T> = std::result::Result<T, RefsyncError>;

/// Main error type for all refsync operations
#[derive(Debug, Error)]
pub enum RefsyncError {
    /// I/O errors while reading ledgers or the filesystem store
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors raised by the delimited ledger reader
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid glob pattern passed to a store search
    #[error("Invalid search pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// Directory walk error from the filesystem store
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A ledger row failed validation
    #[error("Validation error: {0}")]
    Validation(ValidationError),

    /// A remote read or write failed
    #[error("Transport error on {key}: {message}")]
    Transport {
        /// Path of the node being accessed
        key: String,
        /// Description of the failure
        message: String,
    },

    /// The addressed node does not exist in the store
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// No historical representation carries the requested version label
    #[error("No representation of {key} carries version '{version}'")]
    VersionNotFound {
        /// Path of the node
        key: String,
        /// Requested version label
        version: String,
    },

    /// A conditional write was refused because the node changed meanwhile
    #[error("Precondition failed on {key}: expected {expected}, found {actual}")]
    PreconditionFailed {
        /// Path of the node
        key: String,
        /// Precondition supplied by the caller
        expected: String,
        /// State found in the store
        actual: String,
    },

    /// A mutation was attempted on a closed node
    #[error("Node {0} is closed")]
    NodeClosed(String),

    /// A node was addressed with an operation meant for another kind
    #[error("Node {key} is a {actual}, expected {expected}")]
    WrongKind {
        /// Path of the node
        key: String,
        /// Kind the operation requires
        expected: String,
        /// Kind found in the store
        actual: String,
    },

    /// The requested parent link would create a cycle
    #[error("Moving {node} under {parent} would create a cycle")]
    CircularDependency {
        /// Node being moved
        node: String,
        /// Requested new parent
        parent: String,
    },

    /// A path could not be parsed into a typed key
    #[error("Invalid node key: {0}")]
    InvalidKey(String),

    /// Two snapshots of different units were compared
    #[error("Unit mismatch: {left} vs {right}")]
    UnitMismatch {
        /// Unit of the first snapshot
        left: String,
        /// Unit of the second snapshot
        right: String,
    },

    /// Store is not initialized
    #[error("Store not initialized at path: {0:?}")]
    StoreNotInitialized(PathBuf),

    /// Store already exists
    #[error("Store already exists at path: {0:?}")]
    StoreAlreadyExists(PathBuf),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RefsyncError {
    /// Create a transport error for the given node path
    pub fn transport(key: impl Into<String>, msg: impl Into<String>) -> Self {
        RefsyncError::Transport {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        RefsyncError::Internal(msg.into())
    }

    /// Check if retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RefsyncError::Transport { .. }
                | RefsyncError::PreconditionFailed { .. }
                | RefsyncError::Io(_)
        )
    }

    /// Check if this error stems from malformed input rows
    pub fn is_validation(&self) -> bool {
        matches!(self, RefsyncError::Validation(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            RefsyncError::NodeNotFound(key) => {
                format!("Node '{}' not found. Use 'refsync tree' to inspect the current referential.", key)
            }
            RefsyncError::PreconditionFailed { key, .. } => {
                format!(
                    "Node '{}' was modified by another writer since it was read. \
                     Re-run the operation; concurrent runs on one unit must be serialised.",
                    key
                )
            }
            RefsyncError::StoreNotInitialized(path) => {
                format!("Store not initialized at {:?}. Run 'refsync init' first.", path)
            }
            RefsyncError::VersionNotFound { key, version } => {
                format!(
                    "Node '{}' has no representation written under version '{}'. \
                     Use 'refsync history' to list known versions.",
                    key, version
                )
            }
            _ => self.to_string(),
        }
    }
}

impl From<ValidationError> for RefsyncError {
    fn from(err: ValidationError) -> Self {
        RefsyncError::Validation(err)
    }
}

/// Category of a ledger validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    /// The id cell is empty or not a valid identifier
    InvalidId,
    /// The same id appears on more than one row
    DuplicateId,
    /// The parent cell is empty
    MissingParent,
    /// The parent cell names an id absent from the snapshot
    UnknownParent,
    /// Following parent links from this row loops back on itself
    Cycle,
    /// A governance rule cell holds an unknown value
    InvalidRule,
    /// A records ledger row is malformed
    InvalidRecord,
    /// The row's key already holds a node of another collection
    KindConflict,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValidationKind::InvalidId => "invalid id",
            ValidationKind::DuplicateId => "duplicate id",
            ValidationKind::MissingParent => "missing parent",
            ValidationKind::UnknownParent => "unknown parent",
            ValidationKind::Cycle => "parent cycle",
            ValidationKind::InvalidRule => "invalid rule",
            ValidationKind::InvalidRecord => "invalid record",
            ValidationKind::KindConflict => "kind conflict",
        };
        f.write_str(label)
    }
}

/// A rejected ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("row {row}: {kind} ({id}): {detail}")]
pub struct ValidationError {
    /// 1-based data row number in the source file (0 when built in memory)
    pub row: usize,
    /// Raw id cell of the row
    pub id: String,
    /// Failure category
    pub kind: ValidationKind,
    /// Human readable detail
    pub detail: String,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(row: usize, id: impl Into<String>, kind: ValidationKind, detail: impl Into<String>) -> Self {
        Self {
            row,
            id: id.into(),
            kind,
            detail: detail.into(),
        }
    }
}
