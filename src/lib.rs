//! # Refsync - Archival referential synchronization
//!
//! Keeps the classification tree of a records management unit in a versioned
//! graph store in step with the unit's ledger exports.
//!
//! ## Overview
//!
//! An archival referential is a tree of classification entries: a unit root,
//! internal `referential` nodes and `referentialLeaf` nodes under which
//! dossiers are filed. The ledger is maintained elsewhere and exported as
//! delimited text; every export is a [`Snapshot`] labelled with a version.
//!
//! Refsync provides:
//! - Loading and validating ledger snapshots ([`snapshot`])
//! - Building the parent/child tree with kinds derived from child counts ([`tree`])
//! - Membership differences between two snapshots ([`diff`])
//! - Idempotent per-node writes to the store ([`sync`])
//! - Closing of removed nodes and dossiers, with lifecycle events ([`lifecycle`])
//! - Current and historical reconstruction of any subtree ([`reconstruct`])
//! - Moving a node under another parent ([`reparent`])
//! - Loading dossiers and their documents ([`records`])
//! - Loading the agents tree ([`Referential::load_agents`])
//! - Consistency checks of stored trees ([`verification`])
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use refsync::ReferentialBuilder;
//! use refsync::store::FsStore;
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FsStore::init_or_open(PathBuf::from("./.refsync"))?;
//! let referential = ReferentialBuilder::new("acv")
//!     .unit_description("Archives cantonales vaudoises")
//!     .build(store)?;
//!
//! // Containers and vocabularies
//! referential.bootstrap();
//!
//! let snapshot = referential.load_snapshot(Path::new("acv.csv"), Some("1.0.0"))?;
//! let report = referential.synchronize(&snapshot)?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Store
//!
//! The store is reached through the [`store::RemoteStore`] trait. Every write
//! creates a new historical representation with a store-wide sequence number;
//! current representations carry an entity tag used for optimistic
//! concurrency. [`store::InMemoryStore`] and [`store::FsStore`] implement it.
//!
//! ### Lifecycle
//!
//! Nodes are `open` or `closed`. A closed node is never written again by
//! synchronization; reopening is not supported.
//!
//! ### Versions
//!
//! Every synchronized representation records the snapshot version it was
//! written under, so a tree can be reconstructed as it stood at any version.
//!
//! ## Error Handling
//!
//! Operations return `Result<T, RefsyncError>`. Batch operations report
//! per-node failures in a [`RunReport`] and keep going.
//!
//! ## Module Organization
//!
//! - [`referential`]: Entry point tying the subsystems together
//! - [`store`]: Store contract and implementations
//! - [`key`]: Node addressing
//! - [`representation`]: Typed node representations
//! - [`rules`]: Protection, closing and retention rules
//! - [`types`]: Common types and configuration
//! - [`error`]: Error types and handling

// Public API modules
pub mod diff;
pub mod error;
pub mod key;
pub mod lifecycle;
pub mod reconstruct;
pub mod records;
pub mod referential;
pub mod reparent;
pub mod representation;
pub mod rules;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod tree;
pub mod types;
pub mod verification;

// Internal modules (not part of public API)
mod collections;
pub mod utils;

// Re-export main types for convenience
pub use diff::{DiffStats, SnapshotDiff};
pub use error::{RefsyncError, Result, ValidationError, ValidationKind};
pub use key::{Container, NodeKey};
pub use lifecycle::{CloseOutcome, LifecycleManager};
pub use reconstruct::{Reconstruction, Reconstructor};
pub use records::{RecordsLedger, RecordsLoader, RecordsWriter};
pub use referential::{Referential, ReferentialBuilder, UpdateReport};
pub use reparent::{MoveOutcome, ReparentOperator};
pub use representation::{ETag, Representation};
pub use rules::RuleSet;
pub use snapshot::SnapshotLoader;
pub use store::{InMemoryStore, RemoteStore};
pub use sync::Synchronizer;
pub use tree::{ReferentialTree, TreeSpace};
pub use types::*;
pub use verification::{ConsistencyReport, ConsistencyVerifier};
