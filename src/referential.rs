//! Main refsync entry point
//!
//! This module provides [`Referential`], which ties the load pipeline and
//! the store operations of one unit together.
//!
//! ## Overview
//!
//! A `Referential` owns a [`RemoteStore`] and the unit's [`RefsyncConfig`]
//! and coordinates the subsystems:
//!
//! - **Snapshot Loader** and **Tree Builder**: ledger file to validated tree
//! - **Diff Engine**: which nodes left the ledger between two snapshots
//! - **Synchronizer**: one write per node, never aborting on a failure
//! - **Lifecycle Manager**: closing removed nodes and dossiers
//! - **Tree Reconstructor**: current and historical views
//! - **Reparent Operator**: moving a node under another parent
//! - **Records** and **Verification**: dossier loading and consistency checks
//!
//! ## Run reports
//!
//! Operations touching many nodes return a [`RunReport`] listing one outcome
//! per node instead of failing on the first error. Only conditions that make
//! the whole run meaningless (unreadable ledger, wrong unit) are returned as
//! `Err`.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use refsync::{ReferentialBuilder, store::FsStore};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FsStore::init_or_open(PathBuf::from("./.refsync"))?;
//! let referential = ReferentialBuilder::new("acv").build(store)?;
//!
//! referential.bootstrap();
//! let v1 = referential.load_snapshot(Path::new("acv1.0.0.csv"), Some("1.0.0"))?;
//! let report = referential.synchronize(&v1)?;
//! println!("{}", report.summary());
//!
//! let v2 = referential.load_snapshot(Path::new("acv1.1.0.csv"), Some("1.1.0"))?;
//! let update = referential.update(&v1, &v2)?;
//! println!("{}", update.summary());
//! # Ok(())
//! # }
//! ```

use crate::diff::SnapshotDiff;
use crate::error::{RefsyncError, Result};
use crate::key::{Container, NodeKey};
use crate::lifecycle::{CloseOutcome, LifecycleManager};
use crate::reconstruct::{Reconstruction, Reconstructor};
use crate::records::{DossierSummary, RecordsLoader, RecordsWriter};
use crate::reparent::{MoveOutcome, ReparentOperator};
use crate::snapshot::SnapshotLoader;
use crate::store::RemoteStore;
use crate::sync::Synchronizer;
use crate::tree::{ReferentialTree, TreeSpace};
use crate::types::{ColumnMapping, NodeId, OrphanPolicy, RefsyncConfig, RunReport, Snapshot};
use crate::verification::{ConsistencyReport, ConsistencyVerifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Result of applying a new snapshot over a previous one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReport {
    /// Membership difference between the snapshots
    pub diff: SnapshotDiff,
    /// Closing of the removed nodes
    pub closed: RunReport,
    /// Synchronization of the new snapshot
    pub synchronized: RunReport,
}

impl UpdateReport {
    /// Whether both phases completed without rejected or failed nodes
    pub fn is_clean(&self) -> bool {
        self.closed.is_clean() && self.synchronized.is_clean()
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "update {} {} -> {}: +{} -{} ={}; {}; {}",
            self.diff.unit,
            self.diff.from_version,
            self.diff.to_version,
            self.diff.stats.added,
            self.diff.stats.removed,
            self.diff.stats.retained,
            self.closed.summary(),
            self.synchronized.summary()
        )
    }
}

/// Referential of one unit backed by a store
///
/// # Examples
///
/// ```rust
/// use refsync::{ReferentialBuilder, Row, ParentRef, Snapshot};
/// use refsync::store::InMemoryStore;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let referential = ReferentialBuilder::new("acv").build(InMemoryStore::new())?;
/// let snapshot = Snapshot::from_rows("acv", "1.0.0", vec![
///     Row::new("1", ParentRef::UnitRoot, "A"),
///     Row::new("2", ParentRef::Node("1".into()), "A.1"),
/// ]);
///
/// let report = referential.synchronize(&snapshot)?;
/// assert!(report.is_clean());
/// # Ok(())
/// # }
/// ```
pub struct Referential<S: RemoteStore> {
    store: S,
    config: RefsyncConfig,
}

impl<S: RemoteStore> Referential<S> {
    /// Create a referential with an already validated configuration
    ///
    /// Prefer [`ReferentialBuilder`], which validates the configuration.
    pub fn new(store: S, config: RefsyncConfig) -> Result<Self> {
        config.validate()?;
        debug!("Referential for unit {} ready", config.unit);
        Ok(Self { store, config })
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active configuration
    pub fn config(&self) -> &RefsyncConfig {
        &self.config
    }

    /// Unit code
    pub fn unit(&self) -> &str {
        &self.config.unit
    }

    /// Key of the unit root
    pub fn root_key(&self) -> NodeKey {
        NodeKey::unit_root(&self.config.unit)
    }

    /// Key of a node of this unit
    pub fn node_key(&self, id: &str) -> NodeKey {
        NodeKey::record(&self.config.unit, id)
    }

    /// Key of an agent by its export code
    pub fn agent_key(&self, code: &str) -> NodeKey {
        NodeKey::vocabulary(Container::Agents, self.config.agents.name(code))
    }

    /// Write containers and vocabularies
    pub fn bootstrap(&self) -> RunReport {
        Synchronizer::new(&self.store, &self.config).bootstrap()
    }

    /// Load a ledger file, labelled `version` or the configured default
    pub fn load_snapshot(&self, path: &Path, version: Option<&str>) -> Result<Snapshot> {
        let version = version.unwrap_or(&self.config.default_version);
        SnapshotLoader::new(&self.config).load(path, version)
    }

    /// Build the tree of a snapshot with the configured orphan policy
    pub fn build_tree(&self, snapshot: &Snapshot) -> ReferentialTree {
        let tree = ReferentialTree::build(snapshot, self.config.orphan_policy);
        for warning in tree.warnings() {
            warn!("{}", warning);
        }
        tree
    }

    fn check_unit(&self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.unit != self.config.unit {
            return Err(RefsyncError::UnitMismatch {
                left: self.config.unit.clone(),
                right: snapshot.unit.clone(),
            });
        }
        Ok(())
    }

    /// Write every node of a snapshot
    ///
    /// # Errors
    ///
    /// [`RefsyncError::UnitMismatch`] if the snapshot belongs to another unit.
    #[instrument(skip(self, snapshot), fields(version = %snapshot.version))]
    pub fn synchronize(&self, snapshot: &Snapshot) -> Result<RunReport> {
        self.check_unit(snapshot)?;
        let tree = self.build_tree(snapshot);
        Ok(Synchronizer::new(&self.store, &self.config).synchronize(&tree))
    }

    /// Apply `new` over `old`: close removed nodes, then synchronize `new`
    ///
    /// Closing does not cascade; children of a removed node are closed only
    /// if they left the ledger themselves.
    #[instrument(skip(self, old, new), fields(from = %old.version, to = %new.version))]
    pub fn update(&self, old: &Snapshot, new: &Snapshot) -> Result<UpdateReport> {
        self.check_unit(old)?;
        self.check_unit(new)?;
        let diff = SnapshotDiff::compute(old, new)?;
        info!(
            "Updating {} from {} to {}: {} added, {} removed",
            self.config.unit, diff.from_version, diff.to_version, diff.stats.added, diff.stats.removed
        );

        if diff.stats.held > 0 {
            warn!(
                "{} nodes rejected in {} are left as they stand: {:?}",
                diff.stats.held, diff.to_version, diff.held
            );
        }

        let closed = self.close_removed(&diff.removed);
        let synchronized = self.synchronize(new)?;

        Ok(UpdateReport {
            diff,
            closed,
            synchronized,
        })
    }

    /// Close nodes of this unit that left the ledger
    pub fn close_removed(&self, removed: &[NodeId]) -> RunReport {
        LifecycleManager::new(&self.store, &self.config).close_removed(&self.config.unit, removed)
    }

    /// Close a dossier, stamping the event with `at` or the current time
    pub fn close_dossier(&self, dossier: &str, at: Option<DateTime<Utc>>) -> Result<CloseOutcome> {
        LifecycleManager::new(&self.store, &self.config).close_dossier(
            &self.config.unit,
            dossier,
            at.unwrap_or_else(Utc::now),
        )
    }

    /// Move a node under a new parent
    pub fn move_node(&self, node: &NodeKey, new_parent: &NodeKey) -> Result<MoveOutcome> {
        ReparentOperator::new(&self.store).move_node(node, new_parent)
    }

    /// Reconstruct the tree below `key`, optionally at a snapshot version
    pub fn reconstruct(&self, key: &NodeKey, version: Option<&str>) -> Reconstruction {
        Reconstructor::new(&self.store, self.config.max_depth).reconstruct(key, version)
    }

    /// Version labels a node was written under, oldest first
    pub fn versions(&self, key: &NodeKey) -> Result<Vec<String>> {
        Reconstructor::new(&self.store, self.config.max_depth).versions(key)
    }

    /// Load a records ledger and write its dossiers and documents
    pub fn load_records(&self, path: &Path) -> Result<RunReport> {
        let ledger = RecordsLoader::new(&self.config).load(path)?;
        Ok(RecordsWriter::new(&self.store, &self.config).write(&ledger))
    }

    /// Load an agents export into the `agents` container
    #[instrument(skip(self))]
    pub fn load_agents(&self, path: &Path) -> Result<RunReport> {
        let snapshot = SnapshotLoader::for_agents(&self.config).load(path, &self.config.default_version)?;
        Ok(self.synchronize_agents(&snapshot))
    }

    /// Write the agents hierarchy of a snapshot
    pub fn synchronize_agents(&self, snapshot: &Snapshot) -> RunReport {
        let space = TreeSpace::Agents {
            prefix: self.config.agents.prefix.clone(),
        };
        let tree = self.build_tree(snapshot).in_space(space);
        Synchronizer::new(&self.store, &self.config).synchronize(&tree)
    }

    /// Dossiers of this unit currently in the store
    pub fn list_dossiers(&self) -> Result<Vec<DossierSummary>> {
        RecordsWriter::new(&self.store, &self.config).list_dossiers(&self.config.unit)
    }

    /// Check the stored tree of this unit
    pub fn verify(&self) -> Result<ConsistencyReport> {
        ConsistencyVerifier::new(&self.store).verify_unit(&self.config.unit)
    }
}

/// Builder for [`Referential`]
///
/// # Default Values
///
/// - `orphan_policy`: [`OrphanPolicy::Reject`]
/// - `skip_unchanged`: true
/// - `max_depth`: 64
/// - `creator`: `roche66`
/// - `delimiter`: `;`
/// - `default_version`: `1.0.0`
#[derive(Debug, Clone)]
pub struct ReferentialBuilder {
    config: RefsyncConfig,
}

impl ReferentialBuilder {
    /// Create a builder for `unit` with default settings
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            config: RefsyncConfig::new(unit),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: RefsyncConfig) -> Self {
        Self { config }
    }

    /// Set the description written on the unit root
    pub fn unit_description(mut self, description: impl Into<String>) -> Self {
        self.config.unit_description = description.into();
        self
    }

    /// Set the creator agent name
    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.config.creator = creator.into();
        self
    }

    /// Set how rows with a missing or unknown parent are handled
    pub fn orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.config.orphan_policy = policy;
        self
    }

    /// Set whether identical representations are rewritten
    pub fn skip_unchanged(mut self, skip: bool) -> Self {
        self.config.skip_unchanged = skip;
        self
    }

    /// Set the reconstruction depth limit (minimum 1)
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth.max(1);
        self
    }

    /// Set the ledger column names
    pub fn columns(mut self, columns: ColumnMapping) -> Self {
        self.config.columns = columns;
        self
    }

    /// Set the ledger delimiter
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.config.delimiter = delimiter;
        self
    }

    /// Set the version label used when none is given
    pub fn default_version(mut self, version: impl Into<String>) -> Self {
        self.config.default_version = version.into();
        self
    }

    /// Build the referential over `store`
    ///
    /// # Errors
    ///
    /// [`RefsyncError::InvalidConfiguration`] if the settings are unusable.
    pub fn build<S: RemoteStore>(self, store: S) -> Result<Referential<S>> {
        Referential::new(store, self.config)
    }
}
