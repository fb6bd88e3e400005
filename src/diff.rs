//! Diff Engine
//!
//! Classifies the ids of two snapshots of the same unit as added, removed or
//! retained. Only set membership is compared: a retained node whose parent
//! changed is an ordinary update for the Synchronizer, and reparenting is
//! never inferred from a diff.
//!
//! A row the new snapshot rejected still places its node in the export: such
//! ids are `held`, neither removed nor rewritten, until a later export either
//! fixes the row or drops it.
//!
//! For any two snapshots `a` and `b`:
//! - `added ∩ removed = ∅`
//! - `added ∪ retained = ids(b)`
//! - `removed ∪ retained ∪ held = ids(a)`

use crate::collections::id_set;
use crate::error::{RefsyncError, Result};
use crate::types::{NodeId, Snapshot};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Counts of a snapshot diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Ids only in the new snapshot
    pub added: usize,
    /// Ids only in the old snapshot
    pub removed: usize,
    /// Ids in both snapshots
    pub retained: usize,
    /// Ids of the old snapshot whose row the new snapshot rejected
    pub held: usize,
}

impl DiffStats {
    /// Check if any id was added or removed
    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

/// Membership difference between two snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// Unit of both snapshots
    pub unit: String,
    /// Version label of the old snapshot
    pub from_version: String,
    /// Version label of the new snapshot
    pub to_version: String,
    /// Ids only in the new snapshot, in its row order
    pub added: Vec<NodeId>,
    /// Ids only in the old snapshot, in its row order
    pub removed: Vec<NodeId>,
    /// Ids in both snapshots, in the new snapshot's row order
    pub retained: Vec<NodeId>,
    /// Ids of the old snapshot rejected by the new one, in old row order
    pub held: Vec<NodeId>,
    /// Counts
    pub stats: DiffStats,
}

impl SnapshotDiff {
    /// Compare two snapshots of the same unit
    ///
    /// # Errors
    ///
    /// [`RefsyncError::UnitMismatch`] if the snapshots belong to different units.
    pub fn compute(old: &Snapshot, new: &Snapshot) -> Result<Self> {
        if old.unit != new.unit {
            return Err(RefsyncError::UnitMismatch {
                left: old.unit.clone(),
                right: new.unit.clone(),
            });
        }

        let old_ids = id_set(old.ids());
        let new_ids = id_set(new.ids());

        let mut added = Vec::new();
        let mut retained = Vec::new();
        for id in new.ids() {
            if old_ids.contains(id) {
                retained.push(id.clone());
            } else {
                added.push(id.clone());
            }
        }
        let new_rejected = new.rejected_ids();
        let rejected_ids = id_set(&new_rejected);

        let mut removed = Vec::new();
        let mut held = Vec::new();
        for id in old.ids().filter(|id| !new_ids.contains(*id)) {
            if rejected_ids.contains(id) {
                held.push(id.clone());
            } else {
                removed.push(id.clone());
            }
        }

        let stats = DiffStats {
            added: added.len(),
            removed: removed.len(),
            retained: retained.len(),
            held: held.len(),
        };
        debug!(
            "Diff {} {} -> {}: +{} -{} ={} held {}",
            new.unit, old.version, new.version, stats.added, stats.removed, stats.retained, stats.held
        );

        Ok(Self {
            unit: new.unit.clone(),
            from_version: old.version.clone(),
            to_version: new.version.clone(),
            added,
            removed,
            retained,
            held,
            stats,
        })
    }

    /// Whether an id was removed
    pub fn is_removed(&self, id: &str) -> bool {
        self.removed.iter().any(|r| r.as_str() == id)
    }
}
