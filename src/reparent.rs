//! Reparent Operator
//!
//! Moves a single node under a new parent by read-modify-write: the node's
//! typed representation is read, its parent link and identifier are
//! replaced and it is written back with an `IfMatch` precondition. A
//! concurrent change to the node between the read and the write surfaces as
//! [`RefsyncError::PreconditionFailed`] instead of being overwritten.
//!
//! The new identifier is `<base>-<suffix>` where `<base>` is the last
//! `/`-segment of the new parent's identifier and `<suffix>` is the part of
//! the old identifier after its last `-` (the node id when there is none).
//!
//! Only the moved node is written. The children lists of the old and new
//! parents follow on the next synchronization of the ledger.

use crate::collections::HashSet;
#[cfg(feature = "gxhash")]
use crate::collections::HashSetExt;
use crate::error::{RefsyncError, Result};
use crate::key::NodeKey;
use crate::store::{Precondition, RemoteStore};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Result of a successful move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    /// Node moved
    pub node: NodeKey,
    /// Previous parent link
    pub old_parent: Option<NodeKey>,
    /// New parent link
    pub new_parent: NodeKey,
    /// Identifier before the move
    pub old_identifier: String,
    /// Identifier after the move
    pub new_identifier: String,
    /// Sequence number of the written representation
    pub seq: u64,
}

/// Moves nodes between parents
pub struct ReparentOperator<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RemoteStore + ?Sized> ReparentOperator<'a, S> {
    /// Create an operator writing to `store`
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Move `node` under `new_parent`
    ///
    /// # Errors
    ///
    /// - [`RefsyncError::NodeNotFound`] if either node is missing
    /// - [`RefsyncError::NodeClosed`] if either node is closed
    /// - [`RefsyncError::CircularDependency`] if `new_parent` lies below `node`
    /// - [`RefsyncError::PreconditionFailed`] if `node` changed meanwhile
    #[instrument(skip(self, node, new_parent), fields(node = %node, new_parent = %new_parent))]
    pub fn move_node(&self, node: &NodeKey, new_parent: &NodeKey) -> Result<MoveOutcome> {
        let stored = self
            .store
            .read(node)?
            .ok_or_else(|| RefsyncError::NodeNotFound(node.path()))?;
        if stored.representation.is_closed() {
            return Err(RefsyncError::NodeClosed(node.path()));
        }

        let parent = self
            .store
            .read(new_parent)?
            .ok_or_else(|| RefsyncError::NodeNotFound(new_parent.path()))?
            .representation;
        if parent.is_closed() {
            return Err(RefsyncError::NodeClosed(new_parent.path()));
        }
        self.check_cycle(node, new_parent, parent.parent.clone())?;

        let mut rep = stored.representation;
        let old_identifier = rep.identifier.clone().unwrap_or_default();
        let base = parent
            .identifier
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| new_parent.last_segment());
        let new_identifier = derive_identifier(&base, &old_identifier, &node.last_segment());

        let old_parent = rep.parent.replace(new_parent.clone());
        rep.identifier = Some(new_identifier.clone());
        let receipt = self.store.write(node, &rep, &Precondition::IfMatch(stored.etag))?;

        info!("Moved {} under {} as {}", node, new_parent, new_identifier);
        Ok(MoveOutcome {
            node: node.clone(),
            old_parent,
            new_parent: new_parent.clone(),
            old_identifier,
            new_identifier,
            seq: receipt.seq,
        })
    }

    fn check_cycle(&self, node: &NodeKey, new_parent: &NodeKey, mut next: Option<NodeKey>) -> Result<()> {
        let cycle = || RefsyncError::CircularDependency {
            node: node.path(),
            parent: new_parent.path(),
        };
        if node == new_parent {
            return Err(cycle());
        }

        let mut seen = HashSet::new();
        while let Some(ancestor) = next {
            if &ancestor == node {
                return Err(cycle());
            }
            if !seen.insert(ancestor.clone()) {
                // Broken links above the new parent do not involve `node`
                break;
            }
            next = self.store.read(&ancestor)?.and_then(|s| s.representation.parent);
        }
        Ok(())
    }
}

/// Identifier of a node moved under a parent identified by `parent_identifier`
pub fn derive_identifier(parent_identifier: &str, old_identifier: &str, node_id: &str) -> String {
    let base = parent_identifier.rsplit('/').next().unwrap_or(parent_identifier);
    let suffix = match old_identifier.rsplit_once('-') {
        Some((_, suffix)) if !suffix.is_empty() => suffix,
        _ => node_id,
    };
    format!("{}-{}", base, suffix)
}
