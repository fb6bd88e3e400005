//! Consistency verification
//!
//! Checks that the links stored for one unit describe a well-formed tree.
//!
//! ## Overview
//!
//! [`ConsistencyVerifier::verify_unit`] walks the current tree from the unit
//! root along children links and reports:
//!
//! 1. **Parent mismatches**: a listed child whose own parent link names a
//!    different node
//! 2. **Kind mismatches**: a `referential` without children or a
//!    `referentialLeaf` with children
//! 3. **Dangling links**: a listed child that does not exist
//! 4. **Unlisted nodes**: an open taxonomy node of the unit that no parent
//!    lists (closed ones are expected to be unlisted once removed)
//! 5. **Unreadable nodes**: reads that failed
//!
//! Findings are reported, never repaired. A reparented node shows up as a
//! parent mismatch until the next synchronization rewrites its parents.
//!
//! ```rust,no_run
//! use refsync::store::InMemoryStore;
//! use refsync::verification::ConsistencyVerifier;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryStore::new();
//! let report = ConsistencyVerifier::new(&store).verify_unit("acv")?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

use crate::collections::HashSet;
#[cfg(feature = "gxhash")]
use crate::collections::HashSetExt;
use crate::error::Result;
use crate::key::NodeKey;
use crate::store::RemoteStore;
use crate::types::NodeKind;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A child whose parent link disagrees with the node listing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentMismatch {
    /// Listed child
    pub child: NodeKey,
    /// Node whose children list contains `child`
    pub listed_by: NodeKey,
    /// Parent link stored on `child`
    pub parent_link: Option<NodeKey>,
}

/// A taxonomy node whose kind contradicts its children list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindMismatch {
    /// Node
    pub key: NodeKey,
    /// Stored kind
    pub kind: NodeKind,
    /// Number of listed children
    pub children: usize,
}

/// A node that could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadableNode {
    /// Node
    pub key: NodeKey,
    /// Error description
    pub error: String,
}

/// Result of verifying one unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Unit verified
    pub unit: String,
    /// Nodes reached from the unit root
    pub nodes_checked: usize,
    /// Children whose parent link disagrees with their lister
    pub parent_mismatches: Vec<ParentMismatch>,
    /// Taxonomy nodes with an inconsistent kind
    pub kind_mismatches: Vec<KindMismatch>,
    /// Children links pointing at missing nodes
    pub dangling_links: Vec<NodeKey>,
    /// Open taxonomy nodes no parent lists
    pub unlisted_nodes: Vec<NodeKey>,
    /// Nodes whose read failed
    pub unreadable: Vec<UnreadableNode>,
    /// Time taken in milliseconds
    pub verification_time_ms: u64,
}

impl ConsistencyReport {
    fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            ..Default::default()
        }
    }

    /// Check if no issue was found
    pub fn is_valid(&self) -> bool {
        self.parent_mismatches.is_empty()
            && self.kind_mismatches.is_empty()
            && self.dangling_links.is_empty()
            && self.unlisted_nodes.is_empty()
            && self.unreadable.is_empty()
    }

    /// Number of issues found
    pub fn issue_count(&self) -> usize {
        self.parent_mismatches.len()
            + self.kind_mismatches.len()
            + self.dangling_links.len()
            + self.unlisted_nodes.len()
            + self.unreadable.len()
    }

    /// Get a summary of the verification
    pub fn summary(&self) -> String {
        if self.is_valid() {
            return format!(
                "Unit {} is consistent ({} nodes verified in {}ms)",
                self.unit, self.nodes_checked, self.verification_time_ms
            );
        }

        let issues = [
            (!self.parent_mismatches.is_empty())
                .then(|| format!("{} parent mismatches", self.parent_mismatches.len())),
            (!self.kind_mismatches.is_empty()).then(|| format!("{} kind mismatches", self.kind_mismatches.len())),
            (!self.dangling_links.is_empty()).then(|| format!("{} dangling links", self.dangling_links.len())),
            (!self.unlisted_nodes.is_empty()).then(|| format!("{} unlisted nodes", self.unlisted_nodes.len())),
            (!self.unreadable.is_empty()).then(|| format!("{} unreadable nodes", self.unreadable.len())),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");

        format!(
            "Unit {} has issues: {} ({} nodes checked)",
            self.unit, issues, self.nodes_checked
        )
    }
}

/// Verifies stored trees against their structural invariants
#[derive(Debug)]
pub struct ConsistencyVerifier<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RemoteStore + ?Sized> ConsistencyVerifier<'a, S> {
    /// Create a verifier reading from `store`
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Verify the current tree of `unit`
    ///
    /// # Errors
    ///
    /// Returns an error only if the unit's nodes cannot be enumerated.
    /// Findings are reported in the result.
    pub fn verify_unit(&self, unit: &str) -> Result<ConsistencyReport> {
        let start = Instant::now();
        let root = NodeKey::unit_root(unit);
        let mut report = ConsistencyReport::new(root.unit().unwrap_or(unit));

        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(root.clone(), None::<NodeKey>)]);
        while let Some((key, listed_by)) = queue.pop_front() {
            if !visited.insert(key.clone()) {
                continue;
            }
            let rep = match self.store.read(&key) {
                Ok(Some(stored)) => stored.representation,
                Ok(None) => {
                    warn!("{} is listed but does not exist", key);
                    report.dangling_links.push(key);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to read {}: {}", key, e);
                    report.unreadable.push(UnreadableNode {
                        key,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            report.nodes_checked += 1;

            if let Some(lister) = listed_by {
                if rep.parent.as_ref() != Some(&lister) {
                    debug!("{} listed by {} but links to {:?}", key, lister, rep.parent);
                    report.parent_mismatches.push(ParentMismatch {
                        child: key.clone(),
                        listed_by: lister,
                        parent_link: rep.parent.clone(),
                    });
                }
            }

            if let Some(kind) = rep.kind.filter(NodeKind::is_taxonomy) {
                if NodeKind::for_taxonomy(rep.children.len()) != kind {
                    report.kind_mismatches.push(KindMismatch {
                        key: key.clone(),
                        kind,
                        children: rep.children.len(),
                    });
                }
            }

            for child in rep.children {
                queue.push_back((child, Some(key.clone())));
            }
        }

        for key in self.store.search(&format!("{}/*", root.path()))? {
            if visited.contains(&key) {
                continue;
            }
            match self.store.read(&key) {
                Ok(Some(stored)) => {
                    let rep = stored.representation;
                    if rep.kind.is_some_and(|k| k.is_taxonomy()) && !rep.is_closed() {
                        report.unlisted_nodes.push(key);
                    }
                }
                Ok(None) => {}
                Err(e) => report.unreadable.push(UnreadableNode {
                    key,
                    error: e.to_string(),
                }),
            }
        }

        report.verification_time_ms = start.elapsed().as_millis() as u64;
        info!(
            "Verified unit {} in {}ms: {} nodes, {} issues",
            report.unit,
            report.verification_time_ms,
            report.nodes_checked,
            report.issue_count()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::representation::Representation;
    use crate::store::{InMemoryStore, Precondition};
    use crate::types::RecordState;

    fn put(store: &InMemoryStore, key: &NodeKey, kind: Option<NodeKind>, parent: Option<NodeKey>, children: Vec<NodeKey>) {
        let mut rep = Representation::basic("n", "").with_state(RecordState::Open).with_children(children);
        rep.kind = kind;
        rep.parent = parent;
        store.write(key, &rep, &Precondition::None).unwrap();
    }

    fn k(id: &str) -> NodeKey {
        NodeKey::record("acv", id)
    }

    fn consistent_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        let root = NodeKey::unit_root("acv");
        put(&store, &root, None, None, vec![k("1")]);
        put(&store, &k("1"), Some(NodeKind::Referential), Some(root), vec![k("2")]);
        put(&store, &k("2"), Some(NodeKind::ReferentialLeaf), Some(k("1")), vec![]);
        store
    }

    #[test]
    fn test_consistent_unit() {
        let store = consistent_store();
        let report = ConsistencyVerifier::new(&store).verify_unit("ACV").unwrap();
        assert!(report.is_valid(), "{}", report.summary());
        assert_eq!(report.nodes_checked, 3);
        assert!(report.summary().contains("is consistent"));
    }

    #[test]
    fn test_detects_link_and_kind_problems() {
        let store = consistent_store();
        put(&store, &k("2"), Some(NodeKind::Referential), Some(k("9")), vec![k("404")]);
        put(&store, &k("5"), Some(NodeKind::ReferentialLeaf), Some(k("1")), vec![]);

        let report = ConsistencyVerifier::new(&store).verify_unit("acv").unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.parent_mismatches.len(), 1);
        assert_eq!(report.parent_mismatches[0].parent_link, Some(k("9")));
        assert_eq!(report.dangling_links, vec![k("404")]);
        assert_eq!(report.unlisted_nodes, vec![k("5")]);
        assert!(report.kind_mismatches.is_empty());
    }

    #[test]
    fn test_kind_mismatch_and_closed_unlisted_nodes() {
        let store = consistent_store();
        put(&store, &k("1"), Some(NodeKind::ReferentialLeaf), Some(NodeKey::unit_root("acv")), vec![k("2")]);
        let mut closed = Representation::basic("gone", "")
            .with_kind(NodeKind::ReferentialLeaf)
            .with_state(RecordState::Closed);
        closed.parent = Some(k("1"));
        store.write(&k("7"), &closed, &Precondition::None).unwrap();

        let report = ConsistencyVerifier::new(&store).verify_unit("acv").unwrap();
        assert_eq!(report.kind_mismatches.len(), 1);
        assert_eq!(report.kind_mismatches[0].key, k("1"));
        assert!(report.unlisted_nodes.is_empty());
        assert_eq!(report.issue_count(), 1);
    }
}
