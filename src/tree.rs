//! Tree Builder
//!
//! Derives the classification tree of one snapshot: parent and children
//! adjacency, root-level nodes and the derived record-set kind of every
//! node.
//!
//! ## Structure
//!
//! ```text
//! records/acv (unit root)
//! ├── 1  M          referential
//! │   ├── 2  M.10   referentialLeaf
//! │   └── 3  M.20   referential
//! │       └── 4  M.20.01  referentialLeaf
//! └── 5  N          referentialLeaf (another root-level node)
//! ```
//!
//! Rows whose parent is missing or unknown are handled by the configured
//! [`OrphanPolicy`]. Rows caught in a parent cycle are always rejected. A
//! rejected row takes its descendants with it under [`OrphanPolicy::Reject`];
//! under [`OrphanPolicy::AttachToRoot`] they are re-attached under the unit
//! root instead. Every permissive fallback is logged and kept in
//! [`ReferentialTree::warnings`].
//!
//! The same builder shapes the agents hierarchy: a tree placed in
//! [`TreeSpace::Agents`] keys its nodes as `agents/<prefix><code>` and hangs
//! its root-level nodes under the `agents` container.

use crate::collections::{IdMap, IdSet};
#[cfg(feature = "gxhash")]
use crate::collections::{HashMapExt, HashSetExt};
use crate::error::{ValidationError, ValidationKind};
use crate::key::{Container, NodeKey};
use crate::types::{NodeId, NodeKind, OrphanPolicy, ParentRef, Row, Snapshot};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// An accepted node with its derived attributes
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Source row
    pub row: Row,
    /// Resolved parent, `None` for nodes under the unit root
    pub parent: Option<NodeId>,
    /// Derived record-set kind
    pub kind: NodeKind,
}

/// Where the nodes of a tree are stored
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TreeSpace {
    /// Taxonomy nodes under `records/<unit>`
    #[default]
    Records,
    /// Agents under `agents/<prefix><code>`
    Agents {
        /// Name prefix of every agent
        prefix: String,
    },
}

/// Classification tree of one snapshot
#[derive(Debug, Clone)]
pub struct ReferentialTree {
    space: TreeSpace,
    unit: String,
    version: String,
    nodes: IdMap<TreeNode>,
    order: Vec<NodeId>,
    children: IdMap<Vec<NodeId>>,
    roots: Vec<NodeId>,
    rejected: Vec<ValidationError>,
    warnings: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    OnPath,
    Done,
}

/// Working state while resolving parent links
struct Resolution {
    policy: OrphanPolicy,
    parent_of: IdMap<Option<NodeId>>,
    rejected_ids: IdSet,
    rejected: Vec<ValidationError>,
    warnings: Vec<String>,
}

impl Resolution {
    fn reject(&mut self, row: &Row, kind: ValidationKind, detail: impl Into<String>) {
        if self.rejected_ids.insert(row.id.clone()) {
            self.rejected
                .push(ValidationError::new(row.row, row.id.as_str(), kind, detail));
        }
    }

    fn orphan(&mut self, row: &Row, kind: ValidationKind, detail: String) {
        match self.policy {
            OrphanPolicy::Reject => self.reject(row, kind, detail),
            OrphanPolicy::AttachToRoot => {
                let message = format!("row {} ({}): {}, attached to unit root", row.row, row.id, detail);
                warn!("{}", message);
                self.warnings.push(message);
                self.parent_of.insert(row.id.clone(), None);
            }
        }
    }

    fn parent(&self, id: &NodeId) -> Option<NodeId> {
        self.parent_of.get(id).cloned().flatten()
    }
}

impl ReferentialTree {
    /// Build the tree of a snapshot
    pub fn build(snapshot: &Snapshot, policy: OrphanPolicy) -> Self {
        let rows: IdMap<&Row> = snapshot.rows.iter().map(|r| (r.id.clone(), r)).collect();
        let order: Vec<NodeId> = snapshot.rows.iter().map(|r| r.id.clone()).collect();
        let mut res = Resolution {
            policy,
            parent_of: IdMap::with_capacity(order.len()),
            rejected_ids: IdSet::new(),
            rejected: snapshot.rejected.clone(),
            warnings: Vec::new(),
        };

        for row in &snapshot.rows {
            match &row.parent {
                ParentRef::UnitRoot => {
                    res.parent_of.insert(row.id.clone(), None);
                }
                ParentRef::Node(p) if p == &row.id => {
                    res.reject(row, ValidationKind::Cycle, "row is its own parent");
                }
                ParentRef::Node(p) if rows.contains_key(p) => {
                    res.parent_of.insert(row.id.clone(), Some(p.clone()));
                }
                ParentRef::Node(p) => res.orphan(
                    row,
                    ValidationKind::UnknownParent,
                    format!("parent {} is absent from the snapshot", p),
                ),
                ParentRef::Missing => {
                    res.orphan(row, ValidationKind::MissingParent, "parent cell is empty".to_string())
                }
            }
        }

        // Cycles among the remaining parent links
        let mut visits: IdMap<Visit> = IdMap::with_capacity(order.len());
        for id in &order {
            if res.rejected_ids.contains(id) || visits.contains_key(id) {
                continue;
            }
            let mut path: Vec<NodeId> = Vec::new();
            let mut current = id.clone();
            loop {
                if res.rejected_ids.contains(&current) {
                    break;
                }
                match visits.get(&current) {
                    Some(Visit::Done) => break,
                    Some(Visit::OnPath) => {
                        let start = path.iter().position(|n| n == &current).unwrap_or(0);
                        for member in &path[start..] {
                            if let Some(row) = rows.get(member) {
                                res.reject(row, ValidationKind::Cycle, "parent links loop back to this row");
                            }
                        }
                        break;
                    }
                    None => {}
                }
                visits.insert(current.clone(), Visit::OnPath);
                path.push(current.clone());
                match res.parent(&current) {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
            for member in path {
                visits.insert(member, Visit::Done);
            }
        }

        // Rows under a rejected row follow the orphan policy
        loop {
            let mut changed = false;
            for id in &order {
                if res.rejected_ids.contains(id) {
                    continue;
                }
                let Some(parent) = res.parent(id) else {
                    continue;
                };
                if !res.rejected_ids.contains(&parent) {
                    continue;
                }
                if let Some(row) = rows.get(id) {
                    res.orphan(row, ValidationKind::UnknownParent, format!("parent {} was rejected", parent));
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let accepted: Vec<NodeId> = order
            .into_iter()
            .filter(|id| !res.rejected_ids.contains(id))
            .collect();
        let mut children: IdMap<Vec<NodeId>> = IdMap::new();
        let mut roots = Vec::new();
        for id in &accepted {
            match res.parent(id) {
                Some(parent) => children.entry(parent).or_default().push(id.clone()),
                None => roots.push(id.clone()),
            }
        }

        let mut nodes = IdMap::with_capacity(accepted.len());
        for id in &accepted {
            if let Some(row) = rows.get(id) {
                let child_count = children.get(id).map(Vec::len).unwrap_or(0);
                nodes.insert(
                    id.clone(),
                    TreeNode {
                        row: (*row).clone(),
                        parent: res.parent(id),
                        kind: NodeKind::for_taxonomy(child_count),
                    },
                );
            }
        }

        let Resolution {
            mut rejected,
            warnings,
            ..
        } = res;
        rejected.sort_by_key(|e| e.row);
        debug!(
            "Built tree for {} {}: {} nodes, {} roots, {} rejected",
            snapshot.unit,
            snapshot.version,
            accepted.len(),
            roots.len(),
            rejected.len()
        );

        Self {
            space: TreeSpace::Records,
            unit: snapshot.unit.clone(),
            version: snapshot.version.clone(),
            nodes,
            order: accepted,
            children,
            roots,
            rejected,
            warnings,
        }
    }

    /// Place the tree's nodes in another part of the store
    pub fn in_space(mut self, space: TreeSpace) -> Self {
        self.space = space;
        self
    }

    /// Where the nodes are stored
    pub fn space(&self) -> &TreeSpace {
        &self.space
    }

    /// Unit code
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Snapshot version label
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Number of accepted nodes
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no node was accepted
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether a node was accepted
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Get an accepted node
    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Accepted nodes in ledger order
    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Root-level nodes in ledger order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Direct children of a node in ledger order
    pub fn children_of(&self, id: &str) -> &[NodeId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolved parent of a node, `None` for root-level or unknown nodes
    pub fn parent_of(&self, id: &str) -> Option<&NodeId> {
        self.nodes.get(id).and_then(|n| n.parent.as_ref())
    }

    /// Derived kind of a node
    pub fn kind_of(&self, id: &str) -> Option<NodeKind> {
        self.nodes.get(id).map(|n| n.kind)
    }

    /// Store key of a node of this tree
    pub fn key_of(&self, id: &NodeId) -> NodeKey {
        match &self.space {
            TreeSpace::Records => NodeKey::record(&self.unit, id.as_str()),
            TreeSpace::Agents { prefix } => {
                NodeKey::vocabulary(Container::Agents, format!("{}{}", prefix, id))
            }
        }
    }

    /// Store key of the node root-level nodes hang under
    pub fn root_key(&self) -> NodeKey {
        match &self.space {
            TreeSpace::Records => NodeKey::unit_root(&self.unit),
            TreeSpace::Agents { .. } => NodeKey::Container(Container::Agents),
        }
    }

    /// Store key of the parent of a node (the tree root for root-level nodes)
    pub fn parent_key(&self, id: &str) -> NodeKey {
        match self.parent_of(id) {
            Some(parent) => self.key_of(parent),
            None => self.root_key(),
        }
    }

    /// Store keys of the direct children of a node
    pub fn children_keys(&self, id: &str) -> Vec<NodeKey> {
        self.children_of(id).iter().map(|c| self.key_of(c)).collect()
    }

    /// Ancestors of a node, from the root-level node down to the parent
    pub fn ancestors(&self, id: &str) -> Vec<&NodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.parent_of(parent.as_str());
        }
        ancestors.reverse();
        ancestors
    }

    /// All descendants of a node, breadth first
    pub fn descendants(&self, id: &str) -> Vec<&NodeId> {
        let mut descendants = Vec::new();
        let mut queue: VecDeque<&NodeId> = self.children_of(id).iter().collect();
        while let Some(child) = queue.pop_front() {
            descendants.push(child);
            queue.extend(self.children_of(child.as_str()).iter());
        }
        descendants
    }

    /// Depth of a node, root-level nodes having depth 1
    pub fn depth(&self, id: &str) -> usize {
        if self.contains(id) {
            self.ancestors(id).len() + 1
        } else {
            0
        }
    }

    /// Rows rejected while loading or building, by row number
    pub fn rejected(&self) -> &[ValidationError] {
        &self.rejected
    }

    /// Permissive fallbacks applied while building
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Get tree statistics
    pub fn stats(&self) -> TreeStats {
        let leaf_nodes = self
            .nodes
            .values()
            .filter(|n| n.kind == NodeKind::ReferentialLeaf)
            .count();
        let max_depth = self
            .roots
            .iter()
            .map(|root| self.subtree_height(root))
            .max()
            .unwrap_or(0);

        TreeStats {
            total_nodes: self.order.len(),
            root_nodes: self.roots.len(),
            leaf_nodes,
            max_depth,
            rejected_rows: self.rejected.len(),
        }
    }

    fn subtree_height(&self, id: &NodeId) -> usize {
        1 + self
            .children_of(id.as_str())
            .iter()
            .map(|child| self.subtree_height(child))
            .max()
            .unwrap_or(0)
    }

    /// Convert the tree to display nodes
    pub fn to_tree_nodes(&self) -> Vec<TreeDisplayNode> {
        self.roots.iter().filter_map(|root| self.display_node(root)).collect()
    }

    fn display_node(&self, id: &NodeId) -> Option<TreeDisplayNode> {
        let node = self.nodes.get(id)?;
        Some(TreeDisplayNode {
            id: id.clone(),
            identifier: node.row.identifier.clone(),
            title: node.row.title.clone(),
            kind: node.kind,
            children: self
                .children_of(id.as_str())
                .iter()
                .filter_map(|child| self.display_node(child))
                .collect(),
        })
    }
}

/// Node of the tree for display
#[derive(Debug, Clone)]
pub struct TreeDisplayNode {
    /// Node id
    pub id: NodeId,
    /// Call number
    pub identifier: String,
    /// Title
    pub title: String,
    /// Derived kind
    pub kind: NodeKind,
    /// Child nodes
    pub children: Vec<TreeDisplayNode>,
}

impl TreeDisplayNode {
    /// Format the subtree for display
    pub fn format_tree(&self, prefix: &str, is_last: bool) -> String {
        let mut result = String::new();

        let connector = if is_last { "└── " } else { "├── " };
        result.push_str(prefix);
        result.push_str(connector);
        result.push_str(&format!("{} {} [{}]", self.identifier, self.title, self.id));
        result.push('\n');

        let extension = if is_last { "    " } else { "│   " };
        let child_prefix = format!("{}{}", prefix, extension);

        for (i, child) in self.children.iter().enumerate() {
            let is_last_child = i == self.children.len() - 1;
            result.push_str(&child.format_tree(&child_prefix, is_last_child));
        }

        result
    }
}

/// Tree statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStats {
    /// Accepted nodes
    pub total_nodes: usize,
    /// Nodes directly under the unit root
    pub root_nodes: usize,
    /// Nodes without children
    pub leaf_nodes: usize,
    /// Deepest level, root-level nodes counting as 1
    pub max_depth: usize,
    /// Rejected rows
    pub rejected_rows: usize,
}
