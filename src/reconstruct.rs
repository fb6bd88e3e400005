//! Tree Reconstructor
//!
//! Rebuilds the tree below a node either as it is now or as it was written
//! under a given snapshot version.
//!
//! ## Version selection
//!
//! Without a target version every node's current representation is used.
//! With a target version, the node's history is searched for the most recent
//! representation (highest sequence number) whose `version` field equals the
//! target exactly. Nodes that never carried a version label at all (the
//! structural containers) fall back to their current representation.
//!
//! Children are taken from the links recorded *in the selected
//! representation*, never from the live state, so later writes to a node or
//! its children do not alter a historical view.
//!
//! ## Failures
//!
//! A node that cannot be read, has no matching version, sits on a link cycle
//! or lies beyond the depth limit becomes a placeholder leaf and is listed
//! in [`Reconstruction::truncated`]. Reconstruction itself never fails.
//!
//! ## Ordering
//!
//! Siblings are sorted by identifier in lexicographic order. The sort is
//! stable: equal identifiers keep their link order.

use crate::error::{RefsyncError, Result};
use crate::key::NodeKey;
use crate::representation::Representation;
use crate::store::RemoteStore;
use crate::types::{NodeKind, RecordState};
use crate::utils::escape_html;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use tracing::{debug, info, instrument, warn};

/// Why a subtree was cut short
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TruncationReason {
    /// The node does not exist
    NotFound,
    /// No representation of the node carries the target version
    VersionNotFound {
        /// Target version label
        version: String,
    },
    /// Reading the node failed
    ReadFailed {
        /// Error description
        error: String,
    },
    /// The node links back to one of its ancestors
    Cycle,
    /// The node lies deeper than the configured limit
    DepthLimit,
}

impl fmt::Display for TruncationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TruncationReason::NotFound => write!(f, "not found"),
            TruncationReason::VersionNotFound { version } => write!(f, "no representation at version {}", version),
            TruncationReason::ReadFailed { error } => write!(f, "read failed: {}", error),
            TruncationReason::Cycle => write!(f, "link cycle"),
            TruncationReason::DepthLimit => write!(f, "depth limit reached"),
        }
    }
}

/// A subtree that could not be reconstructed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncatedSubtree {
    /// Root of the missing subtree
    pub key: NodeKey,
    /// Cause
    pub reason: TruncationReason,
}

/// One node of a reconstructed tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    /// Store key
    pub key: NodeKey,
    /// Call number (sort key)
    pub identifier: String,
    /// Title
    pub title: String,
    /// Record-set kind
    pub kind: Option<NodeKind>,
    /// Lifecycle state
    pub state: Option<RecordState>,
    /// Version label of the selected representation
    pub version: Option<String>,
    /// Whether this is a placeholder for a truncated subtree
    pub truncated: bool,
    /// Children sorted by identifier
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    fn from_representation(key: &NodeKey, rep: &Representation) -> Self {
        Self {
            key: key.clone(),
            identifier: rep.identifier.clone().unwrap_or_default(),
            title: rep.title.clone(),
            kind: rep.kind,
            state: rep.state,
            version: rep.version.clone(),
            truncated: false,
            children: Vec::new(),
        }
    }

    fn placeholder(key: &NodeKey) -> Self {
        Self {
            key: key.clone(),
            identifier: key.last_segment(),
            title: String::new(),
            kind: None,
            state: None,
            version: None,
            truncated: true,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, placeholders included
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(OutlineNode::count).sum::<usize>()
    }

    /// Find a node of this subtree by key
    pub fn find(&self, key: &NodeKey) -> Option<&OutlineNode> {
        if &self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(key))
    }

    fn outline_items(&self) -> Vec<OutlineItem> {
        let mut items = vec![OutlineItem::Entry(OutlineEntry {
            key: self.key.clone(),
            identifier: self.identifier.clone(),
            title: self.title.clone(),
        })];
        if !self.children.is_empty() {
            items.push(OutlineItem::Nested(
                self.children.iter().flat_map(OutlineNode::outline_items).collect(),
            ));
        }
        items
    }

    fn write_html(&self, out: &mut String) {
        let mut label = escape_html(&self.identifier);
        if !self.title.is_empty() {
            let _ = write!(label, " {}", escape_html(&self.title));
        }
        let class = match (self.truncated, self.state) {
            (true, _) => " class=\"truncated\"",
            (false, Some(RecordState::Closed)) => " class=\"closed\"",
            _ => "",
        };

        if self.children.is_empty() {
            let _ = write!(out, "<li{}>{}</li>", class, label);
            return;
        }
        let _ = write!(out, "<li{}><details><summary>{}</summary><ul>", class, label);
        for child in &self.children {
            child.write_html(out);
        }
        out.push_str("</ul></details></li>");
    }
}

/// Display metadata of one outline entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// Store key
    pub key: NodeKey,
    /// Call number
    pub identifier: String,
    /// Title
    pub title: String,
}

/// Element of the flat outline: an entry, or the nested items of the
/// preceding entry's children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutlineItem {
    /// Node metadata
    Entry(OutlineEntry),
    /// Children of the preceding entry
    Nested(Vec<OutlineItem>),
}

/// Result of a reconstruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconstruction {
    /// Reconstructed tree
    pub root: OutlineNode,
    /// Target version, `None` for the current state
    pub version: Option<String>,
    /// Subtrees that were cut short
    pub truncated: Vec<TruncatedSubtree>,
}

impl Reconstruction {
    /// Whether every subtree was reconstructed
    pub fn is_complete(&self) -> bool {
        self.truncated.is_empty()
    }

    /// Number of nodes, placeholders included
    pub fn node_count(&self) -> usize {
        self.root.count()
    }

    /// Alternating sequence of entries and nested child sequences
    pub fn to_outline(&self) -> Vec<OutlineItem> {
        self.root.outline_items()
    }

    /// Collapsible HTML outline
    pub fn render_html(&self) -> String {
        let mut out = String::from("<ul class=\"outline\">");
        self.root.write_html(&mut out);
        out.push_str("</ul>");
        out
    }
}

/// Reconstructs trees from a store
pub struct Reconstructor<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    max_depth: usize,
}

impl<'a, S: RemoteStore + ?Sized> Reconstructor<'a, S> {
    /// Create a reconstructor reading from `store`
    pub fn new(store: &'a S, max_depth: usize) -> Self {
        Self { store, max_depth }
    }

    /// Reconstruct the tree below `key`, optionally at a snapshot version
    #[instrument(skip(self, key), fields(key = %key))]
    pub fn reconstruct(&self, key: &NodeKey, version: Option<&str>) -> Reconstruction {
        let mut truncated = Vec::new();
        let mut path = Vec::new();
        let root = self.build(key, version, &mut path, &mut truncated);

        if truncated.is_empty() {
            info!("Reconstructed {} nodes below {}", root.count(), key);
        } else {
            warn!(
                "Reconstructed {} nodes below {} with {} truncated subtrees",
                root.count(),
                key,
                truncated.len()
            );
        }
        Reconstruction {
            root,
            version: version.map(str::to_string),
            truncated,
        }
    }

    fn build(
        &self,
        key: &NodeKey,
        version: Option<&str>,
        path: &mut Vec<NodeKey>,
        truncated: &mut Vec<TruncatedSubtree>,
    ) -> OutlineNode {
        let cut = |reason: TruncationReason, truncated: &mut Vec<TruncatedSubtree>| {
            warn!("Truncating {}: {}", key, reason);
            truncated.push(TruncatedSubtree {
                key: key.clone(),
                reason,
            });
            OutlineNode::placeholder(key)
        };

        if path.contains(key) {
            return cut(TruncationReason::Cycle, truncated);
        }
        if path.len() >= self.max_depth {
            return cut(TruncationReason::DepthLimit, truncated);
        }

        let rep = match self.select(key, version) {
            Ok(rep) => rep,
            Err(RefsyncError::NodeNotFound(_)) => return cut(TruncationReason::NotFound, truncated),
            Err(RefsyncError::VersionNotFound { version, .. }) => {
                return cut(TruncationReason::VersionNotFound { version }, truncated)
            }
            Err(e) => return cut(TruncationReason::ReadFailed { error: e.to_string() }, truncated),
        };

        let mut node = OutlineNode::from_representation(key, &rep);
        path.push(key.clone());
        node.children = rep
            .children
            .iter()
            .map(|child| self.build(child, version, path, truncated))
            .collect();
        path.pop();

        // Vec::sort_by is stable
        node.children.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        node
    }

    /// Representation of `key` selected for `version`
    ///
    /// # Errors
    ///
    /// [`RefsyncError::NodeNotFound`] or [`RefsyncError::VersionNotFound`]
    /// when nothing matches, or the store's error when a read fails.
    pub fn select(&self, key: &NodeKey, version: Option<&str>) -> Result<Representation> {
        let current = || -> Result<Representation> {
            self.store
                .read(key)?
                .map(|stored| stored.representation)
                .ok_or_else(|| RefsyncError::NodeNotFound(key.path()))
        };
        let Some(target) = version else {
            return current();
        };

        let mut history = self.store.read_history(key)?;
        if history.is_empty() {
            return Err(RefsyncError::NodeNotFound(key.path()));
        }
        history.sort_by_key(|h| std::cmp::Reverse(h.seq));

        let mut versioned = false;
        for reference in &history {
            let rep = self.store.read_at(reference)?;
            match rep.version.as_deref() {
                Some(v) if v == target => {
                    debug!("Selected {} at seq {} for version {}", key, reference.seq, target);
                    return Ok(rep);
                }
                Some(_) => versioned = true,
                None => {}
            }
        }

        if versioned {
            Err(RefsyncError::VersionNotFound {
                key: key.path(),
                version: target.to_string(),
            })
        } else {
            current()
        }
    }

    /// Distinct version labels of a node, oldest first
    pub fn versions(&self, key: &NodeKey) -> Result<Vec<String>> {
        let mut history = self.store.read_history(key)?;
        history.sort_by_key(|h| h.seq);

        let mut versions: Vec<String> = Vec::new();
        for reference in &history {
            if let Some(v) = self.store.read_at(reference)?.version {
                if !versions.contains(&v) {
                    versions.push(v);
                }
            }
        }
        Ok(versions)
    }
}
