//! In-memory store
//!
//! Keeps every node's full history in memory behind a `parking_lot` lock.
//! Suitable for tests, dry runs and embedding; nothing is persisted.

use super::{compile_pattern, HistoryEntry, HistoryRef, Precondition, RemoteStore, StoredRepresentation, WriteReceipt};
use crate::collections::HashMap;
#[cfg(feature = "gxhash")]
use crate::collections::HashMapExt;
use crate::error::{RefsyncError, Result};
use crate::key::NodeKey;
use crate::representation::{ETag, Representation};
use chrono::Utc;
use parking_lot::RwLock;
use tracing::trace;

#[derive(Debug, Default)]
struct NodeHistory {
    entries: Vec<HistoryEntry>,
    etag: Option<ETag>,
}

#[derive(Debug)]
struct State {
    next_seq: u64,
    nodes: HashMap<NodeKey, NodeHistory>,
}

/// Store holding nodes and their history in memory
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                next_seq: 1,
                nodes: HashMap::new(),
            }),
        }
    }

    /// Number of existing nodes
    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Total number of historical representations
    pub fn history_count(&self) -> usize {
        self.state.read().nodes.values().map(|n| n.entries.len()).sum()
    }
}

impl RemoteStore for InMemoryStore {
    fn write(&self, key: &NodeKey, representation: &Representation, precondition: &Precondition) -> Result<WriteReceipt> {
        key.validate()?;
        let etag = representation.etag()?;
        let mut state = self.state.write();

        let current = state.nodes.get(key).and_then(|n| n.etag.as_ref());
        precondition.check(key, current)?;

        let seq = state.next_seq;
        state.next_seq += 1;
        let created_at = Utc::now();

        let node = state.nodes.entry(key.clone()).or_default();
        node.entries.push(HistoryEntry {
            seq,
            created_at,
            representation: representation.clone(),
        });
        node.etag = Some(etag.clone());

        trace!("Wrote {} at seq {} ({})", key, seq, etag.short());
        Ok(WriteReceipt {
            key: key.clone(),
            seq,
            etag,
            created_at,
        })
    }

    fn read(&self, key: &NodeKey) -> Result<Option<StoredRepresentation>> {
        let state = self.state.read();
        let Some(node) = state.nodes.get(key) else {
            return Ok(None);
        };
        let (Some(last), Some(etag)) = (node.entries.last(), node.etag.as_ref()) else {
            return Ok(None);
        };
        Ok(Some(StoredRepresentation {
            representation: last.representation.clone(),
            etag: etag.clone(),
            seq: last.seq,
            created_at: last.created_at,
        }))
    }

    fn read_history(&self, key: &NodeKey) -> Result<Vec<HistoryRef>> {
        let state = self.state.read();
        Ok(state
            .nodes
            .get(key)
            .map(|node| {
                node.entries
                    .iter()
                    .map(|e| HistoryRef {
                        key: key.clone(),
                        seq: e.seq,
                        created_at: e.created_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn read_at(&self, reference: &HistoryRef) -> Result<Representation> {
        let state = self.state.read();
        state
            .nodes
            .get(&reference.key)
            .and_then(|node| node.entries.iter().find(|e| e.seq == reference.seq))
            .map(|e| e.representation.clone())
            .ok_or_else(|| {
                RefsyncError::NodeNotFound(format!("{}@{}", reference.key, reference.seq))
            })
    }

    fn search(&self, pattern: &str) -> Result<Vec<NodeKey>> {
        let matcher = compile_pattern(pattern)?;
        let state = self.state.read();
        let mut keys: Vec<NodeKey> = state
            .nodes
            .keys()
            .filter(|key| matcher.is_match(key.path()))
            .cloned()
            .collect();
        keys.sort_by_key(|k| k.path());
        Ok(keys)
    }
}
