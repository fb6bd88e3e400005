//! Lifecycle Manager
//!
//! Applies the open → closed transition. Two entry points exist:
//!
//! - [`LifecycleManager::close_removed`] closes taxonomy nodes that left the
//!   ledger. Only the state changes; every other field of the stored
//!   representation is kept. Closing never cascades to children.
//! - [`LifecycleManager::close_dossier`] closes a single dossier and appends
//!   an immutable event node recording when, by whom and where.
//!
//! Nothing is ever deleted and a closed node is never reopened. Rewrites are
//! guarded by an `IfMatch` precondition on the representation that was read,
//! so a concurrent writer makes the close fail instead of being overwritten.

use crate::error::{RefsyncError, Result};
use crate::key::NodeKey;
use crate::representation::{EventAction, LifecycleEvent, Representation};
use crate::store::{Precondition, RemoteStore};
use crate::types::{NodeId, NodeKind, OutcomeStatus, RecordState, RefsyncConfig, RunReport};
use crate::utils::local_hostname;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Result of an explicit dossier close
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CloseOutcome {
    /// The dossier was closed and an event appended
    Closed {
        /// Dossier key
        dossier: NodeKey,
        /// Key of the appended event node
        event: NodeKey,
        /// Sequence number of the closed representation
        seq: u64,
    },
    /// The dossier was already closed; nothing was written
    AlreadyClosed {
        /// Dossier key
        dossier: NodeKey,
    },
}

impl CloseOutcome {
    /// Whether this call changed the store
    pub fn is_closed_now(&self) -> bool {
        matches!(self, CloseOutcome::Closed { .. })
    }
}

/// Applies lifecycle transitions through a store
pub struct LifecycleManager<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    config: &'a RefsyncConfig,
}

impl<'a, S: RemoteStore + ?Sized> LifecycleManager<'a, S> {
    /// Create a manager writing to `store`
    pub fn new(store: &'a S, config: &'a RefsyncConfig) -> Self {
        Self { store, config }
    }

    /// Close the taxonomy nodes of `unit` listed in `removed`
    #[instrument(skip(self, removed), fields(count = removed.len()))]
    pub fn close_removed(&self, unit: &str, removed: &[NodeId]) -> RunReport {
        info!("Closing {} removed nodes of {}", removed.len(), unit);
        let mut report = RunReport::new("close_removed", unit, None);

        for id in removed {
            let key = NodeKey::record(unit, id.as_str());
            let status = self.close_node(&key);
            report.record(key, status);
        }

        report.finish();
        info!("{}", report.summary());
        report
    }

    fn close_node(&self, key: &NodeKey) -> OutcomeStatus {
        let stored = match self.store.read(key) {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                warn!("Cannot close {}: not found", key);
                return OutcomeStatus::NotFound;
            }
            Err(e) => {
                warn!("Cannot close {}: {}", key, e);
                return OutcomeStatus::Failed { error: e.to_string() };
            }
        };

        if stored.representation.is_closed() {
            debug!("{} is already closed", key);
            return OutcomeStatus::AlreadyClosed;
        }

        let closed = stored.representation.clone().with_state(RecordState::Closed);
        match self.store.write(key, &closed, &Precondition::IfMatch(stored.etag)) {
            Ok(receipt) => {
                debug!("Closed {} at seq {}", key, receipt.seq);
                OutcomeStatus::Written { seq: receipt.seq }
            }
            Err(e) => {
                warn!("Failed to close {}: {}", key, e);
                OutcomeStatus::Failed { error: e.to_string() }
            }
        }
    }

    /// Close a dossier and append a closure event
    ///
    /// The dossier's most recent representation (highest sequence number) is
    /// the one closed. A second call on a closed dossier writes nothing and
    /// returns [`CloseOutcome::AlreadyClosed`].
    ///
    /// # Errors
    ///
    /// - [`RefsyncError::NodeNotFound`] if the dossier has no history
    /// - [`RefsyncError::WrongKind`] if the node is not a dossier
    /// - [`RefsyncError::PreconditionFailed`] if the dossier changed meanwhile;
    ///   the event node may then exist without being linked
    #[instrument(skip(self))]
    pub fn close_dossier(&self, unit: &str, dossier: &str, at: DateTime<Utc>) -> Result<CloseOutcome> {
        let key = NodeKey::record(unit, dossier);
        let latest = self
            .store
            .read_history(&key)?
            .into_iter()
            .max_by_key(|h| h.seq)
            .ok_or_else(|| RefsyncError::NodeNotFound(key.path()))?;
        let current = self.store.read_at(&latest)?;

        if current.kind != Some(NodeKind::Dossier) {
            return Err(RefsyncError::WrongKind {
                key: key.path(),
                expected: NodeKind::Dossier.to_string(),
                actual: current.kind.map(|k| k.to_string()).unwrap_or_else(|| "untyped node".to_string()),
            });
        }
        if current.is_closed() {
            info!("Dossier {} is already closed", key);
            return Ok(CloseOutcome::AlreadyClosed { dossier: key });
        }
        let guard = Precondition::IfMatch(current.etag()?);

        let event_key = NodeKey::event(unit, dossier, Uuid::new_v4().to_string());
        let event = Representation {
            parent: Some(key.clone()),
            event: Some(LifecycleEvent {
                action: EventAction::Closed,
                at,
                agent: self.config.creator_key(),
                host: local_hostname(),
            }),
            ..Representation::basic(
                format!("Closure of {}", current.label()),
                format!("Dossier closed on {}", at.to_rfc3339()),
            )
        };
        self.store.write(&event_key, &event, &Precondition::IfAbsent)?;

        let mut closed = current.with_state(RecordState::Closed);
        closed.events.push(event_key.clone());
        let receipt = self.store.write(&key, &closed, &guard)?;

        info!("Closed dossier {} (event {})", key, event_key.last_segment());
        Ok(CloseOutcome::Closed {
            dossier: key,
            event: event_key,
            seq: receipt.seq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn open_node(store: &InMemoryStore, key: &NodeKey, kind: NodeKind) {
        let rep = Representation::basic("Node", "")
            .with_identifier("A.1")
            .with_kind(kind)
            .with_state(RecordState::Open)
            .with_children(vec![NodeKey::record("acv", "3")])
            .with_version("1.0.0");
        store.write(key, &rep, &Precondition::IfAbsent).unwrap();
    }

    #[test]
    fn test_close_removed_only_changes_state() {
        let store = InMemoryStore::new();
        let config = RefsyncConfig::new("acv");
        let key = NodeKey::record("acv", "2");
        open_node(&store, &key, NodeKind::Referential);
        let before = store.read(&key).unwrap().unwrap().representation;

        let report = LifecycleManager::new(&store, &config).close_removed("acv", &["2".into()]);
        assert_eq!(report.written(), 1);

        let after = store.read(&key).unwrap().unwrap().representation;
        assert!(after.is_closed());
        assert_eq!(after.with_state(RecordState::Open), before);
    }

    #[test]
    fn test_close_removed_does_not_cascade() {
        let store = InMemoryStore::new();
        let config = RefsyncConfig::new("acv");
        open_node(&store, &NodeKey::record("acv", "2"), NodeKind::Referential);
        open_node(&store, &NodeKey::record("acv", "3"), NodeKind::ReferentialLeaf);

        LifecycleManager::new(&store, &config).close_removed("acv", &["2".into()]);
        let child = store.read(&NodeKey::record("acv", "3")).unwrap().unwrap();
        assert!(!child.representation.is_closed());
    }

    #[test]
    fn test_close_removed_statuses() {
        let store = InMemoryStore::new();
        let config = RefsyncConfig::new("acv");
        open_node(&store, &NodeKey::record("acv", "2"), NodeKind::ReferentialLeaf);
        let manager = LifecycleManager::new(&store, &config);
        manager.close_removed("acv", &["2".into()]);
        let history = store.history_count();

        let report = manager.close_removed("acv", &["2".into(), "404".into()]);
        assert_eq!(
            report.outcome_for(&NodeKey::record("acv", "2")),
            Some(&OutcomeStatus::AlreadyClosed)
        );
        assert_eq!(
            report.outcome_for(&NodeKey::record("acv", "404")),
            Some(&OutcomeStatus::NotFound)
        );
        assert_eq!(store.history_count(), history);
    }

    #[test]
    fn test_close_dossier_appends_one_event() {
        let store = InMemoryStore::new();
        let config = RefsyncConfig::new("acv");
        let key = NodeKey::record("acv", "D7");
        open_node(&store, &key, NodeKind::Dossier);
        let manager = LifecycleManager::new(&store, &config);

        let outcome = manager.close_dossier("acv", "D7", Utc::now()).unwrap();
        let CloseOutcome::Closed { event, .. } = outcome else {
            panic!("dossier should have been closed");
        };

        let dossier = store.read(&key).unwrap().unwrap().representation;
        assert!(dossier.is_closed());
        assert_eq!(dossier.events, vec![event.clone()]);

        let stored_event = store.read(&event).unwrap().unwrap().representation;
        assert_eq!(stored_event.parent, Some(key.clone()));
        assert_eq!(stored_event.event.map(|e| e.action), Some(EventAction::Closed));
        assert_eq!(store.search("records/acv/D7/events/*").unwrap().len(), 1);
    }

    #[test]
    fn test_second_close_is_noop() {
        let store = InMemoryStore::new();
        let config = RefsyncConfig::new("acv");
        open_node(&store, &NodeKey::record("acv", "D7"), NodeKind::Dossier);
        let manager = LifecycleManager::new(&store, &config);

        assert!(manager.close_dossier("acv", "D7", Utc::now()).unwrap().is_closed_now());
        let history = store.history_count();

        let second = manager.close_dossier("acv", "D7", Utc::now()).unwrap();
        assert!(matches!(second, CloseOutcome::AlreadyClosed { .. }));
        assert_eq!(store.history_count(), history);
        assert_eq!(store.search("records/acv/D7/events/*").unwrap().len(), 1);
    }

    #[test]
    fn test_close_dossier_rejects_taxonomy_nodes() {
        let store = InMemoryStore::new();
        let config = RefsyncConfig::new("acv");
        open_node(&store, &NodeKey::record("acv", "2"), NodeKind::ReferentialLeaf);
        let manager = LifecycleManager::new(&store, &config);

        assert!(matches!(
            manager.close_dossier("acv", "2", Utc::now()),
            Err(RefsyncError::WrongKind { .. })
        ));
        assert!(matches!(
            manager.close_dossier("acv", "missing", Utc::now()),
            Err(RefsyncError::NodeNotFound(_))
        ));
    }
}
