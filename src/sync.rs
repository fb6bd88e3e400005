//! Synchronizer
//!
//! Renders every accepted node of a [`ReferentialTree`] into its store
//! representation and writes it, one write per node. A failure on one node
//! is recorded in the [`RunReport`] and never stops the run.
//!
//! Writes are full replacements, so re-running after a partial failure is
//! safe: nodes already written are found unchanged (or rewritten
//! identically) and the rest are written now. Closed nodes are never
//! touched again.
//!
//! [`Synchronizer::bootstrap`] writes the structural containers and the
//! type, state and rule vocabularies every link in a representation points
//! to. Trees in [`TreeSpace::Agents`] are written the same way, as untyped
//! nodes under the `agents` container.

use crate::error::{ValidationError, ValidationKind};
use crate::key::{Container, NodeKey};
use crate::representation::Representation;
use crate::rules;
use crate::store::{Precondition, RemoteStore};
use crate::tree::{ReferentialTree, TreeNode, TreeSpace};
use crate::types::{NodeId, NodeKind, OutcomeStatus, RecordState, RefsyncConfig, RunReport};
use tracing::{debug, info, instrument, warn};

/// Writes trees and vocabularies to a store
pub struct Synchronizer<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    config: &'a RefsyncConfig,
}

impl<'a, S: RemoteStore + ?Sized> Synchronizer<'a, S> {
    /// Create a synchronizer writing to `store`
    pub fn new(store: &'a S, config: &'a RefsyncConfig) -> Self {
        Self { store, config }
    }

    /// Write containers, vocabularies and the creator agent
    #[instrument(skip(self))]
    pub fn bootstrap(&self) -> RunReport {
        info!("Bootstrapping store vocabularies");
        let mut report = RunReport::new("bootstrap", self.config.unit.clone(), None);

        for container in Container::ALL {
            let (title, description) = container_description(container);
            let key = NodeKey::Container(container);
            let mut rep = Representation::basic(title, description);
            // Children written by an agents load survive a later bootstrap
            if let Ok(Some(stored)) = self.store.read(&key) {
                rep.children = stored.representation.children;
            }
            let status = self.write_node(&key, &rep);
            report.record(key, status);
        }

        for kind in NodeKind::ALL {
            let (title, description) = kind.describe();
            let rep = Representation::basic(title, description).with_vocabulary("recordSetType");
            report.record(kind.key(), self.write_node(&kind.key(), &rep));
        }

        for state in RecordState::ALL {
            let rep = Representation::basic(
                format!("State {}", state),
                format!("Record management states: {}.", state),
            )
            .with_vocabulary("state");
            report.record(state.key(), self.write_node(&state.key(), &rep));
        }

        for (key, title, description) in rules::vocabulary() {
            let rep = Representation::basic(title, description).with_vocabulary("rule");
            let status = self.write_node(&key, &rep);
            report.record(key, status);
        }

        // The creator is written only when no agents load described it
        let creator = self.config.creator_key();
        let status = match self.store.read(&creator) {
            Ok(Some(_)) => OutcomeStatus::Unchanged,
            _ => {
                let rep = Representation::basic(self.config.creator.clone(), "Creator of the loaded records")
                    .with_vocabulary("agent");
                self.write_node(&creator, &rep)
            }
        };
        report.record(creator, status);

        report.finish();
        info!("{}", report.summary());
        report
    }

    /// Write the unit root and every accepted node of `tree`
    #[instrument(skip(self, tree), fields(unit = %tree.unit(), version = %tree.version()))]
    pub fn synchronize(&self, tree: &ReferentialTree) -> RunReport {
        info!("Synchronizing {} nodes", tree.len());
        let mut report = RunReport::new("synchronize", tree.unit(), Some(tree.version().to_string()));

        for error in tree.rejected() {
            self.record_rejection(&mut report, tree, error);
        }

        let root_key = tree.root_key();
        let root = match tree.space() {
            TreeSpace::Records => self.render_unit_root(tree),
            TreeSpace::Agents { .. } => self.render_agents_root(tree),
        };
        let status = self.write_node(&root_key, &root);
        report.record(root_key, status);

        for node in tree.nodes() {
            let key = tree.key_of(&node.row.id);
            let rep = match tree.space() {
                TreeSpace::Records => self.render_node(tree, node),
                TreeSpace::Agents { .. } => self.render_agent(tree, node),
            };
            let status = self.write_row(&key, &rep, node.row.row);
            report.record(key, status);
        }

        report.finish();
        info!("{}", report.summary());
        report
    }

    /// Representation of the unit root for `tree`
    pub fn render_unit_root(&self, tree: &ReferentialTree) -> Representation {
        let children = tree.roots().iter().map(|id| tree.key_of(id)).collect();
        Representation::basic(tree.unit().to_uppercase(), self.config.unit_description.clone())
            .with_parent(NodeKey::Container(Container::Records))
            .with_children(children)
            .with_version(tree.version())
    }

    /// Representation of the `agents` container listing root-level agents
    pub fn render_agents_root(&self, tree: &ReferentialTree) -> Representation {
        let (title, description) = container_description(Container::Agents);
        let children = tree.roots().iter().map(|id| tree.key_of(id)).collect();
        Representation::basic(title, description).with_children(children)
    }

    /// Representation of one agent
    pub fn render_agent(&self, tree: &ReferentialTree, node: &TreeNode) -> Representation {
        let row = &node.row;
        Representation::basic(row.title.clone(), row.abstract_text.clone())
            .with_identifier(row.identifier.clone())
            .with_state(RecordState::Open)
            .with_parent(tree.parent_key(row.id.as_str()))
            .with_children(tree.children_keys(row.id.as_str()))
            .with_version(tree.version())
    }

    /// Representation of one accepted node
    pub fn render_node(&self, tree: &ReferentialTree, node: &TreeNode) -> Representation {
        let row = &node.row;
        Representation::basic(row.title.clone(), row.abstract_text.clone())
            .with_identifier(row.identifier.clone())
            .with_kind(node.kind)
            .with_state(RecordState::Open)
            .with_rules(row.rules.keys())
            .with_parent(tree.parent_key(row.id.as_str()))
            .with_children(tree.children_keys(row.id.as_str()))
            .with_version(tree.version())
            .with_creator(self.config.creator_key())
    }

    fn record_rejection(&self, report: &mut RunReport, tree: &ReferentialTree, error: &ValidationError) {
        warn!("Rejected {}", error);
        let key = tree.key_of(&NodeId::new(error.id.clone()));
        if error.id.is_empty() || key.validate().is_err() {
            report.invalid_rows.push(error.clone());
        } else {
            report.record(
                key,
                OutcomeStatus::Rejected {
                    error: error.clone(),
                },
            );
        }
    }

    /// Write one node unless it is closed or already up to date
    pub(crate) fn write_node(&self, key: &NodeKey, rep: &Representation) -> OutcomeStatus {
        self.write_row(key, rep, 0)
    }

    /// Write the node of ledger row `row`
    ///
    /// A key already holding a node of another collection (a taxonomy node
    /// where a dossier is expected, or the reverse) is left untouched and the
    /// row is rejected.
    pub(crate) fn write_row(&self, key: &NodeKey, rep: &Representation, row: usize) -> OutcomeStatus {
        let current = match self.store.read(key) {
            Ok(current) => current,
            Err(e) => {
                warn!("Failed to read {}: {}", key, e);
                return OutcomeStatus::Failed { error: e.to_string() };
            }
        };

        if let Some(stored) = &current {
            if let (Some(found), Some(wanted)) = (stored.representation.kind, rep.kind) {
                if !found.shares_collection(wanted) {
                    let detail = format!("{} already holds a {} node, not a {}", key, found, wanted);
                    warn!("Rejected {}: {}", key, detail);
                    return OutcomeStatus::Rejected {
                        error: ValidationError::new(row, key.last_segment(), ValidationKind::KindConflict, detail),
                    };
                }
            }
            if stored.representation.is_closed() {
                debug!("Skipping closed node {}", key);
                return OutcomeStatus::SkippedClosed;
            }
            if self.config.skip_unchanged && stored.representation == *rep {
                debug!("Unchanged {}", key);
                return OutcomeStatus::Unchanged;
            }
        }

        match self.store.write(key, rep, &Precondition::from_read(current.as_ref())) {
            Ok(receipt) => {
                debug!("Wrote {} at seq {}", key, receipt.seq);
                OutcomeStatus::Written { seq: receipt.seq }
            }
            Err(e) => {
                warn!("Failed to write {}: {}", key, e);
                OutcomeStatus::Failed { error: e.to_string() }
            }
        }
    }
}

fn container_description(container: Container) -> (&'static str, &'static str) {
    match container {
        Container::Records => ("Records", "Records sets and records."),
        Container::Types => ("Types", "Record types: referential, referentialLeaf, dossier, document"),
        Container::States => ("States", "Record management states: open or closed."),
        Container::Rules => ("Rules", "Preservation referential rules."),
        Container::Agents => ("Agents", "Administrative units, groups, people and software"),
    }
}
