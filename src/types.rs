//! Core data types used throughout the refsync library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Ledger state**: [`NodeId`], [`Row`], [`Snapshot`] - normalised rows of one export
//! - **Node attributes**: [`NodeKind`], [`RecordState`] - derived and lifecycle attributes
//! - **Run results**: [`RunReport`], [`NodeOutcome`], [`OutcomeStatus`] - per-node results
//! - **Configuration**: [`RefsyncConfig`], [`ColumnMapping`], [`OrphanPolicy`]

use crate::error::{RefsyncError, Result, ValidationError};
use crate::key::{Container, NodeKey};
use crate::rules::RuleSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::Path;

/// Identifier of a node within its unit
///
/// Taxonomy nodes carry small integers, dossiers and documents carry call
/// numbers. Both are kept as text so ordering and display never depend on
/// numeric parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Record-set kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// Taxonomy node with at least one child
    Referential,
    /// Taxonomy node without children, attachment point for dossiers
    ReferentialLeaf,
    /// Case file
    Dossier,
    /// Document inside a dossier
    Document,
}

impl NodeKind {
    /// Every kind, in bootstrap order
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Referential,
        NodeKind::ReferentialLeaf,
        NodeKind::Dossier,
        NodeKind::Document,
    ];

    /// Kind of a taxonomy node with the given number of children
    pub fn for_taxonomy(child_count: usize) -> Self {
        if child_count > 0 {
            NodeKind::Referential
        } else {
            NodeKind::ReferentialLeaf
        }
    }

    /// Whether the kind belongs to the classification plan
    pub fn is_taxonomy(&self) -> bool {
        matches!(self, NodeKind::Referential | NodeKind::ReferentialLeaf)
    }

    /// Whether a node of this kind may be rewritten as `other`
    ///
    /// Taxonomy nodes switch between `referential` and `referentialLeaf` as
    /// their children change; dossiers and documents never change kind.
    pub fn shares_collection(&self, other: NodeKind) -> bool {
        *self == other || (self.is_taxonomy() && other.is_taxonomy())
    }

    /// Vocabulary name
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Referential => "referential",
            NodeKind::ReferentialLeaf => "referentialLeaf",
            NodeKind::Dossier => "dossier",
            NodeKind::Document => "document",
        }
    }

    /// Vocabulary key (`types/<name>`)
    pub fn key(&self) -> NodeKey {
        NodeKey::vocabulary(Container::Types, self.as_str())
    }

    /// Title and description written by the bootstrap
    pub fn describe(&self) -> (&'static str, &'static str) {
        match self {
            NodeKind::Referential => (
                "Preservation referential",
                "Comprising a classification plan and management metadata.",
            ),
            NodeKind::ReferentialLeaf => (
                "Preservation referential leaf",
                "Comprising a classification plan tree leaves, i.e. where dossiers are attached.",
            ),
            NodeKind::Dossier => ("Dossier", "Dossier. Must be attached to a referential leaf."),
            NodeKind::Document => ("Document", "Document. Always part of a dossier."),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a node
///
/// Transitions only go from open to closed; closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    /// Active node
    #[default]
    Open,
    /// Terminal state
    Closed,
}

impl RecordState {
    /// Every state, in bootstrap order
    pub const ALL: [RecordState; 2] = [RecordState::Open, RecordState::Closed];

    /// Whether moving to `next` is allowed
    pub fn can_transition_to(&self, next: RecordState) -> bool {
        match (self, next) {
            (RecordState::Open, _) => true,
            (RecordState::Closed, RecordState::Closed) => true,
            (RecordState::Closed, RecordState::Open) => false,
        }
    }

    /// Whether the state is terminal
    pub fn is_closed(&self) -> bool {
        matches!(self, RecordState::Closed)
    }

    /// Vocabulary name
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Open => "open",
            RecordState::Closed => "closed",
        }
    }

    /// Vocabulary key (`states/<name>`)
    pub fn key(&self) -> NodeKey {
        NodeKey::vocabulary(Container::States, self.as_str())
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared parent of a ledger row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentRef {
    /// The row hangs directly under the unit root
    UnitRoot,
    /// The row hangs under another row
    Node(NodeId),
    /// The parent cell was empty
    Missing,
}

/// A normalised ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// 1-based data row number in the source file (0 when built in memory)
    pub row: usize,
    /// Node id
    pub id: NodeId,
    /// Declared parent
    pub parent: ParentRef,
    /// Call number, used as the display and sort key
    pub identifier: String,
    /// Title
    pub title: String,
    /// Scope and content
    pub abstract_text: String,
    /// Personal data marker, kept verbatim
    pub personal_data: String,
    /// Governance rules
    pub rules: RuleSet,
}

impl Row {
    /// Create a row with empty descriptive fields
    pub fn new(id: impl Into<NodeId>, parent: ParentRef, identifier: impl Into<String>) -> Self {
        Self {
            row: 0,
            id: id.into(),
            parent,
            identifier: identifier.into(),
            title: String::new(),
            abstract_text: String::new(),
            personal_data: String::new(),
            rules: RuleSet::default(),
        }
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the scope and content
    pub fn with_abstract(mut self, abstract_text: impl Into<String>) -> Self {
        self.abstract_text = abstract_text.into();
        self
    }

    /// Set the governance rules
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }
}

/// One versioned export of a unit's referential
///
/// Rows keep their ledger order. Rows rejected while loading are kept in
/// `rejected` so a run can report them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unit code, lower case
    pub unit: String,
    /// Version label shared by every row
    pub version: String,
    /// Accepted rows in ledger order
    pub rows: Vec<Row>,
    /// Rows rejected while loading
    pub rejected: Vec<ValidationError>,
}

impl Snapshot {
    /// Ids of the accepted rows, in ledger order
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.rows.iter().map(|r| &r.id)
    }

    /// Number of accepted rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the snapshot has no accepted rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find a row by id
    pub fn get(&self, id: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.id.as_str() == id)
    }
}

/// Result of one node's processing within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// A new representation was written
    Written {
        /// Store sequence number of the new historical representation
        seq: u64,
    },
    /// The stored representation already matched; nothing was written
    Unchanged,
    /// The node is closed and was left untouched
    SkippedClosed,
    /// A close was requested on a node already closed
    AlreadyClosed,
    /// The node does not exist in the store
    NotFound,
    /// The row failed validation and was not written
    Rejected {
        /// Validation failure
        error: ValidationError,
    },
    /// A read or write failed
    Failed {
        /// Description of the failure
        error: String,
    },
}

impl OutcomeStatus {
    /// Whether the node ended in the intended state
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            OutcomeStatus::Written { .. }
                | OutcomeStatus::Unchanged
                | OutcomeStatus::SkippedClosed
                | OutcomeStatus::AlreadyClosed
        )
    }

    /// Short label for reports
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Written { .. } => "written",
            OutcomeStatus::Unchanged => "unchanged",
            OutcomeStatus::SkippedClosed => "skipped (closed)",
            OutcomeStatus::AlreadyClosed => "already closed",
            OutcomeStatus::NotFound => "not found",
            OutcomeStatus::Rejected { .. } => "rejected",
            OutcomeStatus::Failed { .. } => "failed",
        }
    }
}

/// Outcome for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOutcome {
    /// Node the outcome refers to
    pub key: NodeKey,
    /// What happened
    pub status: OutcomeStatus,
}

/// Per-run list of node outcomes for operator inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Operation that produced the report (`synchronize`, `close_removed`, ...)
    pub operation: String,
    /// Unit the run applied to
    pub unit: String,
    /// Version label of the run, if any
    pub version: Option<String>,
    /// Start timestamp
    pub started_at: DateTime<Utc>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
    /// Outcomes in processing order
    pub outcomes: Vec<NodeOutcome>,
    /// Rejected rows without an addressable id
    pub invalid_rows: Vec<ValidationError>,
}

impl RunReport {
    /// Start an empty report
    pub fn new(operation: impl Into<String>, unit: impl Into<String>, version: Option<String>) -> Self {
        Self {
            operation: operation.into(),
            unit: unit.into(),
            version,
            started_at: Utc::now(),
            duration_ms: 0,
            outcomes: Vec::new(),
            invalid_rows: Vec::new(),
        }
    }

    /// Append an outcome
    pub fn record(&mut self, key: NodeKey, status: OutcomeStatus) {
        self.outcomes.push(NodeOutcome { key, status });
    }

    /// Stamp the duration from `started_at`
    pub fn finish(&mut self) {
        let elapsed = Utc::now() - self.started_at;
        self.duration_ms = elapsed.num_milliseconds().max(0) as u64;
    }

    /// Append the outcomes of another report
    pub fn merge(&mut self, other: RunReport) {
        self.outcomes.extend(other.outcomes);
        self.invalid_rows.extend(other.invalid_rows);
    }

    /// Outcome recorded for a key, if any
    pub fn outcome_for(&self, key: &NodeKey) -> Option<&OutcomeStatus> {
        self.outcomes.iter().find(|o| &o.key == key).map(|o| &o.status)
    }

    fn count(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    /// Number of representations written
    pub fn written(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Written { .. }))
    }

    /// Number of nodes left unchanged
    pub fn unchanged(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Unchanged))
    }

    /// Number of nodes skipped or already closed
    pub fn closed(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::SkippedClosed | OutcomeStatus::AlreadyClosed))
    }

    /// Number of rejected rows, addressable or not
    pub fn rejected(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Rejected { .. })) + self.invalid_rows.len()
    }

    /// Number of failed or missing nodes
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Failed { .. } | OutcomeStatus::NotFound))
    }

    /// Whether every node ended in the intended state
    pub fn is_clean(&self) -> bool {
        self.rejected() == 0 && self.failed() == 0
    }

    /// Outcomes that need operator attention
    pub fn problems(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes.iter().filter(|o| !o.status.is_success())
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "{} {}: {} written, {} unchanged, {} closed, {} rejected, {} failed in {}ms",
            self.operation,
            self.unit,
            self.written(),
            self.unchanged(),
            self.closed(),
            self.rejected(),
            self.failed(),
            self.duration_ms
        )
    }
}

/// How the Tree Builder treats a row whose parent is missing or unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Reject the row and its descendants
    #[default]
    Reject,
    /// Attach the row under the unit root and log a warning
    AttachToRoot,
}

/// Ledger column headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    /// Node id column
    pub id: String,
    /// Parent id column
    pub parent: String,
    /// Call number column
    pub identifier: String,
    /// Title column
    pub title: String,
    /// Scope and content column
    pub abstract_text: String,
    /// Protection class column
    pub protection: String,
    /// Personal data column
    pub personal_data: String,
    /// Closing period column
    pub closing_period: String,
    /// Retention period column
    pub retention_period: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            id: "M1".to_string(),
            parent: "M2".to_string(),
            identifier: "M3".to_string(),
            title: "M4".to_string(),
            abstract_text: "M5".to_string(),
            protection: "M11_ExternalId".to_string(),
            personal_data: "M13_ExternalId".to_string(),
            closing_period: "M18.1_ExternalId".to_string(),
            retention_period: "M22".to_string(),
        }
    }
}

impl ColumnMapping {
    /// Columns of an agents export (`Code;PARENT;Acronyme;Nom`)
    ///
    /// Agents carry no description or rules; an empty column name is never
    /// looked up.
    pub fn agents() -> Self {
        Self {
            id: "Code".to_string(),
            parent: "PARENT".to_string(),
            identifier: "Acronyme".to_string(),
            title: "Nom".to_string(),
            abstract_text: String::new(),
            protection: String::new(),
            personal_data: String::new(),
            closing_period: String::new(),
            retention_period: String::new(),
        }
    }
}

/// Layout of the agents hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Prefix of agent names: code `66` is stored as `agents/<prefix>66`
    #[serde(default = "default_agent_prefix")]
    pub prefix: String,
    /// Export column headers
    #[serde(default = "ColumnMapping::agents")]
    pub columns: ColumnMapping,
    /// Export field delimiter
    #[serde(default = "default_agent_delimiter")]
    pub delimiter: char,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            prefix: default_agent_prefix(),
            columns: ColumnMapping::agents(),
            delimiter: default_agent_delimiter(),
        }
    }
}

impl AgentsConfig {
    /// Store name of the agent with code `code`
    pub fn name(&self, code: &str) -> String {
        format!("{}{}", self.prefix, code)
    }
}

fn default_agent_prefix() -> String {
    "roche".to_string()
}

fn default_agent_delimiter() -> char {
    ','
}

fn default_delimiter() -> char {
    ';'
}

fn default_root_sentinel() -> String {
    "-".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_creator() -> String {
    "roche66".to_string()
}

fn default_max_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

/// Configuration of a refsync instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefsyncConfig {
    /// Unit code, lower-cased on load
    pub unit: String,
    /// Description written on the unit root
    #[serde(default)]
    pub unit_description: String,
    /// Agent recorded as creator of written nodes (`agents/<name>`)
    #[serde(default = "default_creator")]
    pub creator: String,
    /// Treatment of rows with missing or unknown parents
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,
    /// Skip writes whose representation already matches the store
    #[serde(default = "default_true")]
    pub skip_unchanged: bool,
    /// Deepest level followed by the reconstructor
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Ledger column headers
    #[serde(default)]
    pub columns: ColumnMapping,
    /// Ledger field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Parent cell value meaning "unit root"
    #[serde(default = "default_root_sentinel")]
    pub root_sentinel: String,
    /// Version label used when none is given
    #[serde(default = "default_version")]
    pub default_version: String,
    /// Agents hierarchy layout
    #[serde(default)]
    pub agents: AgentsConfig,
}

impl RefsyncConfig {
    /// Configuration for a unit with default settings
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into().to_lowercase(),
            unit_description: String::new(),
            creator: default_creator(),
            orphan_policy: OrphanPolicy::default(),
            skip_unchanged: true,
            max_depth: default_max_depth(),
            columns: ColumnMapping::default(),
            delimiter: default_delimiter(),
            root_sentinel: default_root_sentinel(),
            default_version: default_version(),
            agents: AgentsConfig::default(),
        }
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: RefsyncConfig = serde_json::from_str(&content)?;
        config.unit = config.unit.to_lowercase();
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.unit.trim().is_empty() {
            return Err(RefsyncError::InvalidConfiguration("unit code is empty".to_string()));
        }
        if self.unit.contains('/') || self.unit.starts_with('@') {
            return Err(RefsyncError::InvalidConfiguration(format!(
                "unit code '{}' is not a valid path segment",
                self.unit
            )));
        }
        if self.creator.trim().is_empty() || self.creator.contains('/') {
            return Err(RefsyncError::InvalidConfiguration(format!(
                "creator '{}' is not a valid agent name",
                self.creator
            )));
        }
        if self.max_depth == 0 {
            return Err(RefsyncError::InvalidConfiguration("max_depth must be positive".to_string()));
        }
        for delimiter in [self.delimiter, self.agents.delimiter] {
            if !delimiter.is_ascii() {
                return Err(RefsyncError::InvalidConfiguration(format!(
                    "delimiter '{}' must be a single ASCII character",
                    delimiter
                )));
            }
        }
        if self.agents.prefix.contains('/') || self.agents.prefix.starts_with('@') {
            return Err(RefsyncError::InvalidConfiguration(format!(
                "agent prefix '{}' is not a valid path segment",
                self.agents.prefix
            )));
        }
        Ok(())
    }

    /// Key of the configured creator agent
    pub fn creator_key(&self) -> NodeKey {
        NodeKey::vocabulary(Container::Agents, self.creator.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationKind;

    #[test]
    fn test_kind_derivation() {
        assert_eq!(NodeKind::for_taxonomy(0), NodeKind::ReferentialLeaf);
        assert_eq!(NodeKind::for_taxonomy(3), NodeKind::Referential);
        assert!(NodeKind::ReferentialLeaf.is_taxonomy());
        assert!(!NodeKind::Dossier.is_taxonomy());
        assert_eq!(NodeKind::ReferentialLeaf.key().path(), "types/referentialLeaf");
    }

    #[test]
    fn test_state_transitions() {
        assert!(RecordState::Open.can_transition_to(RecordState::Closed));
        assert!(RecordState::Open.can_transition_to(RecordState::Open));
        assert!(RecordState::Closed.can_transition_to(RecordState::Closed));
        assert!(!RecordState::Closed.can_transition_to(RecordState::Open));
    }

    #[test]
    fn test_run_report_counters() {
        let mut report = RunReport::new("synchronize", "acv", Some("1.0.0".to_string()));
        report.record(NodeKey::record("acv", "1"), OutcomeStatus::Written { seq: 1 });
        report.record(NodeKey::record("acv", "2"), OutcomeStatus::Unchanged);
        report.record(
            NodeKey::record("acv", "3"),
            OutcomeStatus::Failed { error: "timeout".to_string() },
        );
        report.record(
            NodeKey::record("acv", "4"),
            OutcomeStatus::Rejected {
                error: ValidationError::new(4, "4", ValidationKind::UnknownParent, "parent 9 is absent"),
            },
        );
        report.finish();

        assert_eq!(report.written(), 1);
        assert_eq!(report.unchanged(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.rejected(), 1);
        assert!(!report.is_clean());
        assert_eq!(report.problems().count(), 2);
        assert!(report.summary().starts_with("synchronize acv: 1 written"));
    }

    #[test]
    fn test_config_roundtrip_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refsync.json");
        std::fs::write(&path, r#"{ "unit": "ACV" }"#).unwrap();

        let config = RefsyncConfig::from_file(&path).unwrap();
        assert_eq!(config.unit, "acv");
        assert_eq!(config.delimiter, ';');
        assert_eq!(config.columns.id, "M1");
        assert_eq!(config.orphan_policy, OrphanPolicy::Reject);
        assert!(config.skip_unchanged);
        assert_eq!(config.agents.name("66"), "roche66");
        assert_eq!(config.agents.columns.id, "Code");
        assert_eq!(config.agents.delimiter, ',');

        config.save(&path).unwrap();
        assert_eq!(RefsyncConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_config_validation() {
        assert!(RefsyncConfig::new("").validate().is_err());
        assert!(RefsyncConfig::new("a/b").validate().is_err());
        let mut config = RefsyncConfig::new("acv");
        config.max_depth = 0;
        assert!(config.validate().is_err());
        assert!(RefsyncConfig::new("acv").validate().is_ok());
    }

    #[test]
    fn test_node_id_borrow() {
        let mut map = std::collections::HashMap::new();
        map.insert(NodeId::from(12u32), "x");
        assert_eq!(map.get("12"), Some(&"x"));
    }
}
