//! Snapshot Loader
//!
//! Reads a delimited ledger export into a validated [`Snapshot`]. Cells are
//! normalised (export quoting stripped, missing cells become empty) and each
//! row either becomes a [`Row`] or a [`ValidationError`] kept on the
//! snapshot. Only an unreadable file or a ledger missing its id or parent
//! column is an error for the whole load.

use crate::collections::HashMap;
#[cfg(feature = "gxhash")]
use crate::collections::HashMapExt;
use crate::error::{RefsyncError, Result, ValidationError, ValidationKind};
use crate::rules::RuleSet;
use crate::types::{ColumnMapping, NodeId, ParentRef, RefsyncConfig, Row, Snapshot};
use crate::utils::strip_textfield;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

impl Snapshot {
    /// Build a snapshot from rows already in memory
    ///
    /// Ids appearing on more than one row are ambiguous: every occurrence is
    /// rejected with [`ValidationKind::DuplicateId`].
    pub fn from_rows(unit: &str, version: impl Into<String>, rows: Vec<Row>) -> Self {
        Self::assemble(unit.to_lowercase(), version.into(), rows, Vec::new())
    }

    /// Ids named by rejected rows, in row order, without repeats
    ///
    /// Rows rejected for a malformed cell or a duplicated id still place
    /// their node in the export. Rows whose id cell is not an id name no node.
    pub fn rejected_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = Vec::new();
        for error in &self.rejected {
            if error.kind == ValidationKind::InvalidId {
                continue;
            }
            if let Some(id) = parse_taxonomy_id(&error.id) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    fn assemble(unit: String, version: String, rows: Vec<Row>, mut rejected: Vec<ValidationError>) -> Self {
        let mut counts: HashMap<NodeId, usize> = HashMap::with_capacity(rows.len());
        for row in &rows {
            *counts.entry(row.id.clone()).or_insert(0) += 1;
        }

        let mut accepted = Vec::with_capacity(rows.len());
        for row in rows {
            if counts.get(&row.id).copied().unwrap_or(0) > 1 {
                rejected.push(ValidationError::new(
                    row.row,
                    row.id.as_str(),
                    ValidationKind::DuplicateId,
                    "id appears on more than one row",
                ));
            } else {
                accepted.push(row);
            }
        }
        rejected.sort_by_key(|e| e.row);

        Self {
            unit,
            version,
            rows: accepted,
            rejected,
        }
    }
}

/// Reads ledger exports with a configured column mapping
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    unit: String,
    columns: ColumnMapping,
    delimiter: u8,
    root_sentinel: String,
}

struct ColumnIndex {
    id: usize,
    parent: usize,
    identifier: Option<usize>,
    title: Option<usize>,
    abstract_text: Option<usize>,
    protection: Option<usize>,
    personal_data: Option<usize>,
    closing_period: Option<usize>,
    retention_period: Option<usize>,
}

impl SnapshotLoader {
    /// Create a loader from the instance configuration
    pub fn new(config: &RefsyncConfig) -> Self {
        Self {
            unit: config.unit.to_lowercase(),
            columns: config.columns.clone(),
            // validate() guarantees an ASCII delimiter
            delimiter: config.delimiter as u8,
            root_sentinel: config.root_sentinel.clone(),
        }
    }

    /// Create a loader for agents exports
    pub fn for_agents(config: &RefsyncConfig) -> Self {
        Self {
            unit: config.unit.to_lowercase(),
            columns: config.agents.columns.clone(),
            delimiter: config.agents.delimiter as u8,
            root_sentinel: config.root_sentinel.clone(),
        }
    }

    /// Load a ledger file
    pub fn load(&self, path: &Path, version: &str) -> Result<Snapshot> {
        info!("Loading snapshot {} from {:?}", version, path);
        let file = std::fs::File::open(path)?;
        self.read(file, version)
    }

    /// Load a ledger from any reader
    pub fn read<R: Read>(&self, reader: R, version: &str) -> Result<Snapshot> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let index = self.index_columns(&headers)?;

        let mut rows = Vec::new();
        let mut rejected = Vec::new();
        for (i, record) in csv_reader.records().enumerate() {
            let record = record?;
            match self.parse_row(i + 1, &record, &index) {
                Ok(row) => rows.push(row),
                Err(err) => {
                    warn!("Rejected ledger row: {}", err);
                    rejected.push(err);
                }
            }
        }

        let snapshot = Snapshot::assemble(self.unit.clone(), version.to_string(), rows, rejected);
        info!(
            "Loaded {} rows ({} rejected) for unit {}",
            snapshot.rows.len(),
            snapshot.rejected.len(),
            snapshot.unit
        );
        Ok(snapshot)
    }

    fn index_columns(&self, headers: &csv::StringRecord) -> Result<ColumnIndex> {
        let find = |name: &str| {
            if name.is_empty() {
                return None;
            }
            headers.iter().position(|h| strip_textfield(h) == name)
        };
        let required = |name: &str| {
            find(name).ok_or_else(|| {
                RefsyncError::InvalidConfiguration(format!("ledger has no '{}' column", name))
            })
        };

        let index = ColumnIndex {
            id: required(&self.columns.id)?,
            parent: required(&self.columns.parent)?,
            identifier: find(&self.columns.identifier),
            title: find(&self.columns.title),
            abstract_text: find(&self.columns.abstract_text),
            protection: find(&self.columns.protection),
            personal_data: find(&self.columns.personal_data),
            closing_period: find(&self.columns.closing_period),
            retention_period: find(&self.columns.retention_period),
        };
        debug!("Ledger columns resolved: id={} parent={}", index.id, index.parent);
        Ok(index)
    }

    fn parse_row(
        &self,
        row: usize,
        record: &csv::StringRecord,
        index: &ColumnIndex,
    ) -> std::result::Result<Row, ValidationError> {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(strip_textfield)
                .unwrap_or_default()
        };

        let raw_id = cell(Some(index.id));
        let id = parse_taxonomy_id(&raw_id).ok_or_else(|| {
            ValidationError::new(row, raw_id.as_str(), ValidationKind::InvalidId, "id is not an unsigned integer")
        })?;

        let raw_parent = cell(Some(index.parent));
        let parent = if raw_parent == self.root_sentinel {
            ParentRef::UnitRoot
        } else if raw_parent.is_empty() {
            ParentRef::Missing
        } else {
            // A malformed parent never matches an accepted id; the orphan policy decides.
            ParentRef::Node(parse_taxonomy_id(&raw_parent).unwrap_or_else(|| NodeId::new(raw_parent.as_str())))
        };

        let rules = RuleSet::parse(
            row,
            id.as_str(),
            &cell(index.retention_period),
            &cell(index.closing_period),
            &cell(index.protection),
        )?;

        Ok(Row {
            row,
            id,
            parent,
            identifier: cell(index.identifier),
            title: cell(index.title),
            abstract_text: cell(index.abstract_text),
            personal_data: cell(index.personal_data),
            rules,
        })
    }
}

pub(crate) fn parse_taxonomy_id(cell: &str) -> Option<NodeId> {
    let digits = cell.strip_suffix(".0").unwrap_or(cell);
    digits.parse::<u64>().ok().map(|n| NodeId::new(n.to_string()))
}
