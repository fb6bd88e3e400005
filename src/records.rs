//! Dossiers and documents
//!
//! Loads a records ledger and attaches its dossiers to the classification
//! plan. The ledger has one row per dossier and one row per document, tied
//! together by the dossier `id`:
//!
//! ```text
//! id;type;callnr;parent;title;description;instance;filename;fmt;mimetype
//! D7;dossier;M.10.01-D7;235;Budget 2021;Yearly budget;;;;
//! D7;document;1;;Draft;First draft;i1;draft.pdf;fmt/95;application/pdf
//! ```
//!
//! A dossier's `parent` is the id of a taxonomy node of the same unit, which
//! must exist in the store as a `referentialLeaf`. Each dossier gets a
//! `documents` container and one node per document carrying the file's
//! technical metadata. File contents are not transferred.

use crate::collections::{HashMap, HashSet};
#[cfg(feature = "gxhash")]
use crate::collections::{HashMapExt, HashSetExt};
use crate::error::{RefsyncError, Result, ValidationError, ValidationKind};
use crate::key::NodeKey;
use crate::representation::{Instantiation, Representation};
use crate::snapshot::parse_taxonomy_id;
use crate::store::RemoteStore;
use crate::sync::Synchronizer;
use crate::types::{NodeId, NodeKind, OutcomeStatus, RecordState, RefsyncConfig, RunReport};
use crate::utils::strip_textfield;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// A document row of the records ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// 1-based data row number
    pub row: usize,
    /// Document id (its call number within the dossier)
    pub id: String,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// File metadata
    pub instantiation: Instantiation,
}

/// A dossier with its documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DossierRecord {
    /// 1-based data row number of the dossier row
    pub row: usize,
    /// Dossier id
    pub id: String,
    /// Call number
    pub identifier: String,
    /// Taxonomy node the dossier attaches to
    pub parent: NodeId,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Documents in ledger order
    pub documents: Vec<DocumentRecord>,
}

/// Parsed records ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsLedger {
    /// Unit the dossiers belong to
    pub unit: String,
    /// Dossiers in order of first appearance
    pub dossiers: Vec<DossierRecord>,
    /// Rows that failed validation
    pub rejected: Vec<ValidationError>,
}

impl RecordsLedger {
    /// Total number of documents
    pub fn document_count(&self) -> usize {
        self.dossiers.iter().map(|d| d.documents.len()).sum()
    }
}

struct RawRecord {
    row: usize,
    id: String,
    kind: String,
    callnr: String,
    parent: String,
    title: String,
    description: String,
    instance: String,
    filename: String,
    format: String,
    mime_type: String,
}

/// Reads records ledgers
#[derive(Debug, Clone)]
pub struct RecordsLoader {
    unit: String,
    delimiter: u8,
}

impl RecordsLoader {
    /// Create a loader from the instance configuration
    pub fn new(config: &RefsyncConfig) -> Self {
        Self {
            unit: config.unit.to_lowercase(),
            delimiter: config.delimiter as u8,
        }
    }

    /// Load a records ledger file
    pub fn load(&self, path: &Path) -> Result<RecordsLedger> {
        info!("Loading records from {:?}", path);
        let file = std::fs::File::open(path)?;
        self.read(file)
    }

    /// Load a records ledger from any reader
    pub fn read<R: Read>(&self, reader: R) -> Result<RecordsLedger> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let find = |name: &str| headers.iter().position(|h| strip_textfield(h) == name);
        let required = |name: &str| {
            find(name).ok_or_else(|| {
                RefsyncError::InvalidConfiguration(format!("records ledger has no '{}' column", name))
            })
        };
        let (id_col, type_col, callnr_col, parent_col) =
            (required("id")?, required("type")?, required("callnr")?, required("parent")?);
        let optional = ["title", "description", "instance", "filename", "fmt", "mimetype"].map(find);

        let mut groups: Vec<(String, Vec<RawRecord>)> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();
        for (i, record) in csv_reader.records().enumerate() {
            let record = record?;
            let cell = |idx: Option<usize>| {
                idx.and_then(|i| record.get(i))
                    .map(strip_textfield)
                    .unwrap_or_default()
            };
            let raw = RawRecord {
                row: i + 1,
                id: cell(Some(id_col)),
                kind: cell(Some(type_col)).to_lowercase(),
                callnr: cell(Some(callnr_col)),
                parent: cell(Some(parent_col)),
                title: cell(optional[0]),
                description: cell(optional[1]),
                instance: cell(optional[2]),
                filename: cell(optional[3]),
                format: cell(optional[4]),
                mime_type: cell(optional[5]),
            };
            let slot = *group_index.entry(raw.id.clone()).or_insert_with(|| {
                groups.push((raw.id.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(raw);
        }

        let mut ledger = RecordsLedger {
            unit: self.unit.clone(),
            ..Default::default()
        };
        for (id, rows) in groups {
            match self.assemble(&id, rows, &mut ledger.rejected) {
                Ok(dossier) => ledger.dossiers.push(dossier),
                Err(err) => {
                    warn!("Rejected records of dossier {}: {}", id, err);
                    ledger.rejected.push(err);
                }
            }
        }
        ledger.rejected.sort_by_key(|e| e.row);

        info!(
            "Loaded {} dossiers with {} documents ({} rows rejected)",
            ledger.dossiers.len(),
            ledger.document_count(),
            ledger.rejected.len()
        );
        Ok(ledger)
    }

    fn assemble(
        &self,
        id: &str,
        rows: Vec<RawRecord>,
        rejected: &mut Vec<ValidationError>,
    ) -> std::result::Result<DossierRecord, ValidationError> {
        let first_row = rows.first().map(|r| r.row).unwrap_or(0);
        let invalid = |row: usize, detail: String| ValidationError::new(row, id, ValidationKind::InvalidRecord, detail);

        if id.is_empty() || NodeKey::record(&self.unit, id).validate().is_err() {
            return Err(invalid(first_row, format!("dossier id '{}' is not addressable", id)));
        }

        let mut dossier_rows = Vec::new();
        let mut document_rows = Vec::new();
        for raw in rows {
            match raw.kind.as_str() {
                "dossier" => dossier_rows.push(raw),
                "document" => document_rows.push(raw),
                other => rejected.push(invalid(raw.row, format!("unknown record type '{}'", other))),
            }
        }

        let dossier = match dossier_rows.len() {
            0 => return Err(invalid(first_row, "no dossier row".to_string())),
            1 => dossier_rows.remove(0),
            _ => {
                return Err(ValidationError::new(
                    dossier_rows[1].row,
                    id,
                    ValidationKind::DuplicateId,
                    "dossier appears on more than one row",
                ))
            }
        };
        let parent = parse_taxonomy_id(&dossier.parent).ok_or_else(|| {
            invalid(dossier.row, format!("parent '{}' is not a taxonomy id", dossier.parent))
        })?;

        let mut seen = HashSet::new();
        let mut documents = Vec::new();
        for doc in document_rows {
            if doc.callnr.is_empty() || NodeKey::document(&self.unit, id, doc.callnr.as_str()).validate().is_err() {
                rejected.push(invalid(doc.row, format!("document id '{}' is not addressable", doc.callnr)));
                continue;
            }
            if !seen.insert(doc.callnr.clone()) {
                rejected.push(ValidationError::new(
                    doc.row,
                    doc.callnr.as_str(),
                    ValidationKind::DuplicateId,
                    format!("document appears twice in dossier {}", id),
                ));
                continue;
            }
            documents.push(DocumentRecord {
                row: doc.row,
                id: doc.callnr,
                title: doc.title,
                description: doc.description,
                instantiation: Instantiation {
                    id: doc.instance,
                    original_name: doc.filename,
                    mime_type: doc.mime_type,
                    format: doc.format,
                },
            });
        }

        Ok(DossierRecord {
            row: dossier.row,
            id: id.to_string(),
            identifier: dossier.callnr,
            parent,
            title: dossier.title,
            description: dossier.description,
            documents,
        })
    }
}

/// Summary of a dossier found in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DossierSummary {
    /// Dossier key
    pub key: NodeKey,
    /// Call number
    pub identifier: String,
    /// Title
    pub title: String,
    /// Lifecycle state
    pub state: RecordState,
    /// Parent link
    pub parent: Option<NodeKey>,
    /// Number of documents
    pub documents: usize,
}

/// Writes dossiers and documents to a store
pub struct RecordsWriter<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    config: &'a RefsyncConfig,
}

impl<'a, S: RemoteStore + ?Sized> RecordsWriter<'a, S> {
    /// Create a writer targeting `store`
    pub fn new(store: &'a S, config: &'a RefsyncConfig) -> Self {
        Self { store, config }
    }

    /// Write every valid dossier of `ledger` with its documents
    #[instrument(skip(self, ledger), fields(unit = %ledger.unit, dossiers = ledger.dossiers.len()))]
    pub fn write(&self, ledger: &RecordsLedger) -> RunReport {
        let mut report = RunReport::new("load_records", ledger.unit.clone(), None);
        let sync = Synchronizer::new(self.store, self.config);

        for error in &ledger.rejected {
            let key = NodeKey::record(&ledger.unit, error.id.clone());
            if error.id.is_empty() || key.validate().is_err() {
                report.invalid_rows.push(error.clone());
            } else {
                report.record(key, OutcomeStatus::Rejected { error: error.clone() });
            }
        }

        for dossier in &ledger.dossiers {
            self.write_dossier(&sync, &ledger.unit, dossier, &mut report);
        }

        report.finish();
        info!("{}", report.summary());
        report
    }

    fn write_dossier(&self, sync: &Synchronizer<'_, S>, unit: &str, dossier: &DossierRecord, report: &mut RunReport) {
        let key = NodeKey::record(unit, dossier.id.as_str());
        let parent_key = NodeKey::record(unit, dossier.parent.as_str());

        let reject = |detail: String| OutcomeStatus::Rejected {
            error: ValidationError::new(dossier.row, dossier.id.as_str(), ValidationKind::InvalidRecord, detail),
        };
        let parent = match self.store.read(&parent_key) {
            Ok(Some(stored)) => stored.representation,
            Ok(None) => {
                report.record(key, reject(format!("parent {} does not exist", parent_key)));
                return;
            }
            Err(e) => {
                warn!("Failed to read parent {}: {}", parent_key, e);
                report.record(key, OutcomeStatus::Failed { error: e.to_string() });
                return;
            }
        };
        if parent.kind != Some(NodeKind::ReferentialLeaf) || parent.is_closed() {
            let detail = format!(
                "parent {} is not an open referentialLeaf (found {})",
                parent_key,
                parent.kind.map(|k| k.to_string()).unwrap_or_else(|| "untyped node".to_string())
            );
            warn!("Rejected dossier {}: {}", key, detail);
            report.record(key, reject(detail));
            return;
        }

        let documents_key = NodeKey::documents(unit, dossier.id.as_str());
        let document_keys: Vec<NodeKey> = dossier
            .documents
            .iter()
            .map(|d| NodeKey::document(unit, dossier.id.as_str(), d.id.as_str()))
            .collect();

        let rep = Representation::basic(dossier.title.clone(), dossier.description.clone())
            .with_identifier(dossier.identifier.clone())
            .with_kind(NodeKind::Dossier)
            .with_state(RecordState::Open)
            .with_parent(parent_key)
            .with_children(document_keys.clone())
            .with_creator(self.config.creator_key());
        let status = sync.write_row(&key, &rep, dossier.row);
        let skip_documents = matches!(
            status,
            OutcomeStatus::SkippedClosed | OutcomeStatus::Failed { .. } | OutcomeStatus::Rejected { .. }
        );
        report.record(key.clone(), status);
        if skip_documents {
            debug!("Not writing documents of {}", key);
            return;
        }

        let container = Representation::basic("documents", "Documents container.")
            .with_parent(key.clone())
            .with_children(document_keys.clone());
        let status = sync.write_node(&documents_key, &container);
        report.record(documents_key, status);

        for (doc, doc_key) in dossier.documents.iter().zip(document_keys) {
            let rep = Representation {
                instantiation: Some(doc.instantiation.clone()),
                ..Representation::basic(doc.title.clone(), doc.description.clone())
                    .with_identifier(doc.id.clone())
                    .with_kind(NodeKind::Document)
                    .with_state(RecordState::Open)
                    .with_parent(key.clone())
            };
            let status = sync.write_row(&doc_key, &rep, doc.row);
            report.record(doc_key, status);
        }
    }

    /// Dossiers of `unit` currently in the store, by key
    pub fn list_dossiers(&self, unit: &str) -> Result<Vec<DossierSummary>> {
        let pattern = format!("{}/*", NodeKey::unit_root(unit).path());
        let mut dossiers = Vec::new();
        for key in self.store.search(&pattern)? {
            let Some(stored) = self.store.read(&key)? else {
                continue;
            };
            let rep = stored.representation;
            if rep.kind != Some(NodeKind::Dossier) {
                continue;
            }
            dossiers.push(DossierSummary {
                key,
                identifier: rep.identifier.clone().unwrap_or_default(),
                title: rep.title.clone(),
                state: rep.state.unwrap_or_default(),
                parent: rep.parent.clone(),
                documents: rep.children.len(),
            });
        }
        debug!("Found {} dossiers in {}", dossiers.len(), unit);
        Ok(dossiers)
    }
}
