//! Integration tests for refsync
//!
//! Exercises complete scenarios through ledger files and the filesystem
//! store: successive exports, closing, historical reconstruction, dossiers
//! and consistency checks.

use ::refsync::*;
use ::refsync::store::FsStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::info;

/// Test harness owning a filesystem store and a ledger generator
pub struct RefsyncTestHarness {
    pub storage_dir: TempDir,
    pub referential: Referential<FsStore>,
    pub generator: LedgerGenerator,
}

impl RefsyncTestHarness {
    /// Create a new test harness for unit `acv`
    pub fn new() -> Self {
        let storage_dir = TempDir::new().unwrap();
        let store = FsStore::init(storage_dir.path().join("store")).unwrap();
        let referential = ReferentialBuilder::new("acv")
            .unit_description("Archives cantonales vaudoises")
            .build(store)
            .unwrap();

        Self {
            storage_dir,
            referential,
            generator: LedgerGenerator::new(42),
        }
    }

    /// Write a ledger to a file in the harness directory and load it
    pub fn load(&self, ledger: &Ledger, version: &str) -> anyhow::Result<Snapshot> {
        let path = self.write_file(&format!("acv{}.csv", version), &ledger.to_csv())?;
        Ok(self.referential.load_snapshot(&path, Some(version))?)
    }

    /// Write an arbitrary file in the harness directory
    pub fn write_file(&self, name: &str, content: &str) -> anyhow::Result<PathBuf> {
        let path = self.storage_dir.path().join(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Keys and identifiers of a reconstructed tree, in display order
    pub fn outline(&self, version: Option<&str>) -> Vec<(NodeKey, String)> {
        fn walk(node: &refsync::reconstruct::OutlineNode, out: &mut Vec<(NodeKey, String)>) {
            out.push((node.key.clone(), node.identifier.clone()));
            for child in &node.children {
                walk(child, out);
            }
        }
        let reconstruction = self.referential.reconstruct(&self.referential.root_key(), version);
        assert!(reconstruction.is_complete(), "{:?}", reconstruction.truncated);
        let mut out = Vec::new();
        walk(&reconstruction.root, &mut out);
        out
    }
}

impl Default for RefsyncTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A ledger export: id -> (parent, identifier)
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub entries: BTreeMap<u32, (Option<u32>, String)>,
}

impl Ledger {
    /// Render in the default column layout
    pub fn to_csv(&self) -> String {
        let mut out = String::from("M1;M2;M3;M4;M5;M22\n");
        for (id, (parent, identifier)) in &self.entries {
            let parent = parent.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{};{};{};Entry {};Scope of {};10A\n",
                id, parent, identifier, identifier, identifier
            ));
        }
        out
    }

    /// Ids with no child in this ledger
    pub fn leaves(&self) -> Vec<u32> {
        let parents: BTreeSet<u32> = self.entries.values().filter_map(|(p, _)| *p).collect();
        self.entries.keys().copied().filter(|id| !parents.contains(id)).collect()
    }

    pub fn ids(&self) -> BTreeSet<u32> {
        self.entries.keys().copied().collect()
    }
}

/// Seeded generator of ledgers and their successive exports
pub struct LedgerGenerator {
    pub rng: StdRng,
    next_id: u32,
}

impl LedgerGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            next_id: 1,
        }
    }

    /// Random forest of `count` nodes; parents always precede children
    pub fn generate(&mut self, count: usize) -> Ledger {
        let mut ledger = Ledger::default();
        for _ in 0..count {
            self.add_node(&mut ledger);
        }
        ledger
    }

    /// Next export: remove up to `removals` leaves and add `additions` nodes
    pub fn evolve(&mut self, ledger: &Ledger, removals: usize, additions: usize) -> (Ledger, Vec<u32>) {
        let mut next = ledger.clone();
        let mut removed = Vec::new();
        let mut leaves = next.leaves();
        for _ in 0..removals.min(leaves.len()) {
            let idx = self.rng.random_range(0..leaves.len());
            let id = leaves.swap_remove(idx);
            next.entries.remove(&id);
            removed.push(id);
        }
        for _ in 0..additions {
            self.add_node(&mut next);
        }
        removed.sort_unstable();
        (next, removed)
    }

    fn add_node(&mut self, ledger: &mut Ledger) {
        let id = self.next_id;
        self.next_id += 1;

        let existing: Vec<u32> = ledger.entries.keys().copied().collect();
        let parent = if existing.is_empty() || self.rng.random_bool(0.2) {
            None
        } else {
            Some(existing[self.rng.random_range(0..existing.len())])
        };
        let identifier = match parent.and_then(|p| ledger.entries.get(&p)) {
            Some((_, parent_identifier)) => format!("{}.{:02}", parent_identifier, self.rng.random_range(0..100)),
            None => format!("M{}", self.rng.random_range(0..10)),
        };
        ledger.entries.insert(id, (parent, identifier));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successive_exports() {
        let mut harness = RefsyncTestHarness::new();
        let bootstrap = harness.referential.bootstrap();
        assert!(bootstrap.is_clean());

        let v1 = harness.generator.generate(60);
        let (v2, removed) = harness.generator.evolve(&v1, 8, 12);
        let (v3, removed_later) = harness.generator.evolve(&v2, 5, 5);
        info!("Removed {:?} then {:?}", removed, removed_later);

        let s1 = harness.load(&v1, "1.0.0").unwrap();
        let s2 = harness.load(&v2, "1.1.0").unwrap();
        let s3 = harness.load(&v3, "1.2.0").unwrap();
        assert!(s1.rejected.is_empty(), "{:?}", s1.rejected);

        let first = harness.referential.synchronize(&s1).unwrap();
        assert!(first.is_clean(), "{}", first.summary());
        assert_eq!(first.written(), 61);
        let at_v1 = harness.outline(Some("1.0.0"));

        let update = harness.referential.update(&s1, &s2).unwrap();
        assert!(update.is_clean(), "{}", update.summary());
        assert_eq!(update.diff.stats.removed, removed.len());
        assert_eq!(update.diff.stats.added, 12);
        assert_eq!(update.closed.written(), removed.len());

        harness.referential.update(&s2, &s3).unwrap();

        for id in &removed {
            let stored = harness
                .referential
                .store()
                .read(&harness.referential.node_key(&id.to_string()))
                .unwrap()
                .unwrap();
            assert!(stored.representation.is_closed(), "node {} should be closed", id);
        }

        // Later exports leave earlier views untouched
        assert_eq!(harness.outline(Some("1.0.0")), at_v1);
        assert_eq!(at_v1.len(), v1.entries.len() + 1);
        assert_eq!(harness.outline(Some("1.1.0")).len(), v2.entries.len() + 1);
        assert_eq!(harness.outline(None).len(), v3.entries.len() + 1);

        let report = harness.referential.verify().unwrap();
        assert!(report.is_valid(), "{}", report.summary());
    }

    #[test]
    fn test_children_follow_identifier_order() {
        let mut harness = RefsyncTestHarness::new();
        let ledger = harness.generator.generate(40);
        let snapshot = harness.load(&ledger, "1.0.0").unwrap();
        harness.referential.synchronize(&snapshot).unwrap();

        fn check(node: &refsync::reconstruct::OutlineNode) {
            for pair in node.children.windows(2) {
                assert!(pair[0].identifier <= pair[1].identifier);
            }
            node.children.iter().for_each(check);
        }
        let reconstruction = harness.referential.reconstruct(&harness.referential.root_key(), None);
        check(&reconstruction.root);

        let html = reconstruction.render_html();
        assert!(html.starts_with("<ul class=\"outline\">"));
        assert_eq!(html.matches("<li>").count(), ledger.entries.len() + 1);
    }

    #[test]
    fn test_rejected_rows_are_reported_not_written() {
        let harness = RefsyncTestHarness::new();
        let path = harness
            .write_file(
                "broken.csv",
                "M1;M2;M3;M4;M22\n1;-;M;Plan;\n2;1;M.1;Leaf;7A\n3;9;M.9;Orphan;\nx;1;M.x;Bad id;\n4;3;M.9.1;Below orphan;\n",
            )
            .unwrap();
        let snapshot = harness.referential.load_snapshot(&path, Some("1.0.0")).unwrap();
        let report = harness.referential.synchronize(&snapshot).unwrap();

        // Invalid rule (7A), unknown parent (9), bad id and the orphan's child
        assert_eq!(report.rejected(), 4, "{}", report.summary());
        assert_eq!(report.written(), 2);
        let store = harness.referential.store();
        assert!(store.read(&harness.referential.node_key("1")).unwrap().is_some());
        for id in ["2", "3", "4"] {
            assert!(store.read(&harness.referential.node_key(id)).unwrap().is_none());
        }

        let root = store.read(&harness.referential.root_key()).unwrap().unwrap().representation;
        assert_eq!(root.children, vec![harness.referential.node_key("1")]);
    }

    #[test]
    fn test_dossier_lifecycle() {
        let harness = RefsyncTestHarness::new();
        let ledger = harness
            .write_file("acv.csv", "M1;M2;M3;M4\n1;-;M;Finances\n2;1;M.10;Budgets\n")
            .unwrap();
        let snapshot = harness.referential.load_snapshot(&ledger, Some("1.0.0")).unwrap();
        harness.referential.synchronize(&snapshot).unwrap();

        let records = harness
            .write_file(
                "records.csv",
                "id;type;callnr;parent;title;description;instance;filename;fmt;mimetype\n\
                 D1;dossier;M.10-D1;2;Budget 2021;Yearly budget;;;;\n\
                 D1;document;1;;Draft;;i1;draft.pdf;fmt/95;application/pdf\n",
            )
            .unwrap();
        let loaded = harness.referential.load_records(&records).unwrap();
        assert!(loaded.is_clean(), "{}", loaded.summary());

        let outcome = harness.referential.close_dossier("D1", None).unwrap();
        assert!(outcome.is_closed_now());
        assert!(matches!(
            harness.referential.close_dossier("D1", None).unwrap(),
            CloseOutcome::AlreadyClosed { .. }
        ));

        let dossier_key = harness.referential.node_key("D1");
        let store = harness.referential.store();
        let dossier = store.read(&dossier_key).unwrap().unwrap().representation;
        assert!(dossier.is_closed());
        assert_eq!(dossier.events.len(), 1);
        let event = store.read(&dossier.events[0]).unwrap().unwrap().representation;
        assert_eq!(event.parent, Some(dossier_key.clone()));
        assert!(event.event.is_some());
        assert_eq!(store.read_history(&dossier_key).unwrap().len(), 2);

        let dossiers = harness.referential.list_dossiers().unwrap();
        assert_eq!(dossiers.len(), 1);
        assert_eq!(dossiers[0].state, RecordState::Closed);

        // Reloading records leaves the closed dossier alone
        let reload = harness.referential.load_records(&records).unwrap();
        assert_eq!(reload.outcome_for(&dossier_key), Some(&OutcomeStatus::SkippedClosed));
        assert_eq!(store.read_history(&dossier_key).unwrap().len(), 2);
    }

    #[test]
    fn test_move_then_resynchronize() {
        let harness = RefsyncTestHarness::new();
        let ledger = harness
            .write_file("acv.csv", "M1;M2;M3;M4\n1;-;M.10;A\n2;-;M.20;B\n3;1;M.10-3;Leaf\n")
            .unwrap();
        let snapshot = harness.referential.load_snapshot(&ledger, Some("1.0.0")).unwrap();
        harness.referential.synchronize(&snapshot).unwrap();

        let node = harness.referential.node_key("3");
        let moved = harness
            .referential
            .move_node(&node, &harness.referential.node_key("2"))
            .unwrap();
        assert_eq!(moved.new_identifier, "M.20-3");

        // The old parent still lists the node until the ledger follows
        let report = harness.referential.verify().unwrap();
        assert_eq!(report.parent_mismatches.len(), 1);

        let followed = harness
            .write_file("acv2.csv", "M1;M2;M3;M4\n1;-;M.10;A\n2;-;M.20;B\n3;2;M.20-3;Leaf\n")
            .unwrap();
        let snapshot = harness.referential.load_snapshot(&followed, Some("1.1.0")).unwrap();
        harness.referential.synchronize(&snapshot).unwrap();
        let report = harness.referential.verify().unwrap();
        assert!(report.is_valid(), "{}", report.summary());
    }
}
