//! Main test module for refsync
//!
//! This module includes all test suites:
//! - Integration tests for complete load/update/reconstruct scenarios
//! - Chaos tests for resilience against a failing store
//! - Property-based tests for invariants

pub mod integration;
pub mod chaos;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::refsync::*;
    use ::refsync::store::FsStore;
    use tempfile::TempDir;
    use std::fs;

    #[test]
    fn test_empty_ledger() {
        let storage_dir = TempDir::new().unwrap();
        let store = FsStore::init(storage_dir.path().join("store")).unwrap();
        let referential = ReferentialBuilder::new("acv").build(store).unwrap();

        let ledger = storage_dir.path().join("empty.csv");
        fs::write(&ledger, "M1;M2;M3;M4\n").unwrap();
        let snapshot = referential.load_snapshot(&ledger, Some("1.0.0")).unwrap();
        assert!(snapshot.is_empty());

        let report = referential.synchronize(&snapshot).unwrap();
        // Only the unit root
        assert_eq!(report.written(), 1);

        let root = referential.reconstruct(&referential.root_key(), None);
        assert!(root.root.children.is_empty());
        assert!(root.is_complete());
    }

    #[test]
    fn test_unicode_titles() {
        let referential = ReferentialBuilder::new("acv").build(InMemoryStore::new()).unwrap();
        let titles = ["Archives cantonales", "Département de l'économie", "Προϋπολογισμός", "予算"];
        let rows = titles
            .iter()
            .enumerate()
            .map(|(i, title)| Row::new((i + 1) as u32, ParentRef::UnitRoot, format!("M.{}", i)).with_title(*title))
            .collect();
        let snapshot = Snapshot::from_rows("acv", "1.0.0", rows);

        assert!(referential.synchronize(&snapshot).unwrap().is_clean());
        let tree = referential.reconstruct(&referential.root_key(), Some("1.0.0"));
        let stored: Vec<_> = tree.root.children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(stored, titles);

        let turtle = referential
            .store()
            .read(&referential.node_key("2"))
            .unwrap()
            .unwrap()
            .representation
            .render_turtle("");
        assert!(turtle.contains("Département de l\\'économie"));
    }

    #[test]
    fn test_quoted_ledger_cells() {
        let storage_dir = TempDir::new().unwrap();
        let referential = ReferentialBuilder::new("acv").build(InMemoryStore::new()).unwrap();

        let ledger = storage_dir.path().join("quoted.csv");
        fs::write(
            &ledger,
            "M1;M2;M3;M4;M22\n=\"1\";\"-\";=\"M\";\" Plan \";=\"10A\"\n=\"2\";=\"1\";\"M.1\";\"Leaf\";\"\"\n",
        )
        .unwrap();
        let snapshot = referential.load_snapshot(&ledger, None).unwrap();
        assert_eq!(snapshot.len(), 2, "{:?}", snapshot.rejected);
        assert_eq!(snapshot.version, "1.0.0");
        assert_eq!(snapshot.get("1").unwrap().title, "Plan");
        assert_eq!(snapshot.get("2").unwrap().parent, ParentRef::Node("1".into()));
    }

    #[test]
    fn test_reopened_store_keeps_history() {
        let storage_dir = TempDir::new().unwrap();
        let path = storage_dir.path().join("store");
        let v1 = Snapshot::from_rows("acv", "1.0.0", vec![Row::new(1u32, ParentRef::UnitRoot, "M")]);
        let v2 = Snapshot::from_rows(
            "acv",
            "2.0.0",
            vec![
                Row::new(1u32, ParentRef::UnitRoot, "M"),
                Row::new(2u32, ParentRef::Node("1".into()), "M.1"),
            ],
        );

        {
            let referential = ReferentialBuilder::new("acv").build(FsStore::init(path.clone()).unwrap()).unwrap();
            referential.synchronize(&v1).unwrap();
        }
        let referential = ReferentialBuilder::new("acv").build(FsStore::open(path).unwrap()).unwrap();
        referential.update(&v1, &v2).unwrap();

        let old = referential.reconstruct(&referential.root_key(), Some("1.0.0"));
        let new = referential.reconstruct(&referential.root_key(), Some("2.0.0"));
        assert_eq!(old.node_count(), 2);
        assert_eq!(new.node_count(), 3);
        assert_eq!(
            referential.versions(&referential.node_key("1")).unwrap(),
            vec!["1.0.0".to_string(), "2.0.0".to_string()]
        );
    }
}

#[cfg(test)]
mod concurrency {
    use ::refsync::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_concurrent_moves_never_lose_a_write() {
        let store = Arc::new(InMemoryStore::new());
        let referential = ReferentialBuilder::new("acv").build(Arc::clone(&store)).unwrap();
        let rows = vec![
            Row::new(1u32, ParentRef::UnitRoot, "A"),
            Row::new(2u32, ParentRef::UnitRoot, "B"),
            Row::new(3u32, ParentRef::UnitRoot, "C"),
            Row::new(4u32, ParentRef::Node("1".into()), "A-4"),
        ];
        referential.synchronize(&Snapshot::from_rows("acv", "1.0.0", rows)).unwrap();
        let before = store.history_count();

        let node = NodeKey::record("acv", "4");
        let handles: Vec<_> = ["2", "3"]
            .into_iter()
            .map(|parent| {
                let store = Arc::clone(&store);
                let node = node.clone();
                thread::spawn(move || {
                    ReparentOperator::new(&*store).move_node(&node, &NodeKey::record("acv", parent))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert!(succeeded >= 1);
        for result in &results {
            if let Err(e) = result {
                assert!(matches!(e, RefsyncError::PreconditionFailed { .. }), "{}", e);
            }
        }

        // Every successful move is one historical representation
        assert_eq!(store.history_count(), before + succeeded);
        let parent = store.read(&node).unwrap().unwrap().representation.parent;
        assert!(parent == Some(NodeKey::record("acv", "2")) || parent == Some(NodeKey::record("acv", "3")));
    }
}
