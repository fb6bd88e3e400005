//! Property-based testing for refsync
//!
//! Uses proptest to verify invariants across randomly generated ledgers and
//! successive exports.

use ::refsync::*;
use proptest::prelude::*;
use proptest::sample::Index;
use std::collections::{BTreeMap, BTreeSet};

/// Shape of one generated row: optional parent among earlier rows and an identifier
pub type RowShape = (Option<Index>, String);

/// Generate forests of up to `max` rows with frequently repeated identifiers
fn forest_strategy(max: usize) -> impl Strategy<Value = Vec<RowShape>> {
    prop::collection::vec((prop::option::weighted(0.8, any::<Index>()), "[A-C]{1,2}"), 1..max)
}

/// Rows of a generated forest; ids are 1-based positions
fn rows(shapes: &[RowShape]) -> Vec<Row> {
    shapes
        .iter()
        .enumerate()
        .map(|(i, (parent, identifier))| {
            let parent = match parent {
                Some(index) if i > 0 => ParentRef::Node(NodeId::from((index.index(i) + 1) as u32)),
                _ => ParentRef::UnitRoot,
            };
            Row::new((i + 1) as u32, parent, identifier.clone()).with_title(format!("Node {}", i + 1))
        })
        .collect()
}

/// 1-based position of a generated row
fn position(id: &NodeId) -> usize {
    id.as_str().parse().unwrap()
}

fn referential() -> Referential<InMemoryStore> {
    ReferentialBuilder::new("acv").build(InMemoryStore::new()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Added, removed and retained partition the two id sets
    #[test]
    fn diff_partitions_ids(
        old in prop::collection::btree_set(1u32..200, 0..60),
        new in prop::collection::btree_set(1u32..200, 0..60),
    ) {
        let snapshot = |version: &str, ids: &BTreeSet<u32>| {
            Snapshot::from_rows(
                "acv",
                version,
                ids.iter().map(|id| Row::new(*id, ParentRef::UnitRoot, id.to_string())).collect(),
            )
        };
        let diff = SnapshotDiff::compute(&snapshot("1", &old), &snapshot("2", &new)).unwrap();

        let to_set = |ids: &[NodeId]| -> BTreeSet<u32> {
            ids.iter().map(|id| id.as_str().parse().unwrap()).collect()
        };
        prop_assert_eq!(to_set(&diff.added), new.difference(&old).copied().collect::<BTreeSet<_>>());
        prop_assert_eq!(to_set(&diff.removed), old.difference(&new).copied().collect::<BTreeSet<_>>());
        prop_assert_eq!(to_set(&diff.retained), old.intersection(&new).copied().collect::<BTreeSet<_>>());
        prop_assert_eq!(diff.stats.added + diff.stats.retained, new.len());
        prop_assert_eq!(diff.stats.removed + diff.stats.retained, old.len());
    }

    /// Kinds follow child counts and children keep ledger order
    #[test]
    fn tree_kinds_follow_child_counts(shapes in forest_strategy(80)) {
        let snapshot = Snapshot::from_rows("acv", "1.0.0", rows(&shapes));
        let tree = ReferentialTree::build(&snapshot, OrphanPolicy::Reject);

        prop_assert_eq!(tree.len(), shapes.len());
        prop_assert!(tree.rejected().is_empty());
        for node in tree.nodes() {
            let id = node.row.id.as_str();
            let children = tree.children_of(id);
            prop_assert_eq!(node.kind, NodeKind::for_taxonomy(children.len()));

            let positions: Vec<usize> = children.iter().map(position).collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(tree.depth(id) <= shapes.len());
        }
    }

    /// A second synchronization of the same snapshot writes nothing
    #[test]
    fn synchronize_is_idempotent(shapes in forest_strategy(60)) {
        let referential = referential();
        let snapshot = Snapshot::from_rows("acv", "1.0.0", rows(&shapes));

        let first = referential.synchronize(&snapshot).unwrap();
        prop_assert_eq!(first.written(), shapes.len() + 1);
        let history = referential.store().history_count();

        let second = referential.synchronize(&snapshot).unwrap();
        prop_assert_eq!(second.written(), 0);
        prop_assert_eq!(second.unchanged(), shapes.len() + 1);
        prop_assert_eq!(referential.store().history_count(), history);
    }

    /// Children within every reconstructed node are ordered by identifier
    #[test]
    fn reconstruction_sorts_children(shapes in forest_strategy(60)) {
        let referential = referential();
        referential.synchronize(&Snapshot::from_rows("acv", "1.0.0", rows(&shapes))).unwrap();
        let reconstruction = referential.reconstruct(&referential.root_key(), None);
        prop_assert!(reconstruction.is_complete());
        prop_assert_eq!(reconstruction.node_count(), shapes.len() + 1);

        let mut stack = vec![&reconstruction.root];
        while let Some(node) = stack.pop() {
            prop_assert!(node.children.windows(2).all(|w| w[0].identifier <= w[1].identifier));
            stack.extend(node.children.iter());
        }
    }

    /// Closed nodes never reopen, whatever later exports contain
    #[test]
    fn lifecycle_is_monotonic(
        shapes in forest_strategy(50),
        keep in prop::collection::vec(any::<bool>(), 50),
    ) {
        let referential = referential();
        let all = rows(&shapes);
        let kept: Vec<Row> = all.iter().filter(|r| keep[position(&r.id) - 1]).cloned().collect();
        let v1 = Snapshot::from_rows("acv", "1.0.0", all.clone());
        let v2 = Snapshot::from_rows("acv", "1.1.0", kept);
        let v3 = Snapshot::from_rows("acv", "1.2.0", all);

        referential.synchronize(&v1).unwrap();
        let update = referential.update(&v1, &v2).unwrap();
        let reappear = referential.update(&v2, &v3).unwrap();

        for id in &update.diff.removed {
            let key = referential.node_key(id.as_str());
            prop_assert_eq!(reappear.synchronized.outcome_for(&key), Some(&OutcomeStatus::SkippedClosed));
        }

        let store = referential.store();
        for row in &v1.rows {
            let key = referential.node_key(row.id.as_str());
            let mut closed = false;
            for reference in store.read_history(&key).unwrap() {
                let state = store.read_at(&reference).unwrap().state;
                if closed {
                    prop_assert_eq!(state, Some(RecordState::Closed));
                }
                closed |= state == Some(RecordState::Closed);
            }
            prop_assert_eq!(closed, update.diff.is_removed(row.id.as_str()));
        }
    }

    /// Reconstruction at a version shows the children lists written at that version
    #[test]
    fn reconstruction_is_historically_faithful(
        shapes in forest_strategy(40),
        extra in forest_strategy(20),
    ) {
        let referential = referential();
        let v1 = Snapshot::from_rows("acv", "1.0.0", rows(&shapes));
        let tree = ReferentialTree::build(&v1, OrphanPolicy::Reject);
        referential.synchronize(&v1).unwrap();

        // Second export: every other node plus fresh nodes under the unit root
        let mut next: Vec<Row> = v1.rows.iter().filter(|r| position(&r.id) % 2 == 1).cloned().collect();
        let offset = shapes.len() as u32;
        next.extend(extra.iter().enumerate().map(|(i, (_, identifier))| {
            Row::new(offset + i as u32 + 1, ParentRef::UnitRoot, identifier.clone())
        }));
        let v2 = Snapshot::from_rows("acv", "2.0.0", next);
        referential.update(&v1, &v2).unwrap();

        let reconstruction = referential.reconstruct(&referential.root_key(), Some("1.0.0"));
        prop_assert!(reconstruction.is_complete());
        prop_assert_eq!(reconstruction.node_count(), shapes.len() + 1);

        let expected: BTreeMap<NodeKey, BTreeSet<NodeKey>> = tree
            .nodes()
            .map(|n| {
                let id = n.row.id.as_str();
                (tree.key_of(&n.row.id), tree.children_keys(id).into_iter().collect())
            })
            .collect();
        for (key, children) in expected {
            let node = reconstruction.root.find(&key).unwrap();
            let actual: BTreeSet<NodeKey> = node.children.iter().map(|c| c.key.clone()).collect();
            prop_assert_eq!(actual, children);
        }
    }
}
