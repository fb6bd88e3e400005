//! Chaos testing for refsync
//!
//! Wraps a store in a fault injector that fails reads and writes, or applies
//! writes and then drops the acknowledgment. Runs must never abort on such
//! failures, and re-running them must converge without duplicate history.

use ::refsync::*;
use ::refsync::store::{FsStore, HistoryRef, Precondition, StoredRepresentation, WriteReceipt};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use tempfile::TempDir;
use tracing::{info, warn};

/// Failure rates of a [`ChaosStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaosConfig {
    /// Probability that a read fails
    pub read_failure_rate: f64,
    /// Probability that a write fails without being applied
    pub write_failure_rate: f64,
    /// Probability that a write is applied but reported as failed
    pub lost_ack_rate: f64,
}

impl ChaosConfig {
    pub fn healthy() -> Self {
        Self::default()
    }
}

/// Seeded source of injected failures
pub struct ChaosEngine {
    rng: Mutex<StdRng>,
    config: Mutex<ChaosConfig>,
    injected: Mutex<usize>,
}

impl ChaosEngine {
    pub fn new(seed: u64, config: ChaosConfig) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            config: Mutex::new(config),
            injected: Mutex::new(0),
        }
    }

    pub fn set_config(&self, config: ChaosConfig) {
        *self.config.lock() = config;
    }

    pub fn injected(&self) -> usize {
        *self.injected.lock()
    }

    fn roll(&self, rate: impl Fn(&ChaosConfig) -> f64) -> bool {
        let rate = rate(&self.config.lock());
        if rate <= 0.0 {
            return false;
        }
        let hit = self.rng.lock().random_bool(rate.min(1.0));
        if hit {
            *self.injected.lock() += 1;
        }
        hit
    }
}

/// Store wrapper injecting transport failures
pub struct ChaosStore<S: RemoteStore> {
    pub inner: S,
    pub engine: ChaosEngine,
}

impl<S: RemoteStore> ChaosStore<S> {
    pub fn new(inner: S, seed: u64, config: ChaosConfig) -> Self {
        Self {
            inner,
            engine: ChaosEngine::new(seed, config),
        }
    }
}

impl<S: RemoteStore> RemoteStore for ChaosStore<S> {
    fn write(&self, key: &NodeKey, representation: &Representation, precondition: &Precondition) -> Result<WriteReceipt> {
        if self.engine.roll(|c| c.write_failure_rate) {
            warn!("Injected write failure on {}", key);
            return Err(RefsyncError::transport(key.path(), "connection reset"));
        }
        let receipt = self.inner.write(key, representation, precondition)?;
        if self.engine.roll(|c| c.lost_ack_rate) {
            warn!("Dropped acknowledgment of seq {} on {}", receipt.seq, key);
            return Err(RefsyncError::transport(key.path(), "response lost"));
        }
        Ok(receipt)
    }

    fn read(&self, key: &NodeKey) -> Result<Option<StoredRepresentation>> {
        if self.engine.roll(|c| c.read_failure_rate) {
            return Err(RefsyncError::transport(key.path(), "read timeout"));
        }
        self.inner.read(key)
    }

    fn read_history(&self, key: &NodeKey) -> Result<Vec<HistoryRef>> {
        self.inner.read_history(key)
    }

    fn read_at(&self, reference: &HistoryRef) -> Result<Representation> {
        self.inner.read_at(reference)
    }

    fn search(&self, pattern: &str) -> Result<Vec<NodeKey>> {
        self.inner.search(pattern)
    }
}

/// Ledger of `count` nodes: ten roots, the rest spread below them
pub fn wide_snapshot(version: &str, count: u32) -> Snapshot {
    let rows = (1..=count)
        .map(|id| {
            let parent = if id <= 10 {
                ParentRef::UnitRoot
            } else {
                ParentRef::Node(NodeId::from(id % 10 + 1))
            };
            Row::new(id, parent, format!("M.{:03}", id)).with_title(format!("Entry {}", id))
        })
        .collect();
    Snapshot::from_rows("acv", version, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn chaotic(config: ChaosConfig) -> Referential<ChaosStore<InMemoryStore>> {
        ReferentialBuilder::new("acv")
            .build(ChaosStore::new(InMemoryStore::new(), 7, config))
            .unwrap()
    }

    #[test]
    #[traced_test]
    fn test_synchronize_survives_write_failures() {
        let referential = chaotic(ChaosConfig {
            write_failure_rate: 0.3,
            ..Default::default()
        });
        let snapshot = wide_snapshot("1.0.0", 100);

        let report = referential.synchronize(&snapshot).unwrap();
        assert_eq!(report.outcomes.len(), 101, "every node gets an outcome");
        assert!(report.failed() > 0);
        assert_eq!(report.written() + report.failed(), 101);
        info!("First run: {}", report.summary());

        referential.store().engine.set_config(ChaosConfig::healthy());
        let retry = referential.synchronize(&snapshot).unwrap();
        assert!(retry.is_clean(), "{}", retry.summary());
        assert_eq!(retry.written(), report.failed());
        assert_eq!(retry.unchanged(), report.written());

        let verification = referential.verify().unwrap();
        assert!(verification.is_valid(), "{}", verification.summary());
    }

    #[test]
    #[traced_test]
    fn test_lost_acknowledgments_are_safe_to_retry() {
        let referential = chaotic(ChaosConfig {
            lost_ack_rate: 0.5,
            ..Default::default()
        });
        let snapshot = wide_snapshot("1.0.0", 60);

        let first = referential.synchronize(&snapshot).unwrap();
        assert!(first.failed() > 0);

        referential.store().engine.set_config(ChaosConfig::healthy());
        let retry = referential.synchronize(&snapshot).unwrap();
        assert_eq!(retry.written(), 0, "applied writes must not be repeated");
        assert_eq!(retry.unchanged(), 61);

        // One historical representation per node
        assert_eq!(referential.store().inner.history_count(), 61);
    }

    #[test]
    fn test_closing_resumes_after_failures() {
        let referential = chaotic(ChaosConfig::healthy());
        let v1 = wide_snapshot("1.0.0", 50);
        let v2 = wide_snapshot("1.1.0", 30);
        referential.synchronize(&v1).unwrap();

        referential.store().engine.set_config(ChaosConfig {
            read_failure_rate: 0.4,
            ..Default::default()
        });
        let diff = SnapshotDiff::compute(&v1, &v2).unwrap();
        let first = referential.close_removed(&diff.removed);
        assert_eq!(first.outcomes.len(), 20);
        assert!(first.failed() > 0);

        referential.store().engine.set_config(ChaosConfig::healthy());
        let second = referential.close_removed(&diff.removed);
        assert!(second.is_clean(), "{}", second.summary());
        assert_eq!(second.written(), first.failed());
        assert_eq!(second.closed(), first.written());

        for id in &diff.removed {
            let stored = referential.store().read(&referential.node_key(id.as_str())).unwrap().unwrap();
            assert!(stored.representation.is_closed());
        }
    }

    #[test]
    fn test_failed_reads_truncate_reconstruction() {
        let referential = chaotic(ChaosConfig::healthy());
        referential.synchronize(&wide_snapshot("1.0.0", 40)).unwrap();

        referential.store().engine.set_config(ChaosConfig {
            read_failure_rate: 0.2,
            ..Default::default()
        });
        let reconstruction = referential.reconstruct(&referential.root_key(), None);
        let injected = referential.store().engine.injected();

        if injected == 0 {
            assert!(reconstruction.is_complete());
        } else {
            assert!(!reconstruction.is_complete());
            assert!(reconstruction
                .truncated
                .iter()
                .all(|t| matches!(t.reason, refsync::reconstruct::TruncationReason::ReadFailed { .. })));
        }
    }

    #[test]
    #[traced_test]
    fn test_corrupted_node_file_is_isolated() {
        let storage_dir = TempDir::new().unwrap();
        let root = storage_dir.path().join("store");
        let referential = ReferentialBuilder::new("acv").build(FsStore::init(root.clone()).unwrap()).unwrap();
        referential.synchronize(&wide_snapshot("1.0.0", 20)).unwrap();

        let current = root.join("nodes/records/acv/15/@current.json");
        assert!(current.exists());
        fs::write(&current, b"{ not json").unwrap();

        let report = referential.synchronize(&wide_snapshot("1.1.0", 20)).unwrap();
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.outcome_for(&referential.node_key("15")),
            Some(OutcomeStatus::Failed { .. })
        ));
        assert_eq!(report.written(), 20);

        let reconstruction = referential.reconstruct(&referential.root_key(), None);
        assert_eq!(reconstruction.truncated.len(), 1);
        assert_eq!(reconstruction.truncated[0].key, referential.node_key("15"));

        // History is untouched by the corruption
        let historical = referential.reconstruct(&referential.node_key("15"), Some("1.0.0"));
        assert!(historical.is_complete());
        assert_eq!(historical.root.identifier, "M.015");
    }
}
