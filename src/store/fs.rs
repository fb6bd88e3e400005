//! Filesystem store
//!
//! Persists nodes and their full history under a root directory:
//!
//! ```text
//! store_root/
//! ├── metadata.json                  # Format version and sequence counter
//! └── nodes/
//!     └── records/acv/12/
//!         ├── @current.json          # Current representation, tag and seq
//!         └── @history/
//!             ├── 00000000000000000001-1718000000123.json.lz4
//!             └── 00000000000000000007-1718000004567.json.lz4
//! ```
//!
//! Node paths map directly to directories; the `@` prefix is reserved for
//! store files so it can never collide with a key segment. History entries
//! are LZ4-compressed JSON named by their zero-padded sequence number and
//! creation time in milliseconds, so listing a node's history never opens an
//! entry and one damaged entry only fails reads of that entry. The sequence
//! counter lives in `metadata.json` and is reserved before any node file is
//! touched.
//!
//! Writes within one process are serialised by a lock; the store does not
//! coordinate between processes.

use super::{compile_pattern, HistoryEntry, HistoryRef, Precondition, RemoteStore, StoredRepresentation, WriteReceipt};
use crate::error::{RefsyncError, Result};
use crate::key::NodeKey;
use crate::representation::{ETag, Representation};
use crate::utils::atomic_write;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

const METADATA_FILE: &str = "metadata.json";
const NODES_DIR: &str = "nodes";
const CURRENT_FILE: &str = "@current.json";
const HISTORY_DIR: &str = "@history";
const HISTORY_EXT: &str = ".json.lz4";

/// Metadata stored at the root of a filesystem store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Version of the on-disk format
    pub format_version: u32,
    /// refsync version that created the store
    pub refsync_version: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last time the store was opened
    pub last_accessed: DateTime<Utc>,
    /// Next sequence number to hand out
    pub next_seq: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CurrentFile {
    seq: u64,
    etag: ETag,
    created_at: DateTime<Utc>,
    representation: Representation,
}

/// Store persisting nodes and history on the local filesystem
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    metadata: Mutex<StoreMetadata>,
}

impl FsStore {
    /// Initialize a new store
    ///
    /// # Errors
    ///
    /// [`RefsyncError::StoreAlreadyExists`] if a store already exists at `root`.
    pub fn init(root: PathBuf) -> Result<Self> {
        if root.join(METADATA_FILE).exists() {
            return Err(RefsyncError::StoreAlreadyExists(root));
        }

        fs::create_dir_all(root.join(NODES_DIR))?;
        let now = Utc::now();
        let metadata = StoreMetadata {
            format_version: 1,
            refsync_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: now,
            last_accessed: now,
            next_seq: 1,
        };
        write_json(&root.join(METADATA_FILE), &metadata)?;

        info!("Initialized store at {:?}", root);
        Ok(Self {
            root,
            metadata: Mutex::new(metadata),
        })
    }

    /// Open an existing store
    ///
    /// # Errors
    ///
    /// [`RefsyncError::StoreNotInitialized`] if no store exists at `root`.
    pub fn open(root: PathBuf) -> Result<Self> {
        let metadata_path = root.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Err(RefsyncError::StoreNotInitialized(root));
        }

        let mut metadata: StoreMetadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)?;
        metadata.last_accessed = Utc::now();
        write_json(&metadata_path, &metadata)?;

        info!("Opened store at {:?} (next seq {})", root, metadata.next_seq);
        Ok(Self {
            root,
            metadata: Mutex::new(metadata),
        })
    }

    /// Open the store at `root`, initializing it if needed
    pub fn init_or_open(root: PathBuf) -> Result<Self> {
        if root.join(METADATA_FILE).exists() {
            Self::open(root)
        } else {
            Self::init(root)
        }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot of the store metadata
    pub fn metadata(&self) -> StoreMetadata {
        self.metadata.lock().clone()
    }

    fn node_dir(&self, key: &NodeKey) -> PathBuf {
        let mut dir = self.root.join(NODES_DIR);
        for segment in key.path().split('/') {
            dir.push(segment);
        }
        dir
    }

    fn history_path(&self, key: &NodeKey, seq: u64, created_at: DateTime<Utc>) -> PathBuf {
        self.node_dir(key)
            .join(HISTORY_DIR)
            .join(format!("{:020}-{}{}", seq, created_at.timestamp_millis(), HISTORY_EXT))
    }

    fn read_current(&self, key: &NodeKey) -> Result<Option<CurrentFile>> {
        let path = self.node_dir(key).join(CURRENT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn read_entry(&self, reference: &HistoryRef) -> Result<HistoryEntry> {
        let (key, seq) = (&reference.key, reference.seq);
        let path = self.history_path(key, seq, reference.created_at);
        if !path.exists() {
            return Err(RefsyncError::NodeNotFound(format!("{}@{}", key, seq)));
        }
        let compressed = fs::read(&path)?;
        let bytes = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| RefsyncError::transport(key.path(), format!("corrupt history entry {}: {}", seq, e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Sequence number and creation time encoded in a history file name
fn parse_history_name(name: &str) -> Option<(u64, DateTime<Utc>)> {
    let (seq, millis) = name.strip_suffix(HISTORY_EXT)?.split_once('-')?;
    let created_at = DateTime::from_timestamp_millis(millis.parse().ok()?)?;
    Some((seq.parse().ok()?, created_at))
}

/// Current time at the millisecond precision kept in history file names
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

impl RemoteStore for FsStore {
    fn write(&self, key: &NodeKey, representation: &Representation, precondition: &Precondition) -> Result<WriteReceipt> {
        key.validate()?;
        let etag = representation.etag()?;

        // Held for the whole write so sequence numbers follow write order
        let mut metadata = self.metadata.lock();

        let current = self.read_current(key)?;
        precondition.check(key, current.as_ref().map(|c| &c.etag))?;

        let seq = metadata.next_seq;
        metadata.next_seq += 1;
        write_json(&self.root.join(METADATA_FILE), &*metadata)?;

        let created_at = now_millis();
        let entry = HistoryEntry {
            seq,
            created_at,
            representation: representation.clone(),
        };
        let compressed = lz4_flex::compress_prepend_size(&serde_json::to_vec(&entry)?);
        atomic_write(&self.history_path(key, seq, created_at), &compressed)?;

        let current = CurrentFile {
            seq,
            etag: etag.clone(),
            created_at,
            representation: representation.clone(),
        };
        write_json(&self.node_dir(key).join(CURRENT_FILE), &current)?;

        trace!("Wrote {} at seq {} ({} bytes compressed)", key, seq, compressed.len());
        Ok(WriteReceipt {
            key: key.clone(),
            seq,
            etag,
            created_at,
        })
    }

    fn read(&self, key: &NodeKey) -> Result<Option<StoredRepresentation>> {
        Ok(self.read_current(key)?.map(|c| StoredRepresentation {
            representation: c.representation,
            etag: c.etag,
            seq: c.seq,
            created_at: c.created_at,
        }))
    }

    fn read_history(&self, key: &NodeKey) -> Result<Vec<HistoryRef>> {
        let dir = self.node_dir(key).join(HISTORY_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut history = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            match parse_history_name(&name) {
                Some((seq, created_at)) => history.push(HistoryRef {
                    key: key.clone(),
                    seq,
                    created_at,
                }),
                None => debug!("Ignoring stray file {} in history of {}", name, key),
            }
        }
        history.sort_unstable_by_key(|h| h.seq);
        Ok(history)
    }

    fn read_at(&self, reference: &HistoryRef) -> Result<Representation> {
        Ok(self.read_entry(reference)?.representation)
    }

    fn search(&self, pattern: &str) -> Result<Vec<NodeKey>> {
        let matcher = compile_pattern(pattern)?;
        let nodes_root = self.root.join(NODES_DIR);
        let mut keys = Vec::new();

        for entry in WalkDir::new(&nodes_root).into_iter().filter_entry(|e| {
            e.file_name().to_str().map(|n| n != HISTORY_DIR).unwrap_or(true)
        }) {
            let entry = entry?;
            if entry.file_name() != CURRENT_FILE {
                continue;
            }
            let Some(dir) = entry.path().parent() else {
                continue;
            };
            let Ok(relative) = dir.strip_prefix(&nodes_root) else {
                continue;
            };
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !matcher.is_match(&path) {
                continue;
            }
            match path.parse::<NodeKey>() {
                Ok(key) => keys.push(key),
                Err(_) => warn!("Ignoring unaddressable node directory {:?}", dir),
            }
        }

        keys.sort_by_key(|k| k.path());
        Ok(keys)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}
