use crate::error::Result;
use crate::wal::{StoredEntry, Wal};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;

/// Persistence collaborator for the query engine.
///
/// `find_all` returns an empty vec for an unknown dataset; deciding that empty
/// means "not found" is up to the caller.
pub trait RecordStore: Send + Sync {
    fn save(&self, dataset: &str, serialized_record: &str) -> Result<u64>;

    fn find_all(&self, dataset: &str) -> Result<Vec<String>>;

    fn stats(&self) -> StoreStats;

    /// Make previously saved records durable. No-op for volatile stores.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub datasets: usize,
    pub records: usize,
    pub wal_bytes: u64,
}

#[derive(Default)]
struct DatasetIndex {
    // dataset -> (id, serialized record) in id order
    datasets: HashMap<String, Vec<(u64, String)>>,
    last_id: u64,
}

impl DatasetIndex {
    fn next_id(&self) -> u64 {
        self.last_id + 1
    }

    fn insert(&mut self, entry: StoredEntry) {
        self.last_id = self.last_id.max(entry.id);
        self.datasets
            .entry(entry.dataset_name)
            .or_default()
            .push((entry.id, entry.serialized_record));
    }

    fn find_all(&self, dataset: &str) -> Vec<String> {
        self.datasets
            .get(dataset)
            .map(|rows| rows.iter().map(|(_, json)| json.clone()).collect())
            .unwrap_or_default()
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            datasets: self.datasets.len(),
            records: self.datasets.values().map(|v| v.len()).sum(),
            wal_bytes: 0,
        }
    }
}

/// Volatile store. Ids come from one counter shared by all datasets, from 1.
#[derive(Default)]
pub struct MemoryStore {
    index: RwLock<DatasetIndex>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn save(&self, dataset: &str, serialized_record: &str) -> Result<u64> {
        let mut guard = self.index.write();
        let id = guard.next_id();
        guard.insert(StoredEntry {
            id,
            dataset_name: dataset.to_string(),
            serialized_record: serialized_record.to_string(),
        });
        Ok(id)
    }

    fn find_all(&self, dataset: &str) -> Result<Vec<String>> {
        Ok(self.index.read().find_all(dataset))
    }

    fn stats(&self) -> StoreStats {
        self.index.read().stats()
    }
}

/// Durable store backed by a write-ahead log, with an in-memory index rebuilt
/// on open.
pub struct WalStore {
    wal: RwLock<Wal>,
    index: RwLock<DatasetIndex>,
}

impl WalStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let mut wal = Wal::open(dir)?;
        let replay = wal.replay()?;
        if replay.valid_len < wal.len() {
            wal.truncate_to(replay.valid_len)?;
        }
        let mut index = DatasetIndex::default();
        let count = replay.entries.len();
        for entry in replay.entries {
            index.insert(entry);
        }
        tracing::info!(
            path = %wal.path().display(),
            records = count,
            datasets = index.datasets.len(),
            "replayed record log"
        );
        Ok(Self {
            wal: RwLock::new(wal),
            index: RwLock::new(index),
        })
    }

    pub fn flush_wal(&self) -> Result<()> {
        self.wal.write().flush_sync()
    }
}

impl RecordStore for WalStore {
    fn save(&self, dataset: &str, serialized_record: &str) -> Result<u64> {
        // index lock first, then wal: ids reach the log in increasing order
        let mut index = self.index.write();
        let entry = StoredEntry {
            id: index.next_id(),
            dataset_name: dataset.to_string(),
            serialized_record: serialized_record.to_string(),
        };
        self.wal.write().append(&entry)?;
        let id = entry.id;
        index.insert(entry);
        Ok(id)
    }

    fn find_all(&self, dataset: &str) -> Result<Vec<String>> {
        Ok(self.index.read().find_all(dataset))
    }

    fn stats(&self) -> StoreStats {
        let mut stats = self.index.read().stats();
        stats.wal_bytes = self.wal.read().len();
        stats
    }

    fn flush(&self) -> Result<()> {
        self.flush_wal()
    }
}
