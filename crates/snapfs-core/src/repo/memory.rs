//! In-memory repository with load accounting, used by tests and demos.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::Repository;
use crate::snapshot::tree::Tree;
use crate::snapshot::Snapshot;
use snapfs_types::{BlobHandle, BlobId, BlobType, Result, SnapfsError, SnapshotId};

/// In-memory repository. Thread-safe via Mutex.
///
/// Records how often each blob was loaded and how often snapshots were
/// listed, and can be told to fail or slow down individual loads.
#[derive(Default)]
pub struct MemoryRepository {
    blobs: Mutex<HashMap<BlobHandle, Vec<u8>>>,
    snapshots: Mutex<Vec<Snapshot>>,
    loads: Mutex<HashMap<BlobHandle, usize>>,
    failing: Mutex<HashSet<BlobHandle>>,
    load_delay: Mutex<Option<Duration>>,
    snapshot_lists: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_blob(&self, blob_type: BlobType, data: &[u8]) -> BlobHandle {
        let handle = BlobHandle::new(blob_type, BlobId::hash(data));
        self.blobs.lock().unwrap().insert(handle, data.to_vec());
        handle
    }

    /// Encode and store a tree, returning its id.
    pub fn add_tree(&self, tree: &Tree) -> Result<BlobId> {
        Ok(self.add_blob(BlobType::Tree, &tree.encode()?).id)
    }

    pub fn add_snapshot(&self, snapshot: Snapshot) {
        self.snapshots.lock().unwrap().push(snapshot);
    }

    pub fn remove_snapshot(&self, id: &SnapshotId) -> Option<Snapshot> {
        let mut snapshots = self.snapshots.lock().unwrap();
        let pos = snapshots.iter().position(|s| s.id == *id)?;
        Some(snapshots.remove(pos))
    }

    /// Make every future load of `handle` fail with a backend error.
    pub fn fail_blob(&self, handle: BlobHandle) {
        self.failing.lock().unwrap().insert(handle);
    }

    /// Sleep this long inside every blob load.
    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock().unwrap() = Some(delay);
    }

    /// Number of `load_blob` calls for `handle`, successful or not.
    pub fn load_count(&self, handle: &BlobHandle) -> usize {
        self.loads.lock().unwrap().get(handle).copied().unwrap_or(0)
    }

    pub fn total_loads(&self) -> usize {
        self.loads.lock().unwrap().values().sum()
    }

    pub fn snapshot_list_count(&self) -> usize {
        self.snapshot_lists.load(Ordering::SeqCst)
    }
}

impl Repository for MemoryRepository {
    fn load_blob(&self, handle: &BlobHandle) -> Result<Vec<u8>> {
        *self.loads.lock().unwrap().entry(*handle).or_insert(0) += 1;

        let delay = *self.load_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if self.failing.lock().unwrap().contains(handle) {
            return Err(SnapfsError::Backend(format!("injected failure for {handle}")));
        }

        self.blobs
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .ok_or(SnapfsError::BlobNotFound(*handle))
    }

    fn blob_size(&self, handle: &BlobHandle) -> Result<u32> {
        self.blobs
            .lock()
            .unwrap()
            .get(handle)
            .map(|d| d.len() as u32)
            .ok_or(SnapfsError::BlobNotFound(*handle))
    }

    fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        self.snapshot_lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshots.lock().unwrap().clone())
    }
}
