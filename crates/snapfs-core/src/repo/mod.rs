pub mod local;
pub mod memory;

use tracing::debug;

use crate::snapshot::{self, Snapshot, SnapshotFilter};
use snapfs_types::{BlobHandle, Result};

pub use self::local::LocalRepository;
pub use self::memory::MemoryRepository;

/// Read-only view of a backup repository, as consumed by the filesystem
/// layer.
///
/// Implementations resolve blobs to their decoded (decrypted, decompressed)
/// bytes. Retrying transient failures is up to the implementation; callers
/// surface every error as-is.
pub trait Repository: Send + Sync {
    /// Load the plaintext bytes of a blob.
    ///
    /// Returns `SnapfsError::BlobNotFound` if the repository has no such blob.
    fn load_blob(&self, handle: &BlobHandle) -> Result<Vec<u8>>;

    /// Plaintext size of a blob, answered from the index without loading it.
    fn blob_size(&self, handle: &BlobHandle) -> Result<u32>;

    /// Every snapshot in the repository, in no particular order.
    fn list_snapshots(&self) -> Result<Vec<Snapshot>>;

    /// Snapshots accepted by `filter`, oldest first.
    fn list_snapshots_filtered(&self, filter: &SnapshotFilter) -> Result<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = self
            .list_snapshots()?
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect();
        snapshot::sort_by_time(&mut snapshots);
        debug!(count = snapshots.len(), "listed snapshots");
        Ok(snapshots)
    }
}
