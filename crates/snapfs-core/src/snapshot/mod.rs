pub mod filter;
pub mod tree;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use snapfs_types::{BlobId, SnapshotId};

pub use filter::SnapshotFilter;

/// Metadata for a single snapshot, as listed by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub time: DateTime<Utc>,
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Source directories that were backed up.
    #[serde(default)]
    pub paths: Vec<String>,
    /// Root tree blob of the backed-up file hierarchy.
    pub tree: BlobId,
}

impl Snapshot {
    pub fn short_id(&self) -> String {
        self.id.short()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Sort snapshots oldest first, breaking ties by id so the order is total.
pub fn sort_by_time(snapshots: &mut [Snapshot]) {
    snapshots.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
}
