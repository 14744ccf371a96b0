//! Directory-backed repository.
//!
//! Layout below the repository root:
//!
//! ```text
//! snapshots/<snapshot id hex>.json
//! blobs/data/<shard>/<blob id hex>
//! blobs/tree/<shard>/<blob id hex>
//! ```
//!
//! Blob files hold plaintext and are verified against their content address
//! on every load.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::Repository;
use crate::snapshot::Snapshot;
use snapfs_types::{BlobHandle, BlobId, BlobType, Result, SnapfsError};

const SNAPSHOTS_DIR: &str = "snapshots";
const BLOBS_DIR: &str = "blobs";

#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    /// Open an existing repository directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.join(SNAPSHOTS_DIR).is_dir() || !root.join(BLOBS_DIR).is_dir() {
            return Err(SnapfsError::Config(format!(
                "'{}' is not a snapfs repository",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// Create the directory skeleton for a new repository.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(SNAPSHOTS_DIR))?;
        for t in BlobType::ALL {
            fs::create_dir_all(root.join(BLOBS_DIR).join(t.as_str()))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, handle: &BlobHandle) -> PathBuf {
        self.root
            .join(BLOBS_DIR)
            .join(handle.blob_type.as_str())
            .join(handle.id.shard_prefix())
            .join(handle.id.to_hex())
    }

    /// Store a blob, returning its handle. Storing existing content is a no-op.
    pub fn put_blob(&self, blob_type: BlobType, data: &[u8]) -> Result<BlobHandle> {
        let handle = BlobHandle::new(blob_type, BlobId::hash(data));
        let path = self.blob_path(&handle);
        if path.exists() {
            return Ok(handle);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, data)?;
        Ok(handle)
    }

    /// Record snapshot metadata.
    pub fn put_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self
            .root
            .join(SNAPSHOTS_DIR)
            .join(format!("{}.json", snapshot.id.to_hex()));
        let data = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&path, &data)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn not_found_as(handle: &BlobHandle, e: io::Error) -> SnapfsError {
    if e.kind() == io::ErrorKind::NotFound {
        SnapfsError::BlobNotFound(*handle)
    } else {
        SnapfsError::Io(e)
    }
}

impl Repository for LocalRepository {
    fn load_blob(&self, handle: &BlobHandle) -> Result<Vec<u8>> {
        let data = fs::read(self.blob_path(handle)).map_err(|e| not_found_as(handle, e))?;
        if BlobId::hash(&data) != handle.id {
            return Err(SnapfsError::InvalidFormat(format!(
                "blob {handle} does not match its content address"
            )));
        }
        debug!(blob = %handle, size = data.len(), "loaded blob");
        Ok(data)
    }

    fn blob_size(&self, handle: &BlobHandle) -> Result<u32> {
        let meta = fs::metadata(self.blob_path(handle)).map_err(|e| not_found_as(handle, e))?;
        u32::try_from(meta.len()).map_err(|_| {
            SnapfsError::InvalidFormat(format!("blob {handle} exceeds the maximum blob size"))
        })
    }

    fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(self.root.join(SNAPSHOTS_DIR))? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "snapshot vanished while listing");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice::<Snapshot>(&data) {
                Ok(s) => snapshots.push(s),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable snapshot");
                }
            }
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotFilter;
    use chrono::{TimeZone, Utc};
    use snapfs_types::SnapshotId;

    #[test]
    fn open_rejects_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LocalRepository::open(dir.path()),
            Err(SnapfsError::Config(_))
        ));
    }

    #[test]
    fn blobs_roundtrip_and_report_size() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::create(dir.path()).unwrap();
        let h = repo.put_blob(BlobType::Data, b"hello blob").unwrap();

        let repo = LocalRepository::open(dir.path()).unwrap();
        assert_eq!(repo.load_blob(&h).unwrap(), b"hello blob");
        assert_eq!(repo.blob_size(&h).unwrap(), 10);
    }

    #[test]
    fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::create(dir.path()).unwrap();
        let h = BlobHandle::data(BlobId::hash(b"absent"));
        assert!(matches!(repo.load_blob(&h), Err(SnapfsError::BlobNotFound(x)) if x == h));
        assert!(repo.blob_size(&h).unwrap_err().is_not_found());
    }

    #[test]
    fn same_id_different_type_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::create(dir.path()).unwrap();
        let h = repo.put_blob(BlobType::Data, b"x").unwrap();
        let as_tree = BlobHandle::tree(h.id);
        assert!(repo.load_blob(&as_tree).unwrap_err().is_not_found());
    }

    #[test]
    fn corrupted_blob_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::create(dir.path()).unwrap();
        let h = repo.put_blob(BlobType::Data, b"original").unwrap();
        fs::write(repo.blob_path(&h), b"tampered").unwrap();
        assert!(matches!(
            repo.load_blob(&h),
            Err(SnapfsError::InvalidFormat(_))
        ));
    }

    #[test]
    fn snapshots_are_listed_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::create(dir.path()).unwrap();
        for (i, host) in ["web", "db", "web"].iter().enumerate() {
            repo.put_snapshot(&Snapshot {
                id: SnapshotId([i as u8 + 1; 32]),
                time: Utc.with_ymd_and_hms(2024, 3, 3 - i as u32, 12, 0, 0).unwrap(),
                hostname: host.to_string(),
                username: "root".into(),
                tags: Vec::new(),
                paths: vec!["/srv".into()],
                tree: BlobId([0; 32]),
            })
            .unwrap();
        }
        fs::write(dir.path().join(SNAPSHOTS_DIR).join("README"), b"ignored").unwrap();

        assert_eq!(repo.list_snapshots().unwrap().len(), 3);

        let filter = SnapshotFilter {
            hosts: vec!["web".into()],
            ..Default::default()
        };
        let web = repo.list_snapshots_filtered(&filter).unwrap();
        assert_eq!(web.len(), 2);
        // oldest first
        assert!(web[0].time < web[1].time);
        assert_eq!(web[0].id, SnapshotId([3; 32]));
    }

    #[test]
    fn missing_snapshot_directory_is_an_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::create(dir.path()).unwrap();
        fs::remove_dir_all(dir.path().join(SNAPSHOTS_DIR)).unwrap();

        let err = repo.list_snapshots().unwrap_err();
        assert!(matches!(err, SnapfsError::Io(_)));
        assert!(!err.is_not_found());
        assert_eq!(err.errno(), libc::EIO);
    }
}
