use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::config::MountConfig;
use crate::repo::MemoryRepository;
use crate::snapshot::tree::{NodeType, Tree, TreeNode};
use crate::snapshot::Snapshot;
use crate::vfs::{Node, Root};
use snapfs_types::{BlobHandle, BlobId, BlobType, SnapshotId};

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

/// A snapshot id whose bytes are all `seed`, so short ids are predictable.
pub fn snapshot_id(seed: u8) -> SnapshotId {
    SnapshotId([seed; 32])
}

pub fn snapshot(
    seed: u8,
    time: DateTime<Utc>,
    hostname: &str,
    tags: &[&str],
    tree: BlobId,
) -> Snapshot {
    Snapshot {
        id: snapshot_id(seed),
        time,
        hostname: hostname.to_string(),
        username: "tester".to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        paths: vec!["/home/tester".to_string()],
        tree,
    }
}

pub fn file_node(name: &str, content: Vec<BlobId>) -> TreeNode {
    TreeNode {
        name: name.to_string(),
        node_type: NodeType::File,
        mode: 0o644,
        mtime: at(2024, 1, 1, 0),
        size: 0,
        content,
        subtree: None,
        link_target: None,
    }
}

pub fn dir_node(name: &str, subtree: BlobId) -> TreeNode {
    TreeNode {
        name: name.to_string(),
        node_type: NodeType::Dir,
        mode: 0o755,
        mtime: at(2024, 1, 1, 0),
        size: 0,
        content: Vec::new(),
        subtree: Some(subtree),
        link_target: None,
    }
}

pub fn symlink_node(name: &str, target: &str) -> TreeNode {
    TreeNode {
        name: name.to_string(),
        node_type: NodeType::Symlink,
        mode: 0o777,
        mtime: at(2024, 1, 1, 0),
        size: 0,
        content: Vec::new(),
        subtree: None,
        link_target: Some(target.to_string()),
    }
}

/// Mount settings for tests: names are plain dates so they are easy to
/// spell out, and the snapshot list never goes stale on its own.
pub fn test_mount_config() -> MountConfig {
    MountConfig {
        snapshot_template: "%Y-%m-%d".to_string(),
        refresh_interval: "1h".to_string(),
        ..MountConfig::default()
    }
}

pub fn data_handle(data: &[u8]) -> BlobHandle {
    BlobHandle::new(BlobType::Data, BlobId::hash(data))
}

/// A repository with two snapshots sharing one tree:
///
/// ```text
/// big.bin           "abcd" + "efghi" + "jklmno"
/// docs/readme.txt   "hello " + "world"
/// link -> docs/readme.txt
/// ```
///
/// Snapshot 0x11 was taken on host `alpha` (tag `daily`) on 2024-01-01,
/// snapshot 0x22 on host `beta` (tags `daily`, `weekly`) on 2024-01-02.
pub struct Fixture {
    pub repo: Arc<MemoryRepository>,
    pub root_tree: BlobId,
    pub docs_tree: BlobId,
    pub big_blobs: Vec<BlobHandle>,
    pub readme_blobs: Vec<BlobHandle>,
}

impl Fixture {
    pub fn new() -> Self {
        let repo = Arc::new(MemoryRepository::new());

        let readme_blobs = vec![
            repo.add_blob(BlobType::Data, b"hello "),
            repo.add_blob(BlobType::Data, b"world"),
        ];
        let docs_tree = repo
            .add_tree(&Tree {
                nodes: vec![file_node(
                    "readme.txt",
                    readme_blobs.iter().map(|h| h.id).collect(),
                )],
            })
            .unwrap();

        let big_blobs = vec![
            repo.add_blob(BlobType::Data, b"abcd"),
            repo.add_blob(BlobType::Data, b"efghi"),
            repo.add_blob(BlobType::Data, b"jklmno"),
        ];
        let root_tree = repo
            .add_tree(&Tree {
                nodes: vec![
                    file_node("big.bin", big_blobs.iter().map(|h| h.id).collect()),
                    dir_node("docs", docs_tree),
                    symlink_node("link", "docs/readme.txt"),
                ],
            })
            .unwrap();

        repo.add_snapshot(snapshot(0x11, at(2024, 1, 1, 10), "alpha", &["daily"], root_tree));
        repo.add_snapshot(snapshot(
            0x22,
            at(2024, 1, 2, 10),
            "beta",
            &["daily", "weekly"],
            root_tree,
        ));

        Self {
            repo,
            root_tree,
            docs_tree,
            big_blobs,
            readme_blobs,
        }
    }

    pub fn mount(&self) -> Arc<Root> {
        self.mount_with(test_mount_config())
    }

    pub fn mount_with(&self, config: MountConfig) -> Arc<Root> {
        Root::new(self.repo.clone(), config).unwrap()
    }

    pub fn root_node(&self) -> Node {
        self.mount().node()
    }
}

/// Entry names of a directory listing, in listing order.
pub fn names(node: &Node) -> Vec<String> {
    node.read_dir_all()
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect()
}
