use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::MountConfig;
use crate::testutil::{at, names, snapshot, test_mount_config, Fixture};
use crate::vfs::{dynamic_inode, FileType, Node, Root, DIR_PERM, FILE_PERM, ROOT_INODE, SYMLINK_PERM};
use snapfs_types::{BlobHandle, BlobId, SnapfsError};

#[test]
fn root_lists_the_four_categories() {
    let fx = Fixture::new();
    let root = fx.root_node();

    let entries = root.read_dir_all().unwrap();
    let listed: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(listed, vec![".", "..", "hosts", "ids", "snapshots", "tags"]);
    assert_eq!(entries[0].inode, ROOT_INODE);
    assert_eq!(entries[1].inode, ROOT_INODE);
    assert!(entries.iter().all(|e| e.kind == FileType::Directory));
    // The root is fixed and never asks the repository for anything.
    assert_eq!(fx.repo.snapshot_list_count(), 0);
}

#[test]
fn root_attr_is_read_only_directory() {
    let fx = Fixture::new();
    let attr = fx.root_node().attr().unwrap();
    assert_eq!(attr.inode, ROOT_INODE);
    assert_eq!(attr.kind, FileType::Directory);
    assert_eq!(attr.perm, DIR_PERM);
    assert_eq!(attr.mode(), libc::S_IFDIR as u32 | 0o555);
}

#[test]
fn snapshots_are_named_by_template_with_latest_link() {
    let fx = Fixture::new();
    let snapshots = fx.root_node().lookup("snapshots").unwrap();
    assert_eq!(
        names(&snapshots),
        vec![".", "..", "2024-01-01", "2024-01-02", "latest"]
    );

    let latest = snapshots.lookup("latest").unwrap();
    assert_eq!(latest.kind(), FileType::Symlink);
    assert_eq!(latest.readlink().unwrap(), "2024-01-02");
    let attr = latest.attr().unwrap();
    assert_eq!(attr.perm, SYMLINK_PERM);
    assert_eq!(attr.size, "2024-01-02".len() as u64);
}

#[test]
fn lookup_snapshot_by_name_is_a_directory() {
    let fx = Fixture::new();
    let snap = fx.root_node().resolve("snapshots/2024-01-01").unwrap();
    let attr = snap.attr().unwrap();
    assert_eq!(attr.kind, FileType::Directory);
    assert_eq!(attr.perm, DIR_PERM);
    let snapshots_inode = dynamic_inode(ROOT_INODE, "snapshots");
    assert_eq!(attr.inode, dynamic_inode(snapshots_inode, "2024-01-01"));
    assert_eq!(attr.mtime, std::time::SystemTime::from(at(2024, 1, 1, 10)));
}

#[test]
fn lookup_missing_entry_is_not_found() {
    let fx = Fixture::new();
    let root = fx.root_node();

    let err = root.lookup("nonexistent").unwrap_err();
    assert!(matches!(err, SnapfsError::EntryNotFound(ref n) if n == "nonexistent"));
    assert!(err.is_not_found());
    assert_eq!(err.errno(), libc::ENOENT);

    let err = root.resolve("snapshots/1999-12-31").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn owner_follows_config() {
    let fx = Fixture::new();

    let as_root = fx.mount_with(MountConfig {
        owner_is_root: true,
        ..test_mount_config()
    });
    let attr = as_root.node().attr().unwrap();
    assert_eq!((attr.uid, attr.gid), (0, 0));

    let as_user = fx.mount();
    let attr = as_user.node().resolve("snapshots/2024-01-01/big.bin").unwrap().attr().unwrap();
    assert_eq!(attr.uid, nix::unistd::getuid().as_raw());
    assert_eq!(attr.gid, nix::unistd::getgid().as_raw());
}

#[test]
fn inodes_are_stable_across_listings_and_mounts() {
    let fx = Fixture::new();
    let first = fx.mount().node().resolve("snapshots/2024-01-02/docs").unwrap();
    let again = fx.mount().node().resolve("snapshots/2024-01-02/docs").unwrap();
    assert_eq!(first.inode(), again.inode());

    let root = fx.root_node();
    let a = root.lookup("tags").unwrap().read_dir_all().unwrap();
    let b = root.lookup("tags").unwrap().read_dir_all().unwrap();
    assert_eq!(a, b);
}

#[test]
fn listing_and_lookup_agree() {
    let fx = Fixture::new();
    let root = fx.root_node();
    for dir in ["snapshots", "tags", "hosts", "ids", "snapshots/2024-01-01", "tags/daily"] {
        let node = root.resolve(dir).unwrap();
        for entry in node.read_dir_all().unwrap().into_iter().skip(2) {
            let child = node.lookup(&entry.name).unwrap();
            assert_eq!(child.inode(), entry.inode, "{dir}/{}", entry.name);
            assert_eq!(child.kind(), entry.kind);
        }
    }
}

#[test]
fn dot_dot_points_at_parent() {
    let fx = Fixture::new();
    let root = fx.root_node();
    let snapshots = root.lookup("snapshots").unwrap();
    let snap = snapshots.lookup("2024-01-01").unwrap();
    let docs = snap.lookup("docs").unwrap();

    let parent_of = |n: &Node| n.read_dir_all().unwrap()[1].inode;
    assert_eq!(parent_of(&snapshots), ROOT_INODE);
    assert_eq!(parent_of(&snap), snapshots.inode());
    assert_eq!(parent_of(&docs), snap.inode());
}

#[test]
fn tags_and_hosts_group_snapshots() {
    let fx = Fixture::new();
    let root = fx.root_node();

    assert_eq!(names(&root.lookup("tags").unwrap()), vec![".", "..", "daily", "weekly"]);
    assert_eq!(
        names(&root.resolve("tags/daily").unwrap()),
        vec![".", "..", "2024-01-01", "2024-01-02", "latest"]
    );
    assert_eq!(
        names(&root.resolve("tags/weekly").unwrap()),
        vec![".", "..", "2024-01-02", "latest"]
    );

    assert_eq!(names(&root.lookup("hosts").unwrap()), vec![".", "..", "alpha", "beta"]);
    assert_eq!(
        names(&root.resolve("hosts/alpha").unwrap()),
        vec![".", "..", "2024-01-01", "latest"]
    );
    assert_eq!(
        root.resolve("hosts/beta/latest").unwrap().readlink().unwrap(),
        "2024-01-02"
    );
}

#[test]
fn ids_lists_short_ids() {
    let fx = Fixture::new();
    let ids = fx.root_node().lookup("ids").unwrap();
    assert_eq!(names(&ids), vec![".", "..", "11111111", "22222222"]);
    let snap = ids.lookup("22222222").unwrap();
    assert_eq!(names(&snap), vec![".", "..", "big.bin", "docs", "link"]);
}

#[test]
fn duplicate_snapshot_names_get_suffixes() {
    let fx = Fixture::new();
    fx.repo
        .add_snapshot(snapshot(0x33, at(2024, 1, 2, 18), "alpha", &[], fx.root_tree));
    fx.repo
        .add_snapshot(snapshot(0x44, at(2024, 1, 2, 20), "alpha", &[], fx.root_tree));

    let snapshots = fx.root_node().lookup("snapshots").unwrap();
    assert_eq!(
        names(&snapshots),
        vec![".", "..", "2024-01-01", "2024-01-02", "2024-01-02-1", "2024-01-02-2", "latest"]
    );
    assert_eq!(snapshots.lookup("latest").unwrap().readlink().unwrap(), "2024-01-02-2");
}

#[test]
fn config_filter_hides_snapshots() {
    let fx = Fixture::new();
    let root = fx.mount_with(MountConfig {
        hosts: vec!["alpha".into()],
        ..test_mount_config()
    });
    let node = root.node();
    assert_eq!(
        names(&node.lookup("snapshots").unwrap()),
        vec![".", "..", "2024-01-01", "latest"]
    );
    assert_eq!(names(&node.lookup("hosts").unwrap()), vec![".", "..", "alpha"]);
    assert_eq!(names(&node.lookup("tags").unwrap()), vec![".", "..", "daily"]);
}

#[test]
fn empty_repository_has_empty_listings() {
    let fx = Fixture::new();
    fx.repo.remove_snapshot(&crate::testutil::snapshot_id(0x11));
    fx.repo.remove_snapshot(&crate::testutil::snapshot_id(0x22));
    let root = fx.root_node();
    for dir in ["snapshots", "tags", "hosts", "ids"] {
        assert_eq!(names(&root.lookup(dir).unwrap()), vec![".", ".."], "{dir}");
    }
}

#[test]
fn snapshot_list_is_cached_until_stale() {
    let fx = Fixture::new();
    let root = fx.root_node();
    let snapshots = root.lookup("snapshots").unwrap();

    snapshots.read_dir_all().unwrap();
    snapshots.read_dir_all().unwrap();
    root.lookup("tags").unwrap().read_dir_all().unwrap();
    root.resolve("ids/11111111").unwrap();
    assert_eq!(fx.repo.snapshot_list_count(), 1);

    // A snapshot added later stays invisible until the interval passes.
    fx.repo
        .add_snapshot(snapshot(0x55, at(2024, 2, 1, 0), "gamma", &[], fx.root_tree));
    assert!(snapshots.lookup("2024-02-01").is_err());
}

#[test]
fn stale_snapshot_list_is_refreshed() {
    let fx = Fixture::new();
    let root = fx.mount_with(MountConfig {
        refresh_interval: "20ms".into(),
        ..test_mount_config()
    });
    let snapshots = root.node().lookup("snapshots").unwrap();
    let before = snapshots.lookup("2024-01-01").unwrap();
    assert_eq!(fx.repo.snapshot_list_count(), 1);

    fx.repo
        .add_snapshot(snapshot(0x55, at(2024, 2, 1, 0), "gamma", &[], fx.root_tree));
    thread::sleep(Duration::from_millis(40));

    assert_eq!(
        names(&snapshots),
        vec![".", "..", "2024-01-01", "2024-01-02", "2024-02-01", "latest"]
    );
    assert_eq!(fx.repo.snapshot_list_count(), 2);

    // Unchanged entries keep their identity and loaded state.
    let after = snapshots.lookup("2024-01-01").unwrap();
    match (before, after) {
        (Node::SnapshotDir(a), Node::SnapshotDir(b)) => assert!(Arc::ptr_eq(&a, &b)),
        other => panic!("expected snapshot dirs, got {other:?}"),
    }
}

#[test]
fn file_size_is_sum_of_blob_sizes() {
    let fx = Fixture::new();
    let file = fx.root_node().resolve("snapshots/2024-01-01/big.bin").unwrap();
    let attr = file.attr().unwrap();
    assert_eq!(attr.kind, FileType::RegularFile);
    assert_eq!(attr.perm, FILE_PERM);
    assert_eq!(attr.size, 15);
    assert_eq!(attr.nlink, 1);
    // Sizes come from the index; no content was loaded.
    for h in &fx.big_blobs {
        assert_eq!(fx.repo.load_count(h), 0);
    }
}

#[test]
fn read_maps_windows_onto_blobs() {
    let fx = Fixture::new();
    let file = fx.root_node().resolve("snapshots/2024-01-01/big.bin").unwrap();

    assert_eq!(file.read(0, 100).unwrap(), b"abcdefghijklmno");
    assert_eq!(file.read(2, 5).unwrap(), b"cdefg");
    assert_eq!(file.read(4, 5).unwrap(), b"efghi");
    assert_eq!(file.read(8, 3).unwrap(), b"ijk");
    assert_eq!(file.read(14, 10).unwrap(), b"o");
    assert!(file.read(15, 10).unwrap().is_empty());
    assert!(file.read(1000, 10).unwrap().is_empty());
    assert!(file.read(3, 0).unwrap().is_empty());
}

#[test]
fn read_fetches_only_covered_blobs() {
    let fx = Fixture::new();
    let file = fx.root_node().resolve("snapshots/2024-01-01/big.bin").unwrap();

    file.read(5, 2).unwrap();
    assert_eq!(fx.repo.load_count(&fx.big_blobs[0]), 0);
    assert_eq!(fx.repo.load_count(&fx.big_blobs[1]), 1);
    assert_eq!(fx.repo.load_count(&fx.big_blobs[2]), 0);

    // Repeated reads hit the cache.
    file.read(0, 15).unwrap();
    file.read(0, 15).unwrap();
    for h in &fx.big_blobs {
        assert_eq!(fx.repo.load_count(h), 1);
    }
}

#[test]
fn nested_directories_and_symlinks() {
    let fx = Fixture::new();
    let root = fx.root_node();

    // Symlinks are not followed while resolving.
    assert!(root.resolve("snapshots/latest/docs").is_err());

    let docs = root.resolve("ids/11111111/docs").unwrap();
    assert_eq!(names(&docs), vec![".", "..", "readme.txt"]);
    let text = docs.lookup("readme.txt").unwrap();
    assert_eq!(text.read(0, 64).unwrap(), b"hello world");

    let link = root.resolve("ids/11111111/link").unwrap();
    assert_eq!(link.readlink().unwrap(), "docs/readme.txt");
}

#[test]
fn tree_blobs_are_loaded_once_per_directory() {
    let fx = Fixture::new();
    let root = fx.root_node();
    let snap = root.resolve("snapshots/2024-01-01").unwrap();

    snap.read_dir_all().unwrap();
    snap.read_dir_all().unwrap();
    snap.lookup("docs").unwrap();
    assert_eq!(fx.repo.load_count(&BlobHandle::tree(fx.root_tree)), 1);

    // Other snapshot directories share the same tree through the blob cache.
    root.resolve("snapshots/2024-01-02").unwrap().read_dir_all().unwrap();
    assert_eq!(fx.repo.load_count(&BlobHandle::tree(fx.root_tree)), 1);
}

#[test]
fn wrong_node_kinds_are_rejected() {
    let fx = Fixture::new();
    let root = fx.root_node();
    let file = root.resolve("snapshots/2024-01-01/big.bin").unwrap();

    let err = file.read_dir_all().unwrap_err();
    assert!(matches!(err, SnapfsError::NotADirectory(_)));
    assert_eq!(err.errno(), libc::ENOTDIR);

    let err = root.read(0, 10).unwrap_err();
    assert!(matches!(err, SnapfsError::NotAFile(_)));
    assert_eq!(err.errno(), libc::EISDIR);

    assert!(file.readlink().is_err());
}

#[test]
fn missing_tree_blob_surfaces_not_found() {
    let fx = Fixture::new();
    fx.repo.add_snapshot(snapshot(
        0x66,
        at(2024, 3, 1, 0),
        "alpha",
        &[],
        BlobId::hash(b"no such tree"),
    ));
    let snap = fx.root_node().resolve("snapshots/2024-03-01").unwrap();
    let err = snap.read_dir_all().unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn invalid_mount_config_is_rejected() {
    let fx = Fixture::new();
    let err = Root::new(
        fx.repo.clone(),
        MountConfig {
            snapshot_template: "%Y/%m".into(),
            ..test_mount_config()
        },
    )
    .err()
    .unwrap();
    assert!(matches!(err, SnapfsError::Config(_)));
}
