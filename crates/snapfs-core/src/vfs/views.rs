//! Directories derived from the snapshot list.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::debug;

use super::root::{to_system_time, MountContext};
use super::tree::{LazyTree, SymlinkNode};
use super::{dynamic_inode, insert_unique, Children, Directory, Node, ROOT_INODE};
use crate::snapshot::Snapshot;
use snapfs_types::Result;

/// Name of the symlink pointing at the newest snapshot of a listing.
pub const LATEST: &str = "latest";

/// Children built from one snapshot list. Rebuilt only when the mount
/// context hands out a different list.
#[derive(Default)]
struct Memo {
    slot: Mutex<Option<(Arc<Vec<Snapshot>>, Arc<Children>)>>,
}

impl Memo {
    fn get(
        &self,
        source: Arc<Vec<Snapshot>>,
        build: impl FnOnce(&[Snapshot], Option<&Children>) -> Children,
    ) -> Arc<Children> {
        let mut slot = self.slot.lock().unwrap();
        let previous = match slot.as_ref() {
            Some((seen, children)) if Arc::ptr_eq(seen, &source) => {
                return Arc::clone(children);
            }
            Some((_, children)) => Some(Arc::clone(children)),
            None => None,
        };
        let children = Arc::new(build(&source, previous.as_deref()));
        *slot = Some((source, Arc::clone(&children)));
        children
    }
}

/// Keep the existing node for a name if it still shows the same snapshot,
/// so its loaded tree survives a refresh.
fn reuse_snapshot_dir(previous: Option<&Children>, name: &str, snapshot: &Snapshot) -> Option<Node> {
    match previous?.get(name)? {
        Node::SnapshotDir(dir) if dir.snapshot.id == snapshot.id => {
            Some(Node::SnapshotDir(Arc::clone(dir)))
        }
        _ => None,
    }
}

fn valid_entry_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

/// Which snapshots a [`SnapshotsDir`] lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Tag(String),
    Host(String),
}

impl Selection {
    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        match self {
            Selection::All => true,
            Selection::Tag(tag) => snapshot.has_tag(tag),
            Selection::Host(host) => snapshot.hostname == *host,
        }
    }
}

/// A listing of snapshot directories named by the snapshot template, plus a
/// `latest` symlink. Backs `snapshots/`, `tags/<tag>/` and `hosts/<host>/`.
pub struct SnapshotsDir {
    ctx: Arc<MountContext>,
    inode: u64,
    parent_inode: u64,
    selection: Selection,
    memo: Memo,
}

impl SnapshotsDir {
    pub(super) fn new(
        ctx: Arc<MountContext>,
        inode: u64,
        parent_inode: u64,
        selection: Selection,
    ) -> Self {
        Self {
            ctx,
            inode,
            parent_inode,
            selection,
            memo: Memo::default(),
        }
    }

    fn build(&self, snapshots: &[Snapshot], previous: Option<&Children>) -> Children {
        let mut children = BTreeMap::new();
        let mut newest: Option<(String, &Snapshot)> = None;
        for snapshot in snapshots.iter().filter(|s| self.selection.matches(s)) {
            let name = insert_unique(&mut children, self.ctx.snapshot_name(snapshot), |name| {
                reuse_snapshot_dir(previous, name, snapshot).unwrap_or_else(|| {
                    Node::SnapshotDir(Arc::new(SnapshotDir::new(
                        Arc::clone(&self.ctx),
                        dynamic_inode(self.inode, name),
                        self.inode,
                        snapshot.clone(),
                    )))
                })
            });
            newest = Some((name, snapshot));
        }

        if let Some((target, snapshot)) = newest {
            if !children.contains_key(LATEST) {
                children.insert(
                    LATEST.to_string(),
                    Node::Symlink(Arc::new(SymlinkNode::new(
                        Arc::clone(&self.ctx),
                        dynamic_inode(self.inode, LATEST),
                        target,
                        to_system_time(&snapshot.time),
                    ))),
                );
            }
        }
        debug!(
            inode = self.inode,
            selection = ?self.selection,
            entries = children.len(),
            "built snapshot listing"
        );
        children
    }
}

impl Directory for SnapshotsDir {
    fn inode(&self) -> u64 {
        self.inode
    }

    fn parent_inode(&self) -> u64 {
        self.parent_inode
    }

    fn context(&self) -> &Arc<MountContext> {
        &self.ctx
    }

    fn mtime(&self) -> SystemTime {
        self.ctx.mounted_at()
    }

    fn children(&self) -> Result<Arc<Children>> {
        let snapshots = self.ctx.snapshots()?;
        Ok(self.memo.get(snapshots, |list, previous| self.build(list, previous)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum GroupKind {
    Tags,
    Hosts,
}

/// `tags/` or `hosts/`: one [`SnapshotsDir`] per distinct tag or hostname.
pub struct GroupDir {
    ctx: Arc<MountContext>,
    inode: u64,
    kind: GroupKind,
    memo: Memo,
}

impl GroupDir {
    pub(super) fn new(ctx: Arc<MountContext>, inode: u64, kind: GroupKind) -> Self {
        Self {
            ctx,
            inode,
            kind,
            memo: Memo::default(),
        }
    }

    fn build(&self, snapshots: &[Snapshot], previous: Option<&Children>) -> Children {
        let keys: BTreeSet<&str> = match self.kind {
            GroupKind::Tags => snapshots
                .iter()
                .flat_map(|s| s.tags.iter().map(String::as_str))
                .collect(),
            GroupKind::Hosts => snapshots.iter().map(|s| s.hostname.as_str()).collect(),
        };

        let mut children = BTreeMap::new();
        for key in keys {
            if !valid_entry_name(key) {
                debug!(name = key, kind = ?self.kind, "skipping unrepresentable group name");
                continue;
            }
            let node = previous
                .and_then(|p| p.get(key))
                .cloned()
                .unwrap_or_else(|| {
                    let selection = match self.kind {
                        GroupKind::Tags => Selection::Tag(key.to_string()),
                        GroupKind::Hosts => Selection::Host(key.to_string()),
                    };
                    Node::SnapshotsDir(Arc::new(SnapshotsDir::new(
                        Arc::clone(&self.ctx),
                        dynamic_inode(self.inode, key),
                        self.inode,
                        selection,
                    )))
                });
            children.insert(key.to_string(), node);
        }
        children
    }
}

impl Directory for GroupDir {
    fn inode(&self) -> u64 {
        self.inode
    }

    fn parent_inode(&self) -> u64 {
        ROOT_INODE
    }

    fn context(&self) -> &Arc<MountContext> {
        &self.ctx
    }

    fn mtime(&self) -> SystemTime {
        self.ctx.mounted_at()
    }

    fn children(&self) -> Result<Arc<Children>> {
        let snapshots = self.ctx.snapshots()?;
        Ok(self.memo.get(snapshots, |list, previous| self.build(list, previous)))
    }
}

/// `ids/`: snapshot directories keyed by short id.
pub struct IdsDir {
    ctx: Arc<MountContext>,
    inode: u64,
    memo: Memo,
}

impl IdsDir {
    pub(super) fn new(ctx: Arc<MountContext>, inode: u64) -> Self {
        Self {
            ctx,
            inode,
            memo: Memo::default(),
        }
    }

    fn build(&self, snapshots: &[Snapshot], previous: Option<&Children>) -> Children {
        let mut children = BTreeMap::new();
        for snapshot in snapshots {
            insert_unique(&mut children, snapshot.short_id(), |name| {
                reuse_snapshot_dir(previous, name, snapshot).unwrap_or_else(|| {
                    Node::SnapshotDir(Arc::new(SnapshotDir::new(
                        Arc::clone(&self.ctx),
                        dynamic_inode(self.inode, name),
                        self.inode,
                        snapshot.clone(),
                    )))
                })
            });
        }
        children
    }
}

impl Directory for IdsDir {
    fn inode(&self) -> u64 {
        self.inode
    }

    fn parent_inode(&self) -> u64 {
        ROOT_INODE
    }

    fn context(&self) -> &Arc<MountContext> {
        &self.ctx
    }

    fn mtime(&self) -> SystemTime {
        self.ctx.mounted_at()
    }

    fn children(&self) -> Result<Arc<Children>> {
        let snapshots = self.ctx.snapshots()?;
        Ok(self.memo.get(snapshots, |list, previous| self.build(list, previous)))
    }
}

/// The root of one snapshot's file hierarchy.
pub struct SnapshotDir {
    ctx: Arc<MountContext>,
    inode: u64,
    parent_inode: u64,
    snapshot: Snapshot,
    tree: LazyTree,
}

impl SnapshotDir {
    pub(super) fn new(
        ctx: Arc<MountContext>,
        inode: u64,
        parent_inode: u64,
        snapshot: Snapshot,
    ) -> Self {
        let tree = LazyTree::new(Some(snapshot.tree));
        Self {
            ctx,
            inode,
            parent_inode,
            snapshot,
            tree,
        }
    }
}

impl Directory for SnapshotDir {
    fn inode(&self) -> u64 {
        self.inode
    }

    fn parent_inode(&self) -> u64 {
        self.parent_inode
    }

    fn context(&self) -> &Arc<MountContext> {
        &self.ctx
    }

    fn mtime(&self) -> SystemTime {
        to_system_time(&self.snapshot.time)
    }

    fn children(&self) -> Result<Arc<Children>> {
        self.tree.children(&self.ctx, self.inode)
    }
}
