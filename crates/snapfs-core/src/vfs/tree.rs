//! Directories, files and symlinks inside a snapshot.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::{debug, warn};

use super::root::{to_system_time, MountContext};
use super::{
    dynamic_inode, Attr, Children, Directory, FileType, Node, FILE_PERM, SYMLINK_PERM,
};
use crate::snapshot::tree::{NodeType, Tree, TreeNode};
use snapfs_types::{BlobHandle, BlobId, Result, SnapfsError};

/// Children of a tree blob, loaded on first access. A failed load is not
/// remembered, so the next access tries again.
pub(super) struct LazyTree {
    id: Option<BlobId>,
    loaded: Mutex<Option<Arc<Children>>>,
}

impl LazyTree {
    pub(super) fn new(id: Option<BlobId>) -> Self {
        Self {
            id,
            loaded: Mutex::new(None),
        }
    }

    pub(super) fn children(&self, ctx: &Arc<MountContext>, inode: u64) -> Result<Arc<Children>> {
        if let Some(children) = self.loaded.lock().unwrap().as_ref() {
            return Ok(Arc::clone(children));
        }
        let children = match &self.id {
            Some(id) => load_children(ctx, id, inode)?,
            None => BTreeMap::new(),
        };
        let mut loaded = self.loaded.lock().unwrap();
        // Another reader may have won the race; keep its nodes.
        Ok(Arc::clone(loaded.get_or_insert_with(|| Arc::new(children))))
    }
}

fn load_children(ctx: &Arc<MountContext>, id: &BlobId, inode: u64) -> Result<Children> {
    let data = ctx.cache().get(&BlobHandle::tree(*id))?;
    let tree = Tree::decode(&data)?;
    debug!(tree = %id, entries = tree.nodes.len(), "loaded tree");

    let mut children = BTreeMap::new();
    for node in tree.nodes {
        if children.contains_key(&node.name) {
            warn!(tree = %id, name = %node.name, "duplicate tree entry, keeping the first");
            continue;
        }
        let name = node.name.clone();
        let child_inode = dynamic_inode(inode, &name);
        let child = match node.node_type {
            NodeType::Dir => Node::Dir(Arc::new(TreeDir {
                ctx: Arc::clone(ctx),
                inode: child_inode,
                parent_inode: inode,
                tree: LazyTree::new(node.subtree),
                node,
            })),
            NodeType::File => Node::File(Arc::new(FileNode {
                ctx: Arc::clone(ctx),
                inode: child_inode,
                node,
                sizes: Mutex::new(None),
            })),
            NodeType::Symlink => Node::Symlink(Arc::new(SymlinkNode::new(
                Arc::clone(ctx),
                child_inode,
                node.link_target.clone().unwrap_or_default(),
                to_system_time(&node.mtime),
            ))),
        };
        children.insert(name, child);
    }
    Ok(children)
}

/// A directory inside a snapshot.
pub struct TreeDir {
    ctx: Arc<MountContext>,
    inode: u64,
    parent_inode: u64,
    node: TreeNode,
    tree: LazyTree,
}

impl Directory for TreeDir {
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
        to_system_time(&self.node.mtime)
    }

    fn children(&self) -> Result<Arc<Children>> {
        self.tree.children(&self.ctx, self.inode)
    }
}

/// A regular file inside a snapshot, backed by its content blobs.
pub struct FileNode {
    ctx: Arc<MountContext>,
    inode: u64,
    node: TreeNode,
    sizes: Mutex<Option<Arc<Vec<u64>>>>,
}

impl FileNode {
    pub fn inode(&self) -> u64 {
        self.inode
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn content(&self) -> &[BlobId] {
        &self.node.content
    }

    /// Plaintext size of each content blob, resolved once from the
    /// repository index.
    pub fn blob_sizes(&self) -> Result<Arc<Vec<u64>>> {
        if let Some(sizes) = self.sizes.lock().unwrap().as_ref() {
            return Ok(Arc::clone(sizes));
        }
        let sizes = self
            .node
            .content
            .iter()
            .map(|id| {
                self.ctx
                    .repo()
                    .blob_size(&BlobHandle::data(*id))
                    .map(u64::from)
            })
            .collect::<Result<Vec<u64>>>()?;
        let sizes = Arc::new(sizes);
        *self.sizes.lock().unwrap() = Some(Arc::clone(&sizes));
        Ok(sizes)
    }

    pub fn size(&self) -> Result<u64> {
        Ok(self.blob_sizes()?.iter().sum())
    }

    pub fn attr(&self) -> Result<Attr> {
        Ok(Attr {
            inode: self.inode,
            kind: FileType::RegularFile,
            perm: FILE_PERM,
            uid: self.ctx.uid(),
            gid: self.ctx.gid(),
            size: self.size()?,
            mtime: to_system_time(&self.node.mtime),
            nlink: 1,
        })
    }

    /// Read up to `count` bytes starting at `offset`. Only the blobs that
    /// overlap the window are fetched. Reads at or past the end return an
    /// empty buffer.
    pub fn read(&self, offset: u64, count: usize) -> Result<Vec<u8>> {
        let sizes = self.blob_sizes()?;
        let file_size: u64 = sizes.iter().sum();
        if count == 0 || offset >= file_size {
            return Ok(Vec::new());
        }
        let end = offset.saturating_add(count as u64).min(file_size);

        let mut buf = Vec::with_capacity((end - offset) as usize);
        let mut blob_start: u64 = 0;
        for (id, &blob_size) in self.node.content.iter().zip(sizes.iter()) {
            let blob_end = blob_start + blob_size;
            if blob_end <= offset {
                blob_start = blob_end;
                continue;
            }
            if blob_start >= end {
                break;
            }

            let data = self.ctx.cache().get(&BlobHandle::data(*id))?;
            if data.len() as u64 != blob_size {
                return Err(SnapfsError::InvalidFormat(format!(
                    "blob {id} is {} bytes, index says {blob_size}",
                    data.len()
                )));
            }

            let from = (offset.max(blob_start) - blob_start) as usize;
            let to = (end.min(blob_end) - blob_start) as usize;
            buf.extend_from_slice(&data[from..to]);
            blob_start = blob_end;
        }
        Ok(buf)
    }
}

/// A symbolic link: either a link stored in a snapshot or the `latest`
/// link of a snapshot listing.
pub struct SymlinkNode {
    ctx: Arc<MountContext>,
    inode: u64,
    target: String,
    mtime: SystemTime,
}

impl SymlinkNode {
    pub(super) fn new(ctx: Arc<MountContext>, inode: u64, target: String, mtime: SystemTime) -> Self {
        Self {
            ctx,
            inode,
            target,
            mtime,
        }
    }

    pub fn inode(&self) -> u64 {
        self.inode
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn attr(&self) -> Attr {
        Attr {
            inode: self.inode,
            kind: FileType::Symlink,
            perm: SYMLINK_PERM,
            uid: self.ctx.uid(),
            gid: self.ctx.gid(),
            size: self.target.len() as u64,
            mtime: self.mtime,
            nlink: 1,
        }
    }
}
