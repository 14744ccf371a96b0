//! Read-only virtual filesystem over the snapshots of a repository.
//!
//! The hierarchy is computed lazily from the repository:
//!
//! ```text
//! /
//! ├── snapshots/<name>          every visible snapshot, plus `latest`
//! ├── tags/<tag>/<name>         snapshots carrying <tag>, plus `latest`
//! ├── hosts/<host>/<name>       snapshots taken on <host>, plus `latest`
//! └── ids/<short id>            snapshots by short id
//! ```
//!
//! Each snapshot directory exposes the snapshot's root tree. Every directory
//! owns a name to child mapping that backs both listing and lookup, so the
//! two can never disagree. Inodes are derived from the parent inode and the
//! entry name and stay stable for the lifetime of the mount.

pub mod inode;
mod root;
mod tree;
mod views;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use snapfs_types::{Result, SnapfsError};

pub use self::inode::{dynamic_inode, ROOT_INODE};
pub use self::root::{MountContext, Root};
pub use self::tree::{FileNode, SymlinkNode, TreeDir};
pub use self::views::{GroupDir, IdsDir, Selection, SnapshotDir, SnapshotsDir, LATEST};

/// Children of a directory, ordered by name.
pub type Children = BTreeMap<String, Node>;

pub const DIR_PERM: u16 = 0o555;
pub const FILE_PERM: u16 = 0o444;
pub const SYMLINK_PERM: u16 = 0o777;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Directory,
    RegularFile,
    Symlink,
}

/// Attributes of a node, in the shape a filesystem protocol expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub inode: u64,
    pub kind: FileType,
    pub perm: u16,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub mtime: SystemTime,
    pub nlink: u32,
}

impl Attr {
    /// Full `st_mode` value including the file type bits.
    pub fn mode(&self) -> u32 {
        let type_bits = match self.kind {
            FileType::Directory => libc::S_IFDIR,
            FileType::RegularFile => libc::S_IFREG,
            FileType::Symlink => libc::S_IFLNK,
        };
        type_bits as u32 | u32::from(self.perm)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u64,
    pub name: String,
    pub kind: FileType,
}

/// A node of the virtual tree.
///
/// Cloning is cheap: every variant is a handle to shared state, and memoized
/// children are shared between clones.
#[derive(Clone)]
pub enum Node {
    Root(Arc<Root>),
    SnapshotsDir(Arc<SnapshotsDir>),
    TagsDir(Arc<GroupDir>),
    HostsDir(Arc<GroupDir>),
    IdsDir(Arc<IdsDir>),
    SnapshotDir(Arc<SnapshotDir>),
    Dir(Arc<TreeDir>),
    File(Arc<FileNode>),
    Symlink(Arc<SymlinkNode>),
}

/// Behaviour shared by every directory variant.
trait Directory {
    fn inode(&self) -> u64;
    fn parent_inode(&self) -> u64;
    fn context(&self) -> &Arc<MountContext>;
    fn mtime(&self) -> SystemTime;
    fn children(&self) -> Result<Arc<Children>>;
}

impl Node {
    fn as_dir(&self) -> Option<&dyn Directory> {
        match self {
            Node::Root(d) => Some(d.as_ref()),
            Node::SnapshotsDir(d) => Some(d.as_ref()),
            Node::TagsDir(d) | Node::HostsDir(d) => Some(d.as_ref()),
            Node::IdsDir(d) => Some(d.as_ref()),
            Node::SnapshotDir(d) => Some(d.as_ref()),
            Node::Dir(d) => Some(d.as_ref()),
            Node::File(_) | Node::Symlink(_) => None,
        }
    }

    fn not_a_directory(&self) -> SnapfsError {
        SnapfsError::NotADirectory(format!("inode {}", self.inode()))
    }

    pub fn inode(&self) -> u64 {
        match self {
            Node::File(f) => f.inode(),
            Node::Symlink(s) => s.inode(),
            _ => self.as_dir().map(|d| d.inode()).unwrap_or_default(),
        }
    }

    pub fn kind(&self) -> FileType {
        match self {
            Node::File(_) => FileType::RegularFile,
            Node::Symlink(_) => FileType::Symlink,
            _ => FileType::Directory,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == FileType::Directory
    }

    pub fn attr(&self) -> Result<Attr> {
        match self {
            Node::File(f) => f.attr(),
            Node::Symlink(s) => Ok(s.attr()),
            _ => {
                let dir = self.as_dir().ok_or_else(|| self.not_a_directory())?;
                let ctx = dir.context();
                Ok(Attr {
                    inode: dir.inode(),
                    kind: FileType::Directory,
                    perm: DIR_PERM,
                    uid: ctx.uid(),
                    gid: ctx.gid(),
                    size: 0,
                    mtime: dir.mtime(),
                    nlink: 2,
                })
            }
        }
    }

    /// List a directory: `.` and `..` first, then every child by name.
    pub fn read_dir_all(&self) -> Result<Vec<DirEntry>> {
        let dir = self.as_dir().ok_or_else(|| self.not_a_directory())?;
        let children = dir.children()?;
        let mut entries = Vec::with_capacity(children.len() + 2);
        entries.push(DirEntry {
            inode: dir.inode(),
            name: ".".into(),
            kind: FileType::Directory,
        });
        entries.push(DirEntry {
            inode: dir.parent_inode(),
            name: "..".into(),
            kind: FileType::Directory,
        });
        entries.extend(children.iter().map(|(name, child)| DirEntry {
            inode: child.inode(),
            name: name.clone(),
            kind: child.kind(),
        }));
        Ok(entries)
    }

    /// Find the child called `name`.
    pub fn lookup(&self, name: &str) -> Result<Node> {
        let dir = self.as_dir().ok_or_else(|| self.not_a_directory())?;
        dir.children()?
            .get(name)
            .cloned()
            .ok_or_else(|| SnapfsError::EntryNotFound(name.to_string()))
    }

    /// Read up to `size` bytes of a file starting at `offset`.
    pub fn read(&self, offset: u64, size: usize) -> Result<Vec<u8>> {
        match self {
            Node::File(f) => f.read(offset, size),
            _ => Err(SnapfsError::NotAFile(format!("inode {}", self.inode()))),
        }
    }

    pub fn readlink(&self) -> Result<String> {
        match self {
            Node::Symlink(s) => Ok(s.target().to_string()),
            _ => Err(SnapfsError::InvalidState(format!(
                "inode {} is not a symlink",
                self.inode()
            ))),
        }
    }

    /// Walk a `/`-separated path downwards from this node. Empty and `.`
    /// components are skipped; symlinks are not followed.
    pub fn resolve(&self, path: &str) -> Result<Node> {
        let mut node = self.clone();
        for component in path.split('/') {
            if component.is_empty() || component == "." {
                continue;
            }
            node = node.lookup(component)?;
        }
        Ok(node)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Node::Root(_) => "Root",
            Node::SnapshotsDir(_) => "SnapshotsDir",
            Node::TagsDir(_) => "TagsDir",
            Node::HostsDir(_) => "HostsDir",
            Node::IdsDir(_) => "IdsDir",
            Node::SnapshotDir(_) => "SnapshotDir",
            Node::Dir(_) => "Dir",
            Node::File(_) => "File",
            Node::Symlink(_) => "Symlink",
        };
        f.debug_struct(variant).field("inode", &self.inode()).finish()
    }
}

/// Insert `node` under `name`, appending `-1`, `-2`, ... if the name is taken.
/// Returns the name actually used.
fn insert_unique(children: &mut Children, name: String, make: impl FnOnce(&str) -> Node) -> String {
    let mut unique = name.clone();
    let mut n = 1;
    while children.contains_key(&unique) {
        unique = format!("{name}-{n}");
        n += 1;
    }
    let name = unique;
    let node = make(&name);
    children.insert(name.clone(), node);
    name
}
