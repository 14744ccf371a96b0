use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::views::{GroupDir, GroupKind, IdsDir, Selection, SnapshotsDir};
use super::{dynamic_inode, Children, Directory, Node, ROOT_INODE};
use crate::cache::BlobCache;
use crate::config::MountConfig;
use crate::repo::Repository;
use crate::snapshot::{Snapshot, SnapshotFilter};
use snapfs_types::Result;

/// State shared by every node of one mount.
pub struct MountContext {
    repo: Arc<dyn Repository>,
    cache: BlobCache,
    config: MountConfig,
    filter: SnapshotFilter,
    refresh_interval: Duration,
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
    snapshots: Mutex<SnapshotCache>,
}

struct SnapshotCache {
    list: Arc<Vec<Snapshot>>,
    last_check: Option<Instant>,
}

impl MountContext {
    fn new(repo: Arc<dyn Repository>, config: MountConfig) -> Result<Self> {
        config.validate()?;
        let refresh_interval = config.refresh_interval()?;
        let (uid, gid) = if config.owner_is_root {
            (0, 0)
        } else {
            (
                nix::unistd::getuid().as_raw(),
                nix::unistd::getgid().as_raw(),
            )
        };
        Ok(Self {
            cache: BlobCache::new(Arc::clone(&repo), config.cache_size),
            filter: config.filter(),
            repo,
            config,
            refresh_interval,
            uid,
            gid,
            mounted_at: SystemTime::now(),
            snapshots: Mutex::new(SnapshotCache {
                list: Arc::new(Vec::new()),
                last_check: None,
            }),
        })
    }

    pub fn repo(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    pub fn cache(&self) -> &BlobCache {
        &self.cache
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn mounted_at(&self) -> SystemTime {
        self.mounted_at
    }

    /// Visible snapshots, oldest first.
    ///
    /// The list is fetched from the repository on first use and again only
    /// once it is older than the refresh interval. An unchanged listing keeps
    /// the previous `Arc`, so directories memoized on it stay valid.
    pub fn snapshots(&self) -> Result<Arc<Vec<Snapshot>>> {
        let mut cache = self.snapshots.lock().unwrap();
        let stale = cache
            .last_check
            .map_or(true, |at| at.elapsed() >= self.refresh_interval);
        if stale {
            let fresh = self.repo.list_snapshots_filtered(&self.filter)?;
            if fresh != *cache.list {
                info!(count = fresh.len(), "snapshot list changed");
                cache.list = Arc::new(fresh);
            }
            cache.last_check = Some(Instant::now());
        }
        Ok(Arc::clone(&cache.list))
    }

    /// Directory name of a snapshot, before de-duplication.
    pub fn snapshot_name(&self, snapshot: &Snapshot) -> String {
        snapshot
            .time
            .format(&self.config.snapshot_template)
            .to_string()
    }
}

/// Convert a snapshot or tree timestamp for attributes.
pub(super) fn to_system_time(time: &DateTime<Utc>) -> SystemTime {
    SystemTime::from(*time)
}

/// The root directory of a mount, with its four fixed children.
pub struct Root {
    ctx: Arc<MountContext>,
    children: Arc<Children>,
}

impl Root {
    pub const SNAPSHOTS: &'static str = "snapshots";
    pub const TAGS: &'static str = "tags";
    pub const HOSTS: &'static str = "hosts";
    pub const IDS: &'static str = "ids";

    /// Build the root of a mount. Nothing is read from the repository until
    /// the first directory below the root is listed.
    pub fn new(repo: Arc<dyn Repository>, config: MountConfig) -> Result<Arc<Self>> {
        let ctx = Arc::new(MountContext::new(repo, config)?);
        debug!(
            uid = ctx.uid,
            gid = ctx.gid,
            refresh_secs = ctx.refresh_interval.as_secs_f64(),
            "mount context ready"
        );

        let mut children = BTreeMap::new();
        children.insert(
            Self::SNAPSHOTS.to_string(),
            Node::SnapshotsDir(Arc::new(SnapshotsDir::new(
                Arc::clone(&ctx),
                dynamic_inode(ROOT_INODE, Self::SNAPSHOTS),
                ROOT_INODE,
                Selection::All,
            ))),
        );
        children.insert(
            Self::TAGS.to_string(),
            Node::TagsDir(Arc::new(GroupDir::new(
                Arc::clone(&ctx),
                dynamic_inode(ROOT_INODE, Self::TAGS),
                GroupKind::Tags,
            ))),
        );
        children.insert(
            Self::HOSTS.to_string(),
            Node::HostsDir(Arc::new(GroupDir::new(
                Arc::clone(&ctx),
                dynamic_inode(ROOT_INODE, Self::HOSTS),
                GroupKind::Hosts,
            ))),
        );
        children.insert(
            Self::IDS.to_string(),
            Node::IdsDir(Arc::new(IdsDir::new(
                Arc::clone(&ctx),
                dynamic_inode(ROOT_INODE, Self::IDS),
            ))),
        );

        Ok(Arc::new(Self {
            ctx,
            children: Arc::new(children),
        }))
    }

    pub fn context(&self) -> &Arc<MountContext> {
        &self.ctx
    }

    /// The root as a tree node.
    pub fn node(self: &Arc<Self>) -> Node {
        Node::Root(Arc::clone(self))
    }
}

impl Directory for Root {
    fn inode(&self) -> u64 {
        ROOT_INODE
    }

    fn parent_inode(&self) -> u64 {
        ROOT_INODE
    }

    fn context(&self) -> &Arc<MountContext> {
        &self.ctx
    }

    fn mtime(&self) -> SystemTime {
        self.ctx.mounted_at
    }

    fn children(&self) -> Result<Arc<Children>> {
        Ok(Arc::clone(&self.children))
    }
}
