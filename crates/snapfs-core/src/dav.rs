//! Read-only WebDAV export of the virtual tree.
//!
//! Any WebDAV client (macOS Finder, `davfs2`, Windows Explorer) can browse
//! the same hierarchy a FUSE mount would show. Lookups and reads may block
//! on the repository, so they run on tokio's blocking pool.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::io::SeekFrom;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use dav_server::davpath::DavPath;
use dav_server::fs::*;
use dav_server::DavHandler;
use futures_util::stream;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::vfs::{Attr, FileType, Node, Root};
use snapfs_types::{Result, SnapfsError};

/// Symlink hops allowed while resolving one path.
const MAX_SYMLINK_HOPS: usize = 40;

fn to_fs_error(e: SnapfsError) -> FsError {
    match e {
        e if e.is_not_found() => FsError::NotFound,
        SnapfsError::NotADirectory(_) | SnapfsError::NotAFile(_) => FsError::Forbidden,
        e => {
            warn!(error = %e, "webdav request failed");
            FsError::GeneralFailure
        }
    }
}

/// Run a blocking tree operation off the async executor.
async fn blocking<T, F>(f: F) -> FsResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|_| FsError::GeneralFailure)?
        .map_err(to_fs_error)
}

/// Resolve `path` below `root`, following symlinks.
///
/// Link targets are taken relative to the directory holding the link, the
/// way `latest` names a sibling snapshot. `..` stops at `root`. Absolute
/// targets point outside the export and are reported as missing.
fn resolve_following(root: &Node, path: &str) -> Result<Node> {
    let mut pending: VecDeque<String> = path.split('/').map(str::to_string).collect();
    let mut current = root.clone();
    let mut ancestors: Vec<Node> = Vec::new();
    let mut hops = 0;

    while let Some(name) = pending.pop_front() {
        match name.as_str() {
            "" | "." => continue,
            ".." => {
                if let Some(parent) = ancestors.pop() {
                    current = parent;
                }
                continue;
            }
            _ => {}
        }

        let child = current.lookup(&name)?;
        if !matches!(child, Node::Symlink(_)) {
            ancestors.push(std::mem::replace(&mut current, child));
            continue;
        }

        hops += 1;
        if hops > MAX_SYMLINK_HOPS {
            return Err(SnapfsError::InvalidState(format!(
                "too many levels of symbolic links in '{path}'"
            )));
        }
        let target = child.readlink()?;
        if target.starts_with('/') {
            return Err(SnapfsError::EntryNotFound(target));
        }
        for part in target.split('/').rev() {
            pending.push_front(part.to_string());
        }
    }
    Ok(current)
}

// ─── DavMetaData ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct DavMeta {
    size: u64,
    mtime: SystemTime,
    kind: FileType,
}

impl From<Attr> for DavMeta {
    fn from(attr: Attr) -> Self {
        Self {
            size: attr.size,
            mtime: attr.mtime,
            kind: attr.kind,
        }
    }
}

impl DavMetaData for DavMeta {
    fn len(&self) -> u64 {
        self.size
    }

    fn modified(&self) -> FsResult<SystemTime> {
        Ok(self.mtime)
    }

    fn is_dir(&self) -> bool {
        self.kind == FileType::Directory
    }

    fn is_symlink(&self) -> bool {
        self.kind == FileType::Symlink
    }
}

// ─── DavDirEntry ───────────────────────────────────────────────────────────

struct SnapfsDirEntry {
    name: String,
    meta: DavMeta,
}

impl DavDirEntry for SnapfsDirEntry {
    fn name(&self) -> Vec<u8> {
        self.name.as_bytes().to_vec()
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let meta = self.meta.clone();
        Box::pin(async move { Ok(Box::new(meta) as Box<dyn DavMetaData>) })
    }
}

fn dav_path_string(path: &DavPath) -> String {
    String::from_utf8_lossy(path.as_bytes()).into_owned()
}

// ─── DavFileSystem ─────────────────────────────────────────────────────────

/// Read-only WebDAV filesystem over a mount root.
#[derive(Clone)]
pub struct SnapfsDavFs {
    root: Arc<Root>,
}

impl SnapfsDavFs {
    pub fn new(root: Arc<Root>) -> Self {
        Self { root }
    }

    /// Resolve a request path. Symlinks are followed, so `latest` behaves
    /// like the snapshot it names.
    async fn resolve(&self, path: &DavPath) -> FsResult<Node> {
        let root = self.root.node();
        let path = dav_path_string(path);
        blocking(move || resolve_following(&root, &path)).await
    }
}

impl DavFileSystem for SnapfsDavFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let node = self.resolve(path).await?;
            let attr = blocking(move || node.attr()).await?;
            Ok(Box::new(DavMeta::from(attr)) as Box<dyn DavMetaData>)
        })
    }

    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        _meta: ReadDirMeta,
    ) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        Box::pin(async move {
            let node = self.resolve(path).await?;
            if !node.is_dir() {
                return Err(FsError::Forbidden);
            }
            let root = self.root.node();
            let dir_path = dav_path_string(path);
            let listed = blocking(move || {
                let mut listed = Vec::new();
                for entry in node.read_dir_all()? {
                    if entry.name == "." || entry.name == ".." {
                        continue;
                    }
                    let child = node.lookup(&entry.name)?;
                    let attr = match &child {
                        Node::Symlink(_) => {
                            let full = format!("{}/{}", dir_path.trim_end_matches('/'), entry.name);
                            match resolve_following(&root, &full) {
                                Ok(target) => target.attr()?,
                                Err(e) => {
                                    debug!(path = %full, error = %e, "dangling symlink");
                                    child.attr()?
                                }
                            }
                        }
                        _ => child.attr()?,
                    };
                    listed.push((entry.name, DavMeta::from(attr)));
                }
                Ok(listed)
            })
            .await?;

            let entries: Vec<_> = listed
                .into_iter()
                .map(|(name, meta)| {
                    Ok(Box::new(SnapfsDirEntry { name, meta }) as Box<dyn DavDirEntry>)
                })
                .collect();
            Ok(Box::pin(stream::iter(entries)) as FsStream<Box<dyn DavDirEntry>>)
        })
    }

    fn open<'a>(
        &'a self,
        path: &'a DavPath,
        options: OpenOptions,
    ) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async move {
            if options.write || options.append || options.create || options.create_new {
                return Err(FsError::Forbidden);
            }

            let node = self.resolve(path).await?;
            if !matches!(node, Node::File(_)) {
                return Err(FsError::Forbidden);
            }
            let file_node = node.clone();
            let attr = blocking(move || file_node.attr()).await?;
            Ok(Box::new(SnapfsDavFile {
                node,
                meta: DavMeta::from(attr),
                pos: 0,
            }) as Box<dyn DavFile>)
        })
    }
}

// ─── DavFile ───────────────────────────────────────────────────────────────

struct SnapfsDavFile {
    node: Node,
    meta: DavMeta,
    pos: u64,
}

impl fmt::Debug for SnapfsDavFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapfsDavFile")
            .field("inode", &self.node.inode())
            .field("pos", &self.pos)
            .field("size", &self.meta.size)
            .finish()
    }
}

impl DavFile for SnapfsDavFile {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let meta = self.meta.clone();
        Box::pin(async move { Ok(Box::new(meta) as Box<dyn DavMetaData>) })
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        let node = self.node.clone();
        let start_pos = self.pos;

        Box::pin(async move {
            let data = blocking(move || node.read(start_pos, count)).await?;
            self.pos += data.len() as u64;
            Ok(Bytes::from(data))
        })
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64> {
        Box::pin(async move {
            let new_pos = match pos {
                SeekFrom::Start(p) => p,
                SeekFrom::Current(p) => offset_by(self.pos, p)?,
                SeekFrom::End(p) => offset_by(self.meta.size, p)?,
            };
            self.pos = new_pos;
            Ok(new_pos)
        })
    }

    fn write_buf(&mut self, _buf: Box<dyn bytes::Buf + Send>) -> FsFuture<'_, ()> {
        Box::pin(async { Err(FsError::Forbidden) })
    }

    fn write_bytes(&mut self, _buf: Bytes) -> FsFuture<'_, ()> {
        Box::pin(async { Err(FsError::Forbidden) })
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

fn offset_by(base: u64, delta: i64) -> FsResult<u64> {
    if delta >= 0 {
        Ok(base.saturating_add(delta as u64))
    } else {
        base.checked_sub(delta.unsigned_abs())
            .ok_or(FsError::GeneralFailure)
    }
}

// ─── Server ────────────────────────────────────────────────────────────────

/// Serve `root` over WebDAV on `address` until Ctrl+C.
pub fn serve(root: Arc<Root>, address: &str) -> Result<()> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|e| SnapfsError::Config(format!("invalid address '{address}': {e}")))?;

    let handler = DavHandler::builder()
        .filesystem(Box::new(SnapfsDavFs::new(root)))
        .build_handler();

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| SnapfsError::Other(format!("failed to create tokio runtime: {e}")))?;

    rt.block_on(run_server(handler, addr))
}

async fn run_server(handler: DavHandler, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| SnapfsError::Other(format!("failed to bind to {addr}: {e}")))?;

    info!(address = %addr, "WebDAV server listening");

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer) = result
                    .map_err(|e| SnapfsError::Other(format!("accept error: {e}")))?;
                debug!(peer = %peer, "accepted connection");
                let io = TokioIo::new(stream);
                let handler = handler.clone();

                tokio::spawn(async move {
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(
                            io,
                            service_fn(move |req| {
                                let handler = handler.clone();
                                async move {
                                    Ok::<_, Infallible>(handler.handle(req).await)
                                }
                            }),
                        )
                        .await
                    {
                        debug!("connection error: {e}");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down WebDAV server");
                break;
            }
        }
    }

    Ok(())
}
