//! Depth-first traversal of the virtual tree with progress reporting.

use tracing::warn;

use crate::progress::{Progress, Stat};
use crate::vfs::Node;
use snapfs_types::Result;

/// Chunk size used when reading file contents during a walk.
const READ_CHUNK: usize = 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Read every file through the blob cache instead of only resolving
    /// sizes.
    pub read_content: bool,
}

/// Visit `start` and everything below it, depth first in name order.
///
/// `visit` receives each node with its path relative to `start`. Symlinks
/// are reported but not followed. Errors on individual entries are logged,
/// counted in [`Stat::errors`] and skipped. `progress` must already be
/// started; every visited entry is reported to it.
pub fn walk(
    start: &Node,
    options: &WalkOptions,
    progress: &Progress,
    mut visit: impl FnMut(&str, &Node),
) -> Result<Stat> {
    let mut total = Stat::default();
    let mut stack = vec![(String::new(), start.clone())];

    while let Some((path, node)) = stack.pop() {
        visit(&path, &node);
        let stat = match visit_one(&path, &node, options, &mut stack) {
            Ok(stat) => stat,
            Err(e) => {
                warn!(path = %path, error = %e, "skipping unreadable entry");
                Stat {
                    errors: 1,
                    ..Stat::default()
                }
            }
        };
        total += stat;
        progress.report(stat)?;
    }
    Ok(total)
}

fn visit_one(
    path: &str,
    node: &Node,
    options: &WalkOptions,
    stack: &mut Vec<(String, Node)>,
) -> Result<Stat> {
    let mut stat = Stat::default();
    match node {
        Node::File(file) => {
            let size = file.size()?;
            stat.files = 1;
            stat.bytes = size;
            stat.blobs = file.content().len() as u64;
            if options.read_content {
                let mut offset = 0;
                while offset < size {
                    let chunk = node.read(offset, READ_CHUNK)?;
                    if chunk.is_empty() {
                        break;
                    }
                    offset += chunk.len() as u64;
                }
            }
        }
        Node::Symlink(_) => {}
        _ => {
            stat.dirs = 1;
            if matches!(node, Node::Dir(_) | Node::SnapshotDir(_)) {
                stat.trees = 1;
            }
            let entries = node.read_dir_all()?;
            // Pushed in reverse so names pop in ascending order.
            for entry in entries.iter().rev() {
                if entry.name == "." || entry.name == ".." {
                    continue;
                }
                let child = node.lookup(&entry.name)?;
                let child_path = if path.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{path}/{}", entry.name)
                };
                stack.push((child_path, child));
            }
        }
    }
    Ok(stat)
}
