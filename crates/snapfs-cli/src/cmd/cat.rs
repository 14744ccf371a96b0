use std::io::{self, Write};

use snapfs_core::vfs::Node;

use crate::dispatch::{App, CmdResult};

const CHUNK: usize = 1024 * 1024;

pub(crate) fn run_cat(app: &App, path: &str) -> CmdResult {
    let root = app.mount()?.node();
    let node = root.resolve(path)?;
    let Node::File(file) = &node else {
        return Err(format!("'{path}' is not a regular file").into());
    };
    let size = file.size()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut offset = 0u64;
    while offset < size {
        let chunk = node.read(offset, CHUNK)?;
        if chunk.is_empty() {
            break;
        }
        offset += chunk.len() as u64;
        match out.write_all(&chunk) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
    match out.flush() {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e.into()),
        _ => Ok(()),
    }
}
