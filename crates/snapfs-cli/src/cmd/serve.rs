use snapfs_core::dav;

use crate::dispatch::{App, CmdResult};

pub(crate) fn run_serve(app: &App, address: &str) -> CmdResult {
    let root = app.mount()?;
    eprintln!("Serving snapshots read-only at http://{address}/ (Ctrl+C to stop)");
    dav::serve(root, address)?;
    Ok(())
}
