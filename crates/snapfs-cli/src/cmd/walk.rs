use std::sync::{Arc, Mutex};

use snapfs_core::config::parse_human_duration;
use snapfs_core::progress::Progress;
use snapfs_core::walk::{walk, WalkOptions};

use crate::dispatch::{App, CmdResult};
use crate::progress::WalkProgressRenderer;
use crate::signal::{take_info_request, InfoRelay, InfoSignals};

pub(crate) fn run_walk(
    app: &App,
    path: &str,
    read: bool,
    list: bool,
    interval: Option<&str>,
) -> CmdResult {
    let interval = match interval {
        Some(raw) => parse_human_duration(raw)?,
        None => app.config.progress.interval()?,
    };

    let root = app.mount()?.node();
    let start = root.resolve(path)?;

    let renderer = Arc::new(Mutex::new(WalkProgressRenderer::new()));
    let on_update = renderer.clone();
    let on_done = renderer;
    let progress = Progress::new(interval)
        .on_update(move |stat, elapsed, _| {
            let requested = take_info_request();
            if let Ok(mut r) = on_update.lock() {
                r.update(stat, elapsed, requested);
            }
        })
        .on_done(move |stat, elapsed, _| {
            if let Ok(mut r) = on_done.lock() {
                r.finish(stat, elapsed);
            }
        });

    InfoSignals::platform_default().install();
    let relay = InfoRelay::spawn(progress.trigger())?;

    let options = WalkOptions { read_content: read };
    progress.start()?;
    let result = walk(&start, &options, &progress, |rel, _| {
        if list {
            println!("{}", join_path(path, rel));
        }
    });
    progress.done()?;
    drop(relay);

    let stat = result?;
    if stat.errors > 0 {
        return Err(format!("{} entries could not be read", stat.errors).into());
    }
    Ok(())
}

fn join_path(base: &str, rel: &str) -> String {
    let base = base.trim_end_matches('/');
    match (base.is_empty(), rel.is_empty()) {
        (_, true) if base.is_empty() => "/".to_string(),
        (_, true) => base.to_string(),
        (true, false) => rel.to_string(),
        (false, false) => format!("{base}/{rel}"),
    }
}
