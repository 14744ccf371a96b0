use std::io::{self, IsTerminal, Stderr, Write};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use snapfs_core::progress::Stat;
use tracing_subscriber::fmt::MakeWriter;

use crate::format::{format_bytes, format_elapsed};

const PROGRESS_REDRAW_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Shared state between the progress renderer and the tracing writer
// ---------------------------------------------------------------------------

/// True while a progress line is being displayed on stderr.
static PROGRESS_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Serializes all stderr writes between the progress renderer and tracing.
static STDERR_LOCK: Mutex<()> = Mutex::new(());

fn acquire_stderr_lock() -> MutexGuard<'static, ()> {
    STDERR_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Progress-aware tracing writer
// ---------------------------------------------------------------------------

/// A [`MakeWriter`] that clears the progress line before each tracing event,
/// so log messages never land in the middle of the `\r`-based status line.
pub(crate) struct ProgressAwareStderr;

/// Holds the `STDERR_LOCK` guard for the whole of one tracing write.
pub(crate) struct ProgressWriter {
    _guard: MutexGuard<'static, ()>,
    inner: Stderr,
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for ProgressAwareStderr {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let guard = acquire_stderr_lock();
        let mut stderr = io::stderr();

        if PROGRESS_ACTIVE.load(Relaxed) && stderr.is_terminal() {
            let _ = stderr.write_all(b"\r\x1b[2K");
        }

        ProgressWriter {
            _guard: guard,
            inner: stderr,
        }
    }
}

// ---------------------------------------------------------------------------
// Walk progress renderer
// ---------------------------------------------------------------------------

/// Draws walk progress as a single self-overwriting line on a terminal.
/// When stderr is not a terminal, only explicitly requested status lines and
/// the final summary are printed.
pub(crate) struct WalkProgressRenderer {
    interactive: bool,
    last_draw: Option<Instant>,
    last_line_len: usize,
}

impl WalkProgressRenderer {
    pub(crate) fn new() -> Self {
        let interactive = io::stderr().is_terminal();
        PROGRESS_ACTIVE.store(interactive, Relaxed);
        Self {
            interactive,
            last_draw: None,
            last_line_len: 0,
        }
    }

    /// Handle one update. `status_requested` forces a full line even on a
    /// non-terminal stderr.
    pub(crate) fn update(&mut self, stat: &Stat, elapsed: Duration, status_requested: bool) {
        if status_requested {
            self.print_line(&status_line(stat, elapsed));
            return;
        }
        if !self.interactive {
            return;
        }
        if self
            .last_draw
            .is_some_and(|at| at.elapsed() < PROGRESS_REDRAW_INTERVAL)
        {
            return;
        }
        self.draw(&status_line(stat, elapsed));
    }

    pub(crate) fn finish(&mut self, stat: &Stat, elapsed: Duration) {
        self.print_line(&status_line(stat, elapsed));
        PROGRESS_ACTIVE.store(false, Relaxed);
    }

    fn draw(&mut self, line: &str) {
        let pad_len = self.last_line_len.saturating_sub(line.len());
        {
            let _guard = acquire_stderr_lock();
            eprint!("\r{line}{}", " ".repeat(pad_len));
            let _ = io::stderr().flush();
        }
        self.last_draw = Some(Instant::now());
        self.last_line_len = line.len();
    }

    /// Print a complete line, replacing any partial status line.
    fn print_line(&mut self, line: &str) {
        let _guard = acquire_stderr_lock();
        if self.interactive {
            eprint!("\r\x1b[2K");
        }
        eprintln!("{line}");
        self.last_line_len = 0;
    }
}

pub(crate) fn status_line(stat: &Stat, elapsed: Duration) -> String {
    let errors_suffix = if stat.errors > 0 {
        format!(", Errors: {}", stat.errors)
    } else {
        String::new()
    };
    format!(
        "[{}] Dirs: {}, Files: {}, Size: {}, Blobs: {}{errors_suffix}",
        format_elapsed(elapsed),
        stat.dirs,
        stat.files,
        format_bytes(stat.bytes),
        stat.blobs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_lists_counters() {
        let stat = Stat {
            files: 3,
            dirs: 2,
            bytes: 2048,
            blobs: 5,
            ..Stat::default()
        };
        assert_eq!(
            status_line(&stat, Duration::from_secs(75)),
            "[1:15] Dirs: 2, Files: 3, Size: 2.00 KiB, Blobs: 5"
        );
    }

    #[test]
    fn status_line_mentions_errors_only_when_present() {
        let stat = Stat {
            errors: 1,
            ..Stat::default()
        };
        assert!(status_line(&stat, Duration::ZERO).ends_with(", Errors: 1"));
        assert!(!status_line(&Stat::default(), Duration::ZERO).contains("Errors"));
    }
}
