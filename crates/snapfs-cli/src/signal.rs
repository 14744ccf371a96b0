use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, select, Sender};
use snapfs_core::progress::UpdateTrigger;

/// Set when a status signal arrives, cleared by whoever prints the status.
static INFO_REQUESTED: AtomicBool = AtomicBool::new(false);

const RELAY_POLL: Duration = Duration::from_millis(100);

/// Signals that request an immediate status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InfoSignals {
    pub signals: Vec<libc::c_int>,
}

impl InfoSignals {
    /// SIGUSR1 everywhere; BSDs and macOS also get SIGINFO (Ctrl+T).
    pub(crate) fn platform_default() -> Self {
        #[allow(unused_mut)]
        let mut signals = vec![libc::SIGUSR1];
        #[cfg(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "dragonfly"
        ))]
        signals.push(libc::SIGINFO);
        Self { signals }
    }

    /// Install handlers for every configured signal.
    pub(crate) fn install(&self) {
        for &sig in &self.signals {
            // Safety: the handler only stores to an atomic bool.
            unsafe {
                libc::signal(sig, info_signal_handler as *const () as libc::sighandler_t);
            }
        }
    }
}

extern "C" fn info_signal_handler(_sig: libc::c_int) {
    INFO_REQUESTED.store(true, Ordering::SeqCst);
}

/// Whether a status signal is pending.
pub(crate) fn info_requested() -> bool {
    INFO_REQUESTED.load(Ordering::SeqCst)
}

/// Consume a pending status request.
pub(crate) fn take_info_request() -> bool {
    INFO_REQUESTED.swap(false, Ordering::SeqCst)
}

/// Forwards status signals to a progress trigger from a normal thread,
/// since the trigger channel cannot be used from a signal handler.
pub(crate) struct InfoRelay {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl InfoRelay {
    pub(crate) fn spawn(trigger: UpdateTrigger) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = std::thread::Builder::new()
            .name("info-relay".into())
            .spawn(move || loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    default(RELAY_POLL) => {
                        if info_requested() {
                            trigger.request();
                        }
                    }
                }
            })?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for InfoRelay {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
