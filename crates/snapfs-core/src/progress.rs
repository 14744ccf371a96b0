//! Progress reporting with periodic and externally requested updates.
//!
//! A [`Progress`] moves through `Idle -> Running -> Stopped`. While running, a
//! background thread delivers `on_update` on every tick of the configured
//! interval and whenever an [`UpdateTrigger`] fires. Producers push counters
//! with [`Progress::report`]. All callbacks run under one lock, so they never
//! overlap and no update is delivered after `on_done`.

use std::ops::{Add, AddAssign};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, never, select, tick, Receiver, Sender};
use tracing::{debug, trace};

use snapfs_types::{Result, SnapfsError};

/// Counters accumulated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
    pub trees: u64,
    pub blobs: u64,
    pub errors: u64,
}

impl AddAssign for Stat {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.dirs += other.dirs;
        self.bytes += other.bytes;
        self.trees += other.trees;
        self.blobs += other.blobs;
        self.errors += other.errors;
    }
}

impl Add for Stat {
    type Output = Stat;

    fn add(mut self, other: Self) -> Stat {
        self += other;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Stopped,
}

type StartFn = Box<dyn FnMut() + Send>;
/// `(stat, elapsed, is_tick)`
type UpdateFn = Box<dyn FnMut(&Stat, Duration, bool) + Send>;

struct State {
    phase: Phase,
    stat: Stat,
    started: Option<Instant>,
    on_start: Option<StartFn>,
    on_update: Option<UpdateFn>,
    on_done: Option<UpdateFn>,
}

impl State {
    fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    fn update(&mut self, is_tick: bool) {
        if self.phase != Phase::Running {
            return;
        }
        let elapsed = self.elapsed();
        if let Some(on_update) = self.on_update.as_mut() {
            on_update(&self.stat, elapsed, is_tick);
        }
    }
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Requests an immediate `on_update` from a running [`Progress`].
///
/// Requests coalesce: while one is pending, further ones are dropped.
/// Requests made after the progress stopped are ignored.
#[derive(Clone)]
pub struct UpdateTrigger {
    tx: Sender<()>,
}

impl UpdateTrigger {
    pub fn request(&self) {
        // Full means a request is already pending.
        let _ = self.tx.try_send(());
    }
}

pub struct Progress {
    interval: Duration,
    state: Arc<Mutex<State>>,
    trigger_tx: Sender<()>,
    trigger_rx: Receiver<()>,
    worker: Mutex<Option<Worker>>,
}

impl Progress {
    /// Create an idle progress. A zero `interval` disables periodic updates;
    /// triggered updates still work.
    pub fn new(interval: Duration) -> Self {
        let (trigger_tx, trigger_rx) = bounded(1);
        Self {
            interval,
            state: Arc::new(Mutex::new(State {
                phase: Phase::Idle,
                stat: Stat::default(),
                started: None,
                on_start: None,
                on_update: None,
                on_done: None,
            })),
            trigger_tx,
            trigger_rx,
            worker: Mutex::new(None),
        }
    }

    pub fn on_start(self, f: impl FnMut() + Send + 'static) -> Self {
        self.state.lock().unwrap().on_start = Some(Box::new(f));
        self
    }

    pub fn on_update(self, f: impl FnMut(&Stat, Duration, bool) + Send + 'static) -> Self {
        self.state.lock().unwrap().on_update = Some(Box::new(f));
        self
    }

    pub fn on_done(self, f: impl FnMut(&Stat, Duration, bool) + Send + 'static) -> Self {
        self.state.lock().unwrap().on_done = Some(Box::new(f));
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().unwrap().phase
    }

    /// Snapshot of the accumulated counters.
    pub fn stat(&self) -> Stat {
        self.state.lock().unwrap().stat
    }

    pub fn trigger(&self) -> UpdateTrigger {
        UpdateTrigger {
            tx: self.trigger_tx.clone(),
        }
    }

    /// Record the start time, call `on_start` and begin delivering updates.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.phase != Phase::Idle {
            return Err(SnapfsError::InvalidState(format!(
                "progress cannot start while {:?}",
                state.phase
            )));
        }

        // Requests made before the start are stale.
        while self.trigger_rx.try_recv().is_ok() {}

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let ticker = if self.interval.is_zero() {
            never()
        } else {
            tick(self.interval)
        };
        let trigger_rx = self.trigger_rx.clone();
        let shared = Arc::clone(&self.state);
        let handle = std::thread::Builder::new()
            .name("progress".into())
            .spawn(move || update_loop(shared, ticker, trigger_rx, stop_rx))?;
        *self.worker.lock().unwrap() = Some(Worker {
            stop: stop_tx,
            handle,
        });

        state.phase = Phase::Running;
        state.started = Some(Instant::now());
        if let Some(on_start) = state.on_start.as_mut() {
            on_start();
        }
        debug!(interval_ms = self.interval.as_millis() as u64, "progress started");
        Ok(())
    }

    /// Add `stat` to the running total and deliver an update. Ignored once
    /// the progress has stopped.
    pub fn report(&self, stat: Stat) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.phase {
            Phase::Idle => Err(SnapfsError::InvalidState(
                "progress reported before start".into(),
            )),
            Phase::Stopped => Ok(()),
            Phase::Running => {
                state.stat += stat;
                state.update(false);
                Ok(())
            }
        }
    }

    /// Stop the update thread, wait for it, then call `on_done` once.
    /// Calling `done` again is a no-op.
    ///
    /// Must not be called from inside a callback.
    pub fn done(&self) -> Result<()> {
        if self.state.lock().unwrap().phase == Phase::Idle {
            return Err(SnapfsError::InvalidState(
                "progress finished before start".into(),
            ));
        }

        self.stop_worker()?;

        let mut state = self.state.lock().unwrap();
        if state.phase != Phase::Running {
            return Ok(());
        }
        state.phase = Phase::Stopped;
        let elapsed = state.elapsed();
        let stat = state.stat;
        if let Some(on_done) = state.on_done.as_mut() {
            on_done(&stat, elapsed, false);
        }
        debug!(elapsed_ms = elapsed.as_millis() as u64, "progress done");
        Ok(())
    }

    fn stop_worker(&self) -> Result<()> {
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            drop(worker.stop);
            worker
                .handle
                .join()
                .map_err(|_| SnapfsError::Other("progress thread panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        let _ = self.stop_worker();
    }
}

fn update_loop(
    state: Arc<Mutex<State>>,
    ticker: Receiver<Instant>,
    trigger: Receiver<()>,
    stop: Receiver<()>,
) {
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {
                trace!("progress tick");
                state.lock().unwrap().update(true);
            }
            recv(trigger) -> msg => {
                if msg.is_ok() {
                    state.lock().unwrap().update(false);
                }
            }
        }
    }
}
