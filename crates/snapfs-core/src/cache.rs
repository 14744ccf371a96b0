//! Byte-bounded LRU cache of blob contents with single-flight loading.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use lru::LruCache;
use tracing::{debug, trace};

use crate::repo::Repository;
use snapfs_types::{BlobHandle, Result, SnapfsError};

/// Default cache capacity: 64 MiB of blob data.
pub const DEFAULT_CACHE_SIZE: usize = 64 * 1024 * 1024;

type FetchOutcome = std::result::Result<Arc<Vec<u8>>, Arc<SnapfsError>>;

/// Caches decoded blobs in front of a [`Repository`].
///
/// Total cached bytes stay at or below `capacity`; least recently used blobs
/// are evicted first and a hit counts as a use. Blobs are handed out as
/// `Arc`s, so eviction never pulls data out from under a reader.
///
/// Concurrent misses on the same handle share one repository load: the first
/// caller fetches, later callers block until it finishes and receive the same
/// bytes. When a shared load fails, every caller that waited on it gets the
/// failure wrapped in [`SnapfsError::Shared`]. The cache lock is never held
/// across a repository call.
pub struct BlobCache {
    repo: Arc<dyn Repository>,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

struct CacheState {
    entries: LruCache<BlobHandle, Arc<Vec<u8>>>,
    size: usize,
    capacity: usize,
    in_flight: HashMap<BlobHandle, Arc<Flight>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// One in-progress repository load that other callers can wait on.
struct Flight {
    outcome: Mutex<Option<FetchOutcome>>,
    finished: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            finished: Condvar::new(),
        }
    }

    fn complete(&self, outcome: FetchOutcome) {
        let mut slot = self.outcome.lock().unwrap();
        *slot = Some(outcome);
        self.finished.notify_all();
    }

    fn wait(&self) -> Result<Arc<Vec<u8>>> {
        let mut slot = self.outcome.lock().unwrap();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone().map_err(SnapfsError::Shared);
            }
            slot = self.finished.wait(slot).unwrap();
        }
    }
}

/// Unregisters and completes a flight if the leader unwinds before
/// finishing, so waiters are never left blocked.
struct FlightGuard<'a> {
    cache: &'a BlobCache,
    handle: BlobHandle,
    flight: Arc<Flight>,
    armed: bool,
}

impl FlightGuard<'_> {
    fn defuse(mut self) -> Arc<Flight> {
        self.armed = false;
        Arc::clone(&self.flight)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.state.lock().unwrap().in_flight.remove(&self.handle);
            self.flight.complete(Err(Arc::new(SnapfsError::Other(format!(
                "load of {} was aborted",
                self.handle
            )))));
        }
    }
}

impl BlobCache {
    pub fn new(repo: Arc<dyn Repository>, capacity: usize) -> Self {
        Self {
            repo,
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                size: 0,
                capacity,
                in_flight: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the bytes of `handle`, loading them from the repository on a
    /// miss. Repository errors are returned unchanged and nothing is retried.
    pub fn get(&self, handle: &BlobHandle) -> Result<Arc<Vec<u8>>> {
        let flight = {
            let mut state = self.state.lock().unwrap();
            if let Some(data) = state.entries.get(handle) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(data));
            }
            if let Some(flight) = state.in_flight.get(handle) {
                let flight = Arc::clone(flight);
                drop(state);
                trace!(blob = %handle, "waiting for in-flight load");
                return flight.wait();
            }
            let flight = Arc::new(Flight::new());
            state.in_flight.insert(*handle, Arc::clone(&flight));
            flight
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        let guard = FlightGuard {
            cache: self,
            handle: *handle,
            flight,
            armed: true,
        };

        let loaded = self.repo.load_blob(handle).map(Arc::new);

        let waiters = {
            let mut state = self.state.lock().unwrap();
            state.in_flight.remove(handle);
            if let Ok(data) = &loaded {
                let evicted = state.insert(*handle, Arc::clone(data));
                self.evictions.fetch_add(evicted, Ordering::Relaxed);
            }
            // No new waiter can join once the flight is unregistered.
            Arc::strong_count(&guard.flight) > 1
        };
        let flight = guard.defuse();

        match loaded {
            Ok(data) => {
                flight.complete(Ok(Arc::clone(&data)));
                Ok(data)
            }
            Err(e) if waiters => {
                let shared = Arc::new(e);
                flight.complete(Err(Arc::clone(&shared)));
                Err(SnapfsError::Shared(shared))
            }
            Err(e) => Err(e),
        }
    }

    /// Whether `handle` is cached. Does not count as a use.
    pub fn contains(&self, handle: &BlobHandle) -> bool {
        self.state.lock().unwrap().entries.contains(handle)
    }

    /// Number of cached blobs.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total cached bytes.
    pub fn size(&self) -> usize {
        self.state.lock().unwrap().size
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().unwrap().capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl CacheState {
    /// Insert and evict until the byte bound holds again. Returns the number
    /// of evicted entries.
    fn insert(&mut self, handle: BlobHandle, data: Arc<Vec<u8>>) -> u64 {
        let len = data.len();
        // Don't cache items larger than the entire cache
        if len > self.capacity {
            debug!(blob = %handle, size = len, capacity = self.capacity, "blob exceeds cache capacity");
            return 0;
        }

        if let Some(old) = self.entries.put(handle, data) {
            self.size -= old.len();
        }
        self.size += len;

        let mut evicted = 0;
        while self.size > self.capacity {
            match self.entries.pop_lru() {
                Some((old_handle, old)) => {
                    self.size -= old.len();
                    evicted += 1;
                    trace!(blob = %old_handle, size = old.len(), "evicted blob");
                }
                None => break,
            }
        }
        evicted
    }
}
