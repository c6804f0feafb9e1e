//! Single-flight LRU cache of MOG headers.
//!
//! The cache stores *futures*, not values. The first caller for a path spawns
//! the header fetch and stores a shared handle to it; everyone who asks for
//! the same path while the fetch is running awaits that same handle. Once it
//! resolves, the handle keeps yielding the finished result until evicted.
//!
//! # Outcomes
//!
//! - `Ok(Some(metadata))`: cached until evicted.
//! - `Ok(None)` (file not found): cached until evicted, so missing regions
//!   are not requested again on every pan.
//! - `Err(_)`: delivered to every waiter of that fetch, then removed so the
//!   next call starts a fresh fetch.
//!
//! Fetches run as spawned tasks. Cancelling every caller does not cancel the
//! fetch; its result still lands in the cache, and a failure is still
//! removed.
//!
//! Single-flight holds only while the entry stays in the cache. An in-flight
//! entry evicted by LRU pressure is forgotten, and a later caller for that
//! path starts a second fetch alongside the first.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use super::metadata::MogMetadata;
use crate::error::MogError;

/// Default number of MOG headers kept in memory.
pub const DEFAULT_METADATA_CACHE_CAPACITY: usize = 16;

/// Result of a header fetch as seen by every waiter.
pub type MetadataResult = Result<Option<Arc<MogMetadata>>, MogError>;

type SharedFetch = Shared<BoxFuture<'static, MetadataResult>>;

/// A cached fetch tagged with the generation that created it.
struct Entry {
    generation: u64,
    fetch: SharedFetch,
}

type Entries = Arc<Mutex<LruCache<String, Entry>>>;

/// Bounded single-flight cache of header fetches keyed by file path.
pub struct MetadataCache {
    entries: Entries,
    next_generation: AtomicU64,
}

impl MetadataCache {
    /// Create a cache holding up to `capacity` paths (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Return the header for `path`, starting `fetch` if none is cached or in
    /// flight.
    ///
    /// `fetch` is only invoked by the caller that creates the entry.
    pub async fn get_or_fetch<F, Fut>(&self, path: &str, fetch: F) -> MetadataResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<MogMetadata>, MogError>> + Send + 'static,
    {
        let (generation, shared) = {
            let mut entries = self.entries.lock().await;
            match entries.get(path) {
                Some(existing) => (existing.generation, existing.fetch.clone()),
                None => {
                    debug!(path, "Starting metadata fetch");
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let task = fetch();
                    let owner = Arc::clone(&self.entries);
                    let key = path.to_string();
                    // Failures are removed by the task itself, even with no waiter left
                    let handle = tokio::spawn(async move {
                        let result = task.await;
                        if result.is_err() {
                            remove_generation(&owner, &key, generation).await;
                        }
                        result
                    });
                    let shared = async move {
                        match handle.await {
                            Ok(result) => result.map(|found| found.map(Arc::new)),
                            Err(e) => Err(MogError::Task(e.to_string())),
                        }
                    }
                    .boxed()
                    .shared();
                    entries.put(
                        path.to_string(),
                        Entry {
                            generation,
                            fetch: shared.clone(),
                        },
                    );
                    (generation, shared)
                }
            }
        };

        let result = shared.await;
        if result.is_err() {
            // Covers a fetch task that panicked instead of returning
            remove_generation(&self.entries, path, generation).await;
        }
        result
    }

    /// Store an already-known outcome for `path`.
    pub async fn insert_ready(&self, path: &str, metadata: Option<MogMetadata>) {
        let ready: MetadataResult = Ok(metadata.map(Arc::new));
        let entry = Entry {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            fetch: futures::future::ready(ready).boxed().shared(),
        };
        self.entries.lock().await.put(path.to_string(), entry);
    }

    /// Whether `path` has an entry (finished or in flight).
    pub async fn contains(&self, path: &str) -> bool {
        self.entries.lock().await.contains(path)
    }

    /// Drop the entry for `path`, forcing the next call to refetch.
    pub async fn invalidate(&self, path: &str) {
        self.entries.lock().await.pop(path);
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn capacity(&self) -> usize {
        self.entries.lock().await.cap().get()
    }
}

/// Drop the entry for `path` only if `generation` still owns it; a retry may
/// already have replaced it.
async fn remove_generation(entries: &Entries, path: &str, generation: u64) {
    let mut entries = entries.lock().await;
    if entries
        .peek(path)
        .is_some_and(|current| current.generation == generation)
    {
        entries.pop(path);
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_CACHE_CAPACITY)
    }
}

// =============================================================================
// Tests
// =============================================================================
