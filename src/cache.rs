//! Bounded compile-and-memoize cache for script artifacts.
//!
//! Keys are script identities (absolute file path or caller-chosen inline
//! id). The cache guarantees single-flight compilation: concurrent calls
//! for the same uncompiled key trigger exactly one compile, with every
//! caller receiving the same artifact or the same propagated failure.
//! Failures are never cached; a later call with the same key retries.

use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// One slot per in-flight compilation. The slot mutex serializes
/// compilation for that key only; holders of slots for other keys never
/// contend on it.
struct Slot<V, E> {
    outcome: Mutex<Option<Result<Arc<V>, Arc<E>>>>,
}

impl<V, E> Slot<V, E> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
        }
    }
}

/// Compiled entries under LRU bound, plus the in-flight table.
///
/// In-flight compilations live in a side map exempt from eviction, so
/// capacity pressure on compiled entries can never orphan a compilation
/// that concurrent callers are waiting on. An entry moves into the LRU
/// map only once its compilation succeeds.
struct CacheState<V, E> {
    compiled: LruCache<String, Arc<V>>,
    in_flight: HashMap<String, Arc<Slot<V, E>>>,
}

/// Thread-safe LRU cache with single-flight compute-if-absent semantics.
///
/// The cached entry count never exceeds the configured capacity after any
/// operation completes; inserting beyond capacity evicts the least
/// recently used entry, and reads refresh recency.
pub struct CompileCache<V, E> {
    state: Mutex<CacheState<V, E>>,
}

impl<V, E> CompileCache<V, E> {
    /// Create a cache holding at most `capacity` compiled entries.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).expect("cache capacity must be non-zero");
        Self {
            state: Mutex::new(CacheState {
                compiled: LruCache::new(capacity),
                in_flight: HashMap::new(),
            }),
        }
    }

    /// Current cached entry count, exposed as a read-only gauge.
    /// In-flight compilations are not counted until they succeed.
    pub fn len(&self) -> usize {
        self.state.lock().compiled.len()
    }

    /// Whether the cache holds no compiled entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum compiled entry count.
    pub fn capacity(&self) -> usize {
        self.state.lock().compiled.cap().get()
    }

    /// Return the cached value for `key`, compiling it with `compile` if
    /// absent. Concurrent callers for the same key synchronize on a single
    /// in-flight compilation and share its result; a failed compilation is
    /// propagated to every waiting caller and then forgotten.
    pub fn get_or_compile<F>(&self, key: &str, compile: F) -> Result<Arc<V>, Arc<E>>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let slot = {
            let mut state = self.state.lock();
            if let Some(value) = state.compiled.get(key) {
                return Ok(Arc::clone(value));
            }
            match state.in_flight.get(key) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let slot = Arc::new(Slot::new());
                    state.in_flight.insert(key.to_string(), Arc::clone(&slot));
                    slot
                }
            }
        };

        // The map lock is released before compiling, so other keys make
        // progress while this one compiles. Whichever caller takes the
        // slot lock first compiles; the rest block here and read its
        // outcome.
        let mut outcome = slot.outcome.lock();
        if let Some(existing) = outcome.as_ref() {
            return existing.clone();
        }

        let result = match compile() {
            Ok(value) => Ok(Arc::new(value)),
            Err(error) => Err(Arc::new(error)),
        };
        *outcome = Some(result.clone());

        // Publish: success moves the entry under the LRU bound; failure is
        // simply forgotten so the next call retries (no negative caching).
        // Either way the in-flight entry is cleared, unless a newer slot
        // has already replaced this one.
        let mut state = self.state.lock();
        let still_ours = state
            .in_flight
            .get(key)
            .map(|current| Arc::ptr_eq(current, &slot))
            .unwrap_or(false);
        if still_ours {
            state.in_flight.remove(key);
        }
        if let Ok(value) = &result {
            state.compiled.put(key.to_string(), Arc::clone(value));
        }

        result
    }
}
