//! Strong-reference LRU cache
//!
//! The bounded first tier of the memory cache:
//! - Byte-based budget enforced after every insertion
//! - Access-order LRU eviction (reads and writes both refresh recency)
//! - Evicted and replaced entries are demoted into the weak tier rather
//!   than discarded; explicit `remove`/`clear` discard without demotion
//! - Thread-safe via a single internal mutex
//!
//! An entry larger than the whole budget is never stored: admitting it
//! would wipe the entire cache for a value that cannot fit anyway, so it is
//! handed straight to the weak tier.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::image::Image;
use crate::key::{CacheKey, CacheValue, Extras};
use crate::weak::WeakImageCache;

/// Statistics about strong cache usage
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of entries currently stored
    pub entry_count: usize,

    /// Current memory usage in bytes
    pub size_bytes: usize,

    /// Maximum memory allowed in bytes
    pub max_size_bytes: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of entries evicted under budget pressure
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// A stored entry strongly owning its image
struct InternalEntry {
    image: Arc<dyn Image>,
    extras: Extras,
    size_bytes: usize,
}

/// Internal cache state protected by mutex
struct CacheState {
    /// Map from cache key to stored entry
    entries: HashMap<CacheKey, InternalEntry>,

    /// Queue tracking access order (front = oldest, back = newest)
    lru_queue: VecDeque<CacheKey>,

    /// Current memory usage in bytes
    size_bytes: usize,

    /// Maximum memory allowed in bytes
    max_size_bytes: usize,

    /// Cache statistics
    stats: CacheStats,
}

impl CacheState {
    fn new(max_size_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            size_bytes: 0,
            max_size_bytes,
            stats: CacheStats::default(),
        }
    }

    /// Update LRU order for a key (move to back of queue)
    fn touch(&mut self, key: &CacheKey) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.clone());
    }

    /// Detach an entry, updating size accounting and the LRU queue
    fn detach(&mut self, key: &CacheKey) -> Option<InternalEntry> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    /// Evict the least recently used entry
    fn evict_lru(&mut self) -> Option<(CacheKey, InternalEntry)> {
        let key = self.lru_queue.pop_front()?;
        let entry = self.entries.remove(&key)?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes);
        self.stats.evictions += 1;
        Some((key, entry))
    }
}

/// Thread-safe bounded LRU cache for decoded images
///
/// Holds an optional handle to the weak tier; every budget-pressure
/// eviction and every replacement demotes the outgoing entry into it. The
/// demotion runs inside the evicting operation's critical section and only
/// takes the weak tier's independent lock (strictly after this cache's
/// own), so the two tiers can never deadlock.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use lightbox_cache::image::{Image, PixelImage};
/// use lightbox_cache::key::{CacheKey, Extras};
/// use lightbox_cache::strong::StrongImageCache;
///
/// let cache = StrongImageCache::new(1024 * 1024, None);
/// let image: Arc<dyn Image> = Arc::new(PixelImage::blank(16, 16));
/// let size = image.size_bytes();
///
/// cache.set(CacheKey::new("cat"), image, Extras::new(), size);
/// assert!(cache.get(&CacheKey::new("cat")).is_some());
/// ```
pub struct StrongImageCache {
    state: Mutex<CacheState>,
    demote_to: Option<Arc<WeakImageCache>>,
}

impl StrongImageCache {
    /// Create a new cache with the specified budget in bytes
    ///
    /// # Arguments
    ///
    /// * `max_size_bytes` - Byte budget; zero disables storage entirely
    /// * `demote_to` - Weak tier receiving evicted and oversized entries
    pub fn new(max_size_bytes: usize, demote_to: Option<Arc<WeakImageCache>>) -> Self {
        Self {
            state: Mutex::new(CacheState::new(max_size_bytes)),
            demote_to,
        }
    }

    /// Get the value for a key, marking it most-recently-used
    pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let mut state = self.state.lock().unwrap();
        if state.entries.contains_key(key) {
            state.touch(key);
            state.stats.hits += 1;
            let entry = &state.entries[key];
            Some(CacheValue::with_extras(
                entry.image.clone(),
                entry.extras.clone(),
            ))
        } else {
            state.stats.misses += 1;
            None
        }
    }

    /// Store a value under a key
    ///
    /// Inserting over an existing key demotes the replaced entry. If the
    /// insertion pushes the total over budget, least-recently-used entries
    /// are evicted (and demoted) until the cache fits again. A value larger
    /// than the whole budget is forwarded to the weak tier instead; any
    /// existing entry under its key is dropped.
    ///
    /// # Arguments
    ///
    /// * `key` - Identity to store under
    /// * `image` - The image handle to own
    /// * `extras` - Metadata side-table carried alongside the image
    /// * `size_bytes` - Recorded size used for budget accounting
    pub fn set(&self, key: CacheKey, image: Arc<dyn Image>, extras: Extras, size_bytes: usize) {
        let mut state = self.state.lock().unwrap();

        if size_bytes > state.max_size_bytes {
            debug!(
                key = key.identity(),
                size_bytes,
                max_size_bytes = state.max_size_bytes,
                "value exceeds whole budget, forwarding to weak tier"
            );
            // The caller is replacing this key; the stale entry is dropped,
            // not demoted.
            state.detach(&key);
            if let Some(weak) = &self.demote_to {
                weak.set(key, &image, extras, size_bytes);
            }
            return;
        }

        if let Some(previous) = state.detach(&key) {
            trace!(key = key.identity(), "replacing entry, demoting old value");
            self.demote(key.clone(), previous);
        }

        state.entries.insert(
            key.clone(),
            InternalEntry {
                image,
                extras,
                size_bytes,
            },
        );
        state.size_bytes += size_bytes;
        state.touch(&key);

        while state.size_bytes > state.max_size_bytes {
            match state.evict_lru() {
                Some((evicted_key, entry)) => {
                    debug!(
                        key = evicted_key.identity(),
                        size_bytes = entry.size_bytes,
                        "evicting under budget pressure"
                    );
                    self.demote(evicted_key, entry);
                }
                None => break,
            }
        }
        debug_assert_eq!(state.entries.len(), state.lru_queue.len());
    }

    /// Remove the entry for a key without demoting it
    ///
    /// Returns true if an entry was removed. Explicit removal means the
    /// caller no longer wants the data, so nothing is handed to the weak
    /// tier.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock().unwrap();
        state.detach(key).is_some()
    }

    /// Evict least-recently-used entries until the total fits `target`
    ///
    /// Every evicted entry is demoted, exactly as under budget pressure.
    pub fn trim_to_size(&self, target: usize) {
        let mut state = self.state.lock().unwrap();
        while state.size_bytes > target {
            match state.evict_lru() {
                Some((key, entry)) => self.demote(key, entry),
                None => break,
            }
        }
        debug!(
            target_bytes = target,
            size_bytes = state.size_bytes,
            "trimmed strong cache"
        );
    }

    /// Remove all entries without demoting them
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        let dropped = state.entries.len();
        state.entries.clear();
        state.lru_queue.clear();
        state.size_bytes = 0;
        debug!(dropped, "cleared strong cache");
    }

    /// Check if a key is present without touching LRU order
    pub fn contains(&self, key: &CacheKey) -> bool {
        let state = self.state.lock().unwrap();
        state.entries.contains_key(key)
    }

    /// Current memory usage in bytes
    pub fn size_bytes(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.size_bytes
    }

    /// Maximum memory allowed in bytes
    pub fn max_size_bytes(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.max_size_bytes
    }

    /// Number of entries currently stored
    pub fn entry_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.entries.len()
    }

    /// Snapshot of stored keys, least- to most-recently-used
    pub fn keys(&self) -> Vec<CacheKey> {
        let state = self.state.lock().unwrap();
        state.lru_queue.iter().cloned().collect()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut state = self.state.lock().unwrap();
        state.stats.entry_count = state.entries.len();
        state.stats.size_bytes = state.size_bytes;
        state.stats.max_size_bytes = state.max_size_bytes;
        state.stats.clone()
    }

    /// Forward an outgoing entry to the weak tier
    fn demote(&self, key: CacheKey, entry: InternalEntry) {
        if let Some(weak) = &self.demote_to {
            weak.set(key, &entry.image, entry.extras, entry.size_bytes);
        }
    }
}
