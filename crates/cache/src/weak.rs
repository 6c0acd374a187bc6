//! Weak-reference overflow cache
//!
//! Second-chance tier behind the strong LRU cache. Entries hold
//! `Weak<dyn Image>` handles, so this tier never keeps an image alive by
//! itself: once every strong owner (strong tier, UI consumer) drops its
//! `Arc`, the entry goes dead and is purged lazily on the read path or by a
//! cleanup sweep. There is no byte budget; reachability is the bound.
//!
//! Each key maps to a list of entries sorted by descending size (ties go to
//! the most recent write), so `get` returns the largest still-alive
//! candidate - a large cached image can serve more size requests than a
//! small one. Writes are not deduplicated: two demotions of equal size
//! under one key yield two entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use smallvec::SmallVec;
use tracing::debug;

use crate::image::Image;
use crate::key::{CacheKey, CacheValue, Extras};

/// Automatic cleanup sweep runs every this many get/set operations
const CLEAN_UP_INTERVAL: u32 = 10;

/// Statistics about weak cache usage
#[derive(Debug, Clone, Default)]
pub struct WeakCacheStats {
    /// Number of keys currently tracked
    pub key_count: usize,

    /// Number of entries across all keys (live and dead)
    pub entry_count: usize,

    /// Sum of recorded sizes of entries whose image is still alive
    pub live_size_bytes: usize,

    /// Number of gets that found a live entry
    pub hits: u64,

    /// Number of gets that found nothing alive
    pub misses: u64,

    /// Number of dead entries removed (lazily or by sweeps)
    pub purged: u64,
}

/// A weakly-referenced cache entry
struct WeakEntry {
    image: Weak<dyn Image>,
    extras: Extras,
    size_bytes: usize,
}

impl WeakEntry {
    fn is_live(&self) -> bool {
        self.image.strong_count() > 0
    }
}

/// Internal cache state protected by mutex
struct WeakCacheState {
    /// Per-key entry lists, each sorted by descending size
    entries: HashMap<CacheKey, SmallVec<[WeakEntry; 2]>>,

    /// Operations since the last cleanup sweep
    operations_since_clean_up: u32,

    /// Cache statistics
    stats: WeakCacheStats,
}

impl WeakCacheState {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            operations_since_clean_up: 0,
            stats: WeakCacheStats::default(),
        }
    }

    /// Count an operation and sweep if the interval has elapsed
    fn register_operation(&mut self) {
        self.operations_since_clean_up += 1;
        if self.operations_since_clean_up >= CLEAN_UP_INTERVAL {
            self.clean_up();
        }
    }

    /// Full sweep: drop every dead entry and every emptied key
    fn clean_up(&mut self) {
        let mut purged = 0usize;
        self.entries.retain(|_, list| {
            let before = list.len();
            list.retain(|entry| entry.is_live());
            purged += before - list.len();
            !list.is_empty()
        });
        if purged > 0 {
            debug!(purged, "weak cache sweep removed dead entries");
        }
        self.stats.purged += purged as u64;
        self.operations_since_clean_up = 0;
    }
}

/// Thread-safe weak-reference cache for images evicted from the strong tier
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use lightbox_cache::image::{Image, PixelImage};
/// use lightbox_cache::key::{CacheKey, Extras};
/// use lightbox_cache::weak::WeakImageCache;
///
/// let cache = WeakImageCache::new();
/// let image: Arc<dyn Image> = Arc::new(PixelImage::blank(16, 16));
/// let key = CacheKey::new("https://example.com/cat.png");
///
/// cache.set(key.clone(), &image, Extras::new(), image.size_bytes());
/// assert!(cache.get(&key).is_some());
///
/// // Dropping the last strong reference makes the entry unreachable.
/// drop(image);
/// assert!(cache.get(&key).is_none());
/// ```
pub struct WeakImageCache {
    state: Mutex<WeakCacheState>,
}

impl WeakImageCache {
    /// Create an empty weak cache
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WeakCacheState::new()),
        }
    }

    /// Get the largest still-alive value for a key
    ///
    /// Scans the key's list in descending-size order and returns the first
    /// entry whose image is still alive. Dead entries encountered before it
    /// are removed permanently; the scan never touches the rest of the
    /// list, keeping the read path cheap.
    pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        let mut result = None;
        if let Some(list) = state.entries.get_mut(key) {
            while let Some(head) = list.first() {
                if let Some(image) = head.image.upgrade() {
                    result = Some(CacheValue::with_extras(image, head.extras.clone()));
                    break;
                }
                list.remove(0);
                state.stats.purged += 1;
            }
            if list.is_empty() {
                state.entries.remove(key);
            }
        }

        match &result {
            Some(_) => state.stats.hits += 1,
            None => state.stats.misses += 1,
        }
        state.register_operation();
        result
    }

    /// Add an entry for a key
    ///
    /// The entry is inserted so the key's list stays sorted by descending
    /// recorded size, with the most recent write first among equal sizes.
    ///
    /// # Arguments
    ///
    /// * `key` - Identity to file the entry under
    /// * `image` - Strong handle to downgrade; the cache keeps only a weak one
    /// * `extras` - Metadata side-table carried alongside the image
    /// * `size_bytes` - Recorded size used for ordering and accounting
    pub fn set(&self, key: CacheKey, image: &Arc<dyn Image>, extras: Extras, size_bytes: usize) {
        let mut state = self.state.lock().unwrap();
        let entry = WeakEntry {
            image: Arc::downgrade(image),
            extras,
            size_bytes,
        };
        let list = state.entries.entry(key).or_default();
        let position = list
            .iter()
            .position(|existing| size_bytes >= existing.size_bytes)
            .unwrap_or(list.len());
        list.insert(position, entry);
        state.register_operation();
    }

    /// Remove every entry for a key
    ///
    /// Returns true if the key was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock().unwrap();
        state.entries.remove(key).is_some()
    }

    /// Drop all entries
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.operations_since_clean_up = 0;
    }

    /// Sweep the whole cache, removing dead entries and emptied keys
    ///
    /// `get` already purges dead entries it scans past; this walks every
    /// list so bookkeeping cannot grow without bound between reads. Called
    /// automatically every few operations and on memory-pressure trims.
    pub fn clean_up(&self) {
        let mut state = self.state.lock().unwrap();
        state.clean_up();
    }

    /// Sum of recorded sizes of entries whose image is still alive
    pub fn live_size_bytes(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .entries
            .values()
            .flat_map(|list| list.iter())
            .filter(|entry| entry.is_live())
            .map(|entry| entry.size_bytes)
            .sum()
    }

    /// Number of keys currently tracked (live or not yet swept)
    pub fn key_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.entries.len()
    }

    /// Number of entries across all keys, including dead ones
    pub fn entry_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.entries.values().map(|list| list.len()).sum()
    }

    /// Snapshot of the tracked keys
    pub fn keys(&self) -> Vec<CacheKey> {
        let state = self.state.lock().unwrap();
        state.entries.keys().cloned().collect()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> WeakCacheStats {
        let mut state = self.state.lock().unwrap();
        state.stats.key_count = state.entries.len();
        state.stats.entry_count = state.entries.values().map(|list| list.len()).sum();
        state.stats.live_size_bytes = state
            .entries
            .values()
            .flat_map(|list| list.iter())
            .filter(|entry| entry.is_live())
            .map(|entry| entry.size_bytes)
            .sum();
        state.stats.clone()
    }
}

impl Default for WeakImageCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelImage;
    use rand::seq::SliceRandom;

    fn key(name: &str) -> CacheKey {
        CacheKey::new(name)
    }

    fn image() -> Arc<dyn Image> {
        Arc::new(PixelImage::blank(1, 1))
    }

    #[test]
    fn test_get_returns_live_entry() {
        let cache = WeakImageCache::new();
        let img = image();
        cache.set(key("a"), &img, Extras::new(), 100);

        let value = cache.get(&key("a")).unwrap();
        assert!(Arc::ptr_eq(&value.image, &img));
        assert!(cache.get(&key("b")).is_none());
    }

    #[test]
    fn test_descending_size_retrieval() {
        let cache = WeakImageCache::new();
        let k = key("shared");

        // Keep strong handles so entries stay alive, insert in random order.
        let mut sizes: Vec<usize> = (1..=8).collect();
        sizes.shuffle(&mut rand::thread_rng());
        let mut alive: HashMap<usize, Arc<dyn Image>> = HashMap::new();
        for size in sizes {
            let img = image();
            cache.set(k.clone(), &img, Extras::new(), size);
            alive.insert(size, img);
        }

        // Reclaiming the returned entry each round walks down the sizes.
        for expected in (1..=8).rev() {
            let value = cache.get(&k).expect("live entry expected");
            let img = alive.remove(&expected).expect("largest live size");
            assert!(
                Arc::ptr_eq(&value.image, &img),
                "expected the size-{} entry",
                expected
            );
            drop(img);
            drop(value);
        }
        assert!(cache.get(&k).is_none());
    }

    #[test]
    fn test_ties_prefer_most_recent_write() {
        let cache = WeakImageCache::new();
        let k = key("tied");
        let first = image();
        let second = image();
        cache.set(k.clone(), &first, Extras::new(), 64);
        cache.set(k.clone(), &second, Extras::new(), 64);

        let value = cache.get(&k).unwrap();
        assert!(Arc::ptr_eq(&value.image, &second));
    }

    #[test]
    fn test_same_key_and_size_not_deduplicated() {
        let cache = WeakImageCache::new();
        let k = key("dup");
        let first = image();
        let second = image();
        cache.set(k.clone(), &first, Extras::new(), 64);
        cache.set(k.clone(), &second, Extras::new(), 64);
        assert_eq!(cache.entry_count(), 2);

        // Reclaim the newer entry; the older one must still be served.
        drop(second);
        let value = cache.get(&k).unwrap();
        assert!(Arc::ptr_eq(&value.image, &first));
    }

    #[test]
    fn test_dead_entries_never_returned() {
        let cache = WeakImageCache::new();
        let k = key("dead");
        let img = image();
        cache.set(k.clone(), &img, Extras::new(), 100);
        drop(img);

        assert!(cache.get(&k).is_none());
        // The scan-past purge also dropped the emptied key.
        assert_eq!(cache.key_count(), 0);
    }

    #[test]
    fn test_lazy_purge_is_limited_to_scanned_prefix() {
        let cache = WeakImageCache::new();
        let k = key("prefix");

        let big = image();
        let live = image();
        let small = image();
        cache.set(k.clone(), &big, Extras::new(), 300);
        cache.set(k.clone(), &live, Extras::new(), 200);
        cache.set(k.clone(), &small, Extras::new(), 100);

        // Kill the head and the tail; only the head is scanned past.
        drop(big);
        drop(small);

        let value = cache.get(&k).unwrap();
        assert!(Arc::ptr_eq(&value.image, &live));
        // Head purged, tail untouched until a sweep.
        assert_eq!(cache.entry_count(), 2);

        cache.clean_up();
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_clean_up_removes_dead_keys() {
        let cache = WeakImageCache::new();
        let kept = image();
        cache.set(key("kept"), &kept, Extras::new(), 10);

        let dropped = image();
        cache.set(key("dropped"), &dropped, Extras::new(), 20);
        drop(dropped);

        assert_eq!(cache.key_count(), 2);
        cache.clean_up();
        assert_eq!(cache.key_count(), 1);
        assert!(cache.get(&key("kept")).is_some());
    }

    #[test]
    fn test_periodic_clean_up_after_interval() {
        let cache = WeakImageCache::new();
        let dropped = image();
        cache.set(key("stale"), &dropped, Extras::new(), 10);
        drop(dropped);

        // Churn other keys until the automatic sweep fires.
        let mut alive = Vec::new();
        for i in 0..CLEAN_UP_INTERVAL {
            let img = image();
            cache.set(key(&format!("churn-{}", i)), &img, Extras::new(), 1);
            alive.push(img);
        }

        // The stale key was swept without ever being read.
        assert!(!cache.keys().iter().any(|k| k.identity() == "stale"));
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = WeakImageCache::new();
        let img = image();
        cache.set(key("a"), &img, Extras::new(), 10);

        assert!(cache.remove(&key("a")));
        assert!(!cache.remove(&key("a")));
        assert!(cache.get(&key("a")).is_none());

        cache.set(key("b"), &img, Extras::new(), 10);
        cache.clear();
        assert_eq!(cache.key_count(), 0);
    }

    #[test]
    fn test_live_size_excludes_dead_entries() {
        let cache = WeakImageCache::new();
        let kept = image();
        let dropped = image();
        cache.set(key("a"), &kept, Extras::new(), 100);
        cache.set(key("b"), &dropped, Extras::new(), 50);
        assert_eq!(cache.live_size_bytes(), 150);

        drop(dropped);
        assert_eq!(cache.live_size_bytes(), 100);
    }

    #[test]
    fn test_stats_track_hits_misses_and_purges() {
        let cache = WeakImageCache::new();
        let img = image();
        cache.set(key("a"), &img, Extras::new(), 10);

        cache.get(&key("a"));
        cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.key_count, 1);
        assert_eq!(stats.live_size_bytes, 10);

        drop(img);
        cache.clean_up();
        let stats = cache.stats();
        assert_eq!(stats.purged, 1);
        assert_eq!(stats.key_count, 0);
    }
}
