//! Unified memory cache facade
//!
//! Composes the strong LRU tier and the weak overflow tier behind one
//! surface: reads consult the strong tier first and fall back to the weak
//! tier, writes go through the strong tier (which demotes into the weak
//! tier under budget pressure), and removal/clearing touch both tiers.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::budget::{default_cache_budget, detect_total_ram_bytes, MemoryPressure};
use crate::error::ConfigError;
use crate::key::{CacheKey, CacheValue};
use crate::strong::{CacheStats, StrongImageCache};
use crate::weak::{WeakCacheStats, WeakImageCache};

/// Combined statistics for both cache tiers
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStats {
    /// Strong-tier statistics
    pub strong: CacheStats,

    /// Weak-tier statistics
    pub weak: WeakCacheStats,
}

/// Two-tier memory cache for decoded images
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use lightbox_cache::image::{Image, PixelImage};
/// use lightbox_cache::key::{CacheKey, CacheValue};
/// use lightbox_cache::memory::MemoryCache;
///
/// let cache = MemoryCache::new(8 * 1024 * 1024);
/// let image: Arc<dyn Image> = Arc::new(PixelImage::blank(32, 32));
///
/// cache.set(CacheKey::new("cat"), CacheValue::new(image));
/// assert!(cache.get(&CacheKey::new("cat")).is_some());
/// assert!(cache.size_bytes() > 0);
/// ```
pub struct MemoryCache {
    strong: StrongImageCache,
    weak: Option<Arc<WeakImageCache>>,
}

impl MemoryCache {
    /// Create a cache with the given byte budget and weak references enabled
    pub fn new(max_size_bytes: usize) -> Self {
        let weak = Arc::new(WeakImageCache::new());
        Self {
            strong: StrongImageCache::new(max_size_bytes, Some(weak.clone())),
            weak: Some(weak),
        }
    }

    /// Start building a cache with non-default configuration
    pub fn builder() -> MemoryCacheBuilder {
        MemoryCacheBuilder::new()
    }

    /// Get the value for a key
    ///
    /// The strong tier wins when both tiers hold the key; the weak tier
    /// only answers when the strong tier misses.
    pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        if let Some(value) = self.strong.get(key) {
            return Some(value);
        }
        match &self.weak {
            Some(weak) => weak.get(key),
            None => None,
        }
    }

    /// Store a value, evicting older entries if the budget demands it
    pub fn set(&self, key: CacheKey, value: CacheValue) {
        let size_bytes = value.size_bytes();
        self.strong.set(key, value.image, value.extras, size_bytes);
    }

    /// Remove a key from both tiers
    ///
    /// Returns true if either tier held the key. Both tiers are always
    /// consulted; a strong-tier hit must not leave a stale weak entry
    /// behind.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let removed_strong = self.strong.remove(key);
        let removed_weak = match &self.weak {
            Some(weak) => weak.remove(key),
            None => false,
        };
        removed_strong || removed_weak
    }

    /// Clear both tiers
    pub fn clear(&self) {
        self.strong.clear();
        if let Some(weak) = &self.weak {
            weak.clear();
        }
    }

    /// Current usage: strong-tier bytes plus live weak-tier bytes
    pub fn size_bytes(&self) -> usize {
        let weak_live = match &self.weak {
            Some(weak) => weak.live_size_bytes(),
            None => 0,
        };
        self.strong.size_bytes() + weak_live
    }

    /// The strong tier's byte budget
    pub fn max_size_bytes(&self) -> usize {
        self.strong.max_size_bytes()
    }

    /// Union of both tiers' keys
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: HashSet<CacheKey> = self.strong.keys().into_iter().collect();
        if let Some(weak) = &self.weak {
            keys.extend(weak.keys());
        }
        keys.into_iter().collect()
    }

    /// Sweep the weak tier, dropping bookkeeping for reclaimed images
    pub fn clean_up(&self) {
        if let Some(weak) = &self.weak {
            weak.clean_up();
        }
    }

    /// Evict least-recently-used entries until usage is at most `target_bytes`
    ///
    /// Evicted entries are demoted into the weak tier. Useful for manual
    /// memory-pressure responses, e.g. `trim_to_size(size_bytes() / 2)`.
    pub fn trim_to_size(&self, target_bytes: usize) {
        self.strong.trim_to_size(target_bytes);
    }

    /// Current pressure level of the strong tier
    pub fn pressure(&self) -> MemoryPressure {
        let max = self.strong.max_size_bytes();
        let utilization = if max == 0 {
            0.0
        } else {
            self.strong.size_bytes() as f64 / max as f64
        };
        MemoryPressure::from_utilization(utilization)
    }

    /// React to a memory-pressure signal
    ///
    /// Moderate and high pressure halve the cache's current footprint;
    /// critical pressure clears it outright. The weak tier is swept in
    /// every non-trivial case so reclaimed images stop occupying
    /// bookkeeping.
    pub fn trim(&self, pressure: MemoryPressure) {
        debug!(?pressure, "memory pressure trim");
        match pressure {
            MemoryPressure::Low => {}
            MemoryPressure::Moderate | MemoryPressure::High => {
                self.trim_to_size(self.strong.size_bytes() / 2);
                self.clean_up();
            }
            MemoryPressure::Critical => {
                self.clear();
            }
        }
    }

    /// Snapshot statistics for both tiers
    pub fn stats(&self) -> MemoryCacheStats {
        MemoryCacheStats {
            strong: self.strong.stats(),
            weak: match &self.weak {
                Some(weak) => weak.stats(),
                None => WeakCacheStats::default(),
            },
        }
    }
}

impl Default for MemoryCache {
    /// A cache sized from detected system memory
    fn default() -> Self {
        Self::new(default_cache_budget())
    }
}

/// Builder for [`MemoryCache`]
///
/// # Example
/// ```
/// use lightbox_cache::memory::MemoryCache;
///
/// let cache = MemoryCache::builder()
///     .max_size_bytes(16 * 1024 * 1024)
///     .weak_references_enabled(true)
///     .build()
///     .unwrap();
/// assert_eq!(cache.max_size_bytes(), 16 * 1024 * 1024);
/// ```
pub struct MemoryCacheBuilder {
    max_size_bytes: Option<usize>,
    max_size_percent: Option<f64>,
    weak_references_enabled: bool,
}

impl MemoryCacheBuilder {
    fn new() -> Self {
        Self {
            max_size_bytes: None,
            max_size_percent: None,
            weak_references_enabled: true,
        }
    }

    /// Set an absolute byte budget (takes precedence over a percent)
    pub fn max_size_bytes(mut self, bytes: usize) -> Self {
        self.max_size_bytes = Some(bytes);
        self
    }

    /// Set the budget as a fraction of total system memory
    ///
    /// Must be in `(0.0, 1.0]`; checked at build time.
    pub fn max_size_percent(mut self, percent: f64) -> Self {
        self.max_size_percent = Some(percent);
        self
    }

    /// Enable or disable the weak overflow tier
    ///
    /// With the tier disabled, evicted entries are dropped instead of
    /// demoted and oversized values are discarded.
    pub fn weak_references_enabled(mut self, enabled: bool) -> Self {
        self.weak_references_enabled = enabled;
        self
    }

    /// Build the cache
    pub fn build(self) -> Result<MemoryCache, ConfigError> {
        let max_size_bytes = match (self.max_size_bytes, self.max_size_percent) {
            (Some(bytes), _) => bytes,
            (None, Some(percent)) => {
                if !(percent > 0.0 && percent <= 1.0) {
                    return Err(ConfigError::InvalidSizePercent(percent));
                }
                (detect_total_ram_bytes() as f64 * percent) as usize
            }
            (None, None) => default_cache_budget(),
        };

        let weak = if self.weak_references_enabled {
            Some(Arc::new(WeakImageCache::new()))
        } else {
            None
        };
        Ok(MemoryCache {
            strong: StrongImageCache::new(max_size_bytes, weak.clone()),
            weak,
        })
    }
}

impl Default for MemoryCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Image, PixelImage, TextureImage};
    use crate::key::Extras;

    fn key(name: &str) -> CacheKey {
        CacheKey::new(name)
    }

    fn value() -> CacheValue {
        CacheValue::new(Arc::new(PixelImage::blank(1, 1)))
    }

    #[test]
    fn test_write_through_and_read_back() {
        let cache = MemoryCache::new(1024 * 1024);
        let v = value();
        cache.set(key("a"), v.clone());

        let read = cache.get(&key("a")).unwrap();
        assert_eq!(read, v);
    }

    #[test]
    fn test_strong_tier_wins_over_weak_tier() {
        let cache = MemoryCache::new(1024 * 1024);
        let weak = cache.weak.as_ref().unwrap();

        // Plant an independent value directly in the weak tier.
        let stale: Arc<dyn Image> = Arc::new(PixelImage::blank(2, 2));
        weak.set(key("a"), &stale, Extras::new(), stale.size_bytes());

        let fresh = value();
        cache.set(key("a"), fresh.clone());

        let read = cache.get(&key("a")).unwrap();
        assert_eq!(read, fresh);

        // Removing from the strong tier exposes the weak entry.
        cache.strong.remove(&key("a"));
        let fallback = cache.get(&key("a")).unwrap();
        assert!(Arc::ptr_eq(&fallback.image, &stale));
    }

    #[test]
    fn test_fallback_to_weak_tier_after_eviction() {
        // Budget fits exactly one value, so the second insert evicts.
        let first = value();
        let cache = MemoryCache::builder()
            .max_size_bytes(first.size_bytes())
            .build()
            .unwrap();

        cache.set(key("first"), first.clone());
        cache.set(key("second"), value());

        // "first" was evicted from the strong tier but this test still
        // holds its image, so the facade serves it from the weak tier.
        assert!(cache.strong.get(&key("first")).is_none());
        let read = cache.get(&key("first")).unwrap();
        assert!(Arc::ptr_eq(&read.image, &first.image));
    }

    #[test]
    fn test_remove_touches_both_tiers() {
        let cache = MemoryCache::new(1024 * 1024);
        let v = value();
        cache.set(key("a"), v.clone());

        // Demote a copy into the weak tier as well.
        let weak = cache.weak.as_ref().unwrap();
        weak.set(key("a"), &v.image, Extras::new(), v.size_bytes());

        assert!(cache.remove(&key("a")));
        assert!(cache.get(&key("a")).is_none());
        assert!(!cache.remove(&key("a")));
    }

    #[test]
    fn test_remove_reports_weak_only_hits() {
        let cache = MemoryCache::new(1024 * 1024);
        let img: Arc<dyn Image> = Arc::new(PixelImage::blank(1, 1));
        cache
            .weak
            .as_ref()
            .unwrap()
            .set(key("weak-only"), &img, Extras::new(), 10);

        assert!(cache.remove(&key("weak-only")));
    }

    #[test]
    fn test_clear_empties_both_tiers() {
        let cache = MemoryCache::new(1024 * 1024);
        let v = value();
        cache.set(key("a"), v.clone());
        let weak = cache.weak.as_ref().unwrap();
        weak.set(key("b"), &v.image, Extras::new(), 10);

        cache.clear();
        assert!(cache.keys().is_empty());
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_size_counts_live_entries_in_both_tiers() {
        let cache = MemoryCache::new(1024 * 1024);
        let v = value();
        let strong_size = v.size_bytes();
        cache.set(key("a"), v);

        let held: Arc<dyn Image> = Arc::new(PixelImage::blank(1, 1));
        cache
            .weak
            .as_ref()
            .unwrap()
            .set(key("b"), &held, Extras::new(), 40);

        assert_eq!(cache.size_bytes(), strong_size + 40);

        // A reclaimed weak entry stops counting.
        drop(held);
        assert_eq!(cache.size_bytes(), strong_size);
    }

    #[test]
    fn test_keys_union_without_duplicates() {
        let cache = MemoryCache::new(1024 * 1024);
        let v = value();
        cache.set(key("both"), v.clone());
        let weak = cache.weak.as_ref().unwrap();
        weak.set(key("both"), &v.image, Extras::new(), 10);
        weak.set(key("weak-only"), &v.image, Extras::new(), 10);

        let mut keys: Vec<String> = cache
            .keys()
            .into_iter()
            .map(|k| k.identity().to_string())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["both".to_string(), "weak-only".to_string()]);
    }

    #[test]
    fn test_trim_critical_clears() {
        let cache = MemoryCache::new(1024 * 1024);
        cache.set(key("a"), value());
        cache.trim(MemoryPressure::Critical);
        assert_eq!(cache.size_bytes(), 0);
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn test_trim_high_halves_usage() {
        let cache = MemoryCache::new(10_000);
        let images: Vec<CacheValue> = (0..4).map(|_| value()).collect();
        for (i, v) in images.iter().enumerate() {
            cache.set(key(&format!("k{}", i)), v.clone());
        }
        let before = cache.strong.size_bytes();

        cache.trim(MemoryPressure::High);
        assert!(cache.strong.size_bytes() <= before / 2);

        // Trimmed entries are still reachable: the images are alive here.
        assert!(cache.size_bytes() >= before / 2);
    }

    #[test]
    fn test_trim_low_is_noop() {
        let cache = MemoryCache::new(10_000);
        cache.set(key("a"), value());
        let before = cache.size_bytes();
        cache.trim(MemoryPressure::Low);
        assert_eq!(cache.size_bytes(), before);
    }

    #[test]
    fn test_pressure_tracks_utilization() {
        let cache = MemoryCache::new(100);
        assert_eq!(cache.pressure(), MemoryPressure::Low);
        cache
            .strong
            .set(key("a"), Arc::new(PixelImage::blank(1, 1)), Extras::new(), 95);
        assert_eq!(cache.pressure(), MemoryPressure::Critical);
    }

    #[test]
    fn test_builder_rejects_bad_percent() {
        assert!(matches!(
            MemoryCache::builder().max_size_percent(0.0).build(),
            Err(ConfigError::InvalidSizePercent(_))
        ));
        assert!(matches!(
            MemoryCache::builder().max_size_percent(1.5).build(),
            Err(ConfigError::InvalidSizePercent(_))
        ));
        assert!(MemoryCache::builder().max_size_percent(0.25).build().is_ok());
    }

    #[test]
    fn test_builder_without_weak_tier() {
        let cache = MemoryCache::builder()
            .max_size_bytes(100)
            .weak_references_enabled(false)
            .build()
            .unwrap();

        // Oversized values have nowhere to go and are dropped.
        let img: Arc<dyn Image> = Arc::new(PixelImage::blank(64, 64));
        cache.set(key("big"), CacheValue::new(img.clone()));
        assert!(cache.get(&key("big")).is_none());
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_zero_budget_degrades_to_weak_only() {
        let cache = MemoryCache::builder().max_size_bytes(0).build().unwrap();
        let img: Arc<dyn Image> = Arc::new(PixelImage::blank(1, 1));
        cache.set(key("a"), CacheValue::new(img.clone()));

        // Nothing fits the strong tier, but the value is reachable while
        // its image is alive.
        assert_eq!(cache.strong.entry_count(), 0);
        assert!(cache.get(&key("a")).is_some());
    }

    #[test]
    fn test_gpu_backed_values_are_cacheable() {
        let cache = MemoryCache::new(1024 * 1024);
        let texture: Arc<dyn Image> = Arc::new(TextureImage::new(7u32, 64, 64, 64 * 64 * 4));
        cache.set(key("tex"), CacheValue::new(texture));
        let read = cache.get(&key("tex")).unwrap();
        assert!(read.image.is_gpu_backed());
    }

    #[test]
    fn test_stats_combine_tiers() {
        let cache = MemoryCache::new(1024 * 1024);
        cache.set(key("a"), value());
        cache.get(&key("a"));
        cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.strong.hits, 1);
        // The strong miss fell through to the weak tier and missed there too.
        assert_eq!(stats.weak.misses, 1);
    }
}
