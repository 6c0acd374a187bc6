//! Lightbox Cache Library
//!
//! Two-tier memory cache for decoded images: a byte-budgeted strong LRU
//! tier backed by a weak-reference overflow tier, with memory-pressure
//! trimming and adaptive budget detection.

pub mod budget;
pub mod error;
pub mod image;
pub mod key;
pub mod memory;
pub mod strong;
pub mod weak;

pub use budget::{budget_from_total_ram_bytes, default_cache_budget, MemoryPressure};
pub use error::ConfigError;
pub use image::{Image, PixelImage, TextureImage};
pub use key::{CacheKey, CacheValue, Extras};
pub use memory::{MemoryCache, MemoryCacheBuilder, MemoryCacheStats};
pub use strong::{CacheStats, StrongImageCache};
pub use weak::{WeakCacheStats, WeakImageCache};
