//! Memory-cache mediation for the request pipeline
//!
//! Sits between requests and the [`MemoryCache`]: derives cache keys
//! (source identity plus transformation extras, or an explicit override),
//! validates whether a cached candidate may answer a request given its
//! size, scale, precision, and sampling state, and gates reads/writes on
//! the request's cache policy.

use std::sync::Arc;

use tracing::{trace, warn};

use lightbox_cache::key::{CacheKey, CacheValue, Extras};
use lightbox_cache::memory::MemoryCache;

use crate::request::{ExecuteResult, ImageRequest};
use crate::size::{compute_size_multiplier, Dimension, Precision, Scale, Size};

/// Key-extra prefix for one applied transformation, suffixed with its
/// position in the transformation list
pub const EXTRA_TRANSFORMATION_INDEX: &str = "lightbox#transformation_";

/// Key extra recording the resolved target size of a transformed image
pub const EXTRA_TRANSFORMATION_SIZE: &str = "lightbox#transformation_size";

/// Value extra recording whether the decode downsampled the source
pub const EXTRA_IS_SAMPLED: &str = "lightbox#is_sampled";

/// Value extra recording the disk-cache entry the image was decoded from
pub const EXTRA_DISK_CACHE_KEY: &str = "lightbox#disk_cache_key";

/// Stand-in ratio operand for an unconstrained dimension
///
/// An undefined side enters the multiplier arithmetic as a hugely negative
/// pixel count, so it can never be the reason a candidate is accepted for
/// an upscale and never trips the downsample tolerance.
const DIMENSION_SENTINEL: f64 = i32::MIN as f64;

/// Mediates between the request pipeline and the memory cache
pub struct CacheService {
    cache: Arc<MemoryCache>,
}

impl CacheService {
    /// Create a service over a shared cache
    pub fn new(cache: Arc<MemoryCache>) -> Self {
        Self { cache }
    }

    /// Derive the cache key for a request
    ///
    /// An explicit override key is used directly with the request's
    /// explicit extras. Otherwise the key is the source's identity string
    /// plus, when transformations are present, one indexed extra per
    /// transformation (in application order) and the resolved target size.
    /// Returns `None` for sources with no identity, which are uncacheable.
    ///
    /// # Arguments
    ///
    /// * `request` - The request being resolved
    /// * `size` - The resolved target size for this execution
    pub fn new_cache_key(&self, request: &ImageRequest, size: Size) -> Option<CacheKey> {
        if let Some(override_key) = &request.memory_cache_key {
            return Some(CacheKey::with_extras(
                override_key.clone(),
                request.memory_cache_key_extras.clone(),
            ));
        }

        let identity = request.source.identity()?;
        let mut extras = request.memory_cache_key_extras.clone();
        if !request.transformations.is_empty() {
            for (index, transformation) in request.transformations.iter().enumerate() {
                extras.insert(
                    format!("{}{}", EXTRA_TRANSFORMATION_INDEX, index),
                    transformation.cache_key(),
                );
            }
            extras.insert(EXTRA_TRANSFORMATION_SIZE.to_string(), size.to_string());
        }
        Some(CacheKey::with_extras(identity, extras))
    }

    /// Fetch a cached value that satisfies the request, if any
    ///
    /// Returns `None` when the policy disables reads, the cache misses, or
    /// the cached candidate fails validation.
    pub fn get_cache_value(
        &self,
        request: &ImageRequest,
        key: &CacheKey,
        size: Size,
        scale: Scale,
    ) -> Option<CacheValue> {
        if !request.memory_cache_policy.read_enabled() {
            return None;
        }
        let value = self.cache.get(key)?;
        if self.is_cache_value_valid(request, key, &value, size, scale) {
            trace!(key = key.identity(), "memory cache hit");
            Some(value)
        } else {
            trace!(key = key.identity(), "memory cache candidate rejected");
            None
        }
    }

    /// Write a pipeline result back to the cache
    ///
    /// Skipped (returning false) when the policy disables writes, when
    /// there is no key to store under, or when the image is not safe to
    /// share between consumers.
    pub fn set_cache_value(
        &self,
        key: Option<&CacheKey>,
        request: &ImageRequest,
        result: &ExecuteResult,
    ) -> bool {
        if !request.memory_cache_policy.write_enabled() {
            return false;
        }
        let key = match key {
            Some(key) => key,
            None => return false,
        };
        if !result.image.is_shareable() {
            trace!(key = key.identity(), "skipping cache write of unshareable image");
            return false;
        }

        let mut extras = Extras::new();
        extras.insert(EXTRA_IS_SAMPLED.to_string(), result.is_sampled.to_string());
        if let Some(disk_key) = &result.disk_cache_key {
            extras.insert(EXTRA_DISK_CACHE_KEY.to_string(), disk_key.clone());
        }
        self.cache
            .set(key.clone(), CacheValue::with_extras(result.image.clone(), extras));
        true
    }

    /// Decide whether a cached candidate may answer a request
    fn is_cache_value_valid(
        &self,
        request: &ImageRequest,
        key: &CacheKey,
        value: &CacheValue,
        size: Size,
        scale: Scale,
    ) -> bool {
        // Platform compatibility comes before any size reasoning: a
        // GPU-only candidate is unusable when the request needs CPU access.
        if !request.allow_gpu_images && value.image.is_gpu_backed() {
            return false;
        }
        self.is_size_valid(request, key, value, size, scale)
    }

    /// Decide whether a candidate's recorded size satisfies the request
    fn is_size_valid(
        &self,
        request: &ImageRequest,
        key: &CacheKey,
        value: &CacheValue,
        size: Size,
        scale: Scale,
    ) -> bool {
        let is_sampled = match value.extras.get(EXTRA_IS_SAMPLED) {
            None => false,
            Some(raw) => match raw.parse::<bool>() {
                Ok(flag) => flag,
                Err(_) => {
                    // A malformed extra means the entry cannot be trusted;
                    // fail closed to a miss rather than guessing.
                    warn!(
                        key = key.identity(),
                        raw = raw.as_str(),
                        "malformed sampling extra on cached value"
                    );
                    return false;
                }
            },
        };

        // A sampled decode is a lossy reduction; it can never stand in for
        // the source's native resolution.
        if size.is_original() {
            return !is_sampled;
        }

        // Transformed images are not comparable by aspect ratio: the
        // transformation may not preserve it. Only a verbatim size match
        // can be reused.
        if let Some(recorded) = key.extras().get(EXTRA_TRANSFORMATION_SIZE) {
            return recorded == &size.to_string();
        }

        let src_width = value.image.width() as f64;
        let src_height = value.image.height() as f64;
        let dst_width = dimension_to_f64(size.width);
        let dst_height = dimension_to_f64(size.height);
        let multiplier =
            compute_size_multiplier(src_width, src_height, dst_width, dst_height, scale);

        let allow_inexact = allow_inexact_size(request);
        if allow_inexact {
            // Repeated downsampling rounds dimensions by up to a pixel;
            // never require upscaling for the tolerance check.
            let downsample = multiplier.min(1.0);
            if (dst_width - downsample * src_width).abs() <= 1.0
                || (dst_height - downsample * src_height).abs() <= 1.0
            {
                return true;
            }
        } else {
            let width_ok = size.width.px().map_or(true, |px| px == value.image.width());
            let height_ok = size.height.px().map_or(true, |px| px == value.image.height());
            if width_ok && height_ok {
                return true;
            }
        }

        if multiplier != 1.0 && !allow_inexact {
            return false;
        }
        if multiplier > 1.0 && is_sampled {
            return false;
        }
        true
    }
}

/// Whether the request tolerates off-by-a-bit candidate dimensions
///
/// `Automatic` resolves to exact here: without a measurable UI target
/// there is nothing to justify relaxing the request's stated size.
fn allow_inexact_size(request: &ImageRequest) -> bool {
    match request.precision {
        Precision::Inexact => true,
        Precision::Exact | Precision::Automatic => false,
    }
}

fn dimension_to_f64(dimension: Dimension) -> f64 {
    match dimension.px() {
        Some(px) => px as f64,
        None => DIMENSION_SENTINEL,
    }
}
