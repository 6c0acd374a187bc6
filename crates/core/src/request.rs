//! Image request model
//!
//! An [`ImageRequest`] describes what to load and how: the data source, the
//! target geometry, caching behavior, and the transformations to apply
//! after decode. The surrounding pipeline executes fetch/decode/transform;
//! this crate only consumes the request's cache-relevant fields.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use lightbox_cache::image::{Image, PixelImage};
use lightbox_cache::key::Extras;

use crate::size::{Precision, Scale, Size};

/// Where an image's data comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A remote URL
    Url(String),

    /// A file on disk
    File(PathBuf),

    /// Raw encoded bytes held in memory
    Bytes(Arc<[u8]>),

    /// An already-decoded image supplied by the caller
    ///
    /// Pixel content has no cheap stable fingerprint, so bitmap sources
    /// are uncacheable unless the request carries an explicit key.
    Bitmap(Arc<dyn Image>),
}

impl ImageSource {
    /// Stable identity string used as the cache key base
    ///
    /// Returns `None` for sources with no derivable identity.
    pub fn identity(&self) -> Option<String> {
        match self {
            ImageSource::Url(url) => Some(url.clone()),
            ImageSource::File(path) => Some(path.to_string_lossy().into_owned()),
            ImageSource::Bytes(bytes) => {
                let mut hasher = DefaultHasher::new();
                bytes.hash(&mut hasher);
                Some(format!("bytes:{:016x}", hasher.finish()))
            }
            ImageSource::Bitmap(_) => None,
        }
    }
}

/// Read/write behavior against the memory cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Read and write
    Enabled,

    /// Read but never write
    ReadOnly,

    /// Write but never read
    WriteOnly,

    /// Bypass the cache entirely
    Disabled,
}

impl CachePolicy {
    /// Whether reads are allowed
    pub fn read_enabled(self) -> bool {
        matches!(self, CachePolicy::Enabled | CachePolicy::ReadOnly)
    }

    /// Whether writes are allowed
    pub fn write_enabled(self) -> bool {
        matches!(self, CachePolicy::Enabled | CachePolicy::WriteOnly)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::Enabled
    }
}

/// A pixel-level operation applied after decode
///
/// `cache_key` must uniquely describe the transformation's effect on pixel
/// data: two transformations producing different output must report
/// different keys, since the key is all the cache sees.
pub trait Transformation: fmt::Debug + Send + Sync {
    /// Unique identifier for this transformation's effect
    fn cache_key(&self) -> String;

    /// Apply the transformation
    fn transform(&self, input: &PixelImage, target: Size) -> PixelImage;
}

/// A request to load an image
///
/// # Example
/// ```
/// use lightbox_core::request::ImageRequest;
/// use lightbox_core::size::{Precision, Size};
///
/// let request = ImageRequest::url("https://example.com/cat.png")
///     .with_size(Size::new(200, 200))
///     .with_precision(Precision::Inexact);
/// assert_eq!(request.size, Size::new(200, 200));
/// ```
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// The data source
    pub source: ImageSource,

    /// Target size; defaults to the source's original size
    pub size: Size,

    /// Scaling mode toward the target
    pub scale: Scale,

    /// How strictly cached candidates must match the target
    pub precision: Precision,

    /// Memory-cache read/write behavior
    pub memory_cache_policy: CachePolicy,

    /// Explicit cache key, overriding derivation
    pub memory_cache_key: Option<String>,

    /// Extra key dimensions, used verbatim with an explicit key and as the
    /// base map for derived keys
    pub memory_cache_key_extras: Extras,

    /// Transformations applied after decode, in order
    pub transformations: Vec<Arc<dyn Transformation>>,

    /// Whether GPU-only image representations may be returned
    pub allow_gpu_images: bool,
}

impl ImageRequest {
    /// Create a request with default options
    pub fn new(source: ImageSource) -> Self {
        Self {
            source,
            size: Size::ORIGINAL,
            scale: Scale::default(),
            precision: Precision::default(),
            memory_cache_policy: CachePolicy::default(),
            memory_cache_key: None,
            memory_cache_key_extras: Extras::new(),
            transformations: Vec::new(),
            allow_gpu_images: true,
        }
    }

    /// Create a request for a URL
    pub fn url(url: impl Into<String>) -> Self {
        Self::new(ImageSource::Url(url.into()))
    }

    /// Create a request for a file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(ImageSource::File(path.into()))
    }

    /// Set the target size
    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    /// Set the scaling mode
    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    /// Set the precision mode
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Set the memory-cache policy
    pub fn with_memory_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.memory_cache_policy = policy;
        self
    }

    /// Use an explicit cache key instead of deriving one
    pub fn with_memory_cache_key(mut self, key: impl Into<String>) -> Self {
        self.memory_cache_key = Some(key.into());
        self
    }

    /// Add one extra key dimension
    pub fn with_memory_cache_key_extra(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.memory_cache_key_extras
            .insert(name.into(), value.into());
        self
    }

    /// Append a transformation
    pub fn with_transformation(mut self, transformation: Arc<dyn Transformation>) -> Self {
        self.transformations.push(transformation);
        self
    }

    /// Replace the transformation list
    pub fn with_transformations(mut self, transformations: Vec<Arc<dyn Transformation>>) -> Self {
        self.transformations = transformations;
        self
    }

    /// Allow or forbid GPU-only image representations
    pub fn with_allow_gpu_images(mut self, allow: bool) -> Self {
        self.allow_gpu_images = allow;
        self
    }
}

/// What the pipeline produced for a request
///
/// Handed back for cache write-back after fetch/decode/transform complete.
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    /// The produced image
    pub image: Arc<dyn Image>,

    /// Whether the decode downsampled below the source's native size
    pub is_sampled: bool,

    /// Disk-cache entry the image was decoded from, if any
    pub disk_cache_key: Option<String>,
}

impl ExecuteResult {
    /// Create a result with no disk-cache origin
    pub fn new(image: Arc<dyn Image>, is_sampled: bool) -> Self {
        Self {
            image,
            is_sampled,
            disk_cache_key: None,
        }
    }

    /// Record the disk-cache entry the image came from
    pub fn with_disk_cache_key(mut self, key: impl Into<String>) -> Self {
        self.disk_cache_key = Some(key.into());
        self
    }
}
