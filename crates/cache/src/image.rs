//! Image handle abstraction shared by the cache tiers
//!
//! The cache stores images behind `Arc<dyn Image>` so that software bitmaps
//! and GPU-resident textures can live in the same tiers. The weak tier holds
//! `Weak<dyn Image>` handles, so an image is reclaimed as soon as the last
//! strong owner (a cache entry or a UI consumer) releases it.

use std::any::Any;
use std::fmt;

/// A decoded image as seen by the cache tiers.
///
/// Implementations must report a stable byte size: the value returned at
/// insertion time is recorded for budget accounting and is not re-queried.
pub trait Image: fmt::Debug + Send + Sync {
    /// Width in pixels
    fn width(&self) -> u32;

    /// Height in pixels
    fn height(&self) -> u32;

    /// Memory footprint in bytes, used for budget accounting
    fn size_bytes(&self) -> usize;

    /// Whether the image may be handed to multiple consumers at once
    ///
    /// Non-shareable images (e.g. buffers a decoder intends to reuse in
    /// place) are never written to the cache.
    fn is_shareable(&self) -> bool {
        true
    }

    /// Whether the image exists only as a GPU resource
    ///
    /// Requests that need CPU access to pixel data reject GPU-backed
    /// candidates during validation.
    fn is_gpu_backed(&self) -> bool {
        false
    }
}

/// A software-decoded image with RGBA pixel data
#[derive(Debug, Clone)]
pub struct PixelImage {
    /// RGBA pixel data (4 bytes per pixel)
    pub pixels: Vec<u8>,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    shareable: bool,
}

impl PixelImage {
    /// Create a new image from RGBA pixel data
    ///
    /// # Arguments
    ///
    /// * `pixels` - RGBA pixel data (4 bytes per pixel)
    /// * `width` - Width in pixels
    /// * `height` - Height in pixels
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            shareable: true,
        }
    }

    /// Create a blank (transparent) image of the given dimensions
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![0; (width as usize) * (height as usize) * 4], width, height)
    }

    /// Mark whether this image may be shared between consumers
    pub fn with_shareable(mut self, shareable: bool) -> Self {
        self.shareable = shareable;
        self
    }
}

impl Image for PixelImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn size_bytes(&self) -> usize {
        self.pixels.len() + std::mem::size_of::<Self>()
    }

    fn is_shareable(&self) -> bool {
        self.shareable
    }
}

/// A GPU-resident image
///
/// Wraps a platform-specific texture handle as a trait object so that
/// different GPU backends (Metal, Vulkan, DirectX) can share the cache.
pub struct TextureImage {
    /// Opaque handle to the GPU texture (platform-specific)
    handle: Box<dyn Any + Send + Sync>,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Estimated VRAM usage in bytes
    estimated_bytes: usize,
}

impl TextureImage {
    /// Create a new GPU-resident image
    ///
    /// # Arguments
    ///
    /// * `handle` - Platform-specific GPU texture handle
    /// * `width` - Width in pixels
    /// * `height` - Height in pixels
    /// * `estimated_bytes` - Estimated VRAM usage in bytes
    pub fn new<T: 'static + Send + Sync>(
        handle: T,
        width: u32,
        height: u32,
        estimated_bytes: usize,
    ) -> Self {
        Self {
            handle: Box::new(handle),
            width,
            height,
            estimated_bytes,
        }
    }

    /// Get a reference to the underlying texture handle
    ///
    /// Returns `None` if the type doesn't match.
    pub fn handle<T: 'static>(&self) -> Option<&T> {
        self.handle.downcast_ref::<T>()
    }
}

impl fmt::Debug for TextureImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("estimated_bytes", &self.estimated_bytes)
            .finish()
    }
}

impl Image for TextureImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn size_bytes(&self) -> usize {
        self.estimated_bytes
    }

    fn is_gpu_backed(&self) -> bool {
        true
    }
}
