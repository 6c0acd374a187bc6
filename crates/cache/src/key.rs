//! Cache key and value model
//!
//! Keys pair a primary identity string with a map of extra string
//! dimensions (applied transformations, recorded output size). Values pair
//! an image handle with a small extras side-table. Both are immutable after
//! construction; replacing a cached image is a new value, never an in-place
//! mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::image::Image;

/// Extra string dimensions attached to a key or value
///
/// A `BTreeMap` gives order-insensitive equality and deterministic
/// iteration, so two keys built from the same extras always compare and
/// hash identically regardless of insertion order.
pub type Extras = BTreeMap<String, String>;

/// Identity of a cached image
///
/// Two keys are equal iff the identity string and the full extras map both
/// match. Keys are cheap to clone and safe to share between threads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    identity: String,
    extras: Extras,
}

impl CacheKey {
    /// Create a key with no extras
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            extras: Extras::new(),
        }
    }

    /// Create a key with extra dimensions
    pub fn with_extras(identity: impl Into<String>, extras: Extras) -> Self {
        Self {
            identity: identity.into(),
            extras,
        }
    }

    /// The primary identity string
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The extra dimensions attached to this key
    pub fn extras(&self) -> &Extras {
        &self.extras
    }
}

/// A cached image plus its metadata side-table
///
/// Equality is reference identity of the image handle plus the extras map:
/// two values are the same value only if they share the same underlying
/// image allocation.
#[derive(Debug, Clone)]
pub struct CacheValue {
    /// The image handle, jointly owned by cache tiers and consumers
    pub image: Arc<dyn Image>,

    /// Metadata recorded at write time (sampling state, disk-cache origin)
    pub extras: Extras,
}

impl CacheValue {
    /// Create a value with no extras
    pub fn new(image: Arc<dyn Image>) -> Self {
        Self {
            image,
            extras: Extras::new(),
        }
    }

    /// Create a value with a metadata side-table
    pub fn with_extras(image: Arc<dyn Image>, extras: Extras) -> Self {
        Self { image, extras }
    }

    /// Byte size of the underlying image, as used for budget accounting
    pub fn size_bytes(&self) -> usize {
        self.image.size_bytes()
    }
}

impl PartialEq for CacheValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image) && self.extras == other.extras
    }
}

impl Eq for CacheValue {}
