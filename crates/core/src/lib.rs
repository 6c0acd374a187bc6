//! Lightbox Core Library
//!
//! Request model and cache mediation for the image pipeline: image
//! sources, target sizes and scaling rules, transformations, and the
//! service that derives cache keys and validates cached candidates
//! against a request.

pub mod cache_service;
pub mod request;
pub mod size;

pub use cache_service::{
    CacheService, EXTRA_DISK_CACHE_KEY, EXTRA_IS_SAMPLED, EXTRA_TRANSFORMATION_INDEX,
    EXTRA_TRANSFORMATION_SIZE,
};
pub use request::{CachePolicy, ExecuteResult, ImageRequest, ImageSource, Transformation};
pub use size::{compute_size_multiplier, Dimension, Precision, Scale, Size};
