//! Request geometry: dimensions, scale, and precision
//!
//! Requests describe their target as a width/height pair where each side is
//! either a pixel count or undefined ("whatever the source provides"). A
//! request with both sides undefined asks for the source's original size.

use std::fmt;

/// One side of a target size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// A concrete pixel count
    Pixels(u32),

    /// No constraint on this side
    Undefined,
}

impl Dimension {
    /// The pixel count, if this side is constrained
    pub fn px(self) -> Option<u32> {
        match self {
            Dimension::Pixels(px) => Some(px),
            Dimension::Undefined => None,
        }
    }

    /// Whether this side is unconstrained
    pub fn is_undefined(self) -> bool {
        matches!(self, Dimension::Undefined)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Pixels(px) => write!(f, "{}", px),
            Dimension::Undefined => write!(f, "undefined"),
        }
    }
}

/// A target size for a request
///
/// Renders as `"WxH"`; the rendered form is recorded in cache keys for
/// transformed images and compared verbatim during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    /// Target width
    pub width: Dimension,

    /// Target height
    pub height: Dimension,
}

impl Size {
    /// The source's native size: both sides unconstrained
    pub const ORIGINAL: Size = Size {
        width: Dimension::Undefined,
        height: Dimension::Undefined,
    };

    /// A fully constrained pixel size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: Dimension::Pixels(width),
            height: Dimension::Pixels(height),
        }
    }

    /// Whether this is the original (fully unconstrained) size
    pub fn is_original(self) -> bool {
        self.width.is_undefined() && self.height.is_undefined()
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How a candidate image is scaled toward the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scale {
    /// The image fits entirely within the target (multiplier = min ratio)
    Fit,

    /// The image covers the target, possibly overflowing one side
    /// (multiplier = max ratio)
    Fill,
}

impl Default for Scale {
    fn default() -> Self {
        Scale::Fit
    }
}

/// How strictly a cached candidate's size must match the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Dimensions must match the request exactly
    Exact,

    /// Dimensions may differ within the downsample tolerance
    Inexact,

    /// Resolved by the consumer; treated as exact at this layer, where no
    /// measurable UI target exists to justify relaxing it
    Automatic,
}

impl Default for Precision {
    fn default() -> Self {
        Precision::Automatic
    }
}

/// Scaling factor between a source image and a requested size
///
/// Ratios are requested/source per side. `Fill` takes the larger ratio
/// (cover the target), `Fit` the smaller (stay inside it).
///
/// # Example
/// ```
/// use lightbox_core::size::{compute_size_multiplier, Scale};
///
/// let fit = compute_size_multiplier(400.0, 200.0, 200.0, 200.0, Scale::Fit);
/// assert_eq!(fit, 0.5);
/// let fill = compute_size_multiplier(400.0, 200.0, 200.0, 200.0, Scale::Fill);
/// assert_eq!(fill, 1.0);
/// ```
pub fn compute_size_multiplier(
    src_width: f64,
    src_height: f64,
    dst_width: f64,
    dst_height: f64,
    scale: Scale,
) -> f64 {
    let width_ratio = dst_width / src_width;
    let height_ratio = dst_height / src_height;
    match scale {
        Scale::Fill => width_ratio.max(height_ratio),
        Scale::Fit => width_ratio.min(height_ratio),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_display() {
        assert_eq!(Size::new(100, 200).to_string(), "100x200");
        assert_eq!(Size::ORIGINAL.to_string(), "undefinedxundefined");
        let half = Size {
            width: Dimension::Pixels(50),
            height: Dimension::Undefined,
        };
        assert_eq!(half.to_string(), "50xundefined");
    }

    #[test]
    fn test_is_original_requires_both_sides() {
        assert!(Size::ORIGINAL.is_original());
        assert!(!Size::new(1, 1).is_original());
        let half = Size {
            width: Dimension::Undefined,
            height: Dimension::Pixels(10),
        };
        assert!(!half.is_original());
    }

    #[test]
    fn test_multiplier_upscale_and_downscale() {
        // Upscaling doubles on both sides.
        assert_eq!(
            compute_size_multiplier(50.0, 50.0, 100.0, 100.0, Scale::Fit),
            2.0
        );
        // Downscaling a square to half.
        assert_eq!(
            compute_size_multiplier(200.0, 200.0, 100.0, 100.0, Scale::Fill),
            0.5
        );
    }

    #[test]
    fn test_multiplier_fit_fill_asymmetry() {
        // A wide source into a square target: fit obeys the width,
        // fill obeys the height.
        let fit = compute_size_multiplier(400.0, 100.0, 200.0, 200.0, Scale::Fit);
        let fill = compute_size_multiplier(400.0, 100.0, 200.0, 200.0, Scale::Fill);
        assert_eq!(fit, 0.5);
        assert_eq!(fill, 2.0);
    }
}
