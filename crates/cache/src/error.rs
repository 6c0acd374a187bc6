//! Cache configuration errors

use thiserror::Error;

/// Errors raised while building a cache from configuration
///
/// Cache operations themselves never fail; only construction from invalid
/// configuration is rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A relative budget outside the accepted `(0.0, 1.0]` range
    #[error("cache size percent must be in (0.0, 1.0], got {0}")]
    InvalidSizePercent(f64),
}
