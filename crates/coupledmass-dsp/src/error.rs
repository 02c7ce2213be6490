//! Configuration errors.
//!
//! Every failure in this crate is a configuration error caught at control
//! rate (constructors, `Engine::set_params`). The per-sample paths never
//! return errors.

use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Mass count outside the fixed storage capacity.
    #[error("mass count {count} outside {min}..={max}")]
    MassCount { count: usize, min: usize, max: usize },

    /// Sample rate that is zero, negative or not finite.
    #[error("invalid sample rate: {0} Hz")]
    SampleRate(f64),

    /// Block size of zero.
    #[error("invalid maximum block size: {0}")]
    BlockSize(usize),

    /// Physical quantity that must be strictly positive.
    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    /// Control parameter outside its documented range.
    #[error("parameter '{name}' = {value} outside {min}..={max}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// String geometry too coarse for the injection point and output tap.
    #[error("string {index} resolves to {segments} segments, need at least {min}")]
    TooFewSegments {
        index: usize,
        segments: usize,
        min: usize,
    },

    /// Mass-spring chain whose spring increments alone break the explicit
    /// scheme's stability limit.
    #[error("mass-spring chain unstable: stiffness bound {bound} exceeds {limit}")]
    Unstable { bound: f64, limit: f64 },

    /// Chorus delay excursion that does not fit the delay line.
    #[error("chorus depth {depth} samples does not fit a {capacity}-sample delay line")]
    ChorusDepth { depth: f64, capacity: usize },
}

impl ConfigError {
    /// Check that `value` is finite and strictly positive.
    pub fn require_positive(name: &'static str, value: f64) -> ConfigResult<f64> {
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(Self::NonPositive { name, value })
        }
    }

    /// Check that `value` lies in `min..=max`.
    pub fn require_range(name: &'static str, value: f64, min: f64, max: f64) -> ConfigResult<f64> {
        if value.is_finite() && value >= min && value <= max {
            Ok(value)
        } else {
            Err(Self::OutOfRange {
                name,
                value,
                min,
                max,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_positive() {
        assert_eq!(ConfigError::require_positive("decay", 2.0), Ok(2.0));
        assert!(ConfigError::require_positive("decay", 0.0).is_err());
        assert!(ConfigError::require_positive("decay", f64::NAN).is_err());
    }

    #[test]
    fn test_require_range_message() {
        let err = ConfigError::require_range("mass1", 11.0, 3.0, 10.0).unwrap_err();
        assert_eq!(err.to_string(), "parameter 'mass1' = 11 outside 3..=10");
    }
}
