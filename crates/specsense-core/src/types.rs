//! Core types for spectrum sensing
//!
//! The sensor consumes frames of complex spectrum bins and produces one
//! real-valued decision per sub-band. Both are represented with `f64`
//! precision throughout the crate.
//!
//! ```text
//!   bin index:  0 ........ L/2 ........ L-1
//!   frequency: -fs/2       DC        +fs/2
//!              |--seg 0--|--seg 1--| ... |--seg R-1--|
//! ```

use num_complex::Complex64;

use crate::config::ConfigError;

/// Type alias for complex numbers using f64 precision
pub type Complex = Complex64;

/// A single complex spectrum bin (or time-domain I/Q sample)
pub type IQSample = Complex64;

/// A buffer of complex samples
pub type IQBuffer = Vec<IQSample>;

/// Result type for sensing operations
pub type SenseResult<T> = Result<T, SenseError>;

/// Errors that can occur while configuring or running the sensor
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SenseError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Excluded band selects segment {segment} outside 0..{nsegments}")]
    ExcludedBandOutOfRange { segment: i64, nsegments: usize },

    #[error("Unknown downconverter variant: {0}")]
    UnknownDownconverter(String),

    #[error("Degenerate input: {nsub_bands} usable sub-band(s), at least 2 required")]
    DegenerateInput { nsub_bands: usize },

    #[error("Degenerate noise reference: {0}")]
    DegenerateNoiseReference(f64),

    #[error("Frame length mismatch: expected {expected}, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Power helpers used by the segmenter and the simulator.
pub mod power {
    use super::IQSample;

    /// Mean of `|x|^2` over a slice, 0 for an empty slice.
    #[inline]
    pub fn mean_power(samples: &[IQSample]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|s| s.norm_sqr()).sum::<f64>() / samples.len() as f64
    }

    /// Convert linear power to dB. Returns -200 for zero/negative input.
    #[inline]
    pub fn linear_to_db(p: f64) -> f64 {
        if p <= 0.0 {
            -200.0
        } else {
            10.0 * p.log10()
        }
    }

    /// Convert dB to linear power.
    #[inline]
    pub fn db_to_linear(db: f64) -> f64 {
        10.0_f64.powf(db / 10.0)
    }
}
