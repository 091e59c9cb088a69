//! # Spectrum Sensing Core Library
//!
//! Energy-detection spectrum sensing with a constant false-alarm rate
//! (CFAR) threshold. A frame of spectrum bins is split into sub-bands, the
//! per-sub-band energy is averaged over several frames, a noise reference is
//! estimated from the quietest sub-bands, and every sub-band whose energy
//! stays above the scaled reference for enough consecutive cycles is
//! reported occupied.
//!
//! ## Signal Flow
//!
//! ```text
//! I/Q → Front End (FFT) → Segmenter → Averager → Sorter → Noise Reference
//!                                                              │
//!              Decisions ← Persistence ← Threshold (α·zref) ←──┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use specsense_core::prelude::*;
//!
//! let config = SensorConfig {
//!     nframes_to_average: 2,
//!     nframes_to_check: 3,
//!     ..Default::default()
//! };
//! let mut sensor = SpectrumSensor::new(config).unwrap();
//!
//! let input = vec![Complex::new(1.0, 0.0); 4 * 1024];
//! let mut decisions = vec![0.0; 2 * sensor.nsub_bands()];
//! let status = sensor.work(&input, &mut decisions, None).unwrap();
//! assert_eq!(status.consumed, 4 * 1024);
//! assert_eq!(status.produced, 2 * 15);
//! ```

pub mod averager;
pub mod config;
pub mod decision;
pub mod front_end;
pub mod noise_reference;
pub mod observe;
pub mod segmenter;
pub mod sensor;
pub mod sorter;
pub mod stats;
pub mod threshold;
pub mod types;

pub use config::{ConfigError, Downconverter, SensorConfig, SpecsenseConfig};
pub use front_end::SpectrumFrontEnd;
pub use segmenter::SegmentPlan;
pub use sensor::{CycleReport, SpectrumSensor, WorkStatus};
pub use threshold::{ThresholdCalculator, ThresholdDesign};
pub use types::{Complex, IQBuffer, IQSample, SenseError, SenseResult};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{Downconverter, SensorConfig};
    pub use crate::front_end::SpectrumFrontEnd;
    pub use crate::sensor::{CycleReport, SpectrumSensor, WorkStatus};
    pub use crate::types::{Complex, IQSample, SenseError, SenseResult};
}
