//! Synthetic Spectrum Scenarios
//!
//! Generates complex AWGN with a set of occupying carriers, either directly
//! as spectrum frames (the sensor's input) or as time-domain blocks for the
//! front end.
//!
//! An occupant's `snr_db` is the carrier power in each bin it covers,
//! relative to the noise power per bin. Both generators agree on this: a
//! time-domain block passed through `SpectrumFrontEnd` shows the same
//! per-bin powers as `spectrum_frame`.
//!
//! ## Usage
//!
//! ```rust
//! use specsense_sim::scenario::{Occupant, Scenario, ScenarioConfig};
//!
//! let config = ScenarioConfig {
//!     occupants: vec![Occupant::tone(250e3, 15.0)],
//!     seed: Some(7),
//!     ..Default::default()
//! };
//! let mut scenario = Scenario::new(config).unwrap();
//! let frame = scenario.spectrum_frame(1024);
//! assert_eq!(frame.len(), 1024);
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use specsense_core::segmenter::SegmentPlan;
use specsense_core::types::{power, Complex, IQBuffer, SenseError, SenseResult};
use std::f64::consts::PI;
use std::ops::Range;

/// A carrier occupying part of the band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Occupant {
    /// Centre frequency relative to the tuned frequency, in Hz
    pub offset_hz: f64,
    /// Occupied bandwidth in Hz (0 = single bin)
    pub bandwidth_hz: f64,
    /// Power per occupied bin relative to noise power per bin, in dB
    pub snr_db: f64,
}

impl Occupant {
    /// Narrowband carrier filling a single bin.
    pub fn tone(offset_hz: f64, snr_db: f64) -> Self {
        Self {
            offset_hz,
            bandwidth_hz: 0.0,
            snr_db,
        }
    }

    /// Carrier spread over `bandwidth_hz`.
    pub fn wideband(offset_hz: f64, bandwidth_hz: f64, snr_db: f64) -> Self {
        Self {
            offset_hz,
            bandwidth_hz,
            snr_db,
        }
    }
}

/// Scenario configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Complex noise power per sample (and per bin)
    pub noise_power: f64,
    /// Carriers present in the band
    pub occupants: Vec<Occupant>,
    /// RNG seed; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 2_400_000.0,
            noise_power: 1.0,
            occupants: Vec::new(),
            seed: None,
        }
    }
}

/// Scenario generator
#[derive(Debug)]
pub struct Scenario {
    config: ScenarioConfig,
    rng: StdRng,
    noise: Normal<f64>,
}

impl Scenario {
    /// Create a generator for `config`.
    pub fn new(config: ScenarioConfig) -> SenseResult<Self> {
        if !(config.sample_rate.is_finite() && config.sample_rate > 0.0) {
            return Err(SenseError::InvalidConfig(
                "scenario sample_rate must be positive".to_string(),
            ));
        }
        if !(config.noise_power.is_finite() && config.noise_power >= 0.0) {
            return Err(SenseError::InvalidConfig(
                "scenario noise_power must be finite and >= 0".to_string(),
            ));
        }
        if config
            .occupants
            .iter()
            .any(|o| !(o.offset_hz.is_finite() && o.bandwidth_hz >= 0.0 && o.snr_db.is_finite()))
        {
            return Err(SenseError::InvalidConfig(
                "occupant offset, bandwidth and snr must be finite, bandwidth >= 0".to_string(),
            ));
        }

        // Divide by 2 for I and Q
        let noise = Normal::new(0.0, (config.noise_power / 2.0).sqrt())
            .map_err(|e| SenseError::InvalidConfig(e.to_string()))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self { config, rng, noise })
    }

    /// Current configuration
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Bins covered by `occupant` in a frame of `len` bins (DC at `len / 2`),
    /// clipped to the frame.
    pub fn occupant_bins(&self, occupant: &Occupant, len: usize) -> Range<usize> {
        let bin_width = self.config.sample_rate / len as f64;
        let centre = (len / 2) as f64 + (occupant.offset_hz / bin_width).round();
        let half = (occupant.bandwidth_hz / bin_width / 2.0).floor();
        let lo = (centre - half).max(0.0);
        let hi = (centre + half + 1.0).min(len as f64);
        if hi <= lo {
            return 0..0;
        }
        lo as usize..hi as usize
    }

    /// Sub-bands of `plan` that contain at least one occupied bin.
    pub fn expected_sub_bands(&self, plan: &SegmentPlan) -> Vec<usize> {
        let spb = plan.samples_per_band();
        let len = plan.frame_len();
        plan.usable_segments()
            .iter()
            .enumerate()
            .filter(|&(_, &raw)| {
                let seg = raw * spb..(raw + 1) * spb;
                self.config.occupants.iter().any(|o| {
                    let bins = self.occupant_bins(o, len);
                    bins.start < seg.end && seg.start < bins.end
                })
            })
            .map(|(sub_band, _)| sub_band)
            .collect()
    }

    fn noise_sample(&mut self) -> Complex {
        Complex::new(
            self.noise.sample(&mut self.rng),
            self.noise.sample(&mut self.rng),
        )
    }

    /// One fft-shifted spectrum frame of `len` bins.
    pub fn spectrum_frame(&mut self, len: usize) -> IQBuffer {
        let mut frame: IQBuffer = (0..len).map(|_| self.noise_sample()).collect();
        for i in 0..self.config.occupants.len() {
            let occupant = self.config.occupants[i];
            let amplitude = (self.config.noise_power * power::db_to_linear(occupant.snr_db)).sqrt();
            for bin in self.occupant_bins(&occupant, len) {
                let phase = self.rng.gen_range(0.0..2.0 * PI);
                frame[bin] += Complex::from_polar(amplitude, phase);
            }
        }
        frame
    }

    /// One time-domain block of `len` samples.
    ///
    /// Each occupied bin carries a tone on the bin centre, scaled so the
    /// front end's unitary FFT recovers the configured per-bin power.
    pub fn time_block(&mut self, len: usize) -> IQBuffer {
        let mut block: IQBuffer = (0..len).map(|_| self.noise_sample()).collect();
        let half = (len / 2) as f64;
        for i in 0..self.config.occupants.len() {
            let occupant = self.config.occupants[i];
            let amplitude = (self.config.noise_power * power::db_to_linear(occupant.snr_db)
                / len as f64)
                .sqrt();
            for bin in self.occupant_bins(&occupant, len) {
                let cycles = bin as f64 - half;
                let phase = self.rng.gen_range(0.0..2.0 * PI);
                for (t, sample) in block.iter_mut().enumerate() {
                    let theta = 2.0 * PI * cycles * t as f64 / len as f64 + phase;
                    *sample += Complex::from_polar(amplitude, theta);
                }
            }
        }
        block
    }
}
