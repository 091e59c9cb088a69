//! Frame Segmenter - per-sub-band energy from one spectrum frame
//!
//! Splits a frame of `L` spectrum bins into `R = L / S` raw segments of `S`
//! bins each, drops the segment(s) spoiled by the front-end artifact, and
//! adds the mean `|X|^2` of every remaining segment into an accumulation
//! buffer.
//!
//! The artifact position depends on the tuner:
//!
//! ```text
//!   E4000 (zero-IF)              R820T (low-IF)
//!   artifact on segment edge     artifact at segment centre
//!        v                               v
//!   |----|----|----|             |----|----|----|
//!    k-1   k   k+1                k-1   k   k+1
//! ```
//!
//! The excluded region is `useless_band` Hz wide (never less than one bin)
//! centred on the artifact; every segment it touches is skipped.
//!
//! ## Example
//!
//! ```rust
//! use specsense_core::config::SensorConfig;
//! use specsense_core::segmenter::SegmentPlan;
//!
//! let plan = SegmentPlan::new(&SensorConfig::default()).unwrap();
//! assert_eq!(plan.nraw_segments(), 16);
//! assert_eq!(plan.nsub_bands(), 15);
//! assert_eq!(plan.excluded_segments(), 8..9);
//! ```

use std::ops::Range;

use crate::config::{Downconverter, SensorConfig};
use crate::types::{power, IQSample, SenseError, SenseResult};

impl Downconverter {
    /// Excluded bin range `[lo, hi)` for this tuner, possibly outside the frame.
    fn excluded_bins(&self, band_location: usize, samples_per_band: usize, width: usize) -> Range<i64> {
        match self {
            Downconverter::E4k => zero_if_region(band_location, samples_per_band, width),
            Downconverter::R820t => low_if_region(band_location, samples_per_band, width),
        }
    }
}

/// Zero-IF tuners put the DC artifact on the first bin of the segment.
fn zero_if_region(band_location: usize, samples_per_band: usize, width: usize) -> Range<i64> {
    let centre = (band_location * samples_per_band) as i64;
    centred(centre, width)
}

/// Low-IF tuners put the spur in the middle of the segment.
fn low_if_region(band_location: usize, samples_per_band: usize, width: usize) -> Range<i64> {
    let centre = (band_location * samples_per_band + samples_per_band / 2) as i64;
    centred(centre, width)
}

fn centred(centre: i64, width: usize) -> Range<i64> {
    let lo = centre - (width / 2) as i64;
    lo..lo + width as i64
}

/// Resolved segmentation geometry for one configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    samples_per_band: usize,
    ninput_samples: usize,
    bin_width: f64,
    excluded: Range<usize>,
    /// Raw segment index of each usable sub-band, ascending.
    usable: Vec<usize>,
}

impl SegmentPlan {
    /// Build the plan, rejecting excluded regions that fall outside the frame.
    pub fn new(config: &SensorConfig) -> SenseResult<Self> {
        let spb = config.samples_per_band;
        if spb == 0 || config.ninput_samples % spb != 0 {
            return Err(SenseError::InvalidConfig(format!(
                "samples_per_band {} must evenly divide ninput_samples {}",
                spb, config.ninput_samples
            )));
        }
        let nraw = config.ninput_samples / spb;
        if config.band_location >= nraw {
            return Err(SenseError::ExcludedBandOutOfRange {
                segment: config.band_location as i64,
                nsegments: nraw,
            });
        }

        let bin_width = config.bin_width();
        // Anything wider than the frame spills over an edge whatever its centre
        let width = (config.useless_band / bin_width)
            .ceil()
            .clamp(1.0, (config.ninput_samples + 1) as f64) as usize;
        let bins = config.downconverter.excluded_bins(config.band_location, spb, width);

        let first = bins.start.div_euclid(spb as i64);
        let last = (bins.end - 1).div_euclid(spb as i64);
        for segment in [first, last] {
            if segment < 0 || segment >= nraw as i64 {
                return Err(SenseError::ExcludedBandOutOfRange {
                    segment,
                    nsegments: nraw,
                });
            }
        }

        let excluded = first as usize..last as usize + 1;
        let usable = (0..nraw).filter(|k| !excluded.contains(k)).collect();

        Ok(Self {
            samples_per_band: spb,
            ninput_samples: config.ninput_samples,
            bin_width,
            excluded,
            usable,
        })
    }

    /// Number of usable sub-bands (N).
    pub fn nsub_bands(&self) -> usize {
        self.usable.len()
    }

    /// Number of raw segments before exclusion.
    pub fn nraw_segments(&self) -> usize {
        self.ninput_samples / self.samples_per_band
    }

    /// Raw segments dropped because of the front-end artifact.
    pub fn excluded_segments(&self) -> Range<usize> {
        self.excluded.clone()
    }

    /// Raw segment index of each usable sub-band.
    pub fn usable_segments(&self) -> &[usize] {
        &self.usable
    }

    /// Bins per sub-band.
    pub fn samples_per_band(&self) -> usize {
        self.samples_per_band
    }

    /// Expected frame length.
    pub fn frame_len(&self) -> usize {
        self.ninput_samples
    }

    /// Centre frequency of a sub-band relative to the tuned frequency, in Hz.
    pub fn center_offset_hz(&self, sub_band: usize) -> Option<f64> {
        let raw = *self.usable.get(sub_band)?;
        let centre_bin = raw * self.samples_per_band + self.samples_per_band / 2;
        Some((centre_bin as f64 - (self.ninput_samples / 2) as f64) * self.bin_width)
    }

    /// Add the mean bin power of every usable segment of `frame` into `acc`.
    ///
    /// `frame` must hold `frame_len()` bins and `acc` `nsub_bands()` slots.
    pub fn accumulate(&self, frame: &[IQSample], acc: &mut [f64]) {
        debug_assert_eq!(frame.len(), self.ninput_samples);
        debug_assert_eq!(acc.len(), self.usable.len());
        let spb = self.samples_per_band;
        for (slot, &raw) in acc.iter_mut().zip(&self.usable) {
            *slot += power::mean_power(&frame[raw * spb..(raw + 1) * spb]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Complex;

    fn config(downconverter: Downconverter, band_location: usize, useless_band: f64) -> SensorConfig {
        SensorConfig {
            sample_rate: 1024.0, // 1 Hz bins
            ninput_samples: 1024,
            samples_per_band: 64,
            downconverter,
            band_location,
            useless_band,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_if_single_bin_excludes_one_segment() {
        let plan = SegmentPlan::new(&config(Downconverter::E4k, 8, 0.0)).unwrap();
        assert_eq!(plan.nsub_bands(), 15);
        assert_eq!(plan.excluded_segments(), 8..9);
        assert!(!plan.usable_segments().contains(&8));
    }

    #[test]
    fn test_zero_if_wide_region_spills_into_previous_segment() {
        // 10 bins centred on bin 512 -> [507, 517) touches segments 7 and 8
        let plan = SegmentPlan::new(&config(Downconverter::E4k, 8, 10.0)).unwrap();
        assert_eq!(plan.excluded_segments(), 7..9);
        assert_eq!(plan.nsub_bands(), 14);
    }

    #[test]
    fn test_low_if_region_stays_inside_segment() {
        let plan = SegmentPlan::new(&config(Downconverter::R820t, 3, 10.0)).unwrap();
        assert_eq!(plan.excluded_segments(), 3..4);
        assert_eq!(plan.nsub_bands(), 15);
    }

    #[test]
    fn test_region_outside_frame_rejected() {
        // Zero-IF at segment 0 with a wide region reaches below bin 0
        let err = SegmentPlan::new(&config(Downconverter::E4k, 0, 10.0)).unwrap_err();
        assert_eq!(
            err,
            SenseError::ExcludedBandOutOfRange {
                segment: -1,
                nsegments: 16
            }
        );

        // Low-IF region wider than the tail of the last segment
        assert!(SegmentPlan::new(&config(Downconverter::R820t, 15, 100.0)).is_err());
        assert!(SegmentPlan::new(&config(Downconverter::E4k, 16, 0.0)).is_err());
    }

    #[test]
    fn test_huge_region_rejected_without_overflow() {
        for downconverter in [Downconverter::E4k, Downconverter::R820t] {
            for band_location in [0, 8, 15] {
                for useless_band in [3.3e22, 1e300, f64::MAX] {
                    let err = SegmentPlan::new(&config(downconverter, band_location, useless_band)).unwrap_err();
                    assert!(
                        matches!(err, SenseError::ExcludedBandOutOfRange { nsegments: 16, .. }),
                        "{:?}",
                        err
                    );
                }
            }
        }

        let wide = SensorConfig {
            useless_band: 3.3e22,
            ..Default::default()
        };
        assert!(matches!(
            wide.validate(),
            Err(SenseError::ExcludedBandOutOfRange { .. })
        ));
    }

    #[test]
    fn test_accumulate_mean_power_per_band() {
        let cfg = SensorConfig {
            sample_rate: 16.0,
            ninput_samples: 16,
            samples_per_band: 4,
            band_location: 2,
            ..Default::default()
        };
        let plan = SegmentPlan::new(&cfg).unwrap();
        assert_eq!(plan.usable_segments(), &[0, 1, 3]);

        // Segment k holds bins of magnitude k+1
        let frame: Vec<Complex> = (0..16)
            .map(|i| Complex::new((i / 4 + 1) as f64, 0.0))
            .collect();
        let mut acc = vec![0.0; plan.nsub_bands()];
        plan.accumulate(&frame, &mut acc);
        plan.accumulate(&frame, &mut acc);
        assert_eq!(acc, vec![2.0, 8.0, 32.0]);
    }

    #[test]
    fn test_center_offsets() {
        let plan = SegmentPlan::new(&config(Downconverter::E4k, 8, 0.0)).unwrap();
        // Sub-band 0 is raw segment 0: centre bin 32, DC at 512
        assert_eq!(plan.center_offset_hz(0), Some(-480.0));
        // Sub-band 8 is raw segment 9 because segment 8 is excluded
        assert_eq!(plan.center_offset_hz(8), Some(96.0));
        assert_eq!(plan.center_offset_hz(15), None);
    }
}
