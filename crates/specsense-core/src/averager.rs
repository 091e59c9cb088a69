//! Temporal Averager - integrates sub-band energies over I frames
//!
//! Averaging I frames shrinks the spread of each sub-band energy estimate
//! by `1/sqrt(I)`, which is what lets the CFAR threshold sit closer to the
//! noise floor for the same false-alarm probability.
//!
//! ## Example
//!
//! ```rust
//! use specsense_core::averager::Averager;
//!
//! let mut avg = Averager::new(2, 2);
//! avg.accumulator_mut()[0] += 1.0;
//! assert!(avg.finish_frame().is_none());
//! avg.accumulator_mut()[0] += 3.0;
//! assert_eq!(avg.finish_frame().unwrap(), &[2.0, 0.0]);
//! ```

/// Accumulates segmented energies and finalizes them every `nframes` frames.
#[derive(Debug, Clone)]
pub struct Averager {
    /// Frames per cycle (I).
    nframes: usize,
    /// Frames accumulated in the current cycle.
    count: usize,
    /// Running sums per sub-band.
    sums: Vec<f64>,
    /// Last finalized vector.
    finalized: Vec<f64>,
}

impl Averager {
    /// Create an averager for `nsub_bands` sub-bands over `nframes` frames.
    pub fn new(nsub_bands: usize, nframes: usize) -> Self {
        Self {
            nframes: nframes.max(1),
            count: 0,
            sums: vec![0.0; nsub_bands],
            finalized: vec![0.0; nsub_bands],
        }
    }

    /// Buffer the segmenter adds the current frame into.
    pub fn accumulator_mut(&mut self) -> &mut [f64] {
        &mut self.sums
    }

    /// Close the current frame.
    ///
    /// Returns the finalized averages when this frame completes a cycle, and
    /// clears the accumulation buffer for the next one.
    pub fn finish_frame(&mut self) -> Option<&[f64]> {
        self.count += 1;
        if self.count < self.nframes {
            return None;
        }

        let scale = 1.0 / self.nframes as f64;
        for (out, sum) in self.finalized.iter_mut().zip(self.sums.iter_mut()) {
            *out = *sum * scale;
            *sum = 0.0;
        }
        self.count = 0;
        Some(&self.finalized)
    }

    /// Frames accumulated so far in the current cycle.
    pub fn frames_pending(&self) -> usize {
        self.count
    }

    /// True when the next `finish_frame` completes a cycle.
    pub fn completes_on_next(&self) -> bool {
        self.count + 1 >= self.nframes
    }

    /// True at a cycle boundary (nothing accumulated).
    pub fn at_boundary(&self) -> bool {
        self.count == 0
    }

    /// Integration count (I).
    pub fn nframes(&self) -> usize {
        self.nframes
    }

    /// Change I; only honoured at a cycle boundary.
    pub fn set_nframes(&mut self, nframes: usize) -> bool {
        if !self.at_boundary() {
            return false;
        }
        self.nframes = nframes.max(1);
        true
    }

    /// Discard the partial cycle.
    pub fn reset(&mut self) {
        self.sums.fill(0.0);
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_output_until_count_reached() {
        let mut avg = Averager::new(3, 4);
        for _ in 0..3 {
            avg.accumulator_mut().iter_mut().for_each(|s| *s += 1.0);
            assert!(avg.finish_frame().is_none());
        }
        assert_eq!(avg.frames_pending(), 3);
        assert!(avg.completes_on_next());
    }

    #[test]
    fn test_finalize_divides_and_clears() {
        let mut avg = Averager::new(2, 3);
        for v in [1.0, 2.0, 6.0] {
            avg.accumulator_mut()[0] += v;
            avg.accumulator_mut()[1] += 2.0 * v;
            let done = avg.finish_frame().map(|f| f.to_vec());
            if v == 6.0 {
                assert_eq!(done, Some(vec![3.0, 6.0]));
            } else {
                assert!(done.is_none());
            }
        }
        assert!(avg.at_boundary());
        assert_eq!(avg.accumulator_mut(), &[0.0, 0.0]);
    }

    #[test]
    fn test_single_frame_cycles() {
        let mut avg = Averager::new(1, 1);
        avg.accumulator_mut()[0] = 5.0;
        assert_eq!(avg.finish_frame().unwrap(), &[5.0]);
        avg.accumulator_mut()[0] = 7.0;
        assert_eq!(avg.finish_frame().unwrap(), &[7.0]);
    }

    #[test]
    fn test_set_nframes_only_at_boundary() {
        let mut avg = Averager::new(1, 2);
        avg.finish_frame();
        assert!(!avg.set_nframes(5));
        assert_eq!(avg.nframes(), 2);
        avg.finish_frame();
        assert!(avg.set_nframes(5));
        assert_eq!(avg.nframes(), 5);
    }
}
