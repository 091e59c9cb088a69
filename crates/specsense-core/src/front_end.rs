//! Spectrum Front End - time-domain I/Q blocks to sensor frames
//!
//! Transforms blocks of `L` I/Q samples into fft-shifted spectrum frames
//! (DC at bin `L/2`) scaled by `1/sqrt(L)`, so complex white noise of power
//! `σ²` comes out as bins of power `σ²` and the sensor's energies are in the
//! same units as the input.

use rustfft::{Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;

use crate::types::{Complex, IQBuffer, IQSample, SenseError, SenseResult};

/// Forward FFT with shift and unitary scaling.
pub struct SpectrumFrontEnd {
    size: usize,
    scale: f64,
    fft: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex>,
}

impl fmt::Debug for SpectrumFrontEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumFrontEnd")
            .field("size", &self.size)
            .finish()
    }
}

impl SpectrumFrontEnd {
    /// Plan a transform of `size` points.
    pub fn new(size: usize) -> SenseResult<Self> {
        if size == 0 {
            return Err(SenseError::InvalidConfig(
                "front end size must be > 0".to_string(),
            ));
        }
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Ok(Self {
            size,
            scale: 1.0 / (size as f64).sqrt(),
            fft,
            scratch,
        })
    }

    /// Transform size (L).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Transform one block into `out`.
    pub fn transform(&mut self, block: &[IQSample], out: &mut [IQSample]) -> SenseResult<()> {
        for len in [block.len(), out.len()] {
            if len != self.size {
                return Err(SenseError::FrameLength {
                    expected: self.size,
                    actual: len,
                });
            }
        }

        out.copy_from_slice(block);
        self.fft.process_with_scratch(out, &mut self.scratch);
        for bin in out.iter_mut() {
            *bin *= self.scale;
        }
        fft_shift_in_place(out);
        Ok(())
    }

    /// Transform one block into a new frame.
    pub fn frame(&mut self, block: &[IQSample]) -> SenseResult<IQBuffer> {
        let mut out = vec![Complex::new(0.0, 0.0); self.size];
        self.transform(block, &mut out)?;
        Ok(out)
    }

    /// Transform every whole block of `samples`; a trailing partial block is ignored.
    pub fn frames(&mut self, samples: &[IQSample]) -> Vec<IQBuffer> {
        let size = self.size;
        let mut frames = Vec::with_capacity(samples.len() / size);
        for block in samples.chunks_exact(size) {
            let mut out = block.to_vec();
            self.fft.process_with_scratch(&mut out, &mut self.scratch);
            for bin in out.iter_mut() {
                *bin *= self.scale;
            }
            fft_shift_in_place(&mut out);
            frames.push(out);
        }
        frames
    }
}

/// Move the zero-frequency bin to index `len / 2`.
pub fn fft_shift_in_place<T>(spectrum: &mut [T]) {
    let mid = spectrum.len() / 2;
    spectrum.rotate_left(mid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::power;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use std::f64::consts::PI;

    #[test]
    fn test_dc_lands_in_centre() {
        let mut fe = SpectrumFrontEnd::new(64).unwrap();
        let block = vec![Complex::new(1.0, 0.0); 64];
        let frame = fe.frame(&block).unwrap();
        assert!((frame[32].re - 8.0).abs() < 1e-9);
        let leakage: f64 = frame
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 32)
            .map(|(_, c)| c.norm())
            .sum();
        assert!(leakage < 1e-9);
    }

    #[test]
    fn test_tone_offset_from_centre() {
        let n = 128;
        let mut fe = SpectrumFrontEnd::new(n).unwrap();
        for k in [-20i32, -1, 5, 40] {
            let block: Vec<Complex> = (0..n)
                .map(|t| Complex::from_polar(1.0, 2.0 * PI * k as f64 * t as f64 / n as f64))
                .collect();
            let frame = fe.frame(&block).unwrap();
            let peak = frame
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
                .map(|(i, _)| i)
                .unwrap();
            assert_eq!(peak as i32, n as i32 / 2 + k);
        }
    }

    #[test]
    fn test_noise_power_preserved() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(21);
        let sigma2 = 2.5;
        let normal = Normal::new(0.0, (sigma2 / 2.0_f64).sqrt()).unwrap();
        let block: Vec<Complex> = (0..4096)
            .map(|_| Complex::new(normal.sample(&mut rng), normal.sample(&mut rng)))
            .collect();

        let mut fe = SpectrumFrontEnd::new(4096).unwrap();
        let frame = fe.frame(&block).unwrap();
        // Unitary scaling keeps total energy
        let diff = power::mean_power(&frame) - power::mean_power(&block);
        assert!(diff.abs() < 1e-9);
        assert!((power::mean_power(&frame) - sigma2).abs() < 0.15);
    }

    #[test]
    fn test_frames_ignores_partial_block() {
        let mut fe = SpectrumFrontEnd::new(16).unwrap();
        let samples = vec![Complex::new(0.5, -0.5); 40];
        let frames = fe.frames(&samples);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], fe.frame(&samples[16..32]).unwrap());
    }

    #[test]
    fn test_length_checks() {
        let mut fe = SpectrumFrontEnd::new(8).unwrap();
        let mut out = vec![Complex::new(0.0, 0.0); 8];
        assert!(matches!(
            fe.transform(&[Complex::new(0.0, 0.0); 4], &mut out),
            Err(SenseError::FrameLength { expected: 8, actual: 4 })
        ));
        assert!(SpectrumFrontEnd::new(0).is_err());
    }

    #[test]
    fn test_shift_even_and_odd() {
        let mut even = [0, 1, 2, 3];
        fft_shift_in_place(&mut even);
        assert_eq!(even, [2, 3, 0, 1]);
        let mut odd = [0, 1, 2, 3, 4];
        fft_shift_in_place(&mut odd);
        assert_eq!(odd, [2, 3, 4, 0, 1]);
    }
}
