//! Noise Reference Estimator - order-statistics noise floor
//!
//! Estimates the noise power `zref` from the quietest sub-bands so that
//! occupied sub-bands do not inflate it. Works on the ascending energies
//! produced by the sorter, by consecutive mean excision:
//!
//! 1. Only the lowest `m` ranks are candidates (`nsegs_to_check`, or
//!    `N - max(1, N/8)` when zero). The highest rank is never a candidate.
//! 2. Seed the clean set with the lowest `max(1, m/4)` ranks.
//! 3. Grow or shrink the clean set to every candidate at or below
//!    `alpha · mean(clean set)` until its size settles.
//!
//! Energies above the final prefix never touch the estimate. The mean of a
//! truncated prefix is biased low, which the threshold design corrects for
//! given `n_segs`. The estimate degrades once more of the band is occupied
//! than the candidate limit leaves out.

use crate::types::{SenseError, SenseResult};

/// Noise floor estimate for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseReference {
    /// Mean energy of the clean set.
    pub zref: f64,
    /// Number of sub-bands in the clean set, `1 <= n_segs < N`.
    pub n_segs: usize,
}

/// Highest number of ranks that may enter the clean set, in `1..N`.
pub fn candidate_limit(nsub_bands: usize, nsegs_to_check: usize) -> usize {
    if nsub_bands < 2 {
        return nsub_bands.min(1);
    }
    let limit = if nsegs_to_check == 0 {
        nsub_bands - (nsub_bands / 8).max(1)
    } else {
        nsegs_to_check
    };
    limit.clamp(1, nsub_bands - 1)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Estimate `zref` from `sorted` (ascending) energies.
///
/// `alpha` is the clean-set acceptance factor, normally the CFAR scale
/// factor for the configured false-alarm probability.
pub fn estimate(sorted: &[f64], nsegs_to_check: usize, alpha: f64) -> SenseResult<NoiseReference> {
    let n = sorted.len();
    if n < 2 {
        return Err(SenseError::DegenerateInput { nsub_bands: n });
    }

    let limit = candidate_limit(n, nsegs_to_check);
    let candidates = &sorted[..limit];

    let mut count = (limit / 4).max(1);
    let mut zref = mean(&candidates[..count]);
    for _ in 0..n {
        if !(zref.is_finite() && zref > 0.0) {
            break;
        }
        let cutoff = alpha * zref;
        let next = candidates.partition_point(|&e| e <= cutoff).max(1);
        if next == count {
            break;
        }
        count = next;
        zref = mean(&candidates[..count]);
    }

    if !(zref.is_finite() && zref > 0.0) {
        return Err(SenseError::DegenerateNoiseReference(zref));
    }

    Ok(NoiseReference {
        zref,
        n_segs: count,
    })
}
