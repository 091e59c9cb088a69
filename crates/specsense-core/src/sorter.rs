//! Energy Sorter - ascending order statistics of the sub-band energies
//!
//! Keeps each energy paired with its sub-band index so decisions made on
//! ranks can be mapped back to frequency.

use std::cmp::Ordering;

use crate::types::{SenseError, SenseResult};

/// One sorted entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedEnergy {
    /// Finalized energy of the sub-band.
    pub energy: f64,
    /// Sub-band index in frequency order.
    pub sub_band: usize,
}

/// Reusable sort buffer sized once for N sub-bands.
#[derive(Debug, Clone)]
pub struct EnergySorter {
    ranked: Vec<RankedEnergy>,
    energies: Vec<f64>,
}

impl EnergySorter {
    /// Create a sorter for `nsub_bands` sub-bands.
    pub fn new(nsub_bands: usize) -> Self {
        Self {
            ranked: Vec::with_capacity(nsub_bands),
            energies: Vec::with_capacity(nsub_bands),
        }
    }

    /// Sort `energies` ascending.
    ///
    /// Fails with [`SenseError::DegenerateInput`] for fewer than two
    /// sub-bands. NaN entries sort last.
    pub fn sort(&mut self, energies: &[f64]) -> SenseResult<&[RankedEnergy]> {
        if energies.len() < 2 {
            return Err(SenseError::DegenerateInput {
                nsub_bands: energies.len(),
            });
        }

        self.ranked.clear();
        self.ranked.extend(
            energies
                .iter()
                .enumerate()
                .map(|(sub_band, &energy)| RankedEnergy { energy, sub_band }),
        );
        self.ranked.sort_by(|a, b| cmp_energy(a.energy, b.energy));

        self.energies.clear();
        self.energies.extend(self.ranked.iter().map(|r| r.energy));
        Ok(&self.ranked)
    }

    /// Energies of the last sort, ascending.
    pub fn sorted_energies(&self) -> &[f64] {
        &self.energies
    }
}

/// Total order with NaN last, regardless of sign bit.
fn cmp_energy(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.total_cmp(&b),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_sorted_is_ascending_permutation() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut sorter = EnergySorter::new(64);
        for _ in 0..50 {
            let n = rng.gen_range(2..64);
            let energies: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..10.0)).collect();
            let ranked = sorter.sort(&energies).unwrap().to_vec();

            assert!(ranked.windows(2).all(|w| w[0].energy <= w[1].energy));

            // Each index appears once and maps back to its energy
            let mut seen = vec![false; n];
            for r in &ranked {
                assert!(!seen[r.sub_band]);
                seen[r.sub_band] = true;
                assert_eq!(energies[r.sub_band], r.energy);
            }
            assert!(seen.iter().all(|&s| s));

            let mut expected = energies.clone();
            expected.sort_by(|a, b| a.total_cmp(b));
            assert_eq!(sorter.sorted_energies(), expected.as_slice());
        }
    }

    #[test]
    fn test_ties_keep_all_indices() {
        let mut sorter = EnergySorter::new(4);
        let ranked = sorter.sort(&[1.0, 1.0, 0.5, 1.0]).unwrap();
        assert_eq!(ranked[0].sub_band, 2);
        let mut rest: Vec<usize> = ranked[1..].iter().map(|r| r.sub_band).collect();
        rest.sort_unstable();
        assert_eq!(rest, vec![0, 1, 3]);
    }

    #[test]
    fn test_degenerate_input() {
        let mut sorter = EnergySorter::new(1);
        assert_eq!(
            sorter.sort(&[3.0]).unwrap_err(),
            SenseError::DegenerateInput { nsub_bands: 1 }
        );
        assert!(sorter.sort(&[]).is_err());
    }

    #[test]
    fn test_nan_sorts_last() {
        let mut sorter = EnergySorter::new(3);
        let ranked = sorter.sort(&[f64::NAN, 2.0, 1.0]).unwrap();
        assert_eq!(ranked[0].energy, 1.0);
        assert_eq!(ranked[1].energy, 2.0);
        assert!(ranked[2].energy.is_nan());
    }
}
