//! Decision & Persistence Tracker
//!
//! A sub-band is a *candidate* in a cycle when its energy exceeds the CFAR
//! threshold. It is reported *occupied* only after `required` consecutive
//! candidate cycles; one quiet cycle resets it.
//!
//! ```text
//! cycle:      1  2  3  4  5  6
//! candidate:  x  x  .  x  x  x      (required = 3)
//! counter:    1  2  0  1  2  3
//! occupied:   .  .  .  .  .  x
//! ```
//!
//! The optional histogram counts every candidate cycle per sub-band,
//! confirmed or not.

/// Per-sub-band persistence state.
#[derive(Debug, Clone)]
pub struct PersistenceTracker {
    required: usize,
    histogram_enabled: bool,
    counters: Vec<usize>,
    candidates: Vec<bool>,
    occupied: Vec<bool>,
    histogram: Vec<u64>,
}

impl PersistenceTracker {
    /// Create a tracker for `nsub_bands` sub-bands.
    pub fn new(nsub_bands: usize, required: usize, histogram_enabled: bool) -> Self {
        Self {
            required: required.max(1),
            histogram_enabled,
            counters: vec![0; nsub_bands],
            candidates: vec![false; nsub_bands],
            occupied: vec![false; nsub_bands],
            histogram: vec![0; nsub_bands],
        }
    }

    /// Threshold every energy and advance the counters.
    ///
    /// Returns the number of candidate sub-bands this cycle.
    pub fn update(&mut self, energies: &[f64], threshold: f64) -> usize {
        debug_assert_eq!(energies.len(), self.counters.len());
        let mut ncandidates = 0;
        for (k, &energy) in energies.iter().enumerate() {
            let candidate = energy > threshold;
            self.candidates[k] = candidate;
            if candidate {
                ncandidates += 1;
                self.counters[k] = (self.counters[k] + 1).min(self.required);
                if self.histogram_enabled {
                    self.histogram[k] += 1;
                }
            } else {
                self.counters[k] = 0;
            }
            self.occupied[k] = self.counters[k] >= self.required;
        }
        ncandidates
    }

    /// Confirmed occupancy from the last update.
    pub fn occupied(&self) -> &[bool] {
        &self.occupied
    }

    /// Candidate flags from the last update.
    pub fn candidates(&self) -> &[bool] {
        &self.candidates
    }

    /// Consecutive candidate counts.
    pub fn counters(&self) -> &[usize] {
        &self.counters
    }

    /// Cumulative candidate count for a sub-band.
    pub fn histogram(&self, sub_band: usize) -> Option<u64> {
        self.histogram.get(sub_band).copied()
    }

    /// Whole histogram.
    pub fn histogram_counts(&self) -> &[u64] {
        &self.histogram
    }

    /// Consecutive cycles needed to confirm occupancy.
    pub fn required(&self) -> usize {
        self.required
    }

    /// Change the persistence requirement, clamping running counters.
    pub fn set_required(&mut self, required: usize) {
        self.required = required.max(1);
        for (counter, occupied) in self.counters.iter_mut().zip(self.occupied.iter_mut()) {
            *counter = (*counter).min(self.required);
            *occupied = *counter >= self.required;
        }
    }

    /// Enable or pause histogram counting; counts are kept.
    pub fn set_histogram_enabled(&mut self, enabled: bool) {
        self.histogram_enabled = enabled;
    }

    /// Clear counters and decisions; the histogram is kept.
    pub fn reset(&mut self) {
        self.counters.fill(0);
        self.candidates.fill(false);
        self.occupied.fill(false);
    }
}
