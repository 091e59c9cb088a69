//! CFAR Threshold Calculator
//!
//! Chooses the scale factor α so that declaring a sub-band occupied when
//! its energy exceeds `α · zref` happens with probability at most `pfa` on
//! noise alone, given `K = I · S` averaged bins per decision. Also reports
//! what that α buys in detection probability.
//!
//! `zref` is not the noise power. It is the mean of the `n` lowest of `N`
//! sub-band energies, so it is both noisy and biased low. With
//! [`Reference::Trimmed`] the design accounts for both: the ratio of a
//! noise-only energy to a mean of `n` energies follows `F(2K, 2nK)`, and the
//! trimming bias `b` (expected mean of the lowest `n` of the other `N - 1`
//! energies) rescales the threshold, giving `α = F⁻¹(1 - pfa) / b`.
//! [`Reference::Exact`] treats `zref` as the true noise power.
//!
//! The false-alarm ceiling has precedence over the detection floor: α is
//! never lowered to chase `pfd`. When the detection probability at the
//! configured margin (`tcme`, dB above the noise power) falls short of
//! `pfd`, the design says so and carries the SNR that would have been
//! needed. Detection is evaluated at the expected reference level `b`.
//!
//! ## Example
//!
//! ```rust
//! use specsense_core::threshold::{Reference, ThresholdCalculator};
//!
//! let calc = ThresholdCalculator::new(64);
//! let exact = calc.scale_factor(0.01, 1, Reference::Exact).unwrap();
//! let trimmed = Reference::Trimmed { segments: 14, nsub_bands: 15 };
//! let alpha = calc.scale_factor(0.01, 1, trimmed).unwrap();
//! assert!(calc.false_alarm_probability(alpha, 1.0, 1, trimmed).unwrap() <= 0.01);
//! assert!(alpha > exact && alpha < 2.0);
//! ```

use crate::stats::{gamma_isf, gamma_ratio_isf, gamma_ratio_sf, gamma_sf, noncentral_gamma_sf, trimmed_mean_bias};
use crate::types::{power, SenseError, SenseResult};

/// Bisection steps for the minimum detectable SNR.
const SNR_BISECTION_STEPS: usize = 100;
/// Upper bound on the SNR search, linear.
const MAX_SNR: f64 = 1e9;
/// Designs kept before the cache is flushed.
const DESIGN_CACHE_SIZE: usize = 16;

/// How the noise reference relates to the true noise power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    /// `zref` is the noise power.
    Exact,
    /// `zref` is the mean of the `segments` lowest of `nsub_bands` energies.
    Trimmed { segments: usize, nsub_bands: usize },
}

/// Threshold design for one (pfa, pfd, tcme, I, reference) combination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdDesign {
    /// Scale factor applied to zref.
    pub alpha: f64,
    /// False-alarm probability achieved by `alpha`.
    pub achieved_pfa: f64,
    /// Detection probability at the `tcme` margin.
    pub achieved_pd: f64,
    /// Smallest per-bin SNR (linear) reaching `pfd` at `alpha`.
    pub min_detectable_snr: f64,
    /// Whether `achieved_pd >= pfd`.
    pub pd_floor_met: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DesignKey {
    pfa: f64,
    pfd: f64,
    tcme: f64,
    integration: usize,
    reference: Reference,
}

/// Noise-only statistics for one integration count and reference.
#[derive(Debug, Clone, Copy)]
struct Model {
    /// Gamma shape of one energy.
    k: f64,
    /// Sub-bands averaged into zref, `None` for an exact reference.
    segments: Option<f64>,
    /// Expected zref over the noise power.
    bias: f64,
}

impl Model {
    fn pfa(&self, alpha: f64) -> f64 {
        match self.segments {
            None => gamma_sf(self.k, self.k * alpha),
            Some(n) => gamma_ratio_sf(self.k, n, alpha * self.bias),
        }
    }

    fn alpha(&self, pfa: f64) -> f64 {
        match self.segments {
            None => gamma_isf(self.k, pfa) / self.k,
            Some(n) => gamma_ratio_isf(self.k, n, pfa) / self.bias,
        }
    }

    fn pd(&self, alpha: f64, snr: f64) -> f64 {
        noncentral_gamma_sf(self.k, self.k * snr, self.k * alpha * self.bias)
    }
}

/// Evaluates CFAR thresholds for sub-bands of `samples_per_band` bins.
#[derive(Debug, Clone)]
pub struct ThresholdCalculator {
    samples_per_band: usize,
    cached: Vec<(DesignKey, ThresholdDesign)>,
}

impl ThresholdCalculator {
    /// Create a calculator for sub-bands of `samples_per_band` bins.
    pub fn new(samples_per_band: usize) -> Self {
        Self {
            samples_per_band: samples_per_band.max(1),
            cached: Vec::new(),
        }
    }

    /// Bins per sub-band.
    pub fn samples_per_band(&self) -> usize {
        self.samples_per_band
    }

    fn model(&self, integration: usize, reference: Reference) -> SenseResult<Model> {
        if integration == 0 {
            return Err(SenseError::InvalidConfig(
                "integration count must be >= 1".to_string(),
            ));
        }
        let k = (integration * self.samples_per_band) as f64;

        match reference {
            Reference::Exact => Ok(Model {
                k,
                segments: None,
                bias: 1.0,
            }),
            Reference::Trimmed {
                segments,
                nsub_bands,
            } => {
                if nsub_bands < 2 {
                    return Err(SenseError::DegenerateInput { nsub_bands });
                }
                if segments == 0 || segments >= nsub_bands {
                    return Err(SenseError::InvalidConfig(format!(
                        "noise reference must use 1..{} sub-bands, got {}",
                        nsub_bands, segments
                    )));
                }
                // A decided energy above the reference is compared against the
                // lowest `segments` of the other sub-bands
                Ok(Model {
                    k,
                    segments: Some(segments as f64),
                    bias: trimmed_mean_bias(k, segments, nsub_bands - 1),
                })
            }
        }
    }

    /// Probability that a noise-only energy exceeds `alpha · zref`.
    pub fn false_alarm_probability(
        &self,
        alpha: f64,
        zref: f64,
        integration: usize,
        reference: Reference,
    ) -> SenseResult<f64> {
        check_zref(zref)?;
        check_alpha(alpha)?;
        Ok(self.model(integration, reference)?.pfa(alpha))
    }

    /// Probability that an energy with per-bin SNR `snr` (linear, relative
    /// to the noise power) exceeds `alpha · zref`.
    pub fn detection_probability(
        &self,
        alpha: f64,
        zref: f64,
        integration: usize,
        snr: f64,
        reference: Reference,
    ) -> SenseResult<f64> {
        check_zref(zref)?;
        check_alpha(alpha)?;
        if !(snr.is_finite() && snr >= 0.0) {
            return Err(SenseError::InvalidConfig(format!(
                "signal-to-noise ratio must be finite and >= 0, got {}",
                snr
            )));
        }
        Ok(self.model(integration, reference)?.pd(alpha, snr))
    }

    /// Smallest α whose false-alarm probability does not exceed `pfa`.
    pub fn scale_factor(&self, pfa: f64, integration: usize, reference: Reference) -> SenseResult<f64> {
        check_pfa(pfa)?;
        Ok(self.model(integration, reference)?.alpha(pfa))
    }

    /// Smallest per-bin SNR (linear) for which detection probability at
    /// `alpha` reaches `pfd`. Returns `MAX_SNR` if unreachable.
    pub fn min_detectable_snr(
        &self,
        alpha: f64,
        integration: usize,
        pfd: f64,
        reference: Reference,
    ) -> SenseResult<f64> {
        check_alpha(alpha)?;
        let model = self.model(integration, reference)?;
        Ok(min_snr(&model, alpha, pfd))
    }

    /// Threshold design for the given targets, cached per key.
    ///
    /// `tcme_db` is the hypothesized primary-user SNR in dB at which `pfd`
    /// is checked.
    pub fn design(
        &mut self,
        pfa: f64,
        pfd: f64,
        tcme_db: f64,
        integration: usize,
        reference: Reference,
    ) -> SenseResult<ThresholdDesign> {
        let key = DesignKey {
            pfa,
            pfd,
            tcme: tcme_db,
            integration,
            reference,
        };
        if let Some((_, design)) = self.cached.iter().find(|(k, _)| *k == key) {
            return Ok(*design);
        }

        check_pfa(pfa)?;
        let model = self.model(integration, reference)?;
        let alpha = model.alpha(pfa);
        let achieved_pd = model.pd(alpha, power::db_to_linear(tcme_db));

        let design = ThresholdDesign {
            alpha,
            achieved_pfa: model.pfa(alpha),
            achieved_pd,
            min_detectable_snr: min_snr(&model, alpha, pfd),
            pd_floor_met: achieved_pd >= pfd,
        };
        if self.cached.len() >= DESIGN_CACHE_SIZE {
            self.cached.clear();
        }
        self.cached.push((key, design));
        Ok(design)
    }
}

fn min_snr(model: &Model, alpha: f64, pfd: f64) -> f64 {
    let pd = |snr: f64| model.pd(alpha, snr);
    if pd(0.0) >= pfd {
        return 0.0;
    }

    let (mut lo, mut hi) = (0.0, 1.0);
    while pd(hi) < pfd {
        lo = hi;
        hi *= 2.0;
        if hi > MAX_SNR {
            return MAX_SNR;
        }
    }
    for _ in 0..SNR_BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if pd(mid) >= pfd {
            hi = mid;
        } else {
            lo = mid;
        }
        if hi - lo <= 1e-9 * hi {
            break;
        }
    }
    hi
}

fn check_pfa(pfa: f64) -> SenseResult<()> {
    if pfa > 0.0 && pfa < 1.0 {
        Ok(())
    } else {
        Err(SenseError::InvalidConfig(format!(
            "pfa must be in (0, 1), got {}",
            pfa
        )))
    }
}

fn check_zref(zref: f64) -> SenseResult<()> {
    if zref.is_finite() && zref > 0.0 {
        Ok(())
    } else {
        Err(SenseError::DegenerateNoiseReference(zref))
    }
}

fn check_alpha(alpha: f64) -> SenseResult<()> {
    if alpha.is_finite() && alpha >= 0.0 {
        Ok(())
    } else {
        Err(SenseError::InvalidConfig(format!(
            "scale factor must be finite and >= 0, got {}",
            alpha
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Gamma};

    const TRIMMED: Reference = Reference::Trimmed {
        segments: 14,
        nsub_bands: 15,
    };

    #[test]
    fn test_scale_factor_meets_pfa() {
        let calc = ThresholdCalculator::new(64);
        for reference in [Reference::Exact, TRIMMED] {
            for &pfa in &[0.1, 0.01, 0.001] {
                for integration in [1, 4, 10] {
                    let alpha = calc.scale_factor(pfa, integration, reference).unwrap();
                    let achieved = calc
                        .false_alarm_probability(alpha, 3.7, integration, reference)
                        .unwrap();
                    assert!(achieved <= pfa, "pfa {} I {}: {}", pfa, integration, achieved);
                    assert!(achieved > 0.99 * pfa);
                }
            }
        }
    }

    #[test]
    fn test_single_bin_single_frame_is_exponential() {
        let calc = ThresholdCalculator::new(1);
        let alpha = calc.scale_factor(0.01, 1, Reference::Exact).unwrap();
        assert!((alpha - 100.0_f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_estimated_reference_raises_alpha() {
        let calc = ThresholdCalculator::new(8);
        let exact = calc.scale_factor(0.01, 1, Reference::Exact).unwrap();
        // All other sub-bands in the reference: only the F spread applies
        let full = calc
            .scale_factor(0.01, 1, Reference::Trimmed { segments: 63, nsub_bands: 64 })
            .unwrap();
        // Trimming lowers zref further
        let trimmed = calc
            .scale_factor(0.01, 1, Reference::Trimmed { segments: 56, nsub_bands: 64 })
            .unwrap();
        assert!(full > exact);
        assert!(trimmed > full);
        // Fewer reference sub-bands means a noisier reference
        let few = calc
            .scale_factor(0.01, 1, Reference::Trimmed { segments: 3, nsub_bands: 4 })
            .unwrap();
        assert!(few > full);
    }

    #[test]
    fn test_trimmed_reference_holds_pfa_on_noise() {
        // 56 lowest of 64 sub-bands, 8 bins each
        let (nsub_bands, segments, bins) = (64usize, 56usize, 8usize);
        let pfa = 0.01;
        let reference = Reference::Trimmed { segments, nsub_bands };
        let alpha = ThresholdCalculator::new(bins).scale_factor(pfa, 1, reference).unwrap();

        let energy = Gamma::new(bins as f64, 1.0 / bins as f64).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(99);
        let cycles = 4000;
        let mut hits = 0usize;
        let mut sorted = vec![0.0; nsub_bands];
        for _ in 0..cycles {
            let energies: Vec<f64> = (0..nsub_bands).map(|_| energy.sample(&mut rng)).collect();
            sorted.copy_from_slice(&energies);
            sorted.sort_by(|a, b| a.total_cmp(b));
            let zref = sorted[..segments].iter().sum::<f64>() / segments as f64;
            hits += energies.iter().filter(|&&e| e > alpha * zref).count();
        }
        // 2560 expected hits, standard deviation about 2%
        let rate = hits as f64 / (cycles * nsub_bands) as f64;
        assert!(rate <= pfa * 1.1 && rate >= pfa * 0.85, "rate {} for pfa {}", rate, pfa);

        // The exact-reference alpha is far too permissive here
        let naive = ThresholdCalculator::new(bins).scale_factor(pfa, 1, Reference::Exact).unwrap();
        assert!(naive < 0.95 * alpha);
    }

    #[test]
    fn test_more_integration_lowers_alpha() {
        let calc = ThresholdCalculator::new(16);
        for reference in [Reference::Exact, TRIMMED] {
            let a1 = calc.scale_factor(0.01, 1, reference).unwrap();
            let a8 = calc.scale_factor(0.01, 8, reference).unwrap();
            assert!(a8 < a1);
            assert!(a8 > 1.0);
        }
    }

    #[test]
    fn test_pfa_non_increasing_in_integration() {
        let calc = ThresholdCalculator::new(1);
        for reference in [Reference::Exact, TRIMMED] {
            for &alpha in &[1.5, 2.0, 3.0] {
                let mut prev = 1.0;
                for integration in 1..=40 {
                    let pfa = calc
                        .false_alarm_probability(alpha, 0.25, integration, reference)
                        .unwrap();
                    assert!(
                        pfa <= prev + 1e-12,
                        "alpha {} I {}: {} > {}",
                        alpha,
                        integration,
                        pfa,
                        prev
                    );
                    prev = pfa;
                }
            }
        }
    }

    #[test]
    fn test_pfa_independent_of_zref_scale() {
        let calc = ThresholdCalculator::new(32);
        let a = calc.false_alarm_probability(1.4, 1e-6, 2, TRIMMED).unwrap();
        let b = calc.false_alarm_probability(1.4, 1e3, 2, TRIMMED).unwrap();
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn test_detection_probability_bounds() {
        let calc = ThresholdCalculator::new(64);
        let alpha = calc.scale_factor(0.01, 1, Reference::Exact).unwrap();
        let pfa = calc.false_alarm_probability(alpha, 1.0, 1, Reference::Exact).unwrap();
        let pd0 = calc.detection_probability(alpha, 1.0, 1, 0.0, Reference::Exact).unwrap();
        assert!((pd0 - pfa).abs() < 1e-12);

        let pd_strong = calc.detection_probability(alpha, 1.0, 1, 4.0, Reference::Exact).unwrap();
        assert!(pd_strong > 0.999);

        let pd_weak = calc.detection_probability(alpha, 1.0, 1, 0.2, Reference::Exact).unwrap();
        assert!(pd_weak > pfa && pd_weak < pd_strong);

        // Same alpha against a trimmed reference sits lower, so detects more
        let narrow = Reference::Trimmed { segments: 10, nsub_bands: 15 };
        let pd_trimmed = calc.detection_probability(alpha, 1.0, 1, 0.2, narrow).unwrap();
        assert!(pd_trimmed > pd_weak);
    }

    #[test]
    fn test_degenerate_guards() {
        let calc = ThresholdCalculator::new(8);
        assert_eq!(
            calc.false_alarm_probability(2.0, 0.0, 1, Reference::Exact).unwrap_err(),
            SenseError::DegenerateNoiseReference(0.0)
        );
        assert!(calc.false_alarm_probability(2.0, f64::NAN, 1, TRIMMED).is_err());
        assert!(calc.false_alarm_probability(2.0, 1.0, 0, Reference::Exact).is_err());
        assert!(calc.detection_probability(-1.0, 1.0, 1, 1.0, Reference::Exact).is_err());
        assert!(calc.scale_factor(0.0, 1, Reference::Exact).is_err());
        assert!(matches!(
            calc.scale_factor(0.01, 1, Reference::Trimmed { segments: 1, nsub_bands: 1 }),
            Err(SenseError::DegenerateInput { nsub_bands: 1 })
        ));
        assert!(calc
            .scale_factor(0.01, 1, Reference::Trimmed { segments: 15, nsub_bands: 15 })
            .is_err());
    }

    #[test]
    fn test_min_detectable_snr() {
        let calc = ThresholdCalculator::new(64);
        let alpha = calc.scale_factor(0.01, 1, TRIMMED).unwrap();
        let snr = calc.min_detectable_snr(alpha, 1, 0.9, TRIMMED).unwrap();
        let pd = calc.detection_probability(alpha, 1.0, 1, snr, TRIMMED).unwrap();
        assert!(pd >= 0.9 && pd < 0.9 + 1e-6, "pd = {}", pd);
        // Averaging more frames lowers the SNR needed
        let alpha4 = calc.scale_factor(0.01, 4, TRIMMED).unwrap();
        assert!(calc.min_detectable_snr(alpha4, 4, 0.9, TRIMMED).unwrap() < snr);
    }

    #[test]
    fn test_design_precedence_keeps_pfa() {
        let mut calc = ThresholdCalculator::new(64);
        // A 0 dB margin is easy to detect, -10 dB is not
        let easy = calc.design(0.01, 0.9, 0.0, 1, TRIMMED).unwrap();
        assert!(easy.pd_floor_met);
        let hard = calc.design(0.01, 0.9, -10.0, 1, TRIMMED).unwrap();
        assert!(!hard.pd_floor_met);
        // Alpha is set by pfa alone
        assert_eq!(easy.alpha, hard.alpha);
        assert!(hard.achieved_pfa <= 0.01);
        assert!(hard.min_detectable_snr > power::db_to_linear(-10.0));
    }

    #[test]
    fn test_design_cache() {
        let mut calc = ThresholdCalculator::new(64);
        let a = calc.design(0.01, 0.9, 3.0, 2, TRIMMED).unwrap();
        let b = calc.design(0.01, 0.9, 3.0, 2, TRIMMED).unwrap();
        assert_eq!(a, b);
        let c = calc.design(0.001, 0.9, 3.0, 2, TRIMMED).unwrap();
        assert!(c.alpha > a.alpha);
        let narrow = Reference::Trimmed { segments: 10, nsub_bands: 15 };
        let d = calc.design(0.01, 0.9, 3.0, 2, narrow).unwrap();
        assert_ne!(d.alpha, a.alpha);
        assert_eq!(calc.design(0.01, 0.9, 3.0, 2, TRIMMED).unwrap(), a);
    }
}
