//! Spectrum Sensor - streaming CFAR occupancy detector
//!
//! Runs the full pipeline on whole spectrum frames:
//!
//! ```text
//! frame ─► segment ─► average (I frames) ─► sort ─► zref ─► α·zref ─► persist
//!                                                                      │
//!                          decisions (N per cycle) ◄───────────────────┤
//!                          occupancy rate (optional) ◄─────────────────┘
//! ```
//!
//! Configuration changes are validated as a whole snapshot and staged; the
//! sensor switches to a staged snapshot only between averaging cycles.
//!
//! ## Example
//!
//! ```rust
//! use specsense_core::config::SensorConfig;
//! use specsense_core::sensor::SpectrumSensor;
//! use specsense_core::types::Complex;
//!
//! let mut sensor = SpectrumSensor::new(SensorConfig::default()).unwrap();
//! let frame = vec![Complex::new(1.0, 0.0); 1024];
//! let report = sensor.process_frame(&frame).unwrap().unwrap();
//! assert_eq!(report.candidates, 0);
//! assert_eq!(sensor.nsub_bands(), 15);
//! ```

use crate::averager::Averager;
use crate::config::{Downconverter, SensorConfig};
use crate::decision::PersistenceTracker;
use crate::noise_reference;
use crate::segmenter::SegmentPlan;
use crate::sorter::EnergySorter;
use crate::threshold::{Reference, ThresholdCalculator};
use crate::types::{power, IQSample, SenseError, SenseResult};

/// Outcome of one completed averaging cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    /// Index of the cycle since the sensor was built or its geometry changed.
    pub cycle: u64,
    /// Noise reference power.
    pub zref: f64,
    /// Sub-bands used for the noise reference.
    pub n_zref_segs: usize,
    /// CFAR scale factor.
    pub alpha: f64,
    /// Decision threshold `alpha * zref`.
    pub threshold: f64,
    /// False-alarm probability of `alpha`.
    pub achieved_pfa: f64,
    /// Detection probability at the `tcme` margin.
    pub achieved_pd: f64,
    /// Per-bin SNR (linear) needed to reach `pfd`.
    pub min_detectable_snr: f64,
    /// Whether the detection floor is met at the margin.
    pub pd_floor_met: bool,
    /// Sub-bands above threshold this cycle.
    pub candidates: usize,
    /// Sub-bands confirmed occupied.
    pub noccupied: usize,
    /// `candidates / N`.
    pub occupancy_rate: f64,
}

/// Items consumed from the input and produced on the outputs by `work`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkStatus {
    pub consumed: usize,
    pub produced: usize,
}

/// Streaming energy-detection spectrum sensor.
#[derive(Debug, Clone)]
pub struct SpectrumSensor {
    /// Most recently staged snapshot.
    requested: SensorConfig,
    /// Snapshot in effect.
    active: SensorConfig,
    pending: bool,
    plan: SegmentPlan,
    averager: Averager,
    sorter: EnergySorter,
    threshold: ThresholdCalculator,
    tracker: PersistenceTracker,
    last_report: Option<CycleReport>,
    cycles: u64,
    /// Last completed cycle missed the detection floor.
    pd_shortfall: bool,
}

impl SpectrumSensor {
    /// Build a sensor from a validated configuration.
    pub fn new(config: SensorConfig) -> SenseResult<Self> {
        config.validate()?;
        let plan = SegmentPlan::new(&config)?;
        let n = plan.nsub_bands();
        if n < 2 {
            tracing::warn!(
                nsub_bands = n,
                "fewer than two usable sub-bands, detection will be skipped"
            );
        }

        Ok(Self {
            averager: Averager::new(n, config.nframes_to_average),
            sorter: EnergySorter::new(n),
            threshold: ThresholdCalculator::new(config.samples_per_band),
            tracker: PersistenceTracker::new(n, config.nframes_to_check, config.debug_histogram),
            plan,
            requested: config.clone(),
            active: config,
            pending: false,
            last_report: None,
            cycles: 0,
            pd_shortfall: false,
        })
    }

    /// Feed one spectrum frame.
    ///
    /// Returns a report when the frame completes an averaging cycle and
    /// detection ran. Cycles with fewer than two sub-bands or a degenerate
    /// noise reference are skipped and yield `None`.
    pub fn process_frame(&mut self, frame: &[IQSample]) -> SenseResult<Option<CycleReport>> {
        let report = self.step(frame)?;
        if self.averager.at_boundary() {
            self.apply_pending()?;
        }
        Ok(report)
    }

    /// Streaming entry point.
    ///
    /// Consumes whole frames from `input` and writes `N` decisions (1.0
    /// occupied, 0.0 vacant) to `decisions` per completed cycle. With
    /// `output_far`, `rates` receives the cycle's occupancy rate in each of
    /// the same `N` slots. Stops before a cycle-completing frame whose
    /// output would not fit.
    pub fn work(
        &mut self,
        input: &[IQSample],
        decisions: &mut [f64],
        mut rates: Option<&mut [f64]>,
    ) -> SenseResult<WorkStatus> {
        let mut status = WorkStatus::default();

        loop {
            let frame_len = self.plan.frame_len();
            let n = self.plan.nsub_bands();
            if input.len() - status.consumed < frame_len {
                break;
            }
            let emit_rate = self.active.output_far && rates.is_some();
            if self.averager.completes_on_next() {
                let room = decisions.len() - status.produced;
                let rate_room = match rates.as_deref() {
                    Some(r) if emit_rate => r.len().saturating_sub(status.produced),
                    _ => usize::MAX,
                };
                if room < n || rate_room < n {
                    break;
                }
            }

            let frame = &input[status.consumed..status.consumed + frame_len];
            let report = self.step(frame)?;
            status.consumed += frame_len;

            if let Some(report) = report {
                let out = &mut decisions[status.produced..status.produced + n];
                for (slot, &occupied) in out.iter_mut().zip(self.tracker.occupied()) {
                    *slot = if occupied { 1.0 } else { 0.0 };
                }
                if emit_rate {
                    if let Some(r) = rates.as_deref_mut() {
                        r[status.produced..status.produced + n].fill(report.occupancy_rate);
                    }
                }
                status.produced += n;
            }

            if self.averager.at_boundary() {
                self.apply_pending()?;
            }
        }

        Ok(status)
    }

    /// Segment one frame and, if the cycle completes, run detection.
    fn step(&mut self, frame: &[IQSample]) -> SenseResult<Option<CycleReport>> {
        let expected = self.plan.frame_len();
        if frame.len() != expected {
            return Err(SenseError::FrameLength {
                expected,
                actual: frame.len(),
            });
        }

        self.plan.accumulate(frame, self.averager.accumulator_mut());
        let Some(energies) = self.averager.finish_frame() else {
            return Ok(None);
        };

        let cycle = self.cycles;
        self.cycles += 1;
        let outcome = detect(
            &self.active,
            cycle,
            energies,
            &mut self.sorter,
            &mut self.threshold,
            &mut self.tracker,
        );
        let report = match outcome {
            Ok(report) => report,
            Err(e @ (SenseError::DegenerateInput { .. } | SenseError::DegenerateNoiseReference(_))) => {
                tracing::warn!(cycle, error = %e, "skipping detection cycle");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !report.pd_floor_met && !self.pd_shortfall {
            tracing::warn!(
                achieved_pd = report.achieved_pd,
                pfd = self.active.pfd,
                tcme_db = self.active.tcme,
                needed_snr_db = power::linear_to_db(report.min_detectable_snr),
                "detection floor not met at configured margin, keeping pfa"
            );
        }
        self.pd_shortfall = !report.pd_floor_met;

        if self.active.debug_stats {
            tracing::debug!(
                cycle = report.cycle,
                zref = report.zref,
                n_zref_segs = report.n_zref_segs,
                alpha = report.alpha,
                threshold = report.threshold,
                achieved_pfa = report.achieved_pfa,
                achieved_pd = report.achieved_pd,
                candidates = report.candidates,
                noccupied = report.noccupied,
                "detection cycle"
            );
        }

        self.last_report = Some(report);
        Ok(Some(report))
    }

    /// Stage a whole configuration snapshot.
    ///
    /// Takes effect immediately between cycles, otherwise once the running
    /// cycle completes.
    pub fn reconfigure(&mut self, config: SensorConfig) -> SenseResult<()> {
        self.stage(config)
    }

    fn stage(&mut self, next: SensorConfig) -> SenseResult<()> {
        next.validate()?;
        self.requested = next;
        self.pending = self.requested != self.active;
        if self.averager.at_boundary() {
            self.apply_pending()?;
        }
        Ok(())
    }

    fn apply_pending(&mut self) -> SenseResult<()> {
        if !self.pending {
            return Ok(());
        }
        let next = self.requested.clone();

        if self.active.geometry_differs(&next) {
            let plan = SegmentPlan::new(&next)?;
            tracing::info!(
                ninput_samples = next.ninput_samples,
                samples_per_band = next.samples_per_band,
                downconverter = %next.downconverter,
                band_location = next.band_location,
                nsub_bands = plan.nsub_bands(),
                "sensor geometry reconfigured"
            );
            self.rebuild(plan, &next);
        } else {
            self.averager.set_nframes(next.nframes_to_average);
            self.tracker.set_required(next.nframes_to_check);
            self.tracker.set_histogram_enabled(next.debug_histogram);
            tracing::info!(
                pfa = next.pfa,
                pfd = next.pfd,
                tcme = next.tcme,
                nframes_to_average = next.nframes_to_average,
                nframes_to_check = next.nframes_to_check,
                "sensor parameters reconfigured"
            );
        }

        self.active = next;
        self.pending = false;
        Ok(())
    }

    fn rebuild(&mut self, plan: SegmentPlan, config: &SensorConfig) {
        let n = plan.nsub_bands();
        self.averager = Averager::new(n, config.nframes_to_average);
        self.sorter = EnergySorter::new(n);
        self.threshold = ThresholdCalculator::new(config.samples_per_band);
        self.tracker = PersistenceTracker::new(n, config.nframes_to_check, config.debug_histogram);
        self.plan = plan;
        self.last_report = None;
        self.cycles = 0;
        self.pd_shortfall = false;
    }

    /// Drop the partial cycle, persistence counters and histogram.
    pub fn reset(&mut self) -> SenseResult<()> {
        let config = self.active.clone();
        self.rebuild(SegmentPlan::new(&config)?, &config);
        self.apply_pending()
    }

    /// Snapshot currently in effect.
    pub fn active_config(&self) -> &SensorConfig {
        &self.active
    }

    /// Most recently staged snapshot.
    pub fn requested_config(&self) -> &SensorConfig {
        &self.requested
    }

    /// True while a staged snapshot waits for the cycle boundary.
    pub fn has_pending_config(&self) -> bool {
        self.pending
    }

    /// Segmentation in effect.
    pub fn plan(&self) -> &SegmentPlan {
        &self.plan
    }

    /// Number of usable sub-bands (N).
    pub fn nsub_bands(&self) -> usize {
        self.plan.nsub_bands()
    }

    /// Input items per output item, `ninput_samples / N`.
    ///
    /// Infinite when no sub-band is usable.
    pub fn decimation(&self) -> f64 {
        let n = self.nsub_bands();
        if n == 0 {
            return f64::INFINITY;
        }
        self.plan.frame_len() as f64 / n as f64
    }

    /// Candidate count of sub-band `k` since the geometry was set.
    pub fn histogram(&self, sub_band: usize) -> Option<u64> {
        self.tracker.histogram(sub_band)
    }

    /// Whole histogram.
    pub fn histogram_counts(&self) -> &[u64] {
        self.tracker.histogram_counts()
    }

    /// Confirmed occupancy from the last cycle.
    pub fn occupied(&self) -> &[bool] {
        self.tracker.occupied()
    }

    /// Candidate flags from the last cycle.
    pub fn candidates(&self) -> &[bool] {
        self.tracker.candidates()
    }

    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    /// Frames accumulated toward the running cycle.
    pub fn frames_pending(&self) -> usize {
        self.averager.frames_pending()
    }
}

/// Sort, estimate zref, threshold and update persistence for one cycle.
fn detect(
    config: &SensorConfig,
    cycle: u64,
    energies: &[f64],
    sorter: &mut EnergySorter,
    threshold: &mut ThresholdCalculator,
    tracker: &mut PersistenceTracker,
) -> SenseResult<CycleReport> {
    sorter.sort(energies)?;
    let nsub_bands = energies.len();
    if nsub_bands < 2 {
        return Err(SenseError::DegenerateInput { nsub_bands });
    }

    // The clean set is accepted against the design for the full candidate
    // count; the decision uses the design for the count actually kept
    let limit = noise_reference::candidate_limit(nsub_bands, config.nsegs_to_check);
    let mut design = threshold.design(
        config.pfa,
        config.pfd,
        config.tcme,
        config.nframes_to_average,
        Reference::Trimmed {
            segments: limit,
            nsub_bands,
        },
    )?;
    let noise = noise_reference::estimate(sorter.sorted_energies(), config.nsegs_to_check, design.alpha)?;
    if noise.n_segs != limit {
        design = threshold.design(
            config.pfa,
            config.pfd,
            config.tcme,
            config.nframes_to_average,
            Reference::Trimmed {
                segments: noise.n_segs,
                nsub_bands,
            },
        )?;
    }

    let level = design.alpha * noise.zref;
    let candidates = tracker.update(energies, level);
    let noccupied = tracker.occupied().iter().filter(|&&o| o).count();

    Ok(CycleReport {
        cycle,
        zref: noise.zref,
        n_zref_segs: noise.n_segs,
        alpha: design.alpha,
        threshold: level,
        achieved_pfa: design.achieved_pfa,
        achieved_pd: design.achieved_pd,
        min_detectable_snr: design.min_detectable_snr,
        pd_floor_met: design.pd_floor_met,
        candidates,
        noccupied,
        occupancy_rate: candidates as f64 / energies.len() as f64,
    })
}

/// Getter and staged setter for each configuration field.
///
/// Getters return the most recently staged value.
macro_rules! config_accessors {
    ($($field:ident, $setter:ident: $ty:ty;)*) => {
        impl SpectrumSensor {
            $(
                #[doc = concat!("Staged `", stringify!($field), "`.")]
                pub fn $field(&self) -> $ty {
                    self.requested.$field
                }

                #[doc = concat!("Validate and stage a new `", stringify!($field), "`.")]
                pub fn $setter(&mut self, value: $ty) -> SenseResult<()> {
                    let mut next = self.requested.clone();
                    next.$field = value;
                    self.stage(next)
                }
            )*
        }
    };
}

config_accessors! {
    sample_rate, set_sample_rate: f64;
    ninput_samples, set_ninput_samples: usize;
    samples_per_band, set_samples_per_band: usize;
    pfd, set_pfd: f64;
    pfa, set_pfa: f64;
    tcme, set_tcme: f64;
    output_far, set_output_far: bool;
    debug_stats, set_debug_stats: bool;
    band_location, set_band_location: usize;
    useless_band, set_useless_band: f64;
    debug_histogram, set_debug_histogram: bool;
    nframes_to_check, set_nframes_to_check: usize;
    nframes_to_average, set_nframes_to_average: usize;
    downconverter, set_downconverter: Downconverter;
    nsegs_to_check, set_nsegs_to_check: usize;
}
