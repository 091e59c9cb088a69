//! Spectrum Sensor Command-Line Interface
//!
//! This CLI provides tools for:
//! - Running the sensor on synthetic scenarios
//! - Sensing occupancy in captured I/Q files
//! - Inspecting CFAR threshold designs
//! - Generating configuration files

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use specsense_core::config::SpecsenseConfig;
use specsense_core::noise_reference;
use specsense_core::observe::{init_logging, LogLevel};
use specsense_core::prelude::*;
use specsense_core::threshold::{Reference, ThresholdCalculator};
use specsense_core::types::power;
use specsense_sim::{Occupant, Scenario, ScenarioConfig};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "specsense")]
#[command(author, version, about = "CFAR spectrum occupancy sensor", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (YAML); defaults to the standard search path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sensor on a synthetic noise + carriers scenario
    Simulate {
        /// Number of frames to feed
        #[arg(short, long, default_value = "64")]
        frames: usize,

        /// Noise power per bin (linear)
        #[arg(long, default_value = "1.0")]
        noise_power: f64,

        /// Occupant as OFFSET_HZ:SNR_DB[:BANDWIDTH_HZ] (repeatable)
        #[arg(short, long, value_parser = parse_occupant)]
        occupant: Vec<Occupant>,

        /// RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Generate time-domain I/Q and run it through the FFT front end
        #[arg(long)]
        time_domain: bool,
    },

    /// Sense occupancy in a file of interleaved little-endian f32 I/Q
    Sense {
        /// Input file with I/Q samples
        #[arg(short, long)]
        input: PathBuf,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<usize>,
    },

    /// Show the CFAR threshold design for a set of targets
    Threshold {
        /// False-alarm probability ceiling
        #[arg(long, default_value = "0.01")]
        pfa: f64,

        /// Detection probability floor
        #[arg(long, default_value = "0.9")]
        pfd: f64,

        /// Detection margin in dB
        #[arg(long, default_value = "6.0")]
        tcme: f64,

        /// Bins per sub-band
        #[arg(long, default_value = "64")]
        samples_per_band: usize,

        /// Frames averaged per decision
        #[arg(long, default_value = "1")]
        nframes_to_average: usize,

        /// Usable sub-bands; designs against the estimated noise reference
        /// instead of a known noise power
        #[arg(long)]
        nsub_bands: Option<usize>,
    },

    /// Print or write an example configuration
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// List the configuration search path
        #[arg(long)]
        paths: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SpecsenseConfig::load_from(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => SpecsenseConfig::load().context("Failed to load config")?,
    };

    let mut logging = config.logging.clone();
    if cli.verbose > 0 {
        logging = logging.with_level(LogLevel::from_verbosity(cli.verbose));
    }
    init_logging(&logging);

    match cli.command {
        Commands::Simulate {
            frames,
            noise_power,
            occupant,
            seed,
            time_domain,
        } => cmd_simulate(config, frames, noise_power, occupant, seed, time_domain),

        Commands::Sense { input, max_frames } => cmd_sense(config, input, max_frames),

        Commands::Threshold {
            pfa,
            pfd,
            tcme,
            samples_per_band,
            nframes_to_average,
            nsub_bands,
        } => cmd_threshold(pfa, pfd, tcme, samples_per_band, nframes_to_average, nsub_bands),

        Commands::Config { output, paths } => cmd_config(output, paths),
    }
}

/// Parse `OFFSET_HZ:SNR_DB[:BANDWIDTH_HZ]`.
fn parse_occupant(s: &str) -> std::result::Result<Occupant, String> {
    let fields: Vec<&str> = s.split(':').collect();
    if fields.len() < 2 || fields.len() > 3 {
        return Err(format!(
            "expected OFFSET_HZ:SNR_DB[:BANDWIDTH_HZ], got '{}'",
            s
        ));
    }
    let number = |field: &str| {
        field
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("'{}': {}", field, e))
    };
    let offset_hz = number(fields[0])?;
    let snr_db = number(fields[1])?;
    let bandwidth_hz = match fields.get(2) {
        Some(bw) => number(*bw)?,
        None => 0.0,
    };
    Ok(Occupant::wideband(offset_hz, bandwidth_hz, snr_db))
}

fn read_samples_f32(path: &PathBuf) -> Result<Vec<IQSample>> {
    let bytes = std::fs::read(path).context("Failed to open input file")?;
    if bytes.len() % 8 != 0 {
        warn!(
            "Ignoring {} trailing bytes in {:?}",
            bytes.len() % 8,
            path
        );
    }

    // 2 x f32 per sample
    let samples = bytes
        .chunks_exact(8)
        .map(|buf| {
            let re = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64;
            let im = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as f64;
            IQSample::new(re, im)
        })
        .collect();

    Ok(samples)
}

fn format_bands(sensor: &SpectrumSensor) -> String {
    let bands: Vec<String> = sensor
        .occupied()
        .iter()
        .enumerate()
        .filter(|&(_, &o)| o)
        .map(|(k, _)| {
            let offset = sensor.plan().center_offset_hz(k).unwrap_or(0.0);
            format!("{}({:+.1} kHz)", k, offset / 1e3)
        })
        .collect();
    if bands.is_empty() {
        "-".to_string()
    } else {
        bands.join(" ")
    }
}

fn print_report(report: &CycleReport, sensor: &SpectrumSensor) {
    println!(
        "cycle {:>4}  zref {:>9.4}  ({:>2} segs)  thr {:>9.4}  cand {:>3}  occ {:>3}  {}",
        report.cycle,
        report.zref,
        report.n_zref_segs,
        report.threshold,
        report.candidates,
        report.noccupied,
        format_bands(sensor)
    );
}

fn print_histogram(sensor: &SpectrumSensor) {
    if !sensor.active_config().debug_histogram {
        return;
    }
    println!();
    println!("Candidate histogram:");
    for (k, count) in sensor.histogram_counts().iter().enumerate() {
        let offset = sensor.plan().center_offset_hz(k).unwrap_or(0.0);
        println!("  {:>3} {:>+10.1} kHz  {}", k, offset / 1e3, count);
    }
}

fn cmd_simulate(
    config: SpecsenseConfig,
    frames: usize,
    noise_power: f64,
    occupants: Vec<Occupant>,
    seed: Option<u64>,
    time_domain: bool,
) -> Result<()> {
    let sensor_config = config.sensor;
    let frame_len = sensor_config.ninput_samples;
    let mut sensor = SpectrumSensor::new(sensor_config.clone())?;
    let mut scenario = Scenario::new(ScenarioConfig {
        sample_rate: sensor_config.sample_rate,
        noise_power,
        occupants,
        seed,
    })?;
    let mut front_end = SpectrumFrontEnd::new(frame_len)?;

    info!(
        "Simulating {} frames of {} bins, {} sub-bands",
        frames,
        frame_len,
        sensor.nsub_bands()
    );

    for _ in 0..frames {
        let frame = if time_domain {
            front_end.frame(&scenario.time_block(frame_len))?
        } else {
            scenario.spectrum_frame(frame_len)
        };
        if let Some(report) = sensor.process_frame(&frame)? {
            print_report(&report, &sensor);
        }
    }

    let expected = scenario.expected_sub_bands(sensor.plan());
    let detected: Vec<usize> = sensor
        .occupied()
        .iter()
        .enumerate()
        .filter(|&(_, &o)| o)
        .map(|(k, _)| k)
        .collect();

    println!();
    println!("Expected occupied: {:?}", expected);
    println!("Detected occupied: {:?}", detected);
    if let Some(report) = sensor.last_report() {
        println!(
            "Achieved Pfa {:.3e}, Pd at {:.1} dB margin {:.3} (floor {})",
            report.achieved_pfa,
            sensor_config.tcme,
            report.achieved_pd,
            if report.pd_floor_met { "met" } else { "not met" }
        );
    }
    print_histogram(&sensor);

    Ok(())
}

fn cmd_sense(config: SpecsenseConfig, input: PathBuf, max_frames: Option<usize>) -> Result<()> {
    let sensor_config = config.sensor;
    let frame_len = sensor_config.ninput_samples;

    info!("Reading samples from {:?}", input);
    let samples = read_samples_f32(&input)?;
    info!("Read {} I/Q samples", samples.len());
    if samples.len() < frame_len {
        bail!(
            "Input holds {} samples, fewer than one frame of {}",
            samples.len(),
            frame_len
        );
    }

    let mut sensor = SpectrumSensor::new(sensor_config)?;
    let mut front_end = SpectrumFrontEnd::new(frame_len)?;
    let limit = max_frames.unwrap_or(usize::MAX);

    let mut cycles = 0;
    for block in samples.chunks_exact(frame_len).take(limit) {
        let frame = front_end.frame(block)?;
        if let Some(report) = sensor.process_frame(&frame)? {
            print_report(&report, &sensor);
            cycles += 1;
        }
    }

    if cycles == 0 {
        warn!("No detection cycle completed");
    }
    print_histogram(&sensor);

    Ok(())
}

fn cmd_threshold(
    pfa: f64,
    pfd: f64,
    tcme: f64,
    samples_per_band: usize,
    nframes_to_average: usize,
    nsub_bands: Option<usize>,
) -> Result<()> {
    if samples_per_band == 0 {
        bail!("samples_per_band must be > 0");
    }
    if !(pfd > 0.0 && pfd < 1.0) {
        bail!("pfd must be in (0, 1), got {}", pfd);
    }

    let reference = match nsub_bands {
        Some(n) => Reference::Trimmed {
            segments: noise_reference::candidate_limit(n, 0),
            nsub_bands: n,
        },
        None => Reference::Exact,
    };
    let mut calc = ThresholdCalculator::new(samples_per_band);
    let design = calc.design(pfa, pfd, tcme, nframes_to_average, reference)?;

    println!("=== CFAR Threshold Design ===");
    println!();
    println!("Targets:");
    println!("  Pfa ceiling:       {:.3e}", pfa);
    println!("  Pd floor:          {:.3}", pfd);
    println!("  Margin (tcme):     {:.1} dB", tcme);
    println!("  Bins per band:     {}", samples_per_band);
    println!("  Frames averaged:   {}", nframes_to_average);
    match reference {
        Reference::Trimmed { segments, nsub_bands } => {
            println!("  Noise reference:   lowest {} of {} sub-bands", segments, nsub_bands)
        }
        Reference::Exact => println!("  Noise reference:   known noise power"),
    }
    println!();
    println!("Design:");
    println!("  Scale factor:      {:.5}", design.alpha);
    println!("  Threshold:         {:+.3} dB above zref", power::linear_to_db(design.alpha));
    println!("  Achieved Pfa:      {:.3e}", design.achieved_pfa);
    println!("  Pd at margin:      {:.4}", design.achieved_pd);
    println!(
        "  Min SNR for Pd:    {:.2} dB",
        power::linear_to_db(design.min_detectable_snr)
    );
    println!(
        "  Pd floor:          {}",
        if design.pd_floor_met { "met" } else { "not met (Pfa kept)" }
    );

    Ok(())
}

fn cmd_config(output: Option<PathBuf>, paths: bool) -> Result<()> {
    if paths {
        println!("SPECSENSE_CONFIG (environment)");
        for path in SpecsenseConfig::config_search_paths() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    match output {
        Some(path) => {
            SpecsenseConfig::example()
                .save(&path)
                .with_context(|| format!("Failed to write {:?}", path))?;
            info!("Wrote example configuration to {:?}", path);
        }
        None => print!("{}", SpecsenseConfig::example_yaml()),
    }

    Ok(())
}
