//! # Configuration System
//!
//! Provides the sensor configuration snapshot and YAML-based loading.
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via `SPECSENSE_CONFIG` environment variable
//! 2. `./specsense.yaml` (current directory)
//! 3. `~/.config/specsense/config.yaml` (user config)
//! 4. `/etc/specsense/config.yaml` (system config)
//!
//! ## Example Configuration
//!
//! ```yaml
//! sensor:
//!   sample_rate: 2.4e6
//!   ninput_samples: 1024
//!   samples_per_band: 64
//!   pfa: 0.01
//!   downconverter: e4k
//!   band_location: 8
//!
//! logging:
//!   level: debug
//!   format: compact
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::observe::LogConfig;
use crate::segmenter::SegmentPlan;
use crate::types::{SenseError, SenseResult};

/// Error type for configuration file operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("config not found: {0}")]
    NotFound(String),
    /// Failed to read or write the configuration file
    #[error("failed to read config: {0}")]
    ReadError(String),
    /// Failed to parse configuration
    #[error("failed to parse config: {0}")]
    ParseError(String),
}

/// Front-end downconverter variant.
///
/// Each tuner leaves its DC/spur artifact at a different offset relative to
/// the segment named by `band_location`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Downconverter {
    /// Elonics E4000, zero-IF: the DC artifact sits on the lower edge of the
    /// selected segment.
    E4k,
    /// Rafael Micro R820T, low-IF: the spur sits at the centre of the
    /// selected segment.
    R820t,
}

impl Default for Downconverter {
    fn default() -> Self {
        Downconverter::E4k
    }
}

impl fmt::Display for Downconverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Downconverter::E4k => write!(f, "e4k"),
            Downconverter::R820t => write!(f, "r820t"),
        }
    }
}

impl FromStr for Downconverter {
    type Err = SenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "e4k" | "e4000" | "0" => Ok(Downconverter::E4k),
            "r820t" | "r820t2" | "1" => Ok(Downconverter::R820t),
            other => Err(SenseError::UnknownDownconverter(other.to_string())),
        }
    }
}

impl TryFrom<i64> for Downconverter {
    type Error = SenseError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Downconverter::E4k),
            1 => Ok(Downconverter::R820t),
            other => Err(SenseError::UnknownDownconverter(other.to_string())),
        }
    }
}

/// Spectrum sensor configuration snapshot.
///
/// A snapshot is validated as a whole before it is applied, and the sensor
/// only switches snapshots on an averaging-cycle boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Sample rate in Hz (sets the bin width together with `ninput_samples`)
    pub sample_rate: f64,
    /// Number of spectrum bins per input frame
    pub ninput_samples: usize,
    /// Number of bins per sub-band
    pub samples_per_band: usize,
    /// Detection probability floor
    pub pfd: f64,
    /// False-alarm probability ceiling
    pub pfa: f64,
    /// Detection margin in dB: hypothesized primary-user SNR at which `pfd` is evaluated
    pub tcme: f64,
    /// Emit the measured occupancy rate on the second output
    pub output_far: bool,
    /// Log per-cycle detection statistics
    pub debug_stats: bool,
    /// Raw segment index holding the front-end artifact
    pub band_location: usize,
    /// Width of the excluded artifact region in Hz
    pub useless_band: f64,
    /// Maintain the per-sub-band candidate histogram
    pub debug_histogram: bool,
    /// Consecutive candidate cycles required to declare occupancy
    pub nframes_to_check: usize,
    /// Frames averaged per detection cycle
    pub nframes_to_average: usize,
    /// Front-end downconverter variant
    pub downconverter: Downconverter,
    /// Lowest-ranked segments examined for the noise reference (0 = automatic)
    pub nsegs_to_check: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 2_400_000.0,
            ninput_samples: 1024,
            samples_per_band: 64,
            pfd: 0.9,
            pfa: 0.01,
            tcme: 6.0,
            output_far: false,
            debug_stats: false,
            band_location: 8,
            useless_band: 0.0,
            debug_histogram: false,
            nframes_to_check: 1,
            nframes_to_average: 1,
            downconverter: Downconverter::E4k,
            nsegs_to_check: 0,
        }
    }
}

impl SensorConfig {
    /// Number of raw segments in a frame, before exclusion.
    pub fn nraw_segments(&self) -> usize {
        if self.samples_per_band == 0 {
            return 0;
        }
        self.ninput_samples / self.samples_per_band
    }

    /// Width of one spectrum bin in Hz.
    pub fn bin_width(&self) -> f64 {
        self.sample_rate / self.ninput_samples.max(1) as f64
    }

    /// Validate the snapshot, including the excluded-band geometry.
    pub fn validate(&self) -> SenseResult<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(SenseError::InvalidConfig(
                "sample_rate must be positive".to_string(),
            ));
        }
        if self.ninput_samples == 0 {
            return Err(SenseError::InvalidConfig(
                "ninput_samples must be > 0".to_string(),
            ));
        }
        if self.samples_per_band == 0 || self.ninput_samples % self.samples_per_band != 0 {
            return Err(SenseError::InvalidConfig(format!(
                "samples_per_band {} must evenly divide ninput_samples {}",
                self.samples_per_band, self.ninput_samples
            )));
        }
        for (name, p) in [("pfa", self.pfa), ("pfd", self.pfd)] {
            if !(p > 0.0 && p < 1.0) {
                return Err(SenseError::InvalidConfig(format!(
                    "{} must be in (0, 1), got {}",
                    name, p
                )));
            }
        }
        if !self.tcme.is_finite() {
            return Err(SenseError::InvalidConfig("tcme must be finite".to_string()));
        }
        if !(self.useless_band.is_finite() && self.useless_band >= 0.0) {
            return Err(SenseError::InvalidConfig(
                "useless_band must be a non-negative width in Hz".to_string(),
            ));
        }
        if self.nframes_to_check == 0 {
            return Err(SenseError::InvalidConfig(
                "nframes_to_check must be >= 1".to_string(),
            ));
        }
        if self.nframes_to_average == 0 {
            return Err(SenseError::InvalidConfig(
                "nframes_to_average must be >= 1".to_string(),
            ));
        }

        SegmentPlan::new(self).map(|_| ())
    }

    /// True when `other` needs the segment plan and buffers rebuilt.
    pub fn geometry_differs(&self, other: &SensorConfig) -> bool {
        self.sample_rate != other.sample_rate
            || self.ninput_samples != other.ninput_samples
            || self.samples_per_band != other.samples_per_band
            || self.band_location != other.band_location
            || self.useless_band != other.useless_band
            || self.downconverter != other.downconverter
    }
}

/// Complete configuration file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecsenseConfig {
    /// Configuration version
    pub version: String,
    /// Sensor configuration
    pub sensor: SensorConfig,
    /// Logging configuration
    pub logging: LogConfig,
}

impl Default for SpecsenseConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            sensor: SensorConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl SpecsenseConfig {
    /// Load configuration from the default search path.
    ///
    /// Returns the default config if no file is found.
    pub fn load() -> SenseResult<Self> {
        if let Ok(path) = std::env::var("SPECSENSE_CONFIG") {
            if Path::new(&path).exists() {
                return Self::load_from(Path::new(&path));
            }
        }

        for path in &Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(path);
            }
        }

        Ok(Self::default())
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> SenseResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(yaml: &str) -> SenseResult<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.sensor.validate()?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> SenseResult<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)).into())
    }

    /// Get configuration search paths.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./specsense.yaml")];

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "specsense") {
            paths.push(config_dir.config_dir().join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/specsense/config.yaml"));

        paths
    }

    /// Example configuration with persistence and averaging enabled.
    pub fn example() -> Self {
        Self {
            sensor: SensorConfig {
                nframes_to_check: 3,
                nframes_to_average: 4,
                output_far: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Generate example configuration YAML.
    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::example()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SensorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.nraw_segments(), 16);
        assert!((config.bin_width() - 2343.75).abs() < 1e-9);
    }

    #[test]
    fn test_band_size_must_divide_frame() {
        let config = SensorConfig {
            ninput_samples: 1000,
            samples_per_band: 64,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SenseError::InvalidConfig(_))));
    }

    #[test]
    fn test_probability_bounds() {
        let config = SensorConfig {
            pfa: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SensorConfig {
            pfd: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_band_location() {
        let config = SensorConfig {
            band_location: 16,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SenseError::ExcludedBandOutOfRange { .. })
        ));
    }

    #[test]
    fn test_downconverter_parsing() {
        assert_eq!("e4k".parse::<Downconverter>().unwrap(), Downconverter::E4k);
        assert_eq!("R820T".parse::<Downconverter>().unwrap(), Downconverter::R820t);
        assert_eq!(Downconverter::try_from(1).unwrap(), Downconverter::R820t);
        assert!(matches!(
            "fc0013".parse::<Downconverter>(),
            Err(SenseError::UnknownDownconverter(_))
        ));
        assert!(Downconverter::try_from(7).is_err());
    }

    #[test]
    fn test_geometry_differs() {
        let base = SensorConfig::default();
        let stats_only = SensorConfig {
            pfa: 0.001,
            debug_stats: true,
            ..base.clone()
        };
        assert!(!base.geometry_differs(&stats_only));

        let moved = SensorConfig {
            band_location: 3,
            ..base.clone()
        };
        assert!(base.geometry_differs(&moved));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
sensor:
  sample_rate: 2.048e6
  ninput_samples: 2048
  samples_per_band: 128
  pfa: 0.001
  downconverter: r820t
  band_location: 5
  nframes_to_check: 3

logging:
  level: debug
"#;

        let config = SpecsenseConfig::parse(yaml).unwrap();
        assert_eq!(config.sensor.ninput_samples, 2048);
        assert_eq!(config.sensor.samples_per_band, 128);
        assert_eq!(config.sensor.downconverter, Downconverter::R820t);
        assert_eq!(config.sensor.nframes_to_check, 3);
        // Defaults fill the rest
        assert_eq!(config.sensor.nframes_to_average, 1);
        assert_eq!(config.sensor.pfd, 0.9);
    }

    #[test]
    fn test_parse_rejects_invalid_snapshot() {
        let yaml = r#"
sensor:
  ninput_samples: 1024
  samples_per_band: 100
"#;
        assert!(SpecsenseConfig::parse(yaml).is_err());
        assert!(matches!(
            SpecsenseConfig::parse("sensor: [1, 2"),
            Err(SenseError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_example_yaml_roundtrip() {
        let yaml = SpecsenseConfig::example_yaml();
        assert!(yaml.contains("nframes_to_average"));
        let config = SpecsenseConfig::parse(&yaml).unwrap();
        assert_eq!(config.sensor.nframes_to_average, 4);
        assert!(config.sensor.output_far);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("specsense.yaml");

        let mut config = SpecsenseConfig::example();
        config.sensor.pfa = 0.002;
        config.sensor.downconverter = Downconverter::R820t;
        config.sensor.useless_band = 5000.0;
        config.save(&path).unwrap();

        let loaded = SpecsenseConfig::load_from(&path).unwrap();
        assert_eq!(loaded.sensor, config.sensor);
        assert_eq!(loaded.logging, config.logging);
    }

    #[test]
    fn test_save_to_missing_directory_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing").join("specsense.yaml");
        assert!(matches!(
            SpecsenseConfig::example().save(&path),
            Err(SenseError::Config(ConfigError::ReadError(_)))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = SpecsenseConfig::load_from(Path::new("/nonexistent/specsense.yaml"));
        assert!(matches!(
            result,
            Err(SenseError::Config(ConfigError::ReadError(_)))
        ));
    }
}
