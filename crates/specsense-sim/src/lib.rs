//! # Spectrum Scenario Simulator
//!
//! Synthetic input for the spectrum sensor: complex AWGN plus occupying
//! carriers, generated either as spectrum frames or as time-domain I/Q.
//! Seeded scenarios are reproducible, which the sensor's tests and the
//! `specsense simulate` command rely on.

pub mod scenario;

pub use scenario::{Occupant, Scenario, ScenarioConfig};
