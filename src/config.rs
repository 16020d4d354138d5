//! Configuration loading for break-daq.
//!
//! Strongly-typed configuration loaded with figment from:
//! 1. a TOML file (default `config/break_daq.toml`)
//! 2. environment variables prefixed with `BREAK_DAQ_` (nested keys joined
//!    with `__`, e.g. `BREAK_DAQ_APPLICATION__LOG_LEVEL=debug`)

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings.
    pub application: ApplicationConfig,
    /// Output/storage settings.
    pub storage: StorageConfig,
    /// Instrument selection.
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Break-junction controller parameters.
    #[serde(default)]
    pub junction: JunctionParams,
}

/// Application-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name.
    pub name: String,
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for CSV logs and trace snapshots.
    pub output_dir: PathBuf,
    /// Whether to save a trace snapshot of the final ramp on termination.
    #[serde(default = "default_snapshot_traces")]
    pub snapshot_traces: bool,
}

/// Instrument definition.
///
/// Only the simulated source-meter ships with the headless build; real
/// drivers plug in behind the same capability traits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Instrument type (currently only "mock").
    pub r#type: String,
    /// Simulated junction resistance in ohms.
    #[serde(default = "default_mock_resistance")]
    pub mock_resistance_ohms: f64,
    /// Fractional read noise amplitude (0 disables noise).
    #[serde(default)]
    pub mock_noise: f64,
    /// Optional bias at which the simulated junction breaks.
    #[serde(default)]
    pub mock_break_at_volts: Option<f64>,
    /// Post-break resistance for the simulated junction.
    #[serde(default = "default_mock_broken_resistance")]
    pub mock_broken_resistance_ohms: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            r#type: "mock".to_string(),
            mock_resistance_ohms: default_mock_resistance(),
            mock_noise: 0.0,
            mock_break_at_volts: None,
            mock_broken_resistance_ohms: default_mock_broken_resistance(),
        }
    }
}

/// Immutable parameters of a break-junction session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JunctionParams {
    /// Number of intervals in the resistance probe sweep (steps+1 points).
    #[serde(default = "default_steps")]
    pub steps: u32,

    /// Upper voltage of the resistance probe sweep, in volts.
    #[serde(default = "default_stop_voltage")]
    pub stop_voltage: f64,

    /// Session ends once the estimated resistance reaches this, in ohms.
    #[serde(default = "default_desired_resistance")]
    pub desired_resistance: f64,

    /// First setpoint of each ramp attempt, in volts.
    #[serde(default = "default_start_voltage")]
    pub start_voltage: f64,

    /// Voltage increment between ramp steps, in volts.
    #[serde(default = "default_delta_voltage")]
    pub delta_voltage: f64,

    /// Initial ramp ceiling, in volts.
    #[serde(default = "default_break_voltage")]
    pub break_voltage: f64,

    /// Ceiling increment applied after `passes` completed attempts.
    #[serde(default = "default_delta_break_voltage")]
    pub delta_break_voltage: f64,

    /// Completed ramp attempts at a ceiling before it is raised.
    #[serde(default = "default_passes")]
    pub passes: u32,

    /// Whether the ceiling is raised at all.
    #[serde(default = "default_increase_break_voltage")]
    pub increase_break_voltage: bool,

    /// Allowed deviation of V/I from the previous sample's V/I, in percent,
    /// before a ramp step counts as a break.
    #[serde(default = "default_deviation_tolerance")]
    pub deviation_tolerance_pct: f64,

    /// Settle time after each voltage setpoint.
    #[serde(with = "humantime_serde", default = "default_settle_time")]
    pub settle_time: Duration,
}

fn default_steps() -> u32 {
    10
}
fn default_stop_voltage() -> f64 {
    0.1
}
fn default_desired_resistance() -> f64 {
    10_000.0
}
fn default_start_voltage() -> f64 {
    0.05
}
fn default_delta_voltage() -> f64 {
    0.01
}
fn default_break_voltage() -> f64 {
    0.4
}
fn default_delta_break_voltage() -> f64 {
    0.1
}
fn default_passes() -> u32 {
    2
}
fn default_increase_break_voltage() -> bool {
    true
}
fn default_deviation_tolerance() -> f64 {
    10.0
}
fn default_settle_time() -> Duration {
    Duration::from_millis(50)
}
fn default_snapshot_traces() -> bool {
    true
}
fn default_mock_resistance() -> f64 {
    100.0
}
fn default_mock_broken_resistance() -> f64 {
    1.0e6
}

impl Default for JunctionParams {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            stop_voltage: default_stop_voltage(),
            desired_resistance: default_desired_resistance(),
            start_voltage: default_start_voltage(),
            delta_voltage: default_delta_voltage(),
            break_voltage: default_break_voltage(),
            delta_break_voltage: default_delta_break_voltage(),
            passes: default_passes(),
            increase_break_voltage: default_increase_break_voltage(),
            deviation_tolerance_pct: default_deviation_tolerance(),
            settle_time: default_settle_time(),
        }
    }
}

impl JunctionParams {
    /// Deviation tolerance as a fraction.
    pub fn deviation_tolerance(&self) -> f64 {
        self.deviation_tolerance_pct / 100.0
    }
}

impl Config {
    /// Load configuration from the default path and environment variables.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/break_daq.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("BREAK_DAQ_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(DaqError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.instrument.r#type != "mock" {
            return invalid(format!(
                "Unknown instrument type '{}'. Only 'mock' is available",
                self.instrument.r#type
            ));
        }
        if self.instrument.mock_resistance_ohms <= 0.0 {
            return invalid("mock_resistance_ohms must be positive".to_string());
        }

        let j = &self.junction;
        if j.steps == 0 {
            return invalid("junction.steps must be at least 1".to_string());
        }
        if j.stop_voltage <= 0.0 {
            return invalid("junction.stop_voltage must be positive".to_string());
        }
        if j.delta_voltage <= 0.0 {
            return invalid("junction.delta_voltage must be positive".to_string());
        }
        if j.start_voltage > j.break_voltage {
            return invalid("junction.start_voltage must not exceed break_voltage".to_string());
        }
        if j.passes == 0 {
            return invalid("junction.passes must be at least 1".to_string());
        }
        if j.desired_resistance <= 0.0 {
            return invalid("junction.desired_resistance must be positive".to_string());
        }
        if j.deviation_tolerance_pct <= 0.0 {
            return invalid("junction.deviation_tolerance_pct must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            application: ApplicationConfig {
                name: "break-daq".to_string(),
                log_level: "info".to_string(),
            },
            storage: StorageConfig {
                output_dir: PathBuf::from("data"),
                snapshot_traces: true,
            },
            instrument: InstrumentConfig::default(),
            junction: JunctionParams::default(),
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut config = valid_config();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_steps_rejected() {
        let mut config = valid_config();
        config.junction.steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn start_above_ceiling_rejected() {
        let mut config = valid_config();
        config.junction.start_voltage = 1.0;
        config.junction.break_voltage = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_instrument_rejected() {
        let mut config = valid_config();
        config.instrument.r#type = "visa".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn tolerance_is_percent() {
        let params = JunctionParams::default();
        assert!((params.deviation_tolerance() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn params_defaults_match_free_functions() {
        let params = JunctionParams::default();
        assert_eq!(params.steps, 10);
        assert_eq!(params.passes, 2);
        assert!(params.increase_break_voltage);
        assert_eq!(params.settle_time, Duration::from_millis(50));
    }

    #[test]
    fn loads_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("break_daq.toml");
        std::fs::write(
            &path,
            r#"
[application]
name = "bench"
log_level = "debug"

[storage]
output_dir = "out"

[junction]
steps = 20
desired_resistance = 5000.0
settle_time = "10ms"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.junction.steps, 20);
        assert_eq!(config.junction.settle_time, Duration::from_millis(10));
        // Untouched fields fall back to defaults.
        assert_eq!(config.junction.passes, 2);
        assert!(config.validate().is_ok());
    }
}
