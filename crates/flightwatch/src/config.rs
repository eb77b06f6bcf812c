//! Configuration management for flightwatch.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::anomaly::ModelParams;
use crate::error::{Error, Result};
use crate::events::EventThresholds;
use crate::ring::SpinPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "flightwatch";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "FLIGHTWATCH_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `FLIGHTWATCH_`, sections separated
///    by `__`, e.g. `FLIGHTWATCH_BUFFER__CAPACITY=8192`)
/// 2. TOML config file at `~/.config/flightwatch/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ring buffer configuration.
    pub buffer: BufferConfig,
    /// Consumer loop configuration.
    pub pipeline: PipelineConfig,
    /// Anomaly detection configuration.
    pub anomaly: AnomalyConfig,
    /// Event detection thresholds.
    pub events: EventThresholds,
}

/// Ring buffer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Number of slots. Must be a power of two.
    pub capacity: usize,
    /// How contended operations wait.
    pub spin_policy: SpinPolicy,
}

/// Consumer loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum samples drained per cycle.
    pub batch_size: usize,
    /// Sleep between cycles when the buffer is empty, in milliseconds.
    pub poll_interval_ms: u64,
    /// Score every drained sample instead of only the latest of each batch.
    pub score_every_sample: bool,
}

/// Anomaly detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Findings below this confidence are discarded.
    pub confidence_threshold: f64,
    /// Standard deviations from the mean before the statistical model reports.
    pub deviation_threshold: f64,
    /// Parameters whose training spread is at or below this are not scored.
    pub min_stddev: f64,
    /// Parameters the statistical model tracks. Empty means all.
    pub tracked_parameters: Vec<String>,
    /// Rule overrides, e.g. `"airspeed.max" = "280"`.
    pub rules: ModelParams,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            spin_policy: SpinPolicy::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            poll_interval_ms: 10,
            score_every_sample: true,
        }
    }
}

impl PipelineConfig {
    /// Validate the loop settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch size or poll interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::ConfigValidation {
                message: "pipeline.batch_size must be greater than 0".to_string(),
            });
        }

        if self.poll_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "pipeline.poll_interval_ms must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            deviation_threshold: 3.0,
            min_stddev: f64::EPSILON,
            tracked_parameters: Vec::new(),
            rules: ModelParams::new(),
        }
    }
}

impl AnomalyConfig {
    /// Parameters for the statistical model's `initialize`.
    #[must_use]
    pub fn statistical_params(&self) -> ModelParams {
        let mut params = ModelParams::from([
            (
                "deviationThreshold".to_string(),
                self.deviation_threshold.to_string(),
            ),
            ("minStdDev".to_string(), self.min_stddev.to_string()),
        ]);
        if !self.tracked_parameters.is_empty() {
            params.insert(
                "trackedParameters".to_string(),
                self.tracked_parameters.join(","),
            );
        }
        params
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `FLIGHTWATCH_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let config: Config = Self::figment(config_file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a single TOML file over the defaults, ignoring
    /// the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or fails validation.
    pub fn load_file(config_file: PathBuf) -> Result<Self> {
        let config: Config = Self::figment(config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(config_file: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.buffer.capacity.is_power_of_two() {
            return Err(Error::ConfigValidation {
                message: format!(
                    "buffer.capacity must be a power of two, got {}",
                    self.buffer.capacity
                ),
            });
        }

        self.pipeline.validate()?;

        if !(0.0..=1.0).contains(&self.anomaly.confidence_threshold) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "anomaly.confidence_threshold must be within 0..=1, got {}",
                    self.anomaly.confidence_threshold
                ),
            });
        }

        if self.anomaly.deviation_threshold.is_nan() || self.anomaly.deviation_threshold <= 0.0 {
            return Err(Error::ConfigValidation {
                message: format!(
                    "anomaly.deviation_threshold must be positive, got {}",
                    self.anomaly.deviation_threshold
                ),
            });
        }

        if self.anomaly.min_stddev.is_nan() || self.anomaly.min_stddev < 0.0 {
            return Err(Error::ConfigValidation {
                message: "anomaly.min_stddev must not be negative".to_string(),
            });
        }

        for name in &self.anomaly.tracked_parameters {
            if crate::anomaly::parameters::lookup(name).is_none() {
                return Err(Error::ConfigValidation {
                    message: format!("unknown tracked parameter: {name}"),
                });
            }
        }

        self.events.validate()
    }

    /// Get the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.pipeline.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.buffer.capacity, 4096);
        assert_eq!(config.buffer.spin_policy, SpinPolicy::Backoff);
        assert_eq!(config.pipeline.batch_size, 256);
        assert!(config.pipeline.score_every_sample);
        assert!((config.anomaly.confidence_threshold - 0.5).abs() < f64::EPSILON);
        assert!(config.anomaly.rules.is_empty());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_capacity_not_power_of_two() {
        let mut config = Config::default();
        config.buffer.capacity = 1000;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("buffer.capacity"));

        config.buffer.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let mut config = Config::default();
        config.pipeline.batch_size = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("batch_size"));
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.pipeline.poll_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_validate_confidence_threshold_range() {
        let mut config = Config::default();
        config.anomaly.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        config.anomaly.confidence_threshold = f64::NAN;
        assert!(config.validate().is_err());

        config.anomaly.confidence_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_deviation_threshold() {
        let mut config = Config::default();
        config.anomaly.deviation_threshold = 0.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("deviation_threshold"));
    }

    #[test]
    fn test_validate_unknown_tracked_parameter() {
        let mut config = Config::default();
        config.anomaly.tracked_parameters = vec!["altitude".to_string(), "warp".to_string()];

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("warp"));
    }

    #[test]
    fn test_validate_event_thresholds() {
        let mut config = Config::default();
        config.events.firm_landing = 1000.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_statistical_params() {
        let mut anomaly = AnomalyConfig::default();
        anomaly.deviation_threshold = 2.5;
        let params = anomaly.statistical_params();
        assert_eq!(params["deviationThreshold"], "2.5");
        assert!(!params.contains_key("trackedParameters"));

        anomaly.tracked_parameters = vec!["altitude".to_string(), "roll".to_string()];
        assert_eq!(anomaly.statistical_params()["trackedParameters"], "altitude,roll");
    }

    #[test]
    fn test_poll_interval() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_config_clone() {
        let config = Config::default();
        let cloned = config.clone();
        assert_eq!(config, cloned);
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("flightwatch"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let config = Config::load_file(PathBuf::from("/nonexistent/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[buffer]
capacity = 1024
spin_policy = "yield"

[pipeline]
batch_size = 64

[anomaly]
confidence_threshold = 0.8
tracked_parameters = ["altitude", "airspeed"]

[anomaly.rules]
"airspeed.max" = "280"

[events]
bank_angle_limit = 35.0
"#
        )
        .unwrap();

        let config = Config::load_file(file.path().to_path_buf()).unwrap();
        assert_eq!(config.buffer.capacity, 1024);
        assert_eq!(config.buffer.spin_policy, SpinPolicy::Yield);
        assert_eq!(config.pipeline.batch_size, 64);
        assert_eq!(config.pipeline.poll_interval_ms, 10);
        assert!((config.anomaly.confidence_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.anomaly.tracked_parameters.len(), 2);
        assert_eq!(config.anomaly.rules["airspeed.max"], "280");
        assert!((config.events.bank_angle_limit - 35.0).abs() < f64::EPSILON);
        assert!((config.events.pitch_angle_limit - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_invalid_toml_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[buffer]\ncapacity = 3000").unwrap();

        let err = Config::load_file(file.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_load_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[buffer\ncapacity = ").unwrap();

        let err = Config::load_file(file.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, Error::ConfigLoad(_)));
    }

    #[test]
    fn test_config_serialize_roundtrips_through_toml_keys() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("\"capacity\":4096"));
        assert!(json.contains("\"spin_policy\":\"backoff\""));
        assert!(json.contains("\"bank_angle_limit\""));
    }

    #[test]
    fn test_anomaly_config_deserialize_partial() {
        let json = r#"{"confidence_threshold": 0.7}"#;
        let anomaly: AnomalyConfig = serde_json::from_str(json).unwrap();
        assert!((anomaly.confidence_threshold - 0.7).abs() < f64::EPSILON);
        assert!((anomaly.deviation_threshold - 3.0).abs() < f64::EPSILON);
    }
}
