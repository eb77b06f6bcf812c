//! Statistical (z-score) anomaly model.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::telemetry::FlightParameters;

use super::parameters::{self, TrackedParameter, PARAMETERS};
use super::types::FlightAnomaly;
use super::{AnomalyModel, ModelParams};

/// Default registry name.
pub const DEFAULT_NAME: &str = "statistical";

/// Default number of standard deviations that counts as anomalous.
pub const DEFAULT_DEVIATION_THRESHOLD: f64 = 3.0;

/// Learned distribution of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterStats {
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Smallest observed value.
    pub min: f64,
    /// Largest observed value.
    pub max: f64,
    /// Number of observations.
    pub count: usize,
}

impl ParameterStats {
    /// Compute statistics over `values`, or `None` if empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
            count: values.len(),
        })
    }
}

/// Flags parameters whose latest value is more than `deviation_threshold`
/// standard deviations from the training mean.
///
/// Recognized configuration keys:
///
/// | Key | Meaning |
/// |---|---|
/// | `deviationThreshold` | z-score above which a value is anomalous (default 3.0) |
/// | `minStdDev` | parameters with a smaller spread are never scored |
/// | `trackedParameters` | comma-separated parameter names to score |
#[derive(Debug, Clone)]
pub struct StatisticalAnomalyModel {
    name: String,
    deviation_threshold: f64,
    min_std_dev: f64,
    tracked: Vec<&'static TrackedParameter>,
    stats: BTreeMap<&'static str, ParameterStats>,
}

impl StatisticalAnomalyModel {
    /// Create an untrained model tracking every catalog parameter.
    #[must_use]
    pub fn new() -> Self {
        Self::with_name(DEFAULT_NAME)
    }

    /// Create an untrained model registered under `name`.
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deviation_threshold: DEFAULT_DEVIATION_THRESHOLD,
            min_std_dev: f64::EPSILON,
            tracked: PARAMETERS.iter().collect(),
            stats: BTreeMap::new(),
        }
    }

    /// Current deviation threshold.
    #[must_use]
    pub fn deviation_threshold(&self) -> f64 {
        self.deviation_threshold
    }

    /// Whether a non-empty training set has been seen.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        !self.stats.is_empty()
    }

    /// Learned statistics for `parameter`, if trained.
    #[must_use]
    pub fn stats(&self, parameter: &str) -> Option<&ParameterStats> {
        self.stats.get(parameter)
    }

    /// Names of the parameters this model scores.
    #[must_use]
    pub fn tracked_parameters(&self) -> Vec<&'static str> {
        self.tracked.iter().map(|p| p.name).collect()
    }

    fn set_tracked(&mut self, list: &str) {
        let mut tracked = Vec::new();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match parameters::lookup(name) {
                Some(parameter) => tracked.push(parameter),
                None => warn!(model = %self.name, parameter = %name, "Unknown tracked parameter"),
            }
        }

        if tracked.is_empty() {
            warn!(model = %self.name, "No valid tracked parameters; keeping previous set");
        } else {
            self.tracked = tracked;
        }
    }
}

impl Default for StatisticalAnomalyModel {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_positive(model: &str, key: &str, raw: &str, allow_zero: bool) -> Option<f64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && (v > 0.0 || (allow_zero && v == 0.0)) => Some(v),
        Ok(v) => {
            warn!(model, key, value = v, "Value out of range; keeping previous");
            None
        }
        Err(e) => {
            warn!(model, key, value = %raw, error = %e, "Invalid number; keeping previous");
            None
        }
    }
}

impl AnomalyModel for StatisticalAnomalyModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, params: &ModelParams) -> Result<()> {
        if let Some(raw) = params.get("deviationThreshold") {
            if let Some(v) = parse_positive(&self.name, "deviationThreshold", raw, false) {
                self.deviation_threshold = v;
            }
        }
        if let Some(raw) = params.get("minStdDev") {
            if let Some(v) = parse_positive(&self.name, "minStdDev", raw, true) {
                self.min_std_dev = v;
            }
        }
        if let Some(list) = params.get("trackedParameters") {
            self.set_tracked(list);
        }

        debug!(
            model = %self.name,
            threshold = self.deviation_threshold,
            tracked = self.tracked.len(),
            "Statistical model initialized"
        );
        Ok(())
    }

    fn train(&mut self, samples: &[FlightParameters]) -> Result<()> {
        self.stats.clear();
        if samples.is_empty() {
            return Err(Error::insufficient_data(&self.name, "no training samples"));
        }

        for parameter in &self.tracked {
            let values: Vec<f64> = samples.iter().filter_map(|s| parameter.value(s)).collect();
            if let Some(stats) = ParameterStats::from_values(&values) {
                self.stats.insert(parameter.name, stats);
            }
        }

        info!(
            model = %self.name,
            samples = samples.len(),
            parameters = self.stats.len(),
            "Statistical model trained"
        );
        Ok(())
    }

    fn detect_anomalies(&self, samples: &[FlightParameters]) -> Result<Vec<FlightAnomaly>> {
        let Some(latest) = samples.last() else {
            return Ok(Vec::new());
        };
        if !self.is_trained() {
            return Ok(Vec::new());
        }

        let mut anomalies = Vec::new();
        for parameter in &self.tracked {
            let (Some(stats), Some(value)) = (self.stats.get(parameter.name), parameter.value(latest))
            else {
                continue;
            };
            // A parameter that never varied in training has no meaningful z-score.
            if stats.std_dev <= self.min_std_dev {
                continue;
            }

            let deviation = (value - stats.mean).abs() / stats.std_dev;
            if deviation <= self.deviation_threshold {
                continue;
            }

            let confidence = (deviation / (2.0 * self.deviation_threshold)).min(1.0);
            let unit = parameter.unit;
            anomalies.push(
                FlightAnomaly::new(
                    latest,
                    parameter.anomaly_type,
                    parameter.name,
                    &self.name,
                    confidence,
                    deviation,
                )
                .with_description(format!(
                    "{} is {deviation:.2} standard deviations from its baseline",
                    parameter.name
                ))
                .with_values(
                    format!("{:.2} ± {:.2} {unit}", stats.mean, stats.std_dev),
                    format!("{value:.2} {unit}"),
                )
                .with_evidence("value", value)
                .with_evidence("mean", stats.mean)
                .with_evidence("std_dev", stats.std_dev)
                .with_evidence("min", stats.min)
                .with_evidence("max", stats.max)
                .with_evidence("deviation", deviation),
            );
        }

        Ok(anomalies)
    }
}
