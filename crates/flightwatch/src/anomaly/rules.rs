//! Rule-based (bounds) anomaly model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::telemetry::FlightParameters;

use super::parameters;
use super::types::FlightAnomaly;
use super::{AnomalyModel, ModelParams};

/// Default registry name.
pub const DEFAULT_NAME: &str = "rule_based";

/// Confidence assigned to every rule violation.
pub const RULE_CONFIDENCE: f64 = 0.9;

/// Allowed range for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Smallest allowed value.
    pub min: f64,
    /// Largest allowed value.
    pub max: f64,
    /// Whether the rule is checked.
    pub enabled: bool,
}

impl Rule {
    /// An enabled rule over `min..=max`.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            enabled: true,
        }
    }

    /// An enabled rule that accepts every value.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    /// The bound `value` violates, if any. Values equal to a bound pass.
    #[must_use]
    pub fn violated_bound(&self, value: f64) -> Option<f64> {
        if value > self.max {
            Some(self.max)
        } else if value < self.min {
            Some(self.min)
        } else {
            None
        }
    }
}

/// Rules every new model starts with.
fn default_rules() -> BTreeMap<String, Rule> {
    BTreeMap::from([
        ("airspeed".to_string(), Rule::new(60.0, 250.0)),
        ("altitude".to_string(), Rule::new(0.0, 10_000.0)),
        ("vertical_speed".to_string(), Rule::new(-1000.0, 1000.0)),
        ("pitch".to_string(), Rule::new(-20.0, 20.0)),
        ("roll".to_string(), Rule::new(-45.0, 45.0)),
    ])
}

/// Flags parameters outside configured bounds.
///
/// Configuration keys take the form `<parameter>.min`, `<parameter>.max` and
/// `<parameter>.enabled`, where `<parameter>` is any catalog name. Naming a
/// parameter without a rule creates one that is unbounded on the unset side.
#[derive(Debug, Clone)]
pub struct RuleBasedAnomalyModel {
    name: String,
    rules: BTreeMap<String, Rule>,
    initialized: bool,
}

impl RuleBasedAnomalyModel {
    /// Create a model with the default rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_name(DEFAULT_NAME)
    }

    /// Create a model with the default rules registered under `name`.
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: default_rules(),
            initialized: true,
        }
    }

    /// Create a model with no rules that refuses to train until
    /// [`initialize`](AnomalyModel::initialize) has been called.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: BTreeMap::new(),
            initialized: false,
        }
    }

    /// Current rule for `parameter`.
    #[must_use]
    pub fn rule(&self, parameter: &str) -> Option<&Rule> {
        self.rules.get(parameter)
    }

    /// All rules, keyed by parameter name.
    #[must_use]
    pub fn rules(&self) -> &BTreeMap<String, Rule> {
        &self.rules
    }

    fn apply(&mut self, key: &str, raw: &str) {
        let Some((parameter, field)) = key.split_once('.') else {
            debug!(model = %self.name, key, "Ignoring key without a field");
            return;
        };
        if parameters::lookup(parameter).is_none() {
            warn!(model = %self.name, parameter, "Rule for unknown parameter ignored");
            return;
        }

        let raw = raw.trim();
        match field {
            "min" | "max" => match raw.parse::<f64>() {
                Ok(v) if !v.is_nan() => {
                    let rule = self
                        .rules
                        .entry(parameter.to_string())
                        .or_insert_with(Rule::unbounded);
                    if field == "min" {
                        rule.min = v;
                    } else {
                        rule.max = v;
                    }
                }
                _ => warn!(model = %self.name, key, value = %raw, "Invalid rule bound; keeping previous"),
            },
            "enabled" => match parse_bool(raw) {
                Some(enabled) => {
                    self.rules
                        .entry(parameter.to_string())
                        .or_insert_with(Rule::unbounded)
                        .enabled = enabled;
                }
                None => warn!(model = %self.name, key, value = %raw, "Invalid rule flag; keeping previous"),
            },
            _ => warn!(model = %self.name, key, "Unknown rule field"),
        }
    }
}

impl Default for RuleBasedAnomalyModel {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl AnomalyModel for RuleBasedAnomalyModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, params: &ModelParams) -> Result<()> {
        for (key, value) in params {
            self.apply(key, value);
        }
        for (parameter, rule) in &self.rules {
            if rule.min > rule.max {
                warn!(model = %self.name, parameter = %parameter, min = rule.min, max = rule.max, "Rule can never pass");
            }
        }
        self.initialized = true;
        debug!(model = %self.name, rules = self.rules.len(), "Rule model initialized");
        Ok(())
    }

    fn train(&mut self, _samples: &[FlightParameters]) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::ModelNotInitialized {
                name: self.name.clone(),
            })
        }
    }

    fn detect_anomalies(&self, samples: &[FlightParameters]) -> Result<Vec<FlightAnomaly>> {
        let Some(latest) = samples.last() else {
            return Ok(Vec::new());
        };

        let mut anomalies = Vec::new();
        for (name, rule) in self.rules.iter().filter(|(_, r)| r.enabled) {
            let Some(parameter) = parameters::lookup(name) else {
                continue;
            };
            let Some(value) = parameter.value(latest) else {
                continue;
            };
            let Some(bound) = rule.violated_bound(value) else {
                continue;
            };

            let direction = if value > rule.max { "above maximum" } else { "below minimum" };
            let deviation = (value - bound).abs() / bound.abs().max(1.0);
            let unit = parameter.unit;
            anomalies.push(
                FlightAnomaly::new(
                    latest,
                    parameter.anomaly_type,
                    name.as_str(),
                    &self.name,
                    RULE_CONFIDENCE,
                    deviation,
                )
                .with_description(format!("{name} {value:.2} {unit} is {direction} {bound:.2} {unit}"))
                .with_values(
                    format!("{:.2}..={:.2} {unit}", rule.min, rule.max),
                    format!("{value:.2} {unit}"),
                )
                .with_evidence("value", value)
                .with_evidence("min", rule.min)
                .with_evidence("max", rule.max)
                .with_evidence("bound", bound),
            );
        }

        Ok(anomalies)
    }
}
