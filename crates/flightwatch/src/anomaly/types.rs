//! Anomaly finding types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::FlightParameters;

/// Broad category of an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    /// Position, attitude or speed outside expectations.
    Trajectory,
    /// Unusual control deflections.
    ControlInput,
    /// Engine output outside expectations.
    EnginePerformance,
    /// Navigation deviation outside expectations.
    Navigation,
    /// Aircraft configuration outside expectations.
    Configuration,
    /// Produced by a custom model.
    Custom,
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trajectory => "trajectory",
            Self::ControlInput => "control_input",
            Self::EnginePerformance => "engine_performance",
            Self::Navigation => "navigation",
            Self::Configuration => "configuration",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// A single anomaly reported by a model.
///
/// Created fresh per detection cycle and handed to the caller by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightAnomaly {
    /// Timestamp of the sample that was scored.
    pub timestamp: DateTime<Utc>,
    /// Session of the sample that was scored.
    pub session_id: String,
    /// Category.
    pub anomaly_type: AnomalyType,
    /// Parameter that triggered the finding.
    pub parameter: String,
    /// How strongly the model believes this is anomalous, `0.0..=1.0`.
    pub confidence: f64,
    /// Human-readable summary.
    pub description: String,
    /// What the model expected.
    pub expected: String,
    /// What was observed.
    pub actual: String,
    /// Name of the model that produced the finding.
    pub model_name: String,
    /// Model-specific magnitude of the deviation.
    pub deviation_score: f64,
    /// Named numeric evidence.
    pub evidence: BTreeMap<String, f64>,
}

impl FlightAnomaly {
    /// Start an anomaly for `sample` with empty text and evidence.
    ///
    /// `confidence` is clamped to `0.0..=1.0`.
    #[must_use]
    pub fn new(
        sample: &FlightParameters,
        anomaly_type: AnomalyType,
        parameter: impl Into<String>,
        model_name: impl Into<String>,
        confidence: f64,
        deviation_score: f64,
    ) -> Self {
        Self {
            timestamp: sample.timestamp,
            session_id: sample.session_id.clone(),
            anomaly_type,
            parameter: parameter.into(),
            confidence: confidence.clamp(0.0, 1.0),
            description: String::new(),
            expected: String::new(),
            actual: String::new(),
            model_name: model_name.into(),
            deviation_score,
            evidence: BTreeMap::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the expected and actual text.
    #[must_use]
    pub fn with_values(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = expected.into();
        self.actual = actual.into();
        self
    }

    /// Add a named piece of numeric evidence.
    #[must_use]
    pub fn with_evidence(mut self, name: impl Into<String>, value: f64) -> Self {
        self.evidence.insert(name.into(), value);
        self
    }
}
