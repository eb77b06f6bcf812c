//! Anomaly detection over telemetry batches.
//!
//! This module provides pluggable anomaly models and the registry that runs
//! them:
//!
//! - **[`StatisticalAnomalyModel`]**: learns mean and standard deviation per
//!   parameter and flags samples too many standard deviations away.
//!
//! - **[`RuleBasedAnomalyModel`]**: flags samples outside configured
//!   `min`/`max` bounds.
//!
//! - **Custom models**: anything implementing [`AnomalyModel`].
//!
//! - **[`AnomalyDetector`]**: runs every enabled model, filters by confidence
//!   and ranks the findings.
//!
//! Models score only the latest sample of the batch they are given.
//!
//! # Example
//!
//! ```
//! use flightwatch::anomaly::AnomalyDetector;
//! use flightwatch::FlightParameters;
//!
//! let detector = AnomalyDetector::default();
//!
//! let mut sample = FlightParameters::new("session-1");
//! sample.indicated_airspeed = 300.0;
//!
//! let anomalies = detector.detect_anomalies(&[sample]);
//! assert_eq!(anomalies[0].parameter, "airspeed");
//! ```

mod detector;
pub mod parameters;
mod rules;
mod statistical;
mod types;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::telemetry::FlightParameters;

pub use detector::{AnomalyDetectionParameters, AnomalyDetector};
pub use parameters::TrackedParameter;
pub use rules::{Rule, RuleBasedAnomalyModel};
pub use statistical::{ParameterStats, StatisticalAnomalyModel};
pub use types::{AnomalyType, FlightAnomaly};

/// String-keyed configuration passed to [`AnomalyModel::initialize`].
pub type ModelParams = BTreeMap<String, String>;

/// A pluggable anomaly detector.
///
/// Implementors are registered with an [`AnomalyDetector`] under their
/// [`name`](AnomalyModel::name). Errors returned from any method are logged by
/// the detector and do not stop other models.
pub trait AnomalyModel: Send + Sync {
    /// Registry key for this model.
    fn name(&self) -> &str;

    /// Apply configuration. Malformed values should be logged and ignored
    /// rather than failing the whole call.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be used with this configuration.
    fn initialize(&mut self, params: &ModelParams) -> Result<()>;

    /// Learn from a training set.
    ///
    /// # Errors
    ///
    /// Returns an error if the model could not be trained.
    fn train(&mut self, samples: &[FlightParameters]) -> Result<()>;

    /// Score the latest sample of `samples`.
    ///
    /// # Errors
    ///
    /// Returns an error if scoring failed.
    fn detect_anomalies(&self, samples: &[FlightParameters]) -> Result<Vec<FlightAnomaly>>;
}
