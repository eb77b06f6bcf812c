//! Registry and orchestrator for anomaly models.

use std::panic::{self, AssertUnwindSafe};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::AnomalyConfig;
use crate::error::{Error, Result};
use crate::telemetry::FlightParameters;

use super::rules::RuleBasedAnomalyModel;
use super::statistical::StatisticalAnomalyModel;
use super::types::FlightAnomaly;
use super::{AnomalyModel, ModelParams};

/// Detector-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyDetectionParameters {
    /// Findings below this confidence are discarded.
    pub confidence_threshold: f64,
}

impl Default for AnomalyDetectionParameters {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
        }
    }
}

struct ModelEntry {
    model: Box<dyn AnomalyModel>,
    enabled: bool,
}

/// Runs a set of named [`AnomalyModel`]s over telemetry batches.
///
/// The registry sits behind a read-mostly lock, so the detector can be shared
/// through `Arc`: a control thread may register or reconfigure models while
/// the consumer thread is detecting, and the two never interleave.
pub struct AnomalyDetector {
    models: RwLock<Vec<ModelEntry>>,
    parameters: RwLock<AnomalyDetectionParameters>,
}

impl AnomalyDetector {
    /// Create a detector with no models.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parameters(AnomalyDetectionParameters::default())
    }

    /// Create a detector with no models and the given settings.
    #[must_use]
    pub fn with_parameters(parameters: AnomalyDetectionParameters) -> Self {
        Self {
            models: RwLock::new(Vec::new()),
            parameters: RwLock::new(parameters),
        }
    }

    /// Create a detector with the statistical and rule-based models,
    /// configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if either model rejects its configuration.
    pub fn from_config(config: &AnomalyConfig) -> Result<Self> {
        let detector = Self::with_parameters(AnomalyDetectionParameters {
            confidence_threshold: config.confidence_threshold,
        });

        let mut statistical = StatisticalAnomalyModel::new();
        statistical.initialize(&config.statistical_params())?;
        detector.register_model(Box::new(statistical))?;

        let mut rules = RuleBasedAnomalyModel::new();
        rules.initialize(&config.rules)?;
        detector.register_model(Box::new(rules))?;

        Ok(detector)
    }

    /// Current settings.
    #[must_use]
    pub fn parameters(&self) -> AnomalyDetectionParameters {
        *self.parameters.read()
    }

    /// Replace the settings.
    pub fn set_parameters(&self, parameters: AnomalyDetectionParameters) {
        *self.parameters.write() = parameters;
    }

    /// Add a model, enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateModel`] if a model with the same name exists.
    pub fn register_model(&self, model: Box<dyn AnomalyModel>) -> Result<()> {
        let mut models = self.models.write();
        let name = model.name().to_string();
        if models.iter().any(|e| e.model.name() == name) {
            warn!(model = %name, "Anomaly model already registered");
            return Err(Error::DuplicateModel { name });
        }

        models.push(ModelEntry {
            model,
            enabled: true,
        });
        info!(model = %name, "Anomaly model registered");
        Ok(())
    }

    /// Remove a model and return it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModel`] if no model has that name.
    pub fn unregister_model(&self, name: &str) -> Result<Box<dyn AnomalyModel>> {
        let mut models = self.models.write();
        let Some(index) = models.iter().position(|e| e.model.name() == name) else {
            warn!(model = %name, "Cannot unregister unknown anomaly model");
            return Err(unknown(name));
        };
        info!(model = %name, "Anomaly model unregistered");
        Ok(models.remove(index).model)
    }

    /// Enable or disable a model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModel`] if no model has that name.
    pub fn set_model_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut models = self.models.write();
        let entry = models
            .iter_mut()
            .find(|e| e.model.name() == name)
            .ok_or_else(|| unknown(name))?;
        entry.enabled = enabled;
        debug!(model = %name, enabled, "Anomaly model toggled");
        Ok(())
    }

    /// Whether a model is registered and enabled.
    #[must_use]
    pub fn is_model_enabled(&self, name: &str) -> bool {
        self.models
            .read()
            .iter()
            .any(|e| e.model.name() == name && e.enabled)
    }

    /// Re-run a model's `initialize` with new parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModel`] if no model has that name, or the
    /// model's own error if it rejects the parameters.
    pub fn configure_model(&self, name: &str, params: &ModelParams) -> Result<()> {
        let mut models = self.models.write();
        let entry = models
            .iter_mut()
            .find(|e| e.model.name() == name)
            .ok_or_else(|| unknown(name))?;
        entry.model.initialize(params)
    }

    /// Names of all registered models, in registration order.
    #[must_use]
    pub fn model_names(&self) -> Vec<String> {
        self.models
            .read()
            .iter()
            .map(|e| e.model.name().to_string())
            .collect()
    }

    /// Train every registered model on `samples`.
    ///
    /// A model that fails or panics is logged and the rest still train.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrainingFailed`] naming every model that failed.
    pub fn train(&self, samples: &[FlightParameters]) -> Result<()> {
        let mut models = self.models.write();
        let mut failed = Vec::new();

        for entry in models.iter_mut() {
            let model = &mut entry.model;
            match panic::catch_unwind(AssertUnwindSafe(|| model.train(samples))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(model = %entry.model.name(), error = %e, "Anomaly model failed to train");
                    failed.push(entry.model.name().to_string());
                }
                Err(_) => {
                    error!(model = %entry.model.name(), "Anomaly model panicked while training");
                    failed.push(entry.model.name().to_string());
                }
            }
        }

        if failed.is_empty() {
            info!(models = models.len(), samples = samples.len(), "Anomaly models trained");
            Ok(())
        } else {
            Err(Error::TrainingFailed { failed })
        }
    }

    /// Score the latest sample of `samples` with every enabled model.
    ///
    /// Findings below the confidence threshold are dropped; the rest are
    /// returned highest confidence first. A model that fails or panics is
    /// logged and skipped.
    #[must_use]
    pub fn detect_anomalies(&self, samples: &[FlightParameters]) -> Vec<FlightAnomaly> {
        if samples.is_empty() {
            return Vec::new();
        }

        let threshold = self.parameters.read().confidence_threshold;
        let models = self.models.read();
        let mut anomalies = Vec::new();

        for entry in models.iter().filter(|e| e.enabled) {
            match panic::catch_unwind(AssertUnwindSafe(|| entry.model.detect_anomalies(samples))) {
                Ok(Ok(found)) => {
                    anomalies.extend(found.into_iter().filter(|a| a.confidence >= threshold));
                }
                Ok(Err(e)) => {
                    error!(model = %entry.model.name(), error = %e, "Anomaly model failed; skipping");
                }
                Err(_) => {
                    error!(model = %entry.model.name(), "Anomaly model panicked; skipping");
                }
            }
        }

        anomalies.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        debug!(count = anomalies.len(), "Anomaly scan complete");
        anomalies
    }
}

fn unknown(name: &str) -> Error {
    Error::UnknownModel {
        name: name.to_string(),
    }
}

impl Default for AnomalyDetector {
    /// A detector with one [`StatisticalAnomalyModel`] and one
    /// [`RuleBasedAnomalyModel`], both with default settings.
    fn default() -> Self {
        let detector = Self::new();
        detector.models.write().extend([
            ModelEntry {
                model: Box::new(StatisticalAnomalyModel::new()),
                enabled: true,
            },
            ModelEntry {
                model: Box::new(RuleBasedAnomalyModel::new()),
                enabled: true,
            },
        ]);
        detector
    }
}

impl std::fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("models", &self.model_names())
            .field("parameters", &self.parameters())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyType;

    /// Fails every call.
    struct BrokenModel;

    impl AnomalyModel for BrokenModel {
        fn name(&self) -> &str {
            "broken"
        }

        fn initialize(&mut self, _params: &ModelParams) -> Result<()> {
            Err(Error::model_failed("broken", "cannot initialize"))
        }

        fn train(&mut self, _samples: &[FlightParameters]) -> Result<()> {
            Err(Error::model_failed("broken", "cannot train"))
        }

        fn detect_anomalies(&self, _samples: &[FlightParameters]) -> Result<Vec<FlightAnomaly>> {
            Err(Error::model_failed("broken", "cannot detect"))
        }
    }

    /// Panics on every call.
    struct PanickingModel;

    impl AnomalyModel for PanickingModel {
        fn name(&self) -> &str {
            "panicking"
        }

        fn initialize(&mut self, _params: &ModelParams) -> Result<()> {
            Ok(())
        }

        fn train(&mut self, _samples: &[FlightParameters]) -> Result<()> {
            panic!("training buffer exhausted");
        }

        fn detect_anomalies(&self, _samples: &[FlightParameters]) -> Result<Vec<FlightAnomaly>> {
            panic!("index out of range");
        }
    }

    /// Reports one finding per call with a fixed confidence.
    struct FixedModel {
        name: &'static str,
        confidence: f64,
    }

    impl AnomalyModel for FixedModel {
        fn name(&self) -> &str {
            self.name
        }

        fn initialize(&mut self, params: &ModelParams) -> Result<()> {
            if let Some(c) = params.get("confidence").and_then(|v| v.parse().ok()) {
                self.confidence = c;
            }
            Ok(())
        }

        fn train(&mut self, _samples: &[FlightParameters]) -> Result<()> {
            Ok(())
        }

        fn detect_anomalies(&self, samples: &[FlightParameters]) -> Result<Vec<FlightAnomaly>> {
            let latest = samples.last().unwrap();
            Ok(vec![FlightAnomaly::new(
                latest,
                AnomalyType::Custom,
                "custom",
                self.name,
                self.confidence,
                0.0,
            )])
        }
    }

    fn sample() -> FlightParameters {
        let mut sample = FlightParameters::new("s");
        sample.indicated_airspeed = 120.0;
        sample.altitude = 3000.0;
        sample
    }

    #[test]
    fn test_default_registers_two_models() {
        let detector = AnomalyDetector::default();
        assert_eq!(detector.model_names(), vec!["statistical", "rule_based"]);
        assert!(detector.is_model_enabled("statistical"));
        assert!(detector.is_model_enabled("rule_based"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let detector = AnomalyDetector::default();
        let err = detector
            .register_model(Box::new(StatisticalAnomalyModel::new()))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateModel { .. }));
        assert_eq!(detector.model_names().len(), 2);
    }

    #[test]
    fn test_unknown_model_operations_fail() {
        let detector = AnomalyDetector::new();
        assert!(matches!(
            detector.unregister_model("nope"),
            Err(Error::UnknownModel { .. })
        ));
        assert!(detector.set_model_enabled("nope", false).is_err());
        assert!(detector.configure_model("nope", &ModelParams::new()).is_err());
        assert!(!detector.is_model_enabled("nope"));
    }

    #[test]
    fn test_unregister_returns_model() {
        let detector = AnomalyDetector::default();
        let model = detector.unregister_model("rule_based").unwrap();
        assert_eq!(model.name(), "rule_based");
        assert_eq!(detector.model_names(), vec!["statistical"]);
    }

    #[test]
    fn test_results_sorted_by_confidence() {
        let detector = AnomalyDetector::new();
        detector
            .register_model(Box::new(FixedModel { name: "low", confidence: 0.6 }))
            .unwrap();
        detector
            .register_model(Box::new(FixedModel { name: "high", confidence: 0.95 }))
            .unwrap();
        detector
            .register_model(Box::new(FixedModel { name: "mid", confidence: 0.8 }))
            .unwrap();

        let names: Vec<_> = detector
            .detect_anomalies(&[sample()])
            .into_iter()
            .map(|a| a.model_name)
            .collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_confidence_threshold_filters() {
        let detector = AnomalyDetector::new();
        detector
            .register_model(Box::new(FixedModel { name: "weak", confidence: 0.3 }))
            .unwrap();
        assert!(detector.detect_anomalies(&[sample()]).is_empty());

        detector.set_parameters(AnomalyDetectionParameters {
            confidence_threshold: 0.2,
        });
        assert_eq!(detector.detect_anomalies(&[sample()]).len(), 1);
    }

    #[test]
    fn test_disabled_model_skipped() {
        let detector = AnomalyDetector::new();
        detector
            .register_model(Box::new(FixedModel { name: "fixed", confidence: 0.9 }))
            .unwrap();
        detector.set_model_enabled("fixed", false).unwrap();
        assert!(!detector.is_model_enabled("fixed"));
        assert!(detector.detect_anomalies(&[sample()]).is_empty());
    }

    #[test]
    fn test_failing_model_does_not_abort_scan() {
        let detector = AnomalyDetector::new();
        detector.register_model(Box::new(BrokenModel)).unwrap();
        detector
            .register_model(Box::new(FixedModel { name: "fixed", confidence: 0.9 }))
            .unwrap();

        let anomalies = detector.detect_anomalies(&[sample()]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].model_name, "fixed");
    }

    #[test]
    fn test_panicking_model_does_not_abort_scan() {
        let detector = AnomalyDetector::default();
        detector.register_model(Box::new(PanickingModel)).unwrap();

        let mut fast = sample();
        fast.indicated_airspeed = 300.0;
        let anomalies = detector.detect_anomalies(&[fast]);

        assert!(anomalies
            .iter()
            .any(|a| a.model_name == "rule_based" && a.parameter == "airspeed"));
        assert!(anomalies.iter().all(|a| a.model_name != "panicking"));
    }

    #[test]
    fn test_panicking_model_reported_as_training_failure() {
        let detector = AnomalyDetector::new();
        detector.register_model(Box::new(PanickingModel)).unwrap();
        detector
            .register_model(Box::new(FixedModel { name: "fixed", confidence: 0.9 }))
            .unwrap();

        let err = detector.train(&[sample()]).unwrap_err();
        let Error::TrainingFailed { failed } = err else {
            panic!("expected training failure");
        };
        assert_eq!(failed, vec!["panicking"]);
        assert_eq!(detector.detect_anomalies(&[sample()]).len(), 1);
    }

    #[test]
    fn test_train_reports_failures_but_trains_others() {
        let detector = AnomalyDetector::default();
        detector.register_model(Box::new(BrokenModel)).unwrap();

        let training: Vec<_> = (0..20).map(|_| sample()).collect();
        let err = detector.train(&training).unwrap_err();
        match err {
            Error::TrainingFailed { failed } => assert_eq!(failed, vec!["broken"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_train_all_succeed() {
        let detector = AnomalyDetector::default();
        let training: Vec<_> = (0..20).map(|_| sample()).collect();
        assert!(detector.train(&training).is_ok());
    }

    #[test]
    fn test_configure_model_reinitializes() {
        let detector = AnomalyDetector::new();
        detector
            .register_model(Box::new(FixedModel { name: "fixed", confidence: 0.9 }))
            .unwrap();
        let params = ModelParams::from([("confidence".to_string(), "0.1".to_string())]);
        detector.configure_model("fixed", &params).unwrap();
        assert!(detector.detect_anomalies(&[sample()]).is_empty());

        detector.register_model(Box::new(BrokenModel)).unwrap();
        assert!(detector.configure_model("broken", &params).is_err());
    }

    #[test]
    fn test_default_detector_rule_violation() {
        let detector = AnomalyDetector::default();
        let mut s = sample();
        s.roll = 60.0;
        let anomalies = detector.detect_anomalies(&[s]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].parameter, "roll");
        assert_eq!(anomalies[0].model_name, "rule_based");
    }

    #[test]
    fn test_from_config() {
        let mut config = AnomalyConfig::default();
        config.confidence_threshold = 0.95;
        let detector = AnomalyDetector::from_config(&config).unwrap();
        assert_eq!(detector.model_names(), vec!["statistical", "rule_based"]);

        // Rule findings (0.9) are below the configured threshold.
        let mut s = sample();
        s.roll = 60.0;
        assert!(detector.detect_anomalies(&[s]).is_empty());
    }

    #[test]
    fn test_concurrent_registration_and_detection() {
        use std::sync::Arc;
        use std::thread;

        let detector = Arc::new(AnomalyDetector::default());
        let scanner = {
            let detector = Arc::clone(&detector);
            thread::spawn(move || {
                for _ in 0..200 {
                    let _ = detector.detect_anomalies(&[sample()]);
                }
            })
        };
        for i in 0..50 {
            let name: &'static str = Box::leak(format!("m{i}").into_boxed_str());
            detector
                .register_model(Box::new(FixedModel { name, confidence: 0.9 }))
                .unwrap();
        }
        scanner.join().unwrap();
        assert_eq!(detector.model_names().len(), 52);
    }
}
