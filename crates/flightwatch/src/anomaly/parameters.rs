//! Catalog of scalar parameters the anomaly models can score.
//!
//! Both models refer to parameters by name (`"altitude"`, `"airspeed"`, ...);
//! this table is the single place those names are resolved to values.

use crate::telemetry::FlightParameters;

use super::types::AnomalyType;

/// A named scalar that can be extracted from a sample.
#[derive(Debug, Clone, Copy)]
pub struct TrackedParameter {
    /// Name used in configuration keys and findings.
    pub name: &'static str,
    /// Unit for human-readable text.
    pub unit: &'static str,
    /// Category of anomalies on this parameter.
    pub anomaly_type: AnomalyType,
    extract: fn(&FlightParameters) -> Option<f64>,
}

impl TrackedParameter {
    /// Extract this parameter from a sample.
    ///
    /// Returns `None` when the sample has no value (e.g. no engines) or the
    /// value is not finite.
    #[must_use]
    pub fn value(&self, sample: &FlightParameters) -> Option<f64> {
        (self.extract)(sample).filter(|v| v.is_finite())
    }
}

/// Every parameter known to the anomaly models.
pub static PARAMETERS: &[TrackedParameter] = &[
    TrackedParameter {
        name: "altitude",
        unit: "ft",
        anomaly_type: AnomalyType::Trajectory,
        extract: |p| Some(p.altitude),
    },
    TrackedParameter {
        name: "heading",
        unit: "deg",
        anomaly_type: AnomalyType::Trajectory,
        extract: |p| Some(p.heading),
    },
    TrackedParameter {
        name: "pitch",
        unit: "deg",
        anomaly_type: AnomalyType::Trajectory,
        extract: |p| Some(p.pitch),
    },
    TrackedParameter {
        name: "roll",
        unit: "deg",
        anomaly_type: AnomalyType::Trajectory,
        extract: |p| Some(p.roll),
    },
    TrackedParameter {
        name: "ground_speed",
        unit: "kt",
        anomaly_type: AnomalyType::Trajectory,
        extract: |p| Some(p.ground_speed),
    },
    TrackedParameter {
        name: "airspeed",
        unit: "kt",
        anomaly_type: AnomalyType::Trajectory,
        extract: |p| Some(p.indicated_airspeed),
    },
    TrackedParameter {
        name: "true_airspeed",
        unit: "kt",
        anomaly_type: AnomalyType::Trajectory,
        extract: |p| Some(p.true_airspeed),
    },
    TrackedParameter {
        name: "vertical_speed",
        unit: "fpm",
        anomaly_type: AnomalyType::Trajectory,
        extract: |p| Some(p.vertical_speed),
    },
    TrackedParameter {
        name: "elevator",
        unit: "",
        anomaly_type: AnomalyType::ControlInput,
        extract: |p| Some(p.elevator),
    },
    TrackedParameter {
        name: "aileron",
        unit: "",
        anomaly_type: AnomalyType::ControlInput,
        extract: |p| Some(p.aileron),
    },
    TrackedParameter {
        name: "rudder",
        unit: "",
        anomaly_type: AnomalyType::ControlInput,
        extract: |p| Some(p.rudder),
    },
    TrackedParameter {
        name: "throttle",
        unit: "",
        anomaly_type: AnomalyType::ControlInput,
        extract: |p| Some(p.throttle),
    },
    TrackedParameter {
        name: "engine_rpm",
        unit: "rpm",
        anomaly_type: AnomalyType::EnginePerformance,
        extract: FlightParameters::mean_engine_rpm,
    },
    TrackedParameter {
        name: "engine_power",
        unit: "%",
        anomaly_type: AnomalyType::EnginePerformance,
        extract: FlightParameters::mean_engine_power,
    },
    TrackedParameter {
        name: "glideslope",
        unit: "dots",
        anomaly_type: AnomalyType::Navigation,
        extract: |p| Some(p.glideslope_deviation),
    },
    TrackedParameter {
        name: "localizer",
        unit: "dots",
        anomaly_type: AnomalyType::Navigation,
        extract: |p| Some(p.localizer_deviation),
    },
];

/// Find a parameter by name.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static TrackedParameter> {
    PARAMETERS.iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert_eq!(lookup("airspeed").map(|p| p.unit), Some("kt"));
        assert!(lookup("warp_factor").is_none());
    }

    #[test]
    fn test_names_are_unique() {
        for (i, a) in PARAMETERS.iter().enumerate() {
            for b in &PARAMETERS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn test_value_extraction() {
        let mut sample = FlightParameters::new("s");
        sample.indicated_airspeed = 120.0;
        sample.engine_rpm = vec![2300.0, 2500.0];

        assert_eq!(lookup("airspeed").unwrap().value(&sample), Some(120.0));
        assert_eq!(lookup("engine_rpm").unwrap().value(&sample), Some(2400.0));
        assert_eq!(lookup("engine_power").unwrap().value(&sample), None);
    }

    #[test]
    fn test_non_finite_values_are_dropped() {
        let mut sample = FlightParameters::new("s");
        sample.altitude = f64::NAN;
        assert_eq!(lookup("altitude").unwrap().value(&sample), None);
    }
}
