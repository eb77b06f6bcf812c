//! Limits used by the built-in event detectors.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::anomaly::ModelParams;
use crate::error::{Error, Result};

/// Maximum flap extension allowed at or below a speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlapLimit {
    /// Indicated airspeed this entry applies up to, in knots.
    pub max_speed: f64,
    /// Largest allowed flap setting, `0..=1`.
    pub max_flaps: f64,
}

/// Thresholds for the built-in event detectors.
///
/// Loaded from the `[events]` config section, and overridable at runtime
/// through [`EventDetector::initialize`](super::EventDetector::initialize)
/// using the camel-case keys listed on [`EventThresholds::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventThresholds {
    /// Bank angle limit in degrees.
    pub bank_angle_limit: f64,
    /// Pitch angle limit in degrees.
    pub pitch_angle_limit: f64,
    /// Allowed distance from selected altitude in feet.
    pub altitude_deviation: f64,
    /// Allowed distance from selected heading in degrees.
    pub heading_deviation: f64,
    /// Allowed distance from selected airspeed in knots.
    pub speed_deviation: f64,
    /// Allowed glideslope deviation in dots.
    pub glideslope_deviation: f64,
    /// Allowed localizer deviation in dots.
    pub localizer_deviation: f64,
    /// Minimum airspeed for a lift-off to count as a takeoff, in knots.
    pub takeoff_speed: f64,
    /// Touchdown descent rate above which a landing is hard, in fpm.
    pub hard_landing: f64,
    /// Touchdown descent rate above which a landing is firm, in fpm.
    pub firm_landing: f64,
    /// Maximum airspeed with gear extended, in knots.
    pub max_gear_speed: f64,
    /// Flap limits by speed, ascending by `max_speed`. Above the last entry
    /// flaps must be retracted.
    pub flap_schedule: Vec<FlapLimit>,
}

impl Default for EventThresholds {
    fn default() -> Self {
        Self {
            bank_angle_limit: 45.0,
            pitch_angle_limit: 30.0,
            altitude_deviation: 300.0,
            heading_deviation: 10.0,
            speed_deviation: 15.0,
            glideslope_deviation: 1.0,
            localizer_deviation: 1.0,
            takeoff_speed: 40.0,
            hard_landing: 600.0,
            firm_landing: 300.0,
            max_gear_speed: 200.0,
            flap_schedule: vec![
                FlapLimit {
                    max_speed: 100.0,
                    max_flaps: 1.0,
                },
                FlapLimit {
                    max_speed: 140.0,
                    max_flaps: 0.5,
                },
                FlapLimit {
                    max_speed: 180.0,
                    max_flaps: 0.25,
                },
            ],
        }
    }
}

impl EventThresholds {
    /// Largest flap setting allowed at `airspeed`.
    #[must_use]
    pub fn allowed_flaps(&self, airspeed: f64) -> f64 {
        self.flap_schedule
            .iter()
            .find(|limit| airspeed <= limit.max_speed)
            .map_or(0.0, |limit| limit.max_flaps)
    }

    /// Override thresholds from a string map.
    ///
    /// Recognized keys: `bankAngleLimit`, `pitchAngleLimit`,
    /// `altitudeDeviation`, `headingDeviation`, `speedDeviation`,
    /// `glideslopeDeviation`, `localizerDeviation`, `takeoffSpeed`,
    /// `hardLanding`, `firmLanding`, `maxGearSpeed`. Unknown keys and values
    /// that are not finite numbers are logged and ignored.
    pub fn apply(&mut self, params: &ModelParams) {
        for (key, raw) in params {
            let Some(slot) = self.field_mut(key) else {
                warn!(key = %key, "Unknown event threshold; ignoring");
                continue;
            };
            match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => *slot = value,
                _ => warn!(key = %key, value = %raw, "Malformed event threshold; ignoring"),
            }
        }
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut f64> {
        let field = match key {
            "bankAngleLimit" => &mut self.bank_angle_limit,
            "pitchAngleLimit" => &mut self.pitch_angle_limit,
            "altitudeDeviation" => &mut self.altitude_deviation,
            "headingDeviation" => &mut self.heading_deviation,
            "speedDeviation" => &mut self.speed_deviation,
            "glideslopeDeviation" => &mut self.glideslope_deviation,
            "localizerDeviation" => &mut self.localizer_deviation,
            "takeoffSpeed" => &mut self.takeoff_speed,
            "hardLanding" => &mut self.hard_landing,
            "firmLanding" => &mut self.firm_landing,
            "maxGearSpeed" => &mut self.max_gear_speed,
            _ => return None,
        };
        Some(field)
    }

    /// Check that the limits are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if a limit is negative or not
    /// finite, the firm landing rate exceeds the hard one, or the flap
    /// schedule is not ascending.
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("bank_angle_limit", self.bank_angle_limit),
            ("pitch_angle_limit", self.pitch_angle_limit),
            ("altitude_deviation", self.altitude_deviation),
            ("heading_deviation", self.heading_deviation),
            ("speed_deviation", self.speed_deviation),
            ("glideslope_deviation", self.glideslope_deviation),
            ("localizer_deviation", self.localizer_deviation),
            ("takeoff_speed", self.takeoff_speed),
            ("hard_landing", self.hard_landing),
            ("firm_landing", self.firm_landing),
            ("max_gear_speed", self.max_gear_speed),
        ];
        for (name, value) in limits {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::config_validation(format!(
                    "events.{name} must be a non-negative number, got {value}"
                )));
            }
        }

        if self.firm_landing > self.hard_landing {
            return Err(Error::config_validation(
                "events.firm_landing must not exceed events.hard_landing",
            ));
        }

        if self
            .flap_schedule
            .windows(2)
            .any(|pair| pair[0].max_speed >= pair[1].max_speed)
        {
            return Err(Error::config_validation(
                "events.flap_schedule must be sorted by ascending max_speed",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let t = EventThresholds::default();
        assert!((t.bank_angle_limit - 45.0).abs() < f64::EPSILON);
        assert!((t.max_gear_speed - 200.0).abs() < f64::EPSILON);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_allowed_flaps() {
        let t = EventThresholds::default();
        assert!((t.allowed_flaps(90.0) - 1.0).abs() < f64::EPSILON);
        assert!((t.allowed_flaps(100.0) - 1.0).abs() < f64::EPSILON);
        assert!((t.allowed_flaps(120.0) - 0.5).abs() < f64::EPSILON);
        assert!((t.allowed_flaps(175.0) - 0.25).abs() < f64::EPSILON);
        assert!(t.allowed_flaps(250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_apply_overrides() {
        let mut t = EventThresholds::default();
        let params = ModelParams::from([
            ("bankAngleLimit".to_string(), "30".to_string()),
            ("hardLanding".to_string(), " 700 ".to_string()),
            ("maxGearSpeed".to_string(), "fast".to_string()),
            ("warpLimit".to_string(), "9".to_string()),
        ]);
        t.apply(&params);

        assert!((t.bank_angle_limit - 30.0).abs() < f64::EPSILON);
        assert!((t.hard_landing - 700.0).abs() < f64::EPSILON);
        assert!((t.max_gear_speed - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut t = EventThresholds::default();
        t.bank_angle_limit = -1.0;
        assert!(t.validate().is_err());

        let mut t = EventThresholds::default();
        t.firm_landing = 900.0;
        assert!(t.validate().is_err());

        let mut t = EventThresholds::default();
        t.flap_schedule.reverse();
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let t: EventThresholds = serde_json::from_str(r#"{"bank_angle_limit": 60.0}"#).unwrap();
        assert!((t.bank_angle_limit - 60.0).abs() < f64::EPSILON);
        assert_eq!(t.flap_schedule.len(), 3);
    }
}
