//! Core telemetry types for flightwatch.
//!
//! A [`FlightParameters`] value is one instant of simulator state. Producers
//! push them into the ring buffer; the detectors read them without mutation.

use std::fmt;
use std::io::BufRead;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Coarse flight-lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightPhase {
    /// Phase is not known (e.g. before the first sample).
    #[default]
    Unknown,
    /// Parked, systems being set up.
    Preflight,
    /// Moving on the ground under own power.
    Taxi,
    /// Takeoff roll and initial climb.
    Takeoff,
    /// Climbing to cruise altitude.
    Climb,
    /// Level flight.
    Cruise,
    /// Descending from cruise.
    Descent,
    /// Established on an approach.
    Approach,
    /// Flare and touchdown.
    Landing,
    /// Decelerating on the runway.
    Rollout,
    /// Rejected landing and climb-out.
    GoAround,
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Preflight => "preflight",
            Self::Taxi => "taxi",
            Self::Takeoff => "takeoff",
            Self::Climb => "climb",
            Self::Cruise => "cruise",
            Self::Descent => "descent",
            Self::Approach => "approach",
            Self::Landing => "landing",
            Self::Rollout => "rollout",
            Self::GoAround => "go_around",
        };
        f.write_str(name)
    }
}

/// A snapshot of simulator state at one instant.
///
/// Angles are in degrees, altitudes in feet, speeds in knots and vertical
/// speed in feet per minute. Control deflections are normalized to `-1..=1`
/// (throttle and flaps to `0..=1`). Navigation deviations are in dots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightParameters {
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Training session this sample belongs to.
    pub session_id: String,

    // Position and attitude
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in feet MSL.
    pub altitude: f64,
    /// Heading in degrees, `0..360`.
    pub heading: f64,
    /// Pitch in degrees, nose up positive.
    pub pitch: f64,
    /// Roll in degrees, right wing down positive.
    pub roll: f64,

    // Velocities
    /// Ground speed in knots.
    pub ground_speed: f64,
    /// Indicated airspeed in knots.
    pub indicated_airspeed: f64,
    /// True airspeed in knots.
    pub true_airspeed: f64,
    /// Vertical speed in feet per minute.
    pub vertical_speed: f64,

    // Control inputs
    /// Elevator deflection.
    pub elevator: f64,
    /// Aileron deflection.
    pub aileron: f64,
    /// Rudder deflection.
    pub rudder: f64,
    /// Throttle position.
    pub throttle: f64,
    /// Flap extension, 0 retracted to 1 full.
    pub flaps: f64,
    /// Speed brake extension.
    pub speed_brake: f64,
    /// Landing gear extended.
    pub gear_down: bool,

    // Engines
    /// Per-engine RPM.
    pub engine_rpm: Vec<f64>,
    /// Per-engine power in percent.
    pub engine_power: Vec<f64>,

    // Autopilot selections
    /// Selected altitude in feet.
    pub selected_altitude: f64,
    /// Selected heading in degrees.
    pub selected_heading: f64,
    /// Selected airspeed in knots.
    pub selected_airspeed: f64,

    // Navigation
    /// Glideslope deviation in dots.
    pub glideslope_deviation: f64,
    /// Localizer deviation in dots.
    pub localizer_deviation: f64,

    // State flags
    /// Weight on wheels.
    pub on_ground: bool,
    /// Stall warning active.
    pub stall: bool,
    /// Overspeed warning active.
    pub overspeed: bool,
    /// Autopilot engaged.
    pub autopilot_engaged: bool,
    /// Any injected failure active.
    pub failure_active: bool,
    /// Names of active injected failures.
    pub active_failures: Vec<String>,
    /// Electrical system healthy.
    pub electrical_ok: bool,
    /// Hydraulic system healthy.
    pub hydraulic_ok: bool,
    /// Avionics healthy.
    pub avionics_ok: bool,
    /// Fuel system healthy.
    pub fuel_ok: bool,
    /// Instructor has paused the session.
    pub instructor_pause: bool,
    /// Instructor has reset the session.
    pub instructor_reset: bool,

    /// Current flight phase.
    pub phase: FlightPhase,
}

impl Default for FlightParameters {
    fn default() -> Self {
        Self {
            timestamp: DateTime::<Utc>::default(),
            session_id: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            heading: 0.0,
            pitch: 0.0,
            roll: 0.0,
            ground_speed: 0.0,
            indicated_airspeed: 0.0,
            true_airspeed: 0.0,
            vertical_speed: 0.0,
            elevator: 0.0,
            aileron: 0.0,
            rudder: 0.0,
            throttle: 0.0,
            flaps: 0.0,
            speed_brake: 0.0,
            gear_down: false,
            engine_rpm: Vec::new(),
            engine_power: Vec::new(),
            selected_altitude: 0.0,
            selected_heading: 0.0,
            selected_airspeed: 0.0,
            glideslope_deviation: 0.0,
            localizer_deviation: 0.0,
            on_ground: false,
            stall: false,
            overspeed: false,
            autopilot_engaged: false,
            failure_active: false,
            active_failures: Vec::new(),
            // Subsystems report healthy unless a sample says otherwise
            electrical_ok: true,
            hydraulic_ok: true,
            avionics_ok: true,
            fuel_ok: true,
            instructor_pause: false,
            instructor_reset: false,
            phase: FlightPhase::Unknown,
        }
    }
}

impl FlightParameters {
    /// Create a sample for `session_id` with healthy systems and everything
    /// else zeroed, timestamped now.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// Whether the aircraft is off the ground.
    #[must_use]
    pub fn airborne(&self) -> bool {
        !self.on_ground
    }

    /// Mean RPM across all engines, or `None` with no engines.
    #[must_use]
    pub fn mean_engine_rpm(&self) -> Option<f64> {
        mean(&self.engine_rpm)
    }

    /// Mean power across all engines, or `None` with no engines.
    #[must_use]
    pub fn mean_engine_power(&self) -> Option<f64> {
        mean(&self.engine_power)
    }

    /// Whether any subsystem reports a fault.
    #[must_use]
    pub fn has_system_fault(&self) -> bool {
        !(self.electrical_ok && self.hydraulic_ok && self.avionics_ok && self.fuel_ok)
            || self.failure_active
            || !self.active_failures.is_empty()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        #[allow(clippy::cast_precision_loss)]
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Shortest angular distance between two headings, in degrees `0..=180`.
///
/// `heading_difference(350.0, 5.0)` is `15.0`.
#[must_use]
pub fn heading_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Parse JSON-lines telemetry, one [`FlightParameters`] object per line.
///
/// Blank lines and lines starting with `#` are skipped.
///
/// # Errors
///
/// Returns [`Error::InvalidSample`] naming the first line that does not parse,
/// or [`Error::Io`] if reading fails.
pub fn read_samples<R: BufRead>(reader: R) -> Result<Vec<FlightParameters>> {
    let mut samples = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let sample = serde_json::from_str(trimmed).map_err(|source| Error::InvalidSample {
            line: index + 1,
            source,
        })?;
        samples.push(sample);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(FlightPhase::GoAround.to_string(), "go_around");
        assert_eq!(FlightPhase::Approach.to_string(), "approach");
        assert_eq!(FlightPhase::default(), FlightPhase::Unknown);
    }

    #[test]
    fn test_new_sample_is_healthy() {
        let sample = FlightParameters::new("s1");
        assert_eq!(sample.session_id, "s1");
        assert!(!sample.has_system_fault());
        assert!(sample.airborne());
    }

    #[test]
    fn test_system_fault_flags() {
        let mut sample = FlightParameters::new("s1");
        sample.hydraulic_ok = false;
        assert!(sample.has_system_fault());

        let mut sample = FlightParameters::new("s1");
        sample.active_failures.push("engine_fire".to_string());
        assert!(sample.has_system_fault());
    }

    #[test]
    fn test_engine_means() {
        let mut sample = FlightParameters::new("s1");
        assert!(sample.mean_engine_rpm().is_none());

        sample.engine_rpm = vec![2000.0, 2400.0];
        sample.engine_power = vec![70.0];
        assert_eq!(sample.mean_engine_rpm(), Some(2200.0));
        assert_eq!(sample.mean_engine_power(), Some(70.0));
    }

    #[test]
    fn test_heading_difference_wraps() {
        assert!((heading_difference(350.0, 5.0) - 15.0).abs() < 1e-9);
        assert!((heading_difference(5.0, 350.0) - 15.0).abs() < 1e-9);
        assert!((heading_difference(90.0, 270.0) - 180.0).abs() < 1e-9);
        assert!(heading_difference(123.0, 123.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"session_id": "abc", "altitude": 1500.0, "phase": "climb"}"#;
        let sample: FlightParameters = serde_json::from_str(json).unwrap();
        assert_eq!(sample.session_id, "abc");
        assert!((sample.altitude - 1500.0).abs() < f64::EPSILON);
        assert_eq!(sample.phase, FlightPhase::Climb);
        assert!(sample.engine_rpm.is_empty());
        assert!(!sample.has_system_fault());
    }

    #[test]
    fn test_read_samples_skips_blank_and_comments() {
        let input = "# recorded 2024-05-01\n{\"session_id\":\"a\",\"altitude\":100}\n\n{\"session_id\":\"a\"}\n";
        let samples = read_samples(input.as_bytes()).unwrap();
        assert_eq!(samples.len(), 2);
        assert!((samples[0].altitude - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_read_samples_reports_line() {
        let input = "{\"session_id\":\"a\"}\n{not json}\n";
        let err = read_samples(input.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidSample { line: 2, .. }));
    }
}
