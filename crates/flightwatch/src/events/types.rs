//! Event finding types and per-session detector state.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::{FlightParameters, FlightPhase};

/// Kind of discrete flight event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Wheels left the ground.
    Takeoff,
    /// Wheels touched down.
    Landing,
    /// Stall warning began.
    Stall,
    /// Overspeed warning active.
    Overspeed,
    /// Roll beyond the bank limit.
    BankAngleExceeded,
    /// Pitch beyond the pitch limit.
    PitchAngleExceeded,
    /// Altitude away from the autopilot selection.
    AltitudeDeviation,
    /// Heading away from the autopilot selection.
    HeadingDeviation,
    /// Airspeed away from the autopilot selection.
    SpeedDeviation,
    /// Gear extended above its limit speed.
    GearConfiguration,
    /// Flaps extended beyond the limit for the current speed.
    FlapConfiguration,
    /// A subsystem reported a fault.
    SystemFailure,
    /// Flight phase changed.
    PhaseChange,
    /// Off the approach path.
    NavigationDeviation,
    /// Instructor paused or reset the session.
    InstructorAction,
    /// Produced by a custom detector.
    Custom,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Takeoff => "takeoff",
            Self::Landing => "landing",
            Self::Stall => "stall",
            Self::Overspeed => "overspeed",
            Self::BankAngleExceeded => "bank_angle_exceeded",
            Self::PitchAngleExceeded => "pitch_angle_exceeded",
            Self::AltitudeDeviation => "altitude_deviation",
            Self::HeadingDeviation => "heading_deviation",
            Self::SpeedDeviation => "speed_deviation",
            Self::GearConfiguration => "gear_configuration",
            Self::FlapConfiguration => "flap_configuration",
            Self::SystemFailure => "system_failure",
            Self::PhaseChange => "phase_change",
            Self::NavigationDeviation => "navigation_deviation",
            Self::InstructorAction => "instructor_action",
            Self::Custom => "custom",
        };
        f.pad(name)
    }
}

/// How serious an event is. Ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    #[default]
    Info,
    /// Worth attention.
    Warning,
    /// Limit violated.
    Error,
    /// Immediate safety concern.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        };
        f.pad(name)
    }
}

/// A single event reported by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightEvent {
    /// Timestamp of the sample that triggered the event.
    pub timestamp: DateTime<Utc>,
    /// Session of the sample that triggered the event.
    pub session_id: String,
    /// Kind of event.
    pub event_type: EventType,
    /// Severity.
    pub severity: Severity,
    /// Name of the detector that fired.
    pub detector: String,
    /// Human-readable summary.
    pub description: String,
    /// Named numeric evidence.
    pub numeric_data: BTreeMap<String, f64>,
    /// Named text evidence.
    pub text_data: BTreeMap<String, String>,
}

impl FlightEvent {
    /// Start an event for `sample` with empty evidence.
    #[must_use]
    pub fn new(
        sample: &FlightParameters,
        event_type: EventType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: sample.timestamp,
            session_id: sample.session_id.clone(),
            event_type,
            severity,
            detector: String::new(),
            description: description.into(),
            numeric_data: BTreeMap::new(),
            text_data: BTreeMap::new(),
        }
    }

    /// Override the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Replace the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add numeric evidence.
    #[must_use]
    pub fn with_number(mut self, name: impl Into<String>, value: f64) -> Self {
        self.numeric_data.insert(name.into(), value);
        self
    }

    /// Add text evidence.
    #[must_use]
    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.text_data.insert(name.into(), value.into());
        self
    }
}

/// What the event detector remembers about a session between calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightState {
    /// Phase of the last sample seen.
    pub last_phase: FlightPhase,
    /// Whether the last sample was on the ground.
    pub was_on_ground: bool,
    /// Whether the last sample was stalled.
    pub was_stalled: bool,
    /// Number of `detect_events` calls that updated this state.
    pub updates: u64,
    /// Timestamp of the last sample seen.
    pub last_seen: Option<DateTime<Utc>>,
}

impl FlightState {
    /// Whether at least one sample has been recorded.
    ///
    /// Ground/air transitions are only meaningful once a previous sample
    /// exists.
    #[must_use]
    pub fn is_primed(&self) -> bool {
        self.updates > 0
    }

    /// Record `sample` as the latest one seen.
    pub fn update(&mut self, sample: &FlightParameters) {
        self.last_phase = sample.phase;
        self.was_on_ground = sample.on_ground;
        self.was_stalled = sample.stall;
        self.updates += 1;
        self.last_seen = Some(sample.timestamp);
    }
}
