//! Built-in event detectors.
//!
//! Each detector looks at the latest sample of a batch together with the
//! session state recorded before the batch arrived.

use crate::telemetry::{heading_difference, FlightParameters, FlightPhase};

use super::detector::EventContext;
use super::types::{EventType, FlightEvent, Severity};

/// A detector shipped with the crate.
#[derive(Debug, Clone, Copy)]
pub(super) struct BuiltinDetector {
    pub name: &'static str,
    pub description: &'static str,
    pub event_type: EventType,
    pub severity: Severity,
    pub check: fn(&FlightParameters, &EventContext<'_>) -> Option<FlightEvent>,
}

/// Every built-in detector, in evaluation order.
pub(super) static BUILTINS: &[BuiltinDetector] = &[
    BuiltinDetector {
        name: "takeoff",
        description: "Aircraft left the ground",
        event_type: EventType::Takeoff,
        severity: Severity::Info,
        check: takeoff,
    },
    BuiltinDetector {
        name: "landing",
        description: "Aircraft touched down",
        event_type: EventType::Landing,
        severity: Severity::Info,
        check: landing,
    },
    BuiltinDetector {
        name: "stall",
        description: "Stall warning began",
        event_type: EventType::Stall,
        severity: Severity::Critical,
        check: stall,
    },
    BuiltinDetector {
        name: "overspeed",
        description: "Overspeed warning active",
        event_type: EventType::Overspeed,
        severity: Severity::Error,
        check: overspeed,
    },
    BuiltinDetector {
        name: "bank_angle",
        description: "Bank angle limit exceeded",
        event_type: EventType::BankAngleExceeded,
        severity: Severity::Warning,
        check: bank_angle,
    },
    BuiltinDetector {
        name: "pitch_angle",
        description: "Pitch angle limit exceeded",
        event_type: EventType::PitchAngleExceeded,
        severity: Severity::Warning,
        check: pitch_angle,
    },
    BuiltinDetector {
        name: "altitude_deviation",
        description: "Altitude away from autopilot selection",
        event_type: EventType::AltitudeDeviation,
        severity: Severity::Warning,
        check: altitude_deviation,
    },
    BuiltinDetector {
        name: "heading_deviation",
        description: "Heading away from autopilot selection",
        event_type: EventType::HeadingDeviation,
        severity: Severity::Warning,
        check: heading_deviation,
    },
    BuiltinDetector {
        name: "speed_deviation",
        description: "Airspeed away from autopilot selection",
        event_type: EventType::SpeedDeviation,
        severity: Severity::Warning,
        check: speed_deviation,
    },
    BuiltinDetector {
        name: "gear_configuration",
        description: "Gear extended above limit speed",
        event_type: EventType::GearConfiguration,
        severity: Severity::Error,
        check: gear_configuration,
    },
    BuiltinDetector {
        name: "flap_configuration",
        description: "Flaps extended beyond limit for speed",
        event_type: EventType::FlapConfiguration,
        severity: Severity::Warning,
        check: flap_configuration,
    },
    BuiltinDetector {
        name: "system_failure",
        description: "Aircraft system failure",
        event_type: EventType::SystemFailure,
        severity: Severity::Error,
        check: system_failure,
    },
    BuiltinDetector {
        name: "phase_change",
        description: "Flight phase changed",
        event_type: EventType::PhaseChange,
        severity: Severity::Info,
        check: phase_change,
    },
    BuiltinDetector {
        name: "navigation_deviation",
        description: "Off the approach path",
        event_type: EventType::NavigationDeviation,
        severity: Severity::Warning,
        check: navigation_deviation,
    },
    BuiltinDetector {
        name: "instructor_action",
        description: "Instructor intervened",
        event_type: EventType::InstructorAction,
        severity: Severity::Info,
        check: instructor_action,
    },
];

fn takeoff(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let state = ctx.state;
    let lifted = state.is_primed() && state.was_on_ground && s.airborne();
    (lifted && s.indicated_airspeed > ctx.thresholds.takeoff_speed).then(|| {
        ctx.event(s)
            .with_number("airspeed", s.indicated_airspeed)
            .with_number("pitch", s.pitch)
    })
}

fn landing(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let state = ctx.state;
    if !(state.is_primed() && !state.was_on_ground && s.on_ground) {
        return None;
    }

    let rate = s.vertical_speed.abs();
    let (severity, quality) = if rate > ctx.thresholds.hard_landing {
        (Severity::Error, "hard")
    } else if rate > ctx.thresholds.firm_landing {
        (Severity::Warning, "firm")
    } else {
        (Severity::Info, "smooth")
    };

    Some(
        ctx.event(s)
            .with_severity(severity)
            .with_description(format!("{} landing at {rate:.0} fpm", capitalize(quality)))
            .with_number("vertical_speed", s.vertical_speed)
            .with_number("airspeed", s.indicated_airspeed)
            .with_text("quality", quality),
    )
}

fn stall(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    (s.stall && !ctx.state.was_stalled).then(|| {
        ctx.event(s)
            .with_number("airspeed", s.indicated_airspeed)
            .with_number("pitch", s.pitch)
            .with_number("altitude", s.altitude)
    })
}

fn overspeed(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    s.overspeed
        .then(|| ctx.event(s).with_number("airspeed", s.indicated_airspeed))
}

fn bank_angle(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let limit = ctx.thresholds.bank_angle_limit;
    (s.roll.abs() > limit).then(|| {
        ctx.event(s)
            .with_description(format!("Bank angle {:.1}° exceeds {limit:.0}°", s.roll.abs()))
            .with_number("roll", s.roll)
            .with_number("limit", limit)
    })
}

fn pitch_angle(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let limit = ctx.thresholds.pitch_angle_limit;
    (s.pitch.abs() > limit).then(|| {
        ctx.event(s)
            .with_description(format!("Pitch angle {:.1}° exceeds {limit:.0}°", s.pitch.abs()))
            .with_number("pitch", s.pitch)
            .with_number("limit", limit)
    })
}

fn altitude_deviation(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let deviation = (s.altitude - s.selected_altitude).abs();
    (s.autopilot_engaged && deviation > ctx.thresholds.altitude_deviation).then(|| {
        ctx.event(s)
            .with_number("altitude", s.altitude)
            .with_number("selected_altitude", s.selected_altitude)
            .with_number("deviation", deviation)
    })
}

fn heading_deviation(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let deviation = heading_difference(s.heading, s.selected_heading);
    (s.autopilot_engaged && deviation > ctx.thresholds.heading_deviation).then(|| {
        ctx.event(s)
            .with_number("heading", s.heading)
            .with_number("selected_heading", s.selected_heading)
            .with_number("deviation", deviation)
    })
}

fn speed_deviation(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let deviation = (s.indicated_airspeed - s.selected_airspeed).abs();
    (s.autopilot_engaged && deviation > ctx.thresholds.speed_deviation).then(|| {
        ctx.event(s)
            .with_number("airspeed", s.indicated_airspeed)
            .with_number("selected_airspeed", s.selected_airspeed)
            .with_number("deviation", deviation)
    })
}

fn gear_configuration(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let limit = ctx.thresholds.max_gear_speed;
    (s.gear_down && s.indicated_airspeed > limit).then(|| {
        ctx.event(s)
            .with_number("airspeed", s.indicated_airspeed)
            .with_number("limit", limit)
    })
}

fn flap_configuration(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let allowed = ctx.thresholds.allowed_flaps(s.indicated_airspeed);
    (s.flaps > allowed).then(|| {
        ctx.event(s)
            .with_number("flaps", s.flaps)
            .with_number("allowed_flaps", allowed)
            .with_number("airspeed", s.indicated_airspeed)
    })
}

fn system_failure(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    if !s.has_system_fault() {
        return None;
    }

    let subsystems = [
        ("electrical", s.electrical_ok),
        ("hydraulic", s.hydraulic_ok),
        ("avionics", s.avionics_ok),
        ("fuel", s.fuel_ok),
    ];
    let mut failed: Vec<&str> = subsystems
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| *name)
        .collect();
    failed.extend(s.active_failures.iter().map(String::as_str));

    let mut event = ctx.event(s);
    if !failed.is_empty() {
        event = event
            .with_description(format!("System failure: {}", failed.join(", ")))
            .with_text("failures", failed.join(","));
    }
    Some(event)
}

fn phase_change(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let from = ctx.state.last_phase;
    (s.phase != from && s.phase != FlightPhase::Unknown).then(|| {
        ctx.event(s)
            .with_description(format!("Phase changed from {from} to {}", s.phase))
            .with_text("from", from.to_string())
            .with_text("to", s.phase.to_string())
    })
}

fn navigation_deviation(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let t = ctx.thresholds;
    let off_path = s.glideslope_deviation.abs() > t.glideslope_deviation
        || s.localizer_deviation.abs() > t.localizer_deviation;
    (s.phase == FlightPhase::Approach && off_path).then(|| {
        ctx.event(s)
            .with_number("glideslope", s.glideslope_deviation)
            .with_number("localizer", s.localizer_deviation)
    })
}

fn instructor_action(s: &FlightParameters, ctx: &EventContext<'_>) -> Option<FlightEvent> {
    let action = match (s.instructor_pause, s.instructor_reset) {
        (_, true) => "reset",
        (true, false) => "pause",
        (false, false) => return None,
    };
    Some(
        ctx.event(s)
            .with_description(format!("Instructor {action}"))
            .with_text("action", action),
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_are_unique() {
        for (i, a) in BUILTINS.iter().enumerate() {
            for b in &BUILTINS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn test_every_builtin_has_distinct_type() {
        for (i, a) in BUILTINS.iter().enumerate() {
            assert_ne!(a.event_type, EventType::Custom);
            for b in &BUILTINS[i + 1..] {
                assert_ne!(a.event_type, b.event_type);
            }
        }
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("hard"), "Hard");
        assert_eq!(capitalize(""), "");
    }
}
