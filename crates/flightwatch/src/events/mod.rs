//! Discrete flight-event detection.
//!
//! [`EventDetector`] holds a registry of detectors, the built-in set from
//! takeoff to instructor action plus any custom ones, and a small
//! [`FlightState`] per session used to spot transitions between calls.
//!
//! # Example
//!
//! ```
//! use flightwatch::events::{EventDetector, EventType};
//! use flightwatch::FlightParameters;
//!
//! let detector = EventDetector::new();
//!
//! let mut parked = FlightParameters::new("session-1");
//! parked.on_ground = true;
//! let _ = detector.detect_events(&[parked]);
//!
//! let mut airborne = FlightParameters::new("session-1");
//! airborne.indicated_airspeed = 70.0;
//! let events = detector.detect_events(&[airborne]);
//! assert!(events.iter().any(|e| e.event_type == EventType::Takeoff));
//! ```

mod builtin;
mod detector;
mod thresholds;
mod types;

pub use detector::{DetectorFn, DetectorInfo, EventContext, EventDetector};
pub use thresholds::{EventThresholds, FlapLimit};
pub use types::{EventType, FlightEvent, FlightState, Severity};
