//! The event detector registry and per-session state machine.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::anomaly::ModelParams;
use crate::error::{Error, Result};
use crate::telemetry::FlightParameters;

use super::builtin::BUILTINS;
use super::thresholds::EventThresholds;
use super::types::{EventType, FlightEvent, FlightState, Severity};

/// A boxed event detector.
///
/// Receives the whole batch and the context for this run; returns the event
/// to report, if any.
pub type DetectorFn =
    Box<dyn Fn(&[FlightParameters], &EventContext<'_>) -> Result<Option<FlightEvent>> + Send + Sync>;

/// Everything a detector may consult besides the batch itself.
#[derive(Debug)]
pub struct EventContext<'a> {
    /// Session state recorded before this batch.
    pub state: &'a FlightState,
    /// Current thresholds.
    pub thresholds: &'a EventThresholds,
    /// Registered name of the detector being run.
    pub name: &'a str,
    /// Registered description of the detector being run.
    pub description: &'a str,
    /// Event type the detector reports.
    pub event_type: EventType,
    /// Default severity the detector reports.
    pub severity: Severity,
}

impl EventContext<'_> {
    /// Start an event for `sample` with this detector's type, severity and
    /// description.
    #[must_use]
    pub fn event(&self, sample: &FlightParameters) -> FlightEvent {
        let mut event = FlightEvent::new(sample, self.event_type, self.severity, self.description);
        event.detector = self.name.to_string();
        event
    }
}

/// Summary of a registered detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectorInfo {
    /// Registered name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Event type reported.
    pub event_type: EventType,
    /// Default severity.
    pub severity: Severity,
    /// Whether the detector runs.
    pub enabled: bool,
    /// Whether the detector ships with the crate.
    pub builtin: bool,
}

struct DetectorEntry {
    info: DetectorInfo,
    detect: DetectorFn,
}

/// Turns telemetry batches into discrete [`FlightEvent`]s.
///
/// Transition detectors (takeoff, landing, stall, phase change) compare the
/// latest sample with the state recorded for its session by the previous
/// call. That state is updated once per call, after every detector has run,
/// so repeating a batch never repeats a transition.
///
/// Each session has its own lock, held for the whole scan: concurrent calls
/// for one session run one after the other, while different sessions proceed
/// in parallel. Sessions are kept until [`reset_state`](Self::reset_state) or
/// [`evict_idle_sessions`](Self::evict_idle_sessions) drops them.
pub struct EventDetector {
    detectors: RwLock<Vec<DetectorEntry>>,
    thresholds: RwLock<EventThresholds>,
    states: Mutex<HashMap<String, Arc<Mutex<FlightState>>>>,
}

impl EventDetector {
    /// Create a detector with every built-in detector enabled and default
    /// thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_thresholds(EventThresholds::default())
    }

    /// Create a detector with every built-in detector enabled.
    #[must_use]
    pub fn with_thresholds(thresholds: EventThresholds) -> Self {
        let detectors = BUILTINS
            .iter()
            .map(|builtin| {
                let check = builtin.check;
                DetectorEntry {
                    info: DetectorInfo {
                        name: builtin.name.to_string(),
                        description: builtin.description.to_string(),
                        event_type: builtin.event_type,
                        severity: builtin.severity,
                        enabled: true,
                        builtin: true,
                    },
                    detect: Box::new(
                        move |samples: &[FlightParameters],
                              ctx: &EventContext<'_>|
                              -> Result<Option<FlightEvent>> {
                            Ok(samples.last().and_then(|s| check(s, ctx)))
                        },
                    ),
                }
            })
            .collect();

        Self {
            detectors: RwLock::new(detectors),
            thresholds: RwLock::new(thresholds),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Override thresholds from a string map.
    ///
    /// See [`EventThresholds::apply`] for the recognized keys. Malformed
    /// values are logged and ignored.
    pub fn initialize(&self, params: &ModelParams) {
        self.thresholds.write().apply(params);
        debug!(keys = params.len(), "Event thresholds updated");
    }

    /// Current thresholds.
    #[must_use]
    pub fn thresholds(&self) -> EventThresholds {
        self.thresholds.read().clone()
    }

    /// Replace the thresholds.
    pub fn set_thresholds(&self, thresholds: EventThresholds) {
        *self.thresholds.write() = thresholds;
    }

    /// Add a custom detector, enabled, reporting [`EventType::Custom`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDetector`] if the name is taken.
    pub fn register_detector<F>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        detect: F,
    ) -> Result<()>
    where
        F: Fn(&[FlightParameters], &EventContext<'_>) -> Result<Option<FlightEvent>>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let mut detectors = self.detectors.write();
        if detectors.iter().any(|e| e.info.name == name) {
            warn!(detector = %name, "Event detector already registered");
            return Err(Error::DuplicateDetector { name });
        }

        info!(detector = %name, "Event detector registered");
        detectors.push(DetectorEntry {
            info: DetectorInfo {
                name,
                description: description.into(),
                event_type: EventType::Custom,
                severity,
                enabled: true,
                builtin: false,
            },
            detect: Box::new(detect),
        });
        Ok(())
    }

    /// Remove a custom detector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDetector`] if no detector has that name, or
    /// [`Error::ProtectedDetector`] if it is built in.
    pub fn unregister_detector(&self, name: &str) -> Result<()> {
        let mut detectors = self.detectors.write();
        let Some(index) = detectors.iter().position(|e| e.info.name == name) else {
            warn!(detector = %name, "Cannot unregister unknown event detector");
            return Err(unknown(name));
        };
        if detectors[index].info.builtin {
            warn!(detector = %name, "Cannot unregister built-in event detector");
            return Err(Error::ProtectedDetector {
                name: name.to_string(),
            });
        }

        detectors.remove(index);
        info!(detector = %name, "Event detector unregistered");
        Ok(())
    }

    /// Enable or disable a detector. Built-ins may be disabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDetector`] if no detector has that name.
    pub fn set_detector_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut detectors = self.detectors.write();
        let entry = detectors
            .iter_mut()
            .find(|e| e.info.name == name)
            .ok_or_else(|| unknown(name))?;
        entry.info.enabled = enabled;
        debug!(detector = %name, enabled, "Event detector toggled");
        Ok(())
    }

    /// Whether a detector is registered and enabled.
    #[must_use]
    pub fn is_detector_enabled(&self, name: &str) -> bool {
        self.detectors
            .read()
            .iter()
            .any(|e| e.info.name == name && e.info.enabled)
    }

    /// Every registered detector, in evaluation order.
    #[must_use]
    pub fn detectors(&self) -> Vec<DetectorInfo> {
        self.detectors.read().iter().map(|e| e.info.clone()).collect()
    }

    /// State recorded for a session, if any sample of it has been seen.
    #[must_use]
    pub fn state(&self, session_id: &str) -> Option<FlightState> {
        self.states.lock().get(session_id).map(|state| *state.lock())
    }

    /// Number of sessions with recorded state.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.states.lock().len()
    }

    /// Forget every session whose last sample is older than `cutoff`.
    ///
    /// Returns how many sessions were dropped.
    pub fn evict_idle_sessions(&self, cutoff: DateTime<Utc>) -> usize {
        let mut states = self.states.lock();
        let before = states.len();
        states.retain(|_, state| state.lock().last_seen.map_or(true, |seen| seen >= cutoff));
        let evicted = before - states.len();
        if evicted > 0 {
            debug!(evicted, remaining = states.len(), "Idle event sessions evicted");
        }
        evicted
    }

    fn session(&self, session_id: &str) -> Arc<Mutex<FlightState>> {
        Arc::clone(
            self.states
                .lock()
                .entry(session_id.to_string())
                .or_default(),
        )
    }

    /// Forget everything recorded for a session.
    pub fn reset_state(&self, session_id: &str) {
        if self.states.lock().remove(session_id).is_some() {
            debug!(session = %session_id, "Event state reset");
        }
    }

    /// Forget every session.
    pub fn reset_all_states(&self) {
        self.states.lock().clear();
    }

    /// Run every enabled detector over `samples`.
    ///
    /// Detectors see the state recorded for the latest sample's session
    /// before this call; afterwards that state is updated from the latest
    /// sample. Events come back in detector registration order. A detector
    /// that fails or panics is logged and skipped.
    ///
    /// The session's lock is held while detectors run, so a detector must
    /// not call back into this detector for the same session.
    #[must_use]
    pub fn detect_events(&self, samples: &[FlightParameters]) -> Vec<FlightEvent> {
        let Some(latest) = samples.last() else {
            return Vec::new();
        };
        let session = self.session(&latest.session_id);
        let mut current = session.lock();
        let state = *current;

        let mut events = Vec::new();
        {
            let thresholds = self.thresholds.read();
            let detectors = self.detectors.read();

            for entry in detectors.iter().filter(|e| e.info.enabled) {
                let ctx = EventContext {
                    state: &state,
                    thresholds: &thresholds,
                    name: &entry.info.name,
                    description: &entry.info.description,
                    event_type: entry.info.event_type,
                    severity: entry.info.severity,
                };
                match panic::catch_unwind(AssertUnwindSafe(|| (entry.detect)(samples, &ctx))) {
                    Ok(Ok(Some(mut event))) => {
                        trace!(detector = %entry.info.name, "Event detected");
                        event.detector.clone_from(&entry.info.name);
                        events.push(event);
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => {
                        error!(detector = %entry.info.name, error = %e, "Event detector failed; skipping");
                    }
                    Err(_) => {
                        error!(detector = %entry.info.name, "Event detector panicked; skipping");
                    }
                }
            }
        }

        current.update(latest);
        drop(current);

        debug!(session = %latest.session_id, count = events.len(), "Event scan complete");
        events
    }
}

fn unknown(name: &str) -> Error {
    Error::UnknownDetector {
        name: name.to_string(),
    }
}

impl Default for EventDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDetector")
            .field("detectors", &self.detectors.read().len())
            .field("sessions", &self.states.lock().len())
            .finish_non_exhaustive()
    }
}
