//! `flightwatch` - Real-time flight telemetry buffering and analysis
//!
//! Simulator threads push [`FlightParameters`] samples into a lock-free
//! [`TelemetryRingBuffer`]. A consumer drains it in batches and hands each
//! batch to the [`AnomalyDetector`] (statistical and rule-based models) and
//! the [`EventDetector`] (takeoffs, landings, limit exceedances and other
//! discrete events). [`TelemetryPipeline`] wires the three together on a
//! dedicated consumer thread.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod anomaly;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod pipeline;
pub mod ring;
pub mod telemetry;

pub use anomaly::{AnomalyDetector, AnomalyModel, FlightAnomaly};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventDetector, FlightEvent};
pub use logging::init_logging;
pub use pipeline::{Finding, FindingSink, PipelineHandle, TelemetryPipeline};
pub use ring::{SpinPolicy, TelemetryRingBuffer};
pub use telemetry::{read_samples, FlightParameters, FlightPhase};
