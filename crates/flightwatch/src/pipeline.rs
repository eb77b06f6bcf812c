//! Consumer loop tying the ring buffer to the detectors.
//!
//! Producers write [`FlightParameters`] into the shared ring buffer from any
//! number of threads. A single consumer thread, started with
//! [`TelemetryPipeline::spawn`], drains it in batches, runs both detectors and
//! hands every finding to a [`FindingSink`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::anomaly::{AnomalyDetector, FlightAnomaly};
use crate::config::{Config, PipelineConfig};
use crate::error::{Error, Result};
use crate::events::{EventDetector, FlightEvent};
use crate::ring::TelemetryRingBuffer;
use crate::telemetry::FlightParameters;

/// Anything the detectors report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// Reported by the anomaly detector.
    Anomaly(FlightAnomaly),
    /// Reported by the event detector.
    Event(FlightEvent),
}

impl Finding {
    /// Session of the sample that produced this finding.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::Anomaly(a) => &a.session_id,
            Self::Event(e) => &e.session_id,
        }
    }
}

/// Receives findings from the consumer thread.
pub trait FindingSink: Send {
    /// Handle one finding.
    fn accept(&mut self, finding: Finding);
}

impl FindingSink for Vec<Finding> {
    fn accept(&mut self, finding: Finding) {
        self.push(finding);
    }
}

/// Counters for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Batches drained from the buffer.
    pub batches: u64,
    /// Samples processed.
    pub samples: u64,
    /// Anomalies reported.
    pub anomalies: u64,
    /// Events reported.
    pub events: u64,
    /// Cycles that found the buffer empty.
    pub idle_cycles: u64,
    /// Samples the buffer overwrote before they could be read.
    pub overwritten: u64,
}

/// Cloneable stop signal for a running pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineHandle {
    stop_signal: Arc<AtomicBool>,
}

impl PipelineHandle {
    /// Create a new, unsignalled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the consumer to drain what is left and exit.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}

/// The ring buffer plus both detectors.
#[derive(Debug, Clone)]
pub struct TelemetryPipeline {
    buffer: Arc<TelemetryRingBuffer<FlightParameters>>,
    anomalies: Arc<AnomalyDetector>,
    events: Arc<EventDetector>,
    config: PipelineConfig,
}

impl TelemetryPipeline {
    /// Assemble a pipeline from existing parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`](crate::Error::ConfigValidation)
    /// if the batch size or poll interval is zero.
    pub fn new(
        buffer: Arc<TelemetryRingBuffer<FlightParameters>>,
        anomalies: Arc<AnomalyDetector>,
        events: Arc<EventDetector>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            buffer,
            anomalies,
            events,
            config,
        })
    }

    /// Build the buffer and both detectors from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a model rejects
    /// its settings.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let buffer =
            TelemetryRingBuffer::with_spin_policy(config.buffer.capacity, config.buffer.spin_policy);
        let anomalies = AnomalyDetector::from_config(&config.anomaly)?;
        let events = EventDetector::with_thresholds(config.events.clone());

        Self::new(
            Arc::new(buffer),
            Arc::new(anomalies),
            Arc::new(events),
            config.pipeline.clone(),
        )
    }

    /// The shared ring buffer producers write into.
    #[must_use]
    pub fn buffer(&self) -> &Arc<TelemetryRingBuffer<FlightParameters>> {
        &self.buffer
    }

    /// The anomaly detector.
    #[must_use]
    pub fn anomaly_detector(&self) -> &Arc<AnomalyDetector> {
        &self.anomalies
    }

    /// The event detector.
    #[must_use]
    pub fn event_detector(&self) -> &Arc<EventDetector> {
        &self.events
    }

    /// Loop settings.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run both detectors over a drained batch.
    ///
    /// Samples are grouped by session first so that each session's event
    /// state only ever sees its own samples. Returns the number of findings
    /// passed to `sink`.
    pub fn process_batch(&self, batch: &[FlightParameters], sink: &mut dyn FindingSink) -> usize {
        let mut found = 0;
        for session in group_by_session(batch) {
            if self.config.score_every_sample {
                for end in 1..=session.len() {
                    found += self.score(&session[..end], sink);
                }
            } else {
                found += self.score(&session, sink);
            }
        }
        found
    }

    fn score(&self, window: &[FlightParameters], sink: &mut dyn FindingSink) -> usize {
        let anomalies = self.anomalies.detect_anomalies(window);
        let events = self.events.detect_events(window);
        let found = anomalies.len() + events.len();

        for anomaly in anomalies {
            sink.accept(Finding::Anomaly(anomaly));
        }
        for event in events {
            sink.accept(Finding::Event(event));
        }
        found
    }

    /// Drain one batch and process it. Returns the number of samples read.
    pub fn run_once(&self, sink: &mut dyn FindingSink) -> usize {
        let batch = self.buffer.read_batch(self.config.batch_size);
        if !batch.is_empty() {
            self.process_batch(&batch, sink);
        }
        batch.len()
    }

    /// Start the consumer thread.
    ///
    /// The thread drains up to `batch_size` samples per cycle and sleeps
    /// `poll_interval_ms` whenever the buffer is empty. After
    /// [`PipelineHandle::stop`] it drains whatever is left and exits,
    /// returning `sink` through [`PipelineThread::join`].
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn<S>(self, sink: S) -> Result<PipelineThread<S>>
    where
        S: FindingSink + 'static,
    {
        let handle = PipelineHandle::new();
        let signal = handle.clone();
        let thread = thread::Builder::new()
            .name("flightwatch-consumer".to_string())
            .spawn(move || self.run(&signal, sink))?;

        Ok(PipelineThread { handle, thread })
    }

    /// Run the consumer loop on the current thread until `handle` is
    /// stopped, then keep draining until the buffer comes back empty.
    pub fn run<S: FindingSink>(&self, handle: &PipelineHandle, mut sink: S) -> (S, PipelineStats) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut stats = PipelineStats::default();
        let mut batch = Vec::with_capacity(self.config.batch_size);

        info!(
            capacity = self.buffer.capacity(),
            batch_size = self.config.batch_size,
            "Pipeline started"
        );

        loop {
            let stopping = handle.should_stop();

            batch.clear();
            if self.buffer.drain_into(&mut batch, self.config.batch_size) == 0 {
                if stopping {
                    break;
                }
                stats.idle_cycles += 1;
                thread::sleep(poll_interval);
                continue;
            }
            self.cycle(&batch, &mut sink, &mut stats);
        }

        stats.overwritten = self.buffer.overwritten();
        info!(
            samples = stats.samples,
            anomalies = stats.anomalies,
            events = stats.events,
            overwritten = stats.overwritten,
            "Pipeline stopped"
        );
        (sink, stats)
    }

    fn cycle<S: FindingSink>(
        &self,
        batch: &[FlightParameters],
        sink: &mut S,
        stats: &mut PipelineStats,
    ) {
        let mut counter = CountingSink {
            inner: sink,
            anomalies: 0,
            events: 0,
        };
        self.process_batch(batch, &mut counter);

        stats.batches += 1;
        stats.samples += batch.len() as u64;
        stats.anomalies += counter.anomalies;
        stats.events += counter.events;

        let overwritten = self.buffer.overwritten();
        if overwritten > stats.overwritten {
            warn!(
                lost = overwritten - stats.overwritten,
                "Ring buffer overwrote unread samples"
            );
            stats.overwritten = overwritten;
        }

        debug!(
            samples = batch.len(),
            anomalies = counter.anomalies,
            events = counter.events,
            utilization = self.buffer.utilization(),
            "Pipeline cycle"
        );
    }
}

/// A consumer thread started by [`TelemetryPipeline::spawn`].
#[derive(Debug)]
pub struct PipelineThread<S> {
    handle: PipelineHandle,
    thread: JoinHandle<(S, PipelineStats)>,
}

impl<S> PipelineThread<S> {
    /// A handle that can stop the thread from anywhere.
    #[must_use]
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Signal the thread to drain and exit.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Whether the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Stop the thread and wait for it, returning the sink and run stats.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer thread panicked.
    pub fn join(self) -> Result<(S, PipelineStats)> {
        self.handle.stop();
        self.thread
            .join()
            .map_err(|_| Error::internal("pipeline consumer thread panicked"))
    }
}

struct CountingSink<'a, S> {
    inner: &'a mut S,
    anomalies: u64,
    events: u64,
}

impl<S: FindingSink> FindingSink for CountingSink<'_, S> {
    fn accept(&mut self, finding: Finding) {
        match finding {
            Finding::Anomaly(_) => self.anomalies += 1,
            Finding::Event(_) => self.events += 1,
        }
        self.inner.accept(finding);
    }
}

/// Split a batch into per-session runs, keeping sample order within each
/// session and sessions in order of first appearance.
fn group_by_session(batch: &[FlightParameters]) -> Vec<Vec<FlightParameters>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<FlightParameters>> = Vec::new();
    for sample in batch {
        let slot = *index.entry(sample.session_id.as_str()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(sample.clone());
    }
    groups
}
