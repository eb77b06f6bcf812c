//! `flightwatch` - CLI for the flightwatch telemetry pipeline
//!
//! This binary replays recorded telemetry through the ring buffer and
//! detectors, and inspects the detector registry and configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use flightwatch::cli::{Cli, Command, ConfigCommand, OutputFormat, ReplayCommand};
use flightwatch::pipeline::{Finding, FindingSink, PipelineStats, TelemetryPipeline};
use flightwatch::{init_logging, read_samples, Config, FlightParameters};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // `config validate` reports load errors itself
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        return handle_validate(file.as_deref().or(cli.config.as_deref()));
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Replay(replay_cmd) => handle_replay(config, &replay_cmd),
        Command::Detectors(detectors_cmd) => handle_detectors(&config, detectors_cmd.json),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

fn load_samples(path: &Path) -> Result<Vec<FlightParameters>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_samples(BufReader::new(file)).with_context(|| format!("failed to read {}", path.display()))
}

fn handle_replay(mut config: Config, cmd: &ReplayCommand) -> Result<()> {
    if let Some(capacity) = cmd.capacity {
        config.buffer.capacity = capacity;
    }
    let pipeline = TelemetryPipeline::from_config(&config)?;

    if let Some(train) = &cmd.train {
        let nominal = load_samples(train)?;
        pipeline
            .anomaly_detector()
            .train(&nominal)
            .context("failed to train anomaly models")?;
        info!(samples = nominal.len(), "Trained on nominal data");
    }

    let samples = load_samples(&cmd.file)?;
    let total = samples.len();
    let buffer = Arc::clone(pipeline.buffer());
    let worker = pipeline.spawn(OutputSink::new(cmd.format))?;

    // Every session stays on one producer so its samples arrive in order.
    let producers: Vec<_> = partition_by_session(samples, usize::from(cmd.producers))
        .into_iter()
        .enumerate()
        .map(|(index, share)| {
            let buffer = Arc::clone(&buffer);
            thread::Builder::new()
                .name(format!("flightwatch-producer-{index}"))
                .spawn(move || {
                    for sample in share {
                        buffer.write(sample);
                    }
                })
        })
        .collect::<io::Result<_>>()?;

    for producer in producers {
        producer
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
    }

    let (sink, stats) = worker.join()?;
    if cmd.format == OutputFormat::Plain {
        print_summary(total, &stats);
    }
    if sink.failed {
        anyhow::bail!("failed to write findings to stdout");
    }
    Ok(())
}

fn partition_by_session(samples: Vec<FlightParameters>, producers: usize) -> Vec<Vec<FlightParameters>> {
    let mut shares = vec![Vec::new(); producers.max(1)];
    let mut owners: BTreeMap<String, usize> = BTreeMap::new();
    for sample in samples {
        let next = owners.len() % shares.len();
        let owner = *owners.entry(sample.session_id.clone()).or_insert(next);
        shares[owner].push(sample);
    }
    shares
}

fn print_summary(total: usize, stats: &PipelineStats) {
    println!();
    println!("Replay Summary");
    println!("==============");
    println!("  Samples read:       {total}");
    println!("  Samples processed:  {}", stats.samples);
    println!("  Overwritten:        {}", stats.overwritten);
    println!("  Batches:            {}", stats.batches);
    println!("  Anomalies:          {}", stats.anomalies);
    println!("  Events:             {}", stats.events);
}

/// Writes each finding to stdout as it arrives.
#[derive(Debug)]
struct OutputSink {
    format: OutputFormat,
    out: io::Stdout,
    failed: bool,
}

impl OutputSink {
    fn new(format: OutputFormat) -> Self {
        Self {
            format,
            out: io::stdout(),
            failed: false,
        }
    }

    fn write(&mut self, finding: &Finding) -> io::Result<()> {
        let mut out = self.out.lock();
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut out, finding)?;
                writeln!(out)
            }
            OutputFormat::Plain => match finding {
                Finding::Anomaly(a) => writeln!(
                    out,
                    "{} {} ANOMALY {:<8} {} [{}] confidence={:.2} {}",
                    a.timestamp.format("%H:%M:%S%.3f"),
                    a.session_id,
                    a.model_name,
                    a.parameter,
                    a.anomaly_type,
                    a.confidence,
                    a.description
                ),
                Finding::Event(e) => writeln!(
                    out,
                    "{} {} EVENT   {:<8} {} {}",
                    e.timestamp.format("%H:%M:%S%.3f"),
                    e.session_id,
                    e.severity,
                    e.event_type,
                    e.description
                ),
            },
        }
    }
}

impl FindingSink for OutputSink {
    fn accept(&mut self, finding: Finding) {
        if self.failed {
            return;
        }
        if let Err(e) = self.write(&finding) {
            error!(error = %e, "Failed to write finding; discarding further output");
            self.failed = true;
        }
    }
}

fn handle_detectors(config: &Config, json: bool) -> Result<()> {
    let pipeline = TelemetryPipeline::from_config(config)?;
    let anomalies = pipeline.anomaly_detector();
    let models: Vec<_> = anomalies
        .model_names()
        .into_iter()
        .map(|name| {
            let enabled = anomalies.is_model_enabled(&name);
            (name, enabled)
        })
        .collect();
    let detectors = pipeline.event_detector().detectors();

    if json {
        let listing = serde_json::json!({
            "anomaly_models": models
                .iter()
                .map(|(name, enabled)| serde_json::json!({ "name": name, "enabled": enabled }))
                .collect::<Vec<_>>(),
            "event_detectors": detectors,
        });
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        println!("Anomaly Models");
        println!("==============");
        for (name, enabled) in &models {
            println!("  {name:<22} {}", if *enabled { "enabled" } else { "disabled" });
        }
        println!();
        println!("Event Detectors");
        println!("===============");
        for d in &detectors {
            println!(
                "  {:<22} {:<8} {}{}",
                d.name,
                d.severity,
                d.description,
                if d.enabled { "" } else { " (disabled)" }
            );
        }
    }
    Ok(())
}

fn handle_validate(file: Option<&Path>) -> Result<()> {
    let path = file.map_or_else(Config::default_config_path, Path::to_path_buf);
    println!("Validating configuration: {}", path.display());
    match Config::load_file(path) {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => println!("Configuration error: {e}"),
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Buffer]");
                println!("  Capacity:           {}", config.buffer.capacity);
                println!("  Spin policy:        {:?}", config.buffer.spin_policy);
                println!();
                println!("[Pipeline]");
                println!("  Batch size:         {}", config.pipeline.batch_size);
                println!("  Poll interval (ms): {}", config.pipeline.poll_interval_ms);
                println!("  Score every sample: {}", config.pipeline.score_every_sample);
                println!();
                println!("[Anomaly]");
                println!(
                    "  Confidence:         {}",
                    config.anomaly.confidence_threshold
                );
                println!(
                    "  Deviation (sigma):  {}",
                    config.anomaly.deviation_threshold
                );
                println!("  Rule overrides:     {}", config.anomaly.rules.len());
                println!();
                println!("[Events]");
                println!("  Bank limit (deg):   {}", config.events.bank_angle_limit);
                println!("  Pitch limit (deg):  {}", config.events.pitch_angle_limit);
                println!("  Hard landing (fpm): {}", config.events.hard_landing);
                println!("  Max gear speed:     {}", config.events.max_gear_speed);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => handle_validate(file.as_deref())?,
    }
    Ok(())
}
