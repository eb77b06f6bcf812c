//! Command-line interface for flightwatch.
//!
//! This module provides the CLI structure and command definitions for the
//! `flightwatch` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, DetectorsCommand, OutputFormat, ReplayCommand};

/// flightwatch - Watch flight telemetry for anomalies and events
///
/// Replays recorded simulator telemetry through a lock-free ring buffer and
/// reports statistical and rule-based anomalies alongside discrete flight
/// events such as takeoffs, hard landings and stalls.
#[derive(Debug, Parser)]
#[command(name = "flightwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replay recorded telemetry through the detectors
    Replay(ReplayCommand),

    /// List anomaly models and event detectors
    Detectors(DetectorsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
