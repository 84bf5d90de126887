//! Command-line interface for lanewar
//!
//! Every run is headless: either from a JSON match file or from the flags
//! below.

use clap::Parser;
use std::path::PathBuf;

/// Two-lane battle simulator with autonomous hero agents
#[derive(Parser, Debug)]
#[command(name = "lanewar")]
#[command(about = "Two-lane battle simulator with autonomous hero agents")]
#[command(version)]
pub struct Args {
    /// JSON match config file (defaults: Bruiser vs Marksman, Normal)
    #[arg(long, value_name = "CONFIG_FILE")]
    pub headless: Option<PathBuf>,

    /// Output path for match log
    #[arg(long, value_name = "OUTPUT_PATH")]
    pub output: Option<PathBuf>,

    /// Maximum match duration in seconds (overrides the config file)
    #[arg(long)]
    pub max_duration: Option<f32>,

    /// Random seed for a reproducible match (overrides the config file)
    #[arg(long)]
    pub seed: Option<u64>,

    /// RON file overriding the built-in hero tuning
    #[arg(long, value_name = "TUNING_FILE")]
    pub tuning: Option<PathBuf>,
}

pub fn parse_args() -> Args {
    Args::parse()
}
