//! lanewar - headless two-lane battle simulation
//!
//! Runs one match between two autonomous heroes and prints the result.

use std::process::ExitCode;

use lanewar::cli::parse_args;
use lanewar::headless::{run_headless_match, HeadlessMatchConfig};

fn main() -> ExitCode {
    let args = parse_args();

    let mut config = match &args.headless {
        Some(path) => match HeadlessMatchConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => HeadlessMatchConfig::default(),
    };

    if let Some(output) = &args.output {
        config.output_path = Some(output.to_string_lossy().into_owned());
    }
    if let Some(max_duration) = args.max_duration {
        config.max_duration_secs = max_duration;
    }
    if let Some(seed) = args.seed {
        config.random_seed = Some(seed);
    }
    if let Some(tuning) = &args.tuning {
        config.tuning_path = Some(tuning.to_string_lossy().into_owned());
    }

    match run_headless_match(config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
