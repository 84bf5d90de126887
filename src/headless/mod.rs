//! Headless mode for automated testing
//!
//! This module runs lane matches without any graphical output, suitable for
//! automated testing, balance sweeps and AI tuning.
//!
//! ## Usage
//!
//! ```bash
//! # Run a headless match
//! cargo run --release -- --headless match_config.json
//! ```
//!
//! ## JSON Configuration
//!
//! ```json
//! {
//!   "west": { "archetype": "Bruiser", "difficulty": "Hard" },
//!   "east": { "archetype": "Mage" },
//!   "max_duration_secs": 180,
//!   "random_seed": 42
//! }
//! ```

pub mod config;
pub mod runner;

pub use config::{HeadlessMatchConfig, HeroEntry};
pub use runner::{run_headless_match, simulate_match, HeroResult, MatchResult};
