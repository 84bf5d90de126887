//! lanewar - Two-Lane Battle Simulation
//!
//! Autonomous hero agents fighting alongside minion waves on a two-lane map.
//! The [`hero_ai`] module is the agent itself and knows nothing about the
//! concrete world; [`battlefield`] supplies that world, and [`headless`]
//! runs whole matches inside a minimal Bevy app.
//!
//! This library exposes the core modules for testing and reuse.

pub mod battlefield;
pub mod cli;
pub mod combat;
pub mod headless;
pub mod hero_ai;

// Re-export commonly used types
pub use battlefield::{Battlefield, BattlefieldConfig, HeroSetup};
pub use combat::log::{CombatLog, CombatLogEventType};
pub use headless::{simulate_match, HeadlessMatchConfig, MatchResult};
pub use hero_ai::{AgentConfig, DifficultyTier, GameRng, HeroAgent};
