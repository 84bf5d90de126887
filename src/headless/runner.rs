//! Headless match execution
//!
//! Runs lane matches without any graphical output, suitable for automated
//! testing. Simulation time advances by a fixed step per frame, so a seeded
//! match replays identically however fast the host runs it.

use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::battlefield::{Battlefield, EndReason, HeroMatchStats};
use crate::combat::log::{CombatLog, CombatLogEventType};
use crate::hero_ai::{AgentStateKind, ConfigError, DifficultyTier, Faction, HeroArchetype};

use super::config::HeadlessMatchConfig;

/// Simulation step per frame, in seconds.
pub const SIMULATION_STEP: f32 = 0.05;

/// Result of a completed headless match
///
/// This struct provides programmatic access to match results for testing and analysis.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    /// The winning faction, or None for a draw
    pub winner: Option<Faction>,
    pub end_reason: EndReason,
    /// Total match duration in seconds
    pub match_time: f32,
    pub heroes: Vec<HeroResult>,
    /// Remaining castle health fractions
    pub west_castle_health: f32,
    pub east_castle_health: f32,
    pub waves_spawned: u32,
    /// Random seed used (if deterministic mode)
    pub random_seed: Option<u64>,
    /// Where the combat log was written, if it was
    pub log_path: Option<PathBuf>,
}

impl MatchResult {
    pub fn hero(&self, faction: Faction) -> Option<&HeroResult> {
        self.heroes.iter().find(|h| h.faction == faction)
    }
}

/// Statistics for a single hero after the match
#[derive(Debug, Clone, Serialize)]
pub struct HeroResult {
    pub faction: Faction,
    pub archetype: HeroArchetype,
    pub difficulty: DifficultyTier,
    pub max_health: f32,
    /// Health remaining at match end (0 if dead)
    pub final_health: f32,
    pub final_state: AgentStateKind,
    pub stats: HeroMatchStats,
}

/// Resource to track headless match state
#[derive(Resource)]
pub struct HeadlessMatchState {
    /// Elapsed match time
    pub elapsed_time: f32,
    /// Custom output path for match log
    pub output_path: Option<String>,
    /// Write the combat log when the match ends
    pub save_log: bool,
    /// Whether the match has completed
    pub match_complete: bool,
    /// Match result (populated when match completes)
    pub result: Option<MatchResult>,
}

/// Plugin for headless match execution. Expects a [`Battlefield`]
/// resource to be inserted by the caller.
pub struct HeadlessPlugin {
    pub output_path: Option<String>,
    pub save_log: bool,
}

impl Plugin for HeadlessPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(HeadlessMatchState {
            elapsed_time: 0.0,
            output_path: self.output_path.clone(),
            save_log: self.save_log,
            match_complete: false,
            result: None,
        })
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f32(
            SIMULATION_STEP,
        )))
        .init_resource::<CombatLog>()
        .add_systems(Startup, headless_setup_match)
        .add_systems(Update, (headless_step, headless_check_match_end).chain())
        .add_systems(PostUpdate, headless_exit_on_complete);
    }
}

/// Setup system for headless match
fn headless_setup_match(battlefield: Res<Battlefield>, mut combat_log: ResMut<CombatLog>) {
    combat_log.clear();
    combat_log.log(
        CombatLogEventType::MatchEvent,
        "Match started (headless mode)!".to_string(),
    );

    match battlefield.seed() {
        Some(seed) => info!("Using deterministic RNG with seed: {}", seed),
        None => info!("Using non-deterministic RNG (no seed provided)"),
    }
    for slot in battlefield.heroes() {
        info!("{} takes the field", slot.name());
    }
}

/// Advance the battlefield by this frame's delta.
fn headless_step(
    time: Res<Time>,
    mut battlefield: ResMut<Battlefield>,
    mut combat_log: ResMut<CombatLog>,
    mut headless_state: ResMut<HeadlessMatchState>,
) {
    if headless_state.match_complete {
        return;
    }
    battlefield.tick(time.delta_secs(), &mut combat_log);
    headless_state.elapsed_time = battlefield.elapsed();
}

/// Record the result once a castle falls or time runs out
fn headless_check_match_end(
    battlefield: Res<Battlefield>,
    combat_log: Res<CombatLog>,
    mut headless_state: ResMut<HeadlessMatchState>,
) {
    if headless_state.match_complete {
        return;
    }
    let Some(outcome) = battlefield.outcome() else {
        return;
    };

    let log_path = if headless_state.save_log {
        let path = headless_state.output_path.as_deref().map(Path::new);
        match combat_log.save_to_file(&battlefield.metadata(), path) {
            Ok(path) => {
                info!("Combat log saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Failed to save combat log: {}", e);
                None
            }
        }
    } else {
        None
    };

    let heroes = battlefield
        .heroes()
        .iter()
        .map(|slot| {
            let body = slot.agent.body();
            HeroResult {
                faction: body.faction,
                archetype: body.archetype,
                difficulty: slot.agent.config().tier,
                max_health: body.max_health,
                final_health: body.health,
                final_state: slot.agent.state().kind(),
                stats: slot.stats.clone(),
            }
        })
        .collect();

    headless_state.result = Some(MatchResult {
        winner: outcome.winner,
        end_reason: outcome.reason,
        match_time: outcome.match_time,
        heroes,
        west_castle_health: battlefield.castle_health(Faction::West),
        east_castle_health: battlefield.castle_health(Faction::East),
        waves_spawned: battlefield.waves_spawned(),
        random_seed: battlefield.seed(),
        log_path,
    });
    headless_state.match_complete = true;
}

/// Exit the app when the match is complete
fn headless_exit_on_complete(headless_state: Res<HeadlessMatchState>, mut exit: EventWriter<AppExit>) {
    if headless_state.match_complete {
        exit.send(AppExit::Success);
    }
}

fn build_app(config: &HeadlessMatchConfig, save_log: bool, with_logging: bool) -> Result<App, ConfigError> {
    let battlefield = Battlefield::new(config.to_battlefield_config()?)?;

    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    if with_logging {
        app.add_plugins(LogPlugin::default());
    }
    app.insert_resource(battlefield).add_plugins(HeadlessPlugin {
        output_path: config.output_path.clone(),
        save_log,
    });
    Ok(app)
}

fn drive(mut app: App, max_duration: f32) -> Result<MatchResult, ConfigError> {
    app.finish();
    app.cleanup();

    // Generous frame budget: the battlefield always ends at max_duration.
    let frame_budget = (max_duration / SIMULATION_STEP).ceil() as u64 * 2 + 10;
    for _ in 0..frame_budget {
        app.update();
        if let Some(result) = app.world().resource::<HeadlessMatchState>().result.as_ref() {
            return Ok(result.clone());
        }
    }
    Err(ConfigError::Invalid(format!(
        "match did not finish within {} frames",
        frame_budget
    )))
}

/// Simulate a match to completion and return its result. The combat log is
/// only written when the config names an output path.
pub fn simulate_match(config: &HeadlessMatchConfig) -> Result<MatchResult, ConfigError> {
    let app = build_app(config, config.output_path.is_some(), false)?;
    drive(app, config.max_duration_secs)
}

/// Run a headless match with the given configuration
pub fn run_headless_match(config: HeadlessMatchConfig) -> Result<MatchResult, ConfigError> {
    println!("Starting headless match simulation...");
    println!("  West: {} ({})", config.west.archetype, config.west.difficulty);
    println!("  East: {} ({})", config.east.archetype, config.east.difficulty);
    println!("  Max duration: {:.0}s", config.max_duration_secs);

    let app = build_app(&config, true, true)?;
    let result = drive(app, config.max_duration_secs)?;

    match result.winner {
        Some(faction) => println!("{} wins after {:.1}s ({:?})", faction.name(), result.match_time, result.end_reason),
        None => println!("Draw after {:.1}s ({:?})", result.match_time, result.end_reason),
    }
    for hero in &result.heroes {
        println!(
            "  {} {}: {:.0} dealt, {:.0} taken, {} kills, {} deaths, {} recoveries",
            hero.faction.name(),
            hero.archetype.name(),
            hero.stats.damage_dealt,
            hero.stats.damage_taken,
            hero.stats.hero_kills,
            hero.stats.deaths,
            hero.stats.recoveries
        );
    }
    if let Some(path) = &result.log_path {
        println!("Match complete. Log saved to: {}", path.display());
    }

    Ok(result)
}
