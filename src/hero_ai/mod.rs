//! Hero AI
//!
//! Autonomous combat agent for a lane hero. One [`HeroAgent`] per hero,
//! ticked once per simulation frame by whoever owns the world.
//!
//! The agent is a four-state machine (Advance, Engage, Retreat, Dead) that
//! delegates to small subsystems:
//! - [`TargetSelector`]: who to fight
//! - [`CombatDecisionEngine`]: which ability, or whether to move first
//! - [`MovementPlanner`]: flow-field steering, separation, map bounds
//! - [`RetreatController`]: safe point, self-heal, fighting retreat
//! - [`IdleWatchdog`]: recovers agents that stop making progress
//!
//! Everything the agent needs from the world arrives through the traits in
//! [`collaborators`], lent per tick in a [`TickContext`].

pub mod agent;
pub mod collaborators;
pub mod constants;
pub mod difficulty;
pub mod error;
pub mod movement;
pub mod retreat;
pub mod skills;
pub mod targeting;
pub mod watchdog;

use bevy::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

pub use agent::{
    AdvancePhase, AgentEvent, AgentParts, AgentState, AgentStateKind, EngagePhase, HeroAgent, HeroBody,
    Objectives, RetreatPhase,
};
pub use collaborators::{
    AbilitySystem, AnimationParam, AnimationSink, AnimationTrigger, AreaShape, EntityId, EntityRegistry,
    EntitySnapshot, Faction, FlowField, FlowFieldProvider, HeroArchetype, MapBounds, RespawnScheduler,
    SpatialQuery, TickContext, UnitClass,
};
pub use difficulty::{AgentConfig, DifficultyTier, SkillTable, TierTuning, TuningFile};
pub use error::{AgentError, ConfigError};
pub use movement::MovementPlanner;
pub use retreat::RetreatController;
pub use skills::{CombatAction, CombatDecisionEngine, SkillDecision};
pub use targeting::TargetSelector;
pub use watchdog::{IdleWatchdog, RecoveryAction};

/// Seeded random number generator for deterministic agent behaviour.
///
/// With a seed, the same inputs always produce the same decisions. Without
/// one, system entropy is used.
#[derive(Resource, Debug, Clone)]
pub struct GameRng {
    rng: StdRng,
    /// The seed used to initialize this RNG (if deterministic)
    pub seed: Option<u64>,
}

impl GameRng {
    /// Create a new GameRng with a specific seed for deterministic behavior
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Create a new GameRng with random entropy (non-deterministic)
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    /// Derive an independent generator, e.g. one per agent.
    pub fn fork(&mut self) -> Self {
        Self::from_seed(self.rng.gen())
    }

    /// Generate a random f32 in the range [0.0, 1.0)
    pub fn random_f32(&mut self) -> f32 {
        self.rng.gen()
    }

    /// Generate a random f32 in the given range
    pub fn random_range(&mut self, min: f32, max: f32) -> f32 {
        min + self.random_f32() * (max - min)
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f32) -> bool {
        p > 0.0 && self.random_f32() < p
    }

    /// Uniform index in `0..n`. Returns 0 for `n == 0`.
    pub fn random_index(&mut self, n: usize) -> usize {
        if n == 0 {
            0
        } else {
            self.rng.gen_range(0..n)
        }
    }

    /// Point uniformly inside a disc of `radius` around the origin.
    pub fn random_in_disc(&mut self, radius: f32) -> Vec2 {
        let angle = self.random_range(0.0, std::f32::consts::TAU);
        let distance = radius * self.random_f32().sqrt();
        Vec2::from_angle(angle) * distance
    }
}

impl Default for GameRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = GameRng::from_seed(42);
        let mut b = GameRng::from_seed(42);
        for _ in 0..16 {
            assert_eq!(a.random_f32(), b.random_f32());
        }
    }

    #[test]
    fn test_random_range_bounds() {
        let mut rng = GameRng::from_seed(9);
        for _ in 0..200 {
            let v = rng.random_range(0.8, 1.2);
            assert!((0.8..1.2).contains(&v));
        }
    }

    #[test]
    fn test_chance_extremes() {
        let mut rng = GameRng::from_seed(1);
        assert!((0..100).all(|_| !rng.chance(0.0)));
        assert!((0..100).all(|_| rng.chance(1.0)));
    }

    #[test]
    fn test_random_index_handles_zero() {
        let mut rng = GameRng::from_seed(1);
        assert_eq!(rng.random_index(0), 0);
        assert!(rng.random_index(3) < 3);
    }

    #[test]
    fn test_disc_samples_stay_inside() {
        let mut rng = GameRng::from_seed(5);
        for _ in 0..100 {
            assert!(rng.random_in_disc(1.5).length() <= 1.5 + 1e-5);
        }
    }
}
