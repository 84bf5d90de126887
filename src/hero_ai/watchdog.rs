//! Idle Watchdog
//!
//! Notices when an active agent has neither moved nor cast for
//! [`IDLE_TIMEOUT`] seconds and picks a state-specific way out.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::agent::AgentStateKind;
use super::collaborators::{contains_with_margin, MapBounds};
use super::constants::{IDLE_MOVE_THRESHOLD, IDLE_TIMEOUT, NEAR_BOUNDARY_DISTANCE, RANDOM_WALK_DISTANCE};
use super::movement::{resolve_destination, safe_direction};
use super::GameRng;

/// Forced way out of an idle stretch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RecoveryAction {
    /// Drop the current target and search again
    ResearchTarget,
    /// Walk to an objective
    MarchTo(Vec2),
    /// Step away from the map edge in this direction
    Nudge(Vec2),
    /// Walk to a random nearby point
    RandomWalk(Vec2),
}

/// What the watchdog needs to know to pick a recovery.
pub struct RecoveryContext<'a> {
    pub position: Vec2,
    /// True if a target search could find something right now
    pub target_available: bool,
    pub enemy_objective: Vec2,
    pub home_objective: Option<Vec2>,
    pub bounds: &'a dyn MapBounds,
}

/// Tracks the last position at which the agent made progress.
#[derive(Debug, Clone, Default)]
pub struct IdleWatchdog {
    anchor: Option<Vec2>,
    idle_time: f32,
}

impl IdleWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn idle_time(&self) -> f32 {
        self.idle_time
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record one tick. Returns true when a recovery is due; the window then
    /// restarts so recoveries fire at most once per timeout.
    pub fn observe(&mut self, dt: f32, position: Vec2, casting: bool, other_progress: bool) -> bool {
        let moved = self
            .anchor
            .map_or(true, |anchor| anchor.distance(position) > IDLE_MOVE_THRESHOLD);

        if moved || casting || other_progress {
            self.anchor = Some(position);
            self.idle_time = 0.0;
            return false;
        }

        self.idle_time += dt;
        if self.idle_time > IDLE_TIMEOUT {
            self.idle_time = 0.0;
            self.anchor = Some(position);
            return true;
        }
        false
    }
}

/// Choose a recovery for an agent idling in `state`.
pub fn choose_recovery(state: AgentStateKind, context: &RecoveryContext, rng: &mut GameRng) -> Option<RecoveryAction> {
    match state {
        AgentStateKind::Advance => Some(if context.target_available {
            RecoveryAction::ResearchTarget
        } else {
            RecoveryAction::MarchTo(context.enemy_objective)
        }),
        AgentStateKind::Engage => {
            if !contains_with_margin(context.bounds, context.position, NEAR_BOUNDARY_DISTANCE) {
                let inward = inward_direction(context.position, context.bounds);
                Some(RecoveryAction::Nudge(safe_direction(context.position, inward, context.bounds, rng)))
            } else if context.target_available {
                Some(RecoveryAction::ResearchTarget)
            } else {
                Some(random_walk(context.position, context.bounds, rng))
            }
        }
        AgentStateKind::Retreat => Some(match context.home_objective {
            Some(home) => RecoveryAction::MarchTo(home),
            None => random_walk(context.position, context.bounds, rng),
        }),
        AgentStateKind::Dead => None,
    }
}

/// Direction away from whichever map edges are within the boundary distance.
fn inward_direction(position: Vec2, bounds: &dyn MapBounds) -> Vec2 {
    let push: Vec2 = [Vec2::X, Vec2::NEG_X, Vec2::Y, Vec2::NEG_Y]
        .into_iter()
        .filter(|axis| !bounds.contains(position + *axis * NEAR_BOUNDARY_DISTANCE))
        .map(|axis| -axis)
        .sum();
    push.normalize_or_zero()
}

fn random_walk(position: Vec2, bounds: &dyn MapBounds, rng: &mut GameRng) -> RecoveryAction {
    let heading = Vec2::from_angle(rng.random_range(0.0, std::f32::consts::TAU));
    let direction = safe_direction(position, heading, bounds, rng);
    RecoveryAction::RandomWalk(resolve_destination(
        position,
        position + direction * RANDOM_WALK_DISTANCE,
        bounds,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hero_ai::constants::BOUNDARY_MARGIN;

    struct Arena;

    impl MapBounds for Arena {
        fn contains(&self, point: Vec2) -> bool {
            point.x.abs() <= 20.0 && point.y.abs() <= 10.0
        }
    }

    fn context(position: Vec2, target_available: bool) -> RecoveryContext<'static> {
        RecoveryContext {
            position,
            target_available,
            enemy_objective: Vec2::new(18.0, 0.0),
            home_objective: Some(Vec2::new(-18.0, 0.0)),
            bounds: &Arena,
        }
    }

    #[test]
    fn test_fires_once_per_window() {
        let mut watchdog = IdleWatchdog::new();
        let fired = (0..80)
            .filter(|_| watchdog.observe(0.125, Vec2::ZERO, false, false))
            .count();
        // 10 seconds idle at a 3 second timeout
        assert_eq!(fired, 3);
    }

    #[test]
    fn test_movement_and_casting_count_as_progress() {
        let mut watchdog = IdleWatchdog::new();
        for step in 0..100 {
            let position = Vec2::new(step as f32 * 0.2, 0.0);
            assert!(!watchdog.observe(0.125, position, false, false));
        }
        for _ in 0..100 {
            assert!(!watchdog.observe(0.125, Vec2::ZERO, true, false));
        }
    }

    #[test]
    fn test_small_jitter_is_not_progress() {
        let mut watchdog = IdleWatchdog::new();
        let mut fired = false;
        for step in 0..40 {
            let jitter = if step % 2 == 0 { 0.03 } else { -0.03 };
            fired |= watchdog.observe(0.125, Vec2::new(jitter, 0.0), false, false);
        }
        assert!(fired);
    }

    #[test]
    fn test_advance_recovery() {
        let mut rng = GameRng::from_seed(2);
        assert_eq!(
            choose_recovery(AgentStateKind::Advance, &context(Vec2::ZERO, true), &mut rng),
            Some(RecoveryAction::ResearchTarget)
        );
        assert_eq!(
            choose_recovery(AgentStateKind::Advance, &context(Vec2::ZERO, false), &mut rng),
            Some(RecoveryAction::MarchTo(Vec2::new(18.0, 0.0)))
        );
    }

    #[test]
    fn test_engage_near_edge_nudges_inward() {
        let mut rng = GameRng::from_seed(2);
        let position = Vec2::new(0.0, 9.5);
        let action = choose_recovery(AgentStateKind::Engage, &context(position, true), &mut rng);
        let Some(RecoveryAction::Nudge(direction)) = action else {
            panic!("expected a nudge, got {action:?}");
        };
        assert!(direction.y < 0.0);
    }

    #[test]
    fn test_random_walk_stays_in_bounds() {
        let mut rng = GameRng::from_seed(8);
        for _ in 0..20 {
            let action = choose_recovery(AgentStateKind::Engage, &context(Vec2::new(5.0, 0.0), false), &mut rng);
            let Some(RecoveryAction::RandomWalk(destination)) = action else {
                panic!("expected a random walk, got {action:?}");
            };
            assert!(contains_with_margin(&Arena, destination, BOUNDARY_MARGIN));
        }
    }

    #[test]
    fn test_retreat_marches_home_and_dead_does_nothing() {
        let mut rng = GameRng::from_seed(2);
        assert_eq!(
            choose_recovery(AgentStateKind::Retreat, &context(Vec2::ZERO, false), &mut rng),
            Some(RecoveryAction::MarchTo(Vec2::new(-18.0, 0.0)))
        );
        assert_eq!(choose_recovery(AgentStateKind::Dead, &context(Vec2::ZERO, false), &mut rng), None);
    }
}
