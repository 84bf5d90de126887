//! Retreat Controller
//!
//! Picks a safe rally point on the agent's own side, runs the self-heal loop
//! once the agent gets there, and answers "am I being chased?" so the agent
//! can fight back without giving up the retreat.

use bevy::prelude::*;

use super::collaborators::{contains_with_margin, EntityRegistry, EntitySnapshot, Faction, MapBounds, UnitClass};
use super::constants::{BOUNDARY_MARGIN, CHASE_RADIUS, SAFE_POINT_SPREAD, SAFE_RADIUS};
use super::difficulty::AgentConfig;
use super::GameRng;

/// Random offsets tried before settling on the bare rally point.
const SAFE_POINT_ATTEMPTS: u32 = 6;

/// Safe point and heal-tick bookkeeping for one agent.
#[derive(Debug, Clone, Default)]
pub struct RetreatController {
    safe_point: Option<Vec2>,
    heal_timer: f32,
}

impl RetreatController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn safe_point(&self) -> Option<Vec2> {
        self.safe_point
    }

    /// Forget the safe point so the next retreat searches again.
    pub fn clear_safe_point(&mut self) {
        self.safe_point = None;
        self.heal_timer = 0.0;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Rally point plus a small random offset, kept inside the map.
    pub fn find_safe_position(&mut self, rally: Vec2, bounds: &dyn MapBounds, rng: &mut GameRng) -> Vec2 {
        let point = (0..SAFE_POINT_ATTEMPTS)
            .map(|_| rally + rng.random_in_disc(SAFE_POINT_SPREAD))
            .find(|candidate| contains_with_margin(bounds, *candidate, BOUNDARY_MARGIN))
            .unwrap_or(rally);
        self.safe_point = Some(point);
        point
    }

    /// True if `position` is close enough to the safe point to heal.
    pub fn at_safe_point(&self, position: Vec2) -> bool {
        self.safe_point
            .is_some_and(|point| point.distance(position) <= SAFE_RADIUS)
    }

    /// Advance the heal loop by `dt`; returns the health to restore this tick.
    /// Leaving the safe radius resets the timer.
    pub fn tick_heal(&mut self, dt: f32, position: Vec2, config: &AgentConfig) -> f32 {
        if !self.at_safe_point(position) {
            self.heal_timer = 0.0;
            return 0.0;
        }

        self.heal_timer += dt;
        let mut restored = 0.0;
        while self.heal_timer >= config.heal_interval {
            self.heal_timer -= config.heal_interval;
            restored += config.heal_amount;
        }
        restored
    }
}

/// Chase pressure around `position`: hostile units within the chase radius,
/// heroes counted twice.
pub fn chase_pressure(position: Vec2, faction: Faction, registry: &dyn EntityRegistry) -> u32 {
    chasers(position, faction, registry)
        .map(|e| if e.class.is_hero() { 2 } else { 1 })
        .sum()
}

/// Nearest chaser inside the forward cone, if any.
pub fn nearest_chaser_in_cone<'a>(
    position: Vec2,
    facing: f32,
    half_angle: f32,
    faction: Faction,
    registry: &'a dyn EntityRegistry,
) -> Option<&'a EntitySnapshot> {
    chasers(position, faction, registry)
        .filter(|e| in_forward_cone(position, facing, e.position, half_angle))
        .min_by(|a, b| {
            position
                .distance_squared(a.position)
                .total_cmp(&position.distance_squared(b.position))
        })
}

/// Is `point` within `half_angle` radians of the horizontal facing?
pub fn in_forward_cone(position: Vec2, facing: f32, point: Vec2, half_angle: f32) -> bool {
    let to_point = point - position;
    if to_point.length_squared() < 1e-6 {
        return true;
    }
    let forward = Vec2::new(facing.signum(), 0.0);
    forward.dot(to_point.normalize()) >= half_angle.cos()
}

fn chasers<'a>(
    position: Vec2,
    faction: Faction,
    registry: &'a dyn EntityRegistry,
) -> impl Iterator<Item = &'a EntitySnapshot> + 'a {
    registry.all_live().iter().filter(move |e| {
        e.is_alive()
            && faction.is_hostile_to(e.faction)
            && !e.class.is_structure()
            && e.class != UnitClass::Obstacle
            && position.distance(e.position) <= CHASE_RADIUS
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hero_ai::collaborators::{EntityId, HeroArchetype};
    use crate::hero_ai::difficulty::DifficultyTier;

    struct Open;

    impl MapBounds for Open {
        fn contains(&self, point: Vec2) -> bool {
            point.x.abs() <= 50.0 && point.y.abs() <= 50.0
        }
    }

    struct Registry(Vec<EntitySnapshot>);

    impl EntityRegistry for Registry {
        fn all_live(&self) -> &[EntitySnapshot] {
            &self.0
        }
    }

    fn unit(id: u32, class: UnitClass, position: Vec2) -> EntitySnapshot {
        EntitySnapshot {
            id: EntityId(id),
            faction: Faction::East,
            class,
            position,
            health: 50.0,
            max_health: 50.0,
            casting: false,
            radius: 0.5,
        }
    }

    #[test]
    fn test_safe_point_near_rally() {
        let mut retreat = RetreatController::new();
        let mut rng = GameRng::from_seed(4);
        let rally = Vec2::new(-30.0, 5.0);
        let point = retreat.find_safe_position(rally, &Open, &mut rng);
        assert!(point.distance(rally) <= SAFE_POINT_SPREAD + 1e-5);
        assert_eq!(retreat.safe_point(), Some(point));
    }

    #[test]
    fn test_heal_ticks_at_fixed_period() {
        let config = AgentConfig::for_tier(DifficultyTier::Hard);
        let mut retreat = RetreatController::new();
        let mut rng = GameRng::from_seed(4);
        let point = retreat.find_safe_position(Vec2::ZERO, &Open, &mut rng);

        let healed: f32 = (0..4).map(|_| retreat.tick_heal(0.25, point, &config)).sum();
        assert_eq!(healed, 5.0);
    }

    #[test]
    fn test_leaving_safe_radius_resets_heal_timer() {
        let config = AgentConfig::for_tier(DifficultyTier::Hard);
        let mut retreat = RetreatController::new();
        let mut rng = GameRng::from_seed(4);
        let point = retreat.find_safe_position(Vec2::ZERO, &Open, &mut rng);

        assert_eq!(retreat.tick_heal(0.125, point, &config), 0.0);
        assert_eq!(retreat.tick_heal(0.125, point + Vec2::new(5.0, 0.0), &config), 0.0);
        // Timer restarted, so one more half period is not enough.
        assert_eq!(retreat.tick_heal(0.125, point, &config), 0.0);
        assert_eq!(retreat.tick_heal(0.125, point, &config), config.heal_amount);
    }

    #[test]
    fn test_heroes_count_double_when_chasing() {
        let registry = Registry(vec![
            unit(1, UnitClass::Minion, Vec2::new(3.0, 0.0)),
            unit(2, UnitClass::Hero(HeroArchetype::Bruiser), Vec2::new(-4.0, 0.0)),
            unit(3, UnitClass::Castle, Vec2::new(1.0, 0.0)),
            unit(4, UnitClass::Minion, Vec2::new(20.0, 0.0)),
        ]);
        assert_eq!(chase_pressure(Vec2::ZERO, Faction::West, &registry), 3);
    }

    #[test]
    fn test_chaser_must_be_in_front() {
        let registry = Registry(vec![
            unit(1, UnitClass::Minion, Vec2::new(-2.0, 0.0)),
            unit(2, UnitClass::Minion, Vec2::new(5.0, 0.5)),
        ]);
        let chaser = nearest_chaser_in_cone(Vec2::ZERO, 1.0, 0.5, Faction::West, &registry);
        assert_eq!(chaser.map(|e| e.id), Some(EntityId(2)));
        let behind = nearest_chaser_in_cone(Vec2::ZERO, -1.0, 0.5, Faction::West, &registry);
        assert_eq!(behind.map(|e| e.id), Some(EntityId(1)));
    }

    #[test]
    fn test_forward_cone() {
        assert!(in_forward_cone(Vec2::ZERO, 1.0, Vec2::new(10.0, 1.0), 0.4));
        assert!(!in_forward_cone(Vec2::ZERO, 1.0, Vec2::new(2.0, 3.0), 0.4));
        assert!(!in_forward_cone(Vec2::ZERO, -1.0, Vec2::new(10.0, 0.0), 0.4));
    }
}
