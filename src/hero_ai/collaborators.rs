//! External Collaborators
//!
//! The hero agent never owns the world it fights in. Everything it needs from
//! the outside is expressed here as a trait and supplied either at
//! construction (per-hero capabilities) or per tick through [`TickContext`]
//! (world services).
//!
//! Decisions read a snapshot and emit commands; they never touch simulation
//! storage directly.

use std::sync::Arc;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Stable identity of a simulated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Side an entity fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Faction {
    /// Castle on the negative X side of the map
    West,
    /// Castle on the positive X side of the map
    East,
    /// Terrain, obstacles and anything nobody fights over
    Neutral,
}

impl Faction {
    /// The side this faction fights against (`Neutral` has none).
    pub fn opponent(self) -> Option<Faction> {
        match self {
            Faction::West => Some(Faction::East),
            Faction::East => Some(Faction::West),
            Faction::Neutral => None,
        }
    }

    /// True if `other` is a valid enemy of this faction.
    pub fn is_hostile_to(self, other: Faction) -> bool {
        self.opponent() == Some(other)
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Faction::West => "West",
            Faction::East => "East",
            Faction::Neutral => "Neutral",
        }
    }
}

/// Enemy hero play style, remembered by the target selector once seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeroArchetype {
    /// Durable close-range fighter
    Bruiser,
    /// Fragile ranged damage dealer
    Marksman,
    /// Area caster
    Mage,
}

impl HeroArchetype {
    pub fn all() -> &'static [HeroArchetype] {
        &[HeroArchetype::Bruiser, HeroArchetype::Marksman, HeroArchetype::Mage]
    }

    pub fn name(self) -> &'static str {
        match self {
            HeroArchetype::Bruiser => "Bruiser",
            HeroArchetype::Marksman => "Marksman",
            HeroArchetype::Mage => "Mage",
        }
    }
}

/// Type tag carried by every entity snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitClass {
    /// A hero unit (player- or agent-controlled)
    Hero(HeroArchetype),
    /// Ranged minion that channels its attacks
    CasterMinion,
    /// Elite minion spawned with every few squads
    SpecialMinion,
    /// Generic melee minion
    Minion,
    /// A faction's castle
    Castle,
    /// Blocking terrain (never targeted)
    Obstacle,
}

impl UnitClass {
    pub fn is_hero(self) -> bool {
        matches!(self, UnitClass::Hero(_))
    }

    pub fn is_structure(self) -> bool {
        matches!(self, UnitClass::Castle)
    }

    pub fn name(self) -> &'static str {
        match self {
            UnitClass::Hero(archetype) => archetype.name(),
            UnitClass::CasterMinion => "Caster",
            UnitClass::SpecialMinion => "Elite",
            UnitClass::Minion => "Minion",
            UnitClass::Castle => "Castle",
            UnitClass::Obstacle => "Obstacle",
        }
    }
}

/// Read-only view of one live entity, valid for a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub faction: Faction,
    pub class: UnitClass,
    pub position: Vec2,
    /// Current health (absolute)
    pub health: f32,
    pub max_health: f32,
    /// True while the entity is mid-cast (casting casters are juicier targets)
    pub casting: bool,
    /// Collision radius used for separation and line-of-sight checks
    pub radius: f32,
}

impl EntitySnapshot {
    /// Health as a fraction (0.0 to 1.0)
    pub fn health_fraction(&self) -> f32 {
        if self.max_health > 0.0 {
            (self.health / self.max_health).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}

/// Area used by [`SpatialQuery::overlap_area`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AreaShape {
    Circle { radius: f32 },
    /// Axis-aligned rectangle given by its half extents
    Rect { half_extents: Vec2 },
}

impl AreaShape {
    /// True if a disc at `point` with `radius` overlaps this shape centred at `center`.
    pub fn overlaps(&self, center: Vec2, point: Vec2, radius: f32) -> bool {
        match *self {
            AreaShape::Circle { radius: r } => center.distance(point) <= r + radius,
            AreaShape::Rect { half_extents } => {
                let d = (point - center).abs();
                d.x <= half_extents.x + radius && d.y <= half_extents.y + radius
            }
        }
    }
}

/// Snapshot of the currently live entities.
pub trait EntityRegistry {
    fn all_live(&self) -> &[EntitySnapshot];

    /// Look up one entity by identity. `None` means dead or destroyed.
    fn get(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.all_live().iter().find(|e| e.id == id && e.is_alive())
    }
}

/// Overlap queries over live entities and obstacles.
pub trait SpatialQuery {
    fn overlap_area(&self, point: Vec2, shape: AreaShape) -> Vec<EntitySnapshot>;
}

/// A precomputed direction field. Read-only once built.
pub trait FlowField: Send + Sync {
    /// Direction to follow at `point`. A zero vector means "no advice".
    fn direction_at(&self, point: Vec2) -> Vec2;
}

/// Builds flow fields toward a goal area.
pub trait FlowFieldProvider {
    /// `None` when no field can be produced (e.g. goal unreachable).
    fn generate(&self, target: Vec2, radius: f32) -> Option<Arc<dyn FlowField>>;
}

/// Ability execution engine for one hero (cooldowns, effect spawning).
pub trait AbilitySystem {
    fn ability_count(&self) -> usize;
    fn is_ready(&self, index: usize) -> bool;
    fn activate(&mut self, index: usize);
    /// Wind-up before the ability takes effect, in seconds
    fn cast_time(&self, index: usize) -> f32;
}

/// Animation commands, replacing string-keyed triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimationTrigger {
    /// Wind-up for the ability at this loadout index
    Cast(usize),
    Death,
    Respawn,
}

/// Continuous animation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimationParam {
    MoveSpeed,
    Facing,
}

/// Fire-and-forget animation output.
pub trait AnimationSink {
    fn trigger(&mut self, trigger: AnimationTrigger);
    fn set_continuous(&mut self, param: AnimationParam, value: f32);
}

/// Requests a future respawn. The core never tracks the delay itself.
pub trait RespawnScheduler {
    fn schedule(&mut self, delay: f32, tier: super::DifficultyTier);
}

/// Playable area of the map.
pub trait MapBounds {
    fn contains(&self, point: Vec2) -> bool;
}

/// True if `point` and its four neighbours `margin` away all lie inside `bounds`.
pub fn contains_with_margin(bounds: &dyn MapBounds, point: Vec2, margin: f32) -> bool {
    bounds.contains(point)
        && bounds.contains(point + Vec2::new(margin, 0.0))
        && bounds.contains(point - Vec2::new(margin, 0.0))
        && bounds.contains(point + Vec2::new(0.0, margin))
        && bounds.contains(point - Vec2::new(0.0, margin))
}

/// World services lent to the agent for one tick.
pub struct TickContext<'a> {
    pub registry: &'a dyn EntityRegistry,
    pub spatial: &'a dyn SpatialQuery,
    pub flow: &'a dyn FlowFieldProvider,
    pub bounds: &'a dyn MapBounds,
    pub respawn: &'a mut dyn RespawnScheduler,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Square(f32);

    impl MapBounds for Square {
        fn contains(&self, point: Vec2) -> bool {
            point.x.abs() <= self.0 && point.y.abs() <= self.0
        }
    }

    #[test]
    fn test_faction_hostility() {
        assert!(Faction::West.is_hostile_to(Faction::East));
        assert!(Faction::East.is_hostile_to(Faction::West));
        assert!(!Faction::West.is_hostile_to(Faction::West));
        assert!(!Faction::West.is_hostile_to(Faction::Neutral));
        assert_eq!(Faction::Neutral.opponent(), None);
    }

    #[test]
    fn test_health_fraction_handles_zero_max() {
        let snapshot = EntitySnapshot {
            id: EntityId(1),
            faction: Faction::East,
            class: UnitClass::Minion,
            position: Vec2::ZERO,
            health: 10.0,
            max_health: 0.0,
            casting: false,
            radius: 0.5,
        };
        assert_eq!(snapshot.health_fraction(), 0.0);
    }

    #[test]
    fn test_rect_overlap_accounts_for_radius() {
        let shape = AreaShape::Rect { half_extents: Vec2::new(2.0, 0.5) };
        assert!(shape.overlaps(Vec2::ZERO, Vec2::new(2.4, 0.0), 0.5));
        assert!(!shape.overlaps(Vec2::ZERO, Vec2::new(0.0, 1.2), 0.5));
    }

    #[test]
    fn test_contains_with_margin() {
        let bounds = Square(10.0);
        assert!(contains_with_margin(&bounds, Vec2::new(8.0, 0.0), 1.5));
        assert!(!contains_with_margin(&bounds, Vec2::new(9.0, 0.0), 1.5));
    }
}
