//! Lane units
//!
//! Minions, casters, elite minions and castles. None of them use the hero
//! agent; they follow a simple march-aggro-strike loop:
//! - March along their lane toward the enemy castle
//! - Turn on the nearest hostile within aggro range
//! - Strike whenever the attack timer allows (casters wind up first)

use bevy::prelude::*;

use super::map::{LaneMap, LANE_Y};
use crate::hero_ai::{EntityId, EntitySnapshot, Faction, UnitClass};

/// Distance at which lane units notice enemies.
pub const AGGRO_RADIUS: f32 = 6.0;

/// Seconds before the first wave.
pub const FIRST_WAVE_DELAY: f32 = 2.0;

/// An elite minion joins every Nth wave.
pub const SPECIAL_WAVE_PERIOD: u32 = 3;

/// Combat stats for a lane unit class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitStats {
    pub max_health: f32,
    pub damage: f32,
    pub attack_range: f32,
    pub attack_interval: f32,
    pub move_speed: f32,
    pub radius: f32,
    /// Channel time before a strike lands (0.0 = instant)
    pub wind_up: f32,
}

impl UnitStats {
    pub fn for_class(class: UnitClass) -> Self {
        match class {
            UnitClass::CasterMinion => Self {
                max_health: 40.0,
                damage: 9.0,
                attack_range: 6.0,
                attack_interval: 1.6,
                move_speed: 3.0,
                radius: 0.4,
                wind_up: 0.5,
            },
            UnitClass::SpecialMinion => Self {
                max_health: 140.0,
                damage: 14.0,
                attack_range: 2.0,
                attack_interval: 1.4,
                move_speed: 2.6,
                radius: 0.6,
                wind_up: 0.0,
            },
            UnitClass::Castle => Self {
                max_health: 1200.0,
                damage: 20.0,
                attack_range: 7.0,
                attack_interval: 1.5,
                move_speed: 0.0,
                radius: 3.0,
                wind_up: 0.0,
            },
            _ => Self {
                max_health: 60.0,
                damage: 6.0,
                attack_range: 1.5,
                attack_interval: 1.0,
                move_speed: 3.0,
                radius: 0.4,
                wind_up: 0.0,
            },
        }
    }
}

/// A landed lane-unit attack, applied by the battlefield.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strike {
    pub attacker: EntityId,
    pub target: EntityId,
    pub damage: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Channel {
    target: EntityId,
    remaining: f32,
}

/// One simulated lane unit or castle.
#[derive(Debug, Clone)]
pub struct Unit {
    pub id: EntityId,
    pub faction: Faction,
    pub class: UnitClass,
    pub position: Vec2,
    pub health: f32,
    pub stats: UnitStats,
    /// Row this unit marches along
    pub lane_y: f32,
    attack_timer: f32,
    stun_timer: f32,
    channel: Option<Channel>,
    /// Hero (by id) that last damaged this unit, for kill credit
    pub last_hero_hit: Option<EntityId>,
}

impl Unit {
    pub fn new(id: EntityId, faction: Faction, class: UnitClass, position: Vec2) -> Self {
        let stats = UnitStats::for_class(class);
        Self {
            id,
            faction,
            class,
            position,
            health: stats.max_health,
            stats,
            lane_y: position.y,
            attack_timer: 0.0,
            stun_timer: 0.0,
            channel: None,
            last_hero_hit: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn is_casting(&self) -> bool {
        self.channel.is_some()
    }

    pub fn is_stunned(&self) -> bool {
        self.stun_timer > 0.0
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            faction: self.faction,
            class: self.class,
            position: self.position,
            health: self.health,
            max_health: self.stats.max_health,
            casting: self.is_casting(),
            radius: self.stats.radius,
        }
    }

    /// Returns the damage actually taken.
    pub fn apply_damage(&mut self, amount: f32, source_hero: Option<EntityId>) -> f32 {
        if !self.is_alive() || amount <= 0.0 {
            return 0.0;
        }
        let taken = amount.min(self.health);
        self.health -= taken;
        if source_hero.is_some() {
            self.last_hero_hit = source_hero;
        }
        taken
    }

    /// Stuns interrupt any channel in progress.
    pub fn apply_stun(&mut self, duration: f32) {
        self.stun_timer = self.stun_timer.max(duration);
        self.channel = None;
    }

    /// Advance one tick against `world`. Returns a strike if one lands.
    pub fn step(&mut self, dt: f32, world: &[EntitySnapshot], map: &LaneMap) -> Option<Strike> {
        if !self.is_alive() {
            return None;
        }
        self.attack_timer = (self.attack_timer - dt).max(0.0);
        if self.stun_timer > 0.0 {
            self.stun_timer = (self.stun_timer - dt).max(0.0);
            return None;
        }

        if let Some(channel) = self.channel.as_mut() {
            channel.remaining -= dt;
            if channel.remaining > 0.0 {
                return None;
            }
            let target = channel.target;
            self.channel = None;
            // Channels only land on targets that are still around.
            return world
                .iter()
                .any(|e| e.id == target && e.is_alive())
                .then_some(Strike {
                    attacker: self.id,
                    target,
                    damage: self.stats.damage,
                });
        }

        let aggro = self.stats.attack_range.max(AGGRO_RADIUS);
        let target = world
            .iter()
            .filter(|e| {
                e.is_alive()
                    && self.faction.is_hostile_to(e.faction)
                    && edge_distance(self.position, self.stats.radius, e) <= aggro
            })
            .min_by(|a, b| {
                edge_distance(self.position, self.stats.radius, a)
                    .total_cmp(&edge_distance(self.position, self.stats.radius, b))
            })
            .copied();

        match target {
            Some(target) if edge_distance(self.position, self.stats.radius, &target) <= self.stats.attack_range => {
                if self.attack_timer > 0.0 {
                    return None;
                }
                self.attack_timer = self.stats.attack_interval;
                if self.stats.wind_up > 0.0 {
                    self.channel = Some(Channel {
                        target: target.id,
                        remaining: self.stats.wind_up,
                    });
                    None
                } else {
                    Some(Strike {
                        attacker: self.id,
                        target: target.id,
                        damage: self.stats.damage,
                    })
                }
            }
            Some(target) => {
                self.move_toward(target.position, dt, map);
                None
            }
            None => {
                let enemy_castle = map.castle_position(self.faction.opponent().unwrap_or(Faction::Neutral));
                let waypoint = if (enemy_castle.x - self.position.x).abs() > 4.0 {
                    Vec2::new(enemy_castle.x, self.lane_y)
                } else {
                    enemy_castle
                };
                self.move_toward(waypoint, dt, map);
                None
            }
        }
    }

    fn move_toward(&mut self, point: Vec2, dt: f32, map: &LaneMap) {
        if self.stats.move_speed <= 0.0 {
            return;
        }
        let offset = point - self.position;
        let step = self.stats.move_speed * dt;
        let next = if offset.length() <= step {
            point
        } else {
            self.position + offset.normalize_or_zero() * step
        };
        self.position = map.push_out_of_obstacles(map.clamp(next), self.stats.radius);
    }
}

/// Gap between our edge and the other entity's edge.
fn edge_distance(position: Vec2, radius: f32, other: &EntitySnapshot) -> f32 {
    (position.distance(other.position) - radius - other.radius).max(0.0)
}

/// Periodic squad spawns for both factions in both lanes.
#[derive(Debug, Clone)]
pub struct WaveSpawner {
    interval: f32,
    timer: f32,
    waves: u32,
}

impl WaveSpawner {
    pub fn new(interval: f32) -> Self {
        Self {
            interval,
            timer: FIRST_WAVE_DELAY,
            waves: 0,
        }
    }

    pub fn waves_spawned(&self) -> u32 {
        self.waves
    }

    /// Classes and positions of every unit due this tick.
    pub fn tick(&mut self, dt: f32, map: &LaneMap) -> Vec<(Faction, UnitClass, Vec2)> {
        self.timer -= dt;
        if self.timer > 0.0 {
            return Vec::new();
        }
        self.timer += self.interval;
        self.waves += 1;

        let mut squad = vec![UnitClass::Minion, UnitClass::Minion, UnitClass::CasterMinion];
        if self.waves % SPECIAL_WAVE_PERIOD == 0 {
            squad.push(UnitClass::SpecialMinion);
        }

        let mut spawns = Vec::new();
        for faction in [Faction::West, Faction::East] {
            let back = if faction == Faction::West { -1.0 } else { 1.0 };
            for lane in 0..LANE_Y.len() {
                let front = map.squad_spawn(faction, lane);
                for (rank, class) in squad.iter().enumerate() {
                    let offset = Vec2::new(back * rank as f32 * 1.2, 0.0);
                    spawns.push((faction, *class, front + offset));
                }
            }
        }
        spawns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enemy(id: u32, position: Vec2) -> EntitySnapshot {
        EntitySnapshot {
            id: EntityId(id),
            faction: Faction::East,
            class: UnitClass::Minion,
            position,
            health: 60.0,
            max_health: 60.0,
            casting: false,
            radius: 0.4,
        }
    }

    #[test]
    fn test_minion_marches_along_lane() {
        let map = LaneMap::standard();
        let mut unit = Unit::new(EntityId(1), Faction::West, UnitClass::Minion, Vec2::new(-30.0, 5.0));
        for _ in 0..10 {
            assert!(unit.step(0.1, &[], &map).is_none());
        }
        assert!(unit.position.x > -30.0);
        assert!((unit.position.y - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_minion_strikes_in_range_then_waits() {
        let map = LaneMap::standard();
        let mut unit = Unit::new(EntityId(1), Faction::West, UnitClass::Minion, Vec2::new(0.0, 5.0));
        let world = [enemy(2, Vec2::new(1.5, 5.0))];
        let strike = unit.step(0.1, &world, &map);
        assert_eq!(strike.map(|s| s.target), Some(EntityId(2)));
        assert!(unit.step(0.1, &world, &map).is_none());
    }

    #[test]
    fn test_caster_channels_before_striking() {
        let map = LaneMap::standard();
        let mut unit = Unit::new(EntityId(1), Faction::West, UnitClass::CasterMinion, Vec2::new(0.0, 5.0));
        let world = [enemy(2, Vec2::new(4.0, 5.0))];
        assert!(unit.step(0.1, &world, &map).is_none());
        assert!(unit.is_casting());
        let landed = (0..7).filter_map(|_| unit.step(0.1, &world, &map)).count();
        assert_eq!(landed, 1);
        assert!(!unit.is_casting());
    }

    #[test]
    fn test_stun_interrupts_channel() {
        let map = LaneMap::standard();
        let mut unit = Unit::new(EntityId(1), Faction::West, UnitClass::CasterMinion, Vec2::new(0.0, 5.0));
        let world = [enemy(2, Vec2::new(4.0, 5.0))];
        unit.step(0.1, &world, &map);
        unit.apply_stun(1.0);
        assert!(!unit.is_casting());
        assert!(unit.step(0.1, &world, &map).is_none());
    }

    #[test]
    fn test_waves_spawn_on_schedule() {
        let map = LaneMap::standard();
        let mut spawner = WaveSpawner::new(20.0);
        assert!(spawner.tick(1.0, &map).is_empty());
        let first = spawner.tick(1.0, &map);
        // Two factions, two lanes, three units each.
        assert_eq!(first.len(), 12);
        assert!(spawner.tick(19.0, &map).is_empty());
        assert_eq!(spawner.tick(1.0, &map).len(), 12);
        // Third wave brings an elite per squad.
        assert_eq!(spawner.tick(20.0, &map).len(), 16);
    }
}
