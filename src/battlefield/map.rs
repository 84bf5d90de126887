//! Two-lane map layout
//!
//! The playable area is an axis-aligned rectangle centred on the origin.
//! West's castle sits at negative X, East's at positive X; the two lanes run
//! horizontally above and below the centre line.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::hero_ai::{Faction, MapBounds};

// ============================================================================
// Layout constants
// ============================================================================

/// Half width of the playable rectangle (X axis).
pub const MAP_HALF_X: f32 = 40.0;

/// Half height of the playable rectangle (Y axis).
pub const MAP_HALF_Y: f32 = 12.0;

/// Y coordinate of the two lanes.
pub const LANE_Y: [f32; 2] = [5.0, -5.0];

/// Distance of each castle from the centre.
pub const CASTLE_X: f32 = 36.0;

/// Distance of each rally point from the centre.
pub const RALLY_X: f32 = 30.0;

/// Heroes (re)spawn this far in front of their castle.
pub const HERO_SPAWN_OFFSET: f32 = 4.0;

/// Minion squads spawn this far in front of their castle.
pub const SQUAD_SPAWN_OFFSET: f32 = 3.0;

/// A circular piece of blocking terrain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub position: Vec2,
    pub radius: f32,
}

/// The static layout of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneMap {
    pub name: String,
    pub half_extents: Vec2,
    pub obstacles: Vec<Obstacle>,
}

impl LaneMap {
    /// Standard two-lane map with a few rocks between the lanes.
    pub fn standard() -> Self {
        Self {
            name: "TwinLanes".to_string(),
            half_extents: Vec2::new(MAP_HALF_X, MAP_HALF_Y),
            obstacles: vec![
                Obstacle {
                    position: Vec2::new(-12.0, 1.5),
                    radius: 1.5,
                },
                Obstacle {
                    position: Vec2::new(12.0, -1.5),
                    radius: 1.5,
                },
                Obstacle {
                    position: Vec2::new(0.0, 0.0),
                    radius: 2.0,
                },
            ],
        }
    }

    /// Sign of the faction's home side (-1 west, +1 east).
    fn side(faction: Faction) -> f32 {
        match faction {
            Faction::East => 1.0,
            _ => -1.0,
        }
    }

    pub fn castle_position(&self, faction: Faction) -> Vec2 {
        Vec2::new(Self::side(faction) * CASTLE_X, 0.0)
    }

    pub fn rally_point(&self, faction: Faction) -> Vec2 {
        Vec2::new(Self::side(faction) * RALLY_X, 0.0)
    }

    pub fn hero_spawn(&self, faction: Faction) -> Vec2 {
        Vec2::new(Self::side(faction) * (CASTLE_X - HERO_SPAWN_OFFSET), 0.0)
    }

    pub fn squad_spawn(&self, faction: Faction, lane: usize) -> Vec2 {
        let y = LANE_Y.get(lane).copied().unwrap_or(0.0);
        Vec2::new(Self::side(faction) * (CASTLE_X - SQUAD_SPAWN_OFFSET), y)
    }

    /// Clamp a point into the playable rectangle.
    pub fn clamp(&self, point: Vec2) -> Vec2 {
        point.clamp(-self.half_extents, self.half_extents)
    }

    /// Move a disc of `radius` at `point` out of any overlapping obstacle.
    pub fn push_out_of_obstacles(&self, point: Vec2, radius: f32) -> Vec2 {
        self.obstacles.iter().fold(point, |point, obstacle| {
            let offset = point - obstacle.position;
            let min_distance = obstacle.radius + radius;
            let distance = offset.length();
            if distance >= min_distance {
                point
            } else if distance < 1e-4 {
                obstacle.position + Vec2::new(0.0, min_distance)
            } else {
                obstacle.position + offset / distance * min_distance
            }
        })
    }

    pub fn is_blocked(&self, point: Vec2, clearance: f32) -> bool {
        self.obstacles
            .iter()
            .any(|o| o.position.distance(point) < o.radius + clearance)
    }
}

impl Default for LaneMap {
    fn default() -> Self {
        Self::standard()
    }
}

impl MapBounds for LaneMap {
    fn contains(&self, point: Vec2) -> bool {
        point.x.abs() <= self.half_extents.x && point.y.abs() <= self.half_extents.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_castles_face_each_other() {
        let map = LaneMap::standard();
        assert!(map.castle_position(Faction::West).x < 0.0);
        assert!(map.castle_position(Faction::East).x > 0.0);
        assert!(map.contains(map.castle_position(Faction::East)));
    }

    #[test]
    fn test_push_out_of_obstacle() {
        let map = LaneMap::standard();
        let pushed = map.push_out_of_obstacles(Vec2::new(0.5, 0.0), 0.5);
        assert!(pushed.distance(Vec2::ZERO) >= 2.5 - 1e-4);
        assert!(!map.is_blocked(pushed, 0.4));
    }

    #[test]
    fn test_lanes_are_clear() {
        let map = LaneMap::standard();
        for x in -35..=35 {
            for lane in LANE_Y {
                assert!(!map.is_blocked(Vec2::new(x as f32, lane), 0.8));
            }
        }
    }
}
