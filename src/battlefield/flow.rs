//! Grid flow fields
//!
//! The map is rasterised into unit cells once per match. Each request runs a
//! breadth-first integration pass outward from the goal cells and turns the
//! resulting cost map into per-cell directions toward the cheapest
//! neighbour. Diagonal steps are only allowed when both orthogonal cells are
//! free, so fields never cut obstacle corners.

use std::collections::VecDeque;
use std::sync::Arc;

use bevy::prelude::*;

use super::map::LaneMap;
use crate::hero_ai::{FlowField, FlowFieldProvider};

/// Side length of one grid cell in world units.
pub const CELL_SIZE: f32 = 1.0;

/// Extra clearance around obstacles when rasterising.
const OBSTACLE_CLEARANCE: f32 = 0.4;

const UNREACHABLE: u32 = u32::MAX;

const NEIGHBORS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Static walkability grid for one map.
#[derive(Debug, Clone)]
pub struct FlowGrid {
    origin: Vec2,
    cell_size: f32,
    width: usize,
    height: usize,
    blocked: Vec<bool>,
}

impl FlowGrid {
    pub fn new(origin: Vec2, cell_size: f32, width: usize, height: usize) -> Self {
        Self {
            origin,
            cell_size,
            width,
            height,
            blocked: vec![false; width * height],
        }
    }

    /// Rasterise `map`, marking every cell whose centre lies inside an obstacle.
    pub fn from_map(map: &LaneMap) -> Self {
        let size = map.half_extents * 2.0;
        let width = (size.x / CELL_SIZE).ceil() as usize;
        let height = (size.y / CELL_SIZE).ceil() as usize;
        let mut grid = Self::new(-map.half_extents, CELL_SIZE, width, height);

        for y in 0..height {
            for x in 0..width {
                let centre = grid.grid_to_world(x, y);
                if map.is_blocked(centre, OBSTACLE_CLEARANCE) {
                    grid.set_obstacle(x, y, true);
                }
            }
        }
        grid
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn set_obstacle(&mut self, x: usize, y: usize, blocked: bool) {
        if x < self.width && y < self.height {
            self.blocked[y * self.width + x] = blocked;
        }
    }

    pub fn is_blocked(&self, x: usize, y: usize) -> bool {
        self.blocked.get(y * self.width + x).copied().unwrap_or(true)
    }

    pub fn world_to_grid(&self, point: Vec2) -> Option<(usize, usize)> {
        let local = (point - self.origin) / self.cell_size;
        if local.x < 0.0 || local.y < 0.0 {
            return None;
        }
        let (x, y) = (local.x as usize, local.y as usize);
        (x < self.width && y < self.height).then_some((x, y))
    }

    pub fn grid_to_world(&self, x: usize, y: usize) -> Vec2 {
        self.origin + Vec2::new(x as f32 + 0.5, y as f32 + 0.5) * self.cell_size
    }

    fn neighbor(&self, x: usize, y: usize, dx: i32, dy: i32) -> Option<(usize, usize)> {
        let nx = x as i32 + dx;
        let ny = y as i32 + dy;
        if nx < 0 || ny < 0 || nx as usize >= self.width || ny as usize >= self.height {
            return None;
        }
        let (nx, ny) = (nx as usize, ny as usize);
        if self.is_blocked(nx, ny) {
            return None;
        }
        // No corner cutting.
        if dx != 0 && dy != 0 && (self.is_blocked(nx, y) || self.is_blocked(x, ny)) {
            return None;
        }
        Some((nx, ny))
    }

    /// Breadth-first step costs from every free cell within `radius` of `target`.
    fn integrate(&self, target: Vec2, radius: f32) -> Option<Vec<u32>> {
        let mut costs = vec![UNREACHABLE; self.width * self.height];
        let mut queue = VecDeque::new();

        for y in 0..self.height {
            for x in 0..self.width {
                if !self.is_blocked(x, y) && self.grid_to_world(x, y).distance(target) <= radius {
                    costs[y * self.width + x] = 0;
                    queue.push_back((x, y));
                }
            }
        }
        if queue.is_empty() {
            // Goal smaller than a cell: seed the containing cell.
            let (x, y) = self.world_to_grid(target)?;
            if self.is_blocked(x, y) {
                return None;
            }
            costs[y * self.width + x] = 0;
            queue.push_back((x, y));
        }

        while let Some((x, y)) = queue.pop_front() {
            let next = costs[y * self.width + x] + 1;
            for (dx, dy) in NEIGHBORS {
                if let Some((nx, ny)) = self.neighbor(x, y, dx, dy) {
                    let cost = &mut costs[ny * self.width + nx];
                    if *cost == UNREACHABLE {
                        *cost = next;
                        queue.push_back((nx, ny));
                    }
                }
            }
        }
        Some(costs)
    }
}

impl FlowFieldProvider for FlowGrid {
    fn generate(&self, target: Vec2, radius: f32) -> Option<Arc<dyn FlowField>> {
        let costs = self.integrate(target, radius)?;
        let mut directions = vec![Vec2::ZERO; self.width * self.height];

        for y in 0..self.height {
            for x in 0..self.width {
                let cost = costs[y * self.width + x];
                if cost == UNREACHABLE || cost == 0 {
                    continue;
                }
                let best = NEIGHBORS
                    .iter()
                    .filter_map(|&(dx, dy)| self.neighbor(x, y, dx, dy))
                    .min_by_key(|&(nx, ny)| costs[ny * self.width + nx]);
                if let Some((nx, ny)) = best {
                    if costs[ny * self.width + nx] < cost {
                        directions[y * self.width + x] =
                            (self.grid_to_world(nx, ny) - self.grid_to_world(x, y)).normalize_or_zero();
                    }
                }
            }
        }

        Some(Arc::new(GridFlowField {
            origin: self.origin,
            cell_size: self.cell_size,
            width: self.width,
            height: self.height,
            directions,
        }))
    }
}

/// Baked directions toward one goal.
#[derive(Debug, Clone)]
pub struct GridFlowField {
    origin: Vec2,
    cell_size: f32,
    width: usize,
    height: usize,
    directions: Vec<Vec2>,
}

impl FlowField for GridFlowField {
    fn direction_at(&self, point: Vec2) -> Vec2 {
        let local = (point - self.origin) / self.cell_size;
        if local.x < 0.0 || local.y < 0.0 {
            return Vec2::ZERO;
        }
        let (x, y) = (local.x as usize, local.y as usize);
        if x >= self.width || y >= self.height {
            return Vec2::ZERO;
        }
        self.directions[y * self.width + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_round_trip_cell_centre() {
        let grid = FlowGrid::new(Vec2::new(-5.0, -5.0), 1.0, 10, 10);
        let centre = grid.grid_to_world(3, 7);
        assert_eq!(grid.world_to_grid(centre), Some((3, 7)));
        assert_eq!(grid.world_to_grid(Vec2::new(6.0, 0.0)), None);
    }

    #[test]
    fn test_open_field_points_at_goal() {
        let grid = FlowGrid::new(Vec2::new(-10.0, -10.0), 1.0, 20, 20);
        let field = grid.generate(Vec2::new(8.0, 0.5), 1.0).expect("field");
        let direction = field.direction_at(Vec2::new(-8.0, 0.5));
        assert!(direction.x > 0.9);
    }

    #[test]
    fn test_field_routes_around_wall() {
        let mut grid = FlowGrid::new(Vec2::ZERO, 1.0, 10, 10);
        for y in 0..8 {
            grid.set_obstacle(5, y, true);
        }
        let field = grid.generate(Vec2::new(8.5, 1.5), 0.5).expect("field");
        // Directly west of the wall the route goes up, not through it.
        let direction = field.direction_at(Vec2::new(4.5, 1.5));
        assert!(direction.y > 0.5, "got {direction:?}");
    }

    #[test]
    fn test_enclosed_goal_is_unreachable() {
        let mut grid = FlowGrid::new(Vec2::ZERO, 1.0, 5, 5);
        grid.set_obstacle(2, 2, true);
        assert!(grid.generate(Vec2::new(2.5, 2.5), 0.1).is_none());
    }

    #[test]
    fn test_lane_map_rasterises_obstacles() {
        let map = LaneMap::standard();
        let grid = FlowGrid::from_map(&map);
        assert_eq!(grid.width(), 80);
        assert_eq!(grid.height(), 24);
        let (x, y) = grid.world_to_grid(Vec2::new(0.2, 0.2)).expect("cell");
        assert!(grid.is_blocked(x, y));
    }
}
