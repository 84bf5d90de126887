//! Movement Planner
//!
//! Turns a destination into a per-tick velocity:
//! 1. Base direction from the flow field (straight line if the field is
//!    missing, stale for another goal, or degenerate)
//! 2. Separation from neighbours within the avoidance radius, weighted by
//!    `1 - distance / radius`
//! 3. `normalize(base + weight * avoidance)`, heavier while retreating
//! 4. Boundary check: a step that would leave the playable rectangle is
//!    swapped for the best in-bounds cardinal/diagonal direction, or a small
//!    random lateral nudge if none fits

use std::sync::Arc;

use bevy::prelude::*;

use super::collaborators::{
    contains_with_margin, AreaShape, EntityId, FlowField, FlowFieldProvider, MapBounds, SpatialQuery,
    UnitClass,
};
use super::constants::{
    ARRIVAL_EPSILON, AVOIDANCE_RADIUS, AVOIDANCE_WEIGHT, BOUNDARY_LOOKAHEAD, BOUNDARY_MARGIN,
    FLOW_FIELD_GOAL_RADIUS, FLOW_FIELD_REFRESH_INTERVAL, MAX_LATERAL_NUDGE, RETREAT_AVOIDANCE_RADIUS,
    RETREAT_AVOIDANCE_WEIGHT,
};
use super::GameRng;

/// Cardinal and diagonal fallbacks, tried in order of agreement with the
/// desired direction.
const CANDIDATE_DIRECTIONS: [Vec2; 8] = [
    Vec2::new(1.0, 0.0),
    Vec2::new(-1.0, 0.0),
    Vec2::new(0.0, 1.0),
    Vec2::new(0.0, -1.0),
    Vec2::new(std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2),
    Vec2::new(std::f32::consts::FRAC_1_SQRT_2, -std::f32::consts::FRAC_1_SQRT_2),
    Vec2::new(-std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2),
    Vec2::new(-std::f32::consts::FRAC_1_SQRT_2, -std::f32::consts::FRAC_1_SQRT_2),
];

/// Attempts made when pulling an out-of-bounds destination back in.
const DESTINATION_ATTEMPTS: u32 = 8;

/// Input to [`MovementPlanner::move_toward`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveRequest {
    pub self_id: EntityId,
    pub position: Vec2,
    pub destination: Vec2,
    pub move_speed: f32,
    /// Retreating agents keep more distance from everything around them
    pub retreating: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    pub velocity: Vec2,
    pub arrived: bool,
}

/// Owns the cached flow field and its refresh countdown.
#[derive(Default)]
pub struct MovementPlanner {
    flow_field: Option<Arc<dyn FlowField>>,
    flow_goal: Option<Vec2>,
    refresh_timer: f32,
}

impl MovementPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the refresh countdown.
    pub fn tick(&mut self, dt: f32) {
        self.refresh_timer = (self.refresh_timer - dt).max(0.0);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn has_flow_field(&self) -> bool {
        self.flow_field.is_some()
    }

    /// Swap in a new field if the refresh interval has elapsed. Never more often.
    fn refresh_flow_field(&mut self, destination: Vec2, provider: &dyn FlowFieldProvider) {
        if self.refresh_timer > 0.0 {
            return;
        }
        self.refresh_timer = FLOW_FIELD_REFRESH_INTERVAL;
        self.flow_field = provider.generate(destination, FLOW_FIELD_GOAL_RADIUS);
        self.flow_goal = self.flow_field.as_ref().map(|_| destination);
    }

    /// Flow direction toward `destination`, if the cached field leads there.
    pub fn flow_direction(&mut self, position: Vec2, destination: Vec2, provider: &dyn FlowFieldProvider) -> Option<Vec2> {
        self.refresh_flow_field(destination, provider);

        let goal = self.flow_goal?;
        if goal.distance(destination) > FLOW_FIELD_GOAL_RADIUS {
            return None;
        }
        let field = self.flow_field.as_ref()?;
        let direction = field.direction_at(position);
        if direction.length_squared() > 1e-6 {
            Some(direction.normalize())
        } else {
            None
        }
    }

    /// Plan this tick's velocity toward `request.destination`.
    pub fn move_toward(
        &mut self,
        request: &MoveRequest,
        provider: &dyn FlowFieldProvider,
        spatial: &dyn SpatialQuery,
        bounds: &dyn MapBounds,
        rng: &mut GameRng,
    ) -> MoveOutcome {
        let to_destination = request.destination - request.position;
        if to_destination.length() < ARRIVAL_EPSILON {
            return MoveOutcome {
                velocity: Vec2::ZERO,
                arrived: true,
            };
        }

        let base = self
            .flow_direction(request.position, request.destination, provider)
            .unwrap_or_else(|| to_destination.normalize_or_zero());

        let (radius, weight) = if request.retreating {
            (RETREAT_AVOIDANCE_RADIUS, RETREAT_AVOIDANCE_WEIGHT)
        } else {
            (AVOIDANCE_RADIUS, AVOIDANCE_WEIGHT)
        };
        let avoidance = avoidance_vector(request.self_id, request.position, radius, spatial);

        let blended = (base + avoidance * weight).normalize_or_zero();
        let blended = if blended == Vec2::ZERO { base } else { blended };
        let direction = safe_direction(request.position, blended, bounds, rng);

        MoveOutcome {
            velocity: direction * request.move_speed,
            arrived: false,
        }
    }
}

/// Average push away from neighbours, each weighted by `1 - d / radius`.
pub fn avoidance_vector(self_id: EntityId, position: Vec2, radius: f32, spatial: &dyn SpatialQuery) -> Vec2 {
    let neighbours = spatial.overlap_area(position, AreaShape::Circle { radius });
    let mut push = Vec2::ZERO;
    let mut count = 0u32;

    for other in neighbours.iter().filter(|e| e.id != self_id) {
        let offset = position - other.position;
        let distance = offset.length();
        if distance >= radius || distance < 1e-4 {
            continue;
        }
        // Obstacles push from their edge, not their centre.
        let effective = if other.class == UnitClass::Obstacle {
            (distance - other.radius).max(0.0)
        } else {
            distance
        };
        push += offset / distance * (1.0 - effective / radius).max(0.0);
        count += 1;
    }

    if count == 0 {
        Vec2::ZERO
    } else {
        push / count as f32
    }
}

/// Keep `desired` if a look-ahead step along it stays in bounds; otherwise
/// pick the in-bounds candidate direction closest to it, or nudge sideways.
pub fn safe_direction(position: Vec2, desired: Vec2, bounds: &dyn MapBounds, rng: &mut GameRng) -> Vec2 {
    let fits = |direction: Vec2| {
        contains_with_margin(bounds, position + direction * BOUNDARY_LOOKAHEAD, BOUNDARY_MARGIN)
    };

    if desired != Vec2::ZERO && fits(desired) {
        return desired;
    }

    let mut candidates = CANDIDATE_DIRECTIONS;
    candidates.sort_by(|a, b| b.dot(desired).total_cmp(&a.dot(desired)));
    if let Some(direction) = candidates.into_iter().find(|d| fits(*d)) {
        return direction;
    }

    let lateral = if desired == Vec2::ZERO { Vec2::Y } else { desired.perp().normalize_or_zero() };
    let side = if rng.chance(0.5) { 1.0 } else { -1.0 };
    lateral * side * rng.random_range(0.2, MAX_LATERAL_NUDGE)
}

/// Pull an out-of-bounds destination back toward `position` until it fits.
/// Falls back to standing still.
pub fn resolve_destination(position: Vec2, destination: Vec2, bounds: &dyn MapBounds) -> Vec2 {
    if contains_with_margin(bounds, destination, BOUNDARY_MARGIN) {
        return destination;
    }
    (1..=DESTINATION_ATTEMPTS)
        .map(|step| destination.lerp(position, step as f32 / DESTINATION_ATTEMPTS as f32))
        .find(|candidate| contains_with_margin(bounds, *candidate, BOUNDARY_MARGIN))
        .unwrap_or(position)
}

/// Horizontal facing: toward the target if there is one, else along the movement.
pub fn facing_for(position: Vec2, target: Option<Vec2>, velocity: Vec2, current: f32) -> f32 {
    let dx = match target {
        Some(target) => target.x - position.x,
        None => velocity.x,
    };
    if dx > 1e-3 {
        1.0
    } else if dx < -1e-3 {
        -1.0
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hero_ai::collaborators::{EntitySnapshot, Faction};

    struct Arena;

    impl MapBounds for Arena {
        fn contains(&self, point: Vec2) -> bool {
            point.x.abs() <= 20.0 && point.y.abs() <= 10.0
        }
    }

    struct Crowd(Vec<EntitySnapshot>);

    impl SpatialQuery for Crowd {
        fn overlap_area(&self, point: Vec2, shape: AreaShape) -> Vec<EntitySnapshot> {
            self.0
                .iter()
                .filter(|e| shape.overlaps(point, e.position, 0.0))
                .copied()
                .collect()
        }
    }

    struct ConstantField(Vec2);

    impl FlowField for ConstantField {
        fn direction_at(&self, _point: Vec2) -> Vec2 {
            self.0
        }
    }

    struct Provider(Vec2);

    impl FlowFieldProvider for Provider {
        fn generate(&self, _target: Vec2, _radius: f32) -> Option<Arc<dyn FlowField>> {
            Some(Arc::new(ConstantField(self.0)))
        }
    }

    struct NoFlow;

    impl FlowFieldProvider for NoFlow {
        fn generate(&self, _target: Vec2, _radius: f32) -> Option<Arc<dyn FlowField>> {
            None
        }
    }

    fn minion(id: u32, position: Vec2) -> EntitySnapshot {
        EntitySnapshot {
            id: EntityId(id),
            faction: Faction::West,
            class: UnitClass::Minion,
            position,
            health: 10.0,
            max_health: 10.0,
            casting: false,
            radius: 0.5,
        }
    }

    fn request(position: Vec2, destination: Vec2) -> MoveRequest {
        MoveRequest {
            self_id: EntityId(0),
            position,
            destination,
            move_speed: 4.0,
            retreating: false,
        }
    }

    #[test]
    fn test_straight_line_without_flow_field() {
        let mut planner = MovementPlanner::new();
        let mut rng = GameRng::from_seed(1);
        let outcome = planner.move_toward(
            &request(Vec2::ZERO, Vec2::new(5.0, 0.0)),
            &NoFlow,
            &Crowd(vec![]),
            &Arena,
            &mut rng,
        );
        assert_eq!(outcome.velocity, Vec2::new(4.0, 0.0));
        assert!(!outcome.arrived);
    }

    #[test]
    fn test_degenerate_flow_field_falls_back() {
        let mut planner = MovementPlanner::new();
        let mut rng = GameRng::from_seed(1);
        let outcome = planner.move_toward(
            &request(Vec2::ZERO, Vec2::new(0.0, 5.0)),
            &Provider(Vec2::ZERO),
            &Crowd(vec![]),
            &Arena,
            &mut rng,
        );
        assert_eq!(outcome.velocity, Vec2::new(0.0, 4.0));
    }

    #[test]
    fn test_flow_field_direction_is_followed() {
        let mut planner = MovementPlanner::new();
        let mut rng = GameRng::from_seed(1);
        let outcome = planner.move_toward(
            &request(Vec2::ZERO, Vec2::new(5.0, 0.0)),
            &Provider(Vec2::new(0.0, 1.0)),
            &Crowd(vec![]),
            &Arena,
            &mut rng,
        );
        assert_eq!(outcome.velocity, Vec2::new(0.0, 4.0));
    }

    #[test]
    fn test_arrival_zeroes_velocity() {
        let mut planner = MovementPlanner::new();
        let mut rng = GameRng::from_seed(1);
        let outcome = planner.move_toward(
            &request(Vec2::ZERO, Vec2::new(0.1, 0.0)),
            &NoFlow,
            &Crowd(vec![]),
            &Arena,
            &mut rng,
        );
        assert_eq!(outcome.velocity, Vec2::ZERO);
        assert!(outcome.arrived);
    }

    #[test]
    fn test_neighbour_pushes_away() {
        let crowd = Crowd(vec![minion(5, Vec2::new(0.0, 1.0))]);
        let push = avoidance_vector(EntityId(0), Vec2::ZERO, AVOIDANCE_RADIUS, &crowd);
        assert!(push.y < 0.0);
        assert!(push.x.abs() < 1e-6);
    }

    #[test]
    fn test_self_is_ignored_by_avoidance() {
        let crowd = Crowd(vec![minion(0, Vec2::new(0.0, 0.5))]);
        let push = avoidance_vector(EntityId(0), Vec2::ZERO, AVOIDANCE_RADIUS, &crowd);
        assert_eq!(push, Vec2::ZERO);
    }

    #[test]
    fn test_boundary_redirects_into_map() {
        let mut rng = GameRng::from_seed(1);
        let position = Vec2::new(18.5, 0.0);
        let direction = safe_direction(position, Vec2::X, &Arena, &mut rng);
        let step = position + direction * BOUNDARY_LOOKAHEAD;
        assert!(contains_with_margin(&Arena, step, BOUNDARY_MARGIN));
    }

    #[test]
    fn test_destination_pulled_back_in_bounds() {
        let resolved = resolve_destination(Vec2::ZERO, Vec2::new(30.0, 0.0), &Arena);
        assert!(contains_with_margin(&Arena, resolved, BOUNDARY_MARGIN));
        assert!(resolved.x > 0.0);
    }

    #[test]
    fn test_flow_field_refreshes_on_interval_only() {
        let mut planner = MovementPlanner::new();
        let provider = Provider(Vec2::X);
        assert!(planner.flow_direction(Vec2::ZERO, Vec2::new(5.0, 0.0), &provider).is_some());
        // A new goal inside the refresh interval ignores the stale field.
        assert!(planner.flow_direction(Vec2::ZERO, Vec2::new(-15.0, 0.0), &provider).is_none());
        planner.tick(FLOW_FIELD_REFRESH_INTERVAL);
        assert!(planner.flow_direction(Vec2::ZERO, Vec2::new(-15.0, 0.0), &provider).is_some());
    }

    #[test]
    fn test_facing_follows_target_then_movement() {
        assert_eq!(facing_for(Vec2::ZERO, Some(Vec2::new(-3.0, 0.0)), Vec2::X, 1.0), -1.0);
        assert_eq!(facing_for(Vec2::ZERO, None, Vec2::new(2.0, 0.0), -1.0), 1.0);
        assert_eq!(facing_for(Vec2::ZERO, None, Vec2::ZERO, -1.0), -1.0);
    }
}
