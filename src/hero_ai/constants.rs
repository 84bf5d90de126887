//! Hero AI Constants
//!
//! Centralized location for the fixed numbers the hero agent is tuned around.
//! Per-difficulty values live in [`super::difficulty::AgentConfig`]; the ones
//! here are shared by every tier.

// ============================================================================
// Targeting
// ============================================================================

/// Radius within which opposing entities count as attackable.
pub const DETECTION_RADIUS: f32 = 20.0;

/// A committed target further than this starts the lose-track countdown.
pub const LOSE_TRACK_RANGE: f32 = DETECTION_RADIUS * 1.5;

/// How long a target may stay beyond [`LOSE_TRACK_RANGE`] before it is dropped.
pub const LOSE_TRACK_TIMEOUT: f32 = 2.0;

/// Castles below this health fraction are treated as worth finishing.
pub const CASTLE_CRITICAL_HEALTH: f32 = 0.2;

// ============================================================================
// Engagement geometry
// ============================================================================

/// Horizontal distance under which the melee priority ladder applies.
pub const MELEE_BAND: f32 = 4.0;

/// Upper edge of the "mid" distance band used for skill bonuses.
pub const MID_BAND: f32 = 8.0;

/// Vertical tolerance for close engagements.
pub const NEAR_ALIGNMENT_TOLERANCE: f32 = 2.5;

/// Vertical tolerance right after leaving the melee band.
pub const FAR_ALIGNMENT_TOLERANCE_MAX: f32 = 1.8;

/// Vertical tolerance at long range.
pub const FAR_ALIGNMENT_TOLERANCE_MIN: f32 = 1.2;

/// Horizontal distance at which tolerance bottoms out.
pub const FAR_ALIGNMENT_DISTANCE: f32 = 12.0;

/// Minimum time between two switches into the Positioning substate.
pub const POSITION_CHANGE_COOLDOWN: f32 = 1.0;

/// Candidate spots tried before Positioning gives up and forces Attack.
pub const MAX_POSITION_ATTEMPTS: u32 = 3;

/// Extra slack over the ideal range before Approach hands over to Positioning.
pub const APPROACH_SLACK: f32 = 1.5;

/// Half height of the corridor checked for blocking obstacles.
pub const LOS_CORRIDOR_HALF_HEIGHT: f32 = 0.5;

/// Horizontal distance a blocked agent closes to, to get around the obstacle.
pub const BLOCKED_SIGHT_RANGE: f32 = 3.0;

// ============================================================================
// Movement
// ============================================================================

/// Distance under which a destination counts as reached.
pub const ARRIVAL_EPSILON: f32 = 0.2;

/// Neighbour radius for separation outside Retreat.
pub const AVOIDANCE_RADIUS: f32 = 2.0;

/// Neighbour radius for separation while retreating.
pub const RETREAT_AVOIDANCE_RADIUS: f32 = 3.0;

/// Weight of the separation vector outside Retreat.
pub const AVOIDANCE_WEIGHT: f32 = 0.6;

/// Weight of the separation vector while retreating.
pub const RETREAT_AVOIDANCE_WEIGHT: f32 = 1.2;

/// Distance kept from the map edge.
pub const BOUNDARY_MARGIN: f32 = 1.0;

/// Look-ahead used when testing a step against the map edge.
pub const BOUNDARY_LOOKAHEAD: f32 = 1.5;

/// Largest sideways nudge when no candidate direction stays in bounds.
pub const MAX_LATERAL_NUDGE: f32 = 1.0;

/// Flow fields are regenerated at most this often (seconds).
pub const FLOW_FIELD_REFRESH_INTERVAL: f32 = 0.5;

/// Goal radius requested from the flow field provider.
pub const FLOW_FIELD_GOAL_RADIUS: f32 = 2.0;

// ============================================================================
// Retreat
// ============================================================================

/// Random spread around the rally point so agents do not stack.
pub const SAFE_POINT_SPREAD: f32 = 1.5;

/// Distance from the safe point inside which healing runs.
pub const SAFE_RADIUS: f32 = 1.0;

/// Opposing entities this close count as chasers.
pub const CHASE_RADIUS: f32 = 8.0;

/// Half-angle (radians) of the forward cone for counter-casts on chasers.
pub const CHASER_CAST_HALF_ANGLE: f32 = 0.5;

/// Half-angle (radians) of the forward cone for opportunistic attacks.
pub const OPPORTUNISTIC_HALF_ANGLE: f32 = 0.4;

/// Opportunistic attacks only fire at targets at least this far away.
pub const OPPORTUNISTIC_MIN_DISTANCE: f32 = 5.0;

// ============================================================================
// Idle watchdog
// ============================================================================

/// Displacement that counts as progress.
pub const IDLE_MOVE_THRESHOLD: f32 = 0.1;

/// Seconds without progress before a recovery fires.
pub const IDLE_TIMEOUT: f32 = 3.0;

/// Distance of a random-walk recovery step.
pub const RANDOM_WALK_DISTANCE: f32 = 3.0;

/// An agent this close to the map edge is "stuck on the boundary".
pub const NEAR_BOUNDARY_DISTANCE: f32 = 2.0;
