//! Target Selection
//!
//! Scans the live-entity registry for opposing units, scores them and
//! commits to one after a human-like recognition delay.
//!
//! ## Scoring
//! `50 + class bonus + distance term + health term + threat term + noise`
//! - Class bonus: heroes > casting casters > specialised minions > minions >
//!   castles, shifted by the enemy hero archetype seen first.
//! - Distance: `clamp(30 - 2d, -20, 30)`.
//! - Health: up to +30 for a target at 0% health.
//! - Noise: `±(1 - accuracy) * 30`, so easier tiers pick noisier targets.
//!
//! Targets are held as [`TargetRef`]s: identity plus a liveness check on
//! every use. A target is dropped when it dies or stays beyond the lose-track
//! range for longer than the lose-track timeout.

use bevy::prelude::*;
use smallvec::SmallVec;

use super::collaborators::{EntityId, EntityRegistry, EntitySnapshot, Faction, HeroArchetype, UnitClass};
use super::constants::{CASTLE_CRITICAL_HEALTH, LOSE_TRACK_RANGE, LOSE_TRACK_TIMEOUT};
use super::difficulty::AgentConfig;
use super::GameRng;

const BASE_SCORE: f32 = 50.0;
const MAX_HEALTH_BONUS: f32 = 30.0;
const MAX_NOISE: f32 = 30.0;

/// Weak reference to the committed target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetRef {
    pub id: EntityId,
    /// Time spent beyond [`LOSE_TRACK_RANGE`]
    out_of_range_time: f32,
}

impl TargetRef {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            out_of_range_time: 0.0,
        }
    }

    /// Resolve against the registry. `None` if the entity died or vanished.
    pub fn resolve<'a>(&self, registry: &'a dyn EntityRegistry) -> Option<&'a EntitySnapshot> {
        registry.get(self.id)
    }
}

/// One scored candidate, valid for a single decision pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetScore {
    pub id: EntityId,
    pub score: f32,
    pub distance: f32,
}

/// Situation-dependent inputs to [`score_target`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoringContext {
    /// First enemy hero archetype this agent has seen
    pub enemy_archetype: Option<HeroArchetype>,
    /// True if the candidate is a castle with no defenders around it
    pub castle_undefended: bool,
}

/// Class priority, adjusted by the remembered enemy archetype.
pub fn class_bonus(candidate: &EntitySnapshot, context: &ScoringContext) -> f32 {
    // (hero, casting caster, specialised minion)
    let (hero, caster, special) = match context.enemy_archetype {
        Some(HeroArchetype::Marksman) => (45.0, 25.0, 15.0),
        Some(HeroArchetype::Mage) => (40.0, 30.0, 15.0),
        Some(HeroArchetype::Bruiser) => (30.0, 25.0, 20.0),
        None => (40.0, 25.0, 15.0),
    };

    match candidate.class {
        UnitClass::Hero(_) => hero,
        UnitClass::CasterMinion if candidate.casting => caster,
        UnitClass::CasterMinion => caster - 10.0,
        UnitClass::SpecialMinion => special,
        UnitClass::Minion => 5.0,
        UnitClass::Castle => {
            if candidate.health_fraction() < CASTLE_CRITICAL_HEALTH {
                20.0
            } else if context.castle_undefended {
                10.0
            } else {
                -30.0
            }
        }
        UnitClass::Obstacle => f32::MIN,
    }
}

/// Extra weight for things that hurt back.
pub fn threat_bonus(candidate: &EntitySnapshot) -> f32 {
    match candidate.class {
        UnitClass::Hero(_) => 15.0,
        UnitClass::CasterMinion if candidate.casting => 8.0,
        UnitClass::SpecialMinion => 5.0,
        _ => 0.0,
    }
}

/// `clamp(30 - 2d, -20, 30)`
pub fn distance_term(distance: f32) -> f32 {
    (30.0 - 2.0 * distance).clamp(-20.0, 30.0)
}

/// Linear bonus for wounded targets, +30 at 0% health.
pub fn health_term(health_fraction: f32) -> f32 {
    MAX_HEALTH_BONUS * (1.0 - health_fraction.clamp(0.0, 1.0))
}

/// Full score for one candidate. `noise` is supplied by the caller so the
/// function stays deterministic.
pub fn score_target(
    candidate: &EntitySnapshot,
    distance: f32,
    context: &ScoringContext,
    noise: f32,
) -> f32 {
    BASE_SCORE
        + class_bonus(candidate, context)
        + distance_term(distance)
        + health_term(candidate.health_fraction())
        + threat_bonus(candidate)
        + noise
}

/// Result of a pending target commit firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(EntityId),
    /// The candidate died during the recognition delay
    Discarded(EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingTarget {
    id: EntityId,
    remaining: f32,
}

/// Finds, ranks and tracks the agent's target.
#[derive(Debug, Clone, Default)]
pub struct TargetSelector {
    enemy_archetype: Option<HeroArchetype>,
    current: Option<TargetRef>,
    pending: Option<PendingTarget>,
}

impl TargetSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<EntityId> {
        self.current.map(|t| t.id)
    }

    pub fn current_ref(&self) -> Option<&TargetRef> {
        self.current.as_ref()
    }

    pub fn enemy_archetype(&self) -> Option<HeroArchetype> {
        self.enemy_archetype
    }

    /// True while a found target is waiting out its recognition delay.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Forget the current target and any pending commit.
    pub fn clear(&mut self) {
        self.current = None;
        self.pending = None;
    }

    /// Forget everything, including the remembered archetype.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Any live opposing entity within the detection radius?
    pub fn has_attackable_target(
        &self,
        position: Vec2,
        faction: Faction,
        registry: &dyn EntityRegistry,
        config: &AgentConfig,
    ) -> bool {
        registry
            .all_live()
            .iter()
            .any(|e| is_attackable(e, position, faction, config.detection_radius))
    }

    /// Score every attackable candidate, best first.
    pub fn rank_candidates(
        &mut self,
        position: Vec2,
        faction: Faction,
        registry: &dyn EntityRegistry,
        config: &AgentConfig,
        rng: &mut GameRng,
    ) -> SmallVec<[TargetScore; 8]> {
        let radius = config.detection_radius;
        let live = registry.all_live();

        if self.enemy_archetype.is_none() {
            self.enemy_archetype = live.iter().find_map(|e| match e.class {
                UnitClass::Hero(archetype) if is_attackable(e, position, faction, radius) => {
                    Some(archetype)
                }
                _ => None,
            });
            if let Some(archetype) = self.enemy_archetype {
                debug!("{} hero agent spotted enemy {:?}", faction.name(), archetype);
            }
        }

        let noise_scale = (1.0 - config.targeting_accuracy) * MAX_NOISE;
        let mut ranked: SmallVec<[TargetScore; 8]> = live
            .iter()
            .filter(|e| is_attackable(e, position, faction, radius))
            .map(|candidate| {
                let distance = position.distance(candidate.position);
                let context = ScoringContext {
                    enemy_archetype: self.enemy_archetype,
                    castle_undefended: candidate.class.is_structure()
                        && castle_undefended(candidate, live, radius),
                };
                let noise = if noise_scale > 0.0 {
                    rng.random_range(-noise_scale, noise_scale)
                } else {
                    0.0
                };
                TargetScore {
                    id: candidate.id,
                    score: score_target(candidate, distance, &context, noise),
                    distance,
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }

    /// Pick a target: usually the best-ranked one, sometimes rank 2 or 3 so
    /// play is not perfectly optimal.
    pub fn find_best_target(
        &mut self,
        position: Vec2,
        faction: Faction,
        registry: &dyn EntityRegistry,
        config: &AgentConfig,
        rng: &mut GameRng,
    ) -> Option<EntityId> {
        let ranked = self.rank_candidates(position, faction, registry, config, rng);
        let best = ranked.first()?;

        if ranked.len() > 1 && rng.chance(config.suboptimal_pick_chance) {
            let upper = ranked.len().min(3);
            let pick = 1 + rng.random_index(upper - 1);
            return ranked.get(pick).map(|t| t.id);
        }

        Some(best.id)
    }

    /// Commit `id` after `reaction_time * U(0.8, 1.2)`.
    pub fn schedule_commit(&mut self, id: EntityId, reaction_time: f32, rng: &mut GameRng) {
        let delay = reaction_time * rng.random_range(0.8, 1.2);
        self.pending = Some(PendingTarget { id, remaining: delay });
    }

    /// Count down the pending commit; fires at most once.
    pub fn tick_pending(&mut self, dt: f32, registry: &dyn EntityRegistry) -> Option<CommitOutcome> {
        let pending = self.pending.as_mut()?;
        pending.remaining -= dt;
        if pending.remaining > 0.0 {
            return None;
        }

        let id = pending.id;
        self.pending = None;
        if registry.get(id).is_some() {
            self.current = Some(TargetRef::new(id));
            Some(CommitOutcome::Committed(id))
        } else {
            Some(CommitOutcome::Discarded(id))
        }
    }

    /// Per-tick liveness and lose-track bookkeeping. Returns the id of a
    /// target that was just dropped.
    pub fn track(&mut self, position: Vec2, registry: &dyn EntityRegistry, dt: f32) -> Option<EntityId> {
        let target = self.current.as_mut()?;
        let Some(snapshot) = registry.get(target.id) else {
            let id = target.id;
            self.current = None;
            return Some(id);
        };

        if position.distance(snapshot.position) > LOSE_TRACK_RANGE {
            target.out_of_range_time += dt;
            if target.out_of_range_time > LOSE_TRACK_TIMEOUT {
                let id = target.id;
                self.current = None;
                return Some(id);
            }
        } else {
            target.out_of_range_time = 0.0;
        }
        None
    }

    /// Resolve the current target, clearing it if it is no longer alive.
    pub fn resolve<'a>(&mut self, registry: &'a dyn EntityRegistry) -> Option<&'a EntitySnapshot> {
        let target = self.current?;
        let resolved = target.resolve(registry);
        if resolved.is_none() {
            self.current = None;
        }
        resolved
    }
}

fn is_attackable(entity: &EntitySnapshot, position: Vec2, faction: Faction, radius: f32) -> bool {
    entity.is_alive()
        && faction.is_hostile_to(entity.faction)
        && entity.class != UnitClass::Obstacle
        && position.distance(entity.position) <= radius
}

fn castle_undefended(castle: &EntitySnapshot, live: &[EntitySnapshot], radius: f32) -> bool {
    !live.iter().any(|e| {
        e.id != castle.id
            && e.faction == castle.faction
            && e.is_alive()
            && !e.class.is_structure()
            && e.position.distance(castle.position) <= radius
    })
}
