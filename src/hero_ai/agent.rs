//! Hero Agent State Machine
//!
//! Drives one hero through Advance, Engage, Retreat and Dead.
//!
//! ## Tick order
//! 1. Death check (always first)
//! 2. Timers: cast, target commit, lose-track, heal loop, flow refresh,
//!    position cooldown
//! 3. Inactive or stunned: stop and return
//! 4. Throttled decision pass (every `reaction_time` seconds): transitions,
//!    then the state's behaviour
//! 5. Casting lock or steering toward the current destination
//! 6. Idle watchdog
//!
//! ## Transitions
//! | From    | Condition                              | To      |
//! |---------|----------------------------------------|---------|
//! | Advance | target committed                       | Engage  |
//! | Engage  | no target and nothing attackable       | Advance |
//! | Engage  | health < retreat threshold             | Retreat |
//! | Retreat | health >= safe threshold, target known | Engage  |
//! | Retreat | health >= safe threshold, no target    | Advance |
//! | any     | health <= 0                            | Dead    |
//!
//! Dead is only left through [`HeroAgent::respawn`].

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::collaborators::{
    AbilitySystem, AnimationParam, AnimationSink, AnimationTrigger, AreaShape, EntityId, EntityRegistry,
    EntitySnapshot, Faction, HeroArchetype, MapBounds, SpatialQuery, TickContext, UnitClass,
};
use super::constants::{
    APPROACH_SLACK, BLOCKED_SIGHT_RANGE, CHASER_CAST_HALF_ANGLE, LOS_CORRIDOR_HALF_HEIGHT,
    MAX_POSITION_ATTEMPTS, MELEE_BAND, OPPORTUNISTIC_HALF_ANGLE, OPPORTUNISTIC_MIN_DISTANCE,
    RANDOM_WALK_DISTANCE,
};
use super::difficulty::{AgentConfig, DifficultyTier, SkillTable, TuningFile, CONTROL_SKILL};
use super::error::AgentError;
use super::movement::{facing_for, resolve_destination, MoveRequest, MovementPlanner};
use super::retreat::{chase_pressure, in_forward_cone, nearest_chaser_in_cone, RetreatController};
use super::skills::{alignment_tolerance, CombatAction, CombatDecisionEngine};
use super::targeting::{CommitOutcome, TargetSelector};
use super::watchdog::{choose_recovery, IdleWatchdog, RecoveryAction, RecoveryContext};
use super::GameRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvancePhase {
    /// Requesting a route toward the enemy objective
    Pathfinding,
    MoveForward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngagePhase {
    /// Closing distance to the target
    Approach,
    /// Looking for a spot with range and line of sight
    Positioning,
    Attack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetreatPhase {
    FindSafePosition,
    /// Standing at the safe point, self-healing
    Healing,
}

/// Current state together with its substate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    Advance(AdvancePhase),
    Engage(EngagePhase),
    Retreat(RetreatPhase),
    Dead,
}

impl AgentState {
    pub fn kind(self) -> AgentStateKind {
        match self {
            AgentState::Advance(_) => AgentStateKind::Advance,
            AgentState::Engage(_) => AgentStateKind::Engage,
            AgentState::Retreat(_) => AgentStateKind::Retreat,
            AgentState::Dead => AgentStateKind::Dead,
        }
    }
}

impl Default for AgentState {
    fn default() -> Self {
        AgentState::Advance(AdvancePhase::Pathfinding)
    }
}

/// Top-level state without its substate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentStateKind {
    Advance,
    Engage,
    Retreat,
    Dead,
}

impl AgentStateKind {
    pub fn all() -> &'static [AgentStateKind] {
        &[
            AgentStateKind::Advance,
            AgentStateKind::Engage,
            AgentStateKind::Retreat,
            AgentStateKind::Dead,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            AgentStateKind::Advance => "Advance",
            AgentStateKind::Engage => "Engage",
            AgentStateKind::Retreat => "Retreat",
            AgentStateKind::Dead => "Dead",
        }
    }
}

/// The simulated body the agent steers. The owner integrates
/// `position += velocity * dt` after each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeroBody {
    pub id: EntityId,
    pub faction: Faction,
    pub archetype: HeroArchetype,
    pub position: Vec2,
    pub velocity: Vec2,
    /// +1.0 facing east, -1.0 facing west
    pub facing: f32,
    pub health: f32,
    pub max_health: f32,
    pub stunned: bool,
    pub move_speed: f32,
}

impl HeroBody {
    pub fn new(
        id: EntityId,
        faction: Faction,
        archetype: HeroArchetype,
        position: Vec2,
        max_health: f32,
        move_speed: f32,
    ) -> Self {
        Self {
            id,
            faction,
            archetype,
            position,
            velocity: Vec2::ZERO,
            facing: if faction == Faction::East { -1.0 } else { 1.0 },
            health: max_health,
            max_health,
            stunned: false,
            move_speed,
        }
    }

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

/// Fixed map locations the agent navigates between.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Objectives {
    /// Rally point the safe position is drawn around
    pub home_rally: Vec2,
    pub home_castle: Vec2,
    pub enemy_castle: Vec2,
}

/// Per-hero capabilities handed to [`HeroAgent::new`].
///
/// `body` and `abilities` are required; leaving either out makes
/// construction fail with [`AgentError::MissingCollaborator`].
pub struct AgentParts<A, N> {
    pub body: Option<HeroBody>,
    pub abilities: Option<A>,
    pub animation: N,
    pub objectives: Objectives,
}

/// Notifications for UI, logging and respawn coordination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AgentEvent {
    StateChanged { from: AgentStateKind, to: AgentStateKind },
    HealthChanged { health: f32, max_health: f32 },
    TargetAcquired(EntityId),
    TargetLost(EntityId),
    CastStarted { ability: usize, target: Option<EntityId> },
    AbilityActivated { ability: usize },
    /// Cast interrupted by stun or death before it fired
    CastAborted { ability: usize },
    Recovery(RecoveryAction),
    Died,
    Respawned,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingCast {
    ability: usize,
    remaining: f32,
}

/// Autonomous controller for one hero.
pub struct HeroAgent<A: AbilitySystem, N: AnimationSink> {
    body: HeroBody,
    abilities: A,
    animation: N,
    objectives: Objectives,
    config: AgentConfig,
    state: AgentState,
    active: bool,
    targeting: TargetSelector,
    combat: CombatDecisionEngine,
    movement: MovementPlanner,
    retreat: RetreatController,
    watchdog: IdleWatchdog,
    rng: GameRng,
    decision_timer: f32,
    pending_cast: Option<PendingCast>,
    /// Where steering heads between decision passes
    destination: Option<Vec2>,
    position_attempts: u32,
    events: Vec<AgentEvent>,
}

impl<A: AbilitySystem, N: AnimationSink> HeroAgent<A, N> {
    pub fn new(
        parts: AgentParts<A, N>,
        config: AgentConfig,
        skills: SkillTable,
        rng: GameRng,
    ) -> Result<Self, AgentError> {
        let body = parts.body.ok_or(AgentError::MissingCollaborator("movement body"))?;
        let abilities = parts
            .abilities
            .ok_or(AgentError::MissingCollaborator("ability system"))?;

        Ok(Self {
            body,
            abilities,
            animation: parts.animation,
            objectives: parts.objectives,
            config,
            state: AgentState::default(),
            active: true,
            targeting: TargetSelector::new(),
            combat: CombatDecisionEngine::new(skills),
            movement: MovementPlanner::new(),
            retreat: RetreatController::new(),
            watchdog: IdleWatchdog::new(),
            rng,
            decision_timer: 0.0,
            pending_cast: None,
            destination: None,
            position_attempts: 0,
            events: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn body(&self) -> &HeroBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut HeroBody {
        &mut self.body
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn objectives(&self) -> &Objectives {
        &self.objectives
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_casting(&self) -> bool {
        self.pending_cast.is_some()
    }

    pub fn current_target(&self) -> Option<EntityId> {
        self.targeting.current()
    }

    pub fn enemy_archetype(&self) -> Option<HeroArchetype> {
        self.targeting.enemy_archetype()
    }

    pub fn safe_point(&self) -> Option<Vec2> {
        self.retreat.safe_point()
    }

    pub fn destination(&self) -> Option<Vec2> {
        self.destination
    }

    pub fn abilities(&self) -> &A {
        &self.abilities
    }

    pub fn abilities_mut(&mut self) -> &mut A {
        &mut self.abilities
    }

    pub fn animation(&self) -> &N {
        &self.animation
    }

    /// Take every notification queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<AgentEvent> {
        std::mem::take(&mut self.events)
    }

    /// True if any opposing entity is within detection range right now.
    pub fn has_attackable_target(&self, registry: &dyn EntityRegistry) -> bool {
        self.targeting
            .has_attackable_target(self.body.position, self.body.faction, registry, &self.config)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn set_active(&mut self, active: bool) {
        if !active {
            self.body.velocity = Vec2::ZERO;
            self.abort_cast();
        }
        self.active = active;
    }

    /// Re-derive every tuning value for `tier` from the built-in tables.
    /// State is kept. Use [`Self::set_difficulty_from`] to honour a tuning file.
    pub fn set_difficulty(&mut self, tier: DifficultyTier) {
        self.set_config(AgentConfig::for_tier(tier));
    }

    /// Like [`Self::set_difficulty`], preferring `tuning`'s override for `tier`.
    pub fn set_difficulty_from(&mut self, tier: DifficultyTier, tuning: &TuningFile) -> Result<(), AgentError> {
        let config = tuning.config_for(tier)?;
        self.set_config(config);
        Ok(())
    }

    /// Swap in an explicit configuration (e.g. loaded from a tuning file).
    pub fn set_config(&mut self, config: AgentConfig) {
        debug!(
            "{} hero difficulty {} -> {}",
            self.body.faction.name(),
            self.config.tier.name(),
            config.tier.name()
        );
        self.config = config;
    }

    /// Reset tuning for `tier` and all internal state back to Advance.
    pub fn initialize(&mut self, tier: DifficultyTier) {
        self.config = AgentConfig::for_tier(tier);
        self.reset_internal();
    }

    /// Bring a dead (or any) hero back at `position` with full health.
    pub fn respawn(&mut self, position: Vec2) {
        self.body.position = position;
        self.body.velocity = Vec2::ZERO;
        self.body.health = self.body.max_health;
        self.body.stunned = false;
        self.reset_internal();
        self.animation.trigger(AnimationTrigger::Respawn);
        self.events.push(AgentEvent::Respawned);
        self.push_health_changed();
        info!(
            "{} hero respawned at ({:.1}, {:.1})",
            self.body.faction.name(),
            position.x,
            position.y
        );
    }

    /// Returns the damage actually taken. Death is processed on the next tick.
    pub fn apply_damage(&mut self, amount: f32) -> f32 {
        if self.state == AgentState::Dead || amount <= 0.0 {
            return 0.0;
        }
        let before = self.body.health;
        self.body.health = (self.body.health - amount).max(0.0);
        self.push_health_changed();
        before - self.body.health
    }

    /// Returns the health actually restored, clamped at max health.
    pub fn heal(&mut self, amount: f32) -> f32 {
        if self.state == AgentState::Dead || !self.body.is_alive() || amount <= 0.0 {
            return 0.0;
        }
        let before = self.body.health;
        self.body.health = (self.body.health + amount).min(self.body.max_health);
        if self.body.health != before {
            self.push_health_changed();
        }
        self.body.health - before
    }

    pub fn set_stunned(&mut self, stunned: bool) {
        self.body.stunned = stunned;
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the agent by one simulation step.
    pub fn tick(&mut self, dt: f32, ctx: &mut TickContext) {
        if self.state == AgentState::Dead {
            return;
        }
        if self.body.health <= 0.0 {
            self.die(ctx);
            return;
        }

        self.advance_timers(dt, ctx.registry);

        if !self.active || self.body.stunned {
            // Time spent disabled is not idling.
            self.watchdog.reset();
            self.body.velocity = Vec2::ZERO;
            self.publish_animation();
            return;
        }

        self.decision_timer += dt;
        if self.decision_timer >= self.config.reaction_time {
            self.decision_timer = 0.0;
            self.decide(ctx);
        }

        if self.is_casting() {
            self.body.velocity = Vec2::ZERO;
        } else {
            self.steer(ctx);
        }

        let healing = self.state == AgentState::Retreat(RetreatPhase::Healing);
        if self
            .watchdog
            .observe(dt, self.body.position, self.is_casting(), healing)
        {
            self.recover(ctx);
        }

        self.publish_animation();
    }

    fn advance_timers(&mut self, dt: f32, registry: &dyn EntityRegistry) {
        if let Some(cast) = self.pending_cast.as_mut() {
            cast.remaining -= dt;
            if cast.remaining <= 0.0 {
                let ability = cast.ability;
                self.pending_cast = None;
                self.fire_cast(ability);
            }
        }

        match self.targeting.tick_pending(dt, registry) {
            Some(CommitOutcome::Committed(id)) => {
                debug!("{} hero locked onto {:?}", self.body.faction.name(), id);
                self.events.push(AgentEvent::TargetAcquired(id));
            }
            Some(CommitOutcome::Discarded(id)) => {
                debug!("{} hero dropped pending target {:?}", self.body.faction.name(), id);
            }
            None => {}
        }

        if let Some(lost) = self.targeting.track(self.body.position, registry, dt) {
            debug!("{} hero lost track of {:?}", self.body.faction.name(), lost);
            self.events.push(AgentEvent::TargetLost(lost));
            // Re-search on this tick's decision pass.
            self.decision_timer = self.config.reaction_time;
        }

        if self.state == AgentState::Retreat(RetreatPhase::Healing) {
            let restored = self.retreat.tick_heal(dt, self.body.position, &self.config);
            if restored > 0.0 {
                self.heal(restored);
            }
        }

        self.movement.tick(dt);
        self.combat.tick(dt);
    }

    fn decide(&mut self, ctx: &TickContext) {
        let target = self.targeting.resolve(ctx.registry).copied();
        let fraction = self.body.health_fraction();
        let attackable = self.has_attackable_target(ctx.registry);

        match self.state.kind() {
            AgentStateKind::Advance => {
                if target.is_some() {
                    self.transition(AgentStateKind::Engage, target.as_ref());
                }
            }
            AgentStateKind::Engage => {
                if fraction < self.config.retreat_threshold {
                    self.transition(AgentStateKind::Retreat, target.as_ref());
                } else if target.is_none() && !attackable && !self.targeting.is_pending() {
                    self.transition(AgentStateKind::Advance, None);
                }
            }
            AgentStateKind::Retreat => {
                if fraction >= self.config.safe_threshold {
                    let next = if target.is_some() || attackable {
                        AgentStateKind::Engage
                    } else {
                        AgentStateKind::Advance
                    };
                    self.transition(next, target.as_ref());
                }
            }
            AgentStateKind::Dead => return,
        }

        match self.state {
            AgentState::Advance(phase) => self.run_advance(phase, attackable, ctx),
            AgentState::Engage(phase) => self.run_engage(phase, target, ctx),
            AgentState::Retreat(phase) => self.run_retreat(phase, target, ctx),
            AgentState::Dead => {}
        }
    }

    // ------------------------------------------------------------------
    // State behaviour
    // ------------------------------------------------------------------

    fn run_advance(&mut self, phase: AdvancePhase, attackable: bool, ctx: &TickContext) {
        if attackable && self.targeting.current().is_none() && !self.targeting.is_pending() {
            self.search_target(ctx.registry);
        }

        self.destination = Some(resolve_destination(
            self.body.position,
            self.objectives.enemy_castle,
            ctx.bounds,
        ));
        if phase == AdvancePhase::Pathfinding {
            self.state = AgentState::Advance(AdvancePhase::MoveForward);
        }
    }

    fn run_engage(&mut self, phase: EngagePhase, target: Option<EntitySnapshot>, ctx: &TickContext) {
        let Some(target) = target else {
            if !self.targeting.is_pending() {
                self.search_target(ctx.registry);
            }
            self.destination = None;
            return;
        };
        if self.is_casting() {
            return;
        }

        let me = self.body.position;
        let horizontal = (target.position.x - me.x).abs();
        let vertical = (target.position.y - me.y).abs();
        let ideal = self.config.ideal_range;
        let line_of_sight = self.line_of_sight(ctx.spatial, &target);
        let mut phase = phase;

        if phase == EngagePhase::Approach {
            if horizontal <= ideal + APPROACH_SLACK && vertical <= alignment_tolerance(horizontal) {
                self.position_attempts = 0;
                phase = EngagePhase::Positioning;
            } else {
                self.destination = Some(self.approach_point(&target, ideal, ctx.bounds));
            }
        }

        if phase == EngagePhase::Positioning {
            if horizontal > ideal + 2.0 * APPROACH_SLACK {
                phase = EngagePhase::Approach;
                self.destination = Some(self.approach_point(&target, ideal, ctx.bounds));
            } else if horizontal < MELEE_BAND
                || self
                    .combat
                    .engagement_acceptable(horizontal, vertical, ideal, line_of_sight)
            {
                phase = EngagePhase::Attack;
            } else if self.position_attempts >= MAX_POSITION_ATTEMPTS {
                debug!(
                    "{} hero found no better spot after {} attempts, attacking anyway",
                    self.body.faction.name(),
                    self.position_attempts
                );
                phase = EngagePhase::Attack;
            } else if self.combat.can_reposition() {
                self.position_attempts += 1;
                self.combat.mark_repositioned();
                let range = if line_of_sight { ideal } else { BLOCKED_SIGHT_RANGE };
                self.destination = Some(self.approach_point(&target, range, ctx.bounds));
            }
        }

        if phase == EngagePhase::Attack {
            match self
                .combat
                .decide(&self.abilities, me, target.position, ideal, line_of_sight)
            {
                CombatAction::Cast(decision) => {
                    self.destination = None;
                    self.start_cast(decision.ability, &target);
                }
                CombatAction::BackOff(point) => {
                    self.destination = Some(resolve_destination(me, point, ctx.bounds));
                }
                CombatAction::Reposition => {
                    self.position_attempts = 0;
                    phase = EngagePhase::Positioning;
                }
                CombatAction::Hold => {
                    self.destination = None;
                    if horizontal > ideal + APPROACH_SLACK {
                        phase = EngagePhase::Approach;
                    }
                }
            }
        }

        self.state = AgentState::Engage(phase);
    }

    fn run_retreat(&mut self, phase: RetreatPhase, target: Option<EntitySnapshot>, ctx: &TickContext) {
        if self.is_casting() {
            return;
        }

        let me = self.body.position;
        let safe_point = match self.retreat.safe_point() {
            Some(point) => point,
            None => self
                .retreat
                .find_safe_position(self.objectives.home_rally, ctx.bounds, &mut self.rng),
        };

        let next = if self.retreat.at_safe_point(me) {
            self.destination = None;
            RetreatPhase::Healing
        } else {
            self.destination = Some(safe_point);
            RetreatPhase::FindSafePosition
        };
        if next != phase {
            debug!("{} hero retreat: {:?} -> {:?}", self.body.faction.name(), phase, next);
        }
        self.state = AgentState::Retreat(next);

        // Fight back at whoever is chasing, without leaving the retreat.
        let faction = self.body.faction;
        if chase_pressure(me, faction, ctx.registry) >= 1 && self.abilities.is_ready(CONTROL_SKILL) {
            let chaser = nearest_chaser_in_cone(
                me,
                self.body.facing,
                CHASER_CAST_HALF_ANGLE,
                faction,
                ctx.registry,
            )
            .copied();
            if let Some(chaser) = chaser {
                debug!("{} hero counter-casting at chaser {:?}", faction.name(), chaser.id);
                self.start_cast(CONTROL_SKILL, &chaser);
                return;
            }
        }

        let Some(target) = target else {
            return;
        };
        if me.distance(target.position) < OPPORTUNISTIC_MIN_DISTANCE
            || !in_forward_cone(me, self.body.facing, target.position, OPPORTUNISTIC_HALF_ANGLE)
        {
            return;
        }
        let values = self.combat.evaluate_all_skills(
            &self.abilities,
            (target.position.x - me.x).abs(),
            (target.position.y - me.y).abs(),
        );
        if let Some(decision) = CombatDecisionEngine::best_skill(&values) {
            self.start_cast(decision.ability, &target);
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn transition(&mut self, to: AgentStateKind, target: Option<&EntitySnapshot>) {
        let from = self.state.kind();
        if from == to {
            return;
        }

        match from {
            AgentStateKind::Engage => self.position_attempts = 0,
            AgentStateKind::Retreat => self.retreat.clear_safe_point(),
            _ => {}
        }
        self.destination = None;

        let next = match to {
            AgentStateKind::Advance => AgentState::Advance(AdvancePhase::Pathfinding),
            AgentStateKind::Engage => AgentState::Engage(self.enter_engage(target)),
            AgentStateKind::Retreat => {
                self.retreat.clear_safe_point();
                AgentState::Retreat(RetreatPhase::FindSafePosition)
            }
            AgentStateKind::Dead => AgentState::Dead,
        };
        self.set_state(next);
    }

    /// Classify range to the target and snap facing toward it.
    fn enter_engage(&mut self, target: Option<&EntitySnapshot>) -> EngagePhase {
        let Some(target) = target else {
            return EngagePhase::Approach;
        };
        let dx = target.position.x - self.body.position.x;
        if dx.abs() > 1e-3 {
            self.body.facing = dx.signum();
        }
        if dx.abs() > self.config.ideal_range + APPROACH_SLACK {
            EngagePhase::Approach
        } else {
            EngagePhase::Positioning
        }
    }

    fn set_state(&mut self, next: AgentState) {
        let from = self.state.kind();
        self.state = next;
        if from != next.kind() {
            debug!(
                "{} hero: {} -> {}",
                self.body.faction.name(),
                from.name(),
                next.kind().name()
            );
            self.events.push(AgentEvent::StateChanged {
                from,
                to: next.kind(),
            });
        }
    }

    fn reset_internal(&mut self) {
        self.targeting.reset();
        self.combat.reset();
        self.movement.reset();
        self.retreat.reset();
        self.watchdog.reset();
        self.decision_timer = 0.0;
        self.pending_cast = None;
        self.destination = None;
        self.position_attempts = 0;
        self.body.velocity = Vec2::ZERO;
        self.set_state(AgentState::default());
    }

    fn die(&mut self, ctx: &mut TickContext) {
        self.body.health = 0.0;
        self.body.velocity = Vec2::ZERO;
        self.abort_cast();
        self.destination = None;
        self.targeting.clear();
        self.set_state(AgentState::Dead);

        self.animation.trigger(AnimationTrigger::Death);
        self.animation.set_continuous(AnimationParam::MoveSpeed, 0.0);
        ctx.respawn.schedule(self.config.respawn_delay, self.config.tier);
        self.events.push(AgentEvent::Died);
        info!(
            "{} hero died; respawn in {:.1}s",
            self.body.faction.name(),
            self.config.respawn_delay
        );
    }

    // ------------------------------------------------------------------
    // Casting
    // ------------------------------------------------------------------

    fn start_cast(&mut self, ability: usize, target: &EntitySnapshot) {
        let dx = target.position.x - self.body.position.x;
        if dx.abs() > 1e-3 {
            self.body.facing = dx.signum();
        }
        self.body.velocity = Vec2::ZERO;
        self.animation.trigger(AnimationTrigger::Cast(ability));
        self.events.push(AgentEvent::CastStarted {
            ability,
            target: Some(target.id),
        });

        let cast_time = self.abilities.cast_time(ability);
        if cast_time <= 0.0 {
            self.fire_cast(ability);
        } else {
            self.pending_cast = Some(PendingCast {
                ability,
                remaining: cast_time,
            });
        }
    }

    /// Activation after the cast delay. The target is not re-checked; only a
    /// stun or death cancels it.
    fn fire_cast(&mut self, ability: usize) {
        if self.body.stunned || self.body.health <= 0.0 {
            debug!("{} hero cast {} aborted", self.body.faction.name(), ability);
            self.events.push(AgentEvent::CastAborted { ability });
            return;
        }
        self.abilities.activate(ability);
        self.events.push(AgentEvent::AbilityActivated { ability });
    }

    fn abort_cast(&mut self) {
        if let Some(cast) = self.pending_cast.take() {
            self.events.push(AgentEvent::CastAborted {
                ability: cast.ability,
            });
        }
    }

    // ------------------------------------------------------------------
    // Movement helpers
    // ------------------------------------------------------------------

    fn steer(&mut self, ctx: &TickContext) {
        let velocity = match self.destination {
            Some(destination) => {
                let request = MoveRequest {
                    self_id: self.body.id,
                    position: self.body.position,
                    destination,
                    move_speed: self.body.move_speed,
                    retreating: self.state.kind() == AgentStateKind::Retreat,
                };
                let outcome =
                    self.movement
                        .move_toward(&request, ctx.flow, ctx.spatial, ctx.bounds, &mut self.rng);
                if outcome.arrived {
                    self.destination = None;
                }
                outcome.velocity
            }
            None => Vec2::ZERO,
        };

        self.body.velocity = velocity;
        let target_position = self
            .targeting
            .current_ref()
            .and_then(|t| t.resolve(ctx.registry))
            .map(|t| t.position);
        self.body.facing = facing_for(self.body.position, target_position, velocity, self.body.facing);
    }

    /// Spot `range` short of the target on our side of it, level with it.
    fn approach_point(&self, target: &EntitySnapshot, range: f32, bounds: &dyn MapBounds) -> Vec2 {
        let me = self.body.position;
        let dx = target.position.x - me.x;
        let side = if dx.abs() > 1e-3 { dx.signum() } else { self.body.facing };
        let point = Vec2::new(target.position.x - side * range, target.position.y);
        resolve_destination(me, point, bounds)
    }

    /// Clear if no obstacle overlaps the corridor between us and the target.
    fn line_of_sight(&self, spatial: &dyn SpatialQuery, target: &EntitySnapshot) -> bool {
        let me = self.body.position;
        let centre = (me + target.position) * 0.5;
        let half_extents = Vec2::new(
            (target.position.x - me.x).abs() * 0.5,
            (target.position.y - me.y).abs() * 0.5 + LOS_CORRIDOR_HALF_HEIGHT,
        );
        !spatial
            .overlap_area(centre, AreaShape::Rect { half_extents })
            .iter()
            .any(|e| e.class == UnitClass::Obstacle)
    }

    fn search_target(&mut self, registry: &dyn EntityRegistry) -> bool {
        let found = self.targeting.find_best_target(
            self.body.position,
            self.body.faction,
            registry,
            &self.config,
            &mut self.rng,
        );
        match found {
            Some(id) => {
                self.targeting
                    .schedule_commit(id, self.config.reaction_time, &mut self.rng);
                true
            }
            None => false,
        }
    }

    fn recover(&mut self, ctx: &TickContext) {
        let position = self.body.position;
        let context = RecoveryContext {
            position,
            target_available: self.has_attackable_target(ctx.registry),
            enemy_objective: self.objectives.enemy_castle,
            home_objective: Some(self.objectives.home_castle),
            bounds: ctx.bounds,
        };
        let Some(action) = choose_recovery(self.state.kind(), &context, &mut self.rng) else {
            return;
        };

        info!(
            "{} hero idle in {}, recovering: {:?}",
            self.body.faction.name(),
            self.state.kind().name(),
            action
        );
        match action {
            RecoveryAction::ResearchTarget => {
                if let Some(id) = self.targeting.current() {
                    self.events.push(AgentEvent::TargetLost(id));
                }
                self.targeting.clear();
                self.search_target(ctx.registry);
            }
            RecoveryAction::MarchTo(point) => {
                self.destination = Some(resolve_destination(position, point, ctx.bounds));
            }
            RecoveryAction::Nudge(direction) => {
                self.destination = Some(resolve_destination(
                    position,
                    position + direction * RANDOM_WALK_DISTANCE,
                    ctx.bounds,
                ));
            }
            RecoveryAction::RandomWalk(point) => self.destination = Some(point),
        }
        self.events.push(AgentEvent::Recovery(action));

        if !self.is_casting() {
            self.steer(ctx);
        }
    }

    fn publish_animation(&mut self) {
        self.animation
            .set_continuous(AnimationParam::MoveSpeed, self.body.velocity.length());
        self.animation
            .set_continuous(AnimationParam::Facing, self.body.facing);
    }

    fn push_health_changed(&mut self) {
        self.events.push(AgentEvent::HealthChanged {
            health: self.body.health,
            max_health: self.body.max_health,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hero_ai::collaborators::{FlowField, FlowFieldProvider, RespawnScheduler};
    use std::sync::Arc;

    #[derive(Default)]
    struct World {
        entities: Vec<EntitySnapshot>,
    }

    impl EntityRegistry for World {
        fn all_live(&self) -> &[EntitySnapshot] {
            &self.entities
        }
    }

    impl SpatialQuery for World {
        fn overlap_area(&self, point: Vec2, shape: AreaShape) -> Vec<EntitySnapshot> {
            self.entities
                .iter()
                .filter(|e| shape.overlaps(point, e.position, e.radius))
                .copied()
                .collect()
        }
    }

    struct NoFlow;

    impl FlowFieldProvider for NoFlow {
        fn generate(&self, _target: Vec2, _radius: f32) -> Option<Arc<dyn FlowField>> {
            None
        }
    }

    struct Arena;

    impl MapBounds for Arena {
        fn contains(&self, point: Vec2) -> bool {
            point.x.abs() <= 40.0 && point.y.abs() <= 12.0
        }
    }

    #[derive(Default)]
    struct Respawns(Vec<(f32, DifficultyTier)>);

    impl RespawnScheduler for Respawns {
        fn schedule(&mut self, delay: f32, tier: DifficultyTier) {
            self.0.push((delay, tier));
        }
    }

    #[derive(Default)]
    struct Loadout {
        activated: Vec<usize>,
    }

    impl AbilitySystem for Loadout {
        fn ability_count(&self) -> usize {
            5
        }
        fn is_ready(&self, _index: usize) -> bool {
            true
        }
        fn activate(&mut self, index: usize) {
            self.activated.push(index);
        }
        fn cast_time(&self, _index: usize) -> f32 {
            0.5
        }
    }

    #[derive(Default)]
    struct Animations(Vec<AnimationTrigger>);

    impl AnimationSink for Animations {
        fn trigger(&mut self, trigger: AnimationTrigger) {
            self.0.push(trigger);
        }
        fn set_continuous(&mut self, _param: AnimationParam, _value: f32) {}
    }

    fn objectives() -> Objectives {
        Objectives {
            home_rally: Vec2::new(-30.0, 0.0),
            home_castle: Vec2::new(-36.0, 0.0),
            enemy_castle: Vec2::new(36.0, 0.0),
        }
    }

    fn agent(position: Vec2) -> HeroAgent<Loadout, Animations> {
        let parts = AgentParts {
            body: Some(HeroBody::new(
                EntityId(1),
                Faction::West,
                HeroArchetype::Bruiser,
                position,
                100.0,
                4.0,
            )),
            abilities: Some(Loadout::default()),
            animation: Animations::default(),
            objectives: objectives(),
        };
        HeroAgent::new(
            parts,
            AgentConfig::for_tier(DifficultyTier::Normal),
            SkillTable::default(),
            GameRng::from_seed(3),
        )
        .expect("agent")
    }

    fn run(agent: &mut HeroAgent<Loadout, Animations>, world: &World, respawns: &mut Respawns, dt: f32) {
        let mut ctx = TickContext {
            registry: world,
            spatial: world,
            flow: &NoFlow,
            bounds: &Arena,
            respawn: respawns,
        };
        agent.tick(dt, &mut ctx);
        let velocity = agent.body().velocity;
        agent.body_mut().position += velocity * dt;
    }

    #[test]
    fn test_missing_collaborators_are_rejected() {
        let parts: AgentParts<Loadout, Animations> = AgentParts {
            body: None,
            abilities: Some(Loadout::default()),
            animation: Animations::default(),
            objectives: objectives(),
        };
        let result = HeroAgent::new(
            parts,
            AgentConfig::default(),
            SkillTable::default(),
            GameRng::from_seed(1),
        );
        assert!(matches!(result, Err(AgentError::MissingCollaborator("movement body"))));
    }

    #[test]
    fn test_starts_in_advance_and_marches() {
        let mut agent = agent(Vec2::new(-20.0, 0.0));
        let world = World::default();
        let mut respawns = Respawns::default();
        for _ in 0..20 {
            run(&mut agent, &world, &mut respawns, 0.1);
        }
        assert_eq!(agent.state(), AgentState::Advance(AdvancePhase::MoveForward));
        assert!(agent.body().position.x > -20.0);
    }

    #[test]
    fn test_death_schedules_respawn_once() {
        let mut agent = agent(Vec2::ZERO);
        let world = World::default();
        let mut respawns = Respawns::default();
        agent.apply_damage(500.0);
        run(&mut agent, &world, &mut respawns, 0.1);
        run(&mut agent, &world, &mut respawns, 0.1);

        assert_eq!(agent.state(), AgentState::Dead);
        assert_eq!(respawns.0, vec![(5.0, DifficultyTier::Normal)]);
        assert!(agent.animation().0.contains(&AnimationTrigger::Death));
        assert!(agent.drain_events().contains(&AgentEvent::Died));
    }

    #[test]
    fn test_respawn_resets_to_advance() {
        let mut agent = agent(Vec2::ZERO);
        let world = World::default();
        let mut respawns = Respawns::default();
        agent.apply_damage(500.0);
        run(&mut agent, &world, &mut respawns, 0.1);
        agent.respawn(Vec2::new(-30.0, 0.0));

        assert_eq!(agent.state(), AgentState::Advance(AdvancePhase::Pathfinding));
        assert_eq!(agent.body().health, 100.0);
        assert!(agent.drain_events().contains(&AgentEvent::Respawned));
    }

    #[test]
    fn test_heal_clamps_at_max() {
        let mut agent = agent(Vec2::ZERO);
        agent.apply_damage(3.0);
        assert_eq!(agent.heal(10.0), 3.0);
        assert_eq!(agent.body().health, 100.0);
    }

    #[test]
    fn test_stun_aborts_pending_cast() {
        let mut agent = agent(Vec2::ZERO);
        let mut world = World::default();
        world.entities.push(EntitySnapshot {
            id: EntityId(9),
            faction: Faction::East,
            class: UnitClass::Minion,
            position: Vec2::new(2.0, 0.0),
            health: 30.0,
            max_health: 30.0,
            casting: false,
            radius: 0.5,
        });
        let mut respawns = Respawns::default();

        let mut guard = 0;
        while !agent.is_casting() && guard < 200 {
            run(&mut agent, &world, &mut respawns, 0.05);
            guard += 1;
        }
        assert!(agent.is_casting());

        agent.set_stunned(true);
        for _ in 0..20 {
            run(&mut agent, &world, &mut respawns, 0.05);
        }
        assert!(!agent.is_casting());
        assert!(agent.abilities().activated.is_empty());
        assert!(agent
            .drain_events()
            .iter()
            .any(|e| matches!(e, AgentEvent::CastAborted { .. })));
    }

    #[test]
    fn test_stun_restarts_idle_window() {
        let mut agent = agent(Vec2::ZERO);
        agent.body_mut().move_speed = 0.0;
        let world = World::default();
        let mut respawns = Respawns::default();

        // Just short of the idle timeout.
        for _ in 0..58 {
            run(&mut agent, &world, &mut respawns, 0.05);
        }
        agent.set_stunned(true);
        for _ in 0..40 {
            run(&mut agent, &world, &mut respawns, 0.05);
        }
        agent.set_stunned(false);
        agent.drain_events();

        for _ in 0..20 {
            run(&mut agent, &world, &mut respawns, 0.05);
        }
        assert!(!agent
            .drain_events()
            .iter()
            .any(|e| matches!(e, AgentEvent::Recovery(_))));

        // A full idle window after the stun still triggers recovery.
        for _ in 0..50 {
            run(&mut agent, &world, &mut respawns, 0.05);
        }
        assert!(agent
            .drain_events()
            .iter()
            .any(|e| matches!(e, AgentEvent::Recovery(_))));
    }

    #[test]
    fn test_difficulty_change_honours_tuning_file() {
        use crate::hero_ai::difficulty::TierTuning;

        let override_hard = TierTuning {
            reaction_time: 0.15,
            retreat_threshold: 0.25,
            safe_threshold: 0.75,
            ideal_range: 5.0,
            targeting_accuracy: 1.0,
            suboptimal_pick_chance: 0.05,
            heal_interval: 0.25,
            heal_amount: 2.0,
            respawn_delay: 3.0,
        };
        let tuning = TuningFile {
            tiers: [(DifficultyTier::Hard, override_hard)].into_iter().collect(),
            skills: None,
        };
        let mut agent = agent(Vec2::ZERO);

        agent
            .set_difficulty_from(DifficultyTier::Hard, &tuning)
            .expect("override is valid");
        assert_eq!(agent.config().tier, DifficultyTier::Hard);
        assert_eq!(agent.config().heal_amount, 2.0);
        assert_eq!(agent.config().reaction_time, 0.15);

        // Tiers the file leaves out fall back to the built-in table.
        agent
            .set_difficulty_from(DifficultyTier::Expert, &tuning)
            .expect("built-in tier");
        assert_eq!(*agent.config(), AgentConfig::for_tier(DifficultyTier::Expert));

        let broken = TuningFile {
            tiers: [(
                DifficultyTier::Easy,
                TierTuning {
                    safe_threshold: 0.1,
                    ..override_hard
                },
            )]
            .into_iter()
            .collect(),
            skills: None,
        };
        assert!(agent.set_difficulty_from(DifficultyTier::Easy, &broken).is_err());
        assert_eq!(agent.config().tier, DifficultyTier::Expert);
    }
}
