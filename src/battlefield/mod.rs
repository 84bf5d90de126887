//! Battlefield
//!
//! The world the hero agents fight in: one hero per faction, minion waves in
//! both lanes, and a castle at each end. [`Battlefield::tick`] advances
//! everything by one fixed step:
//! 1. Spawn due minion waves
//! 2. Respawn heroes whose timer elapsed
//! 3. Tick each hero agent against a snapshot of the world, then integrate
//!    its velocity
//! 4. Resolve abilities that finished casting
//! 5. Step lane units and apply their strikes
//! 6. Remove the dead, crediting kills
//! 7. Check for a destroyed castle or the time limit

pub mod abilities;
pub mod flow;
pub mod map;
pub mod units;

use std::collections::{BTreeMap, HashMap};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::combat::log::{CombatLog, CombatLogEventType, HeroMetadata, MatchMetadata};
use crate::hero_ai::{
    AgentError, AgentEvent, AgentParts, AgentState, AgentStateKind, AnimationParam, AnimationSink,
    AnimationTrigger, AreaShape, DifficultyTier, EntityId, EntityRegistry, EntitySnapshot, Faction, GameRng,
    HeroAgent, HeroArchetype, HeroBody, Objectives, RecoveryAction, RespawnScheduler, SkillTable,
    SpatialQuery, TickContext, TuningFile, UnitClass,
};

pub use abilities::{AbilityLoadout, AbilitySpec, HeroStats};
pub use flow::FlowGrid;
pub use map::LaneMap;
pub use units::{Unit, WaveSpawner};

/// Collision radius of a hero.
pub const HERO_RADIUS: f32 = 0.5;

/// Obstacles are exposed as entities with ids counted down from here.
const OBSTACLE_ID_BASE: u32 = u32::MAX - 1024;

/// A hero agent with the battlefield's concrete collaborators.
pub type LaneHero = HeroAgent<AbilityLoadout, AnimationTally>;

// ============================================================================
// Collaborator implementations
// ============================================================================

/// Animation output for a simulated hero: counts triggers and keeps the
/// latest continuous parameters.
#[derive(Debug, Clone, Default)]
pub struct AnimationTally {
    pub triggers: HashMap<AnimationTrigger, u32>,
    pub last_trigger: Option<AnimationTrigger>,
    pub move_speed: f32,
    pub facing: f32,
}

impl AnimationTally {
    pub fn count(&self, trigger: AnimationTrigger) -> u32 {
        self.triggers.get(&trigger).copied().unwrap_or(0)
    }
}

impl AnimationSink for AnimationTally {
    fn trigger(&mut self, trigger: AnimationTrigger) {
        *self.triggers.entry(trigger).or_default() += 1;
        self.last_trigger = Some(trigger);
    }

    fn set_continuous(&mut self, param: AnimationParam, value: f32) {
        match param {
            AnimationParam::MoveSpeed => self.move_speed = value,
            AnimationParam::Facing => self.facing = value,
        }
    }
}

/// A respawn waiting for its delay to run out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRespawn {
    pub hero: EntityId,
    pub remaining: f32,
    pub tier: DifficultyTier,
}

/// Respawn timers for every hero on the field.
#[derive(Debug, Clone, Default)]
pub struct RespawnQueue {
    pending: Vec<PendingRespawn>,
}

impl RespawnQueue {
    pub fn pending(&self) -> &[PendingRespawn] {
        &self.pending
    }

    /// Count every timer down; returns the respawns that are due.
    pub fn tick(&mut self, dt: f32) -> Vec<PendingRespawn> {
        for pending in self.pending.iter_mut() {
            pending.remaining -= dt;
        }
        let (due, waiting) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.remaining <= 0.0);
        self.pending = waiting;
        due
    }
}

/// The queue as seen by one hero's agent.
struct HeroRespawn<'a> {
    queue: &'a mut RespawnQueue,
    hero: EntityId,
}

impl RespawnScheduler for HeroRespawn<'_> {
    fn schedule(&mut self, delay: f32, tier: DifficultyTier) {
        // One pending respawn per hero.
        self.queue.pending.retain(|p| p.hero != self.hero);
        self.queue.pending.push(PendingRespawn {
            hero: self.hero,
            remaining: delay,
            tier,
        });
    }
}

/// Immutable view of every live entity for one phase of a tick.
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    pub fn entities(&self) -> &[EntitySnapshot] {
        &self.entities
    }
}

impl EntityRegistry for WorldSnapshot {
    fn all_live(&self) -> &[EntitySnapshot] {
        &self.entities
    }
}

impl SpatialQuery for WorldSnapshot {
    fn overlap_area(&self, point: Vec2, shape: AreaShape) -> Vec<EntitySnapshot> {
        self.entities
            .iter()
            .filter(|e| shape.overlaps(point, e.position, e.radius))
            .copied()
            .collect()
    }
}

// ============================================================================
// Setup
// ============================================================================

/// One side's hero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeroSetup {
    pub archetype: HeroArchetype,
    pub difficulty: DifficultyTier,
    /// False leaves the hero standing at its spawn
    pub ai_enabled: bool,
}

impl HeroSetup {
    pub fn new(archetype: HeroArchetype, difficulty: DifficultyTier) -> Self {
        Self {
            archetype,
            difficulty,
            ai_enabled: true,
        }
    }
}

/// Everything needed to build a [`Battlefield`].
#[derive(Debug, Clone)]
pub struct BattlefieldConfig {
    pub west: HeroSetup,
    pub east: HeroSetup,
    pub map: LaneMap,
    /// Seconds between minion waves
    pub wave_interval: f32,
    /// Match ends in a decision after this many seconds
    pub max_duration: f32,
    pub seed: Option<u64>,
    pub tuning: TuningFile,
}

impl Default for BattlefieldConfig {
    fn default() -> Self {
        Self {
            west: HeroSetup::new(HeroArchetype::Bruiser, DifficultyTier::Normal),
            east: HeroSetup::new(HeroArchetype::Marksman, DifficultyTier::Normal),
            map: LaneMap::standard(),
            wave_interval: 20.0,
            max_duration: 300.0,
            seed: None,
            tuning: TuningFile::default(),
        }
    }
}

// ============================================================================
// Match bookkeeping
// ============================================================================

/// Running totals for one hero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeroMatchStats {
    pub damage_dealt: f32,
    pub damage_taken: f32,
    pub healing_received: f32,
    pub hero_kills: u32,
    pub unit_kills: u32,
    pub deaths: u32,
    pub abilities_used: u32,
    pub casts_aborted: u32,
    pub recoveries: u32,
    pub time_in_state: BTreeMap<AgentStateKind, f32>,
}

/// A hero agent plus the battlefield's bookkeeping for it.
pub struct HeroSlot {
    pub agent: LaneHero,
    pub stats: HeroMatchStats,
    stun_timer: f32,
}

impl HeroSlot {
    pub fn faction(&self) -> Faction {
        self.agent.body().faction
    }

    pub fn name(&self) -> String {
        let body = self.agent.body();
        format!("{} {}", body.faction.name(), body.archetype.name())
    }

    fn tick_stun(&mut self, dt: f32) {
        if self.stun_timer <= 0.0 {
            return;
        }
        self.stun_timer -= dt;
        if self.stun_timer <= 0.0 {
            self.stun_timer = 0.0;
            self.agent.set_stunned(false);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    CastleDestroyed,
    /// Time limit reached; the healthier castle wins
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// `None` for a draw
    pub winner: Option<Faction>,
    pub reason: EndReason,
    pub match_time: f32,
}

struct AbilityHit {
    caster: EntityId,
    spec: AbilitySpec,
    victims: Vec<EntityId>,
}

enum HeroNote {
    Agent(AgentEvent),
    Healed(f32),
}

// ============================================================================
// Battlefield
// ============================================================================

/// The whole simulated match.
#[derive(Resource)]
pub struct Battlefield {
    map: LaneMap,
    flow: FlowGrid,
    heroes: Vec<HeroSlot>,
    units: Vec<Unit>,
    spawner: WaveSpawner,
    respawns: RespawnQueue,
    elapsed: f32,
    max_duration: f32,
    next_id: u32,
    seed: Option<u64>,
    outcome: Option<MatchOutcome>,
}

impl Battlefield {
    pub fn new(config: BattlefieldConfig) -> Result<Self, AgentError> {
        let mut rng = match config.seed {
            Some(seed) => GameRng::from_seed(seed),
            None => GameRng::from_entropy(),
        };
        let skills = config.tuning.skill_table();
        let map = config.map;

        let mut battlefield = Self {
            flow: FlowGrid::from_map(&map),
            map,
            heroes: Vec::new(),
            units: Vec::new(),
            spawner: WaveSpawner::new(config.wave_interval),
            respawns: RespawnQueue::default(),
            elapsed: 0.0,
            max_duration: config.max_duration,
            next_id: 1,
            seed: config.seed,
            outcome: None,
        };

        for (faction, setup) in [(Faction::West, config.west), (Faction::East, config.east)] {
            let id = battlefield.allocate_id();
            let slot = battlefield.build_hero(id, faction, setup, &config.tuning, &skills, rng.fork())?;
            battlefield.heroes.push(slot);
        }
        for faction in [Faction::West, Faction::East] {
            let id = battlefield.allocate_id();
            let position = battlefield.map.castle_position(faction);
            battlefield
                .units
                .push(Unit::new(id, faction, UnitClass::Castle, position));
        }

        Ok(battlefield)
    }

    fn build_hero(
        &self,
        id: EntityId,
        faction: Faction,
        setup: HeroSetup,
        tuning: &TuningFile,
        skills: &SkillTable,
        rng: GameRng,
    ) -> Result<HeroSlot, AgentError> {
        let stats = HeroStats::for_archetype(setup.archetype);
        let enemy = faction.opponent().unwrap_or(faction);
        let body = HeroBody::new(
            id,
            faction,
            setup.archetype,
            self.map.hero_spawn(faction),
            stats.max_health,
            stats.move_speed,
        );
        let parts = AgentParts {
            body: Some(body),
            abilities: Some(AbilityLoadout::for_archetype(setup.archetype, skills)),
            animation: AnimationTally::default(),
            objectives: Objectives {
                home_rally: self.map.rally_point(faction),
                home_castle: self.map.castle_position(faction),
                enemy_castle: self.map.castle_position(enemy),
            },
        };

        let config = tuning.config_for(setup.difficulty)?;
        let mut agent = HeroAgent::new(parts, config, skills.clone(), rng)?;
        agent.set_active(setup.ai_enabled);

        info!(
            "{} {} ready ({} difficulty, AI {})",
            faction.name(),
            setup.archetype.name(),
            setup.difficulty.name(),
            if setup.ai_enabled { "on" } else { "off" }
        );

        Ok(HeroSlot {
            agent,
            stats: HeroMatchStats::default(),
            stun_timer: 0.0,
        })
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn map(&self) -> &LaneMap {
        &self.map
    }

    pub fn heroes(&self) -> &[HeroSlot] {
        &self.heroes
    }

    pub fn hero(&self, faction: Faction) -> Option<&HeroSlot> {
        self.heroes.iter().find(|slot| slot.faction() == faction)
    }

    pub fn hero_mut(&mut self, faction: Faction) -> Option<&mut HeroSlot> {
        self.heroes.iter_mut().find(|slot| slot.faction() == faction)
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn respawns(&self) -> &RespawnQueue {
        &self.respawns
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn waves_spawned(&self) -> u32 {
        self.spawner.waves_spawned()
    }

    /// Remaining castle health as a fraction (0.0 once destroyed).
    pub fn castle_health(&self, faction: Faction) -> f32 {
        self.units
            .iter()
            .find(|u| u.class == UnitClass::Castle && u.faction == faction)
            .map_or(0.0, |castle| (castle.health / castle.stats.max_health).max(0.0))
    }

    /// Add a lane unit, e.g. to stage a scenario.
    pub fn spawn_unit(&mut self, faction: Faction, class: UnitClass, position: Vec2) -> EntityId {
        let id = self.allocate_id();
        self.units.push(Unit::new(id, faction, class, position));
        id
    }

    /// Every live entity, plus obstacles as neutral entities.
    pub fn snapshot(&self) -> WorldSnapshot {
        let heroes = self
            .heroes
            .iter()
            .filter(|slot| slot.agent.state() != AgentState::Dead && slot.agent.body().is_alive())
            .map(|slot| {
                let body = slot.agent.body();
                EntitySnapshot {
                    id: body.id,
                    faction: body.faction,
                    class: UnitClass::Hero(body.archetype),
                    position: body.position,
                    health: body.health,
                    max_health: body.max_health,
                    casting: slot.agent.is_casting(),
                    radius: HERO_RADIUS,
                }
            });
        let units = self.units.iter().filter(|u| u.is_alive()).map(Unit::snapshot);
        let obstacles = self.map.obstacles.iter().enumerate().map(|(i, obstacle)| EntitySnapshot {
            id: EntityId(OBSTACLE_ID_BASE - i as u32),
            faction: Faction::Neutral,
            class: UnitClass::Obstacle,
            position: obstacle.position,
            health: 1.0,
            max_health: 1.0,
            casting: false,
            radius: obstacle.radius,
        });

        WorldSnapshot {
            entities: heroes.chain(units).chain(obstacles).collect(),
        }
    }

    fn hero_index(&self, id: EntityId) -> Option<usize> {
        self.heroes.iter().position(|slot| slot.agent.body().id == id)
    }

    /// Display name for log lines.
    fn describe(&self, id: EntityId) -> String {
        if let Some(index) = self.hero_index(id) {
            return self.heroes[index].name();
        }
        match self.units.iter().find(|u| u.id == id) {
            Some(unit) => format!("{} {}#{}", unit.faction.name(), unit.class.name(), unit.id.0),
            None => format!("#{}", id.0),
        }
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the match by `dt` seconds. Does nothing once finished.
    pub fn tick(&mut self, dt: f32, log: &mut CombatLog) {
        if self.outcome.is_some() || dt <= 0.0 {
            return;
        }
        self.elapsed += dt;
        log.match_time = self.elapsed;

        self.spawn_waves(dt, log);
        self.process_respawns(dt, log);
        self.tick_heroes(dt, log);
        self.resolve_abilities(log);
        self.tick_units(dt, log);
        self.remove_dead(log);
        self.check_outcome(log);
    }

    fn spawn_waves(&mut self, dt: f32, log: &mut CombatLog) {
        let spawns = self.spawner.tick(dt, &self.map);
        if spawns.is_empty() {
            return;
        }
        let count = spawns.len();
        for (faction, class, position) in spawns {
            self.spawn_unit(faction, class, position);
        }
        log.log(
            CombatLogEventType::MatchEvent,
            format!("Wave {} spawned ({} units)", self.spawner.waves_spawned(), count),
        );
    }

    fn process_respawns(&mut self, dt: f32, log: &mut CombatLog) {
        for due in self.respawns.tick(dt) {
            let Some(index) = self.hero_index(due.hero) else {
                continue;
            };
            let spawn = self.map.hero_spawn(self.heroes[index].faction());
            let slot = &mut self.heroes[index];
            slot.stun_timer = 0.0;
            slot.agent.abilities_mut().clear();
            slot.agent.respawn(spawn);
            log.log(
                CombatLogEventType::Respawn,
                format!("{} respawns ({} tier)", slot.name(), due.tier.name()),
            );
        }
    }

    fn tick_heroes(&mut self, dt: f32, log: &mut CombatLog) {
        let snapshot = self.snapshot();
        let mut notes = Vec::new();

        for (index, slot) in self.heroes.iter_mut().enumerate() {
            slot.tick_stun(dt);
            slot.agent.abilities_mut().tick(dt);
            let before = slot.agent.body().health;

            let mut respawn = HeroRespawn {
                queue: &mut self.respawns,
                hero: slot.agent.body().id,
            };
            let mut ctx = TickContext {
                registry: &snapshot,
                spatial: &snapshot,
                flow: &self.flow,
                bounds: &self.map,
                respawn: &mut respawn,
            };
            slot.agent.tick(dt, &mut ctx);

            let body = slot.agent.body_mut();
            if body.is_alive() {
                let next = body.position + body.velocity * dt;
                body.position = self
                    .map
                    .push_out_of_obstacles(self.map.clamp(next), HERO_RADIUS);
            }

            let healed = slot.agent.body().health - before;
            if healed > 0.0 {
                notes.push((index, HeroNote::Healed(healed)));
            }
            *slot
                .stats
                .time_in_state
                .entry(slot.agent.state().kind())
                .or_default() += dt;
            notes.extend(
                slot.agent
                    .drain_events()
                    .into_iter()
                    .map(|event| (index, HeroNote::Agent(event))),
            );
        }

        for (index, note) in notes {
            self.record(index, note, log);
        }
    }

    fn record(&mut self, index: usize, note: HeroNote, log: &mut CombatLog) {
        let name = self.heroes[index].name();
        let event = match note {
            HeroNote::Healed(amount) => {
                self.heroes[index].stats.healing_received += amount;
                log.log(
                    CombatLogEventType::Healing,
                    format!("{} regenerates {:.1} health", name, amount),
                );
                return;
            }
            HeroNote::Agent(event) => event,
        };

        match event {
            AgentEvent::StateChanged { from, to } => log.log(
                CombatLogEventType::StateChange,
                format!("{}: {} -> {}", name, from.name(), to.name()),
            ),
            AgentEvent::TargetAcquired(id) => log.log(
                CombatLogEventType::Targeting,
                format!("{} targets {}", name, self.describe(id)),
            ),
            AgentEvent::TargetLost(id) => log.log(
                CombatLogEventType::Targeting,
                format!("{} loses {}", name, self.describe(id)),
            ),
            AgentEvent::CastStarted { ability, target } => {
                let ability_name = self.ability_name(index, ability);
                let target = target.map_or_else(|| "nothing".to_string(), |id| self.describe(id));
                log.log(
                    CombatLogEventType::AbilityUsed,
                    format!("{} begins casting {} at {}", name, ability_name, target),
                );
            }
            AgentEvent::CastAborted { ability } => {
                self.heroes[index].stats.casts_aborted += 1;
                log.log(
                    CombatLogEventType::CrowdControl,
                    format!("{}'s {} was interrupted", name, self.ability_name(index, ability)),
                );
            }
            AgentEvent::Recovery(action) => {
                self.heroes[index].stats.recoveries += 1;
                let detail = match action {
                    RecoveryAction::ResearchTarget => "searching for a new target".to_string(),
                    RecoveryAction::MarchTo(p) => format!("marching to ({:.1}, {:.1})", p.x, p.y),
                    RecoveryAction::Nudge(d) => format!("stepping off the edge ({:.1}, {:.1})", d.x, d.y),
                    RecoveryAction::RandomWalk(p) => format!("wandering to ({:.1}, {:.1})", p.x, p.y),
                };
                log.log(CombatLogEventType::Recovery, format!("{} was idle, {}", name, detail));
            }
            AgentEvent::Died => {
                self.heroes[index].stats.deaths += 1;
                log.log(CombatLogEventType::Death, format!("{} has fallen", name));
            }
            AgentEvent::Respawned
            | AgentEvent::AbilityActivated { .. }
            | AgentEvent::HealthChanged { .. } => {}
        }
    }

    fn ability_name(&self, index: usize, ability: usize) -> String {
        self.heroes[index]
            .agent
            .abilities()
            .spec(ability)
            .map_or_else(|| format!("ability {}", ability), |spec| spec.name.clone())
    }

    fn resolve_abilities(&mut self, log: &mut CombatLog) {
        let snapshot = self.snapshot();
        let mut hits = Vec::new();

        for slot in self.heroes.iter_mut() {
            let activations = slot.agent.abilities_mut().take_activations();
            let body = *slot.agent.body();
            if !body.is_alive() {
                continue;
            }
            for activation in activations {
                let Some(spec) = slot.agent.abilities().spec(activation.slot).cloned() else {
                    continue;
                };
                slot.stats.abilities_used += 1;

                let (centre, shape) = spec.hitbox(body.position, body.facing);
                let mut victims: Vec<EntitySnapshot> = snapshot
                    .overlap_area(centre, shape)
                    .into_iter()
                    .filter(|e| e.is_alive() && body.faction.is_hostile_to(e.faction))
                    .collect();
                victims.sort_by(|a, b| {
                    body.position
                        .distance_squared(a.position)
                        .total_cmp(&body.position.distance_squared(b.position))
                });
                if !spec.area {
                    victims.truncate(1);
                }

                hits.push(AbilityHit {
                    caster: body.id,
                    victims: victims.iter().map(|v| v.id).collect(),
                    spec,
                });
            }
        }

        for hit in hits {
            log.log(
                CombatLogEventType::AbilityUsed,
                format!(
                    "{} uses {} ({} hit)",
                    self.describe(hit.caster),
                    hit.spec.name,
                    hit.victims.len()
                ),
            );
            for victim in hit.victims {
                self.apply_hit(hit.caster, victim, hit.spec.damage, &hit.spec.name, log);
                if hit.spec.stun > 0.0 {
                    self.apply_stun(victim, hit.spec.stun, log);
                }
            }
        }
    }

    fn tick_units(&mut self, dt: f32, log: &mut CombatLog) {
        let snapshot = self.snapshot();
        let strikes: Vec<_> = self
            .units
            .iter_mut()
            .filter_map(|unit| unit.step(dt, snapshot.entities(), &self.map))
            .collect();

        for strike in strikes {
            self.apply_hit(strike.attacker, strike.target, strike.damage, "an attack", log);
        }
    }

    /// Deal damage, keeping hero totals and kill credit up to date.
    fn apply_hit(&mut self, attacker: EntityId, target: EntityId, amount: f32, cause: &str, log: &mut CombatLog) {
        let attacker_hero = self.hero_index(attacker);
        let target_hero = self.hero_index(target);

        let taken = match target_hero {
            Some(index) => {
                let slot = &mut self.heroes[index];
                let taken = slot.agent.apply_damage(amount);
                slot.stats.damage_taken += taken;
                taken
            }
            None => match self.units.iter_mut().find(|u| u.id == target) {
                Some(unit) => unit.apply_damage(amount, attacker_hero.map(|_| attacker)),
                None => 0.0,
            },
        };
        if taken <= 0.0 {
            return;
        }

        if let Some(index) = attacker_hero {
            self.heroes[index].stats.damage_dealt += taken;
        }
        if attacker_hero.is_some() || target_hero.is_some() {
            log.log(
                CombatLogEventType::Damage,
                format!(
                    "{} hits {} with {} for {:.0}",
                    self.describe(attacker),
                    self.describe(target),
                    cause,
                    taken
                ),
            );
        }

        if let (Some(killer), Some(victim)) = (attacker_hero, target_hero) {
            if !self.heroes[victim].agent.body().is_alive() {
                self.heroes[killer].stats.hero_kills += 1;
            }
        }
    }

    fn apply_stun(&mut self, target: EntityId, duration: f32, log: &mut CombatLog) {
        if let Some(index) = self.hero_index(target) {
            let slot = &mut self.heroes[index];
            if !slot.agent.body().is_alive() {
                return;
            }
            slot.stun_timer = slot.stun_timer.max(duration);
            slot.agent.set_stunned(true);
        } else if let Some(unit) = self.units.iter_mut().find(|u| u.id == target && u.is_alive()) {
            if unit.class == UnitClass::Castle {
                return;
            }
            unit.apply_stun(duration);
        } else {
            return;
        }
        log.log(
            CombatLogEventType::CrowdControl,
            format!("{} is stunned for {:.1}s", self.describe(target), duration),
        );
    }

    fn remove_dead(&mut self, log: &mut CombatLog) {
        let (keep, dead): (Vec<Unit>, Vec<Unit>) = std::mem::take(&mut self.units)
            .into_iter()
            .partition(|u| u.is_alive() || u.class == UnitClass::Castle);
        self.units = keep;

        for unit in dead {
            if let Some(index) = unit.last_hero_hit.and_then(|hero| self.hero_index(hero)) {
                self.heroes[index].stats.unit_kills += 1;
            }
            if unit.class == UnitClass::SpecialMinion {
                log.log(
                    CombatLogEventType::Death,
                    format!("{} {}#{} died", unit.faction.name(), unit.class.name(), unit.id.0),
                );
            }
        }
    }

    fn check_outcome(&mut self, log: &mut CombatLog) {
        let west = self.castle_health(Faction::West);
        let east = self.castle_health(Faction::East);

        let outcome = if west <= 0.0 || east <= 0.0 {
            let winner = match (west <= 0.0, east <= 0.0) {
                (true, true) => None,
                (true, false) => Some(Faction::East),
                _ => Some(Faction::West),
            };
            MatchOutcome {
                winner,
                reason: EndReason::CastleDestroyed,
                match_time: self.elapsed,
            }
        } else if self.elapsed >= self.max_duration {
            let winner = if (west - east).abs() < 1e-4 {
                None
            } else if west > east {
                Some(Faction::West)
            } else {
                Some(Faction::East)
            };
            MatchOutcome {
                winner,
                reason: EndReason::Timeout,
                match_time: self.elapsed,
            }
        } else {
            return;
        };

        let message = match outcome.winner {
            Some(faction) => format!("{} wins ({:?}) after {:.1}s", faction.name(), outcome.reason, self.elapsed),
            None => format!("Draw ({:?}) after {:.1}s", outcome.reason, self.elapsed),
        };
        info!("{}", message);
        log.log(CombatLogEventType::MatchEvent, message);
        self.outcome = Some(outcome);
    }

    /// Match summary for the saved log.
    pub fn metadata(&self) -> MatchMetadata {
        MatchMetadata {
            map_name: self.map.name.clone(),
            winner: self
                .outcome
                .and_then(|o| o.winner)
                .map(|faction| faction.name().to_string()),
            match_time: self.elapsed,
            random_seed: self.seed,
            heroes: self
                .heroes
                .iter()
                .map(|slot| {
                    let body = slot.agent.body();
                    HeroMetadata {
                        faction: body.faction.name().to_string(),
                        archetype: body.archetype.name().to_string(),
                        difficulty: slot.agent.config().tier.name().to_string(),
                        max_health: body.max_health,
                        final_health: body.health,
                        final_state: slot.agent.state().kind().name().to_string(),
                        damage_dealt: slot.stats.damage_dealt,
                        damage_taken: slot.stats.damage_taken,
                        kills: slot.stats.hero_kills,
                        deaths: slot.stats.deaths,
                        final_position: (body.position.x, body.position.y),
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Battlefield {
        Battlefield::new(BattlefieldConfig {
            seed: Some(11),
            ..Default::default()
        })
        .expect("battlefield")
    }

    #[test]
    fn test_new_battlefield_has_heroes_and_castles() {
        let battlefield = seeded();
        assert_eq!(battlefield.heroes().len(), 2);
        assert_eq!(battlefield.castle_health(Faction::West), 1.0);
        assert_eq!(battlefield.castle_health(Faction::East), 1.0);
        let snapshot = battlefield.snapshot();
        assert!(snapshot
            .entities()
            .iter()
            .any(|e| e.class == UnitClass::Obstacle && e.faction == Faction::Neutral));
    }

    #[test]
    fn test_respawn_queue_keeps_one_entry_per_hero() {
        let mut queue = RespawnQueue::default();
        let mut scheduler = HeroRespawn {
            queue: &mut queue,
            hero: EntityId(1),
        };
        scheduler.schedule(5.0, DifficultyTier::Normal);
        scheduler.schedule(3.0, DifficultyTier::Hard);
        assert_eq!(queue.pending().len(), 1);
        assert!(queue.tick(2.0).is_empty());
        let due = queue.tick(1.0);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].tier, DifficultyTier::Hard);
    }

    #[test]
    fn test_waves_arrive_and_heroes_leave_spawn() {
        let mut battlefield = seeded();
        let mut log = CombatLog::default();
        let start = battlefield.hero(Faction::West).map(|s| s.agent.body().position);
        for _ in 0..60 {
            battlefield.tick(0.05, &mut log);
        }
        assert_eq!(battlefield.waves_spawned(), 1);
        assert!(battlefield.units().len() > 2);
        let now = battlefield.hero(Faction::West).map(|s| s.agent.body().position);
        assert_ne!(start, now);
    }

    #[test]
    fn test_timeout_decides_by_castle_health() {
        let mut battlefield = Battlefield::new(BattlefieldConfig {
            seed: Some(3),
            max_duration: 1.0,
            ..Default::default()
        })
        .expect("battlefield");
        let mut log = CombatLog::default();
        for _ in 0..30 {
            battlefield.tick(0.05, &mut log);
        }
        let outcome = battlefield.outcome().expect("finished");
        assert_eq!(outcome.reason, EndReason::Timeout);
        assert_eq!(outcome.winner, None);
    }

    #[test]
    fn test_animation_tally_counts_triggers() {
        let mut tally = AnimationTally::default();
        tally.trigger(AnimationTrigger::Cast(2));
        tally.trigger(AnimationTrigger::Cast(2));
        tally.set_continuous(AnimationParam::Facing, -1.0);
        assert_eq!(tally.count(AnimationTrigger::Cast(2)), 2);
        assert_eq!(tally.facing, -1.0);
    }
}
