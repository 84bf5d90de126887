//! Hero Ability Loadouts
//!
//! Concrete ability execution for the simulated heroes: cooldown tracking,
//! per-archetype stats, and an activation queue the battlefield drains to
//! resolve hits. Slot `i` here lines up with entry `i` of the agent's
//! [`SkillTable`], which supplies each ability's reach.
//!
//! ## Hitboxes
//! Every ability hits an axis-aligned box in front of the caster: `range`
//! deep, `half_height` tall on either side of the caster's row. Single-target
//! abilities hit the nearest enemy inside the box, area abilities hit all
//! of them.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::hero_ai::difficulty::{AREA_SKILL, BASIC_ATTACK, CONTROL_SKILL, LONG_SHOT, MELEE_SKILL};
use crate::hero_ai::{AbilitySystem, AreaShape, HeroArchetype, SkillTable};

/// Combat stats for one ability slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbilitySpec {
    /// Display name of the ability
    pub name: String,
    pub damage: f32,
    /// Seconds before the ability can be used again
    pub cooldown: f32,
    /// Wind-up before the ability takes effect
    pub cast_time: f32,
    /// Maximum horizontal reach
    pub range: f32,
    /// Vertical half extent of the hitbox
    pub half_height: f32,
    /// Stun applied to every unit hit (0.0 = none)
    #[serde(default)]
    pub stun: f32,
    /// Hits every enemy in the box instead of the nearest one
    #[serde(default)]
    pub area: bool,
}

impl AbilitySpec {
    /// Hitbox centre and shape for a caster at `origin` facing `facing`.
    pub fn hitbox(&self, origin: Vec2, facing: f32) -> (Vec2, AreaShape) {
        let forward = if facing < 0.0 { -1.0 } else { 1.0 };
        let centre = origin + Vec2::new(forward * self.range * 0.5, 0.0);
        let shape = AreaShape::Rect {
            half_extents: Vec2::new(self.range * 0.5, self.half_height),
        };
        (centre, shape)
    }
}

/// Base stats and movement for a hero archetype.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeroStats {
    pub max_health: f32,
    pub move_speed: f32,
    /// Multiplier applied to every ability's damage
    pub damage_scale: f32,
}

impl HeroStats {
    pub fn for_archetype(archetype: HeroArchetype) -> Self {
        match archetype {
            HeroArchetype::Bruiser => Self {
                max_health: 220.0,
                move_speed: 3.6,
                damage_scale: 1.0,
            },
            HeroArchetype::Marksman => Self {
                max_health: 160.0,
                move_speed: 4.0,
                damage_scale: 1.15,
            },
            HeroArchetype::Mage => Self {
                max_health: 170.0,
                move_speed: 3.8,
                damage_scale: 1.1,
            },
        }
    }
}

/// An ability that finished its cast and is waiting to be resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Activation {
    pub slot: usize,
}

/// One hero's abilities and their cooldowns.
#[derive(Clone, Debug)]
pub struct AbilityLoadout {
    specs: Vec<AbilitySpec>,
    cooldowns: Vec<f32>,
    activations: Vec<Activation>,
}

impl AbilityLoadout {
    pub fn new(specs: Vec<AbilitySpec>) -> Self {
        let cooldowns = vec![0.0; specs.len()];
        Self {
            specs,
            cooldowns,
            activations: Vec::new(),
        }
    }

    /// Standard five-slot loadout for `archetype`, with reach taken from `skills`.
    pub fn for_archetype(archetype: HeroArchetype, skills: &SkillTable) -> Self {
        let scale = HeroStats::for_archetype(archetype).damage_scale;
        let reach = |slot: usize, fallback: f32| skills.get(slot).map_or(fallback, |s| s.range);
        let spec = |slot: usize, name: &str, damage: f32, cooldown, cast_time, half_height, fallback| AbilitySpec {
            name: name.to_string(),
            damage: damage * scale,
            cooldown,
            cast_time,
            range: reach(slot, fallback),
            half_height,
            stun: 0.0,
            area: false,
        };

        let mut specs = vec![
            spec(BASIC_ATTACK, "Basic Attack", 8.0, 0.8, 0.2, 1.0, 4.5),
            AbilitySpec {
                area: true,
                ..spec(MELEE_SKILL, "Cleave", 18.0, 4.0, 0.3, 1.5, 4.0)
            },
            AbilitySpec {
                area: true,
                ..spec(AREA_SKILL, "Shockwave", 16.0, 6.0, 0.5, 2.5, 8.0)
            },
            AbilitySpec {
                stun: 1.5,
                ..spec(CONTROL_SKILL, "Frost Snare", 6.0, 9.0, 0.3, 1.5, 7.0)
            },
            spec(LONG_SHOT, "Piercing Shot", 22.0, 7.0, 0.6, 0.8, 14.0),
        ];

        // Extra table entries get a generic strike so slots stay aligned.
        for slot in specs.len()..skills.len() {
            let name = skills.get(slot).map_or("Strike", |s| s.name.as_str()).to_string();
            specs.push(AbilitySpec {
                name,
                ..spec(slot, "", 10.0, 5.0, 0.3, 1.0, 4.0)
            });
        }

        Self::new(specs)
    }

    pub fn spec(&self, slot: usize) -> Option<&AbilitySpec> {
        self.specs.get(slot)
    }

    pub fn cooldown(&self, slot: usize) -> f32 {
        self.cooldowns.get(slot).copied().unwrap_or(0.0)
    }

    /// Tick all cooldowns down toward zero.
    pub fn tick(&mut self, dt: f32) {
        for cooldown in self.cooldowns.iter_mut() {
            *cooldown = (*cooldown - dt).max(0.0);
        }
    }

    /// Take every activation queued since the last call.
    pub fn take_activations(&mut self) -> Vec<Activation> {
        std::mem::take(&mut self.activations)
    }

    pub fn clear(&mut self) {
        self.cooldowns.iter_mut().for_each(|c| *c = 0.0);
        self.activations.clear();
    }
}

impl AbilitySystem for AbilityLoadout {
    fn ability_count(&self) -> usize {
        self.specs.len()
    }

    fn is_ready(&self, index: usize) -> bool {
        index < self.specs.len() && self.cooldown(index) <= 0.0
    }

    fn activate(&mut self, index: usize) {
        let Some(spec) = self.specs.get(index) else {
            warn!("Activation of unknown ability slot {}", index);
            return;
        };
        self.cooldowns[index] = spec.cooldown;
        self.activations.push(Activation { slot: index });
    }

    fn cast_time(&self, index: usize) -> f32 {
        self.specs.get(index).map_or(0.0, |s| s.cast_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loadout_matches_skill_table() {
        let skills = SkillTable::default();
        let loadout = AbilityLoadout::for_archetype(HeroArchetype::Bruiser, &skills);
        assert_eq!(loadout.ability_count(), skills.len());
        for slot in 0..skills.len() {
            assert_eq!(loadout.spec(slot).map(|s| s.range), skills.get(slot).map(|s| s.range));
        }
    }

    #[test]
    fn test_activation_starts_cooldown() {
        let mut loadout = AbilityLoadout::for_archetype(HeroArchetype::Mage, &SkillTable::default());
        assert!(loadout.is_ready(CONTROL_SKILL));
        loadout.activate(CONTROL_SKILL);
        assert!(!loadout.is_ready(CONTROL_SKILL));
        assert_eq!(loadout.take_activations(), vec![Activation { slot: CONTROL_SKILL }]);
        assert!(loadout.take_activations().is_empty());

        loadout.tick(9.0);
        assert!(loadout.is_ready(CONTROL_SKILL));
    }

    #[test]
    fn test_unknown_slot_is_never_ready() {
        let mut loadout = AbilityLoadout::for_archetype(HeroArchetype::Bruiser, &SkillTable::default());
        assert!(!loadout.is_ready(42));
        loadout.activate(42);
        assert!(loadout.take_activations().is_empty());
    }

    #[test]
    fn test_hitbox_points_forward() {
        let loadout = AbilityLoadout::for_archetype(HeroArchetype::Marksman, &SkillTable::default());
        let spec = loadout.spec(LONG_SHOT).expect("slot");
        let (centre, shape) = spec.hitbox(Vec2::ZERO, -1.0);
        assert!(centre.x < 0.0);
        assert!(shape.overlaps(centre, Vec2::new(-13.0, 0.0), 0.5));
        assert!(!shape.overlaps(centre, Vec2::new(3.0, 0.0), 0.5));
    }
}
