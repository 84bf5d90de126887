//! Difficulty Tiers and Tuning Data
//!
//! [`AgentConfig`] is the immutable per-difficulty tuning bundle the agent
//! reads every tick. It is derived from a [`TierTuning`] table (the built-in
//! one, or an override loaded from `assets/config/hero_tuning.ron`) and only
//! ever replaced wholesale by an explicit difficulty change.
//!
//! [`SkillTable`] holds the design-balance data the combat decision engine
//! scores abilities with. Loadout index `i` in the ability system corresponds
//! to entry `i` in the table.

use std::collections::HashMap;
use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::constants::DETECTION_RADIUS;
use super::error::{AgentError, ConfigError};

/// How hard the hero agent plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DifficultyTier {
    Easy,
    #[default]
    Normal,
    Hard,
    Expert,
}

impl DifficultyTier {
    pub fn all() -> &'static [DifficultyTier] {
        &[
            DifficultyTier::Easy,
            DifficultyTier::Normal,
            DifficultyTier::Hard,
            DifficultyTier::Expert,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            DifficultyTier::Easy => "Easy",
            DifficultyTier::Normal => "Normal",
            DifficultyTier::Hard => "Hard",
            DifficultyTier::Expert => "Expert",
        }
    }

    /// Built-in tuning for this tier.
    pub fn default_tuning(self) -> TierTuning {
        match self {
            DifficultyTier::Easy => TierTuning {
                reaction_time: 0.6,
                retreat_threshold: 0.25,
                safe_threshold: 0.6,
                ideal_range: 6.0,
                targeting_accuracy: 0.5,
                suboptimal_pick_chance: 0.35,
                heal_interval: 0.25,
                heal_amount: 0.75,
                respawn_delay: 6.0,
            },
            DifficultyTier::Normal => TierTuning {
                reaction_time: 0.35,
                retreat_threshold: 0.3,
                safe_threshold: 0.7,
                ideal_range: 5.5,
                targeting_accuracy: 0.75,
                suboptimal_pick_chance: 0.2,
                heal_interval: 0.25,
                heal_amount: 1.0,
                respawn_delay: 5.0,
            },
            DifficultyTier::Hard => TierTuning {
                reaction_time: 0.2,
                retreat_threshold: 0.3,
                safe_threshold: 0.8,
                ideal_range: 5.0,
                targeting_accuracy: 0.9,
                suboptimal_pick_chance: 0.1,
                heal_interval: 0.25,
                heal_amount: 1.25,
                respawn_delay: 4.0,
            },
            DifficultyTier::Expert => TierTuning {
                reaction_time: 0.1,
                retreat_threshold: 0.35,
                safe_threshold: 0.85,
                ideal_range: 5.0,
                targeting_accuracy: 1.0,
                suboptimal_pick_chance: 0.05,
                heal_interval: 0.25,
                heal_amount: 1.5,
                respawn_delay: 3.0,
            },
        }
    }
}

/// Raw per-tier tuning values as they appear in the tuning file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierTuning {
    /// Seconds between two decision passes
    pub reaction_time: f32,
    /// Health fraction below which an engaged agent retreats
    pub retreat_threshold: f32,
    /// Health fraction at which a retreating agent returns to the fight
    pub safe_threshold: f32,
    /// Preferred horizontal distance to the target
    pub ideal_range: f32,
    /// 1.0 = noiseless target scoring, 0.0 = maximum noise
    pub targeting_accuracy: f32,
    /// Chance of picking the 2nd/3rd ranked target instead of the best one
    pub suboptimal_pick_chance: f32,
    /// Seconds per self-heal tick
    pub heal_interval: f32,
    /// Health restored per self-heal tick
    pub heal_amount: f32,
    /// Seconds between death and respawn
    pub respawn_delay: f32,
}

/// Immutable tuning bundle read by every agent subsystem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentConfig {
    pub tier: DifficultyTier,
    pub reaction_time: f32,
    pub retreat_threshold: f32,
    pub safe_threshold: f32,
    pub ideal_range: f32,
    pub targeting_accuracy: f32,
    pub suboptimal_pick_chance: f32,
    pub heal_interval: f32,
    pub heal_amount: f32,
    pub respawn_delay: f32,
    pub detection_radius: f32,
}

impl AgentConfig {
    /// Derive the built-in configuration for a tier.
    pub fn for_tier(tier: DifficultyTier) -> Self {
        // Built-in tables are validated by tests; no error path needed here.
        Self::build(tier, &tier.default_tuning())
    }

    /// Derive a configuration from explicit tuning, rejecting values that
    /// would break the Engage/Retreat hysteresis or the timers.
    pub fn from_tuning(tier: DifficultyTier, tuning: &TierTuning) -> Result<Self, AgentError> {
        let invalid = |message: &str| AgentError::InvalidTuning {
            tier: tier.name().to_string(),
            message: message.to_string(),
        };

        if !(0.0..=1.0).contains(&tuning.retreat_threshold)
            || !(0.0..=1.0).contains(&tuning.safe_threshold)
        {
            return Err(invalid("health thresholds must lie in 0.0..=1.0"));
        }
        if tuning.safe_threshold <= tuning.retreat_threshold {
            return Err(invalid("safe_threshold must exceed retreat_threshold"));
        }
        if tuning.reaction_time <= 0.0 || tuning.heal_interval <= 0.0 {
            return Err(invalid("reaction_time and heal_interval must be positive"));
        }
        if !(0.0..=1.0).contains(&tuning.targeting_accuracy)
            || !(0.0..=1.0).contains(&tuning.suboptimal_pick_chance)
        {
            return Err(invalid("accuracy and pick chance must lie in 0.0..=1.0"));
        }
        if tuning.ideal_range <= 0.0 || tuning.heal_amount < 0.0 || tuning.respawn_delay < 0.0 {
            return Err(invalid("ranges, heal amounts and delays must not be negative"));
        }

        Ok(Self::build(tier, tuning))
    }

    fn build(tier: DifficultyTier, tuning: &TierTuning) -> Self {
        Self {
            tier,
            reaction_time: tuning.reaction_time,
            retreat_threshold: tuning.retreat_threshold,
            safe_threshold: tuning.safe_threshold,
            ideal_range: tuning.ideal_range,
            targeting_accuracy: tuning.targeting_accuracy,
            suboptimal_pick_chance: tuning.suboptimal_pick_chance,
            heal_interval: tuning.heal_interval,
            heal_amount: tuning.heal_amount,
            respawn_delay: tuning.respawn_delay,
            detection_radius: DETECTION_RADIUS,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::for_tier(DifficultyTier::default())
    }
}

// ============================================================================
// Skill design table
// ============================================================================

/// Loadout index of the basic attack.
pub const BASIC_ATTACK: usize = 0;
/// Loadout index of the short-range strike preferred inside the melee band.
pub const MELEE_SKILL: usize = 1;
/// Loadout index of the area ability.
pub const AREA_SKILL: usize = 2;
/// Loadout index of the control (slow/stun) ability used against chasers.
pub const CONTROL_SKILL: usize = 3;
/// Loadout index of the long-range shot.
pub const LONG_SHOT: usize = 4;

/// How strictly an ability needs the target on the agent's row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlignmentRule {
    /// Zero utility beyond `cutoff` units of vertical mismatch.
    Strict { cutoff: f32 },
    /// Zero utility beyond the distance-dependent tolerance.
    Scaled,
    /// Fades out over twice the tolerance.
    Loose,
}

impl AlignmentRule {
    /// Utility multiplier for a vertical mismatch `dy` given the current tolerance.
    pub fn factor(self, dy: f32, tolerance: f32) -> f32 {
        let dy = dy.abs();
        match self {
            AlignmentRule::Strict { cutoff } => {
                if dy > cutoff {
                    0.0
                } else {
                    1.0 - 0.3 * dy / cutoff
                }
            }
            AlignmentRule::Scaled => {
                if dy > tolerance {
                    0.0
                } else {
                    1.0 - 0.5 * dy / tolerance
                }
            }
            AlignmentRule::Loose => (1.0 - dy / (2.0 * tolerance)).max(0.0),
        }
    }
}

/// Utility bonus per horizontal distance band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandBonus {
    pub near: f32,
    pub mid: f32,
    pub far: f32,
}

/// Decision data for one ability slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillProfile {
    pub name: String,
    pub base_utility: f32,
    /// Maximum horizontal reach
    pub range: f32,
    pub band_bonus: BandBonus,
    pub alignment: AlignmentRule,
}

/// Design table indexed by loadout slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillTable {
    pub skills: Vec<SkillProfile>,
}

impl SkillTable {
    pub fn get(&self, index: usize) -> Option<&SkillProfile> {
        self.skills.get(index)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

impl Default for SkillTable {
    fn default() -> Self {
        let skill = |name: &str, base, range, near, mid, far, alignment| SkillProfile {
            name: name.to_string(),
            base_utility: base,
            range,
            band_bonus: BandBonus { near, mid, far },
            alignment,
        };

        Self {
            skills: vec![
                skill("Basic Attack", 30.0, 4.5, 10.0, 0.0, -30.0, AlignmentRule::Strict { cutoff: 1.5 }),
                skill("Cleave", 55.0, 4.0, 20.0, -40.0, -60.0, AlignmentRule::Scaled),
                skill("Shockwave", 50.0, 8.0, 5.0, 15.0, -20.0, AlignmentRule::Loose),
                skill("Frost Snare", 35.0, 7.0, 10.0, 5.0, -20.0, AlignmentRule::Scaled),
                skill("Piercing Shot", 60.0, 14.0, -20.0, 5.0, 20.0, AlignmentRule::Strict { cutoff: 1.8 }),
            ],
        }
    }
}

// ============================================================================
// Tuning file
// ============================================================================

/// Root structure of `hero_tuning.ron`. Missing tiers keep their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TuningFile {
    #[serde(default)]
    pub tiers: HashMap<DifficultyTier, TierTuning>,
    #[serde(default)]
    pub skills: Option<SkillTable>,
}

impl TuningFile {
    /// Configuration for `tier`, preferring the file's override.
    pub fn config_for(&self, tier: DifficultyTier) -> Result<AgentConfig, AgentError> {
        match self.tiers.get(&tier) {
            Some(tuning) => AgentConfig::from_tuning(tier, tuning),
            None => Ok(AgentConfig::for_tier(tier)),
        }
    }

    /// Skill table from the file, or the built-in one.
    pub fn skill_table(&self) -> SkillTable {
        self.skills.clone().unwrap_or_default()
    }

    /// Parse and validate a tuning file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let file: TuningFile = ron::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        for tier in file.tiers.keys() {
            file.config_for(*tier)?;
        }
        if file.skills.as_ref().is_some_and(|table| table.is_empty()) {
            return Err(ConfigError::Invalid("skill table must not be empty".to_string()));
        }

        info!(
            "Loaded hero tuning from {:?} ({} tier overrides)",
            path,
            file.tiers.len()
        );
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tiers_are_valid() {
        for tier in DifficultyTier::all() {
            let config = AgentConfig::from_tuning(*tier, &tier.default_tuning());
            assert!(config.is_ok(), "{:?} tuning should validate", tier);
        }
    }

    #[test]
    fn test_harder_tiers_react_faster() {
        let tiers = DifficultyTier::all();
        for pair in tiers.windows(2) {
            let easier = AgentConfig::for_tier(pair[0]);
            let harder = AgentConfig::for_tier(pair[1]);
            assert!(harder.reaction_time < easier.reaction_time);
            assert!(harder.suboptimal_pick_chance < easier.suboptimal_pick_chance);
            assert!(harder.targeting_accuracy >= easier.targeting_accuracy);
        }
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut tuning = DifficultyTier::Normal.default_tuning();
        tuning.safe_threshold = 0.2;
        tuning.retreat_threshold = 0.4;
        let result = AgentConfig::from_tuning(DifficultyTier::Normal, &tuning);
        assert!(matches!(result, Err(AgentError::InvalidTuning { .. })));
    }

    #[test]
    fn test_basic_attack_cutoff() {
        let table = SkillTable::default();
        let basic = table.get(BASIC_ATTACK).map(|s| s.alignment);
        assert_eq!(basic, Some(AlignmentRule::Strict { cutoff: 1.5 }));
        assert_eq!(AlignmentRule::Strict { cutoff: 1.5 }.factor(2.0, 2.5), 0.0);
        assert!(AlignmentRule::Strict { cutoff: 1.5 }.factor(1.0, 2.5) > 0.0);
    }

    #[test]
    fn test_loose_alignment_tolerates_more() {
        let tolerance = 1.5;
        let dy = 2.0;
        assert_eq!(AlignmentRule::Scaled.factor(dy, tolerance), 0.0);
        assert!(AlignmentRule::Loose.factor(dy, tolerance) > 0.0);
    }

    #[test]
    fn test_tuning_file_parses_partial_override() {
        let source = r#"(
            tiers: {
                Easy: (
                    reaction_time: 0.8,
                    retreat_threshold: 0.2,
                    safe_threshold: 0.5,
                    ideal_range: 6.5,
                    targeting_accuracy: 0.4,
                    suboptimal_pick_chance: 0.4,
                    heal_interval: 0.25,
                    heal_amount: 0.5,
                    respawn_delay: 7.0,
                ),
            },
        )"#;
        let file: TuningFile = ron::from_str(source).expect("tuning should parse");
        let easy = file.config_for(DifficultyTier::Easy).expect("easy override is valid");
        assert_eq!(easy.reaction_time, 0.8);
        let hard = file.config_for(DifficultyTier::Hard).expect("hard falls back");
        assert_eq!(hard, AgentConfig::for_tier(DifficultyTier::Hard));
        assert_eq!(file.skill_table(), SkillTable::default());
    }
}
