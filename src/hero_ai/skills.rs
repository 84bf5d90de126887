//! Combat Decision Engine
//!
//! Given a locked target, decides whether the agent should cast, back off or
//! reposition, and if casting, which ability.
//!
//! Combat geometry is lane-like: horizontal reach and vertical alignment are
//! judged separately rather than by Euclidean distance.
//!
//! ## Priority inside the melee band
//! 1. Melee skill (if ready and aligned)
//! 2. Basic attack (if ready and roughly aligned)
//! 3. Back off horizontally toward the ideal range
//!
//! Outside the band every ability is scored with [`CombatDecisionEngine::evaluate_all_skills`].

use bevy::prelude::*;
use smallvec::SmallVec;

use super::collaborators::AbilitySystem;
use super::constants::{
    APPROACH_SLACK, FAR_ALIGNMENT_DISTANCE, FAR_ALIGNMENT_TOLERANCE_MAX,
    FAR_ALIGNMENT_TOLERANCE_MIN, MELEE_BAND, MID_BAND, NEAR_ALIGNMENT_TOLERANCE,
    POSITION_CHANGE_COOLDOWN,
};
use super::difficulty::{AlignmentRule, SkillTable, BASIC_ATTACK, MELEE_SKILL};

/// Utility reported for abilities that are not ready.
pub const NOT_READY: f32 = -1.0;

/// Horizontal distance band used for skill bonuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceBand {
    Near,
    Mid,
    Far,
}

impl DistanceBand {
    pub fn classify(horizontal: f32) -> Self {
        if horizontal < MELEE_BAND {
            DistanceBand::Near
        } else if horizontal < MID_BAND {
            DistanceBand::Mid
        } else {
            DistanceBand::Far
        }
    }
}

/// Vertical mismatch tolerated at a given horizontal distance. Close
/// engagements forgive more.
pub fn alignment_tolerance(horizontal: f32) -> f32 {
    if horizontal < MELEE_BAND {
        return NEAR_ALIGNMENT_TOLERANCE;
    }
    let t = ((horizontal - MELEE_BAND) / (FAR_ALIGNMENT_DISTANCE - MELEE_BAND)).clamp(0.0, 1.0);
    FAR_ALIGNMENT_TOLERANCE_MAX + (FAR_ALIGNMENT_TOLERANCE_MIN - FAR_ALIGNMENT_TOLERANCE_MAX) * t
}

/// The chosen ability and why.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkillDecision {
    pub ability: usize,
    pub utility: f32,
}

/// What the engine wants the agent to do this decision pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CombatAction {
    Cast(SkillDecision),
    /// Step back along the lane to this point
    BackOff(Vec2),
    /// Range or line of sight is unacceptable; move to a better spot
    Reposition,
    /// Nothing useful to do right now
    Hold,
}

/// Scores abilities against a target and owns the position-change cooldown.
#[derive(Debug, Clone)]
pub struct CombatDecisionEngine {
    skills: SkillTable,
    position_cooldown: f32,
}

impl CombatDecisionEngine {
    pub fn new(skills: SkillTable) -> Self {
        Self {
            skills,
            position_cooldown: 0.0,
        }
    }

    pub fn skills(&self) -> &SkillTable {
        &self.skills
    }

    /// Advance the position-change cooldown.
    pub fn tick(&mut self, dt: f32) {
        self.position_cooldown = (self.position_cooldown - dt).max(0.0);
    }

    pub fn can_reposition(&self) -> bool {
        self.position_cooldown <= 0.0
    }

    pub fn mark_repositioned(&mut self) {
        self.position_cooldown = POSITION_CHANGE_COOLDOWN;
    }

    pub fn reset(&mut self) {
        self.position_cooldown = 0.0;
    }

    /// Utility of every loadout slot; [`NOT_READY`] for abilities on cooldown.
    pub fn evaluate_all_skills(
        &self,
        abilities: &dyn AbilitySystem,
        horizontal: f32,
        vertical: f32,
    ) -> SmallVec<[f32; 8]> {
        let band = DistanceBand::classify(horizontal);
        let tolerance = alignment_tolerance(horizontal);
        let count = abilities.ability_count().min(self.skills.len());

        (0..count)
            .map(|index| {
                if !abilities.is_ready(index) {
                    return NOT_READY;
                }
                let Some(profile) = self.skills.get(index) else {
                    return 0.0;
                };
                if horizontal > profile.range {
                    return 0.0;
                }
                let bonus = match band {
                    DistanceBand::Near => profile.band_bonus.near,
                    DistanceBand::Mid => profile.band_bonus.mid,
                    DistanceBand::Far => profile.band_bonus.far,
                };
                let utility = (profile.base_utility + bonus) * profile.alignment.factor(vertical, tolerance);
                utility.max(0.0)
            })
            .collect()
    }

    /// Highest strictly positive utility, if any.
    pub fn best_skill(values: &[f32]) -> Option<SkillDecision> {
        values
            .iter()
            .enumerate()
            .filter(|(_, utility)| **utility > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(ability, utility)| SkillDecision {
                ability,
                utility: *utility,
            })
    }

    /// Vertical cutoff for the basic attack, from the design table.
    fn basic_attack_cutoff(&self) -> f32 {
        match self.skills.get(BASIC_ATTACK).map(|s| s.alignment) {
            Some(AlignmentRule::Strict { cutoff }) => cutoff,
            _ => 1.5,
        }
    }

    /// Is the current spot good enough to fight from?
    pub fn engagement_acceptable(&self, horizontal: f32, vertical: f32, ideal_range: f32, line_of_sight: bool) -> bool {
        line_of_sight
            && horizontal <= ideal_range + APPROACH_SLACK
            && vertical.abs() <= alignment_tolerance(horizontal)
    }

    /// Resolve movement-vs-cast against a live target.
    pub fn decide(
        &self,
        abilities: &dyn AbilitySystem,
        me: Vec2,
        target: Vec2,
        ideal_range: f32,
        line_of_sight: bool,
    ) -> CombatAction {
        let horizontal = (target.x - me.x).abs();
        let vertical = (target.y - me.y).abs();

        if horizontal < MELEE_BAND {
            let tolerance = alignment_tolerance(horizontal);
            if abilities.is_ready(MELEE_SKILL) && vertical <= tolerance {
                return CombatAction::Cast(SkillDecision {
                    ability: MELEE_SKILL,
                    utility: self.skills.get(MELEE_SKILL).map_or(0.0, |s| s.base_utility),
                });
            }
            if abilities.is_ready(BASIC_ATTACK) && vertical <= self.basic_attack_cutoff() {
                return CombatAction::Cast(SkillDecision {
                    ability: BASIC_ATTACK,
                    utility: self.skills.get(BASIC_ATTACK).map_or(0.0, |s| s.base_utility),
                });
            }
            let side = if target.x >= me.x { 1.0 } else { -1.0 };
            return CombatAction::BackOff(Vec2::new(target.x - side * ideal_range, me.y));
        }

        if !self.engagement_acceptable(horizontal, vertical, ideal_range, line_of_sight) && self.can_reposition() {
            return CombatAction::Reposition;
        }

        let values = self.evaluate_all_skills(abilities, horizontal, vertical);
        if let Some(decision) = Self::best_skill(&values) {
            return CombatAction::Cast(decision);
        }
        if abilities.is_ready(BASIC_ATTACK) && vertical <= self.basic_attack_cutoff() {
            return CombatAction::Cast(SkillDecision {
                ability: BASIC_ATTACK,
                utility: 0.0,
            });
        }
        if self.can_reposition() {
            return CombatAction::Reposition;
        }
        CombatAction::Hold
    }
}

impl Default for CombatDecisionEngine {
    fn default() -> Self {
        Self::new(SkillTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hero_ai::difficulty::{AREA_SKILL, LONG_SHOT};

    struct Loadout {
        ready: [bool; 5],
    }

    impl AbilitySystem for Loadout {
        fn ability_count(&self) -> usize {
            5
        }
        fn is_ready(&self, index: usize) -> bool {
            self.ready.get(index).copied().unwrap_or(false)
        }
        fn activate(&mut self, _index: usize) {}
        fn cast_time(&self, _index: usize) -> f32 {
            0.3
        }
    }

    fn all_ready() -> Loadout {
        Loadout { ready: [true; 5] }
    }

    #[test]
    fn test_tolerance_shrinks_with_distance() {
        assert_eq!(alignment_tolerance(1.0), 2.5);
        let mid = alignment_tolerance(6.0);
        assert!(mid < 1.8 && mid > 1.2);
        assert_eq!(alignment_tolerance(30.0), 1.2);
    }

    #[test]
    fn test_unready_abilities_score_minus_one() {
        let engine = CombatDecisionEngine::default();
        let loadout = Loadout { ready: [true, false, true, false, true] };
        let values = engine.evaluate_all_skills(&loadout, 6.0, 0.0);
        assert_eq!(values[1], NOT_READY);
        assert_eq!(values[3], NOT_READY);
        assert!(values[2] > 0.0);
    }

    #[test]
    fn test_basic_attack_zeroed_beyond_cutoff() {
        let engine = CombatDecisionEngine::default();
        let values = engine.evaluate_all_skills(&all_ready(), 4.2, 2.0);
        assert_eq!(values[BASIC_ATTACK], 0.0);
    }

    #[test]
    fn test_melee_ladder_prefers_melee_skill() {
        let engine = CombatDecisionEngine::default();
        let action = engine.decide(&all_ready(), Vec2::ZERO, Vec2::new(2.0, 0.5), 5.0, true);
        assert!(matches!(action, CombatAction::Cast(SkillDecision { ability: MELEE_SKILL, .. })));
    }

    #[test]
    fn test_melee_ladder_falls_back_to_basic_attack() {
        let engine = CombatDecisionEngine::default();
        let loadout = Loadout { ready: [true, false, true, true, true] };
        let action = engine.decide(&loadout, Vec2::ZERO, Vec2::new(2.0, 0.5), 5.0, true);
        assert!(matches!(action, CombatAction::Cast(SkillDecision { ability: BASIC_ATTACK, .. })));
    }

    #[test]
    fn test_melee_ladder_backs_off_when_nothing_ready() {
        let engine = CombatDecisionEngine::default();
        let loadout = Loadout { ready: [false, false, true, true, true] };
        let action = engine.decide(&loadout, Vec2::new(10.0, 1.0), Vec2::new(12.0, 1.0), 5.0, true);
        assert_eq!(action, CombatAction::BackOff(Vec2::new(7.0, 1.0)));
    }

    #[test]
    fn test_far_target_prefers_long_shot() {
        let engine = CombatDecisionEngine::default();
        let values = engine.evaluate_all_skills(&all_ready(), 10.0, 0.0);
        let best = CombatDecisionEngine::best_skill(&values).map(|d| d.ability);
        assert_eq!(best, Some(LONG_SHOT));
    }

    #[test]
    fn test_mid_range_misaligned_prefers_area() {
        let engine = CombatDecisionEngine::default();
        let values = engine.evaluate_all_skills(&all_ready(), 5.0, 1.9);
        let best = CombatDecisionEngine::best_skill(&values).map(|d| d.ability);
        assert_eq!(best, Some(AREA_SKILL));
    }

    #[test]
    fn test_blocked_sight_requests_reposition_once_per_cooldown() {
        let mut engine = CombatDecisionEngine::default();
        let action = engine.decide(&all_ready(), Vec2::ZERO, Vec2::new(6.0, 0.0), 5.0, false);
        assert_eq!(action, CombatAction::Reposition);

        engine.mark_repositioned();
        let action = engine.decide(&all_ready(), Vec2::ZERO, Vec2::new(6.0, 0.0), 5.0, false);
        assert!(matches!(action, CombatAction::Cast(_)));

        engine.tick(POSITION_CHANGE_COOLDOWN);
        assert!(engine.can_reposition());
    }

    #[test]
    fn test_misaligned_basic_attack_never_cast_as_fallback() {
        let mut engine = CombatDecisionEngine::default();
        let only_basic = Loadout { ready: [true, false, false, false, false] };
        let target = Vec2::new(4.2, 2.0);

        engine.mark_repositioned();
        let values = engine.evaluate_all_skills(&only_basic, 4.2, 2.0);
        assert_eq!(values[BASIC_ATTACK], 0.0);
        assert_eq!(engine.decide(&only_basic, Vec2::ZERO, target, 5.5, true), CombatAction::Hold);

        engine.tick(POSITION_CHANGE_COOLDOWN);
        assert_eq!(engine.decide(&only_basic, Vec2::ZERO, target, 5.5, true), CombatAction::Reposition);
    }

    #[test]
    fn test_aligned_basic_attack_still_used_as_fallback() {
        let engine = CombatDecisionEngine::default();
        let only_basic = Loadout { ready: [true, false, false, false, false] };
        // Beyond basic attack range, so its utility is zero, but on the row.
        let action = engine.decide(&only_basic, Vec2::ZERO, Vec2::new(5.0, 0.5), 5.5, true);
        assert_eq!(
            action,
            CombatAction::Cast(SkillDecision {
                ability: BASIC_ATTACK,
                utility: 0.0,
            })
        );
    }
}
