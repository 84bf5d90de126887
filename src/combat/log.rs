//! Combat logging
//!
//! Records every battlefield event for post-match analysis. Headless runs
//! write the log, together with [`MatchMetadata`], to a JSON file.

use std::path::{Path, PathBuf};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::hero_ai::ConfigError;

/// Default directory for saved match logs.
pub const DEFAULT_LOG_DIR: &str = "match_logs";

/// A single entry in the combat log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatLogEntry {
    /// Timestamp in match time (seconds since match start)
    pub timestamp: f32,
    /// The type of event
    pub event_type: CombatLogEventType,
    /// Human-readable description of the event
    pub message: String,
}

impl CombatLogEntry {
    /// One line of text, e.g. `[  12.35] STATE West Bruiser: Advance -> Engage`
    pub fn format_line(&self) -> String {
        format!("[{:>7.2}] {} {}", self.timestamp, self.event_type.tag(), self.message)
    }
}

/// Types of combat log events for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatLogEventType {
    /// Damage dealt
    Damage,
    /// Healing done
    Healing,
    /// Ability used
    AbilityUsed,
    /// Stun applied or cast interrupted
    CrowdControl,
    /// Hero or unit died
    Death,
    Respawn,
    /// Hero agent changed state
    StateChange,
    /// Hero agent acquired or lost a target
    Targeting,
    /// Idle watchdog intervened
    Recovery,
    /// Match event (start, waves, end)
    MatchEvent,
}

impl CombatLogEventType {
    /// Short upper-case tag used in text output.
    pub fn tag(self) -> &'static str {
        match self {
            CombatLogEventType::Damage => "DMG",
            CombatLogEventType::Healing => "HEAL",
            CombatLogEventType::AbilityUsed => "CAST",
            CombatLogEventType::CrowdControl => "CC",
            CombatLogEventType::Death => "DEATH",
            CombatLogEventType::Respawn => "SPAWN",
            CombatLogEventType::StateChange => "STATE",
            CombatLogEventType::Targeting => "TARGET",
            CombatLogEventType::Recovery => "IDLE",
            CombatLogEventType::MatchEvent => "MATCH",
        }
    }
}

/// Final state of one hero, saved alongside the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroMetadata {
    pub faction: String,
    pub archetype: String,
    pub difficulty: String,
    pub max_health: f32,
    pub final_health: f32,
    pub final_state: String,
    pub damage_dealt: f32,
    pub damage_taken: f32,
    pub kills: u32,
    pub deaths: u32,
    pub final_position: (f32, f32),
}

/// Match summary saved alongside the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMetadata {
    pub map_name: String,
    /// Winning faction name, `None` for a draw
    pub winner: Option<String>,
    pub match_time: f32,
    pub random_seed: Option<u64>,
    pub heroes: Vec<HeroMetadata>,
}

#[derive(Serialize)]
struct SavedLog<'a> {
    metadata: &'a MatchMetadata,
    entries: &'a [CombatLogEntry],
}

/// The combat log resource storing all events
#[derive(Resource, Debug, Clone, Default)]
pub struct CombatLog {
    /// All log entries in chronological order
    pub entries: Vec<CombatLogEntry>,
    /// Current match time
    pub match_time: f32,
}

impl CombatLog {
    /// Clear the log for a new match
    pub fn clear(&mut self) {
        self.entries.clear();
        self.match_time = 0.0;
    }

    /// Add a new entry to the log
    pub fn log(&mut self, event_type: CombatLogEventType, message: String) {
        self.entries.push(CombatLogEntry {
            timestamp: self.match_time,
            event_type,
            message,
        });
    }

    /// Get entries filtered by event type
    pub fn filter_by_type(&self, event_type: CombatLogEventType) -> Vec<&CombatLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Get only HP-changing events (damage and healing)
    pub fn hp_changes_only(&self) -> Vec<&CombatLogEntry> {
        self.entries
            .iter()
            .filter(|e| {
                matches!(
                    e.event_type,
                    CombatLogEventType::Damage | CombatLogEventType::Healing
                )
            })
            .collect()
    }

    /// Get the last N entries
    pub fn recent(&self, count: usize) -> Vec<&CombatLogEntry> {
        self.entries.iter().rev().take(count).rev().collect()
    }

    /// Whole log as text, one entry per line.
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(CombatLogEntry::format_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write metadata and entries as JSON. Without an explicit path the file
    /// goes to [`DEFAULT_LOG_DIR`], named after the seed or the match time.
    /// Returns the path written.
    pub fn save_to_file(&self, metadata: &MatchMetadata, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let name = match metadata.random_seed {
                    Some(seed) => format!("match_seed_{}.json", seed),
                    None => format!("match_{:.0}s_{}.json", metadata.match_time, self.entries.len()),
                };
                Path::new(DEFAULT_LOG_DIR).join(name)
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let saved = SavedLog {
            metadata,
            entries: &self.entries,
        };
        let json = serde_json::to_string_pretty(&saved)?;
        std::fs::write(&path, json).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_take_current_match_time() {
        let mut log = CombatLog::default();
        log.match_time = 4.5;
        log.log(CombatLogEventType::Death, "West Minion died".to_string());
        assert_eq!(log.entries[0].timestamp, 4.5);
        assert_eq!(log.entries[0].format_line(), "[   4.50] DEATH West Minion died");
    }

    #[test]
    fn test_recent_keeps_order() {
        let mut log = CombatLog::default();
        for i in 0..5 {
            log.log(CombatLogEventType::MatchEvent, format!("event {}", i));
        }
        let recent: Vec<_> = log.recent(2).iter().map(|e| e.message.clone()).collect();
        assert_eq!(recent, vec!["event 3", "event 4"]);
    }
}
