//! JSON configuration parsing for headless mode
//!
//! Parses JSON match configurations and converts them to a [`BattlefieldConfig`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::battlefield::{BattlefieldConfig, HeroSetup, LaneMap};
use crate::hero_ai::{ConfigError, DifficultyTier, HeroArchetype, TuningFile};

/// One side's hero as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeroEntry {
    /// "Bruiser", "Marksman" or "Mage"
    pub archetype: String,
    /// "Easy", "Normal", "Hard" or "Expert" (default: "Normal")
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    /// Set to false for a hero that never moves (default: true)
    #[serde(default = "default_ai_enabled")]
    pub ai_enabled: bool,
}

/// Headless match configuration loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessMatchConfig {
    pub west: HeroEntry,
    pub east: HeroEntry,
    /// Maximum match duration in seconds (default: 300)
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: f32,
    /// Seconds between minion waves (default: 20)
    #[serde(default = "default_wave_interval")]
    pub wave_interval_secs: f32,
    /// Random seed for deterministic match reproduction
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Custom output path for match log (optional)
    #[serde(default)]
    pub output_path: Option<String>,
    /// RON file overriding the built-in hero tuning (optional)
    #[serde(default)]
    pub tuning_path: Option<String>,
}

fn default_difficulty() -> String {
    "Normal".to_string()
}

fn default_ai_enabled() -> bool {
    true
}

fn default_max_duration() -> f32 {
    300.0
}

fn default_wave_interval() -> f32 {
    20.0
}

impl Default for HeadlessMatchConfig {
    fn default() -> Self {
        Self {
            west: HeroEntry {
                archetype: "Bruiser".to_string(),
                difficulty: default_difficulty(),
                ai_enabled: true,
            },
            east: HeroEntry {
                archetype: "Marksman".to_string(),
                difficulty: default_difficulty(),
                ai_enabled: true,
            },
            max_duration_secs: default_max_duration(),
            wave_interval_secs: default_wave_interval(),
            random_seed: None,
            output_path: None,
            tuning_path: None,
        }
    }
}

impl HeadlessMatchConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: HeadlessMatchConfig = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for entry in [&self.west, &self.east] {
            Self::parse_archetype(&entry.archetype)?;
            Self::parse_difficulty(&entry.difficulty)?;
        }

        if self.max_duration_secs <= 0.0 {
            return Err(ConfigError::Invalid("max_duration_secs must be positive".to_string()));
        }
        if self.wave_interval_secs <= 0.0 {
            return Err(ConfigError::Invalid("wave_interval_secs must be positive".to_string()));
        }

        Ok(())
    }

    /// Parse an archetype name
    fn parse_archetype(name: &str) -> Result<HeroArchetype, ConfigError> {
        HeroArchetype::all()
            .iter()
            .copied()
            .find(|archetype| archetype.name() == name)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "Unknown archetype: '{}'. Valid archetypes: Bruiser, Marksman, Mage",
                    name
                ))
            })
    }

    /// Parse a difficulty tier name
    fn parse_difficulty(name: &str) -> Result<DifficultyTier, ConfigError> {
        DifficultyTier::all()
            .iter()
            .copied()
            .find(|tier| tier.name() == name)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "Unknown difficulty: '{}'. Valid tiers: Easy, Normal, Hard, Expert",
                    name
                ))
            })
    }

    fn hero_setup(entry: &HeroEntry) -> Result<HeroSetup, ConfigError> {
        Ok(HeroSetup {
            archetype: Self::parse_archetype(&entry.archetype)?,
            difficulty: Self::parse_difficulty(&entry.difficulty)?,
            ai_enabled: entry.ai_enabled,
        })
    }

    /// Convert to the battlefield's config, loading the tuning file if set.
    pub fn to_battlefield_config(&self) -> Result<BattlefieldConfig, ConfigError> {
        self.validate()?;

        let tuning = match &self.tuning_path {
            Some(path) => TuningFile::load(Path::new(path))?,
            None => TuningFile::default(),
        };

        Ok(BattlefieldConfig {
            west: Self::hero_setup(&self.west)?,
            east: Self::hero_setup(&self.east)?,
            map: LaneMap::standard(),
            wave_interval: self.wave_interval_secs,
            max_duration: self.max_duration_secs,
            seed: self.random_seed,
            tuning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let json = r#"{
            "west": { "archetype": "Mage", "difficulty": "Hard" },
            "east": { "archetype": "Bruiser" },
            "max_duration_secs": 120,
            "random_seed": 7
        }"#;

        let config: HeadlessMatchConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.east.difficulty, "Normal");
        assert!(config.west.ai_enabled);

        let battlefield = config.to_battlefield_config().unwrap();
        assert_eq!(battlefield.west.archetype, HeroArchetype::Mage);
        assert_eq!(battlefield.west.difficulty, DifficultyTier::Hard);
        assert_eq!(battlefield.seed, Some(7));
    }

    #[test]
    fn test_invalid_archetype() {
        let json = r#"{
            "west": { "archetype": "Paladin" },
            "east": { "archetype": "Mage" }
        }"#;

        let config: HeadlessMatchConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_duration() {
        let config = HeadlessMatchConfig {
            max_duration_secs: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
