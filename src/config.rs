use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::game::FairnessKey;
use crate::scoring::{BadgeThresholds, FeedConfig, ReachConfig, ShareConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub claim_window_days: i64,
    pub delivery_window_days: i64,
    pub default_duration_hours: i64,
    /// Upper bound on a requested game duration.
    pub max_duration_hours: i64,
    pub max_winners: u32,
    /// 32-byte key, hex encoded. Seals winning values until reveal.
    pub fairness_key: Option<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            claim_window_days: 14,
            delivery_window_days: 7,
            default_duration_hours: 24,
            max_duration_hours: 24 * 90,
            max_winners: 1_000,
            fairness_key: None,
        }
    }
}

impl GameConfig {
    pub fn claim_window(&self) -> Duration {
        Duration::days(self.claim_window_days)
    }

    pub fn delivery_window(&self) -> Duration {
        Duration::days(self.delivery_window_days)
    }

    pub fn default_duration(&self) -> Duration {
        Duration::hours(self.default_duration_hours)
    }

    pub fn fairness_key(&self) -> EngineResult<FairnessKey> {
        let encoded = self
            .fairness_key
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| EngineError::Config("GAME_FAIRNESS_KEY is not set".to_string()))?;
        FairnessKey::from_hex(encoded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub reach: ReachConfig,
    pub share: ShareConfig,
    pub badges: BadgeThresholds,
    pub feed: FeedConfig,
    pub game: GameConfig,
}

impl EngineConfig {
    pub fn load(path: Option<PathBuf>) -> EngineResult<(Self, Option<PathBuf>)> {
        let config_path = path.or_else(default_config_path);
        let mut config = if let Some(path) = config_path.as_ref() {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .map_err(|err| EngineError::Config(format!("failed to read config: {}", err)))?;
                toml::from_str(&contents)
                    .map_err(|err| EngineError::Config(format!("failed to parse config: {}", err)))?
            } else {
                EngineConfig::default()
            }
        } else {
            EngineConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok((config, config_path))
    }

    pub fn write(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| EngineError::Config(format!("failed to create config dir: {}", err)))?;
        }
        let payload = toml::to_string_pretty(self)
            .map_err(|err| EngineError::Config(format!("failed to serialize config: {}", err)))?;
        std::fs::write(path, payload)
            .map_err(|err| EngineError::Config(format!("failed to write config: {}", err)))?;
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !self.badges.is_ascending() {
            return Err(EngineError::Config(format!(
                "badge thresholds must ascend: {:?}",
                self.badges
            )));
        }
        if self.game.claim_window_days <= 0 || self.game.delivery_window_days <= 0 {
            return Err(EngineError::Config(
                "claim and delivery windows must be positive".to_string(),
            ));
        }
        if self.game.max_winners == 0 {
            return Err(EngineError::Config("max_winners must be at least 1".to_string()));
        }
        if Duration::try_hours(self.game.max_duration_hours).is_none()
            || self.game.default_duration_hours <= 0
            || self.game.default_duration_hours > self.game.max_duration_hours
        {
            return Err(EngineError::Config(format!(
                "default_duration_hours must be within 1..={} hours",
                self.game.max_duration_hours
            )));
        }
        if self.feed.default_limit == 0 {
            return Err(EngineError::Config("feed default_limit must be greater than 0".to_string()));
        }
        if self.game.fairness_key.is_some() {
            self.game.fairness_key()?;
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var("GAME_FAIRNESS_KEY") {
            if !key.trim().is_empty() {
                self.game.fairness_key = Some(key.trim().to_string());
            }
        }
        if let Ok(cap) = env::var("SHARE_HOURLY_CAP") {
            if let Ok(value) = cap.parse::<u64>() {
                self.share.hourly_cap = value;
            }
        }
        if let Ok(cap) = env::var("SHARE_DAILY_CAP") {
            if let Ok(value) = cap.parse::<u64>() {
                self.share.daily_cap = value;
            }
        }
        if let Ok(limit) = env::var("FEED_DEFAULT_LIMIT") {
            if let Ok(value) = limit.parse::<usize>() {
                self.feed.default_limit = value;
            }
        }
        if let Ok(days) = env::var("GAME_CLAIM_DAYS") {
            if let Ok(value) = days.parse::<i64>() {
                self.game.claim_window_days = value;
            }
        }
        if let Ok(days) = env::var("GAME_DELIVERY_DAYS") {
            if let Ok(value) = days.parse::<i64>() {
                self.game.delivery_window_days = value;
            }
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    env::var("ENGINE_CONFIG_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("config/engine.toml")))
}
