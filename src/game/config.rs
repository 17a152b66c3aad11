//! Tuning constants for a session, loadable from a partial JSON file.

use std::fs;
use std::path::Path;

use anyhow::Context;
use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::{TrackConfig, WorldKind};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("click.min_interval ({min}) exceeds click.base_interval ({base})")]
    IntervalFloorAboveBase { base: f64, min: f64 },
    #[error("shop.growth_factor must be at least 1.01, got {0}")]
    GrowthFactorTooLow(f64),
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub base_reward: f64,
    /// Seconds between automatic rewards before any upgrade.
    pub base_interval: f64,
    pub min_interval: f64,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            base_reward: 10.0,
            base_interval: 10.0,
            min_interval: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub enabled: bool,
    pub interval: f64,
    pub max_pieces: usize,
    pub half_width: f32,
    pub half_height: f32,
    pub clearance_radius: f32,
    pub placement_attempts: u32,
    pub spawn_z: f32,
    pub spawn_initial_piece: bool,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 10.0,
            max_pieces: 12,
            half_width: 6.0,
            half_height: 4.0,
            clearance_radius: 1.2,
            placement_attempts: 10,
            spawn_z: -1.0,
            spawn_initial_piece: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Pieces at or above this stage live in the secondary world.
    pub secondary_stage: u32,
    /// The world toggle unlocks once a stage strictly exceeds this value.
    pub unlock_stage: u32,
}

impl WorldConfig {
    pub fn world_for_stage(&self, stage: u32) -> WorldKind {
        if stage >= self.secondary_stage {
            WorldKind::Secondary
        } else {
            WorldKind::Primary
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            secondary_stage: 11,
            unlock_stage: 11,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    pub base_price: f64,
    pub price_increment: f64,
    pub growth_factor: f64,
    pub max_stage: u32,
    /// How many stages the shop trails behind the best piece.
    pub visible_gap: u32,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            base_price: 25.0,
            price_increment: 25.0,
            growth_factor: 1.15,
            max_stage: 20,
            visible_gap: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    pub auto_click: TrackConfig,
    pub auto_click_reduction: f64,
    pub auto_spawn: TrackConfig,
    pub auto_spawn_initial_interval: f64,
    pub auto_spawn_reduction: f64,
    pub min_spawn_interval: f64,
    pub coin_multiplier: TrackConfig,
    pub coin_multiplier_increase: f64,
    pub coin_multiplier_decay: f64,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            auto_click: TrackConfig {
                initial_price: 100,
                price_multiplier: 2.0,
                max_purchases: Some(10),
            },
            auto_click_reduction: 1.0,
            auto_spawn: TrackConfig {
                initial_price: 10_000,
                price_multiplier: 2.0,
                max_purchases: None,
            },
            auto_spawn_initial_interval: 10.0,
            auto_spawn_reduction: 1.0,
            min_spawn_interval: 1.0,
            coin_multiplier: TrackConfig {
                initial_price: 100,
                price_multiplier: 2.0,
                max_purchases: Some(25),
            },
            coin_multiplier_increase: 0.2,
            coin_multiplier_decay: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Seconds a freshly promoted piece stays locked against another merge.
    pub pulse_duration: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            pulse_duration: 0.3,
        }
    }
}

#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub click: ClickConfig,
    pub spawn: SpawnConfig,
    pub world: WorldConfig,
    pub shop: ShopConfig,
    pub upgrades: UpgradeConfig,
    pub fusion: FusionConfig,
    pub rng_seed: Option<u64>,
    pub event_log_capacity: usize,
    /// Emit the colored session pulse every N ticks; 0 disables it.
    pub pulse_log_every: u64,
    /// Longest stretch of time, in seconds, a single tick may cover.
    pub max_tick_delta: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            click: ClickConfig::default(),
            spawn: SpawnConfig::default(),
            world: WorldConfig::default(),
            shop: ShopConfig::default(),
            upgrades: UpgradeConfig::default(),
            fusion: FusionConfig::default(),
            rng_seed: None,
            event_log_capacity: 256,
            pulse_log_every: 600,
            max_tick_delta: 60.0,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

impl GameConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: GameConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("click.base_reward", self.click.base_reward)?;
        positive("click.base_interval", self.click.base_interval)?;
        positive("click.min_interval", self.click.min_interval)?;
        if self.click.min_interval > self.click.base_interval {
            return Err(ConfigError::IntervalFloorAboveBase {
                base: self.click.base_interval,
                min: self.click.min_interval,
            });
        }

        positive("spawn.interval", self.spawn.interval)?;
        positive("spawn.half_width", self.spawn.half_width as f64)?;
        positive("spawn.half_height", self.spawn.half_height as f64)?;
        if self.spawn.max_pieces == 0 {
            return Err(ConfigError::Zero("spawn.max_pieces"));
        }

        positive("shop.base_price", self.shop.base_price)?;
        positive("shop.price_increment", self.shop.price_increment)?;
        if !(self.shop.growth_factor >= 1.01) {
            return Err(ConfigError::GrowthFactorTooLow(self.shop.growth_factor));
        }
        if self.shop.max_stage == 0 {
            return Err(ConfigError::Zero("shop.max_stage"));
        }

        positive("upgrades.min_spawn_interval", self.upgrades.min_spawn_interval)?;
        positive(
            "upgrades.auto_spawn_initial_interval",
            self.upgrades.auto_spawn_initial_interval,
        )?;
        if self.world.unlock_stage == 0 {
            return Err(ConfigError::Zero("world.unlock_stage"));
        }
        positive("max_tick_delta", self.max_tick_delta)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(GameConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: GameConfig =
            serde_json::from_str(r#"{ "click": { "base_reward": 3.0 }, "rng_seed": 9 }"#).unwrap();
        assert_eq!(config.click.base_reward, 3.0);
        assert_eq!(config.click.base_interval, 10.0);
        assert_eq!(config.spawn.max_pieces, 12);
        assert_eq!(config.rng_seed, Some(9));
    }

    #[test]
    fn rejects_floor_above_base() {
        let mut config = GameConfig::default();
        config.click.min_interval = 20.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IntervalFloorAboveBase { .. })
        ));
    }

    #[test]
    fn rejects_flat_growth() {
        let mut config = GameConfig::default();
        config.shop.growth_factor = 1.0;
        assert_eq!(config.validate(), Err(ConfigError::GrowthFactorTooLow(1.0)));
    }

    #[test]
    fn rejects_unbounded_tick_delta() {
        let mut config = GameConfig::default();
        config.max_tick_delta = f64::INFINITY;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                field: "max_tick_delta",
                ..
            })
        ));
        config.max_tick_delta = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn world_for_stage_splits_at_secondary_stage() {
        let world = WorldConfig::default();
        assert_eq!(world.world_for_stage(10), WorldKind::Primary);
        assert_eq!(world.world_for_stage(11), WorldKind::Secondary);
    }
}
