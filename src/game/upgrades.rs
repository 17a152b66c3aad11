//! The three upgrade tracks and their escalating prices.

use std::fmt;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::game::UpgradeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeKind {
    AutoClick,
    AutoSpawn,
    CoinMultiplier,
}

impl UpgradeKind {
    pub fn all() -> [UpgradeKind; 3] {
        [
            UpgradeKind::AutoClick,
            UpgradeKind::AutoSpawn,
            UpgradeKind::CoinMultiplier,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            UpgradeKind::AutoClick => "Auto click",
            UpgradeKind::AutoSpawn => "Auto spawn",
            UpgradeKind::CoinMultiplier => "Coin multiplier",
        }
    }
}

/// What the price label shows: a number, or `MAX` once the track is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTag {
    Price(u64),
    Max,
}

impl fmt::Display for PriceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceTag::Price(price) => write!(f, "{price}$"),
            PriceTag::Max => f.write_str("MAX"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased { price: u64 },
    InsufficientFunds,
    Maxed,
}

impl PurchaseOutcome {
    pub fn is_purchased(&self) -> bool {
        matches!(self, PurchaseOutcome::Purchased { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub initial_price: u64,
    pub price_multiplier: f64,
    /// `None` leaves the track uncapped.
    pub max_purchases: Option<u32>,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            initial_price: 100,
            price_multiplier: 2.0,
            max_purchases: None,
        }
    }
}

pub fn multiply_price(price: u64, multiplier: f64) -> u64 {
    let multiplier = if multiplier.is_finite() {
        multiplier.max(1.0)
    } else {
        1.0
    };
    ((price as f64 * multiplier).ceil() as u64).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeTrack {
    pub purchases: u32,
    pub current_price: u64,
}

impl UpgradeTrack {
    pub fn new(config: &TrackConfig) -> Self {
        Self {
            purchases: 0,
            current_price: config.initial_price.max(1),
        }
    }

    pub fn capped(&self, config: &TrackConfig) -> bool {
        config
            .max_purchases
            .is_some_and(|max| self.purchases >= max)
    }

    /// Counts a purchase and moves to the next price unless that purchase
    /// used up the track.
    pub fn record_purchase(&mut self, config: &TrackConfig) {
        self.purchases += 1;
        if !self.capped(config) {
            self.current_price = multiply_price(self.current_price, config.price_multiplier);
        }
    }

    fn restore(&mut self, purchases: Option<u32>, price: Option<u64>, config: &TrackConfig) {
        if let Some(purchases) = purchases {
            self.purchases = match config.max_purchases {
                Some(max) => purchases.min(max),
                None => purchases,
            };
        }
        if let Some(price) = price {
            self.current_price = price.max(1);
        }
    }
}

#[derive(Debug, Clone, Resource)]
pub struct UpgradeTracks {
    pub auto_click: UpgradeTrack,
    pub auto_spawn: UpgradeTrack,
    pub coin_multiplier: UpgradeTrack,
}

impl UpgradeTracks {
    pub fn new(config: &UpgradeConfig) -> Self {
        Self {
            auto_click: UpgradeTrack::new(&config.auto_click),
            auto_spawn: UpgradeTrack::new(&config.auto_spawn),
            coin_multiplier: UpgradeTrack::new(&config.coin_multiplier),
        }
    }

    pub fn get(&self, kind: UpgradeKind) -> &UpgradeTrack {
        match kind {
            UpgradeKind::AutoClick => &self.auto_click,
            UpgradeKind::AutoSpawn => &self.auto_spawn,
            UpgradeKind::CoinMultiplier => &self.coin_multiplier,
        }
    }

    pub fn get_mut(&mut self, kind: UpgradeKind) -> &mut UpgradeTrack {
        match kind {
            UpgradeKind::AutoClick => &mut self.auto_click,
            UpgradeKind::AutoSpawn => &mut self.auto_spawn,
            UpgradeKind::CoinMultiplier => &mut self.coin_multiplier,
        }
    }

    pub fn save_data(&self) -> UpgradeSaveData {
        UpgradeSaveData {
            auto_click_purchases: Some(self.auto_click.purchases),
            auto_click_price: Some(self.auto_click.current_price),
            auto_spawn_purchases: Some(self.auto_spawn.purchases),
            auto_spawn_price: Some(self.auto_spawn.current_price),
            coin_multiplier_purchases: Some(self.coin_multiplier.purchases),
            coin_multiplier_price: Some(self.coin_multiplier.current_price),
        }
    }

    pub fn apply_save_data(&mut self, data: &UpgradeSaveData, config: &UpgradeConfig) {
        self.auto_click.restore(
            data.auto_click_purchases,
            data.auto_click_price,
            &config.auto_click,
        );
        self.auto_spawn.restore(
            data.auto_spawn_purchases,
            data.auto_spawn_price,
            &config.auto_spawn,
        );
        self.coin_multiplier.restore(
            data.coin_multiplier_purchases,
            data.coin_multiplier_price,
            &config.coin_multiplier,
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeSaveData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_click_purchases: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_click_price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_spawn_purchases: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_spawn_price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin_multiplier_purchases: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin_multiplier_price: Option<u64>,
}

/// Diminishing multiplier gain for the coin track's next purchase.
pub fn coin_multiplier_step(config: &UpgradeConfig, purchases_made: u32) -> f64 {
    config.coin_multiplier_increase / (1.0 + purchases_made as f64 * config.coin_multiplier_decay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_rounds_up() {
        assert_eq!(multiply_price(100, 2.0), 200);
        assert_eq!(multiply_price(7, 1.5), 11);
        assert_eq!(multiply_price(10, 0.5), 10);
    }

    #[test]
    fn capped_track_stops() {
        let config = TrackConfig {
            initial_price: 100,
            price_multiplier: 2.0,
            max_purchases: Some(2),
        };
        let mut track = UpgradeTrack::new(&config);
        track.record_purchase(&config);
        assert_eq!(track.current_price, 200);
        assert!(!track.capped(&config));
        track.record_purchase(&config);
        assert!(track.capped(&config));
        assert_eq!(track.current_price, 200);
    }

    #[test]
    fn coin_step_diminishes() {
        let config = UpgradeConfig::default();
        let first = coin_multiplier_step(&config, 0);
        let second = coin_multiplier_step(&config, 1);
        assert!((first - 0.2).abs() < 1e-12);
        assert!(second < first);
    }

    #[test]
    fn restore_clamps_purchases() {
        let config = UpgradeConfig::default();
        let mut tracks = UpgradeTracks::new(&config);
        tracks.apply_save_data(
            &UpgradeSaveData {
                auto_click_purchases: Some(99),
                auto_click_price: Some(0),
                ..Default::default()
            },
            &config,
        );
        assert_eq!(tracks.auto_click.purchases, 10);
        assert_eq!(tracks.auto_click.current_price, 1);
        assert_eq!(tracks.coin_multiplier.current_price, 100);
    }

    #[test]
    fn price_tag_display() {
        assert_eq!(PriceTag::Price(200).to_string(), "200$");
        assert_eq!(PriceTag::Max.to_string(), "MAX");
    }
}
