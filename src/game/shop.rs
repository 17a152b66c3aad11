//! Shop pricing: stage tier raises the price quadratically, repeat buys of
//! the same stage raise it geometrically.

use std::collections::BTreeMap;

use bevy_ecs::prelude::Resource;

use crate::game::{ShopConfig, ShopPurchaseSave};

pub fn triangular(n: u32) -> u64 {
    let n = n as u64;
    n * (n + 1) / 2
}

pub fn stage_price(config: &ShopConfig, stage: u32, purchase_count: u32) -> u64 {
    let incremental = triangular(stage.saturating_sub(1)) as f64;
    let base = config.base_price + incremental * config.price_increment;
    let growth = config.growth_factor.max(1.01);
    (base * growth.powi(purchase_count as i32)).round() as u64
}

/// Highest stage the shop sells: it trails the best piece by `visible_gap`.
pub fn visible_stage_limit(config: &ShopConfig, highest_stage: u32) -> u32 {
    highest_stage
        .saturating_sub(config.visible_gap)
        .clamp(1, config.max_stage.max(1))
}

/// Times each stage has been bought from the shop.
#[derive(Debug, Clone, Default, Resource)]
pub struct ShopPurchases(BTreeMap<u32, u32>);

impl ShopPurchases {
    pub fn count(&self, stage: u32) -> u32 {
        self.0.get(&stage).copied().unwrap_or(0)
    }

    pub fn register(&mut self, stage: u32) {
        if stage < 1 {
            return;
        }
        *self.0.entry(stage).or_insert(0) += 1;
    }

    pub fn save_entries(&self) -> Vec<ShopPurchaseSave> {
        self.0
            .iter()
            .filter(|(stage, count)| **stage >= 1 && **count >= 1)
            .map(|(stage, count)| ShopPurchaseSave {
                stage: *stage,
                count: *count,
            })
            .collect()
    }

    pub fn restore(&mut self, entries: &[ShopPurchaseSave]) {
        self.0.clear();
        for entry in entries {
            if entry.stage < 1 || entry.count < 1 {
                continue;
            }
            self.0.insert(entry.stage, entry.count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn price_examples() {
        let config = ShopConfig::default();
        assert_eq!(stage_price(&config, 1, 0), 25);
        assert_eq!(stage_price(&config, 2, 0), 50);
        assert_eq!(stage_price(&config, 3, 0), 100);
        assert_eq!(stage_price(&config, 4, 0), 175);
        // 25 * 1.15 = 28.75
        assert_eq!(stage_price(&config, 1, 1), 29);
    }

    #[test]
    fn limit_trails_best_stage() {
        let config = ShopConfig::default();
        assert_eq!(visible_stage_limit(&config, 1), 1);
        assert_eq!(visible_stage_limit(&config, 9), 1);
        assert_eq!(visible_stage_limit(&config, 10), 2);
        assert_eq!(visible_stage_limit(&config, 15), 7);
        assert_eq!(visible_stage_limit(&config, 40), 20);
    }

    #[test]
    fn purchases_skip_invalid_entries() {
        let mut purchases = ShopPurchases::default();
        purchases.restore(&[
            ShopPurchaseSave { stage: 0, count: 3 },
            ShopPurchaseSave { stage: 2, count: 0 },
            ShopPurchaseSave { stage: 3, count: 4 },
        ]);
        assert_eq!(purchases.count(0), 0);
        assert_eq!(purchases.count(2), 0);
        assert_eq!(purchases.count(3), 4);
        purchases.register(3);
        assert_eq!(purchases.save_entries(), vec![ShopPurchaseSave { stage: 3, count: 5 }]);
    }

    proptest! {
        #[test]
        fn price_rises_with_stage(stage in 1u32..40, count in 0u32..30) {
            let config = ShopConfig::default();
            prop_assert!(stage_price(&config, stage + 1, count) > stage_price(&config, stage, count));
        }

        #[test]
        fn price_rises_with_repeat_buys(stage in 1u32..40, count in 0u32..30) {
            let config = ShopConfig::default();
            prop_assert!(stage_price(&config, stage, count + 1) > stage_price(&config, stage, count));
        }
    }
}
