//! Session-wide resources: the currency ledger, shared upgrade modifiers,
//! progression and world view, and the spawn scheduler.

use bevy_ecs::prelude::Resource;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::game::{ClickConfig, WorldConfig, WorldKind};

/// Player balance. Only grows through [`Ledger::add`] and only shrinks
/// through [`Ledger::try_spend`], so it can never go negative.
#[derive(Debug, Clone, Default, Resource)]
pub struct Ledger {
    balance: f64,
}

impl Ledger {
    pub fn new(balance: f64) -> Self {
        let balance = if balance.is_finite() && balance > 0.0 {
            balance
        } else {
            0.0
        };
        Self { balance }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn can_afford(&self, amount: f64) -> bool {
        self.balance >= amount
    }

    pub fn add(&mut self, amount: f64) -> bool {
        if !amount.is_finite() || amount < 0.0 {
            warn!(amount, "rejected ledger credit");
            return false;
        }
        self.balance += amount;
        true
    }

    pub fn try_spend(&mut self, amount: f64) -> bool {
        if amount.is_nan() {
            return false;
        }
        if amount <= 0.0 {
            return true;
        }
        if self.balance < amount {
            return false;
        }
        self.balance -= amount;
        true
    }
}

/// Scalars bought through upgrades that apply to every piece at once.
#[derive(Debug, Clone, Resource)]
pub struct GlobalModifiers {
    auto_click_reduction: f64,
    money_multiplier: f64,
}

impl Default for GlobalModifiers {
    fn default() -> Self {
        Self {
            auto_click_reduction: 0.0,
            money_multiplier: 1.0,
        }
    }
}

impl GlobalModifiers {
    pub fn auto_click_reduction(&self) -> f64 {
        self.auto_click_reduction
    }

    pub fn money_multiplier(&self) -> f64 {
        self.money_multiplier
    }

    pub fn auto_click_interval(&self, click: &ClickConfig) -> f64 {
        (click.base_interval - self.auto_click_reduction).max(click.min_interval)
    }

    pub fn add_auto_click_reduction(&mut self, amount: f64, click: &ClickConfig) {
        if !(amount > 0.0) {
            return;
        }
        self.set_auto_click_reduction(self.auto_click_reduction + amount, click);
    }

    pub fn set_auto_click_reduction(&mut self, reduction: f64, click: &ClickConfig) {
        let ceiling = (click.base_interval - click.min_interval).max(0.0);
        self.auto_click_reduction = if reduction.is_finite() {
            reduction.clamp(0.0, ceiling)
        } else {
            0.0
        };
    }

    pub fn increase_money_multiplier(&mut self, amount: f64) {
        if amount > 0.0 && amount.is_finite() {
            self.money_multiplier += amount;
        }
    }

    pub fn set_money_multiplier(&mut self, multiplier: f64) {
        self.money_multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
    }
}

/// Highest stage any piece has ever reached. Never decreases.
#[derive(Debug, Clone, Resource)]
pub struct Progression {
    highest_stage: u32,
}

impl Default for Progression {
    fn default() -> Self {
        Self { highest_stage: 1 }
    }
}

impl Progression {
    pub fn highest_stage(&self) -> u32 {
        self.highest_stage
    }

    /// Returns `true` when `stage` set a new record.
    pub fn track(&mut self, stage: u32) -> bool {
        let stage = stage.max(1);
        if stage <= self.highest_stage {
            return false;
        }
        self.highest_stage = stage;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Resource, Serialize)]
pub struct WorldView {
    pub unlocked: bool,
    pub active: WorldKind,
}

impl WorldView {
    /// One-way unlock; returns `true` only on the call that unlocks.
    pub fn try_unlock(&mut self, stage: u32, rules: &WorldConfig) -> bool {
        if self.unlocked || stage <= rules.unlock_stage.max(1) {
            return false;
        }
        self.unlocked = true;
        true
    }

    pub fn toggle(&mut self) -> bool {
        if !self.unlocked {
            return false;
        }
        self.active = self.active.other();
        true
    }

    pub fn showing_primary(&self) -> bool {
        self.active == WorldKind::Primary
    }
}

#[derive(Debug, Clone, Resource)]
pub struct SpawnScheduler {
    pub enabled: bool,
    pub interval: f64,
    pub timer: f64,
}

impl SpawnScheduler {
    pub fn new(enabled: bool, interval: f64, min_interval: f64) -> Self {
        Self {
            enabled,
            interval: interval.max(min_interval),
            timer: 0.0,
        }
    }

    /// Accumulates `elapsed` and reports whether a spawn is due. The timer
    /// restarts from zero rather than carrying the overshoot.
    pub fn advance(&mut self, elapsed: f64) -> bool {
        self.timer += elapsed;
        if self.timer >= self.interval {
            self.timer = 0.0;
            return true;
        }
        false
    }

    pub fn enable(&mut self, interval: f64, min_interval: f64) {
        self.enabled = true;
        self.interval = interval.max(min_interval);
    }

    pub fn reduce_interval(&mut self, amount: f64, min_interval: f64) {
        if !(amount > 0.0) {
            return;
        }
        self.interval = (self.interval - amount).max(min_interval);
    }

    pub fn at_floor(&self, min_interval: f64) -> bool {
        self.enabled && self.interval <= min_interval
    }
}

#[derive(Debug, Clone, Resource, Default)]
pub struct SessionClock {
    pub tick: u64,
    pub elapsed: f64,
}

#[derive(Debug, Resource)]
pub struct DeltaTime(pub f64);

impl Default for DeltaTime {
    fn default() -> Self {
        Self(0.0)
    }
}

#[derive(Debug, Resource)]
pub struct SpawnRng(pub SmallRng);

impl SpawnRng {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self(SmallRng::seed_from_u64(seed)),
            None => Self(SmallRng::from_entropy()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Resource, Serialize, Deserialize)]
pub struct AudioSettings {
    pub music_muted: bool,
    pub coin_muted: bool,
    pub master_volume: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            music_muted: false,
            coin_muted: false,
            master_volume: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn spend_beyond_balance_fails() {
        let mut ledger = Ledger::new(50.0);
        assert!(!ledger.try_spend(60.0));
        assert_eq!(ledger.balance(), 50.0);
        assert!(ledger.try_spend(50.0));
        assert_eq!(ledger.balance(), 0.0);
    }

    #[test]
    fn non_positive_spend_is_free() {
        let mut ledger = Ledger::new(5.0);
        assert!(ledger.try_spend(0.0));
        assert!(ledger.try_spend(-3.0));
        assert_eq!(ledger.balance(), 5.0);
    }

    #[test]
    fn negative_credit_is_rejected() {
        let mut ledger = Ledger::default();
        assert!(!ledger.add(-1.0));
        assert!(!ledger.add(f64::NAN));
        assert_eq!(ledger.balance(), 0.0);
    }

    #[test]
    fn reduction_respects_interval_floor() {
        let click = ClickConfig::default();
        let mut modifiers = GlobalModifiers::default();
        modifiers.add_auto_click_reduction(4.0, &click);
        assert_eq!(modifiers.auto_click_interval(&click), 6.0);
        modifiers.add_auto_click_reduction(50.0, &click);
        assert_eq!(modifiers.auto_click_reduction(), 9.0);
        assert_eq!(modifiers.auto_click_interval(&click), 1.0);
    }

    #[test]
    fn multiplier_never_drops_below_one() {
        let mut modifiers = GlobalModifiers::default();
        modifiers.set_money_multiplier(0.0);
        assert_eq!(modifiers.money_multiplier(), 1.0);
        modifiers.increase_money_multiplier(0.5);
        modifiers.increase_money_multiplier(-2.0);
        assert_eq!(modifiers.money_multiplier(), 1.5);
    }

    #[test]
    fn progression_only_moves_up() {
        let mut progression = Progression::default();
        assert!(progression.track(4));
        assert!(!progression.track(2));
        assert!(!progression.track(4));
        assert_eq!(progression.highest_stage(), 4);
    }

    #[test]
    fn unlock_happens_once() {
        let rules = WorldConfig::default();
        let mut view = WorldView::default();
        assert!(!view.toggle());
        assert!(!view.try_unlock(11, &rules));
        assert!(view.try_unlock(12, &rules));
        assert!(!view.try_unlock(13, &rules));
        assert!(view.toggle());
        assert_eq!(view.active, WorldKind::Secondary);
    }

    #[test]
    fn scheduler_resets_on_elapse() {
        let mut scheduler = SpawnScheduler::new(true, 10.0, 1.0);
        assert!(!scheduler.advance(6.0));
        assert!(scheduler.advance(6.0));
        assert_eq!(scheduler.timer, 0.0);
        scheduler.reduce_interval(20.0, 1.0);
        assert_eq!(scheduler.interval, 1.0);
        assert!(scheduler.at_floor(1.0));
    }

    #[derive(Debug, Clone)]
    enum LedgerOp {
        Add(f64),
        Spend(f64),
    }

    fn ledger_op() -> impl Strategy<Value = LedgerOp> {
        prop_oneof![
            (-1_000.0f64..1_000.0).prop_map(LedgerOp::Add),
            (-1_000.0f64..5_000.0).prop_map(LedgerOp::Spend),
        ]
    }

    proptest! {
        #[test]
        fn balance_never_negative(ops in prop::collection::vec(ledger_op(), 0..64)) {
            let mut ledger = Ledger::default();
            for op in ops {
                let before = ledger.balance();
                match op {
                    LedgerOp::Add(amount) => {
                        ledger.add(amount);
                    }
                    LedgerOp::Spend(amount) => {
                        let ok = ledger.try_spend(amount);
                        if amount > before {
                            prop_assert!(!ok);
                            prop_assert_eq!(ledger.balance(), before);
                        }
                    }
                }
                prop_assert!(ledger.balance() >= 0.0);
            }
        }
    }
}
