//! Per-piece auto-click countdowns and the reward formula.

use bevy_ecs::prelude::*;
use tracing::debug;

use crate::game::{
    AutoClicker, ClickConfig, DeltaTime, GameConfig, GameEvent, GameEventKind, GameEventLog,
    GlobalModifiers, Ledger, Notification, Outbox, Position, RewardSource, SessionClock,
    SoundCue, Stage,
};

/// `round(base_reward * 2^(stage - 1) * multiplier)`.
pub fn reward_for(click: &ClickConfig, stage: u32, money_multiplier: f64) -> f64 {
    let exponent = stage.saturating_sub(1).min(1_000) as i32;
    let multiplier = if money_multiplier.is_finite() {
        money_multiplier.max(1.0)
    } else {
        1.0
    };
    (click.base_reward * 2f64.powi(exponent) * multiplier).round()
}

pub fn auto_click_system(
    time: Res<DeltaTime>,
    clock: Res<SessionClock>,
    config: Res<GameConfig>,
    modifiers: Res<GlobalModifiers>,
    mut ledger: ResMut<Ledger>,
    mut outbox: ResMut<Outbox>,
    mut log: ResMut<GameEventLog>,
    mut query: Query<(Entity, &Stage, &Position, &mut AutoClicker)>,
) {
    if time.0 <= 0.0 {
        return;
    }
    for (piece, stage, position, mut clicker) in &mut query {
        let fired = clicker.advance(time.0);
        for _ in 0..fired {
            let amount = reward_for(&config.click, stage.0, modifiers.money_multiplier());
            if !ledger.add(amount) {
                continue;
            }
            outbox.notify(Notification::RewardCollected {
                piece,
                amount,
                position: *position,
            });
            outbox.notify(Notification::BalanceChanged {
                balance: ledger.balance(),
            });
            outbox.cue(SoundCue::Coin);
            log.push(GameEvent::new(
                clock.tick,
                GameEventKind::Reward {
                    stage: stage.0,
                    amount,
                    source: RewardSource::Auto,
                },
            ));
        }
        if fired > 0 {
            debug!(?piece, stage = stage.0, fired, "auto click paid out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_doubles_per_stage() {
        let click = ClickConfig::default();
        assert_eq!(reward_for(&click, 1, 1.0), 10.0);
        assert_eq!(reward_for(&click, 2, 1.0), 20.0);
        assert_eq!(reward_for(&click, 5, 1.0), 160.0);
        assert_eq!(reward_for(&click, 3, 1.2), 48.0);
    }

    #[test]
    fn multiplier_below_one_is_ignored() {
        let click = ClickConfig::default();
        assert_eq!(reward_for(&click, 1, 0.2), 10.0);
    }
}
