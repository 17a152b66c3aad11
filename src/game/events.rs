//! Structured gameplay events kept for the pulse log and observers.

use std::collections::VecDeque;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::game::{UpgradeKind, WorldKind, format_money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    Tap,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnOrigin {
    Scheduler,
    Shop,
    Initial,
    Restore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEventKind {
    Reward {
        stage: u32,
        amount: f64,
        source: RewardSource,
    },
    Spawned {
        stage: u32,
        world: WorldKind,
        origin: SpawnOrigin,
    },
    Fused {
        stage: u32,
    },
    ShopPurchase {
        stage: u32,
        price: u64,
    },
    Upgrade {
        kind: UpgradeKind,
        price: u64,
    },
    ProgressionRaised {
        highest_stage: u32,
    },
    WorldUnlocked {
        stage: u32,
    },
    Restored {
        pieces: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub tick: u64,
    pub kind: GameEventKind,
}

impl GameEvent {
    pub fn new(tick: u64, kind: GameEventKind) -> Self {
        Self { tick, kind }
    }

    pub fn category(&self) -> &'static str {
        match &self.kind {
            GameEventKind::Reward { .. } => "Reward",
            GameEventKind::Spawned { .. } => "Spawn",
            GameEventKind::Fused { .. } => "Fusion",
            GameEventKind::ShopPurchase { .. } => "Shop",
            GameEventKind::Upgrade { .. } => "Upgrade",
            GameEventKind::ProgressionRaised { .. } => "Progress",
            GameEventKind::WorldUnlocked { .. } => "World",
            GameEventKind::Restored { .. } => "Save",
        }
    }

    pub fn headline(&self) -> String {
        match &self.kind {
            GameEventKind::Reward {
                stage,
                amount,
                source,
            } => {
                let how = match source {
                    RewardSource::Tap => "tap",
                    RewardSource::Auto => "auto click",
                };
                format!("Stage {stage} {how} paid {}", format_money(*amount))
            }
            GameEventKind::Spawned {
                stage,
                world,
                origin,
            } => format!("Stage {stage} piece appeared in {world:?} world ({origin:?})"),
            GameEventKind::Fused { stage } => format!("Two pieces fused into stage {stage}"),
            GameEventKind::ShopPurchase { stage, price } => {
                format!("Bought stage {stage} for {}", format_money(*price as f64))
            }
            GameEventKind::Upgrade { kind, price } => {
                format!("{} upgraded for {}", kind.label(), format_money(*price as f64))
            }
            GameEventKind::ProgressionRaised { highest_stage } => {
                format!("New best stage {highest_stage}")
            }
            GameEventKind::WorldUnlocked { stage } => {
                format!("Stage {stage} opened the second world")
            }
            GameEventKind::Restored { pieces } => format!("Save restored with {pieces} pieces"),
        }
    }
}

#[derive(Debug, Resource)]
pub struct GameEventLog {
    events: VecDeque<GameEvent>,
    capacity: usize,
}

impl GameEventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: GameEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn snapshot(&self) -> Vec<GameEvent> {
        self.events.iter().cloned().collect()
    }

    /// Newest first.
    pub fn recent(&self, count: usize) -> Vec<GameEvent> {
        self.events.iter().rev().take(count).cloned().collect()
    }
}

impl Default for GameEventLog {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_drops_oldest_past_capacity() {
        let mut log = GameEventLog::new(2);
        for stage in 1..=3 {
            log.push(GameEvent::new(stage as u64, GameEventKind::Fused { stage }));
        }
        assert_eq!(log.len(), 2);
        let ticks: Vec<u64> = log.snapshot().iter().map(|event| event.tick).collect();
        assert_eq!(ticks, vec![2, 3]);
        assert_eq!(log.recent(1)[0].tick, 3);
    }

    #[test]
    fn events_serialize_tagged() {
        let event = GameEvent::new(4, GameEventKind::WorldUnlocked { stage: 12 });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "world_unlocked");
        assert_eq!(event.category(), "World");
    }
}
