//! Read-only view of a session published after every operation.

use serde::Serialize;

use crate::game::{FusionPhase, GameEvent, Position, PriceTag, UpgradeKind, WorldKind, WorldView};

#[derive(Debug, Clone, Serialize)]
pub struct PieceSnapshot {
    pub id: u64,
    pub stage: u32,
    pub position: Position,
    pub world: WorldKind,
    pub phase: FusionPhase,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShopRowSnapshot {
    pub stage: u32,
    pub price: u64,
    pub purchases: u32,
    pub affordable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeSnapshot {
    pub kind: UpgradeKind,
    pub label: String,
    pub purchases: u32,
    pub price: PriceTag,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ObserverSnapshot {
    pub tick: u64,
    pub elapsed: f64,
    pub balance: f64,
    pub highest_stage: u32,
    pub money_multiplier: f64,
    pub auto_click_interval: f64,
    pub auto_spawn_enabled: bool,
    pub spawn_interval: f64,
    pub world: WorldView,
    pub visible_stage_limit: u32,
    pub pieces: Vec<PieceSnapshot>,
    pub shop: Vec<ShopRowSnapshot>,
    pub upgrades: Vec<UpgradeSnapshot>,
    /// Newest first.
    pub events: Vec<GameEvent>,
}

impl ObserverSnapshot {
    pub fn pieces_in(&self, world: WorldKind) -> impl Iterator<Item = &PieceSnapshot> {
        self.pieces.iter().filter(move |piece| piece.world == world)
    }
}
