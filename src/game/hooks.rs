//! Fire-and-forget collaborators: the UI refresh sink and the sound trigger.
//!
//! The core never waits on either. Everything raised while an operation runs
//! is queued in [`Outbox`] and handed over once the operation has finished.

use bevy_ecs::prelude::{Entity, Resource};
use tracing::{debug, trace};

use crate::game::{Position, WorldKind, format_money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundCue {
    Click,
    Coin,
    Fusion,
    Purchase,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    BalanceChanged {
        balance: f64,
    },
    ProgressionChanged {
        highest_stage: u32,
    },
    WorldChanged {
        active: WorldKind,
        unlocked: bool,
    },
    /// A reward paid out; the render layer floats a collectible at `position`.
    RewardCollected {
        piece: Entity,
        amount: f64,
        position: Position,
    },
    PieceSpawned {
        piece: Entity,
        stage: u32,
        world: WorldKind,
    },
    PieceRemoved {
        piece: Entity,
    },
    FusionOccurred {
        survivor: Entity,
        stage: u32,
    },
    /// A promotion crossed the world threshold and moved the piece.
    PieceRelocated {
        piece: Entity,
        world: WorldKind,
    },
}

pub trait NotificationSink: Send {
    fn notify(&mut self, notification: &Notification);
}

pub trait SoundTrigger: Send {
    fn play(&mut self, cue: SoundCue, volume: f32);
}

#[derive(Debug, Default, Resource)]
pub struct Outbox {
    pub notifications: Vec<Notification>,
    pub cues: Vec<SoundCue>,
}

impl Outbox {
    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn cue(&mut self, cue: SoundCue) {
        self.cues.push(cue);
    }

    pub fn take(&mut self) -> (Vec<Notification>, Vec<SoundCue>) {
        (
            std::mem::take(&mut self.notifications),
            std::mem::take(&mut self.cues),
        )
    }
}

/// Sink for headless hosts: every notification becomes a log line.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&mut self, notification: &Notification) {
        match notification {
            Notification::BalanceChanged { balance } => {
                trace!(balance = %format_money(*balance), "balance changed")
            }
            Notification::ProgressionChanged { highest_stage } => {
                debug!(highest_stage, "progression changed")
            }
            Notification::WorldChanged { active, unlocked } => {
                debug!(?active, unlocked, "world changed")
            }
            Notification::RewardCollected { amount, .. } => trace!(amount, "reward collected"),
            Notification::PieceSpawned { stage, world, .. } => {
                trace!(stage, ?world, "piece spawned")
            }
            Notification::PieceRemoved { piece } => trace!(?piece, "piece removed"),
            Notification::FusionOccurred { stage, .. } => trace!(stage, "fusion occurred"),
            Notification::PieceRelocated { piece, world } => {
                trace!(?piece, ?world, "piece relocated")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct TracingSound;

impl SoundTrigger for TracingSound {
    fn play(&mut self, cue: SoundCue, volume: f32) {
        trace!(?cue, volume, "sound cue");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_take_drains_in_order() {
        let mut outbox = Outbox::default();
        outbox.notify(Notification::BalanceChanged { balance: 1.0 });
        outbox.notify(Notification::ProgressionChanged { highest_stage: 2 });
        outbox.cue(SoundCue::Coin);
        let (notifications, cues) = outbox.take();
        assert_eq!(notifications.len(), 2);
        assert_eq!(
            notifications[1],
            Notification::ProgressionChanged { highest_stage: 2 }
        );
        assert_eq!(cues, vec![SoundCue::Coin]);
        assert!(outbox.notifications.is_empty());
        assert!(outbox.cues.is_empty());
    }
}
