//! Components carried by every merge piece.

use bevy_ecs::prelude::{Bundle, Component, Entity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldKind {
    #[default]
    Primary,
    Secondary,
}

impl WorldKind {
    pub fn other(self) -> Self {
        match self {
            WorldKind::Primary => WorldKind::Secondary,
            WorldKind::Secondary => WorldKind::Primary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Component)]
pub struct Stage(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Default, Component, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Planar distance; depth only orders sprites.
    pub fn distance_2d(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Component)]
pub struct WorldMembership(pub WorldKind);

/// Countdown that pays out a reward every `interval` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Component)]
pub struct AutoClicker {
    pub interval: f64,
    pub timer: f64,
}

impl AutoClicker {
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            timer: interval,
        }
    }

    /// Runs the countdown and returns how many rewards came due. A long
    /// frame pays out every interval it covered instead of dropping them.
    pub fn advance(&mut self, elapsed: f64) -> u64 {
        if self.interval <= 0.0 || !elapsed.is_finite() {
            return 0;
        }
        self.timer -= elapsed;
        let mut fired: u64 = 0;
        while self.timer <= 0.0 {
            let next = self.timer + self.interval;
            if next == self.timer {
                // Interval lost to float precision; pay once and restart.
                self.timer = self.interval;
                return fired.saturating_add(1);
            }
            fired = fired.saturating_add(1);
            self.timer = next;
        }
        fired
    }

    pub fn retune(&mut self, interval: f64) {
        self.interval = interval;
        if self.timer > interval {
            self.timer = interval;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionPhase {
    Idle,
    CandidateLocked,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Component)]
pub struct FusionState {
    /// Same-stage piece currently touching this one. Never persisted.
    pub candidate: Option<Entity>,
    /// Seconds left on the promotion pulse; `Some` blocks further merges.
    pub pulse_remaining: Option<f64>,
}

impl FusionState {
    pub fn phase(&self) -> FusionPhase {
        if self.pulse_remaining.is_some() {
            FusionPhase::InFlight
        } else if self.candidate.is_some() {
            FusionPhase::CandidateLocked
        } else {
            FusionPhase::Idle
        }
    }

    pub fn in_flight(&self) -> bool {
        self.pulse_remaining.is_some()
    }

    pub fn start_pulse(&mut self, duration: f64) {
        self.pulse_remaining = Some(duration.max(0.0));
    }

    pub fn advance_pulse(&mut self, elapsed: f64) {
        if let Some(remaining) = self.pulse_remaining {
            let left = remaining - elapsed;
            self.pulse_remaining = if left > 0.0 { Some(left) } else { None };
        }
    }
}

#[derive(Bundle)]
pub struct PieceBundle {
    pub stage: Stage,
    pub position: Position,
    pub world: WorldMembership,
    pub clicker: AutoClicker,
    pub fusion: FusionState,
}

impl PieceBundle {
    pub fn new(stage: u32, position: Position, world: WorldKind, click_interval: f64) -> Self {
        Self {
            stage: Stage(stage.max(1)),
            position,
            world: WorldMembership(world),
            clicker: AutoClicker::new(click_interval),
            fusion: FusionState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn long_frame_catches_up() {
        let mut clicker = AutoClicker::new(10.0);
        assert_eq!(clicker.advance(25.0), 2);
        assert!((clicker.timer - 5.0).abs() < 1e-9);
    }

    #[test]
    fn precision_loss_does_not_hang() {
        let mut clicker = AutoClicker::new(1.0);
        clicker.timer = -1e17;
        assert_eq!(clicker.advance(0.0), 1);
        assert_eq!(clicker.timer, 1.0);
    }

    #[test]
    fn short_frames_accumulate() {
        let mut clicker = AutoClicker::new(1.0);
        assert_eq!(clicker.advance(0.4), 0);
        assert_eq!(clicker.advance(0.4), 0);
        assert_eq!(clicker.advance(0.4), 1);
    }

    #[test]
    fn retune_clamps_countdown() {
        let mut clicker = AutoClicker::new(10.0);
        clicker.advance(2.0);
        clicker.retune(5.0);
        assert_eq!(clicker.interval, 5.0);
        assert_eq!(clicker.timer, 5.0);

        clicker.advance(4.0);
        clicker.retune(4.0);
        assert!((clicker.timer - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pulse_runs_out() {
        let mut state = FusionState::default();
        assert_eq!(state.phase(), FusionPhase::Idle);
        state.start_pulse(0.3);
        assert_eq!(state.phase(), FusionPhase::InFlight);
        state.advance_pulse(0.2);
        assert!(state.in_flight());
        state.advance_pulse(0.2);
        assert_eq!(state.phase(), FusionPhase::Idle);
    }

    proptest! {
        #[test]
        fn catch_up_matches_whole_intervals(interval in 0.5f64..20.0, elapsed in 0.0f64..200.0) {
            let mut clicker = AutoClicker::new(interval);
            let fired = clicker.advance(elapsed);
            let expected = if elapsed < interval {
                0
            } else {
                ((elapsed - interval) / interval).floor() as u64 + 1
            };
            // Float division can land a hair either side of an exact boundary.
            prop_assert!((fired as i64 - expected as i64).abs() <= 1);
            prop_assert!(clicker.timer > 0.0 && clicker.timer <= interval + 1e-9);
        }
    }
}
