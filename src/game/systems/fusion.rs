use bevy_ecs::prelude::*;

use crate::game::{DeltaTime, FusionState};

/// Runs down promotion pulses; a piece can merge again once its pulse ends.
pub fn fusion_pulse_system(time: Res<DeltaTime>, mut query: Query<&mut FusionState>) {
    for mut state in &mut query {
        if state.in_flight() {
            state.advance_pulse(time.0);
        }
    }
}
