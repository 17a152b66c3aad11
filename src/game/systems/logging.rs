//! Colorized session pulse for quick CLI scanning.

use bevy_ecs::prelude::*;
use colored::{Color, Colorize};
use tracing::info;

use crate::game::{
    FusionPhase, FusionState, GameConfig, GameEvent, GameEventLog, Ledger, Progression,
    SessionClock, SpawnScheduler, Stage, WorldKind, WorldMembership, WorldView, category_color,
    format_money, phase_label, world_color, world_label,
};

fn badge(label: &str, color: Color) -> String {
    format!("[{}]", label).color(color).to_string()
}

fn format_event_line(event: &GameEvent) -> String {
    let category = event.category();
    format!(
        "{} {} {}",
        badge(category, category_color(category)),
        badge(&format!("Tick {}", event.tick), Color::BrightBlack),
        event.headline()
    )
}

/// `Idle 2, Candidate 0, Fusing 1` style tally of fusion phases.
fn phase_summary(phases: impl Iterator<Item = FusionPhase>) -> String {
    let order = [
        FusionPhase::Idle,
        FusionPhase::CandidateLocked,
        FusionPhase::InFlight,
    ];
    let mut counts = [0usize; 3];
    for phase in phases {
        if let Some(slot) = order.iter().position(|known| *known == phase) {
            counts[slot] += 1;
        }
    }
    order
        .iter()
        .zip(counts)
        .map(|(phase, count)| format!("{} {}", phase_label(*phase), count))
        .collect::<Vec<_>>()
        .join(", ")
}

fn population_line(pieces: &Query<(&Stage, &WorldMembership, &FusionState)>) -> String {
    let mut parts = Vec::new();
    for world in [WorldKind::Primary, WorldKind::Secondary] {
        let stages: Vec<u32> = pieces
            .iter()
            .filter(|(_, membership, _)| membership.0 == world)
            .map(|(stage, _, _)| stage.0)
            .collect();
        let best = stages.iter().max().copied().unwrap_or(0);
        parts.push(format!(
            "{} {} pieces, best {}",
            badge(world_label(world), world_color(world)),
            stages.len(),
            best
        ));
    }
    parts.push(format!(
        "{} {}",
        badge("Fusion", Color::Magenta),
        phase_summary(pieces.iter().map(|(_, _, state)| state.phase()))
    ));
    parts.join(" | ")
}

pub fn pulse_log_system(
    clock: Res<SessionClock>,
    config: Res<GameConfig>,
    ledger: Res<Ledger>,
    progression: Res<Progression>,
    view: Res<WorldView>,
    scheduler: Res<SpawnScheduler>,
    events: Res<GameEventLog>,
    pieces: Query<(&Stage, &WorldMembership, &FusionState)>,
) {
    if config.pulse_log_every == 0 || clock.tick % config.pulse_log_every != 0 {
        return;
    }

    let header_line = format!(
        "{} {} {} {} {}",
        badge("Session", Color::BrightWhite),
        badge(&format!("Tick {}", clock.tick), Color::BrightBlack),
        badge(&format_money(ledger.balance()), Color::BrightYellow),
        badge(
            &format!("Best stage {}", progression.highest_stage()),
            Color::Yellow
        ),
        badge(
            &format!("Viewing {}", world_label(view.active)),
            world_color(view.active)
        ),
    );

    let spawn_line = if scheduler.enabled {
        format!(
            "{} every {:.1}s",
            badge("Auto spawn", Color::BrightCyan),
            scheduler.interval
        )
    } else {
        format!("{} off", badge("Auto spawn", Color::BrightBlack))
    };

    let mut lines = vec![header_line, population_line(&pieces), spawn_line];

    let recent = events.recent(3);
    if recent.is_empty() {
        lines.push(
            "[Event] Nothing happened yet"
                .color(Color::BrightBlack)
                .to_string(),
        );
    }
    for event in recent.iter().rev() {
        lines.push(format_event_line(event));
    }

    info!("\n{}", lines.join("\n"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_summary_counts_every_phase() {
        let phases = [
            FusionPhase::Idle,
            FusionPhase::InFlight,
            FusionPhase::Idle,
        ];
        assert_eq!(
            phase_summary(phases.into_iter()),
            "Idle 2, Candidate 0, Fusing 1"
        );
    }
}
