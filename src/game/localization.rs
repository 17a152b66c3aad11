use colored::Color;

use crate::game::{FusionPhase, WorldKind};

pub fn world_label(world: WorldKind) -> &'static str {
    match world {
        WorldKind::Primary => "Primary",
        WorldKind::Secondary => "Secondary",
    }
}

pub fn world_color(world: WorldKind) -> Color {
    match world {
        WorldKind::Primary => Color::BrightGreen,
        WorldKind::Secondary => Color::BrightMagenta,
    }
}

pub fn phase_label(phase: FusionPhase) -> &'static str {
    match phase {
        FusionPhase::Idle => "Idle",
        FusionPhase::CandidateLocked => "Candidate",
        FusionPhase::InFlight => "Fusing",
    }
}

pub fn category_color(category: &str) -> Color {
    match category {
        "Reward" => Color::BrightYellow,
        "Spawn" => Color::BrightCyan,
        "Fusion" => Color::BrightMagenta,
        "Shop" => Color::BrightGreen,
        "Upgrade" => Color::BrightBlue,
        "Progress" => Color::Yellow,
        "World" => Color::BrightRed,
        _ => Color::White,
    }
}

pub fn format_number_commas(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::new();
    let mut count = 0;
    for ch in s.chars().rev() {
        if count > 0 && count % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
        count += 1;
    }
    out.chars().rev().collect()
}

/// Balance as shown to the player: whole coins with separators and a `$`.
pub fn format_money(amount: f64) -> String {
    let whole = if amount.is_finite() && amount > 0.0 {
        amount.floor() as u64
    } else {
        0
    };
    format!("{}$", format_number_commas(whole))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_groups_thousands() {
        assert_eq!(format_number_commas(0), "0");
        assert_eq!(format_number_commas(1_234_567), "1,234,567");
        assert_eq!(format_money(10_240.7), "10,240$");
        assert_eq!(format_money(-3.0), "0$");
    }
}
