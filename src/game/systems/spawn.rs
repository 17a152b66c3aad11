//! Timed stage-1 spawns and rejection-sampled placement.

use bevy_ecs::prelude::*;
use rand::Rng;
use tracing::debug;

use crate::game::{
    DeltaTime, GameConfig, GameEvent, GameEventKind, GameEventLog, GlobalModifiers, Notification,
    Outbox, PieceBundle, Position, SessionClock, SpawnConfig, SpawnOrigin, SpawnRng,
    SpawnScheduler, Stage, WorldKind, WorldMembership, WorldView,
};

fn sample_point<R: Rng + ?Sized>(spawn: &SpawnConfig, rng: &mut R) -> Position {
    Position::new(
        rng.gen_range(-spawn.half_width..=spawn.half_width),
        rng.gen_range(-spawn.half_height..=spawn.half_height),
        spawn.spawn_z,
    )
}

/// Tries a bounded number of random points and keeps the first one clear of
/// every occupied position. Falls back to an unchecked point.
pub fn find_spawn_position<R: Rng + ?Sized>(
    spawn: &SpawnConfig,
    occupied: &[Position],
    rng: &mut R,
) -> Position {
    for _ in 0..spawn.placement_attempts {
        let candidate = sample_point(spawn, rng);
        let clear = occupied
            .iter()
            .all(|other| other.distance_2d(&candidate) >= spawn.clearance_radius);
        if clear {
            return candidate;
        }
    }
    sample_point(spawn, rng)
}

pub fn spawn_system(
    mut commands: Commands,
    time: Res<DeltaTime>,
    clock: Res<SessionClock>,
    config: Res<GameConfig>,
    view: Res<WorldView>,
    modifiers: Res<GlobalModifiers>,
    mut scheduler: ResMut<SpawnScheduler>,
    mut rng: ResMut<SpawnRng>,
    mut outbox: ResMut<Outbox>,
    mut log: ResMut<GameEventLog>,
    pieces: Query<(&Position, &WorldMembership), With<Stage>>,
) {
    // Paused while the secondary world is on screen.
    if !scheduler.enabled || !view.showing_primary() {
        return;
    }
    if !scheduler.advance(time.0) {
        return;
    }

    let population = pieces.iter().count();
    if population >= config.spawn.max_pieces {
        debug!(population, "spawn skipped, board full");
        return;
    }

    let world = config.world.world_for_stage(1);
    let occupied: Vec<Position> = pieces
        .iter()
        .filter(|(_, membership)| membership.0 == world)
        .map(|(position, _)| *position)
        .collect();
    let position = find_spawn_position(&config.spawn, &occupied, &mut rng.0);
    let interval = modifiers.auto_click_interval(&config.click);
    let piece = commands
        .spawn(PieceBundle::new(1, position, world, interval))
        .id();

    outbox.notify(Notification::PieceSpawned {
        piece,
        stage: 1,
        world,
    });
    log.push(GameEvent::new(
        clock.tick,
        GameEventKind::Spawned {
            stage: 1,
            world,
            origin: SpawnOrigin::Scheduler,
        },
    ));
    debug!(?piece, x = position.x, y = position.y, "scheduled spawn");
}

/// Positions already taken in `world`, for placement checks outside systems.
pub fn occupied_positions(world: &mut World, target: WorldKind) -> Vec<Position> {
    let mut query = world.query_filtered::<(&Position, &WorldMembership), With<Stage>>();
    query
        .iter(world)
        .filter(|(_, membership)| membership.0 == target)
        .map(|(position, _)| *position)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn placement_stays_in_bounds() {
        let spawn = SpawnConfig::default();
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..200 {
            let position = find_spawn_position(&spawn, &[], &mut rng);
            assert!(position.x.abs() <= spawn.half_width);
            assert!(position.y.abs() <= spawn.half_height);
            assert_eq!(position.z, spawn.spawn_z);
        }
    }

    #[test]
    fn placement_avoids_occupied_points_when_it_can() {
        let spawn = SpawnConfig::default();
        let occupied = vec![Position::new(0.0, 0.0, -1.0), Position::new(3.0, 2.0, -1.0)];
        let mut rng = SmallRng::seed_from_u64(11);
        let mut clear = 0;
        for _ in 0..50 {
            let position = find_spawn_position(&spawn, &occupied, &mut rng);
            if occupied
                .iter()
                .all(|other| other.distance_2d(&position) >= spawn.clearance_radius)
            {
                clear += 1;
            }
        }
        assert_eq!(clear, 50);
    }

    #[test]
    fn crowded_board_still_yields_a_point() {
        let spawn = SpawnConfig {
            half_width: 0.5,
            half_height: 0.5,
            ..SpawnConfig::default()
        };
        let occupied = vec![Position::new(0.0, 0.0, -1.0)];
        let mut rng = SmallRng::seed_from_u64(5);
        let position = find_spawn_position(&spawn, &occupied, &mut rng);
        assert!(position.x.abs() <= 0.5 && position.y.abs() <= 0.5);
    }
}
