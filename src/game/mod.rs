use std::sync::{Arc, RwLock};

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::Schedule;
use tracing::{debug, info, warn};

pub mod components;
pub mod config;
pub mod events;
pub mod hooks;
pub mod localization;
pub mod observer;
pub mod resources;
pub mod save;
pub mod shop;
pub mod systems;
pub mod upgrades;


pub use components::*;
pub use config::*;
pub use events::*;
pub use hooks::*;
pub use localization::*;
pub use observer::*;
pub use resources::*;
pub use save::*;
pub use shop::*;
pub use systems::*;
pub use upgrades::*;

/// Everything the core talks to but does not own.
pub struct Collaborators {
    pub sink: Box<dyn NotificationSink>,
    pub sound: Box<dyn SoundTrigger>,
    pub store: Box<dyn KeyValueStore>,
}

impl Collaborators {
    pub fn new(
        sink: impl NotificationSink + 'static,
        sound: impl SoundTrigger + 'static,
        store: impl KeyValueStore + 'static,
    ) -> Self {
        Self {
            sink: Box::new(sink),
            sound: Box::new(sound),
            store: Box::new(store),
        }
    }

    /// Log-only sink and sound, for hosts without a presentation layer.
    pub fn headless(store: impl KeyValueStore + 'static) -> Self {
        Self::new(TracingSink, TracingSound, store)
    }
}

/// One running game: the ECS world holding pieces and session resources,
/// the per-tick schedule, and the injected collaborators.
pub struct GameSession {
    world: World,
    schedule: Schedule,
    observer: Arc<RwLock<ObserverSnapshot>>,
    collaborators: Collaborators,
}

impl GameSession {
    pub fn new(config: GameConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        Self::with_observer(
            config,
            collaborators,
            Arc::new(RwLock::new(ObserverSnapshot::default())),
        )
    }

    pub fn with_observer(
        config: GameConfig,
        collaborators: Collaborators,
        observer: Arc<RwLock<ObserverSnapshot>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut world = World::default();
        world.insert_resource(Ledger::default());
        world.insert_resource(GlobalModifiers::default());
        world.insert_resource(Progression::default());
        world.insert_resource(WorldView::default());
        world.insert_resource(SpawnScheduler::new(
            config.spawn.enabled,
            config.spawn.interval,
            config.upgrades.min_spawn_interval,
        ));
        world.insert_resource(ShopPurchases::default());
        world.insert_resource(UpgradeTracks::new(&config.upgrades));
        world.insert_resource(SessionClock::default());
        world.insert_resource(DeltaTime::default());
        world.insert_resource(SpawnRng::new(config.rng_seed));
        world.insert_resource(GameEventLog::new(config.event_log_capacity));
        world.insert_resource(Outbox::default());
        world.insert_resource(AudioSettings::default());
        world.insert_resource(config);

        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                fusion_pulse_system,
                auto_click_system,
                spawn_system,
                pulse_log_system,
            )
                .chain(),
        );

        let mut session = Self {
            world,
            schedule,
            observer,
            collaborators,
        };
        session.refresh_observer();
        Ok(session)
    }

    pub fn observer(&self) -> Arc<RwLock<ObserverSnapshot>> {
        self.observer.clone()
    }

    pub fn config(&self) -> &GameConfig {
        self.world.resource::<GameConfig>()
    }

    pub fn tick_count(&self) -> u64 {
        self.world.resource::<SessionClock>().tick
    }

    pub fn events(&self) -> Vec<GameEvent> {
        self.world.resource::<GameEventLog>().snapshot()
    }

    /// Scene entry: resets transient timers, loads audio preferences and the
    /// saved game, and seeds the board when it would otherwise start empty.
    /// Returns whether a save was restored.
    pub fn begin_session(&mut self) -> bool {
        let audio = load_audio_settings(self.collaborators.store.as_ref());
        self.world.insert_resource(audio);
        self.world.resource_mut::<SpawnScheduler>().timer = 0.0;

        let restored = match read_snapshot(self.collaborators.store.as_ref()) {
            Some(snapshot) => {
                self.apply_snapshot(&snapshot);
                true
            }
            None => false,
        };

        let seed_board = self.config().spawn.spawn_initial_piece;
        if seed_board && self.piece_count() == 0 {
            self.place_piece(1, SpawnOrigin::Initial, None, None);
        }
        info!(restored, pieces = self.piece_count(), "session started");
        self.settle();
        restored
    }

    pub fn request_save(&mut self) -> anyhow::Result<()> {
        let snapshot = self.snapshot();
        write_snapshot(self.collaborators.store.as_mut(), &snapshot)?;
        debug!(
            pieces = snapshot.pieces.as_ref().map_or(0, Vec::len),
            "session saved"
        );
        Ok(())
    }

    pub fn snapshot(&mut self) -> SaveSnapshot {
        let pieces = self
            .pieces()
            .into_iter()
            .map(|piece| PieceSave {
                stage: piece.stage,
                x: piece.position.x,
                y: piece.position.y,
                z: piece.position.z,
                world: piece.world,
            })
            .collect();
        let modifiers = self.world.resource::<GlobalModifiers>();
        let scheduler = self.world.resource::<SpawnScheduler>();
        SaveSnapshot {
            version: SAVE_VERSION,
            money: Some(self.balance()),
            highest_stage: Some(self.highest_stage()),
            auto_spawn_enabled: Some(scheduler.enabled),
            spawn_interval: Some(scheduler.interval),
            active_world: Some(self.world.resource::<WorldView>().active),
            money_multiplier: Some(modifiers.money_multiplier()),
            auto_click_reduction: Some(modifiers.auto_click_reduction()),
            upgrades: Some(self.world.resource::<UpgradeTracks>().save_data()),
            pieces: Some(pieces),
            shop_purchases: Some(self.world.resource::<ShopPurchases>().save_entries()),
        }
    }

    /// Replaces the board and economy with `snapshot`. Absent fields fall
    /// back to their defaults; the best stage is never lowered.
    pub fn restore(&mut self, snapshot: &SaveSnapshot) {
        self.apply_snapshot(snapshot);
        self.settle();
    }

    fn apply_snapshot(&mut self, snapshot: &SaveSnapshot) {
        let config = self.config().clone();

        let existing: Vec<Entity> = self
            .world
            .query_filtered::<Entity, With<Stage>>()
            .iter(&self.world)
            .collect();
        for piece in existing {
            self.world.despawn(piece);
            self.world
                .resource_mut::<Outbox>()
                .notify(Notification::PieceRemoved { piece });
        }

        self.world
            .insert_resource(Ledger::new(snapshot.money.unwrap_or(0.0)));
        {
            let mut modifiers = self.world.resource_mut::<GlobalModifiers>();
            modifiers.set_money_multiplier(snapshot.money_multiplier.unwrap_or(1.0));
            modifiers.set_auto_click_reduction(
                snapshot.auto_click_reduction.unwrap_or(0.0),
                &config.click,
            );
        }
        self.world.insert_resource(SpawnScheduler::new(
            snapshot.auto_spawn_enabled.unwrap_or(config.spawn.enabled),
            snapshot.spawn_interval.unwrap_or(config.spawn.interval),
            config.upgrades.min_spawn_interval,
        ));
        let mut tracks = UpgradeTracks::new(&config.upgrades);
        if let Some(upgrades) = &snapshot.upgrades {
            tracks.apply_save_data(upgrades, &config.upgrades);
        }
        self.world.insert_resource(tracks);
        let mut purchases = ShopPurchases::default();
        purchases.restore(snapshot.shop_purchases.as_deref().unwrap_or_default());
        self.world.insert_resource(purchases);

        let saved_pieces = snapshot.pieces.as_deref().unwrap_or_default();
        let mut best = snapshot.highest_stage.unwrap_or(1);
        for saved in saved_pieces {
            if saved.stage < 1 {
                warn!(stage = saved.stage, "skipping saved piece with invalid stage");
                continue;
            }
            best = best.max(saved.stage);
            let world = if saved.stage >= config.world.secondary_stage {
                WorldKind::Secondary
            } else {
                saved.world
            };
            self.place_piece(
                saved.stage,
                SpawnOrigin::Restore,
                Some(saved.position()),
                Some(world),
            );
        }

        if self.world.resource_mut::<Progression>().track(best) {
            let highest_stage = self.highest_stage();
            self.world
                .resource_mut::<Outbox>()
                .notify(Notification::ProgressionChanged { highest_stage });
        }

        // Unlock follows from progression; restoring never auto-switches.
        let highest = self.highest_stage();
        let view = {
            let mut view = self.world.resource_mut::<WorldView>();
            view.try_unlock(highest, &config.world);
            view.active = if view.unlocked {
                snapshot.active_world.unwrap_or_default()
            } else {
                WorldKind::Primary
            };
            *view
        };

        let balance = self.balance();
        let restored = self.piece_count();
        {
            let mut outbox = self.world.resource_mut::<Outbox>();
            outbox.notify(Notification::BalanceChanged { balance });
            outbox.notify(Notification::WorldChanged {
                active: view.active,
                unlocked: view.unlocked,
            });
        }
        self.push_event(GameEventKind::Restored { pieces: restored });
        info!(
            pieces = restored,
            balance,
            highest_stage = highest,
            "save restored"
        );
    }

    /// Advances the session by `elapsed` seconds, capped at
    /// `max_tick_delta`.
    pub fn tick(&mut self, elapsed: f64) {
        let limit = self.world.resource::<GameConfig>().max_tick_delta;
        let elapsed = if elapsed.is_finite() && elapsed > 0.0 {
            if elapsed > limit {
                debug!(elapsed, limit, "tick delta clamped");
            }
            elapsed.min(limit)
        } else {
            0.0
        };
        self.world.resource_mut::<DeltaTime>().0 = elapsed;
        {
            let mut clock = self.world.resource_mut::<SessionClock>();
            clock.tick += 1;
            clock.elapsed += elapsed;
        }

        self.schedule.run(&mut self.world);
        self.settle();
    }

    pub fn balance(&self) -> f64 {
        self.world.resource::<Ledger>().balance()
    }

    /// Credits `amount`; negative or non-finite amounts are refused.
    pub fn add_money(&mut self, amount: f64) -> bool {
        let added = self.world.resource_mut::<Ledger>().add(amount);
        if added {
            self.notify_balance();
        }
        self.settle();
        added
    }

    pub fn try_spend_money(&mut self, amount: f64) -> bool {
        let spent = self.spend(amount);
        self.settle();
        spent
    }

    fn spend(&mut self, amount: f64) -> bool {
        let spent = self.world.resource_mut::<Ledger>().try_spend(amount);
        if spent && amount > 0.0 {
            self.notify_balance();
        }
        spent
    }

    fn notify_balance(&mut self) {
        let balance = self.balance();
        self.world
            .resource_mut::<Outbox>()
            .notify(Notification::BalanceChanged { balance });
    }

    pub fn piece_count(&mut self) -> usize {
        self.world
            .query_filtered::<(), With<Stage>>()
            .iter(&self.world)
            .count()
    }

    pub fn pieces(&mut self) -> Vec<PieceSnapshot> {
        let mut query = self
            .world
            .query::<(Entity, &Stage, &Position, &WorldMembership, &FusionState)>();
        let mut pieces: Vec<PieceSnapshot> = query
            .iter(&self.world)
            .map(|(entity, stage, position, world, fusion)| PieceSnapshot {
                id: entity.to_bits(),
                stage: stage.0,
                position: *position,
                world: world.0,
                phase: fusion.phase(),
            })
            .collect();
        pieces.sort_by_key(|piece| piece.id);
        pieces
    }

    pub fn stage_of(&self, piece: Entity) -> Option<u32> {
        self.world.get::<Stage>(piece).map(|stage| stage.0)
    }

    pub fn position_of(&self, piece: Entity) -> Option<Position> {
        self.world.get::<Position>(piece).copied()
    }

    pub fn world_of(&self, piece: Entity) -> Option<WorldKind> {
        self.world.get::<WorldMembership>(piece).map(|world| world.0)
    }

    pub fn fusion_phase(&self, piece: Entity) -> Option<FusionPhase> {
        self.world.get::<FusionState>(piece).map(FusionState::phase)
    }

    pub fn auto_click_timer(&self, piece: Entity) -> Option<f64> {
        self.world.get::<AutoClicker>(piece).map(|clicker| clicker.timer)
    }

    /// Spawns a piece at a free spot. Fails when the board is full.
    pub fn spawn_piece(&mut self, stage: u32, origin: SpawnOrigin) -> Option<Entity> {
        let piece = self.place_piece(stage, origin, None, None);
        self.settle();
        piece
    }

    fn place_piece(
        &mut self,
        stage: u32,
        origin: SpawnOrigin,
        position: Option<Position>,
        world: Option<WorldKind>,
    ) -> Option<Entity> {
        let stage = stage.max(1);
        let (spawn, rules, click) = {
            let config = self.config();
            (config.spawn.clone(), config.world, config.click.clone())
        };
        if origin != SpawnOrigin::Restore && self.piece_count() >= spawn.max_pieces {
            debug!(stage, ?origin, "spawn refused, board full");
            return None;
        }

        let world = world.unwrap_or_else(|| rules.world_for_stage(stage));
        let position = match position {
            Some(position) => position,
            None => {
                let occupied = occupied_positions(&mut self.world, world);
                let mut rng = self.world.resource_mut::<SpawnRng>();
                find_spawn_position(&spawn, &occupied, &mut rng.0)
            }
        };
        let interval = self
            .world
            .resource::<GlobalModifiers>()
            .auto_click_interval(&click);
        let piece = self
            .world
            .spawn(PieceBundle::new(stage, position, world, interval))
            .id();

        self.world
            .resource_mut::<Outbox>()
            .notify(Notification::PieceSpawned {
                piece,
                stage,
                world,
            });
        self.push_event(GameEventKind::Spawned {
            stage,
            world,
            origin,
        });
        debug!(?piece, stage, ?origin, "piece spawned");

        if origin != SpawnOrigin::Restore {
            self.register_stage(piece, stage);
        }
        Some(piece)
    }

    /// Records a piece's new stage: raises progression, relocates it to the
    /// secondary world at the threshold, and unlocks that world once.
    fn register_stage(&mut self, piece: Entity, stage: u32) {
        let rules = self.config().world;

        if self.world.resource_mut::<Progression>().track(stage) {
            self.world
                .resource_mut::<Outbox>()
                .notify(Notification::ProgressionChanged {
                    highest_stage: stage,
                });
            self.push_event(GameEventKind::ProgressionRaised {
                highest_stage: stage,
            });
            info!(highest_stage = stage, "new best stage");
        }

        let target = rules.world_for_stage(stage);
        let relocated = match self.world.get_mut::<WorldMembership>(piece) {
            Some(mut membership) if membership.0 != target => {
                membership.0 = target;
                true
            }
            _ => false,
        };
        if relocated {
            self.world
                .resource_mut::<Outbox>()
                .notify(Notification::PieceRelocated {
                    piece,
                    world: target,
                });
            debug!(?piece, stage, ?target, "piece relocated");
        }

        let unlocked = {
            let mut view = self.world.resource_mut::<WorldView>();
            let unlocked = view.try_unlock(stage, &rules);
            if unlocked {
                view.active = WorldKind::Secondary;
            }
            unlocked
        };
        if unlocked {
            self.world
                .resource_mut::<Outbox>()
                .notify(Notification::WorldChanged {
                    active: WorldKind::Secondary,
                    unlocked: true,
                });
            self.push_event(GameEventKind::WorldUnlocked { stage });
            info!(stage, "secondary world unlocked");
        }
    }

    /// Direct tap: pays one reward right away, independent of the timer.
    pub fn tap(&mut self, piece: Entity) -> Option<f64> {
        let stage = self.stage_of(piece)?;
        let position = self.position_of(piece)?;
        let amount = {
            let multiplier = self.world.resource::<GlobalModifiers>().money_multiplier();
            reward_for(&self.config().click, stage, multiplier)
        };
        if !self.world.resource_mut::<Ledger>().add(amount) {
            self.settle();
            return None;
        }
        let balance = self.balance();
        {
            let mut outbox = self.world.resource_mut::<Outbox>();
            outbox.cue(SoundCue::Click);
            outbox.notify(Notification::RewardCollected {
                piece,
                amount,
                position,
            });
            outbox.notify(Notification::BalanceChanged { balance });
            outbox.cue(SoundCue::Coin);
        }
        self.push_event(GameEventKind::Reward {
            stage,
            amount,
            source: RewardSource::Tap,
        });
        self.settle();
        Some(amount)
    }

    pub fn move_piece(&mut self, piece: Entity, position: Position) -> bool {
        let moved = match self.world.get_mut::<Position>(piece) {
            Some(mut current) => {
                *current = position;
                true
            }
            None => false,
        };
        self.settle();
        moved
    }

    /// Two pieces started touching. Same-stage pieces note each other as
    /// fusion candidates; returns whether they did.
    pub fn contact_began(&mut self, a: Entity, b: Entity) -> bool {
        let matched = a != b
            && match (self.stage_of(a), self.stage_of(b)) {
                (Some(left), Some(right)) => left == right,
                _ => false,
            };
        if matched {
            for (piece, other) in [(a, b), (b, a)] {
                if let Some(mut state) = self.world.get_mut::<FusionState>(piece) {
                    state.candidate = Some(other);
                }
            }
        }
        self.settle();
        matched
    }

    pub fn contact_ended(&mut self, a: Entity, b: Entity) {
        for (piece, other) in [(a, b), (b, a)] {
            if let Some(mut state) = self.world.get_mut::<FusionState>(piece) {
                if state.candidate == Some(other) {
                    state.candidate = None;
                }
            }
        }
        self.settle();
    }

    /// Drag release. If the released piece holds a live same-stage candidate,
    /// the candidate gains a stage and the released piece is consumed.
    /// Returns the surviving piece.
    pub fn release(&mut self, piece: Entity) -> Option<Entity> {
        let merged = self.try_fuse(piece);
        self.settle();
        merged
    }

    fn try_fuse(&mut self, piece: Entity) -> Option<Entity> {
        let state = *self.world.get::<FusionState>(piece)?;
        let candidate = state.candidate?;
        if state.in_flight() {
            debug!(?piece, "release ignored, fusion already running");
            return None;
        }
        let stage = self.stage_of(piece)?;

        let candidate_ok = match (
            self.stage_of(candidate),
            self.world.get::<FusionState>(candidate),
        ) {
            (Some(candidate_stage), Some(candidate_state)) => {
                if candidate_state.in_flight() {
                    debug!(?candidate, "release ignored, candidate is fusing");
                    return None;
                }
                candidate_stage == stage
            }
            _ => false,
        };
        if !candidate_ok {
            if let Some(mut state) = self.world.get_mut::<FusionState>(piece) {
                state.candidate = None;
            }
            debug!(?piece, ?candidate, "dropped stale fusion candidate");
            return None;
        }

        let pulse = self.config().fusion.pulse_duration;
        self.world.despawn(piece);
        let mut query = self.world.query::<&mut FusionState>();
        for mut other in query.iter_mut(&mut self.world) {
            if other.candidate == Some(piece) {
                other.candidate = None;
            }
        }

        let promoted = stage + 1;
        if let Some(mut survivor_stage) = self.world.get_mut::<Stage>(candidate) {
            survivor_stage.0 = promoted;
        }
        if let Some(mut survivor_state) = self.world.get_mut::<FusionState>(candidate) {
            survivor_state.candidate = None;
            survivor_state.start_pulse(pulse);
        }

        {
            let mut outbox = self.world.resource_mut::<Outbox>();
            outbox.notify(Notification::PieceRemoved { piece });
            outbox.notify(Notification::FusionOccurred {
                survivor: candidate,
                stage: promoted,
            });
            outbox.cue(SoundCue::Fusion);
        }
        self.push_event(GameEventKind::Fused { stage: promoted });
        debug!(survivor = ?candidate, stage = promoted, "pieces fused");

        self.register_stage(candidate, promoted);
        Some(candidate)
    }

    pub fn auto_click_interval(&self) -> f64 {
        self.world
            .resource::<GlobalModifiers>()
            .auto_click_interval(&self.config().click)
    }

    pub fn money_multiplier(&self) -> f64 {
        self.world.resource::<GlobalModifiers>().money_multiplier()
    }

    pub fn apply_auto_click_reduction(&mut self, amount: f64) {
        self.add_auto_click_reduction(amount);
        self.settle();
    }

    fn add_auto_click_reduction(&mut self, amount: f64) {
        let click = self.config().click.clone();
        self.world
            .resource_mut::<GlobalModifiers>()
            .add_auto_click_reduction(amount, &click);
        self.retune_clickers();
    }

    pub fn increase_money_multiplier(&mut self, amount: f64) {
        self.world
            .resource_mut::<GlobalModifiers>()
            .increase_money_multiplier(amount);
        self.settle();
    }

    fn retune_clickers(&mut self) {
        let interval = self.auto_click_interval();
        let mut query = self.world.query::<&mut AutoClicker>();
        for mut clicker in query.iter_mut(&mut self.world) {
            clicker.retune(interval);
        }
    }

    pub fn highest_stage(&self) -> u32 {
        self.world.resource::<Progression>().highest_stage()
    }

    pub fn world_view(&self) -> WorldView {
        *self.world.resource::<WorldView>()
    }

    /// Flips the displayed world. Refused until the secondary world unlocks.
    pub fn toggle_world(&mut self) -> bool {
        let toggled = self.world.resource_mut::<WorldView>().toggle();
        if toggled {
            let view = self.world_view();
            self.world
                .resource_mut::<Outbox>()
                .notify(Notification::WorldChanged {
                    active: view.active,
                    unlocked: view.unlocked,
                });
        }
        self.settle();
        toggled
    }

    pub fn spawn_interval(&self) -> f64 {
        self.world.resource::<SpawnScheduler>().interval
    }

    pub fn auto_spawn_enabled(&self) -> bool {
        self.world.resource::<SpawnScheduler>().enabled
    }

    pub fn visible_shop_stage_limit(&self) -> u32 {
        visible_stage_limit(&self.config().shop, self.highest_stage())
    }

    pub fn shop_purchase_count(&self, stage: u32) -> u32 {
        self.world.resource::<ShopPurchases>().count(stage)
    }

    pub fn stage_price(&self, stage: u32) -> u64 {
        stage_price(&self.config().shop, stage, self.shop_purchase_count(stage))
    }

    /// Buys a piece of `stage` at the quoted `price`. Either everything
    /// happens (debit, spawn, purchase count) or nothing does. A quote
    /// below the current shop price is refused.
    pub fn try_buy_from_shop(&mut self, stage: u32, price: u64) -> bool {
        let bought = self.buy_from_shop(stage, price);
        self.settle();
        bought
    }

    /// Buys a piece of `stage` at its current shop price.
    pub fn buy_stage(&mut self, stage: u32) -> bool {
        let price = self.stage_price(stage);
        self.try_buy_from_shop(stage, price)
    }

    fn buy_from_shop(&mut self, stage: u32, price: u64) -> bool {
        let limit = self.visible_shop_stage_limit();
        if stage < 1 || stage > limit {
            debug!(stage, limit, "shop stage not available");
            return false;
        }
        let current = self.stage_price(stage);
        if price < current {
            debug!(stage, price, current, "shop purchase refused, stale quote");
            return false;
        }
        if self.piece_count() >= self.config().spawn.max_pieces {
            debug!(stage, "shop purchase refused, board full");
            return false;
        }
        let cost = price as f64;
        if !self.world.resource_mut::<Ledger>().try_spend(cost) {
            debug!(stage, price, "shop purchase refused, insufficient funds");
            return false;
        }
        if self.place_piece(stage, SpawnOrigin::Shop, None, None).is_none() {
            self.world.resource_mut::<Ledger>().add(cost);
            warn!(stage, price, "shop spawn failed, purchase refunded");
            return false;
        }

        self.world.resource_mut::<ShopPurchases>().register(stage);
        if price > 0 {
            self.notify_balance();
        }
        self.world.resource_mut::<Outbox>().cue(SoundCue::Purchase);
        self.push_event(GameEventKind::ShopPurchase { stage, price });
        info!(stage, price, "bought from shop");
        true
    }

    fn upgrade_maxed(&self, kind: UpgradeKind) -> bool {
        let config = &self.config().upgrades;
        let tracks = self.world.resource::<UpgradeTracks>();
        match kind {
            UpgradeKind::AutoClick => tracks.auto_click.capped(&config.auto_click),
            UpgradeKind::AutoSpawn => {
                tracks.auto_spawn.capped(&config.auto_spawn)
                    || self
                        .world
                        .resource::<SpawnScheduler>()
                        .at_floor(config.min_spawn_interval)
            }
            UpgradeKind::CoinMultiplier => {
                tracks.coin_multiplier.capped(&config.coin_multiplier)
            }
        }
    }

    pub fn upgrade_price(&self, kind: UpgradeKind) -> PriceTag {
        if self.upgrade_maxed(kind) {
            PriceTag::Max
        } else {
            PriceTag::Price(self.world.resource::<UpgradeTracks>().get(kind).current_price)
        }
    }

    pub fn upgrade_purchases(&self, kind: UpgradeKind) -> u32 {
        self.world.resource::<UpgradeTracks>().get(kind).purchases
    }

    pub fn can_buy_upgrade(&self, kind: UpgradeKind) -> bool {
        match self.upgrade_price(kind) {
            PriceTag::Price(price) => self.world.resource::<Ledger>().can_afford(price as f64),
            PriceTag::Max => false,
        }
    }

    pub fn buy_upgrade(&mut self, kind: UpgradeKind) -> PurchaseOutcome {
        let outcome = self.purchase_upgrade(kind);
        self.settle();
        outcome
    }

    fn purchase_upgrade(&mut self, kind: UpgradeKind) -> PurchaseOutcome {
        let PriceTag::Price(price) = self.upgrade_price(kind) else {
            return PurchaseOutcome::Maxed;
        };
        if !self.world.resource_mut::<Ledger>().try_spend(price as f64) {
            return PurchaseOutcome::InsufficientFunds;
        }

        let config = self.config().upgrades.clone();
        match kind {
            UpgradeKind::AutoClick => self.add_auto_click_reduction(config.auto_click_reduction),
            UpgradeKind::AutoSpawn => {
                let mut scheduler = self.world.resource_mut::<SpawnScheduler>();
                if scheduler.enabled {
                    scheduler.reduce_interval(config.auto_spawn_reduction, config.min_spawn_interval);
                } else {
                    scheduler.enable(config.auto_spawn_initial_interval, config.min_spawn_interval);
                }
            }
            UpgradeKind::CoinMultiplier => {
                let made = self.upgrade_purchases(UpgradeKind::CoinMultiplier);
                let step = coin_multiplier_step(&config, made);
                self.world
                    .resource_mut::<GlobalModifiers>()
                    .increase_money_multiplier(step);
            }
        }

        let track_config = match kind {
            UpgradeKind::AutoClick => &config.auto_click,
            UpgradeKind::AutoSpawn => &config.auto_spawn,
            UpgradeKind::CoinMultiplier => &config.coin_multiplier,
        };
        self.world
            .resource_mut::<UpgradeTracks>()
            .get_mut(kind)
            .record_purchase(track_config);

        self.notify_balance();
        self.world.resource_mut::<Outbox>().cue(SoundCue::Purchase);
        self.push_event(GameEventKind::Upgrade { kind, price });
        info!(upgrade = kind.label(), price, "upgrade bought");
        PurchaseOutcome::Purchased { price }
    }

    pub fn audio_settings(&self) -> AudioSettings {
        *self.world.resource::<AudioSettings>()
    }

    pub fn set_music_muted(&mut self, muted: bool) -> anyhow::Result<()> {
        self.update_audio(|settings| settings.music_muted = muted)
    }

    pub fn set_coin_muted(&mut self, muted: bool) -> anyhow::Result<()> {
        self.update_audio(|settings| settings.coin_muted = muted)
    }

    pub fn set_master_volume(&mut self, volume: f32) -> anyhow::Result<()> {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.update_audio(|settings| settings.master_volume = volume)
    }

    fn update_audio(&mut self, change: impl FnOnce(&mut AudioSettings)) -> anyhow::Result<()> {
        let settings = {
            let mut settings = self.world.resource_mut::<AudioSettings>();
            change(&mut *settings);
            *settings
        };
        save_audio_settings(self.collaborators.store.as_mut(), &settings)
    }

    fn push_event(&mut self, kind: GameEventKind) {
        let tick = self.tick_count();
        self.world
            .resource_mut::<GameEventLog>()
            .push(GameEvent::new(tick, kind));
    }

    /// Publishes the observer snapshot and delivers everything queued in the
    /// outbox. Runs at the end of every public operation.
    fn settle(&mut self) {
        self.refresh_observer();

        let (notifications, cues) = self.world.resource_mut::<Outbox>().take();
        let audio = self.audio_settings();
        for notification in &notifications {
            self.collaborators.sink.notify(notification);
        }
        for cue in cues {
            if cue == SoundCue::Coin && audio.coin_muted {
                continue;
            }
            self.collaborators
                .sound
                .play(cue, audio.master_volume.clamp(0.0, 1.0));
        }
    }

    fn refresh_observer(&mut self) {
        let pieces = self.pieces();
        let balance = self.balance();
        let limit = self.visible_shop_stage_limit();
        let shop = (1..=limit)
            .map(|stage| {
                let price = self.stage_price(stage);
                ShopRowSnapshot {
                    stage,
                    price,
                    purchases: self.shop_purchase_count(stage),
                    affordable: balance >= price as f64,
                }
            })
            .collect();
        let upgrades = UpgradeKind::all()
            .into_iter()
            .map(|kind| UpgradeSnapshot {
                kind,
                label: kind.label().to_string(),
                purchases: self.upgrade_purchases(kind),
                price: self.upgrade_price(kind),
                enabled: self.can_buy_upgrade(kind),
            })
            .collect();
        let clock = self.world.resource::<SessionClock>().clone();

        let snapshot = ObserverSnapshot {
            tick: clock.tick,
            elapsed: clock.elapsed,
            balance,
            highest_stage: self.highest_stage(),
            money_multiplier: self.money_multiplier(),
            auto_click_interval: self.auto_click_interval(),
            auto_spawn_enabled: self.auto_spawn_enabled(),
            spawn_interval: self.spawn_interval(),
            world: self.world_view(),
            visible_stage_limit: limit,
            pieces,
            shop,
            upgrades,
            events: self.world.resource::<GameEventLog>().recent(32),
        };

        match self.observer.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(_) => warn!("observer lock poisoned, snapshot not published"),
        }
    }
}
