use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use merge_brainrot::game::{
    Collaborators, FileStore, GameConfig, GameSession, ObserverSnapshot, format_money,
    world_label,
};

/// Host knobs read from `MERGE_*` environment variables.
struct HostSettings {
    config_path: Option<PathBuf>,
    save_dir: PathBuf,
    tick: Duration,
    autosave: Duration,
    report: Duration,
    max_delta: Duration,
}

fn env_number<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl HostSettings {
    fn from_env() -> anyhow::Result<Self> {
        let tick_ms: u64 = env_number("MERGE_TICK_MS", 100)?;
        let autosave_secs: u64 = env_number("MERGE_AUTOSAVE_SECS", 30)?;
        let report_secs: u64 = env_number("MERGE_REPORT_SECS", 5)?;
        let max_delta_ms: u64 = env_number("MERGE_MAX_DELTA_MS", 250)?;
        Ok(Self {
            config_path: env::var_os("MERGE_CONFIG").map(PathBuf::from),
            save_dir: env::var_os("MERGE_SAVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("save")),
            tick: Duration::from_millis(tick_ms.max(1)),
            autosave: Duration::from_secs(autosave_secs.max(1)),
            report: Duration::from_secs(report_secs.max(1)),
            max_delta: Duration::from_millis(max_delta_ms.max(1)),
        })
    }
}

fn report(observer: &Arc<RwLock<ObserverSnapshot>>) {
    let snapshot = match observer.read() {
        Ok(guard) => guard.clone(),
        Err(_) => {
            warn!("observer lock poisoned");
            return;
        }
    };
    info!(
        tick = snapshot.tick,
        balance = %format_money(snapshot.balance),
        best_stage = snapshot.highest_stage,
        pieces = snapshot.pieces.len(),
        world = world_label(snapshot.world.active),
        multiplier = snapshot.money_multiplier,
        "status"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = HostSettings::from_env()?;
    let config = match &settings.config_path {
        Some(path) => GameConfig::from_json_file(path)?,
        None => GameConfig::default(),
    };
    let store = FileStore::open(&settings.save_dir)?;
    info!(save_dir = %store.dir().display(), "using save directory");

    let observer = Arc::new(RwLock::new(ObserverSnapshot::default()));
    let mut session =
        GameSession::with_observer(config, Collaborators::headless(store), observer.clone())
            .context("invalid game configuration")?;
    session.begin_session();

    let shutdown_notify = Arc::new(Notify::new());
    let notify_for_simulation = shutdown_notify.clone();
    let tick = settings.tick;
    let autosave = settings.autosave;
    let max_delta = settings.max_delta.as_secs_f64();
    let simulation_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        let mut autosave_timer = tokio::time::interval(autosave);
        autosave_timer.tick().await;
        let mut last = Instant::now();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let elapsed = now.duration_since(last).as_secs_f64().min(max_delta);
                    last = now;
                    session.tick(elapsed);
                },
                _ = autosave_timer.tick() => {
                    if let Err(err) = session.request_save() {
                        warn!(error = %err, "autosave failed");
                    }
                },
                _ = notify_for_simulation.notified() => break,
            }
        }
        session
    });

    let mut report_timer = tokio::time::interval(settings.report);
    loop {
        tokio::select! {
            _ = report_timer.tick() => report(&observer),
            result = tokio::signal::ctrl_c() => {
                result.context("listening for ctrl-c")?;
                info!("shutting down");
                break;
            }
        }
    }

    shutdown_notify.notify_one();
    let mut session = simulation_task.await?;
    session.request_save().context("final save")?;
    report(&observer);

    Ok(())
}
