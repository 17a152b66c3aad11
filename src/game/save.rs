//! Save snapshot and the key-value stores it is written to.
//!
//! A snapshot is one JSON object under [`SAVE_KEY`]. Loading is lenient:
//! every field, and every element of the piece and shop lists, is decoded on
//! its own so one bad value only costs that value.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::game::{AudioSettings, Position, UpgradeSaveData, WorldKind};

pub const SAVE_KEY: &str = "MergeBrainrotSave";
/// Bump when a field is added; older saves still load with defaults.
pub const SAVE_VERSION: u32 = 1;

pub const MUSIC_MUTED_KEY: &str = "MusicMuted";
pub const COIN_MUTED_KEY: &str = "CoinMuted";
pub const MASTER_VOLUME_KEY: &str = "MasterVolume";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PieceSave {
    pub stage: u32,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default)]
    pub world: WorldKind,
}

impl PieceSave {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopPurchaseSave {
    pub stage: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveSnapshot {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub money: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest_stage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_spawn_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_interval: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_world: Option<WorldKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub money_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_click_reduction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrades: Option<UpgradeSaveData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pieces: Option<Vec<PieceSave>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_purchases: Option<Vec<ShopPurchaseSave>>,
}

impl Default for SaveSnapshot {
    fn default() -> Self {
        Self {
            version: SAVE_VERSION,
            money: None,
            highest_stage: None,
            auto_spawn_enabled: None,
            spawn_interval: None,
            active_world: None,
            money_multiplier: None,
            auto_click_reduction: None,
            upgrades: None,
            pieces: None,
            shop_purchases: None,
        }
    }
}

fn field<T: DeserializeOwned>(object: &Map<String, Value>, key: &str) -> Option<T> {
    let value = object.get(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(field = key, %err, "ignoring unreadable save field");
            None
        }
    }
}

fn list<T: DeserializeOwned>(object: &Map<String, Value>, key: &str) -> Option<Vec<T>> {
    let Some(items) = object.get(key)?.as_array() else {
        warn!(field = key, "save field is not a list");
        return None;
    };
    let decoded = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item.clone()) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(field = key, index, %err, "skipping unreadable save entry");
                None
            }
        })
        .collect();
    Some(decoded)
}

impl SaveSnapshot {
    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).context("encoding save snapshot")
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(text).context("save is not valid JSON")?;
        let Value::Object(object) = value else {
            bail!("save is not a JSON object");
        };

        let version = field::<u32>(&object, "version").unwrap_or(SAVE_VERSION);
        if version > SAVE_VERSION {
            warn!(version, supported = SAVE_VERSION, "save written by a newer build");
        }

        Ok(Self {
            version,
            money: field(&object, "money"),
            highest_stage: field(&object, "highest_stage"),
            auto_spawn_enabled: field(&object, "auto_spawn_enabled"),
            spawn_interval: field(&object, "spawn_interval"),
            active_world: field(&object, "active_world"),
            money_multiplier: field(&object, "money_multiplier"),
            auto_click_reduction: field(&object, "auto_click_reduction"),
            upgrades: field(&object, "upgrades"),
            pieces: list(&object, "pieces"),
            shop_purchases: list(&object, "shop_purchases"),
        })
    }
}

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating save directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(text))
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        let temp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&temp, value).with_context(|| format!("writing {}", temp.display()))?;
        fs::rename(&temp, &path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

/// In-process store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Reads the snapshot, treating a missing, unreadable or malformed save as
/// no save at all.
pub fn read_snapshot(store: &dyn KeyValueStore) -> Option<SaveSnapshot> {
    let text = match store.get(SAVE_KEY) {
        Ok(Some(text)) => text,
        Ok(None) => return None,
        Err(err) => {
            warn!(error = %err, "could not read save");
            return None;
        }
    };
    match SaveSnapshot::from_json(&text) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            warn!(error = %err, "discarding malformed save");
            None
        }
    }
}

pub fn write_snapshot(store: &mut dyn KeyValueStore, snapshot: &SaveSnapshot) -> anyhow::Result<()> {
    let text = snapshot.to_json()?;
    store
        .set(SAVE_KEY, &text)
        .with_context(|| format!("storing {SAVE_KEY}"))
}

fn read_flag(store: &dyn KeyValueStore, key: &str) -> Option<bool> {
    let raw = store.get(key).ok().flatten()?;
    match raw.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        other => {
            warn!(key, value = other, "ignoring unreadable audio setting");
            None
        }
    }
}

pub fn load_audio_settings(store: &dyn KeyValueStore) -> AudioSettings {
    let defaults = AudioSettings::default();
    let master_volume = store
        .get(MASTER_VOLUME_KEY)
        .ok()
        .flatten()
        .and_then(|raw| raw.trim().parse::<f32>().ok())
        .filter(|volume| volume.is_finite())
        .map(|volume| volume.clamp(0.0, 1.0))
        .unwrap_or(defaults.master_volume);
    AudioSettings {
        music_muted: read_flag(store, MUSIC_MUTED_KEY).unwrap_or(defaults.music_muted),
        coin_muted: read_flag(store, COIN_MUTED_KEY).unwrap_or(defaults.coin_muted),
        master_volume,
    }
}

pub fn save_audio_settings(
    store: &mut dyn KeyValueStore,
    settings: &AudioSettings,
) -> anyhow::Result<()> {
    let flag = |on: bool| if on { "1" } else { "0" };
    store.set(MUSIC_MUTED_KEY, flag(settings.music_muted))?;
    store.set(COIN_MUTED_KEY, flag(settings.coin_muted))?;
    store.set(MASTER_VOLUME_KEY, &settings.master_volume.to_string())?;
    Ok(())
}
