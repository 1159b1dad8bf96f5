// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{tone::Timbre, trainer::Speed};

/// Storage key for the instrument settings.
pub const INSTRUMENT_KEY: &str = "keyboard-piano-settings-v1";

/// Storage key for the trainer speed.
pub const TRAINER_SPEED_KEY: &str = "noteTrainerSpeed";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unable to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// An opaque string key-value store.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError>;
}

/// A store that forgets everything on exit.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A store kept as a JSON object of strings in a single file.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: &Path) -> FileStore {
        FileStore {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<BTreeMap<String, String>, SettingsError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(SettingsError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl SettingsStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let _guard = self.lock.lock();
        // A corrupt file is overwritten.
        let mut values = self.read().unwrap_or_default();
        values.insert(key.to_string(), value.to_string());
        let contents = serde_json::to_string_pretty(&values)?;
        fs::write(&self.path, contents).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Reads a key, logging storage errors and treating them as absent.
fn read_value(store: &dyn SettingsStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!(key, err = %e, "Unable to read settings.");
            None
        }
    }
}

fn write_value(store: &dyn SettingsStore, key: &str, value: &str) {
    if let Err(e) = store.set(key, value) {
        warn!(key, err = %e, "Unable to save settings.");
    }
}

/// Persisted instrument preferences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentSettings {
    #[serde(rename = "waveform", serialize_with = "serialize_timbre")]
    pub timbre: Timbre,
    pub volume: f32,
    pub show_keyboard_keys: bool,
}

fn serialize_timbre<S: serde::Serializer>(timbre: &Timbre, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&timbre.to_string())
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        InstrumentSettings {
            timbre: Timbre::Piano,
            volume: 0.2,
            show_keyboard_keys: true,
        }
    }
}

impl InstrumentSettings {
    /// Overlays the stored settings onto the given defaults. Each field is
    /// validated on its own; anything missing or invalid keeps its default.
    pub fn load(store: &dyn SettingsStore, defaults: InstrumentSettings) -> InstrumentSettings {
        let Some(raw) = read_value(store, INSTRUMENT_KEY) else {
            return defaults;
        };
        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(err = %e, "Ignoring malformed instrument settings.");
                return defaults;
            }
        };

        let mut settings = defaults;
        if let Some(timbre) = parsed
            .get("waveform")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Timbre>().ok())
        {
            settings.timbre = timbre;
        }
        if let Some(volume) = parsed
            .get("volume")
            .and_then(Value::as_f64)
            .filter(|v| (0.0..=1.0).contains(v))
        {
            settings.volume = volume as f32;
        }
        if let Some(show) = parsed.get("showKeyboardKeys").and_then(Value::as_bool) {
            settings.show_keyboard_keys = show;
        }
        settings
    }

    pub fn save(&self, store: &dyn SettingsStore) {
        match serde_json::to_string(self) {
            Ok(json) => write_value(store, INSTRUMENT_KEY, &json),
            Err(e) => warn!(err = %e, "Unable to encode instrument settings."),
        }
    }
}

/// Loads the trainer speed, falling back to the default for anything but a
/// supported number of seconds.
pub fn load_speed(store: &dyn SettingsStore) -> Speed {
    read_value(store, TRAINER_SPEED_KEY)
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.fract() == 0.0 && *seconds >= 0.0)
        .and_then(|seconds| Speed::try_from(seconds as u64).ok())
        .unwrap_or_default()
}

pub fn save_speed(store: &dyn SettingsStore, speed: Speed) {
    write_value(store, TRAINER_SPEED_KEY, &speed.seconds().to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn get(&self, _: &str) -> Result<Option<String>, SettingsError> {
            Err(SettingsError::Io {
                path: PathBuf::from("/nonexistent"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            })
        }

        fn set(&self, key: &str, _: &str) -> Result<(), SettingsError> {
            self.get(key).map(|_| ())
        }
    }

    #[test]
    fn test_instrument_round_trip() {
        let store = MemoryStore::new();
        let settings = InstrumentSettings {
            timbre: Timbre::Triangle,
            volume: 0.5,
            show_keyboard_keys: false,
        };
        settings.save(&store);

        let raw: Value = serde_json::from_str(&store.get(INSTRUMENT_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(
            serde_json::json!({"waveform": "triangle", "volume": 0.5, "showKeyboardKeys": false}),
            raw
        );
        assert_eq!(
            settings,
            InstrumentSettings::load(&store, InstrumentSettings::default())
        );
    }

    #[test]
    fn test_fields_validated_independently() {
        let store = MemoryStore::new();
        store
            .set(
                INSTRUMENT_KEY,
                r#"{"waveform": "kazoo", "volume": 0.7, "showKeyboardKeys": "yes"}"#,
            )
            .unwrap();
        let settings = InstrumentSettings::load(&store, InstrumentSettings::default());
        assert_eq!(Timbre::Piano, settings.timbre);
        assert_eq!(0.7, settings.volume);
        assert!(settings.show_keyboard_keys);

        store
            .set(INSTRUMENT_KEY, r#"{"waveform": "sine", "volume": 1.5}"#)
            .unwrap();
        let settings = InstrumentSettings::load(&store, InstrumentSettings::default());
        assert_eq!(Timbre::Sine, settings.timbre);
        assert_eq!(0.2, settings.volume);
    }

    #[test]
    fn test_malformed_falls_back() {
        let store = MemoryStore::new();
        let defaults = InstrumentSettings {
            volume: 0.4,
            ..Default::default()
        };
        assert_eq!(defaults, InstrumentSettings::load(&store, defaults));

        store.set(INSTRUMENT_KEY, "{not json").unwrap();
        assert_eq!(defaults, InstrumentSettings::load(&store, defaults));

        assert_eq!(defaults, InstrumentSettings::load(&BrokenStore, defaults));
        defaults.save(&BrokenStore);
    }

    #[test]
    fn test_speed() {
        let store = MemoryStore::new();
        assert_eq!(Speed::default(), load_speed(&store));

        save_speed(&store, Speed::try_from(8).unwrap());
        assert_eq!(Some("8".to_string()), store.get(TRAINER_SPEED_KEY).unwrap());
        assert_eq!(Speed::try_from(8).unwrap(), load_speed(&store));

        store.set(TRAINER_SPEED_KEY, "3.0").unwrap();
        assert_eq!(Speed::try_from(3).unwrap(), load_speed(&store));

        for raw in ["4", "3.5", "-3", "fast", ""] {
            store.set(TRAINER_SPEED_KEY, raw).unwrap();
            assert_eq!(Speed::default(), load_speed(&store), "{}", raw);
        }
        assert_eq!(Speed::default(), load_speed(&BrokenStore));
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = FileStore::new(&path);
        assert_eq!(None, store.get("missing").unwrap());

        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        assert_eq!(Some("1".to_string()), store.get("a").unwrap());

        let reopened = FileStore::new(&path);
        assert_eq!(Some("2".to_string()), reopened.get("b").unwrap());

        fs::write(&path, "garbage").unwrap();
        assert!(matches!(store.get("a"), Err(SettingsError::Json(_))));
        store.set("a", "3").unwrap();
        assert_eq!(Some("3".to_string()), store.get("a").unwrap());
        assert_eq!(None, store.get("b").unwrap());
    }
}
