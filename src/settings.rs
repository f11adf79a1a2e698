use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use crate::events::{Listeners, Subscription};
use crate::models::RecognitionMode;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const MODE_ENV: &str = "INKCALC_RECOGNITION_MODE";
pub const ENDPOINT_ENV: &str = "INKCALC_CLOUD_ENDPOINT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognitionSettings {
    pub mode: RecognitionMode,
    /// Identifier of the remote recognizer
    pub provider: String,
    /// Hybrid mode escalates local results below this confidence
    pub min_confidence: f64,
    pub cache_enabled: bool,
    pub endpoint: String,
    pub model: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            mode: RecognitionMode::Hybrid,
            provider: "trocr".into(),
            min_confidence: 0.7,
            cache_enabled: true,
            endpoint: "http://127.0.0.1:8000".into(),
            model: None,
            request_timeout_ms: 15_000,
        }
    }
}

impl RecognitionSettings {
    /// Apply `INKCALC_*` overrides from `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(MODE_ENV) {
            match raw.parse() {
                Ok(mode) => self.mode = mode,
                Err(err) => log_warn!("ignoring {MODE_ENV}: {err}"),
            }
        }
        if let Some(endpoint) = lookup(ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint.trim().to_string();
            }
        }
    }
}

/// Recognition settings persisted as JSON, with synchronous change listeners.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<RecognitionSettings>,
    listeners: Listeners<RecognitionSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        Self::with_env(path, |key| std::env::var(key).ok())
    }

    pub fn with_env(path: PathBuf, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut data = if path.exists() {
            match fs::read_to_string(&path) {
                Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                    log_warn!("settings at {} are corrupt, using defaults: {err}", path.display());
                    RecognitionSettings::default()
                }),
                Err(err) => {
                    log_warn!("settings at {} are unreadable, using defaults: {err}", path.display());
                    RecognitionSettings::default()
                }
            }
        } else {
            RecognitionSettings::default()
        };
        data.apply_overrides(lookup);

        Ok(Self {
            path,
            data: RwLock::new(data),
            listeners: Listeners::new(),
        })
    }

    pub fn get(&self) -> RecognitionSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, settings: RecognitionSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
            self.persist(&settings)?;
            *guard = settings.clone();
        }
        self.listeners.notify(&settings);
        Ok(())
    }

    /// Read-modify-write helper.
    pub fn modify(&self, change: impl FnOnce(&mut RecognitionSettings)) -> Result<RecognitionSettings> {
        let mut settings = self.get();
        change(&mut settings);
        self.update(settings.clone())?;
        Ok(settings)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RecognitionSettings) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn persist(&self, data: &RecognitionSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::with_env(dir.path().join("settings.json"), no_env).unwrap();
        assert_eq!(store.get(), RecognitionSettings::default());
    }

    #[test]
    fn unreadable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::create_dir(&path).unwrap();

        let store = SettingsStore::with_env(path, no_env).unwrap();
        assert_eq!(store.get(), RecognitionSettings::default());
    }

    #[test]
    fn updates_persist_and_notify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::with_env(path.clone(), no_env).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = store.subscribe(move |settings| {
            sink.lock().unwrap().push(settings.mode);
        });

        store
            .modify(|s| {
                s.mode = RecognitionMode::Cloud;
                s.min_confidence = 0.5;
            })
            .unwrap();
        subscription.unsubscribe();
        store.modify(|s| s.mode = RecognitionMode::Local).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![RecognitionMode::Cloud]);

        let reopened = SettingsStore::with_env(path, no_env).unwrap();
        assert_eq!(reopened.get().mode, RecognitionMode::Local);
        assert_eq!(reopened.get().min_confidence, 0.5);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let store = SettingsStore::with_env(path, no_env).unwrap();
        assert_eq!(store.get(), RecognitionSettings::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"mode":"local","minConfidence":0.9}"#).unwrap();
        let settings = SettingsStore::with_env(path, no_env).unwrap().get();
        assert_eq!(settings.mode, RecognitionMode::Local);
        assert_eq!(settings.min_confidence, 0.9);
        assert!(settings.cache_enabled);
        assert_eq!(settings.provider, "trocr");
    }

    #[test]
    fn environment_overrides_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = |key: &str| match key {
            MODE_ENV => Some("CLOUD".to_string()),
            ENDPOINT_ENV => Some("https://ocr.example.test".to_string()),
            _ => None,
        };
        let settings = SettingsStore::with_env(dir.path().join("s.json"), lookup)
            .unwrap()
            .get();
        assert_eq!(settings.mode, RecognitionMode::Cloud);
        assert_eq!(settings.endpoint, "https://ocr.example.test");
    }

    #[test]
    fn invalid_mode_override_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = |key: &str| (key == MODE_ENV).then(|| "turbo".to_string());
        let settings = SettingsStore::with_env(dir.path().join("s.json"), lookup)
            .unwrap()
            .get();
        assert_eq!(settings.mode, RecognitionMode::Hybrid);
    }
}
