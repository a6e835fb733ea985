use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ShareError;

const PREFERENCES_FILE: &str = "preferences.json";
const CONFIG_FILE: &str = "config.json";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
struct Preferences {
    #[serde(default)]
    token: Option<String>,
}

/// Persists the last stage token so the credential screen can pre-fill it.
pub struct CredentialStore {
    preferences: Mutex<Preferences>,
    file_path: PathBuf,
}

impl CredentialStore {
    pub fn new(data_dir: &str) -> Self {
        let file_path = PathBuf::from(data_dir).join(PREFERENCES_FILE);
        let preferences = load_json(&file_path);
        Self {
            preferences: Mutex::new(preferences),
            file_path,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn set_token(&self, token: &str) {
        self.lock().token = Some(token.to_string());
        if let Err(e) = self.save() {
            tracing::warn!("failed to persist token: {e}");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Preferences> {
        self.preferences.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self) -> Result<(), ShareError> {
        let preferences = self.lock().clone();
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ShareError::Storage(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&preferences)
            .map_err(|e| ShareError::Storage(e.to_string()))?;
        std::fs::write(&self.file_path, json).map_err(|e| ShareError::Storage(e.to_string()))
    }
}

/// Timing and capture knobs for the session controller.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StageConfig {
    /// Minimum time the loading state is held after a join attempt.
    pub join_settle_ms: u64,
    /// How long the finishing destination is shown before returning to token entry.
    pub finish_delay_ms: u64,
    /// Delay before the publish strategy is re-applied after sharing stops.
    pub strategy_refresh_delay_ms: u64,
    /// Delay before the loopback audio loop starts reading.
    pub audio_start_delay_ms: u64,
    /// Delay before the capture service reports ready after it starts.
    pub service_ready_delay_ms: u64,
    /// Publish the system-audio custom source instead of the microphone.
    pub publish_system_audio: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            join_settle_ms: 1000,
            finish_delay_ms: 200,
            strategy_refresh_delay_ms: 200,
            audio_start_delay_ms: 200,
            service_ready_delay_ms: 200,
            publish_system_audio: false,
        }
    }
}

impl StageConfig {
    /// Load `config.json` from `data_dir`, falling back to defaults.
    pub fn load(data_dir: &str) -> Self {
        load_json(&PathBuf::from(data_dir).join(CONFIG_FILE))
    }

    pub fn join_settle(&self) -> Duration {
        Duration::from_millis(self.join_settle_ms)
    }

    pub fn finish_delay(&self) -> Duration {
        Duration::from_millis(self.finish_delay_ms)
    }

    pub fn strategy_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.strategy_refresh_delay_ms)
    }

    pub fn audio_start_delay(&self) -> Duration {
        Duration::from_millis(self.audio_start_delay_ms)
    }

    pub fn service_ready_delay(&self) -> Duration {
        Duration::from_millis(self.service_ready_delay_ms)
    }
}

fn load_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!("ignoring unreadable {}: {e}", path.display());
            T::default()
        }),
        Err(_) => T::default(),
    }
}
