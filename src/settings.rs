use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::scoring::ScoringConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachingSettings {
    /// External analyzer to run for coaching, e.g. `python3 motion_analyzer.py`.
    /// Rule-based feedback is used when unset or when the analyzer fails.
    pub analyzer_command: Option<String>,
    pub timeout_secs: u64,
}

impl Default for CoachingSettings {
    fn default() -> Self {
        Self {
            analyzer_command: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub scoring: ScoringConfig,
    pub coaching: CoachingSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring unreadable settings at {}: {err}",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> UserSettings {
        self.read().clone()
    }

    pub fn scoring(&self) -> ScoringConfig {
        self.read().scoring
    }

    pub fn coaching(&self) -> CoachingSettings {
        self.read().coaching.clone()
    }

    /// Apply `change` and write the result to disk.
    pub fn update<F>(&self, change: F) -> Result<UserSettings>
    where
        F: FnOnce(&mut UserSettings),
    {
        let mut guard = self.write();
        let mut next = guard.clone();
        change(&mut next);
        next.scoring = next.scoring.sanitized();
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    pub fn reset(&self) -> Result<UserSettings> {
        self.update(|settings| *settings = UserSettings::default())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::SmoothingPolicy;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("dance-coach-settings-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let store = SettingsStore::new(temp_path("settings.json")).unwrap();
        assert_eq!(store.get(), UserSettings::default());
        assert_eq!(store.coaching().timeout_secs, 10);
    }

    #[test]
    fn test_update_persists() {
        let path = temp_path("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        store
            .update(|settings| {
                settings.scoring.policy = SmoothingPolicy::RunningMax;
                settings.scoring.coaching_probability = 3.0;
                settings.coaching.analyzer_command = Some("python3 analyzer.py".into());
            })
            .unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.scoring().policy, SmoothingPolicy::RunningMax);
        assert_eq!(reopened.scoring().coaching_probability, 1.0);
        assert_eq!(
            reopened.coaching().analyzer_command.as_deref(),
            Some("python3 analyzer.py")
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_path("settings.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"scoring":{"confidence_threshold":0.5}}"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.scoring().confidence_threshold, 0.5);
        assert_eq!(store.scoring().expected_keypoints, 17);
        assert_eq!(store.coaching(), CoachingSettings::default());
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let path = temp_path("settings.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.get(), UserSettings::default());
    }
}
