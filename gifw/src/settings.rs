//! User settings kept between sessions.
//!
//! Settings are string values stored under a name, optionally scoped to the map version. Values
//! read back are checked against the values a setting allows, and invalid values are treated as
//! absent.

use std::collections::BTreeMap;
use std::path::PathBuf;

use gifw_types::units::UnitSystem;
use log::warn;
use maybe_sync::MaybeSend;

use crate::error::{GifwError, ValidationIssue};

const KEY_PREFIX: &str = "gifw";
const MAX_RECENT_VERSIONS: usize = 5;
/// Accuracy thresholds the user can choose, in metres.
pub const ACCURACY_THRESHOLDS: [u32; 3] = [10, 20, 50];
const DEFAULT_ACCURACY_THRESHOLD: u32 = 20;

/// Key-value store backing the settings.
pub trait SettingsStorage: MaybeSend {
    /// Value stored under the name.
    fn get(&self, name: &str) -> Option<String>;
    /// Stores the value.
    fn set(&mut self, name: &str, value: String) -> Result<(), GifwError>;
    /// Removes the value.
    fn remove(&mut self, name: &str) -> Result<(), GifwError>;
}

/// Storage keeping values in memory only.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage(BTreeMap<String, String>);

impl SettingsStorage for MemoryStorage {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: String) -> Result<(), GifwError> {
        self.0.insert(name.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), GifwError> {
        self.0.remove(name);
        Ok(())
    }
}

/// Storage writing all values to a JSON file on every change.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStorage {
    /// Opens the file. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, GifwError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(GifwError::Generic(format!("cannot read settings: {err}"))),
        };

        Ok(Self { path, values })
    }

    fn save(&self) -> Result<(), GifwError> {
        let contents = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, contents)
            .map_err(|err| GifwError::Generic(format!("cannot write settings: {err}")))
    }
}

impl SettingsStorage for JsonFileStorage {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: String) -> Result<(), GifwError> {
        self.values.insert(name.to_string(), value);
        self.save()
    }

    fn remove(&mut self, name: &str) -> Result<(), GifwError> {
        if self.values.remove(name).is_some() {
            self.save()?;
        }
        Ok(())
    }
}

/// Known settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    /// `metric` or `imperial`.
    PreferredUnits,
    /// Geolocation accuracy threshold: `10`, `20` or `50` metres.
    AccuracyThreshold,
    /// Keep the screen on while geolocating: `true` or `false`.
    WakeLock,
    /// JSON list of recently opened map versions.
    RecentVersions,
    /// `light`, `dark` or `system`. Stored per version.
    Theme,
}

impl SettingKey {
    /// Name of the setting.
    pub fn name(&self) -> &'static str {
        match self {
            SettingKey::PreferredUnits => "preferredUnits",
            SettingKey::AccuracyThreshold => "accuracyThreshold",
            SettingKey::WakeLock => "wakeLock",
            SettingKey::RecentVersions => "recentVersions",
            SettingKey::Theme => "theme",
        }
    }

    /// Returns true if the setting is stored separately for every map version.
    pub fn is_version_scoped(&self) -> bool {
        matches!(self, SettingKey::Theme)
    }

    fn is_valid(&self, value: &str) -> bool {
        match self {
            SettingKey::PreferredUnits => value.parse::<UnitSystem>().is_ok(),
            SettingKey::AccuracyThreshold => value
                .parse::<u32>()
                .is_ok_and(|v| ACCURACY_THRESHOLDS.contains(&v)),
            SettingKey::WakeLock => matches!(value, "true" | "false"),
            SettingKey::RecentVersions => serde_json::from_str::<Vec<String>>(value).is_ok(),
            SettingKey::Theme => matches!(value, "light" | "dark" | "system"),
        }
    }
}

/// Typed access to the settings of a map version.
pub struct Settings {
    storage: Box<dyn SettingsStorage>,
    version: Option<String>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(MemoryStorage::default(), None)
    }
}

impl Settings {
    /// Creates settings stored in `storage` for the map version.
    pub fn new(storage: impl SettingsStorage + 'static, version: Option<String>) -> Self {
        Self {
            storage: Box::new(storage),
            version,
        }
    }

    fn storage_name(&self, key: SettingKey) -> String {
        match &self.version {
            Some(version) if key.is_version_scoped() => {
                format!("{KEY_PREFIX}:{version}:{}", key.name())
            }
            _ => format!("{KEY_PREFIX}:{}", key.name()),
        }
    }

    /// Raw value of the setting. Values not allowed for the setting are treated as absent.
    pub fn get(&self, key: SettingKey) -> Option<String> {
        let value = self.storage.get(&self.storage_name(key))?;
        if key.is_valid(&value) {
            Some(value)
        } else {
            warn!("Ignoring invalid value {value:?} of setting {}", key.name());
            None
        }
    }

    /// Stores the value after validating it.
    pub fn set(&mut self, key: SettingKey, value: impl Into<String>) -> Result<(), GifwError> {
        let value = value.into();
        if !key.is_valid(&value) {
            return Err(GifwError::Validation(vec![ValidationIssue::new(
                key.name(),
                format!("{value:?} is not a valid value"),
            )]));
        }

        let name = self.storage_name(key);
        self.storage.set(&name, value)
    }

    /// Removes the setting.
    pub fn remove(&mut self, key: SettingKey) -> Result<(), GifwError> {
        let name = self.storage_name(key);
        self.storage.remove(&name)
    }

    /// Units used to present measurements.
    pub fn preferred_units(&self) -> UnitSystem {
        self.get(SettingKey::PreferredUnits)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    /// Sets the units used to present measurements.
    pub fn set_preferred_units(&mut self, units: UnitSystem) -> Result<(), GifwError> {
        self.set(SettingKey::PreferredUnits, units.as_str())
    }

    /// Worst accepted geolocation accuracy in metres.
    pub fn accuracy_threshold(&self) -> f64 {
        self.get(SettingKey::AccuracyThreshold)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_ACCURACY_THRESHOLD) as f64
    }

    /// Sets the geolocation accuracy threshold in metres.
    pub fn set_accuracy_threshold(&mut self, metres: u32) -> Result<(), GifwError> {
        self.set(SettingKey::AccuracyThreshold, metres.to_string())
    }

    /// Whether the screen is kept on while geolocating.
    pub fn wake_lock(&self) -> bool {
        self.get(SettingKey::WakeLock).as_deref() == Some("true")
    }

    /// Sets whether the screen is kept on while geolocating.
    pub fn set_wake_lock(&mut self, enabled: bool) -> Result<(), GifwError> {
        self.set(SettingKey::WakeLock, enabled.to_string())
    }

    /// Recently opened map versions, most recent first.
    pub fn recent_versions(&self) -> Vec<String> {
        self.get(SettingKey::RecentVersions)
            .and_then(|v| serde_json::from_str(&v).ok())
            .unwrap_or_default()
    }

    /// Puts the version at the front of the recent versions list.
    pub fn add_recent_version(&mut self, version: &str) -> Result<(), GifwError> {
        let mut versions = self.recent_versions();
        versions.retain(|v| v != version);
        versions.insert(0, version.to_string());
        versions.truncate(MAX_RECENT_VERSIONS);

        self.set(SettingKey::RecentVersions, serde_json::to_string(&versions)?)
    }

    /// Theme chosen for the current version.
    pub fn theme(&self) -> Option<String> {
        self.get(SettingKey::Theme)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn invalid_values_are_absent() {
        let mut storage = MemoryStorage::default();
        storage
            .set("gifw:accuracyThreshold", "15".to_string())
            .unwrap();
        storage.set("gifw:preferredUnits", "cubits".to_string()).unwrap();
        let settings = Settings::new(storage, None);

        assert_eq!(settings.get(SettingKey::AccuracyThreshold), None);
        assert_eq!(settings.accuracy_threshold(), 20.0);
        assert_eq!(settings.preferred_units(), UnitSystem::Metric);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut settings = Settings::default();
        assert_matches!(
            settings.set(SettingKey::Theme, "purple"),
            Err(GifwError::Validation(_))
        );
        settings.set_accuracy_threshold(50).unwrap();
        assert_eq!(settings.accuracy_threshold(), 50.0);
    }

    #[test]
    fn theme_is_version_scoped() {
        let mut first = Settings::new(MemoryStorage::default(), Some("general".into()));
        first.set(SettingKey::Theme, "dark").unwrap();
        first.set_wake_lock(true).unwrap();
        assert_eq!(first.storage_name(SettingKey::Theme), "gifw:general:theme");
        assert_eq!(first.storage_name(SettingKey::WakeLock), "gifw:wakeLock");
        assert_eq!(first.theme().as_deref(), Some("dark"));
    }

    #[test]
    fn recent_versions_are_unique_and_bounded() {
        let mut settings = Settings::default();
        for version in ["a", "b", "c", "d", "e", "f", "b"] {
            settings.add_recent_version(version).unwrap();
        }

        assert_eq!(settings.recent_versions(), vec!["b", "f", "e", "d", "c"]);
    }

    #[test]
    fn file_storage_persists() {
        let path = std::env::temp_dir().join(format!("gifw-settings-{}.json", uuid::Uuid::new_v4()));
        let mut storage = JsonFileStorage::open(&path).unwrap();
        storage.set("gifw:wakeLock", "true".into()).unwrap();

        let reopened = JsonFileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("gifw:wakeLock").as_deref(), Some("true"));
        std::fs::remove_file(path).unwrap();
    }
}
