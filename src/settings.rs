//! ==============================================================================
//! settings.rs - two-tier (default/custom) settings store
//! ==============================================================================
//!
//! purpose:
//!     owns the user-editable settings file:
//!
//! ```text
//!         { "default": { ... }, "custom": { ... } }
//!
//!     `default` ships with the device and is always valid. `custom` is what the
//!     user edits. if any custom field fails its validator the whole custom
//!     record is replaced by `default` in memory (the file is left alone) and a
//!     warning is raised for the notification layer.
//! ```
//!
//! relationships:
//!     - used by: supervisor.rs (load on every (re)start)
//!     - used by: server.rs (save / restore default)
//!     - signals: supervisor.rs via the reload handle after a successful save
//!
//! ==============================================================================

use std::fs;
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Notify;

use crate::error::{ConfigError, SaveError, ValidationError};

const IPV4_PATTERN: &str = r"^(([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])\.){3}([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])$";
const DIGITS_PATTERN: &str = r"^[0-9]+$";

fn ipv4_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IPV4_PATTERN).expect("ipv4 pattern is valid"))
}

fn digits_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DIGITS_PATTERN).expect("digits pattern is valid"))
}

// ==============================================================================
// records
// ==============================================================================

/// settings exactly as stored in the file. values are kept as text so that a
/// bad custom record can still be loaded, reported and left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRecord {
    #[serde(alias = "device_ip", deserialize_with = "string_or_number")]
    pub device_address: String,
    #[serde(alias = "zabbix_ip", deserialize_with = "string_or_number")]
    pub server_address: String,
    #[serde(alias = "zabbix_port", deserialize_with = "string_or_number")]
    pub server_port: String,
    #[serde(alias = "refresh_time", deserialize_with = "string_or_number")]
    pub sample_interval_seconds: String,
    #[serde(alias = "motion_refresh_time", deserialize_with = "string_or_number")]
    pub motion_debounce_seconds: String,
}

/// older settings files store numbers as json numbers, the editor stores text
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsFile {
    pub default: SettingsRecord,
    pub custom: SettingsRecord,
}

/// validated settings handed to every component constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub device_address: Ipv4Addr,
    pub server_address: Ipv4Addr,
    pub server_port: u16,
    pub sample_interval_seconds: u64,
    pub motion_debounce_seconds: u64,
}

impl TryFrom<&SettingsRecord> for Settings {
    type Error = ValidationError;

    fn try_from(record: &SettingsRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            device_address: parse_ipv4("device_address", &record.device_address)?,
            server_address: parse_ipv4("server_address", &record.server_address)?,
            server_port: parse_digits("server_port", &record.server_port)?,
            sample_interval_seconds: parse_digits(
                "sample_interval_seconds",
                &record.sample_interval_seconds,
            )?,
            motion_debounce_seconds: parse_digits(
                "motion_debounce_seconds",
                &record.motion_debounce_seconds,
            )?,
        })
    }
}

fn parse_ipv4(field: &str, value: &str) -> Result<Ipv4Addr, ValidationError> {
    if !ipv4_regex().is_match(value) {
        return Err(ValidationError::new(field, format!("'{value}' is not an IPv4 address")));
    }
    value
        .parse()
        .map_err(|_| ValidationError::new(field, format!("'{value}' is not an IPv4 address")))
}

fn parse_digits<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ValidationError> {
    if !digits_regex().is_match(value) {
        return Err(ValidationError::new(
            field,
            format!("'{value}' is not a non-negative integer"),
        ));
    }
    value
        .parse()
        .map_err(|_| ValidationError::new(field, format!("'{value}' is out of range")))
}

// ==============================================================================
// save candidates
// ==============================================================================

/// values typed into the settings form. the device address is not editable
/// from the form; when absent the default's address is kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsEdit {
    #[serde(default)]
    pub device_address: Option<String>,
    pub server_address: String,
    pub server_port: String,
    pub sample_interval_seconds: String,
    pub motion_debounce_seconds: String,
}

impl SettingsEdit {
    fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        let device = self.device_address.as_deref().map(|v| ("device_address", v));
        device.into_iter().chain([
            ("server_address", self.server_address.as_str()),
            ("server_port", self.server_port.as_str()),
            ("sample_interval_seconds", self.sample_interval_seconds.as_str()),
            ("motion_debounce_seconds", self.motion_debounce_seconds.as_str()),
        ])
    }

    /// rejects empty and whitespace-only values
    pub fn check_filled(&self) -> Result<(), ValidationError> {
        match self.fields().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(ValidationError::new(field, "value must not be empty")),
            None => Ok(()),
        }
    }

    fn apply_to(&self, base: &SettingsRecord) -> SettingsRecord {
        SettingsRecord {
            device_address: self
                .device_address
                .clone()
                .unwrap_or_else(|| base.device_address.clone()),
            server_address: self.server_address.clone(),
            server_port: self.server_port.clone(),
            sample_interval_seconds: self.sample_interval_seconds.clone(),
            motion_debounce_seconds: self.motion_debounce_seconds.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SettingsCandidate {
    /// field values from the settings form
    Edited(SettingsEdit),
    /// a complete record, e.g. the defaults being restored
    Record(SettingsRecord),
}

// ==============================================================================
// store
// ==============================================================================

/// outcome of a successful load
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub file: SettingsFile,
    pub default: Settings,
    /// custom settings, or the defaults when custom failed validation
    pub active: Settings,
    /// set when custom settings were rejected
    pub warning: Option<ValidationError>,
}

impl LoadedSettings {
    pub fn using_default(&self) -> bool {
        self.warning.is_some() || self.file.default == self.file.custom
    }
}

pub struct SettingsStore {
    path: PathBuf,
    reload: Option<Arc<Notify>>,
}

impl SettingsStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reload: None,
        }
    }

    /// successful saves will wake whoever waits on `reload`
    pub fn with_reload(mut self, reload: Arc<Notify>) -> Self {
        self.reload = Some(reload);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<SettingsFile, ConfigError> {
        let content = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::Missing {
                path: self.path.clone(),
            },
            _ => ConfigError::Unreadable {
                path: self.path.clone(),
                source: e,
            },
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Malformed {
            path: self.path.clone(),
            source: e,
        })
    }

    /// load and validate the settings file
    pub fn load(&self) -> Result<LoadedSettings, ConfigError> {
        let file = self.read_file()?;
        let default = Settings::try_from(&file.default).map_err(ConfigError::InvalidDefault)?;

        let (active, warning) = match Settings::try_from(&file.custom) {
            Ok(custom) => (custom, None),
            Err(e) => {
                tracing::warn!(
                    field = %e.field,
                    error = %e.message,
                    "Invalid custom settings, default settings in use"
                );
                (default, Some(e))
            }
        };

        Ok(LoadedSettings {
            file,
            default,
            active,
            warning,
        })
    }

    /// validate a candidate and persist it as the new custom record.
    /// nothing is written when validation fails.
    pub fn save(&self, candidate: SettingsCandidate) -> Result<SettingsFile, SaveError> {
        if let SettingsCandidate::Edited(edit) = &candidate {
            edit.check_filled()?;
        }

        let current = self.read_file()?;
        let custom = match candidate {
            SettingsCandidate::Edited(edit) => edit.apply_to(&current.default),
            SettingsCandidate::Record(record) => record,
        };
        Settings::try_from(&custom)?;

        let file = SettingsFile {
            default: current.default,
            custom,
        };
        self.write_atomic(&file)?;
        tracing::info!(path = %self.path.display(), "Settings saved, requesting restart");

        if let Some(reload) = &self.reload {
            reload.notify_one();
        }
        Ok(file)
    }

    /// copy `default` over `custom` and save
    pub fn restore_default(&self) -> Result<SettingsFile, SaveError> {
        let current = self.read_file()?;
        self.save(SettingsCandidate::Record(current.default))
    }

    fn write_atomic(&self, file: &SettingsFile) -> Result<(), SaveError> {
        let write_err = |source| SaveError::Write {
            path: self.path.clone(),
            source,
        };

        let mut json = serde_json::to_string_pretty(file)
            .map_err(|e| write_err(std::io::Error::new(ErrorKind::InvalidData, e)))?;
        json.push('\n');

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)
    }
}
