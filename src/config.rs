//! ==============================================================================
//! config.rs - Host Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! ```text
//!     this is fixed infrastructure (paths, pins, timeouts). the user-editable
//!     settings (server address, intervals) live in the json settings file,
//!     see settings.rs.
//! ```
//!
//! structure:
//!     - PathsConfig: settings file and measurement directory.
//!     - SensorsConfig: DHT model/pin and PIR pin.
//!     - SamplingConfig: retry pacing for invalid readings.
//!     - ProbeConfig: ping timeout and friendly host labels.
//!     - TelemetryConfig: which sink forwards readings.
//!     - ServerConfig / LoggingConfig / RestartConfig.
//!
//! ==============================================================================

use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HostConfig {
    pub paths: PathsConfig,
    pub sensors: SensorsConfig,
    pub sampling: SamplingConfig,
    pub probe: ProbeConfig,
    pub telemetry: TelemetryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub restart: RestartConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub settings_file: PathBuf,
    pub measurements_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            settings_file: PathBuf::from("data").join("settings.json"),
            measurements_dir: PathBuf::from("data").join("measures"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DhtModel {
    #[default]
    Dht11,
    Dht22,
}

impl DhtModel {
    /// class name in the adafruit driver
    pub fn driver_name(self) -> &'static str {
        match self {
            DhtModel::Dht11 => "DHT11",
            DhtModel::Dht22 => "DHT22",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorsConfig {
    pub dht_model: DhtModel,
    pub dht_pin: u8,
    pub pir_pin: u8,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            dht_model: DhtModel::Dht11,
            dht_pin: 17,
            pir_pin: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SamplingConfig {
    /// minimum delay between two attempts when a reading comes back invalid
    pub min_retry_delay_ms: u64,
    /// 0 keeps re-sampling until a valid reading arrives
    pub max_read_attempts: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_retry_delay_ms: 2000,
            max_read_attempts: 0,
        }
    }
}

impl SamplingConfig {
    pub fn min_retry_delay(&self) -> Duration {
        Duration::from_millis(self.min_retry_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
    /// fixed labels that override reverse dns, e.g. "10.0.10.55" = "Zabbix"
    pub labels: HashMap<String, String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            labels: HashMap::new(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// labels keyed by address; entries that are not IPv4 addresses are dropped
    pub fn address_labels(&self) -> HashMap<Ipv4Addr, String> {
        self.labels
            .iter()
            .filter_map(|(addr, label)| match addr.parse() {
                Ok(addr) => Some((addr, label.clone())),
                Err(_) => {
                    tracing::warn!(address = %addr, "Ignoring probe label for non-IPv4 address");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryKind {
    /// zabbix trapper items on serverAddress:serverPort
    #[default]
    Zabbix,
    /// json POST to `hub_url`
    Http,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    pub kind: TelemetryKind,
    pub hub_url: String,
    pub timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            kind: TelemetryKind::Zabbix,
            hub_url: String::new(),
            timeout_ms: 3000,
        }
    }
}

impl TelemetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// optional application log file, in addition to stdout
    pub file: Option<PathBuf>,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            show_sensor_data: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    /// rebuild the sampling controller in-process
    #[default]
    Reload,
    /// re-exec the binary with its original arguments
    Process,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RestartConfig {
    pub mode: RestartMode,
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: HostConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("host.toml"),
            PathBuf::from("..").join("config").join("host.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│           HOST CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Settings: {}", self.paths.settings_file.display());
        println!("│ Measures: {}", self.paths.measurements_dir.display());
        println!("│ Sensor: {:?} on GPIO {}, PIR on GPIO {}",
            self.sensors.dht_model, self.sensors.dht_pin, self.sensors.pir_pin);
        println!("│ Telemetry: {:?}", self.telemetry.kind);
        println!("│ Restart Mode: {:?}", self.restart.mode);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: HostConfig = toml::from_str(
            r#"
[sensors]
dht_model = "dht22"

[probe.labels]
"10.0.10.55" = "Zabbix"
"#,
        )
        .unwrap();

        assert_eq!(config.sensors.dht_model, DhtModel::Dht22);
        assert_eq!(config.sensors.pir_pin, 4);
        assert_eq!(config.sampling.min_retry_delay_ms, 2000);
        assert_eq!(
            config.probe.address_labels().get(&Ipv4Addr::new(10, 0, 10, 55)).map(String::as_str),
            Some("Zabbix")
        );
        assert_eq!(config.restart.mode, RestartMode::Reload);
    }

    #[test]
    fn empty_file_is_default() {
        let config: HostConfig = toml::from_str("").unwrap();
        assert_eq!(config.telemetry.kind, TelemetryKind::Zabbix);
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn shipped_host_toml_labels_the_default_server() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join("host.toml");
        let config = HostConfig::load(path).unwrap();
        assert_eq!(
            config.probe.address_labels().get(&Ipv4Addr::new(10, 0, 10, 55)).map(String::as_str),
            Some("Zabbix")
        );
    }
}
