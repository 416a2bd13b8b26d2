use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// a single attempt at sampling the sensors.
/// either value missing means the dht read failed and the reading is invalid.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Local>,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub motion: bool,
}

impl Reading {
    /// returns the (temperature, humidity) pair only when both are present
    pub fn values(&self) -> Option<(f32, f32)> {
        Some((self.temperature?, self.humidity?))
    }

    pub fn is_valid(&self) -> bool {
        self.values().is_some()
    }
}

/// persisted / forwarded metric kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Humidity,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Temperature, Metric::Humidity];

    /// prefix of the per-day measurement file
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
        }
    }

    /// item key expected by the monitoring server
    pub fn telemetry_key(self) -> &'static str {
        match self {
            Metric::Temperature => "sensor_temperature",
            Metric::Humidity => "sensor_humidity",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// result of probing the monitoring server. recomputed every tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub host_label: String,
    pub reachable: bool,
}

/// what a completed tick publishes to the presentation layer
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TickReport {
    pub timestamp: DateTime<Local>,
    pub temperature: f32,
    pub humidity: f32,
    pub motion: bool,
    pub server: ServerStatus,
    /// number of sensor reads it took to get a valid reading
    pub attempts: u32,
}

/// shared state between the sampling loop (writer) and the http surface (reader)
#[derive(Clone, Default, Serialize)]
pub struct AppState {
    /// most recent completed tick
    pub latest: Option<TickReport>,
    /// settings currently driving the sampling loop
    pub settings: Option<Settings>,
    /// true when custom settings were rejected and defaults are in use
    pub using_default: bool,
    /// user-visible warning raised while loading settings
    pub warning: Option<String>,
}
