//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for the two sensors the agent samples.
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (dht driver + `rppal`) and a development machine (mocks).
//!
//! design philosophy:
//!     - "Compile Anywhere": The agent should compile on Windows/Mac/Linux.
//!     - "Swappable": the sensor gateway only sees `SensorBackend`, so tests
//!       script readings without any hardware.
//!
//! relationships:
//!     - used by: sensor.rs (SensorGateway)
//!     - uses: gpio.rs (on feature="hardware")
//!
//! ==============================================================================

use anyhow::Result;

use crate::config::SensorsConfig;

pub trait SensorBackend: Send + Sync {
    /// one temperature/humidity read; `None` marks a failed read
    fn read_temperature_humidity(&self) -> (Option<f32>, Option<f32>);
    /// current state of the motion sensor
    fn read_motion(&self) -> Result<bool>;
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For WSL / Non-Hardware Build)
// ==============================================================================================
#[cfg(not(feature = "hardware"))]
pub struct Hal {
    config: SensorsConfig,
}

#[cfg(not(feature = "hardware"))]
impl Hal {
    pub fn new(config: &SensorsConfig) -> Self {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Self {
            config: config.clone(),
        }
    }
}

#[cfg(not(feature = "hardware"))]
impl SensorBackend for Hal {
    fn read_temperature_humidity(&self) -> (Option<f32>, Option<f32>) {
        tracing::debug!(
            "[MOCK DHT] Reading {:?} on pin {}",
            self.config.dht_model,
            self.config.dht_pin
        );
        (Some(25.0), Some(50.0)) // Mock data
    }

    fn read_motion(&self) -> Result<bool> {
        tracing::debug!("[MOCK PIR] Reading pin {}", self.config.pir_pin);
        Ok(false)
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub struct Hal {
    config: SensorsConfig,
}

#[cfg(feature = "hardware")]
impl Hal {
    pub fn new(config: &SensorsConfig) -> Self {
        tracing::info!("Using REAL HARDWARE HAL (dht driver + rppal)");
        Self {
            config: config.clone(),
        }
    }
}

#[cfg(feature = "hardware")]
impl SensorBackend for Hal {
    fn read_temperature_humidity(&self) -> (Option<f32>, Option<f32>) {
        match crate::gpio::read_dht(self.config.dht_model, self.config.dht_pin) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(pin = self.config.dht_pin, error = %e, "DHT driver failed");
                (None, None)
            }
        }
    }

    fn read_motion(&self) -> Result<bool> {
        crate::gpio::read_pir(self.config.pir_pin)
    }
}
