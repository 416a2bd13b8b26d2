//! ==============================================================================
//! sampling.rs - the periodic sampling controller
//! ==============================================================================
//!
//! purpose:
//!     one "tick" = read sensors -> probe server -> dispatch -> persist -> publish.
//!
//! ```text
//!     Idle -> Sampling -> Invalid (re-sample after a minimum delay)
//!                      -> Valid   (probe, dispatch if reachable, append, publish) -> Idle
//!
//!     a reading missing temperature or humidity is never persisted or sent.
//!     ticks never overlap: the timer only fires again once the current tick
//!     has returned, so a slow probe delays the next tick.
//! ```
//!
//! relationships:
//!     - uses: sensor.rs, probe.rs, telemetry.rs, measurements.rs
//!     - built and stopped by: supervisor.rs
//!     - publishes to: domain::AppState (read by server.rs)
//!
//! ==============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;

use crate::config::SamplingConfig;
use crate::domain::{AppState, Metric, Reading, TickReport};
use crate::measurements::MeasurementLog;
use crate::probe::ServerProbe;
use crate::sensor::SensorGateway;
use crate::settings::Settings;
use crate::telemetry::TelemetryDispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
    Invalid,
    Valid,
}

pub struct SamplingController {
    settings: Settings,
    gateway: SensorGateway,
    probe: ServerProbe,
    dispatcher: TelemetryDispatcher,
    log: MeasurementLog,
    retry_delay: Duration,
    max_attempts: u32,
    show_data: bool,
    phase: Phase,
}

impl SamplingController {
    pub fn new(
        settings: Settings,
        gateway: SensorGateway,
        probe: ServerProbe,
        dispatcher: TelemetryDispatcher,
        log: MeasurementLog,
        sampling: &SamplingConfig,
    ) -> Self {
        Self {
            settings,
            gateway,
            probe,
            dispatcher,
            log,
            retry_delay: sampling.min_retry_delay(),
            max_attempts: sampling.max_read_attempts,
            show_data: false,
            phase: Phase::Idle,
        }
    }

    /// log every valid reading at info level
    pub fn show_sensor_data(mut self, show: bool) -> Self {
        self.show_data = show;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// time between ticks. a zero interval would spin, so it is clamped to 1s.
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.settings.sample_interval_seconds.max(1))
    }

    async fn sample(&mut self) -> Reading {
        let (temperature, humidity) = self.gateway.read_temperature_humidity().await;
        let timestamp = Local::now();
        let debounce = Duration::from_secs(self.settings.motion_debounce_seconds);
        let motion = self.gateway.check_motion(timestamp, debounce).await;

        Reading {
            timestamp,
            temperature,
            humidity,
            motion,
        }
    }

    /// run one complete tick. `None` only when `max_read_attempts` is set and
    /// every attempt came back invalid.
    pub async fn tick(&mut self) -> Option<TickReport> {
        self.phase = Phase::Sampling;
        let mut attempts = 0u32;

        let (reading, temperature, humidity) = loop {
            attempts += 1;
            let reading = self.sample().await;
            if let Some((temperature, humidity)) = reading.values() {
                self.phase = Phase::Valid;
                break (reading, temperature, humidity);
            }

            self.phase = Phase::Invalid;
            tracing::debug!(
                attempts,
                temperature = ?reading.temperature,
                humidity = ?reading.humidity,
                "Invalid reading, re-sampling"
            );

            if self.max_attempts > 0 && attempts >= self.max_attempts {
                tracing::warn!(attempts, "No valid reading, tick abandoned");
                self.phase = Phase::Idle;
                return None;
            }
            tokio::time::sleep(self.retry_delay).await;
        };

        let server = self.probe.probe(self.settings.server_address).await;
        self.dispatcher.dispatch(temperature, humidity, &server).await;
        self.persist(&reading, temperature, humidity);

        if self.show_data {
            tracing::info!(
                "[SENSOR] Temp: {:.1}°C | Humidity: {:.1}% | Motion: {} | Server: {} ({})",
                temperature,
                humidity,
                if reading.motion { "detected" } else { "none" },
                server.host_label,
                if server.reachable { "up" } else { "down" },
            );
        }

        self.phase = Phase::Idle;
        Some(TickReport {
            timestamp: reading.timestamp,
            temperature,
            humidity,
            motion: reading.motion,
            server,
            attempts,
        })
    }

    fn persist(&self, reading: &Reading, temperature: f32, humidity: f32) {
        let date = reading.timestamp.date_naive();
        let time = reading.timestamp.time();

        for (metric, value) in [(Metric::Temperature, temperature), (Metric::Humidity, humidity)] {
            if let Err(e) = self.log.append(date, metric, time, value) {
                tracing::error!(%metric, error = %e, "Failed to persist measurement");
            }
        }
    }

    /// tick on the configured cadence until `stop` flips (or its sender is
    /// dropped). a tick in progress always runs to completion.
    pub async fn run(mut self, state: Arc<RwLock<AppState>>, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(period_secs = self.period().as_secs(), "Sampling loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(report) = self.tick().await {
                        state.write().await.latest = Some(report);
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Sampling loop stopped");
    }
}
