//! sensor gateway: the controller's only view of the hardware.
//!
//! temperature/humidity reads are passed straight through. motion reads are
//! debounced: within `debounce` of the last hardware read the gateway answers
//! "no motion" without touching the pin.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::hal::SensorBackend;

/// last time the motion sensor was actually read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionState {
    pub last_sample: Option<DateTime<Local>>,
}

impl MotionState {
    /// true when a hardware read is allowed at `now`
    fn due(&self, now: DateTime<Local>, debounce: Duration) -> bool {
        match self.last_sample {
            None => true,
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= debounce,
                // clock went backwards; wait for it to pass the last sample again
                Err(_) => false,
            },
        }
    }
}

pub struct SensorGateway {
    backend: Arc<dyn SensorBackend>,
    motion: MotionState,
}

impl SensorGateway {
    pub fn new(backend: Arc<dyn SensorBackend>) -> Self {
        Self {
            backend,
            motion: MotionState::default(),
        }
    }

    pub fn motion_state(&self) -> MotionState {
        self.motion
    }

    /// one dht read on the blocking pool. `(None, None)` when the read failed.
    pub async fn read_temperature_humidity(&self) -> (Option<f32>, Option<f32>) {
        let backend = self.backend.clone();
        match tokio::task::spawn_blocking(move || backend.read_temperature_humidity()).await {
            Ok(values) => values,
            Err(e) => {
                tracing::error!(error = %e, "Sensor read task failed");
                (None, None)
            }
        }
    }

    /// debounced motion check. the pin read runs on the blocking pool like the dht read.
    pub async fn check_motion(&mut self, now: DateTime<Local>, debounce: Duration) -> bool {
        if !self.motion.due(now, debounce) {
            return false;
        }

        self.motion.last_sample = Some(now);
        let backend = self.backend.clone();
        match tokio::task::spawn_blocking(move || backend.read_motion()).await {
            Ok(Ok(motion)) => motion,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Motion sensor read failed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Motion read task failed");
                false
            }
        }
    }
}
