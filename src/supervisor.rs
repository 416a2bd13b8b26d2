//! ==============================================================================
//! supervisor.rs - settings-driven (re)start of the sampling loop
//! ==============================================================================
//!
//! purpose:
//!     builds the sampling controller and its dependents from the currently
//!     loaded settings, runs it, and when a reload is requested (api save,
//!     restore default, or an edit of the settings file on disk) stops it
//!     between ticks, reloads settings and builds everything again.
//!
//! ```text
//!     with `restart.mode = "process"` the reload is a re-exec of the binary.
//! ```
//!
//! relationships:
//!     - uses: settings.rs, sampling.rs, probe.rs, telemetry.rs, restart.rs
//!     - shares: AppState with server.rs
//!
//! ==============================================================================

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{watch, Notify, RwLock};

use crate::config::{HostConfig, RestartMode, TelemetryKind};
use crate::domain::AppState;
use crate::error::ConfigError;
use crate::hal::SensorBackend;
use crate::history::HistoryAggregator;
use crate::measurements::MeasurementLog;
use crate::probe::ServerProbe;
use crate::restart;
use crate::sampling::SamplingController;
use crate::sensor::SensorGateway;
use crate::settings::{LoadedSettings, Settings, SettingsStore};
use crate::telemetry::{HttpSink, TelemetryDispatcher, TelemetrySink, ZabbixSink};

/// quiet period after a reload request; a save and the file event it causes
/// collapse into one restart
const RELOAD_SETTLE: Duration = Duration::from_millis(250);

pub struct Supervisor {
    config: HostConfig,
    backend: Arc<dyn SensorBackend>,
    state: Arc<RwLock<AppState>>,
    reload: Arc<Notify>,
}

impl Supervisor {
    pub fn new(config: HostConfig, backend: Arc<dyn SensorBackend>) -> Self {
        Self {
            config,
            backend,
            state: Arc::new(RwLock::new(AppState::default())),
            reload: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> Arc<RwLock<AppState>> {
        self.state.clone()
    }

    pub fn reload_handle(&self) -> Arc<Notify> {
        self.reload.clone()
    }

    /// settings store wired to this supervisor's reload signal
    pub fn settings_store(&self) -> SettingsStore {
        SettingsStore::new(&self.config.paths.settings_file).with_reload(self.reload.clone())
    }

    pub fn history(&self) -> HistoryAggregator {
        HistoryAggregator::new(self.measurement_log())
    }

    fn measurement_log(&self) -> MeasurementLog {
        MeasurementLog::new(&self.config.paths.measurements_dir)
    }

    pub fn load_settings(&self) -> Result<LoadedSettings, ConfigError> {
        SettingsStore::new(&self.config.paths.settings_file).load()
    }

    fn telemetry_sink(&self, settings: &Settings) -> Result<Arc<dyn TelemetrySink>> {
        let telemetry = &self.config.telemetry;
        Ok(match telemetry.kind {
            TelemetryKind::Zabbix => Arc::new(ZabbixSink::new(settings, telemetry.timeout())),
            TelemetryKind::Http => Arc::new(
                HttpSink::new(telemetry.hub_url.clone(), telemetry.timeout())
                    .context("failed to build http telemetry client")?,
            ),
        })
    }

    /// the sampling controller and everything it depends on, for one settings generation
    pub fn build_controller(&self, settings: Settings) -> Result<SamplingController> {
        let probe = ServerProbe::system(self.config.probe.timeout())
            .with_labels(self.config.probe.address_labels());
        let dispatcher = TelemetryDispatcher::new(self.telemetry_sink(&settings)?, &settings);

        Ok(SamplingController::new(
            settings,
            SensorGateway::new(self.backend.clone()),
            probe,
            dispatcher,
            self.measurement_log(),
            &self.config.sampling,
        )
        .show_sensor_data(self.config.logging.show_sensor_data))
    }

    async fn publish_settings(&self, loaded: &LoadedSettings) {
        let mut state = self.state.write().await;
        state.settings = Some(loaded.active);
        state.using_default = loaded.using_default();
        state.warning = loaded
            .warning
            .as_ref()
            .map(|e| format!("Invalid custom settings ({e}). Default settings in use."));
    }

    /// consume a reload request that arrived while we were already reloading
    async fn drain_pending_reload(&self) {
        // timeout polls the inner future once before checking the deadline
        let _ = tokio::time::timeout(Duration::ZERO, self.reload.notified()).await;
    }

    /// run sampling generations forever; returns only on a fatal error
    pub async fn run(self, initial: LoadedSettings) -> Result<()> {
        let mut loaded = initial;

        loop {
            self.publish_settings(&loaded).await;
            let controller = self.build_controller(loaded.active)?;

            let (stop_tx, stop_rx) = watch::channel(false);
            let task = tokio::spawn(controller.run(self.state.clone(), stop_rx));

            self.reload.notified().await;
            tokio::time::sleep(RELOAD_SETTLE).await;
            self.drain_pending_reload().await;
            tracing::info!("Settings changed, restarting sampling");

            let _ = stop_tx.send(true);
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Sampling task ended abnormally");
            }

            if self.config.restart.mode == RestartMode::Process {
                return Err(restart::exec_self());
            }

            match self.load_settings() {
                Ok(fresh) => {
                    if let Some(warning) = &fresh.warning {
                        tracing::warn!(%warning, "Reloaded settings rejected, default settings in use");
                    }
                    loaded = fresh;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Settings reload failed, keeping previous settings");
                }
            }
        }
    }
}

/// request a reload whenever the settings file is written by someone else.
/// the returned watcher must be kept alive.
pub fn watch_settings_file(path: &Path, reload: Arc<Notify>) -> notify::Result<RecommendedWatcher> {
    let file_name = path.file_name().map(ToOwned::to_owned);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref());
                if relevant {
                    tracing::debug!(?event.kind, "Settings file changed");
                    reload.notify_one();
                }
            }
            Err(e) => tracing::warn!(error = %e, "Settings watcher error"),
        }
    })?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    tracing::info!(dir = %dir.display(), "Watching settings file for changes");
    Ok(watcher)
}
