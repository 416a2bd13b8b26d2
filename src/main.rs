//! ==============================================================================
//! main.rs - env-monitor entry point
//! ==============================================================================
//!
//! purpose:
//!     unattended temperature / humidity / motion monitor for a raspberry pi.
//!     samples the sensors on a timer, persists every valid sample to per-day
//!     files, forwards it to the monitoring server when that server answers a
//!     ping, and serves a json api the display layer calls into.
//!
//! responsibilities:
//!     - load host configuration (config/host.toml)
//!     - set up logging (stdout + optional application log file)
//!     - load and validate the settings file (fatal if unusable)
//!     - run the sampling loop under the reload supervisor
//!     - serve the json control surface
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                        env-monitor                           │
//!     │  ┌──────────────┐   ┌──────────────┐   ┌─────────────────┐   │
//!     │  │  supervisor  │   │  web server  │   │ settings watcher│   │
//!     │  │ (reloads on  │   │ (json api)   │   │ (file changes)  │   │
//!     │  │  save)       │   │              │   │                 │   │
//!     │  └──────┬───────┘   └──────┬───────┘   └────────┬────────┘   │
//!     │         │                  │                    │            │
//!     │   ┌─────┴──────┐     AppState (Arc<RwLock>)   reload signal  │
//!     │   │  sampling  │ -> sensor -> probe -> telemetry -> log      │
//!     │   └────────────┘                                             │
//!     └──────────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use env_monitor::config::{HostConfig, LoggingConfig};
use env_monitor::hal::Hal;
use env_monitor::server::{self, ApiState};
use env_monitor::supervisor::{self, Supervisor};

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("env_monitor={}", logging.level)));

    let file_layer = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  env-monitor - temperature / humidity / motion agent");
    println!("===========================================================");

    // step 1: load configuration
    let config = HostConfig::load_or_default();
    config.print_summary();
    init_tracing(&config.logging)?;

    // step 2: hardware + supervisor
    let backend = Arc::new(Hal::new(&config.sensors));
    let supervisor = Supervisor::new(config.clone(), backend);

    // step 3: settings - without a usable settings file there is nothing safe to run
    let loaded = match supervisor.load_settings() {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!(error = %e, "Fatal: cannot load settings");
            return Err(e.into());
        }
    };

    let heading = if loaded.using_default() {
        "Default settings are in use:"
    } else {
        "Your settings in use:"
    };
    println!("\n{} {}", heading, serde_json::to_string_pretty(&loaded.active)?);
    if let Some(warning) = &loaded.warning {
        tracing::warn!(%warning, "Invalid custom settings. Default settings in use.");
    }

    // step 4: watch the settings file; keep the watcher alive for the whole run
    let _watcher = match supervisor::watch_settings_file(
        &config.paths.settings_file,
        supervisor.reload_handle(),
    ) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Settings file watcher unavailable");
            None
        }
    };

    // step 5: json api in background
    let api = ApiState {
        app: supervisor.state(),
        settings: Arc::new(supervisor.settings_store()),
        history: Arc::new(supervisor.history()),
    };
    let bind = config.server.bind.clone();
    tokio::spawn(async move {
        tracing::info!(%bind, "Control API listening");
        if let Err(e) = server::run_server(&bind, api).await {
            tracing::error!(error = %e, "Web server error");
        }
    });

    // step 6: sampling loop, restarted on every settings change
    supervisor.run(loaded).await
}
