//! One full sampling tick through the public api: settings file on disk,
//! scripted sensor, fake network, recording telemetry sink, real measurement
//! files, then the history view over what was written.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;

use env_monitor::config::SamplingConfig;
use env_monitor::domain::Metric;
use env_monitor::hal::SensorBackend;
use env_monitor::history::HistoryAggregator;
use env_monitor::measurements::MeasurementLog;
use env_monitor::probe::{Reachability, ReverseResolver, ServerProbe};
use env_monitor::sampling::SamplingController;
use env_monitor::sensor::SensorGateway;
use env_monitor::settings::SettingsStore;
use env_monitor::telemetry::{TelemetryDispatcher, TelemetryItem, TelemetrySink};

const SETTINGS: &str = r#"{
    "default": {"device_address": "10.0.10.20", "server_address": "10.0.10.55",
                "server_port": "10051", "sample_interval_seconds": "60", "motion_debounce_seconds": "5"},
    "custom":  {"device_address": "10.0.10.21", "server_address": "10.0.10.56",
                "server_port": "10051", "sample_interval_seconds": "30", "motion_debounce_seconds": "5"}
}"#;

struct Scripted {
    readings: Mutex<VecDeque<(Option<f32>, Option<f32>)>>,
}

impl SensorBackend for Scripted {
    fn read_temperature_humidity(&self) -> (Option<f32>, Option<f32>) {
        self.readings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((Some(21.5), Some(45.0)))
    }

    fn read_motion(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}

struct Lan;

#[async_trait]
impl Reachability for Lan {
    async fn is_reachable(&self, _address: Ipv4Addr, _timeout: Duration) -> bool {
        true
    }
}

#[async_trait]
impl ReverseResolver for Lan {
    async fn lookup(&self, _address: Ipv4Addr) -> Option<String> {
        Some("zabbix.lan".to_string())
    }
}

/// records every push together with how many lines the measurement files
/// held at that moment
struct Recording {
    files: Vec<PathBuf>,
    pushes: Mutex<Vec<(Vec<TelemetryItem>, Vec<usize>)>>,
}

fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|text| text.lines().count())
        .unwrap_or(0)
}

#[async_trait]
impl TelemetrySink for Recording {
    async fn send(&self, items: &[TelemetryItem]) -> anyhow::Result<()> {
        let lines = self.files.iter().map(|p| line_count(p)).collect();
        self.pushes.lock().unwrap().push((items.to_vec(), lines));
        Ok(())
    }
}

#[tokio::test]
async fn invalid_read_then_valid_tick_sends_once_and_persists_after() {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = dir.path().join("settings.json");
    std::fs::write(&settings_path, SETTINGS).unwrap();

    let loaded = SettingsStore::new(&settings_path).load().unwrap();
    assert!(!loaded.using_default());
    let settings = loaded.active;

    let log = MeasurementLog::new(dir.path().join("measures"));
    let today = Local::now().date_naive();
    let temperature_file = log.file_path(Metric::Temperature, today);
    let humidity_file = log.file_path(Metric::Humidity, today);

    let sink = Arc::new(Recording {
        files: vec![temperature_file.clone(), humidity_file.clone()],
        pushes: Mutex::new(Vec::new()),
    });
    let backend = Arc::new(Scripted {
        readings: Mutex::new(VecDeque::from([(None, Some(45.0)), (Some(21.5), Some(45.0))])),
    });
    let lan = Arc::new(Lan);

    let mut controller = SamplingController::new(
        settings,
        SensorGateway::new(backend),
        ServerProbe::new(lan.clone(), lan, Duration::from_millis(100)),
        TelemetryDispatcher::new(sink.clone(), &settings),
        MeasurementLog::new(dir.path().join("measures")),
        &SamplingConfig {
            min_retry_delay_ms: 10,
            max_read_attempts: 0,
        },
    );

    let report = controller.tick().await.unwrap();
    assert_eq!(report.attempts, 2);
    assert_eq!(report.server.host_label, "zabbix.lan");
    assert!(report.server.reachable);
    assert!(report.motion);

    // pushed exactly once, before anything was persisted
    let pushes = sink.pushes.lock().unwrap().clone();
    assert_eq!(pushes.len(), 1);
    let (items, lines_at_push) = &pushes[0];
    assert_eq!(lines_at_push, &vec![0, 0]);
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item.host == "10.0.10.21"));
    assert_eq!(items[0].key, "sensor_temperature");
    assert_eq!(items[0].value, "21.5");
    assert_eq!(items[1].key, "sensor_humidity");
    assert_eq!(items[1].value, "45");

    // one line per metric after the tick
    let date = report.timestamp.date_naive();
    let temperature_file = log.file_path(Metric::Temperature, date);
    let humidity_file = log.file_path(Metric::Humidity, date);
    assert_eq!(line_count(&temperature_file), 1);
    assert_eq!(line_count(&humidity_file), 1);
    let line = std::fs::read_to_string(&temperature_file).unwrap();
    assert!(line.trim_end().ends_with(";21.5"));

    // and the history view sees it
    let dataset = HistoryAggregator::new(log).build_until(1, date).unwrap();
    assert_eq!(dataset.title, "Today's data");
    assert_eq!(dataset.rows, 1);
    assert_eq!(dataset.hourly_humidity[0].value, 45.0);
    assert_eq!(dataset.hourly_temperature[0].value, 21.5);
}
