//! ==============================================================================
//! server.rs - json control surface for the presentation layer
//! ==============================================================================
//!
//! purpose:
//!     the thin shell a ui (touch screen, browser) calls into. it renders
//!     nothing itself:
//!
//! ```text
//!         GET  /api                    latest tick, settings in use, warnings
//!         GET  /api/history?days=N     hourly humidity/temperature dataset
//!         POST /api/settings           save edited settings (triggers reload)
//!         POST /api/settings/restore   restore default settings (triggers reload)
//! ```
//!
//! relationships:
//!     - reads: domain::AppState (written by sampling.rs / supervisor.rs)
//!     - uses: settings.rs, history.rs
//!
//! ==============================================================================

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use crate::domain::AppState;
use crate::error::{HistoryError, SaveError};
use crate::history::{self, HistoryAggregator, HistoryDataset};
use crate::settings::{SettingsCandidate, SettingsEdit, SettingsFile, SettingsStore};

#[derive(Clone)]
pub struct ApiState {
    pub app: Arc<RwLock<AppState>>,
    pub settings: Arc<SettingsStore>,
    pub history: Arc<HistoryAggregator>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api", get(status_handler))
        .route("/api/history", get(history_handler))
        .route("/api/settings", post(save_settings_handler))
        .route("/api/settings/restore", post(restore_default_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(bind: &str, state: ApiState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ==============================================================================
// errors
// ==============================================================================

/// user-visible failure, rendered as `{"status": "error", "message": ...}`
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({"status": "error", "message": self.message});
        (self.status, Json(body)).into_response()
    }
}

impl From<HistoryError> for ApiError {
    fn from(e: HistoryError) -> Self {
        let status = match e {
            HistoryError::Input(_) => StatusCode::BAD_REQUEST,
            HistoryError::Data { .. } => StatusCode::NOT_FOUND,
            HistoryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<SaveError> for ApiError {
    fn from(e: SaveError) -> Self {
        let status = match e {
            SaveError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("task join error: {}", e),
    }
}

// ==============================================================================
// handlers
// ==============================================================================

async fn status_handler(State(state): State<ApiState>) -> Json<AppState> {
    let app = state.app.read().await;
    Json(app.clone())
}

#[derive(Deserialize)]
struct HistoryParams {
    days: String,
}

async fn history_handler(
    State(state): State<ApiState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryDataset>, ApiError> {
    let days = history::parse_days(&params.days)?;

    // file reads; keep them off the async workers
    let aggregator = state.history.clone();
    let dataset = tokio::task::spawn_blocking(move || aggregator.build(days))
        .await
        .map_err(join_error)??;

    Ok(Json(dataset))
}

async fn save_settings_handler(
    State(state): State<ApiState>,
    Json(edit): Json<SettingsEdit>,
) -> Result<Json<SettingsFile>, ApiError> {
    let store = state.settings.clone();
    let saved = tokio::task::spawn_blocking(move || store.save(SettingsCandidate::Edited(edit)))
        .await
        .map_err(join_error)??;
    Ok(Json(saved))
}

async fn restore_default_handler(
    State(state): State<ApiState>,
) -> Result<Json<SettingsFile>, ApiError> {
    let store = state.settings.clone();
    let saved = tokio::task::spawn_blocking(move || store.restore_default())
        .await
        .map_err(join_error)??;
    Ok(Json(saved))
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Metric;
    use crate::measurements::MeasurementLog;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Local;
    use tower::ServiceExt;

    const SETTINGS: &str = r#"{
        "default": {"device_address": "10.0.10.20", "server_address": "10.0.10.55",
                    "server_port": "10051", "sample_interval_seconds": "60", "motion_debounce_seconds": "5"},
        "custom":  {"device_address": "10.0.10.20", "server_address": "10.0.10.55",
                    "server_port": "10051", "sample_interval_seconds": "60", "motion_debounce_seconds": "5"}
    }"#;

    fn api(dir: &std::path::Path) -> ApiState {
        let settings_path = dir.join("settings.json");
        std::fs::write(&settings_path, SETTINGS).unwrap();
        ApiState {
            app: Arc::new(RwLock::new(AppState::default())),
            settings: Arc::new(SettingsStore::new(settings_path)),
            history: Arc::new(HistoryAggregator::new(MeasurementLog::new(dir.join("measures")))),
        }
    }

    async fn call(state: ApiState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn status_reports_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = call(api(dir.path()), get("/api")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["latest"].is_null());
    }

    #[tokio::test]
    async fn history_errors_map_to_status_codes() {
        let dir = tempfile::tempdir().unwrap();

        let (status, body) = call(api(dir.path()), get("/api/history?days=-3")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");

        let (status, _) = call(api(dir.path()), get("/api/history?days=1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_returns_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let state = api(dir.path());
        let now = Local::now();
        let log = MeasurementLog::new(dir.path().join("measures"));
        log.append(now.date_naive(), Metric::Temperature, now.time(), 21.0).unwrap();
        log.append(now.date_naive(), Metric::Humidity, now.time(), 45.0).unwrap();

        let (status, body) = call(state, get("/api/history?days=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Today's data");
        assert_eq!(body["hourly_humidity"][0]["value"], 45.0);
    }

    #[tokio::test]
    async fn blank_settings_are_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let body = serde_json::json!({
            "server_address": " ",
            "server_port": "10051",
            "sample_interval_seconds": "60",
            "motion_debounce_seconds": "5"
        });
        let (status, body) = call(api(dir.path()), post_json("/api/settings", body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["message"].as_str().unwrap().contains("server_address"));
        assert_eq!(std::fs::read_to_string(dir.path().join("settings.json")).unwrap(), SETTINGS);
    }

    #[tokio::test]
    async fn saves_and_restores_settings() {
        let dir = tempfile::tempdir().unwrap();
        let state = api(dir.path());
        let body = serde_json::json!({
            "server_address": "10.0.10.99",
            "server_port": "10051",
            "sample_interval_seconds": "30",
            "motion_debounce_seconds": "5"
        });

        let (status, saved) = call(state.clone(), post_json("/api/settings", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["custom"]["server_address"], "10.0.10.99");

        let restore = Request::post("/api/settings/restore").body(Body::empty()).unwrap();
        let (status, restored) = call(state, restore).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(restored["custom"], restored["default"]);
    }
}
