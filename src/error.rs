//! error types surfaced by the monitoring controller.
//!
//! sensor read failures and unreachable servers never show up here: the
//! controller recovers from those inside a tick (re-sample / skip dispatch).

use std::path::PathBuf;

use thiserror::Error;

/// the settings file cannot be used at all. fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings file {path} not found")]
    Missing { path: PathBuf },

    #[error("failed to read settings file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file {path} is not valid json: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("default settings are invalid: {0}")]
    InvalidDefault(#[source] ValidationError),
}

/// a settings field failed its validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// measurement log failures.
#[derive(Debug, Error)]
#[error("measurement log error at {path}: {source}")]
pub struct LogError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// history aggregation failures, shown to whoever asked for the chart.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("number of days must be a positive integer, got '{0}'")]
    Input(String),

    #[error("no measurements found between {from} and {to}")]
    Data { from: String, to: String },

    #[error(transparent)]
    Io(#[from] LogError),
}
