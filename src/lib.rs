//! `env-monitor` library crate.
//!
//! The monitoring controller: settings store, sensor gateway, server probe,
//! measurement log, telemetry dispatcher, sampling controller and history
//! aggregator. The binary entrypoint lives in `main.rs`.

pub mod config;
pub mod domain;
pub mod error;
pub mod gpio;
pub mod hal;
pub mod history;
pub mod measurements;
pub mod probe;
pub mod restart;
pub mod sampling;
pub mod sensor;
pub mod server;
pub mod settings;
pub mod supervisor;
pub mod telemetry;
