//! ==============================================================================
//! telemetry.rs - forwarding readings to the monitoring server
//! ==============================================================================
//!
//! purpose:
//!     pushes temperature and humidity of a valid tick to the remote server,
//!     tagged with the device address. dispatch only happens when this tick's
//!     probe said the server is reachable. there is no queue and no retry:
//!     a failed or skipped push is logged and forgotten.
//!
//! sinks:
//!     - ZabbixSink: zabbix trapper items over the sender protocol
//!       ("ZBXD\x01" + u64 LE length + json body), one request per dispatch.
//!     - HttpSink: json POST to a hub url.
//!
//! relationships:
//!     - used by: sampling.rs
//!     - built by: supervisor.rs from settings + host config
//!
//! ==============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::domain::{Metric, ServerStatus};
use crate::settings::Settings;

/// one `(device, key, value)` triple
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryItem {
    pub host: String,
    pub key: &'static str,
    pub value: String,
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send(&self, items: &[TelemetryItem]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// server was unreachable this tick
    Skipped,
    /// the sink reported an error; not retried
    Failed,
}

pub struct TelemetryDispatcher {
    sink: Arc<dyn TelemetrySink>,
    device: String,
}

impl TelemetryDispatcher {
    pub fn new(sink: Arc<dyn TelemetrySink>, settings: &Settings) -> Self {
        Self {
            sink,
            device: settings.device_address.to_string(),
        }
    }

    pub fn items(&self, temperature: f32, humidity: f32) -> Vec<TelemetryItem> {
        [
            (Metric::Temperature, temperature),
            (Metric::Humidity, humidity),
        ]
        .into_iter()
        .map(|(metric, value)| TelemetryItem {
            host: self.device.clone(),
            key: metric.telemetry_key(),
            value: value.to_string(),
        })
        .collect()
    }

    pub async fn dispatch(
        &self,
        temperature: f32,
        humidity: f32,
        server: &ServerStatus,
    ) -> DispatchOutcome {
        if !server.reachable {
            tracing::info!(host = %server.host_label, "No connection with server, telemetry skipped");
            return DispatchOutcome::Skipped;
        }

        match self.sink.send(&self.items(temperature, humidity)).await {
            Ok(()) => {
                tracing::debug!(host = %server.host_label, "Telemetry sent");
                DispatchOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(host = %server.host_label, error = %e, "Telemetry push failed");
                DispatchOutcome::Failed
            }
        }
    }
}

// ==============================================================================
// zabbix sender protocol
// ==============================================================================

const ZBX_HEADER: &[u8; 5] = b"ZBXD\x01";

#[derive(Serialize)]
struct SenderRequest<'a> {
    request: &'static str,
    data: &'a [TelemetryItem],
}

#[derive(Debug, Deserialize)]
struct SenderResponse {
    response: String,
    #[serde(default)]
    info: String,
}

pub fn encode_sender_request(items: &[TelemetryItem]) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(&SenderRequest {
        request: "sender data",
        data: items,
    })?;

    let mut frame = Vec::with_capacity(ZBX_HEADER.len() + 8 + body.len());
    frame.extend_from_slice(ZBX_HEADER);
    frame.extend_from_slice(&(body.len() as u64).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

fn decode_sender_response(frame: &[u8]) -> Result<SenderResponse> {
    if frame.len() < ZBX_HEADER.len() + 8 || &frame[..ZBX_HEADER.len()] != ZBX_HEADER {
        bail!("invalid zabbix response header");
    }
    let body = &frame[ZBX_HEADER.len() + 8..];
    serde_json::from_slice(body).context("invalid zabbix response body")
}

pub struct ZabbixSink {
    server: SocketAddr,
    timeout: Duration,
}

impl ZabbixSink {
    pub fn new(settings: &Settings, timeout: Duration) -> Self {
        Self {
            server: SocketAddr::from((settings.server_address, settings.server_port)),
            timeout,
        }
    }

    async fn exchange(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let mut stream = TcpStream::connect(self.server).await?;
        stream.write_all(frame).await?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        Ok(response)
    }
}

#[async_trait]
impl TelemetrySink for ZabbixSink {
    async fn send(&self, items: &[TelemetryItem]) -> Result<()> {
        let frame = encode_sender_request(items)?;
        let response = tokio::time::timeout(self.timeout, self.exchange(&frame))
            .await
            .map_err(|_| anyhow!("zabbix sender timed out after {:?}", self.timeout))??;

        let response = decode_sender_response(&response)?;
        if response.response != "success" {
            bail!("zabbix rejected items: {}", response.info);
        }
        tracing::debug!(info = %response.info, "Zabbix accepted items");
        Ok(())
    }
}

// ==============================================================================
// http hub
// ==============================================================================

pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    async fn send(&self, items: &[TelemetryItem]) -> Result<()> {
        self.client
            .post(&self.url)
            .json(items)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
