//! ==============================================================================
//! probe.rs - monitoring server reachability probe
//! ==============================================================================
//!
//! purpose:
//!     answers "who is the server and can we reach it right now?" once per tick.
//!     the label comes from reverse dns (or a configured friendly name), the
//!     reachability from a single icmp echo with a short timeout.
//!
//! the probe never fails: every error collapses to `reachable = false`.
//!
//! relationships:
//!     - used by: sampling.rs (once per valid tick)
//!     - uses: `ping` and `getent` via tokio::process
//!
//! ==============================================================================

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::ServerStatus;

/// network reachability primitive
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_reachable(&self, address: Ipv4Addr, timeout: Duration) -> bool;
}

/// reverse dns primitive
#[async_trait]
pub trait ReverseResolver: Send + Sync {
    async fn lookup(&self, address: Ipv4Addr) -> Option<String>;
}

// ==============================================================================
// system implementations
// ==============================================================================

/// one `ping -c 1` echo request
pub struct IcmpPing;

#[async_trait]
impl Reachability for IcmpPing {
    async fn is_reachable(&self, address: Ipv4Addr, timeout: Duration) -> bool {
        // ping's own deadline is whole seconds; the outer timeout is the real bound
        let wait_secs = timeout.as_secs().max(1).to_string();
        let ping = Command::new("ping")
            .args(["-c", "1", "-W", &wait_secs, &address.to_string()])
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(timeout + Duration::from_millis(500), ping).await {
            Ok(Ok(output)) => output.status.success(),
            Ok(Err(e)) => {
                tracing::warn!(%address, error = %e, "Failed to execute ping");
                false
            }
            Err(_) => {
                tracing::debug!(%address, "Ping timed out");
                false
            }
        }
    }
}

/// reverse lookup through the system resolver (`getent hosts`)
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ReverseResolver for SystemResolver {
    async fn lookup(&self, address: Ipv4Addr) -> Option<String> {
        let getent = Command::new("getent")
            .args(["hosts", &address.to_string()])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, getent).await.ok()?.ok()?;
        if !output.status.success() {
            return None;
        }
        parse_getent_hosts(&String::from_utf8_lossy(&output.stdout))
    }
}

/// `10.0.10.55     zabbix.lan zabbix` -> `zabbix.lan`
fn parse_getent_hosts(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

// ==============================================================================
// probe
// ==============================================================================

pub struct ServerProbe {
    resolver: Arc<dyn ReverseResolver>,
    reachability: Arc<dyn Reachability>,
    labels: HashMap<Ipv4Addr, String>,
    timeout: Duration,
}

impl ServerProbe {
    pub fn new(
        resolver: Arc<dyn ReverseResolver>,
        reachability: Arc<dyn Reachability>,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            reachability,
            labels: HashMap::new(),
            timeout,
        }
    }

    /// ping + getent probe with the given timeout
    pub fn system(timeout: Duration) -> Self {
        Self::new(
            Arc::new(SystemResolver::new(timeout)),
            Arc::new(IcmpPing),
            timeout,
        )
    }

    /// fixed labels that take precedence over reverse dns
    pub fn with_labels(mut self, labels: HashMap<Ipv4Addr, String>) -> Self {
        self.labels = labels;
        self
    }

    pub async fn probe(&self, address: Ipv4Addr) -> ServerStatus {
        let host_label = match self.labels.get(&address) {
            Some(label) => label.clone(),
            None => self
                .resolver
                .lookup(address)
                .await
                .unwrap_or_else(|| address.to_string()),
        };

        let reachable = self.reachability.is_reachable(address, self.timeout).await;
        tracing::debug!(%address, host = %host_label, reachable, "Server probed");

        ServerStatus {
            host_label,
            reachable,
        }
    }
}
