//! Settings shapes as they appear on disk.

use std::time::Duration;

use chrono::{DateTime, Utc};
use codebridge_core::{ClientConfig, Timings, default_capabilities};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Bridge address used when nothing else is configured.
pub const DEFAULT_URL: &str = "ws://localhost:9876";

/// Shared secret used when nothing else is configured.
pub const DEFAULT_SECRET: &str = "dev-secret";

/// Host metadata older than this is ignored.
pub const HOST_HEARTBEAT_STALE: Duration = Duration::from_secs(15);

/// Top-level client settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Bridge WebSocket address.
    pub url: String,
    /// Shared secret.
    pub secret: String,
    /// Project identifier sent in the hello envelope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Capabilities to advertise; empty means the defaults.
    pub capabilities: Vec<String>,
    /// Timing knobs, in milliseconds.
    pub timings: TimingSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            secret: DEFAULT_SECRET.to_string(),
            project_id: None,
            capabilities: default_capabilities(),
            timings: TimingSettings::default(),
        }
    }
}

impl BridgeSettings {
    /// Validate and convert into an immutable [`ClientConfig`].
    pub fn into_client_config(self) -> Result<ClientConfig> {
        let scheme = self.url.split_once("://").map(|(scheme, _)| scheme);
        if !matches!(scheme, Some("ws" | "wss")) {
            return Err(SettingsError::InvalidValue(format!(
                "url must use ws:// or wss://, got {:?}",
                self.url
            )));
        }
        if self.timings.heartbeat_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeatTimeoutMs must be greater than zero".into(),
            ));
        }

        let mut config = ClientConfig::new(self.url, self.secret)?
            .with_capabilities(self.capabilities)
            .with_timings(self.timings.to_timings())?;
        if let Some(project_id) = self.project_id {
            config = config.with_project_id(project_id);
        }
        Ok(config)
    }
}

/// Timing knobs in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingSettings {
    /// Interval between heartbeat pings.
    pub heartbeat_interval_ms: u64,
    /// Silence tolerated before reconnecting.
    pub heartbeat_timeout_ms: u64,
    /// Upper bound on a single dial.
    pub handshake_timeout_ms: u64,
    /// First reconnect delay.
    pub backoff_initial_ms: u64,
    /// Reconnect delay ceiling.
    pub backoff_max_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        let t = Timings::default();
        Self {
            heartbeat_interval_ms: millis(t.heartbeat_interval),
            heartbeat_timeout_ms: millis(t.heartbeat_timeout),
            handshake_timeout_ms: millis(t.handshake_timeout),
            backoff_initial_ms: millis(t.backoff_initial),
            backoff_max_ms: millis(t.backoff_max),
        }
    }
}

impl TimingSettings {
    /// Convert to the client's [`Timings`].
    pub fn to_timings(self) -> Timings {
        Timings {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            backoff_initial: Duration::from_millis(self.backoff_initial_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Metadata a running bridge host publishes in its workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMeta {
    /// Address the host listens on.
    pub url: String,
    /// Secret the host expects.
    pub secret: String,
    /// Port, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Host process id, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Workspace the host serves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<String>,
    /// Host start time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Last time the host refreshed this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<DateTime<Utc>>,
}

impl HostMeta {
    /// Whether the metadata can be trusted at `now`.
    ///
    /// Requires a non-empty url and secret. A missing `heartbeatAt` is
    /// accepted; a present one must be no older than [`HOST_HEARTBEAT_STALE`].
    pub fn is_healthy(&self, now: DateTime<Utc>) -> bool {
        if self.url.is_empty() || self.secret.is_empty() {
            return false;
        }
        match self.heartbeat_at {
            None => true,
            Some(at) => now
                .signed_duration_since(at)
                .to_std()
                .ok()
                .is_none_or(|age| age <= HOST_HEARTBEAT_STALE),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
