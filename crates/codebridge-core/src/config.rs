//! Client configuration.

use std::fmt;
use std::time::Duration;

use crate::constants::{
    BACKOFF_INITIAL, BACKOFF_MAX, DEFAULT_CAPABILITIES, HANDSHAKE_TIMEOUT, HEARTBEAT_INTERVAL,
    HEARTBEAT_TIMEOUT,
};
use crate::errors::{BridgeError, Result};

/// Capabilities advertised when none are configured.
pub fn default_capabilities() -> Vec<String> {
    DEFAULT_CAPABILITIES.iter().map(|c| (*c).to_owned()).collect()
}

/// Timing knobs for one client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timings {
    /// Interval between heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before the link is declared dead.
    pub heartbeat_timeout: Duration,
    /// Upper bound on a single dial.
    pub handshake_timeout: Duration,
    /// First reconnect delay.
    pub backoff_initial: Duration,
    /// Reconnect delay ceiling.
    pub backoff_max: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            backoff_initial: BACKOFF_INITIAL,
            backoff_max: BACKOFF_MAX,
        }
    }
}

impl Timings {
    fn validate(&self) -> Result<()> {
        let zero = [
            ("heartbeat_interval", self.heartbeat_interval),
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("handshake_timeout", self.handshake_timeout),
            ("backoff_initial", self.backoff_initial),
        ]
        .into_iter()
        .find(|(_, d)| d.is_zero());
        if let Some((name, _)) = zero {
            return Err(BridgeError::InvalidConfig(format!("{name} must be non-zero")));
        }
        Ok(())
    }
}

/// Immutable connection settings for one bridge client.
///
/// Built with [`ClientConfig::new`] and the `with_*` methods; the capability
/// list is never empty.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    url: String,
    secret: String,
    project_id: Option<String>,
    capabilities: Vec<String>,
    timings: Timings,
}

impl ClientConfig {
    /// Config for the given bridge address and shared secret.
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let secret = secret.into();
        if url.trim().is_empty() {
            return Err(BridgeError::InvalidConfig("url must not be empty".into()));
        }
        if secret.is_empty() {
            return Err(BridgeError::InvalidConfig("secret must not be empty".into()));
        }
        Ok(Self {
            url,
            secret,
            project_id: None,
            capabilities: default_capabilities(),
            timings: Timings::default(),
        })
    }

    /// Attach a project identifier.
    #[must_use]
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        self.project_id = (!project_id.is_empty()).then_some(project_id);
        self
    }

    /// Replace the capability list. An empty list keeps the defaults.
    #[must_use]
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let capabilities: Vec<String> = capabilities.into_iter().map(Into::into).collect();
        self.capabilities = if capabilities.is_empty() {
            default_capabilities()
        } else {
            capabilities
        };
        self
    }

    /// Override the timing knobs.
    pub fn with_timings(mut self, timings: Timings) -> Result<Self> {
        timings.validate()?;
        self.timings = timings;
        Ok(self)
    }

    /// Bridge address.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Shared secret.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Project identifier, if any.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Advertised capabilities, in order.
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Timing knobs.
    pub fn timings(&self) -> &Timings {
        &self.timings
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("secret", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("capabilities", &self.capabilities)
            .field("timings", &self.timings)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
