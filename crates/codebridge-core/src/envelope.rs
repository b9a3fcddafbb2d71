//! Wire envelopes exchanged with the bridge.
//!
//! Every frame is a JSON object discriminated by its `type` field. Outbound
//! kinds are built through the constructors on [`Envelope`]; inbound frames go
//! through [`Envelope::decode`], which maps unrecognized discriminators to
//! [`Envelope::Unknown`] instead of failing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::constants::{PLATFORM, PROTOCOL_VERSION, ROLE_BRIDGE};
use crate::errors::{BridgeError, Result};

/// A discriminator-tagged bridge message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// In-band authentication, always the first frame on a link.
    Auth {
        /// Shared secret.
        secret: String,
        /// Client role; always `"bridge"` for this client.
        role: String,
    },
    /// Capability advertisement, sent right after [`Envelope::Auth`].
    #[serde(rename_all = "camelCase")]
    Hello {
        /// Event categories this client may emit.
        capabilities: Vec<String>,
        /// Runtime platform tag.
        platform: String,
        /// Project identifier, omitted when unset.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        /// Protocol version.
        #[serde(rename = "protocol", alias = "protocolVersion")]
        protocol_version: u32,
    },
    /// Liveness check.
    Ping,
    /// Liveness reply.
    Pong,
    /// A console/log line.
    Console {
        /// Severity.
        level: LogLevel,
        /// Line content.
        message: String,
        /// Epoch milliseconds.
        timestamp: i64,
    },
    /// An error report.
    Error {
        /// Error message.
        message: String,
        /// Optional backtrace or stack text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
        /// Epoch milliseconds.
        timestamp: i64,
        /// Log lines leading up to the error, oldest first.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        breadcrumbs: Vec<Breadcrumb>,
    },
    /// Bridge acknowledgment of [`Envelope::Auth`].
    #[serde(rename_all = "camelCase")]
    AuthSuccess {
        /// Role the bridge registered us under.
        #[serde(default)]
        role: Option<String>,
        /// Bridge-assigned client id.
        #[serde(default)]
        client_id: Option<String>,
    },
    /// Bridge acknowledgment of [`Envelope::Hello`].
    #[serde(rename_all = "camelCase")]
    HelloAck {
        /// Bridge-assigned client id.
        #[serde(default)]
        client_id: Option<String>,
    },
    /// Any discriminator this client does not know.
    #[serde(other)]
    Unknown,
}

impl Envelope {
    /// Auth envelope for the given secret.
    pub fn auth(secret: &str) -> Self {
        Self::Auth {
            secret: secret.to_owned(),
            role: ROLE_BRIDGE.to_owned(),
        }
    }

    /// Hello envelope advertising the configured capabilities.
    pub fn hello(config: &ClientConfig) -> Self {
        Self::Hello {
            capabilities: config.capabilities().to_vec(),
            platform: PLATFORM.to_owned(),
            project_id: config.project_id().map(ToOwned::to_owned),
            protocol_version: PROTOCOL_VERSION,
        }
    }

    /// Console envelope stamped with the current time.
    pub fn console(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Console {
            level,
            message: message.into(),
            timestamp: now_millis(),
        }
    }

    /// Error envelope stamped with the current time.
    pub fn error(message: impl Into<String>, stack: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            stack,
            timestamp: now_millis(),
            breadcrumbs: Vec::new(),
        }
    }

    /// Attach a breadcrumb trail. Only error envelopes carry one; other kinds
    /// are returned unchanged.
    #[must_use]
    pub fn with_breadcrumbs(mut self, trail: Vec<Breadcrumb>) -> Self {
        if let Self::Error { breadcrumbs, .. } = &mut self {
            *breadcrumbs = trail;
        }
        self
    }

    /// The wire discriminator, for logging without exposing payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Hello { .. } => "hello",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Console { .. } => "console",
            Self::Error { .. } => "error",
            Self::AuthSuccess { .. } => "auth_success",
            Self::HelloAck { .. } => "hello_ack",
            Self::Unknown => "unknown",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON text frame.
    ///
    /// Frames that are not JSON objects or lack a string `type` field yield
    /// [`BridgeError::MalformedFrame`].
    pub fn decode(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| BridgeError::MalformedFrame(e.to_string()))?;
        if !value.get("type").is_some_and(serde_json::Value::is_string) {
            return Err(BridgeError::MalformedFrame(
                "missing type discriminator".into(),
            ));
        }
        serde_json::from_value(value).map_err(|e| BridgeError::MalformedFrame(e.to_string()))
    }
}

/// One recent log line attached to an error report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Severity of the line.
    pub level: LogLevel,
    /// Line content.
    pub message: String,
}

impl Breadcrumb {
    /// Breadcrumb stamped with the current time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: now_millis(),
            level,
            message: message.into(),
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ─────────────────────────────────────────────────────────────────────────────
// LogLevel
// ─────────────────────────────────────────────────────────────────────────────

/// Severity carried by console envelopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Plain log output.
    Log,
    /// Informational.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
    /// Debug detail.
    Debug,
}

impl LogLevel {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "debug" | "trace" => Ok(Self::Debug),
            other => Err(BridgeError::InvalidConfig(format!(
                "unknown log level: {other}"
            ))),
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Self::Error,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::INFO => Self::Info,
            _ => Self::Debug,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
