//! # codebridge-client
//!
//! Keeps one authenticated WebSocket link to a code bridge open and streams
//! console and error events over it.
//!
//! - [`BridgeClient`]: the handle; `run` drives the reconnect loop, the
//!   `send_*` methods queue events on the live session
//! - [`transport`]: the [`Dialer`] seam and the WebSocket implementation
//! - [`heartbeat`] / [`router`]: the two tasks of a connected session
//! - [`forward::BridgeLayer`]: a `tracing` layer forwarding local events, and
//!   [`forward::install_panic_hook`] for reporting panics
//!
//! ```no_run
//! use codebridge_client::BridgeClient;
//! use codebridge_core::{ClientConfig, LogLevel};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> codebridge_core::Result<()> {
//! let client = BridgeClient::new(ClientConfig::new("ws://localhost:9876", "dev-secret")?);
//! let cancel = CancellationToken::new();
//! tokio::spawn({
//!     let client = client.clone();
//!     let cancel = cancel.clone();
//!     async move { client.run(cancel).await }
//! });
//! let _ = client.send_console(LogLevel::Info, "hello");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod forward;
pub mod handshake;
pub mod heartbeat;
pub mod liveness;
pub mod router;
mod supervisor;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{BridgeClient, ConnectionState};
pub use forward::{BridgeLayer, Breadcrumbs, install_panic_hook};
pub use transport::{Dialer, FrameSink, FrameStream, Transport, WsDialer};
