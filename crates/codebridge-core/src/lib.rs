//! # codebridge-core
//!
//! Foundation types shared by every code bridge crate:
//!
//! - **Envelopes**: [`Envelope`], the tagged JSON message exchanged with the bridge
//! - **Errors**: [`BridgeError`] via `thiserror`
//! - **Backoff**: [`Backoff`], the capped exponential reconnect delay
//! - **Configuration**: [`ClientConfig`] and its [`Timings`]
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` stack

#![deny(unsafe_code)]

pub mod backoff;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod errors;
pub mod logging;

pub use backoff::{Backoff, backoff_delay};
pub use config::{ClientConfig, Timings, default_capabilities};
pub use envelope::{Breadcrumb, Envelope, LogLevel, now_millis};
pub use errors::{BridgeError, Result};
pub use logging::{LogFormat, init_subscriber};
