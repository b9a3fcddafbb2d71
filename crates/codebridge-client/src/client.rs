//! Caller-facing handle.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use codebridge_core::{BridgeError, ClientConfig, Envelope, LogLevel, Result};

use crate::transport::{Dialer, WsDialer};

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No link, waiting to dial or not running.
    Disconnected,
    /// Opening a transport.
    Dialing,
    /// Writing auth and hello.
    Handshaking,
    /// Session running; sends are accepted.
    Connected,
    /// Session tearing down.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Dialing => "dialing",
            Self::Handshaking => "handshaking",
            Self::Connected => "connected",
            Self::Closing => "closing",
        })
    }
}

/// Handles to the live session, present only while connected.
pub(crate) struct SessionHandle {
    pub(crate) outbound: mpsc::Sender<Envelope>,
    pub(crate) scope: CancellationToken,
}

pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    pub(crate) dialer: Arc<dyn Dialer>,
    pub(crate) session: Mutex<Option<SessionHandle>>,
    /// Scope of a link that is open but still handshaking.
    pub(crate) pending: Mutex<Option<CancellationToken>>,
    pub(crate) state: Mutex<ConnectionState>,
    pub(crate) client_id: Arc<Mutex<Option<String>>>,
    pub(crate) running: AtomicBool,
}

impl Inner {
    pub(crate) fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = %*state, to = %next, "connection state");
            *state = next;
        }
    }
}

/// Self-healing client for one bridge.
///
/// Cheap to clone; all clones share the same connection. Drive it with
/// [`BridgeClient::run`] on a task of its own and send events from anywhere.
#[derive(Clone)]
pub struct BridgeClient {
    pub(crate) inner: Arc<Inner>,
}

impl BridgeClient {
    /// Client dialing over WebSocket.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_dialer(config, Arc::new(WsDialer))
    }

    /// Client with a custom transport.
    pub fn with_dialer(config: ClientConfig, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                dialer,
                session: Mutex::new(None),
                pending: Mutex::new(None),
                state: Mutex::new(ConnectionState::Disconnected),
                client_id: Arc::new(Mutex::new(None)),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// The client's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether sends are currently accepted.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Client id assigned by the bridge in its most recent acknowledgment.
    pub fn client_id(&self) -> Option<String> {
        self.inner.client_id.lock().clone()
    }

    /// Queue a console event on the live session.
    ///
    /// Never blocks. Fails with [`BridgeError::NotConnected`] when no session
    /// is active and [`BridgeError::QueueFull`] when the session is backed up.
    pub fn send_console(&self, level: LogLevel, message: impl Into<String>) -> Result<()> {
        self.enqueue(Envelope::console(level, message))
    }

    /// Queue an error event on the live session. Same failure modes as
    /// [`BridgeClient::send_console`].
    pub fn send_error(&self, message: impl Into<String>, stack: Option<String>) -> Result<()> {
        self.enqueue(Envelope::error(message, stack))
    }

    pub(crate) fn enqueue(&self, envelope: Envelope) -> Result<()> {
        let session = self.inner.session.lock();
        let handle = session
            .as_ref()
            .filter(|h| !h.scope.is_cancelled())
            .ok_or(BridgeError::NotConnected)?;
        handle.outbound.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BridgeError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BridgeError::NotConnected,
        })
    }

    /// Tear down the live session, if any.
    ///
    /// A link still handshaking is abandoned before it connects. The
    /// transport is closed and `run` moves on to its next attempt after
    /// the backoff wait; cancel the token given to `run` to stop for good.
    /// Safe to call at any time, from any number of tasks.
    pub fn close(&self) {
        let session = self.inner.session.lock().take();
        let scope = match session {
            Some(handle) => Some(handle.scope),
            None => self.inner.pending.lock().take(),
        };
        if let Some(scope) = scope {
            self.inner.set_state(ConnectionState::Closing);
            scope.cancel();
        }
    }

    /// Run the connect/reconnect loop until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation and an error only when a handshake
    /// write fails or another `run` is already active on this client.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.inner.running);
        let result = crate::supervisor::supervise(&self.inner, &cancel).await;
        self.close();
        self.inner.set_state(ConnectionState::Disconnected);
        result
    }
}

impl fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeClient")
            .field("url", &self.inner.config.url())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
