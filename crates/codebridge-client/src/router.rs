//! Message router: the read loop of a session.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use codebridge_core::Envelope;

use crate::liveness::{LivenessSignal, ReadDeadline};
use crate::transport::FrameStream;

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterExit {
    /// The peer closed the link.
    Closed,
    /// A read failed.
    ReadFailed,
    /// Nothing proved the link alive before the read deadline.
    DeadlineExceeded,
    /// The session scope was cancelled elsewhere.
    Cancelled,
}

/// What the router needs besides the read half.
#[derive(Clone)]
pub struct RouterContext {
    /// Queue drained by the heartbeat; pong replies go here.
    pub outbound: mpsc::Sender<Envelope>,
    /// Pong notifications for the heartbeat.
    pub liveness: LivenessSignal,
    /// Read deadline shared with the heartbeat.
    pub deadline: Arc<ReadDeadline>,
    /// Where the bridge-assigned client id is recorded.
    pub client_id: Arc<Mutex<Option<String>>>,
}

/// Read frames until the link ends, the deadline passes or `scope` is cancelled.
///
/// Cancels `scope` before returning so the heartbeat stops too.
pub async fn run_router(
    mut stream: FrameStream,
    ctx: RouterContext,
    scope: CancellationToken,
) -> RouterExit {
    let exit = loop {
        let deadline = ctx.deadline.deadline();
        tokio::select! {
            () = scope.cancelled() => break RouterExit::Cancelled,
            () = time::sleep_until(deadline) => {
                if ctx.deadline.is_expired() {
                    warn!("no sign of life before read deadline");
                    break RouterExit::DeadlineExceeded;
                }
            }
            frame = stream.next() => match frame {
                None => {
                    info!("bridge closed the connection");
                    break RouterExit::Closed;
                }
                Some(Err(error)) => {
                    warn!(%error, "read failed");
                    break RouterExit::ReadFailed;
                }
                Some(Ok(text)) => ctx.dispatch(&text).await,
            },
        }
    };
    scope.cancel();
    exit
}

impl RouterContext {
    async fn dispatch(&self, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(error) => {
                debug!(%error, "dropping malformed frame");
                return;
            }
        };
        match envelope {
            Envelope::Ping => {
                if self.outbound.send(Envelope::Pong).await.is_err() {
                    debug!("session writer gone, pong not sent");
                }
            }
            Envelope::Pong => self.liveness.notify(),
            Envelope::AuthSuccess { role, client_id } => {
                info!(?role, ?client_id, "bridge accepted auth");
                self.record_client_id(client_id);
            }
            Envelope::HelloAck { client_id } => {
                debug!(?client_id, "bridge acknowledged hello");
                self.record_client_id(client_id);
            }
            other => trace!(kind = other.kind(), "ignoring inbound envelope"),
        }
    }

    fn record_client_id(&self, client_id: Option<String>) {
        if let Some(id) = client_id {
            *self.client_id.lock() = Some(id);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
