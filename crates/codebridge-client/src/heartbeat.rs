//! Heartbeat monitor: the single writer of a session.
//!
//! One select loop owns the write half of the transport. It sends a ping on
//! every tick, refreshes the read deadline on pings sent and pongs observed,
//! and drains the session's outbound queue (API events and pong replies), so
//! no two writes ever race.

use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use codebridge_core::{BridgeError, Envelope, Result};

use crate::liveness::ReadDeadline;
use crate::transport::FrameSink;

/// Bound on the close handshake when a session ends.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Why the heartbeat loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// The session scope was cancelled.
    Cancelled,
    /// A write to the transport failed.
    WriteFailed,
}

/// Inputs of one heartbeat loop.
pub struct HeartbeatTask {
    /// Write half of the transport.
    pub sink: FrameSink,
    /// Frames queued by the API and the router.
    pub outbound: mpsc::Receiver<Envelope>,
    /// Pong notifications from the router.
    pub liveness: mpsc::Receiver<()>,
    /// Read deadline shared with the router.
    pub deadline: Arc<ReadDeadline>,
    /// Ping interval.
    pub interval: Duration,
}

/// Run until `scope` is cancelled or a write fails.
///
/// On exit the scope is cancelled (stopping the router) and the write half is
/// closed.
pub async fn run_heartbeat(task: HeartbeatTask, scope: CancellationToken) -> HeartbeatExit {
    let HeartbeatTask {
        mut sink,
        mut outbound,
        mut liveness,
        deadline,
        interval,
    } = task;

    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            biased;

            () = scope.cancelled() => break HeartbeatExit::Cancelled,
            Some(()) = liveness.recv() => {
                trace!("pong observed, deadline refreshed");
                deadline.refresh();
            }
            _ = ticker.tick() => {
                if let Err(error) = write(&mut sink, &Envelope::Ping, &scope).await {
                    warn!(%error, "heartbeat ping failed");
                    break exit_for(&error);
                }
                deadline.refresh();
            }
            Some(envelope) = outbound.recv() => {
                if let Err(error) = write(&mut sink, &envelope, &scope).await {
                    warn!(kind = envelope.kind(), %error, "outbound write failed");
                    break exit_for(&error);
                }
            }
        }
    };

    scope.cancel();
    outbound.close();
    match time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => debug!("write half closed"),
        Ok(Err(error)) => debug!(%error, "close failed"),
        Err(_) => debug!("close timed out"),
    }
    exit
}

fn exit_for(error: &BridgeError) -> HeartbeatExit {
    match error {
        BridgeError::Cancelled => HeartbeatExit::Cancelled,
        _ => HeartbeatExit::WriteFailed,
    }
}

/// Encode and write one envelope, abandoning the write if `scope` ends.
///
/// Encoding failures are logged and swallowed; they say nothing about the link.
async fn write(sink: &mut FrameSink, envelope: &Envelope, scope: &CancellationToken) -> Result<()> {
    let text = match envelope.encode() {
        Ok(text) => text,
        Err(error) => {
            warn!(kind = envelope.kind(), %error, "dropping unencodable envelope");
            return Ok(());
        }
    };
    tokio::select! {
        result = sink.send(text) => {
            trace!(kind = envelope.kind(), "frame written");
            result
        }
        () = scope.cancelled() => Err(BridgeError::Cancelled),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
