//! Connection supervisor: dial, handshake, run a session, back off, repeat.

use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use codebridge_core::constants::OUTBOUND_QUEUE_CAPACITY;
use codebridge_core::{Backoff, Result};

use crate::client::{ConnectionState, Inner, SessionHandle};
use crate::handshake::perform_handshake;
use crate::heartbeat::{HeartbeatTask, run_heartbeat};
use crate::liveness::{LivenessSignal, ReadDeadline};
use crate::router::{RouterContext, run_router};
use crate::transport::{FrameSink, FrameStream, Transport};

/// The reconnect loop behind [`BridgeClient::run`](crate::BridgeClient::run).
pub(crate) async fn supervise(inner: &Arc<Inner>, cancel: &CancellationToken) -> Result<()> {
    let timings = *inner.config.timings();
    let mut backoff = Backoff::new(timings.backoff_initial, timings.backoff_max);
    let mut attempt: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        attempt += 1;

        inner.set_state(ConnectionState::Dialing);
        let transport = match inner.dialer.dial(&inner.config).await {
            Ok(transport) => transport,
            Err(error) => {
                inner.set_state(ConnectionState::Disconnected);
                let delay = backoff.record_failure();
                warn!(
                    attempt,
                    delay_ms = millis(delay),
                    %error,
                    "dial failed, retrying"
                );
                if !wait_or_cancel(delay, cancel).await {
                    return Ok(());
                }
                continue;
            }
        };
        backoff.reset();

        let Transport { mut sink, stream } = transport;
        if cancel.is_cancelled() {
            close_link(&mut sink).await;
            return Ok(());
        }

        // Published before the handshake so `close` can abandon it.
        let scope = cancel.child_token();
        *inner.pending.lock() = Some(scope.clone());

        inner.set_state(ConnectionState::Handshaking);
        let handshake = tokio::select! {
            biased;
            () = scope.cancelled() => None,
            result = perform_handshake(&mut sink, &inner.config) => Some(result),
        };
        match handshake {
            Some(Err(err)) => {
                let _ = inner.pending.lock().take();
                error!(attempt, error = %err, "handshake failed, giving up");
                return Err(err);
            }
            Some(Ok(())) if !scope.is_cancelled() => {
                let span = info_span!("session", attempt, url = %inner.config.url());
                run_session(inner, sink, stream, scope).instrument(span).await;
            }
            _ => {
                let _ = inner.pending.lock().take();
                debug!(attempt, "link closed during handshake");
                close_link(&mut sink).await;
            }
        }
        inner.set_state(ConnectionState::Disconnected);

        // Doubles like a dial failure; the next successful dial resets it.
        let delay = backoff.record_failure();
        info!(attempt, delay_ms = millis(delay), "reconnecting after backoff");
        if !wait_or_cancel(delay, cancel).await {
            return Ok(());
        }
    }
}

/// One connected session: router on its own task, heartbeat on this one.
async fn run_session(inner: &Arc<Inner>, sink: FrameSink, stream: FrameStream, scope: CancellationToken) {
    let timings = inner.config.timings();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let (signal, liveness_rx) = LivenessSignal::channel();
    let deadline = Arc::new(ReadDeadline::new(timings.heartbeat_timeout));

    *inner.session.lock() = Some(SessionHandle {
        outbound: outbound_tx.clone(),
        scope: scope.clone(),
    });
    let _ = inner.pending.lock().take();
    inner.set_state(ConnectionState::Connected);
    info!("connected to bridge");

    let router = tokio::spawn(
        run_router(
            stream,
            RouterContext {
                outbound: outbound_tx,
                liveness: signal,
                deadline: deadline.clone(),
                client_id: inner.client_id.clone(),
            },
            scope.clone(),
        )
        .in_current_span(),
    );

    let heartbeat_exit = run_heartbeat(
        HeartbeatTask {
            sink,
            outbound: outbound_rx,
            liveness: liveness_rx,
            deadline,
            interval: timings.heartbeat_interval,
        },
        scope.clone(),
    )
    .await;

    inner.set_state(ConnectionState::Closing);
    let _ = inner.session.lock().take();

    match router.await {
        Ok(router_exit) => info!(?router_exit, ?heartbeat_exit, "session ended"),
        Err(join_error) => warn!(%join_error, ?heartbeat_exit, "router task failed"),
    }
}

/// Sleep for `delay`; `false` if `cancel` fired first.
async fn close_link(sink: &mut FrameSink) {
    let _ = time::timeout(Duration::from_secs(1), sink.close()).await;
}

async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = time::sleep(delay) => true,
        () = cancel.cancelled() => false,
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
