//! In-memory transports and scripted dialers for client tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use codebridge_core::{BridgeError, ClientConfig, Result, Timings};

use crate::transport::{Dialer, FrameSink, Transport};

/// Config pointing nowhere, with the given timings.
pub fn config_with(timings: Timings) -> ClientConfig {
    ClientConfig::new("ws://bridge.test", "s3cret")
        .unwrap()
        .with_timings(timings)
        .unwrap()
}

/// Timings with heartbeats far enough apart to stay out of the way.
pub fn quiet_timings() -> Timings {
    Timings {
        heartbeat_interval: Duration::from_secs(600),
        heartbeat_timeout: Duration::from_secs(1200),
        ..Timings::default()
    }
}

/// A sink that records every frame written to it.
pub fn capture_sink() -> (FrameSink, fmpsc::UnboundedReceiver<String>) {
    let (tx, rx) = fmpsc::unbounded();
    let sink = tx.sink_map_err(|e| BridgeError::Transport(e.to_string()));
    (Box::pin(sink), rx)
}

/// A sink whose every write fails.
pub fn broken_sink() -> FrameSink {
    Box::pin(futures::sink::unfold((), |(), _text: String| async {
        Err::<(), _>(BridgeError::Transport("broken pipe".into()))
    }))
}

/// The bridge's end of an in-memory link.
pub struct Peer {
    written: fmpsc::UnboundedReceiver<String>,
    inbound: fmpsc::UnboundedSender<Result<String>>,
}

impl Peer {
    /// Next frame the client wrote, parsed; `None` once the client closed its half.
    pub async fn next_frame(&mut self) -> Option<Value> {
        let text = self.written.next().await?;
        Some(serde_json::from_str(&text).unwrap())
    }

    /// Next frame, giving up after `wait`.
    pub async fn next_frame_within(&mut self, wait: Duration) -> Option<Value> {
        tokio::time::timeout(wait, self.next_frame()).await.ok().flatten()
    }

    /// Read and check the auth and hello frames.
    pub async fn expect_handshake(&mut self) {
        let auth = self.next_frame().await.unwrap();
        assert_eq!(auth["type"], "auth");
        let hello = self.next_frame().await.unwrap();
        assert_eq!(hello["type"], "hello");
    }

    /// Deliver a JSON frame to the client.
    pub fn send(&self, value: &Value) {
        self.send_raw(&value.to_string());
    }

    /// Deliver a raw text frame to the client.
    pub fn send_raw(&self, text: &str) {
        self.inbound.unbounded_send(Ok(text.to_owned())).unwrap();
    }

    /// Make the client's next read fail.
    pub fn fail_read(&self) {
        self.inbound
            .unbounded_send(Err(BridgeError::Transport("connection reset".into())))
            .unwrap();
    }
}

/// Dialer handing each new link's bridge end to the test.
pub struct MemoryDialer {
    peers: mpsc::UnboundedSender<Peer>,
}

impl MemoryDialer {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Peer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { peers }), rx)
    }
}

#[async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, config: &ClientConfig) -> Result<Transport> {
        let (client_tx, written) = fmpsc::unbounded::<String>();
        let (inbound, client_rx) = fmpsc::unbounded::<Result<String>>();
        self.peers
            .send(Peer { written, inbound })
            .map_err(|_| BridgeError::DialFailed {
                url: config.url().to_owned(),
                reason: "test harness gone".into(),
            })?;
        let sink = client_tx.sink_map_err(|e| BridgeError::Transport(e.to_string()));
        Ok(Transport::new(sink, client_rx))
    }
}

/// Dialer that fails, recording when it was called.
///
/// The first `sessions` dials succeed with a link the bridge hangs up at
/// once. Cancels `cancel` once `cancel_after` attempts have been made.
#[derive(Clone)]
pub struct FailingDialer {
    attempts: Arc<Mutex<Vec<Instant>>>,
    sessions: usize,
    cancel_after: usize,
    cancel: CancellationToken,
}

impl FailingDialer {
    pub fn new(cancel_after: usize, cancel: CancellationToken) -> Self {
        Self::after_sessions(0, cancel_after, cancel)
    }

    pub fn after_sessions(sessions: usize, cancel_after: usize, cancel: CancellationToken) -> Self {
        Self {
            attempts: Arc::default(),
            sessions,
            cancel_after,
            cancel,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Whole seconds between consecutive attempts.
    pub fn gaps_secs(&self) -> Vec<u64> {
        self.attempts
            .lock()
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect()
    }
}

#[async_trait]
impl Dialer for FailingDialer {
    async fn dial(&self, config: &ClientConfig) -> Result<Transport> {
        let count = {
            let mut attempts = self.attempts.lock();
            attempts.push(Instant::now());
            attempts.len()
        };
        if count >= self.cancel_after {
            self.cancel.cancel();
        }
        if count <= self.sessions {
            let sink = futures::sink::drain().sink_map_err(|never| match never {});
            return Ok(Transport::new(sink, futures::stream::empty()));
        }
        Err(BridgeError::DialFailed {
            url: config.url().to_owned(),
            reason: "connection refused".into(),
        })
    }
}

/// Dialer whose links accept no writes and never deliver frames.
pub struct BrokenDialer;

#[async_trait]
impl Dialer for BrokenDialer {
    async fn dial(&self, _config: &ClientConfig) -> Result<Transport> {
        Ok(Transport {
            sink: broken_sink(),
            stream: Box::pin(futures::stream::pending()),
        })
    }
}

/// Dialer whose links hold every write until [`GatedDialer::release`] lets it
/// through.
#[derive(Clone)]
pub struct GatedDialer {
    gate: Arc<Semaphore>,
    dials: Arc<AtomicUsize>,
}

impl GatedDialer {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            dials: Arc::default(),
        }
    }

    /// Let `writes` more frames through.
    pub fn release(&self, writes: usize) {
        self.gate.add_permits(writes);
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for GatedDialer {
    async fn dial(&self, _config: &ClientConfig) -> Result<Transport> {
        let _ = self.dials.fetch_add(1, Ordering::SeqCst);
        let sink = futures::sink::unfold(self.gate.clone(), |gate, _text: String| async move {
            gate.clone()
                .acquire_owned()
                .await
                .map_err(|e| BridgeError::Transport(e.to_string()))?
                .forget();
            Ok::<_, BridgeError>(gate)
        });
        Ok(Transport::new(sink, futures::stream::pending()))
    }
}
