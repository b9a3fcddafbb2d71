//! Forward local `tracing` events and panics to the bridge.
//!
//! [`BridgeLayer`] plugs into a `tracing_subscriber` registry. Events at or
//! above its minimum level become console envelopes (`ERROR` events become
//! error envelopes). The client's own targets are skipped so a failing link
//! cannot feed on its own diagnostics.
//!
//! The layer also keeps a bounded [`Breadcrumbs`] trail of recent lines,
//! attached to every error it sends. [`install_panic_hook`] reports panics as
//! error envelopes carrying a backtrace and the same trail.

use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use codebridge_core::{Breadcrumb, Envelope, LogLevel};

use crate::client::BridgeClient;

/// Default minimum spacing between forwarded events.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

/// Default length of the breadcrumb trail.
pub const DEFAULT_MAX_BREADCRUMBS: usize = 50;

const OWN_TARGETS: [&str; 3] = ["codebridge", "tokio_tungstenite", "tungstenite"];

/// Shared ring of the most recent log lines, oldest first.
#[derive(Clone, Debug)]
pub struct Breadcrumbs {
    ring: Arc<Mutex<VecDeque<Breadcrumb>>>,
    capacity: usize,
}

impl Breadcrumbs {
    /// Trail keeping at most `capacity` lines; zero keeps none.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append a line, evicting the oldest once full.
    pub fn record(&self, level: LogLevel, message: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        let mut ring = self.ring.lock();
        if ring.len() == self.capacity {
            let _ = ring.pop_front();
        }
        ring.push_back(Breadcrumb::new(level, message));
    }

    /// Copy of the current trail.
    pub fn snapshot(&self) -> Vec<Breadcrumb> {
        self.ring.lock().iter().cloned().collect()
    }
}

impl Default for Breadcrumbs {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BREADCRUMBS)
    }
}

/// `tracing` layer that sends events through a [`BridgeClient`].
pub struct BridgeLayer {
    client: BridgeClient,
    min_level: Level,
    breadcrumb_level: Level,
    breadcrumbs: Breadcrumbs,
    throttle: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl BridgeLayer {
    /// Forward `WARN` and above, at most one event per [`DEFAULT_THROTTLE`].
    /// `INFO` and above are kept as breadcrumbs.
    pub fn new(client: BridgeClient) -> Self {
        Self {
            client,
            min_level: Level::WARN,
            breadcrumb_level: Level::INFO,
            breadcrumbs: Breadcrumbs::default(),
            throttle: DEFAULT_THROTTLE,
            last_sent: Mutex::new(None),
        }
    }

    /// Keep events at `level` and above in the breadcrumb trail.
    #[must_use]
    pub fn with_breadcrumb_level(mut self, level: Level) -> Self {
        self.breadcrumb_level = level;
        self
    }

    /// Use `trail` for breadcrumbs, e.g. one shared with [`install_panic_hook`].
    #[must_use]
    pub fn with_breadcrumbs(mut self, trail: Breadcrumbs) -> Self {
        self.breadcrumbs = trail;
        self
    }

    /// The layer's breadcrumb trail.
    pub fn breadcrumbs(&self) -> Breadcrumbs {
        self.breadcrumbs.clone()
    }

    /// Forward events at `level` and above.
    #[must_use]
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Minimum spacing between forwarded events; zero disables throttling.
    #[must_use]
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    fn admit(&self) -> bool {
        if self.throttle.is_zero() {
            return true;
        }
        let now = Instant::now();
        let mut last = self.last_sent.lock();
        match *last {
            Some(at) if now.duration_since(at) < self.throttle => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

fn is_own_target(target: &str) -> bool {
    OWN_TARGETS.iter().any(|own| target.starts_with(own))
}

impl<S: Subscriber> Layer<S> for BridgeLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = *meta.level();
        let forward = level <= self.min_level;
        let keep = level <= self.breadcrumb_level;
        if !(forward || keep) || is_own_target(meta.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let message = visitor.finish();

        // Snapshot first so an error's trail excludes its own line.
        let trail = (level == Level::ERROR).then(|| self.breadcrumbs.snapshot());
        if keep {
            self.breadcrumbs.record(LogLevel::from(level), message.clone());
        }
        if !forward || !self.client.is_connected() || !self.admit() {
            return;
        }

        // Rejections (link dropped, queue full) lose the event.
        let _ = match trail {
            Some(trail) => self
                .client
                .enqueue(Envelope::error(message, None).with_breadcrumbs(trail)),
            None => self.client.send_console(LogLevel::from(level), message),
        };
    }
}

/// Report panics to the bridge as error envelopes, then run the previously
/// installed hook.
///
/// The report carries the panic location, a backtrace, and `trail` when one is
/// given. Panics while no session is up are not reported.
pub fn install_panic_hook(client: BridgeClient, trail: Option<Breadcrumbs>) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        report_panic(&client, trail.as_ref(), info);
        previous(info);
    }));
}

fn report_panic(client: &BridgeClient, trail: Option<&Breadcrumbs>, info: &PanicHookInfo<'_>) {
    let mut message = format!("panicked: {}", payload_message(info.payload()));
    if let Some(location) = info.location() {
        let _ = write!(message, " at {location}");
    }
    let stack = Backtrace::force_capture().to_string();
    let envelope = Envelope::error(message, Some(stack))
        .with_breadcrumbs(trail.map(Breadcrumbs::snapshot).unwrap_or_default());
    let _ = client.enqueue(envelope);
}

fn payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        "Box<dyn Any>"
    }
}

/// Renders the `message` field followed by the remaining fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            value.clone_into(&mut self.message);
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use tracing_subscriber::layer::SubscriberExt;

    use crate::testutil::{MemoryDialer, Peer, config_with, quiet_timings};

    async fn connected() -> (BridgeClient, Peer, CancellationToken) {
        let (dialer, mut peers) = MemoryDialer::new();
        let client = BridgeClient::with_dialer(config_with(quiet_timings()), dialer);
        let cancel = CancellationToken::new();
        let _run = tokio::spawn({
            let client = client.clone();
            let cancel = cancel.clone();
            async move { client.run(cancel).await }
        });
        let mut peer = peers.recv().await.unwrap();
        peer.expect_handshake().await;
        while !client.is_connected() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        (client, peer, cancel)
    }

    fn emit(layer: BridgeLayer, f: impl FnOnce()) {
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn own_targets_are_recognized() {
        assert!(is_own_target("codebridge_client::router"));
        assert!(is_own_target("tungstenite::protocol"));
        assert!(is_own_target("tokio_tungstenite"));
        assert!(!is_own_target("my_app::db"));
    }

    #[tokio::test(start_paused = true)]
    async fn warn_becomes_console_and_error_becomes_error() {
        let (client, mut peer, cancel) = connected().await;
        emit(
            BridgeLayer::new(client).with_throttle(Duration::ZERO),
            || {
                tracing::info!(target: "my_app", "not forwarded");
                tracing::warn!(target: "my_app", rows = 3, "disk almost full");
                tracing::error!(target: "my_app", "write failed");
            },
        );

        let warn = peer.next_frame().await.unwrap();
        assert_eq!(warn["type"], "console");
        assert_eq!(warn["level"], "warn");
        assert_eq!(warn["message"], "disk almost full rows=3");

        let err = peer.next_frame().await.unwrap();
        assert_eq!(err["type"], "error");
        assert_eq!(err["message"], "write failed");

        assert!(peer.next_frame_within(Duration::from_secs(1)).await.is_none());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn own_events_are_not_forwarded() {
        let (client, mut peer, cancel) = connected().await;
        emit(BridgeLayer::new(client), || {
            tracing::error!(target: "codebridge_client::router", "read failed");
        });
        assert!(peer.next_frame_within(Duration::from_secs(1)).await.is_none());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_drops_bursts() {
        let (client, mut peer, cancel) = connected().await;
        let layer = BridgeLayer::new(client).with_min_level(Level::INFO);
        let subscriber = tracing_subscriber::registry().with(layer);
        let dispatch = tracing::Dispatch::new(subscriber);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(target: "my_app", "first");
            tracing::info!(target: "my_app", "second");
        });
        tokio::time::sleep(DEFAULT_THROTTLE).await;
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(target: "my_app", "third");
        });

        assert_eq!(peer.next_frame().await.unwrap()["message"], "first");
        assert_eq!(peer.next_frame().await.unwrap()["message"], "third");
        assert!(peer.next_frame_within(Duration::from_secs(1)).await.is_none());
        cancel.cancel();
    }

    #[test]
    fn breadcrumb_ring_evicts_oldest() {
        let trail = Breadcrumbs::new(2);
        trail.record(LogLevel::Info, "one");
        trail.record(LogLevel::Warn, "two");
        trail.record(LogLevel::Info, "three");
        let messages: Vec<_> = trail.snapshot().into_iter().map(|b| b.message).collect();
        assert_eq!(messages, ["two", "three"]);

        let none = Breadcrumbs::new(0);
        none.record(LogLevel::Info, "dropped");
        assert!(none.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn error_carries_preceding_lines() {
        let (client, mut peer, cancel) = connected().await;
        let trail = Breadcrumbs::new(2);
        emit(
            BridgeLayer::new(client).with_breadcrumbs(trail.clone()),
            || {
                tracing::info!(target: "my_app", "step a");
                tracing::info!(target: "my_app", "step b");
                tracing::debug!(target: "my_app", "too chatty");
                tracing::info!(target: "my_app", "step c");
                tracing::error!(target: "my_app", "step d failed");
            },
        );

        let err = peer.next_frame().await.unwrap();
        assert_eq!(err["type"], "error");
        assert_eq!(err["message"], "step d failed");
        let crumbs = err["breadcrumbs"].as_array().unwrap();
        assert_eq!(crumbs.len(), 2);
        assert_eq!(crumbs[0]["message"], "step b");
        assert_eq!(crumbs[1]["message"], "step c");
        assert_eq!(crumbs[1]["level"], "info");

        let after: Vec<_> = trail.snapshot().into_iter().map(|b| b.message).collect();
        assert_eq!(after, ["step c", "step d failed"]);
        assert!(peer.next_frame_within(Duration::from_secs(1)).await.is_none());
        cancel.cancel();
    }

    #[test]
    fn panic_payloads_render_as_text() {
        let text: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(payload_message(text.as_ref()), "static message");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(payload_message(owned.as_ref()), "owned message");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(payload_message(other.as_ref()), "Box<dyn Any>");
    }

    #[tokio::test(start_paused = true)]
    async fn panic_is_reported_with_backtrace_and_trail() {
        let (client, mut peer, cancel) = connected().await;
        let trail = Breadcrumbs::new(4);
        trail.record(LogLevel::Info, "about to divide");

        install_panic_hook(client, Some(trail));
        let divisor = std::hint::black_box(0_u32);
        let result = panic::catch_unwind(|| {
            assert!(divisor != 0, "division by zero");
        });
        drop(panic::take_hook());
        assert!(result.is_err());

        let frame = peer.next_frame().await.unwrap();
        assert_eq!(frame["type"], "error");
        let message = frame["message"].as_str().unwrap();
        assert!(
            message.starts_with("panicked: division by zero at "),
            "unexpected message: {message}"
        );
        assert!(message.contains("forward.rs"));
        assert!(frame["stack"].as_str().is_some_and(|s| !s.is_empty()));
        assert_eq!(frame["breadcrumbs"][0]["message"], "about to divide");
        cancel.cancel();
    }

    #[test]
    fn disconnected_client_drops_events() {
        let (dialer, _peers) = MemoryDialer::new();
        let client = BridgeClient::with_dialer(config_with(quiet_timings()), dialer);
        emit(BridgeLayer::new(client), || {
            tracing::error!(target: "my_app", "nobody listening");
        });
    }
}
