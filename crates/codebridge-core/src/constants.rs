//! Protocol and timing constants.

use std::time::Duration;

/// Wire protocol version advertised in the hello envelope.
pub const PROTOCOL_VERSION: u32 = 2;

/// Role announced in the auth envelope.
pub const ROLE_BRIDGE: &str = "bridge";

/// Platform tag announced in the hello envelope.
pub const PLATFORM: &str = "rust";

/// Upgrade header carrying the shared secret.
pub const SECRET_HEADER: &str = "X-Bridge-Secret";

/// Capabilities advertised when the caller supplies none.
pub const DEFAULT_CAPABILITIES: [&str; 2] = ["console", "error"];

/// Interval between heartbeat pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Silence tolerated before the link is declared dead.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on a single dial (TCP connect + WebSocket upgrade).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// First reconnect delay, and the delay after every successful dial.
pub const BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Reconnect delay ceiling.
pub const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Capacity of a session's outbound frame queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_timeout_exceeds_interval() {
        assert!(HEARTBEAT_TIMEOUT > HEARTBEAT_INTERVAL);
    }

    #[test]
    fn backoff_bounds_are_ordered() {
        assert!(BACKOFF_INITIAL <= BACKOFF_MAX);
        assert_eq!(BACKOFF_INITIAL, Duration::from_secs(1));
        assert_eq!(BACKOFF_MAX, Duration::from_secs(30));
    }

    #[test]
    fn protocol_version_is_two() {
        assert_eq!(PROTOCOL_VERSION, 2);
    }
}
