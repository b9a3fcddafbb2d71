//! Message-oriented duplex link to the bridge.
//!
//! A [`Transport`] is split into a write half ([`FrameSink`]) and a read half
//! ([`FrameStream`]) carrying JSON text frames. [`Dialer`] opens one; the
//! production implementation is [`WsDialer`].

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, instrument};

use codebridge_core::constants::SECRET_HEADER;
use codebridge_core::{BridgeError, ClientConfig, Result};

/// Write half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = BridgeError> + Send>>;

/// Read half of a transport. Ends when the peer closes the link.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An opened link, already split into its halves.
pub struct Transport {
    /// Outbound text frames.
    pub sink: FrameSink,
    /// Inbound text frames.
    pub stream: FrameStream,
}

impl Transport {
    /// Wrap any sink/stream pair carrying text frames.
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<String, Error = BridgeError> + Send + 'static,
        St: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Opens transports to the bridge.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a new link. Errors are [`BridgeError::DialFailed`].
    async fn dial(&self, config: &ClientConfig) -> Result<Transport>;
}

/// WebSocket dialer.
///
/// Sends the shared secret in the upgrade request and bounds the TCP connect
/// plus upgrade by the configured handshake timeout.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsDialer;

#[async_trait]
impl Dialer for WsDialer {
    #[instrument(skip_all, fields(url = %config.url()))]
    async fn dial(&self, config: &ClientConfig) -> Result<Transport> {
        let url = config.url();
        let dial_err = |reason: String| BridgeError::DialFailed {
            url: url.to_owned(),
            reason,
        };

        let mut request = url
            .into_client_request()
            .map_err(|e| dial_err(e.to_string()))?;
        let secret = HeaderValue::from_str(config.secret())
            .map_err(|_| dial_err("secret is not a valid header value".into()))?;
        let _ = request.headers_mut().insert(SECRET_HEADER, secret);

        let timeout = config.timings().handshake_timeout;
        let (ws, response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| dial_err(format!("timed out after {}ms", timeout.as_millis())))?
            .map_err(|e| dial_err(e.to_string()))?;
        debug!(status = %response.status(), "websocket upgraded");

        let (ws_tx, ws_rx) = ws.split();
        let sink = ws_tx
            .with(|text: String| future::ready(Ok(Message::Text(text.into()))))
            .sink_map_err(|e: tokio_tungstenite::tungstenite::Error| {
                BridgeError::Transport(e.to_string())
            });
        let stream = ws_rx.filter_map(|msg| future::ready(text_frame(msg)));
        Ok(Transport::new(sink, stream))
    }
}

/// Extract text from a WebSocket message; control frames are skipped.
fn text_frame(
    msg: std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<String>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Some(Ok(text)),
            Err(_) => {
                debug!(len = data.len(), "dropping non-UTF8 binary frame");
                None
            }
        },
        Ok(Message::Close(frame)) => {
            debug!(?frame, "peer sent close frame");
            None
        }
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(BridgeError::Transport(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn text_frames_pass_through() {
        let out = text_frame(Ok(Message::Text("{\"type\":\"ping\"}".into())));
        assert_matches!(out, Some(Ok(s)) if s == "{\"type\":\"ping\"}");
    }

    #[test]
    fn utf8_binary_is_text() {
        let out = text_frame(Ok(Message::Binary(b"{\"type\":\"pong\"}".to_vec().into())));
        assert_matches!(out, Some(Ok(s)) if s == "{\"type\":\"pong\"}");
    }

    #[test]
    fn invalid_binary_and_control_frames_are_skipped() {
        assert!(text_frame(Ok(Message::Binary(vec![0xff, 0xfe].into()))).is_none());
        assert!(text_frame(Ok(Message::Ping(Vec::new().into()))).is_none());
        assert!(text_frame(Ok(Message::Close(None))).is_none());
    }

    #[test]
    fn read_errors_become_transport_errors() {
        let out = text_frame(Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed));
        assert_matches!(out, Some(Err(BridgeError::Transport(_))));
    }

    #[tokio::test]
    async fn unreachable_address_is_dial_failure() {
        // Port 1 on loopback is reserved and refuses connections.
        let config = ClientConfig::new("ws://127.0.0.1:1", "s").unwrap();
        let err = WsDialer.dial(&config).await.unwrap_err();
        assert_matches!(err, BridgeError::DialFailed { .. });
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn invalid_url_is_dial_failure() {
        let config = ClientConfig::new("not a url", "s").unwrap();
        let err = WsDialer.dial(&config).await.unwrap_err();
        assert_matches!(err, BridgeError::DialFailed { .. });
    }
}
