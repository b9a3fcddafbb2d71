//! Auth and hello, written back to back on a fresh transport.

use std::time::Duration;

use futures::SinkExt;
use tracing::debug;

use codebridge_core::{BridgeError, ClientConfig, Envelope, Result};

use crate::transport::FrameSink;

/// Send `auth` then `hello` without waiting for acknowledgments.
///
/// Each write is bounded by the handshake timeout. Any failure is
/// [`BridgeError::HandshakeWriteFailed`] naming the envelope that failed.
pub async fn perform_handshake(sink: &mut FrameSink, config: &ClientConfig) -> Result<()> {
    let timeout = config.timings().handshake_timeout;
    write_stage(sink, "auth", &Envelope::auth(config.secret()), timeout).await?;
    write_stage(sink, "hello", &Envelope::hello(config), timeout).await
}

async fn write_stage(
    sink: &mut FrameSink,
    stage: &'static str,
    envelope: &Envelope,
    timeout: Duration,
) -> Result<()> {
    let failed = |reason: String| BridgeError::HandshakeWriteFailed { stage, reason };
    let text = envelope.encode().map_err(|e| failed(e.to_string()))?;
    match tokio::time::timeout(timeout, sink.send(text)).await {
        Ok(Ok(())) => {
            debug!(stage, "handshake envelope sent");
            Ok(())
        }
        Ok(Err(e)) => Err(failed(e.to_string())),
        Err(_) => Err(failed(format!("timed out after {}ms", timeout.as_millis()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use futures::StreamExt;
    use serde_json::Value;

    use crate::testutil::{broken_sink, capture_sink};

    #[tokio::test]
    async fn auth_precedes_hello() {
        let config = ClientConfig::new("ws://bridge.test", "s3cret")
            .unwrap()
            .with_project_id("web")
            .with_capabilities(["console"]);
        let (mut sink, written) = capture_sink();
        perform_handshake(&mut sink, &config).await.unwrap();
        drop(sink);

        let frames: Vec<Value> = written
            .map(|t| serde_json::from_str(&t).unwrap())
            .collect()
            .await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["type"], "auth");
        assert_eq!(frames[0]["secret"], "s3cret");
        assert_eq!(frames[0]["role"], "bridge");
        assert_eq!(frames[1]["type"], "hello");
        assert_eq!(frames[1]["capabilities"], serde_json::json!(["console"]));
        assert_eq!(frames[1]["projectId"], "web");
        assert_eq!(frames[1]["protocol"], 2);
    }

    #[tokio::test]
    async fn failed_auth_write_names_stage() {
        let config = ClientConfig::new("ws://bridge.test", "s").unwrap();
        let mut sink = broken_sink();
        let err = perform_handshake(&mut sink, &config).await.unwrap_err();
        assert_matches!(err, BridgeError::HandshakeWriteFailed { stage: "auth", .. });
    }
}
