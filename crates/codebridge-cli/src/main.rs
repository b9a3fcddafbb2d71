//! # codebridge
//!
//! Streams stdin lines to a code bridge as console events. Pipe a dev server
//! through it to mirror its output to the bridge:
//!
//! ```text
//! npm run dev 2>&1 | codebridge --level info --tee
//! ```

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use codebridge_client::BridgeClient;
use codebridge_core::{BridgeError, LogFormat, LogLevel, init_subscriber};
use codebridge_settings::{BridgeSettings, load_settings_from, settings_path};

/// Code bridge client.
#[derive(Parser, Debug)]
#[command(name = "codebridge", version, about = "Stream stdin lines to a code bridge")]
struct Cli {
    /// Bridge WebSocket address (overrides settings and `CODE_BRIDGE_URL`).
    #[arg(long)]
    url: Option<String>,

    /// Shared secret (overrides settings and `CODE_BRIDGE_SECRET`).
    #[arg(long)]
    secret: Option<String>,

    /// Project identifier sent in the hello envelope.
    #[arg(long)]
    project_id: Option<String>,

    /// Capabilities to advertise; repeat or comma-separate.
    #[arg(long = "capability", value_delimiter = ',')]
    capabilities: Vec<String>,

    /// Level attached to forwarded lines. `error` sends error events.
    #[arg(long, default_value = "log")]
    level: LogLevel,

    /// Also echo every line to stdout.
    #[arg(long)]
    tee: bool,

    /// User settings file.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Workspace holding `.code/code-bridge.json` (defaults to the current directory).
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Diagnostics filter for stderr; `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Diagnostics format: `compact` or `json`.
    #[arg(long, default_value = "compact")]
    log_format: LogFormat,
}

impl Cli {
    /// Files and env first, then flags on top.
    fn resolve_settings(&self) -> Result<BridgeSettings> {
        let workspace = match &self.workspace {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to resolve current directory")?,
        };
        let user_file = self.settings.clone().unwrap_or_else(settings_path);
        let mut settings = load_settings_from(&workspace, Some(&user_file))
            .with_context(|| format!("Failed to load settings from {}", user_file.display()))?;
        self.apply_flags(&mut settings);
        Ok(settings)
    }

    fn apply_flags(&self, settings: &mut BridgeSettings) {
        if let Some(url) = &self.url {
            settings.url.clone_from(url);
        }
        if let Some(secret) = &self.secret {
            settings.secret.clone_from(secret);
        }
        if let Some(project_id) = &self.project_id {
            settings.project_id = Some(project_id.clone());
        }
        if !self.capabilities.is_empty() {
            settings.capabilities.clone_from(&self.capabilities);
        }
    }
}

/// Send one stdin line; lines arriving while disconnected are dropped.
fn forward_line(client: &BridgeClient, level: LogLevel, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    let sent = if level == LogLevel::Error {
        client.send_error(line, None)
    } else {
        client.send_console(level, line)
    };
    match sent {
        Ok(()) => {}
        Err(BridgeError::NotConnected) => debug!("not connected, line dropped"),
        Err(error) => debug!(%error, "line dropped"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_subscriber(&cli.log_level, cli.log_format);

    let config = cli
        .resolve_settings()?
        .into_client_config()
        .context("Invalid bridge settings")?;
    let client = BridgeClient::new(config);
    info!(url = %client.config().url(), level = %cli.level, "forwarding stdin to bridge");

    let cancel = CancellationToken::new();
    let mut supervisor = tokio::spawn({
        let client = client.clone();
        let cancel = cancel.clone();
        async move { client.run(cancel).await }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => {
                    if cli.tee {
                        println!("{line}");
                    }
                    forward_line(&client, cli.level, &line);
                }
                None => {
                    info!("stdin closed, shutting down");
                    break;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for ctrl-c")?;
                info!("interrupted, shutting down");
                break;
            }
            joined = &mut supervisor => {
                joined.context("Bridge client task panicked")?.context("Bridge client stopped")?;
                return Ok(());
            }
        }
    }

    cancel.cancel();
    supervisor
        .await
        .context("Bridge client task panicked")?
        .context("Bridge client stopped")?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;
    use codebridge_core::ClientConfig;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["codebridge"]);
        assert!(cli.url.is_none());
        assert!(cli.capabilities.is_empty());
        assert_eq!(cli.level, LogLevel::Log);
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_format, LogFormat::Compact);
        assert!(!cli.tee);
    }

    #[test]
    fn cli_level_and_format() {
        let cli = Cli::parse_from(["codebridge", "--level", "warn", "--log-format", "json"]);
        assert_eq!(cli.level, LogLevel::Warn);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn cli_rejects_unknown_level() {
        assert!(Cli::try_parse_from(["codebridge", "--level", "loud"]).is_err());
    }

    #[test]
    fn cli_capabilities_accept_commas_and_repeats() {
        let cli = Cli::parse_from([
            "codebridge",
            "--capability",
            "console,error",
            "--capability",
            "pageview",
        ]);
        assert_eq!(cli.capabilities, ["console", "error", "pageview"]);
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "codebridge",
            "--url",
            "ws://127.0.0.1:7000",
            "--secret",
            "flag-secret",
            "--project-id",
            "cli",
            "--capability",
            "console",
        ]);
        let mut settings = BridgeSettings::default();
        cli.apply_flags(&mut settings);
        assert_eq!(settings.url, "ws://127.0.0.1:7000");
        assert_eq!(settings.secret, "flag-secret");
        assert_eq!(settings.project_id.as_deref(), Some("cli"));
        assert_eq!(settings.capabilities, ["console"]);
    }

    #[test]
    fn absent_flags_keep_settings() {
        let cli = Cli::parse_from(["codebridge"]);
        let mut settings = BridgeSettings::default();
        cli.apply_flags(&mut settings);
        assert_eq!(settings, BridgeSettings::default());
    }

    #[test]
    fn resolve_settings_reads_user_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.json");
        std::fs::write(&file, r#"{"projectId": "from-file"}"#).unwrap();
        let cli = Cli::parse_from([
            OsString::from("codebridge"),
            "--settings".into(),
            file.into_os_string(),
            "--workspace".into(),
            dir.path().as_os_str().to_owned(),
            "--url".into(),
            "ws://127.0.0.1:7001".into(),
        ]);
        let settings = cli.resolve_settings().unwrap();
        assert_eq!(settings.url, "ws://127.0.0.1:7001");
        assert!(settings.project_id.is_some());
    }

    #[tokio::test]
    async fn lines_are_dropped_while_disconnected() {
        let client = BridgeClient::new(ClientConfig::new("ws://127.0.0.1:1", "s").unwrap());
        forward_line(&client, LogLevel::Info, "hello");
        forward_line(&client, LogLevel::Error, "boom");
        forward_line(&client, LogLevel::Info, "   ");
        assert!(!client.is_connected());
    }
}
