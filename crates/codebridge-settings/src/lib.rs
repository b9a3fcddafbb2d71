//! # codebridge-settings
//!
//! Layered settings for the code bridge client.
//!
//! Settings are resolved from four layers (in priority order):
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **Host metadata**: `.code/code-bridge.json` published by a running bridge host
//! 3. **User file**: `~/.code/bridge-settings.json` (deep-merged)
//! 4. **Environment variables**: `CODE_BRIDGE_*` overrides (highest priority)
//!
//! The result converts into a [`codebridge_core::ClientConfig`] through
//! [`BridgeSettings::into_client_config`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_env_overrides_with, deep_merge, host_meta_path, load_settings,
    load_settings_from, read_host_meta, settings_path,
};
pub use types::{BridgeSettings, DEFAULT_SECRET, DEFAULT_URL, HostMeta, TimingSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = BridgeSettings::default();
        let path = settings_path();
        assert!(path.ends_with("bridge-settings.json"));
    }

    #[test]
    fn default_settings_build_a_client_config() {
        let cfg = BridgeSettings::default().into_client_config().unwrap();
        assert_eq!(cfg.url(), DEFAULT_URL);
        assert_eq!(cfg.secret(), DEFAULT_SECRET);
    }
}
