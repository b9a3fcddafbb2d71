//! Settings loading with host discovery, deep merge and environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BridgeSettings::default()`]
//! 2. If the workspace has a healthy `.code/code-bridge.json`, take its url and secret
//! 3. If a user settings file exists, deep-merge it over the result
//! 4. Apply `CODE_BRIDGE_*` environment overrides (highest priority)

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{BridgeSettings, HostMeta};

/// Host metadata file, relative to the workspace root.
pub const HOST_META_FILE: &str = ".code/code-bridge.json";

/// Resolve the user settings file (`~/.code/bridge-settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".code").join("bridge-settings.json")
}

/// Host metadata path inside `workspace`.
pub fn host_meta_path(workspace: &Path) -> PathBuf {
    workspace.join(HOST_META_FILE)
}

/// Load settings for the current directory and the default user file.
pub fn load_settings() -> Result<BridgeSettings> {
    let workspace = std::env::current_dir()?;
    load_settings_from(&workspace, Some(&settings_path()))
}

/// Load settings for `workspace`, with an optional user file, then apply env overrides.
///
/// A missing user file is not an error; a user file with invalid JSON is.
pub fn load_settings_from(workspace: &Path, user_file: Option<&Path>) -> Result<BridgeSettings> {
    let mut settings = resolve_files(workspace, user_file, Utc::now())?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// File layers only, evaluated at `now`.
pub(crate) fn resolve_files(
    workspace: &Path,
    user_file: Option<&Path>,
    now: DateTime<Utc>,
) -> Result<BridgeSettings> {
    let mut base = BridgeSettings::default();
    if let Some(meta) = read_host_meta(&host_meta_path(workspace), now) {
        debug!(url = %meta.url, "using bridge host metadata");
        base.url = meta.url;
        base.secret = meta.secret;
    }
    let base = serde_json::to_value(base)?;

    let merged = match user_file {
        Some(path) if path.exists() => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(base, user)
        }
        Some(path) => {
            debug!(?path, "settings file not found, using defaults");
            base
        }
        None => base,
    };

    Ok(serde_json::from_value(merged)?)
}

/// Read the host metadata file, returning it only if healthy at `now`.
///
/// Every failure (missing file, bad JSON, stale heartbeat) yields `None`.
pub fn read_host_meta(path: &Path, now: DateTime<Utc>) -> Option<HostMeta> {
    let raw = std::fs::read_to_string(path).ok()?;
    let meta: HostMeta = match serde_json::from_str(&raw) {
        Ok(meta) => meta,
        Err(error) => {
            debug!(?path, %error, "ignoring unreadable host metadata");
            return None;
        }
    };
    if meta.is_healthy(now) {
        Some(meta)
    } else {
        debug!(?path, "ignoring stale host metadata");
        None
    }
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, arrays and primitives are replaced, and nulls in
/// `source` leave `target` untouched.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CODE_BRIDGE_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut BridgeSettings) {
    apply_env_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty values are skipped. Numeric values must parse and fall within range;
/// anything else is ignored with a warning.
pub fn apply_env_overrides_with<F>(settings: &mut BridgeSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let read_ms = |name: &str, min: u64, max: u64| {
        let val = read(name)?;
        let parsed = parse_u64_range(val.trim(), min, max);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid millisecond env var, ignoring");
        }
        parsed
    };

    if let Some(v) = read("CODE_BRIDGE_URL") {
        settings.url = v;
    }
    if let Some(v) = read("CODE_BRIDGE_SECRET") {
        settings.secret = v;
    }
    if let Some(v) = read("CODE_BRIDGE_PROJECT_ID") {
        settings.project_id = Some(v);
    }
    if let Some(v) = read("CODE_BRIDGE_CAPABILITIES") {
        let caps = parse_list(&v);
        if !caps.is_empty() {
            settings.capabilities = caps;
        }
    }
    if let Some(v) = read_ms("CODE_BRIDGE_HEARTBEAT_INTERVAL_MS", 100, 600_000) {
        settings.timings.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_ms("CODE_BRIDGE_HEARTBEAT_TIMEOUT_MS", 100, 3_600_000) {
        settings.timings.heartbeat_timeout_ms = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, trimming entries and dropping empties.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
