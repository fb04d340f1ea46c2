// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./inrelay.toml` > `~/.config/inrelay/inrelay.toml`
//! > `/etc/inrelay/inrelay.toml` with environment variable overrides via the
//! `INRELAY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RelayConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/inrelay/inrelay.toml` (system-wide)
/// 3. `~/.config/inrelay/inrelay.toml` (user XDG config)
/// 4. `./inrelay.toml` (local directory)
/// 5. `INRELAY_*` environment variables
pub fn load_config() -> Result<RelayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(Toml::file("/etc/inrelay/inrelay.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("inrelay/inrelay.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("inrelay.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<RelayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RelayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// CRITICAL: Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. `INRELAY_MESSENGER_DB_PATH` must map to
/// `messenger.db_path`, not `messenger.db.path`.
fn env_provider() -> Env {
    Env::prefixed("INRELAY_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: INRELAY_MESSENGER_DB_PATH -> "messenger_db_path"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("bridge_", "bridge.", 1)
            .replacen("messenger_", "messenger.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("provision_", "provision.", 1)
            .replacen("routing_", "routing.", 1)
            .replacen("delivery_", "delivery.", 1)
            .replacen("smtp_", "smtp.", 1);
        mapped.into()
    })
}
