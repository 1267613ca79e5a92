// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy: `./colloquy.toml` >
//! `~/.config/colloquy/colloquy.toml` > `/etc/colloquy/colloquy.toml`
//! with environment variable overrides via the `COLLOQUY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ColloquyConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/colloquy/colloquy.toml` (system-wide)
/// 3. `~/.config/colloquy/colloquy.toml` (user XDG config)
/// 4. `./colloquy.toml` (local directory)
/// 5. `COLLOQUY_*` environment variables
pub fn load_config() -> Result<ColloquyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ColloquyConfig::default()))
        .merge(Toml::file("/etc/colloquy/colloquy.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("colloquy/colloquy.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("colloquy.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ColloquyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ColloquyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ColloquyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ColloquyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider.
///
/// Uses `Env::map()` rather than `Env::split("_")` so underscore-containing
/// key names stay intact: `COLLOQUY_LIFECYCLE_IDLE_TIMEOUT_SECS` must map to
/// `lifecycle.idle_timeout_secs`, not `lifecycle.idle.timeout.secs`.
fn env_provider() -> Env {
    Env::prefixed("COLLOQUY_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("storage_", "storage.", 1)
            .replacen("lifecycle_", "lifecycle.", 1)
            .replacen("retrieval_", "retrieval.", 1)
            .replacen("abbreviation_", "abbreviation.", 1)
            .replacen("context_", "context.", 1);
        mapped.into()
    })
}
