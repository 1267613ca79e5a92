// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Colloquy conversation core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Colloquy configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ColloquyConfig {
    /// Transcript and index storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Lifecycle state machine and timer settings.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Search fusion and ranking settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Abbreviation pipeline settings.
    #[serde(default)]
    pub abbreviation: AbbreviationConfig,

    /// Working-context hydration settings.
    #[serde(default)]
    pub context: ContextConfig,
}

/// Transcript and index storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding one append-only transcript file per conversation.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Path to the SQLite index database (keyword + vector tables).
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("colloquy").join("transcripts"))
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "./colloquy/transcripts".to_string())
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("colloquy").join("index.db"))
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "./colloquy/index.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Lifecycle state machine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Seconds of inactivity before a conversation transitions to Idle.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Interval of the idle-check ticker, in seconds.
    #[serde(default = "default_idle_tick_secs")]
    pub idle_tick_secs: u64,

    /// Interval of the abbreviation retry sweep, in seconds.
    #[serde(default = "default_retry_sweep_secs")]
    pub retry_sweep_secs: u64,

    /// Turn count at which an untitled conversation is first auto-named.
    #[serde(default = "default_rename_at_turn")]
    pub rename_at_turn: u64,

    /// Minimum turns since the last rename before auto-naming runs again.
    #[serde(default = "default_rename_interval_turns")]
    pub rename_interval_turns: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            idle_tick_secs: default_idle_tick_secs(),
            retry_sweep_secs: default_retry_sweep_secs(),
            rename_at_turn: default_rename_at_turn(),
            rename_interval_turns: default_rename_interval_turns(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_idle_tick_secs() -> u64 {
    30
}

fn default_retry_sweep_secs() -> u64 {
    300
}

fn default_rename_at_turn() -> u64 {
    5
}

fn default_rename_interval_turns() -> u64 {
    10
}

/// Search fusion and ranking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// RRF constant `k` in `score = sum(1 / (k + rank))`.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// Maximum candidates taken from each search method before fusion.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Maximum fused results returned to the caller.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Minimum cosine similarity for a vector candidate (0.0 disables).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Maximum snippet length in characters.
    #[serde(default = "default_snippet_len")]
    pub snippet_len: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            max_candidates: default_max_candidates(),
            max_results: default_max_results(),
            similarity_threshold: default_similarity_threshold(),
            snippet_len: default_snippet_len(),
        }
    }
}

fn default_rrf_k() -> u32 {
    60
}

fn default_max_candidates() -> usize {
    20
}

fn default_max_results() -> usize {
    10
}

fn default_similarity_threshold() -> f64 {
    0.0
}

fn default_snippet_len() -> usize {
    160
}

/// Abbreviation pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AbbreviationConfig {
    /// Upper bound on abbreviation length, in characters.
    #[serde(default = "default_abbreviation_max_len")]
    pub max_len: usize,

    /// Identifier of the embedding model the vector index is built with.
    /// Changing it triggers a full re-embed on recovery.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for AbbreviationConfig {
    fn default() -> Self {
        Self {
            max_len: default_abbreviation_max_len(),
            embedding_model: default_embedding_model(),
        }
    }
}

fn default_abbreviation_max_len() -> usize {
    1024
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

/// Working-context hydration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Maximum number of turns included in a hydrated working context.
    #[serde(default = "default_max_turns")]
    pub max_turns: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

fn default_max_turns() -> u64 {
    50
}
