// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths and value ranges.

use thiserror::Error;

use crate::model::ColloquyConfig;

/// A configuration error surfaced at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration parsed but a value violates a semantic constraint.
    #[error("{message}")]
    Validation { message: String },

    /// The configuration failed to parse.
    #[error("failed to parse configuration: {message}")]
    Parse { message: String },
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ColloquyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.data_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.data_dir must not be empty".to_string(),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.lifecycle.idle_tick_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "lifecycle.idle_tick_secs must be at least 1".to_string(),
        });
    }

    if config.lifecycle.retry_sweep_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "lifecycle.retry_sweep_secs must be at least 1".to_string(),
        });
    }

    if config.retrieval.rrf_k == 0 {
        errors.push(ConfigError::Validation {
            message: "retrieval.rrf_k must be at least 1".to_string(),
        });
    }

    if config.retrieval.max_results == 0 {
        errors.push(ConfigError::Validation {
            message: "retrieval.max_results must be at least 1".to_string(),
        });
    }

    if config.retrieval.max_candidates < config.retrieval.max_results {
        errors.push(ConfigError::Validation {
            message: format!(
                "retrieval.max_candidates ({}) must be >= retrieval.max_results ({})",
                config.retrieval.max_candidates, config.retrieval.max_results
            ),
        });
    }

    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        errors.push(ConfigError::Validation {
            message: format!(
                "retrieval.similarity_threshold must be between 0.0 and 1.0, got {}",
                config.retrieval.similarity_threshold
            ),
        });
    }

    if config.abbreviation.max_len < 64 {
        errors.push(ConfigError::Validation {
            message: format!(
                "abbreviation.max_len must be at least 64, got {}",
                config.abbreviation.max_len
            ),
        });
    }

    if config.abbreviation.embedding_model.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "abbreviation.embedding_model must not be empty".to_string(),
        });
    }

    if config.context.max_turns == 0 {
        errors.push(ConfigError::Validation {
            message: "context.max_turns must be at least 1".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
