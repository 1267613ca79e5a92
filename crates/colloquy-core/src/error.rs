// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Colloquy conversation core.

use thiserror::Error;

/// The primary error type used across all Colloquy crates.
///
/// Most failure modes inside the core have a defined degraded behavior
/// (skip, retry, flag, fall back) and never reach a caller as an error.
/// The variants here cover the paths that do propagate: configuration
/// problems, transcript write failures after the internal retry, and
/// index store failures.
#[derive(Debug, Error)]
pub enum ColloquyError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transcript log errors (append failed after retry, unreadable log file).
    #[error("transcript error: {source}")]
    Transcript {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Index store errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Summarizer collaborator errors (API failure, empty output).
    #[error("summarizer error: {message}")]
    Summarizer {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Embedder collaborator errors (API failure, dimension mismatch).
    #[error("embedder error: {message}")]
    Embedder {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Requested conversation does not exist.
    #[error("conversation not found: {0}")]
    NotFound(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ColloquyError {
    /// Wrap an I/O error as a transcript error.
    pub fn transcript(source: std::io::Error) -> Self {
        ColloquyError::Transcript {
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct_and_display() {
        let config = ColloquyError::Config("bad value".into());
        assert_eq!(config.to_string(), "configuration error: bad value");

        let transcript = ColloquyError::transcript(std::io::Error::other("disk full"));
        assert!(transcript.to_string().contains("disk full"));

        let storage = ColloquyError::Storage {
            source: Box::new(std::io::Error::other("locked")),
        };
        assert!(storage.to_string().starts_with("storage error"));

        let summarizer = ColloquyError::Summarizer {
            message: "model overloaded".into(),
            source: None,
        };
        assert_eq!(
            summarizer.to_string(),
            "summarizer error: model overloaded"
        );

        let not_found = ColloquyError::NotFound("conv-1".into());
        assert_eq!(not_found.to_string(), "conversation not found: conv-1");
    }
}
