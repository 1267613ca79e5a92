// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Summarizer collaborator trait.

use async_trait::async_trait;

use crate::error::ColloquyError;

/// Input for a summarization call: the rendered transcript text.
#[derive(Debug, Clone)]
pub struct SummaryInput {
    /// Full transcript rendered as `role: content` lines.
    pub transcript_text: String,
    /// Upper bound on abbreviation length, in characters.
    pub max_len: usize,
}

/// Everything one summarizer call produces.
///
/// Title and topics come from the same call that produces the abbreviation,
/// so the pipeline never pays for a second model invocation to auto-name a
/// conversation.
#[derive(Debug, Clone)]
pub struct ConversationDigest {
    /// Short summary used for semantic indexing and display.
    pub abbreviation: String,
    /// Suggested conversation title.
    pub title: String,
    /// Topic tags.
    pub topics: Vec<String>,
}

/// Adapter for the external language-model summarizer.
///
/// Failures are caught by the abbreviation pipeline and flagged for retry;
/// they never block or roll back a user-facing operation.
#[async_trait]
pub trait SummarizerAdapter: Send + Sync {
    async fn summarize(&self, input: SummaryInput) -> Result<ConversationDigest, ColloquyError>;
}
