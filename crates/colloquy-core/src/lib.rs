// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Colloquy conversation persistence & retrieval core.
//!
//! This crate provides the error type, the domain types (conversation rows,
//! transcript lines, abbreviation records, search results, events), and the
//! traits for the two external collaborators (summarizer and embedder) used
//! throughout the Colloquy workspace.

pub mod error;
pub mod traits;
pub mod types;

pub use error::ColloquyError;
pub use traits::{
    ConversationDigest, EmbedderAdapter, EmbeddingInput, EmbeddingOutput, SummarizerAdapter,
    SummaryInput,
};
pub use types::{
    AbbreviationRecord, Conversation, ConversationEvent, ConversationId, ConversationState,
    SearchFilters, SearchHit, TranscriptLine, TurnLine, TurnRole, TurnUsage,
};
