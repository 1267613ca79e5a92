// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Traits for the external collaborators this core consumes.
//!
//! The summarizer and embedder are pure request/response functions from the
//! core's perspective; both use `#[async_trait]` for dynamic dispatch.

pub mod embedder;
pub mod summarizer;

pub use embedder::{EmbedderAdapter, EmbeddingInput, EmbeddingOutput};
pub use summarizer::{ConversationDigest, SummarizerAdapter, SummaryInput};
