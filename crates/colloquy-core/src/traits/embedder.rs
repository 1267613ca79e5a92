// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedder collaborator trait.

use async_trait::async_trait;

use crate::error::ColloquyError;

/// Input for an embedding call.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output of an embedding call.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// One vector per input text, in order.
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

/// Adapter for the external embedding model.
///
/// The `model_id` versions the vector index: vectors produced by different
/// models are never compared against each other, and a changed id triggers a
/// full re-embed on recovery.
#[async_trait]
pub trait EmbedderAdapter: Send + Sync {
    /// Stable identifier of the embedding model (name + revision).
    fn model_id(&self) -> &str;

    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ColloquyError>;
}
