// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index: one embedding per conversation, stored as f32 BLOBs and
//! ranked by an in-process cosine scan.

use std::sync::Arc;

use colloquy_core::ColloquyError;
use colloquy_core::types::{AbbreviationRecord, ConversationId};

use crate::store::IndexStore;

/// Convert an f32 vector to little-endian bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a BLOB back to an f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Cosine similarity via dot product.
///
/// Embedders are expected to emit L2-normalized vectors, for which the dot
/// product IS the cosine similarity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Nearest-neighbor lookup over the per-conversation abbreviation vectors.
///
/// Versioned by embedding-model id: vectors written under a different model
/// are never scanned.
pub struct VectorIndex {
    store: Arc<IndexStore>,
    model_id: String,
}

impl VectorIndex {
    pub fn new(store: Arc<IndexStore>, model_id: impl Into<String>) -> Self {
        Self {
            store,
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Atomically upsert an abbreviation record (text + vector together).
    pub async fn upsert(&self, record: &AbbreviationRecord) -> Result<(), ColloquyError> {
        self.store.store_abbreviation(record).await
    }

    /// Rank all current-model embeddings against the query vector.
    ///
    /// Returns `(conversation_id, similarity)` pairs above the threshold,
    /// sorted by similarity descending, capped at `limit`. Vectors whose
    /// dimensionality differs from the query are skipped.
    pub async fn similar(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<(ConversationId, f32)>, ColloquyError> {
        let embeddings = self.store.all_embeddings(&self.model_id).await?;

        let mut results: Vec<(ConversationId, f32)> = embeddings
            .into_iter()
            .filter_map(|(id, embedding)| {
                if embedding.len() != query.len() {
                    return None;
                }
                let similarity = cosine_similarity(query, &embedding);
                (similarity >= threshold).then_some((id, similarity))
            })
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }
}
