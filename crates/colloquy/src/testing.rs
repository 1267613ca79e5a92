// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic collaborator doubles for tests and local development.
//!
//! The real summarizer and embedder are remote models; these stand-ins are
//! pure functions of their input, which makes rebuild-equality assertions
//! possible (the same transcript always produces the same abbreviation and
//! the same vector).

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use colloquy_core::traits::{
    ConversationDigest, EmbeddingInput, EmbeddingOutput, SummaryInput,
};
use colloquy_core::{ColloquyError, EmbedderAdapter, SummarizerAdapter};

/// Deterministic bag-of-words embedding, L2-normalized.
pub fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0f32; dims];
    for token in text.to_lowercase().split_whitespace() {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.hash(&mut hasher);
        v[(hasher.finish() as usize) % dims] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Summarizer that derives the digest from the transcript text itself and
/// counts invocations.
#[derive(Default)]
pub struct StubSummarizer {
    calls: AtomicUsize,
}

impl StubSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of summarize calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummarizerAdapter for StubSummarizer {
    async fn summarize(&self, input: SummaryInput) -> Result<ConversationDigest, ColloquyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let title = input
            .transcript_text
            .lines()
            .next()
            .unwrap_or("untitled")
            .trim_start_matches("user: ")
            .trim_start_matches("assistant: ")
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ");
        let flattened = input.transcript_text.replace('\n', " ");
        let abbreviation: String = flattened.chars().take(input.max_len).collect();
        Ok(ConversationDigest {
            abbreviation,
            title,
            topics: vec!["general".into()],
        })
    }
}

/// Summarizer that always fails, for retry-path tests.
pub struct FailingSummarizer;

#[async_trait]
impl SummarizerAdapter for FailingSummarizer {
    async fn summarize(&self, _input: SummaryInput) -> Result<ConversationDigest, ColloquyError> {
        Err(ColloquyError::Summarizer {
            message: "model overloaded".into(),
            source: None,
        })
    }
}

/// Deterministic embedder over [`hash_embed`].
pub struct HashEmbedder;

#[async_trait]
impl EmbedderAdapter for HashEmbedder {
    fn model_id(&self) -> &str {
        "hash-v1"
    }

    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ColloquyError> {
        let embeddings: Vec<Vec<f32>> = input.texts.iter().map(|t| hash_embed(t, 64)).collect();
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: 64,
        })
    }
}

/// Embedder that always fails, for degradation tests.
pub struct FailingEmbedder;

#[async_trait]
impl EmbedderAdapter for FailingEmbedder {
    fn model_id(&self) -> &str {
        "hash-v1"
    }

    async fn embed(&self, _input: EmbeddingInput) -> Result<EmbeddingOutput, ColloquyError> {
        Err(ColloquyError::Embedder {
            message: "embedder offline".into(),
            source: None,
        })
    }
}
