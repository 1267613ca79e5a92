// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic collaborator doubles shared by this crate's tests.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use colloquy_core::traits::{
    ConversationDigest, EmbeddingInput, EmbeddingOutput, SummaryInput,
};
use colloquy_core::types::{
    Conversation, ConversationId, ConversationState, MetaLine, TranscriptLine, TurnLine, TurnRole,
    now_rfc3339,
};
use colloquy_core::{ColloquyError, EmbedderAdapter, SummarizerAdapter};
use colloquy_index::IndexStore;
use colloquy_transcript::TranscriptLog;

/// Deterministic bag-of-words embedding.
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

/// Summarizer that derives a digest from the transcript text and counts
/// invocations.
#[derive(Default)]
pub struct CountingSummarizer {
    calls: AtomicUsize,
    fixed_abbreviation: Option<String>,
}

impl CountingSummarizer {
    pub fn with_abbreviation(abbreviation: String) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fixed_abbreviation: Some(abbreviation),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummarizerAdapter for CountingSummarizer {
    async fn summarize(&self, input: SummaryInput) -> Result<ConversationDigest, ColloquyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let abbreviation = self
            .fixed_abbreviation
            .clone()
            .unwrap_or_else(|| format!("Summary: {}", input.transcript_text));
        let title = input
            .transcript_text
            .lines()
            .next()
            .unwrap_or("untitled")
            .trim_start_matches("user: ")
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ");
        Ok(ConversationDigest {
            abbreviation,
            title,
            topics: vec!["general".into()],
        })
    }
}

/// Summarizer whose first call blocks until [`GatedSummarizer::release`],
/// for testing in-flight enqueue coalescing.
pub struct GatedSummarizer {
    calls: AtomicUsize,
    started: Notify,
    gate: Semaphore,
}

impl GatedSummarizer {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Wait until a summarize call has started.
    pub async fn wait_until_in_flight(&self) {
        self.started.notified().await;
    }

    /// Let every blocked (and future) call proceed.
    pub fn release(&self) {
        self.gate.add_permits(100);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for GatedSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SummarizerAdapter for GatedSummarizer {
    async fn summarize(&self, _input: SummaryInput) -> Result<ConversationDigest, ColloquyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ColloquyError::Internal(e.to_string()))?;
        Ok(ConversationDigest {
            abbreviation: "gated summary".into(),
            title: "Gated".into(),
            topics: vec![],
        })
    }
}

/// Summarizer that always fails.
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

/// Embedder that always fails.
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

/// Seed a conversation row plus a transcript with `turns` user/assistant
/// pairs.
pub async fn seed_conversation(
    log: &Arc<TranscriptLog>,
    store: &Arc<IndexStore>,
    name: &str,
    turns: u64,
) -> ConversationId {
    let id = ConversationId(name.to_string());
    store
        .create_conversation(&Conversation {
            id: id.clone(),
            channel: "cli".into(),
            title: None,
            topics: vec![],
            turn_count: turns,
            participants: vec!["user-1".into()],
            abbreviation: None,
            needs_abbreviation: false,
            manually_named: false,
            state: ConversationState::Active,
            last_renamed_turn: 0,
            created_at: now_rfc3339(),
            updated_at: now_rfc3339(),
        })
        .await
        .unwrap();

    log.append(
        &id,
        &TranscriptLine::Meta(MetaLine {
            conversation_id: id.clone(),
            channel: "cli".into(),
            created_at: now_rfc3339(),
            participants: vec!["user-1".into()],
        }),
    )
    .await
    .unwrap();

    for n in 1..=turns {
        for (role, text) in [
            (TurnRole::User, format!("question {n} about the deploy")),
            (TurnRole::Assistant, format!("answer {n}, looks fine")),
        ] {
            log.append(
                &id,
                &TranscriptLine::Turn(TurnLine {
                    role,
                    content: text,
                    turn: n,
                    at: now_rfc3339(),
                    channel: None,
                    sender: None,
                    usage: None,
                }),
            )
            .await
            .unwrap();
        }
    }
    id
}
