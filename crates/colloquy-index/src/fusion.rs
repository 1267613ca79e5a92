// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search fusion: merges vector and keyword retrieval via Reciprocal Rank
//! Fusion.
//!
//! Two independent retrievals run per query -- cosine similarity over the
//! per-conversation abbreviation vectors, and BM25 over the per-turn FTS5
//! index -- and their ranked lists are merged with RRF (k = 60 by default).
//! No score blending is applied on top; ties break by most-recent update.
//! If the vector side is empty or the embedder is down, fusion degrades to
//! keyword-only ranking instead of erroring.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use colloquy_config::model::RetrievalConfig;
use colloquy_core::traits::EmbeddingInput;
use colloquy_core::types::{ConversationId, SearchFilters, SearchHit};
use colloquy_core::{ColloquyError, EmbedderAdapter};

use crate::store::IndexStore;
use crate::vector::VectorIndex;

/// Merges keyword and vector retrieval into one ranked conversation list.
pub struct SearchFusion {
    store: Arc<IndexStore>,
    vector: VectorIndex,
    embedder: Arc<dyn EmbedderAdapter>,
    config: RetrievalConfig,
}

impl SearchFusion {
    pub fn new(
        store: Arc<IndexStore>,
        embedder: Arc<dyn EmbedderAdapter>,
        config: RetrievalConfig,
    ) -> Self {
        let vector = VectorIndex::new(store.clone(), embedder.model_id().to_string());
        Self {
            store,
            vector,
            embedder,
            config,
        }
    }

    /// Run a hybrid search and return ranked conversation hits.
    ///
    /// Never errors on a degraded vector side: an embedder failure is
    /// logged and the keyword ranking stands alone.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>, ColloquyError> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        let keyword_hits = self
            .store
            .keyword_search(query, self.config.max_candidates)
            .await?;

        let vector_hits = match self
            .embedder
            .embed(EmbeddingInput {
                texts: vec![query.to_string()],
            })
            .await
        {
            Ok(output) => match output.embeddings.into_iter().next() {
                Some(query_embedding) => {
                    self.vector
                        .similar(
                            &query_embedding,
                            self.config.similarity_threshold as f32,
                            self.config.max_candidates,
                        )
                        .await?
                }
                None => Vec::new(),
            },
            Err(error) => {
                warn!(%error, "query embedding failed, degrading to keyword-only search");
                Vec::new()
            }
        };

        let keyword_ranked: Vec<(ConversationId, f64)> = keyword_hits
            .iter()
            .map(|h| (h.conversation_id.clone(), h.score))
            .collect();
        let fused = reciprocal_rank_fusion(&vector_hits, &keyword_ranked, self.config.rrf_k as f32);
        if fused.is_empty() {
            return Ok(vec![]);
        }

        let score_map: HashMap<&str, f32> = fused
            .iter()
            .map(|(id, score)| (id.as_str(), *score))
            .collect();
        let snippet_map: HashMap<&str, &str> = keyword_hits
            .iter()
            .map(|h| (h.conversation_id.as_str(), h.snippet.as_str()))
            .collect();

        let ids: Vec<ConversationId> = fused.iter().map(|(id, _)| id.clone()).collect();
        let mut conversations = self.store.get_conversations_by_ids(&ids).await?;

        if let Some(channel) = &filters.channel {
            conversations.retain(|c| &c.channel == channel);
        }

        // RRF score first; most-recent update breaks ties.
        conversations.sort_by(|a, b| {
            let sa = score_map.get(a.id.as_str()).copied().unwrap_or(0.0);
            let sb = score_map.get(b.id.as_str()).copied().unwrap_or(0.0);
            sb.partial_cmp(&sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });

        let limit = filters.limit.unwrap_or(self.config.max_results);
        let hits = conversations
            .into_iter()
            .take(limit)
            .map(|c| {
                let snippet = snippet_map
                    .get(c.id.as_str())
                    .map(|s| s.to_string())
                    .or_else(|| c.abbreviation.clone())
                    .unwrap_or_default();
                SearchHit {
                    score: score_map.get(c.id.as_str()).copied().unwrap_or(0.0),
                    snippet: truncate_chars(&snippet, self.config.snippet_len),
                    conversation_id: c.id,
                    title: c.title,
                    channel: c.channel,
                    updated_at: c.updated_at,
                }
            })
            .collect::<Vec<_>>();

        debug!(query, results = hits.len(), "search fusion complete");
        Ok(hits)
    }
}

/// Reciprocal Rank Fusion: merge two ranked lists into a single ranking.
///
/// RRF score for conversation c = sum(1 / (k + rank)) over the lists in
/// which c appears, ranks starting at 1. Both inputs are already sorted by
/// relevance (vector by similarity descending, keyword by BM25 ascending --
/// FTS5 scores are negative, more negative is more relevant).
pub fn reciprocal_rank_fusion(
    vector_results: &[(ConversationId, f32)],
    keyword_results: &[(ConversationId, f64)],
    k: f32,
) -> Vec<(ConversationId, f32)> {
    let mut scores: HashMap<ConversationId, f32> = HashMap::new();

    for (rank, (id, _)) in vector_results.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (k + rank as f32 + 1.0);
    }
    for (rank, (id, _)) in keyword_results.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (k + rank as f32 + 1.0);
    }

    let mut fused: Vec<(ConversationId, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ConversationId {
        ConversationId(s.to_string())
    }

    #[test]
    fn rrf_overlapping_lists_rank_shared_entry_first() {
        let vector = vec![(id("d1"), 0.9f32), (id("d2"), 0.8)];
        let keyword = vec![(id("d1"), -5.0f64), (id("d3"), -3.0)];

        let fused = reciprocal_rank_fusion(&vector, &keyword, 60.0);

        assert_eq!(fused[0].0, id("d1"));
        let expected_d1 = 2.0 / 61.0;
        assert!(
            (fused[0].1 - expected_d1).abs() < 0.001,
            "d1 score should be ~{expected_d1}, got {}",
            fused[0].1
        );

        let d2 = fused.iter().find(|(i, _)| *i == id("d2")).unwrap().1;
        let d3 = fused.iter().find(|(i, _)| *i == id("d3")).unwrap().1;
        assert!((d2 - d3).abs() < 0.001, "single-list entries at equal rank tie");
    }

    #[test]
    fn rrf_disjoint_lists_tie() {
        let vector = vec![(id("a"), 0.9f32)];
        let keyword = vec![(id("b"), -5.0f64)];

        let fused = reciprocal_rank_fusion(&vector, &keyword, 60.0);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].1 - fused[1].1).abs() < 0.001);
    }

    #[test]
    fn rrf_empty_lists() {
        let fused = reciprocal_rank_fusion(&[], &[], 60.0);
        assert!(fused.is_empty());
    }

    #[test]
    fn rrf_keyword_only_preserves_order() {
        let keyword = vec![(id("x"), -9.0f64), (id("y"), -4.0)];
        let fused = reciprocal_rank_fusion(&[], &keyword, 60.0);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].0, id("x"));
    }

    #[test]
    fn truncate_chars_is_boundary_safe() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    mod end_to_end {
        use super::super::*;
        use async_trait::async_trait;
        use colloquy_config::model::{RetrievalConfig, StorageConfig};
        use colloquy_core::traits::{EmbeddingInput, EmbeddingOutput};
        use colloquy_core::types::{AbbreviationRecord, Conversation, ConversationState, TurnLine, TurnRole, now_rfc3339};
        use std::hash::{Hash, Hasher};
        use tempfile::tempdir;

        /// Deterministic bag-of-words embedding for tests.
        fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
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

        struct HashEmbedder;

        #[async_trait]
        impl EmbedderAdapter for HashEmbedder {
            fn model_id(&self) -> &str {
                "hash-v1"
            }

            async fn embed(
                &self,
                input: EmbeddingInput,
            ) -> Result<EmbeddingOutput, ColloquyError> {
                let embeddings: Vec<Vec<f32>> =
                    input.texts.iter().map(|t| hash_embed(t, 64)).collect();
                Ok(EmbeddingOutput {
                    embeddings,
                    dimensions: 64,
                })
            }
        }

        struct FailingEmbedder;

        #[async_trait]
        impl EmbedderAdapter for FailingEmbedder {
            fn model_id(&self) -> &str {
                "hash-v1"
            }

            async fn embed(
                &self,
                _input: EmbeddingInput,
            ) -> Result<EmbeddingOutput, ColloquyError> {
                Err(ColloquyError::Embedder {
                    message: "embedder offline".into(),
                    source: None,
                })
            }
        }

        fn conversation(id: &str, channel: &str) -> Conversation {
            Conversation {
                id: ConversationId(id.into()),
                channel: channel.into(),
                title: None,
                topics: vec![],
                turn_count: 0,
                participants: vec![],
                abbreviation: None,
                needs_abbreviation: false,
                manually_named: false,
                state: ConversationState::Active,
                last_renamed_turn: 0,
                created_at: now_rfc3339(),
                updated_at: now_rfc3339(),
            }
        }

        fn turn(role: TurnRole, content: &str, n: u64) -> TurnLine {
            TurnLine {
                role,
                content: content.into(),
                turn: n,
                at: now_rfc3339(),
                channel: None,
                sender: None,
                usage: None,
            }
        }

        async fn seeded_store(dir: &std::path::Path) -> Arc<IndexStore> {
            let config = StorageConfig {
                data_dir: "/tmp/unused".into(),
                database_path: dir.join("fusion.db").to_string_lossy().into_owned(),
                wal_mode: true,
            };
            let store = Arc::new(IndexStore::open(&config).await.unwrap());

            // Conversation A: greetings. Conversation B: server talk.
            let a = ConversationId("conv-a".to_string());
            let b = ConversationId("conv-b".to_string());
            store.create_conversation(&conversation("conv-a", "cli")).await.unwrap();
            store.create_conversation(&conversation("conv-b", "cli")).await.unwrap();
            store.insert_turn(&a, &turn(TurnRole::User, "Hello", 1)).await.unwrap();
            store.insert_turn(&a, &turn(TurnRole::Assistant, "Hi there", 1)).await.unwrap();
            store.insert_turn(&b, &turn(TurnRole::User, "Server status?", 1)).await.unwrap();
            store.insert_turn(&b, &turn(TurnRole::Assistant, "All green", 1)).await.unwrap();

            for (id, text) in [
                (&a, "Exchange of greetings."),
                (&b, "Server status check, everything green."),
            ] {
                store
                    .store_abbreviation(&AbbreviationRecord {
                        conversation_id: (*id).clone(),
                        abbreviation: text.to_string(),
                        embedding: Some(hash_embed(text, 64)),
                        model_id: "hash-v1".into(),
                        generated_at: now_rfc3339(),
                    })
                    .await
                    .unwrap();
            }
            store
        }

        #[tokio::test]
        async fn server_query_ranks_server_conversation_first() {
            let dir = tempdir().unwrap();
            let store = seeded_store(dir.path()).await;
            let fusion = SearchFusion::new(
                store,
                Arc::new(HashEmbedder),
                RetrievalConfig::default(),
            );

            let hits = fusion.search("server", &SearchFilters::default()).await.unwrap();
            assert!(!hits.is_empty());
            assert_eq!(hits[0].conversation_id.as_str(), "conv-b");
            assert!(hits[0].snippet.to_lowercase().contains("server"));
        }

        #[tokio::test]
        async fn embedder_failure_degrades_to_keyword_only() {
            let dir = tempdir().unwrap();
            let store = seeded_store(dir.path()).await;
            let fusion = SearchFusion::new(
                store,
                Arc::new(FailingEmbedder),
                RetrievalConfig::default(),
            );

            let hits = fusion.search("server", &SearchFilters::default()).await.unwrap();
            assert_eq!(hits.len(), 1, "keyword match still surfaces");
            assert_eq!(hits[0].conversation_id.as_str(), "conv-b");
        }

        #[tokio::test]
        async fn channel_filter_restricts_results() {
            let dir = tempdir().unwrap();
            let store = seeded_store(dir.path()).await;
            let fusion = SearchFusion::new(
                store,
                Arc::new(HashEmbedder),
                RetrievalConfig::default(),
            );

            let filters = SearchFilters {
                channel: Some("email".into()),
                limit: None,
            };
            let hits = fusion.search("server", &filters).await.unwrap();
            assert!(hits.is_empty(), "no conversation lives on the email channel");
        }

        #[tokio::test]
        async fn empty_query_returns_no_hits() {
            let dir = tempdir().unwrap();
            let store = seeded_store(dir.path()).await;
            let fusion = SearchFusion::new(
                store,
                Arc::new(HashEmbedder),
                RetrievalConfig::default(),
            );
            let hits = fusion.search("  ", &SearchFilters::default()).await.unwrap();
            assert!(hits.is_empty());
        }
    }
}
