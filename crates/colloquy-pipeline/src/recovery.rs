// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup reconciliation of the derived indexes against the transcript log.
//!
//! The log is the source of truth; everything here is proof that the
//! conversation rows, the keyword index, and the vector index are
//! rebuildable projections of it. Recovery replays transcripts to repair
//! missing rows, re-indexes keyword gaps, and re-enqueues every
//! conversation whose abbreviation work is outstanding -- including records
//! produced by a different embedding model, which forces a full re-embed
//! after a model change.

use std::sync::Arc;

use tracing::{info, warn};

use colloquy_core::ColloquyError;
use colloquy_core::types::{
    Conversation, ConversationId, ConversationState, TranscriptLine, now_rfc3339,
};
use colloquy_index::{IndexStore, KeywordIndexer};
use colloquy_transcript::TranscriptLog;

use crate::worker::AbbreviationPipeline;

/// What a recovery pass did.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Conversations found in the transcript root.
    pub conversations: usize,
    /// Conversation rows created from scratch.
    pub rows_rebuilt: usize,
    /// Keyword rows re-indexed.
    pub turns_reindexed: u64,
    /// Conversations re-enqueued for abbreviation.
    pub reenqueued: usize,
}

/// A conversation view folded from transcript lines alone.
#[derive(Default)]
struct RebuiltView {
    channel: Option<String>,
    participants: Vec<String>,
    created_at: Option<String>,
    last_at: Option<String>,
    max_turn: u64,
    turn_rows: u64,
    title: Option<String>,
    topics: Vec<String>,
    manually_named: bool,
    abbreviation: Option<String>,
}

fn fold_lines(lines: &[TranscriptLine]) -> RebuiltView {
    let mut view = RebuiltView::default();
    for line in lines {
        match line {
            TranscriptLine::Meta(meta) => {
                view.channel = Some(meta.channel.clone());
                view.participants = meta.participants.clone();
                view.created_at = Some(meta.created_at.clone());
            }
            TranscriptLine::Turn(turn) => {
                view.max_turn = view.max_turn.max(turn.turn);
                view.turn_rows += 1;
                view.last_at = Some(turn.at.clone());
            }
            TranscriptLine::TitleAssigned(event) => {
                view.title = Some(event.title.clone());
                view.topics = event.topics.clone();
                view.manually_named = event.manual;
                view.last_at = Some(event.at.clone());
            }
            TranscriptLine::Abbreviation(event) => {
                view.abbreviation = Some(event.abbreviation.clone());
                view.last_at = Some(event.at.clone());
            }
            TranscriptLine::MetaUpdate(event) => {
                view.participants = event.participants.clone();
                view.last_at = Some(event.at.clone());
            }
            TranscriptLine::Compression(event) => {
                view.last_at = Some(event.at.clone());
            }
        }
    }
    view
}

/// Reconciles indexes against the log on startup and re-enqueues unfinished
/// background work.
pub struct RecoveryManager {
    log: Arc<TranscriptLog>,
    store: Arc<IndexStore>,
    keyword: KeywordIndexer,
    pipeline: Arc<AbbreviationPipeline>,
    embedding_model: String,
}

impl RecoveryManager {
    pub fn new(
        log: Arc<TranscriptLog>,
        store: Arc<IndexStore>,
        pipeline: Arc<AbbreviationPipeline>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            keyword: KeywordIndexer::new(store.clone()),
            log,
            store,
            pipeline,
            embedding_model: embedding_model.into(),
        }
    }

    /// Run one full recovery pass.
    pub async fn recover(&self) -> Result<RecoveryReport, ColloquyError> {
        let ids = self.log.list_conversations().await?;
        let mut report = RecoveryReport {
            conversations: ids.len(),
            ..Default::default()
        };

        for id in &ids {
            if let Err(error) = self.recover_conversation(id, &mut report).await {
                warn!(conversation_id = %id, %error, "conversation recovery failed, continuing");
            }
        }

        // Re-enqueue everything with outstanding abbreviation work: retry
        // flags, missing records, missing vectors, or a stale model id.
        let outstanding = self
            .store
            .conversations_missing_abbreviation(&self.embedding_model)
            .await?;
        report.reenqueued = outstanding.len();
        for id in &outstanding {
            self.pipeline.enqueue(id).await;
        }

        info!(
            conversations = report.conversations,
            rows_rebuilt = report.rows_rebuilt,
            turns_reindexed = report.turns_reindexed,
            reenqueued = report.reenqueued,
            "recovery complete"
        );
        Ok(report)
    }

    async fn recover_conversation(
        &self,
        id: &ConversationId,
        report: &mut RecoveryReport,
    ) -> Result<(), ColloquyError> {
        let lines = self.log.read_all(id).await?;
        let view = fold_lines(&lines);

        match self.store.get_conversation(id).await? {
            None => {
                let now = now_rfc3339();
                self.store
                    .create_conversation(&Conversation {
                        id: id.clone(),
                        channel: view.channel.clone().unwrap_or_else(|| "unknown".into()),
                        title: view.title.clone(),
                        topics: view.topics.clone(),
                        turn_count: view.max_turn,
                        participants: view.participants.clone(),
                        abbreviation: view.abbreviation.clone(),
                        needs_abbreviation: false,
                        manually_named: view.manually_named,
                        state: ConversationState::Idle,
                        last_renamed_turn: 0,
                        created_at: view.created_at.clone().unwrap_or_else(|| now.clone()),
                        updated_at: view.last_at.clone().unwrap_or(now),
                    })
                    .await?;
                report.rows_rebuilt += 1;
                info!(conversation_id = %id, "conversation row rebuilt from transcript");
            }
            Some(row) if row.turn_count != view.max_turn => {
                self.store.record_turn_count(id, view.max_turn).await?;
            }
            Some(_) => {}
        }

        let indexed = self.keyword.indexed_rows(id).await?;
        if indexed < view.turn_rows {
            self.keyword.reindex(id, &lines).await?;
            report.turns_reindexed += view.turn_rows - indexed;
            info!(
                conversation_id = %id,
                missing = view.turn_rows - indexed,
                "keyword index drift repaired"
            );
        }

        Ok(())
    }
}
