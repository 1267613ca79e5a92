// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword indexer: synchronous FTS5 insertion on the append path.
//!
//! `on_turn_appended` is awaited inline by the append path, so keyword
//! search reflects a turn within the same request cycle (read-after-write
//! consistency). There is no queue and no batching here.

use std::sync::Arc;

use tracing::{debug, warn};

use colloquy_core::ColloquyError;
use colloquy_core::types::{ConversationId, TranscriptLine, TurnLine};

use crate::store::IndexStore;

/// Indexes every appended turn for exact/keyword retrieval.
pub struct KeywordIndexer {
    store: Arc<IndexStore>,
}

impl KeywordIndexer {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    /// Index one freshly appended turn.
    ///
    /// Failure here is logged but non-fatal: the index is a rebuildable
    /// projection of the transcript log, and recovery repairs any gap.
    pub async fn on_turn_appended(&self, id: &ConversationId, turn: &TurnLine) {
        if let Err(error) = self.store.insert_turn(id, turn).await {
            warn!(
                conversation_id = %id,
                turn = turn.turn,
                %error,
                "keyword indexing failed; row will be repaired on recovery"
            );
        }
    }

    /// Number of indexed rows for a conversation.
    pub async fn indexed_rows(&self, id: &ConversationId) -> Result<u64, ColloquyError> {
        self.store.turn_row_count(id).await
    }

    /// Re-index every turn line of a transcript, returning the row count.
    ///
    /// Inserts are idempotent, so replaying the full log is always safe.
    pub async fn reindex(
        &self,
        id: &ConversationId,
        lines: &[TranscriptLine],
    ) -> Result<u64, ColloquyError> {
        let mut rows = 0u64;
        for line in lines {
            if let TranscriptLine::Turn(turn) = line {
                self.store.insert_turn(id, turn).await?;
                rows += 1;
            }
        }
        debug!(conversation_id = %id, rows, "keyword index rebuilt");
        Ok(rows)
    }
}
