// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Working-context hydration from the transcript tail.
//!
//! The hydrated context is ephemeral: held only in process memory, never
//! persisted, and fully reconstructible from the transcript log at any time.

use std::sync::Arc;

use tracing::debug;

use colloquy_core::ColloquyError;
use colloquy_core::types::{ConversationId, TurnLine};

use crate::log::TranscriptLog;

/// A bounded, ephemeral view of a conversation's recent history, assembled
/// for the conversational engine.
#[derive(Debug, Clone)]
pub struct WorkingContext {
    pub conversation_id: ConversationId,
    /// Compression summary standing in for history older than `turns`.
    pub summary: Option<String>,
    /// Recent turns, in order.
    pub turns: Vec<TurnLine>,
}

/// Rebuilds working contexts from the log tail plus the latest compression
/// marker.
pub struct ContextHydrator {
    log: Arc<TranscriptLog>,
    max_turns: u64,
}

impl ContextHydrator {
    pub fn new(log: Arc<TranscriptLog>, max_turns: u64) -> Self {
        Self { log, max_turns }
    }

    /// Hydrate a working context bounded to `max_turns` recent turns.
    ///
    /// When a compression event was recorded later than the oldest included
    /// turn, its summary is prepended as synthetic preceding context and
    /// turns the summary already covers are dropped.
    pub async fn hydrate(&self, id: &ConversationId) -> Result<WorkingContext, ColloquyError> {
        self.hydrate_bounded(id, self.max_turns).await
    }

    /// Hydrate with an explicit turn bound, overriding the configured one.
    pub async fn hydrate_bounded(
        &self,
        id: &ConversationId,
        max_turns: u64,
    ) -> Result<WorkingContext, ColloquyError> {
        let tail = self.log.read_tail(id, max_turns).await?;

        let mut summary = None;
        let mut turns = tail.turns;
        if let Some(compression) = tail.compression
            && tail.compression_follows_tail
        {
            turns.retain(|t| t.turn > compression.compressed_through);
            summary = Some(compression.summary);
        }

        debug!(
            conversation_id = %id,
            turns = turns.len(),
            has_summary = summary.is_some(),
            "working context hydrated"
        );

        Ok(WorkingContext {
            conversation_id: id.clone(),
            summary,
            turns,
        })
    }
}
