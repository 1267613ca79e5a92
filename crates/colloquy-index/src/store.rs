// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! High-level handle over the index database.
//!
//! Wraps a [`Database`] and delegates all query operations to the typed
//! query modules. From the perspective of the rest of the system this store
//! is append/upsert-only: no component ever deletes a turn.

use colloquy_config::model::StorageConfig;
use colloquy_core::ColloquyError;
use colloquy_core::types::{
    AbbreviationRecord, Conversation, ConversationId, ConversationState, TurnLine,
};
use tracing::debug;

use crate::database::Database;
use crate::queries;
pub use crate::queries::turns::KeywordHit;

/// SQLite-backed store for conversation rows and both search indexes.
pub struct IndexStore {
    db: Database,
}

impl IndexStore {
    /// Open the index database at the configured path, running migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, ColloquyError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "index store opened");
        Ok(Self { db })
    }

    /// Checkpoint and release the database.
    pub async fn close(&self) -> Result<(), ColloquyError> {
        self.db.close().await
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- Conversation operations ---

    pub async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), ColloquyError> {
        queries::conversations::create_conversation(&self.db, conversation).await
    }

    pub async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, ColloquyError> {
        queries::conversations::get_conversation(&self.db, id).await
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ColloquyError> {
        queries::conversations::list_conversations(&self.db).await
    }

    pub async fn get_conversations_by_ids(
        &self,
        ids: &[ConversationId],
    ) -> Result<Vec<Conversation>, ColloquyError> {
        queries::conversations::get_conversations_by_ids(&self.db, ids).await
    }

    pub async fn record_turn_count(
        &self,
        id: &ConversationId,
        turn_count: u64,
    ) -> Result<(), ColloquyError> {
        queries::conversations::record_turn_count(&self.db, id, turn_count).await
    }

    pub async fn set_state(
        &self,
        id: &ConversationId,
        state: ConversationState,
    ) -> Result<(), ColloquyError> {
        queries::conversations::set_state(&self.db, id, state).await
    }

    pub async fn set_title_manual(
        &self,
        id: &ConversationId,
        title: &str,
    ) -> Result<(), ColloquyError> {
        queries::conversations::set_title_manual(&self.db, id, title).await
    }

    pub async fn try_autoname(
        &self,
        id: &ConversationId,
        title: &str,
        topics: &[String],
        renamed_at_turn: u64,
    ) -> Result<bool, ColloquyError> {
        queries::conversations::try_autoname(&self.db, id, title, topics, renamed_at_turn).await
    }

    pub async fn set_needs_abbreviation(
        &self,
        id: &ConversationId,
        needs: bool,
    ) -> Result<(), ColloquyError> {
        queries::conversations::set_needs_abbreviation(&self.db, id, needs).await
    }

    pub async fn conversations_needing_abbreviation(
        &self,
    ) -> Result<Vec<ConversationId>, ColloquyError> {
        queries::conversations::conversations_needing_abbreviation(&self.db).await
    }

    pub async fn conversations_missing_abbreviation(
        &self,
        model_id: &str,
    ) -> Result<Vec<ConversationId>, ColloquyError> {
        queries::conversations::conversations_missing_abbreviation(&self.db, model_id).await
    }

    // --- Turn (keyword index) operations ---

    pub async fn insert_turn(
        &self,
        id: &ConversationId,
        turn: &TurnLine,
    ) -> Result<(), ColloquyError> {
        queries::turns::insert_turn(&self.db, id, turn).await
    }

    pub async fn turn_row_count(&self, id: &ConversationId) -> Result<u64, ColloquyError> {
        queries::turns::turn_row_count(&self.db, id).await
    }

    pub async fn fetch_turns(
        &self,
        id: &ConversationId,
        from_turn: u64,
        to_turn: u64,
    ) -> Result<Vec<TurnLine>, ColloquyError> {
        queries::turns::fetch_turns(&self.db, id, from_turn, to_turn).await
    }

    pub async fn keyword_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<KeywordHit>, ColloquyError> {
        queries::turns::keyword_search(&self.db, query, limit).await
    }

    // --- Abbreviation (vector index) operations ---

    pub async fn store_abbreviation(
        &self,
        record: &AbbreviationRecord,
    ) -> Result<(), ColloquyError> {
        queries::abbreviations::store_abbreviation(&self.db, record).await
    }

    pub async fn get_abbreviation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<AbbreviationRecord>, ColloquyError> {
        queries::abbreviations::get_abbreviation(&self.db, id).await
    }

    pub async fn all_embeddings(
        &self,
        model_id: &str,
    ) -> Result<Vec<(ConversationId, Vec<f32>)>, ColloquyError> {
        queries::abbreviations::all_embeddings(&self.db, model_id).await
    }
}
