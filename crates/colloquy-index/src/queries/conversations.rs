// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation row CRUD operations.

use rusqlite::{OptionalExtension, params};

use colloquy_core::ColloquyError;
use colloquy_core::types::{Conversation, ConversationId, ConversationState, now_rfc3339};

use crate::database::{Database, map_tr_err};

const CONVERSATION_COLUMNS: &str = "id, channel, title, topics, turn_count, participants, \
     abbreviation, needs_abbreviation, manually_named, state, last_renamed_turn, \
     created_at, updated_at";

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    let topics: String = row.get(3)?;
    let participants: String = row.get(5)?;
    let state: String = row.get(9)?;
    Ok(Conversation {
        id: ConversationId(row.get(0)?),
        channel: row.get(1)?,
        title: row.get(2)?,
        topics: serde_json::from_str(&topics).unwrap_or_default(),
        turn_count: row.get::<_, i64>(4)? as u64,
        participants: serde_json::from_str(&participants).unwrap_or_default(),
        abbreviation: row.get(6)?,
        needs_abbreviation: row.get::<_, i64>(7)? != 0,
        manually_named: row.get::<_, i64>(8)? != 0,
        state: ConversationState::from_str_value(&state),
        last_renamed_turn: row.get::<_, i64>(10)? as u64,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Insert a new conversation row.
pub async fn create_conversation(
    db: &Database,
    conversation: &Conversation,
) -> Result<(), ColloquyError> {
    let c = conversation.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, channel, title, topics, turn_count, participants,
                     abbreviation, needs_abbreviation, manually_named, state, last_renamed_turn,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    c.id.as_str(),
                    c.channel,
                    c.title,
                    serde_json::to_string(&c.topics).unwrap_or_else(|_| "[]".into()),
                    c.turn_count as i64,
                    serde_json::to_string(&c.participants).unwrap_or_else(|_| "[]".into()),
                    c.abbreviation,
                    c.needs_abbreviation as i64,
                    c.manually_named as i64,
                    c.state.as_str(),
                    c.last_renamed_turn as i64,
                    c.created_at,
                    c.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a conversation by id.
pub async fn get_conversation(
    db: &Database,
    id: &ConversationId,
) -> Result<Option<Conversation>, ColloquyError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
            ))?;
            let conversation = stmt
                .query_row(params![id], row_to_conversation)
                .optional()?;
            Ok(conversation)
        })
        .await
        .map_err(map_tr_err)
}

/// List all conversations, most recently updated first.
pub async fn list_conversations(db: &Database) -> Result<Vec<Conversation>, ColloquyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations ORDER BY updated_at DESC"
            ))?;
            let conversations = stmt
                .query_map([], row_to_conversation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(conversations)
        })
        .await
        .map_err(map_tr_err)
}

/// Batch retrieval after search fusion.
pub async fn get_conversations_by_ids(
    db: &Database,
    ids: &[ConversationId],
) -> Result<Vec<Conversation>, ColloquyError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let conversations = stmt
                .query_map(params.as_slice(), row_to_conversation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(conversations)
        })
        .await
        .map_err(map_tr_err)
}

/// Record the latest turn count and bump the recency timestamp.
pub async fn record_turn_count(
    db: &Database,
    id: &ConversationId,
    turn_count: u64,
) -> Result<(), ColloquyError> {
    let id = id.as_str().to_string();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET turn_count = ?1, updated_at = ?2 WHERE id = ?3",
                params![turn_count as i64, now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Update a conversation's lifecycle state.
pub async fn set_state(
    db: &Database,
    id: &ConversationId,
    state: ConversationState,
) -> Result<(), ColloquyError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET state = ?1 WHERE id = ?2",
                params![state.as_str(), id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Explicit user rename: sets the title and the manual-name protection flag.
pub async fn set_title_manual(
    db: &Database,
    id: &ConversationId,
    title: &str,
) -> Result<(), ColloquyError> {
    let id = id.as_str().to_string();
    let title = title.to_string();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET title = ?1, manually_named = 1, updated_at = ?2
                 WHERE id = ?3",
                params![title, now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Auto-naming: assign title and topics unless the conversation is
/// manually named. Returns true when the title was applied.
pub async fn try_autoname(
    db: &Database,
    id: &ConversationId,
    title: &str,
    topics: &[String],
    renamed_at_turn: u64,
) -> Result<bool, ColloquyError> {
    let id = id.as_str().to_string();
    let title = title.to_string();
    let topics = serde_json::to_string(topics).unwrap_or_else(|_| "[]".into());
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE conversations
                 SET title = ?1, topics = ?2, last_renamed_turn = ?3, updated_at = ?4
                 WHERE id = ?5 AND manually_named = 0",
                params![title, topics, renamed_at_turn as i64, now, id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Set or clear the abbreviation retry flag.
pub async fn set_needs_abbreviation(
    db: &Database,
    id: &ConversationId,
    needs: bool,
) -> Result<(), ColloquyError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET needs_abbreviation = ?1 WHERE id = ?2",
                params![needs as i64, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Conversations flagged for an abbreviation retry (periodic sweep input).
pub async fn conversations_needing_abbreviation(
    db: &Database,
) -> Result<Vec<ConversationId>, ColloquyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM conversations WHERE needs_abbreviation = 1 ORDER BY id",
            )?;
            let ids = stmt
                .query_map([], |row| Ok(ConversationId(row.get(0)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

/// Conversations whose abbreviation work is outstanding for recovery: the
/// retry flag is set, no abbreviation record exists, or the record was
/// produced by a different embedding model.
pub async fn conversations_missing_abbreviation(
    db: &Database,
    model_id: &str,
) -> Result<Vec<ConversationId>, ColloquyError> {
    let model_id = model_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id FROM conversations c
                 LEFT JOIN abbreviations a ON a.conversation_id = c.id
                 WHERE c.needs_abbreviation = 1
                    OR a.conversation_id IS NULL
                    OR a.embedding IS NULL
                    OR a.model_id != ?1
                 ORDER BY c.id",
            )?;
            let ids = stmt
                .query_map(params![model_id], |row| Ok(ConversationId(row.get(0)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

/// Test fixture shared across the query modules.
#[cfg(test)]
pub(crate) fn make_conversation(id: &str, channel: &str) -> Conversation {
    Conversation {
        id: ConversationId(id.to_string()),
        channel: channel.to_string(),
        title: None,
        topics: vec![],
        turn_count: 0,
        participants: vec!["user-1".into()],
        abbreviation: None,
        needs_abbreviation: false,
        manually_named: false,
        state: ConversationState::Created,
        last_renamed_turn: 0,
        created_at: "2026-02-01T00:00:00.000Z".into(),
        updated_at: "2026-02-01T00:00:00.000Z".into(),
    }
}
