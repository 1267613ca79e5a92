// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Abbreviation record operations.
//!
//! The record and the conversation-row mirror are written in one
//! transaction so search fusion can never observe a half-written state.

use rusqlite::{OptionalExtension, params};

use colloquy_core::ColloquyError;
use colloquy_core::types::{AbbreviationRecord, ConversationId};

use crate::database::{Database, map_tr_err};
use crate::vector::{blob_to_vec, vec_to_blob};

/// Atomically upsert the abbreviation record and mirror it onto the
/// conversation row.
///
/// When the record carries no embedding (embedder failure), the retry flag
/// stays raised so the sweep re-enqueues the conversation; otherwise it is
/// cleared in the same transaction.
pub async fn store_abbreviation(
    db: &Database,
    record: &AbbreviationRecord,
) -> Result<(), ColloquyError> {
    let id = record.conversation_id.as_str().to_string();
    let abbreviation = record.abbreviation.clone();
    let embedding_blob = record.embedding.as_ref().map(|v| vec_to_blob(v));
    let needs_retry = record.embedding.is_none() as i64;
    let model_id = record.model_id.clone();
    let generated_at = record.generated_at.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO abbreviations (conversation_id, abbreviation, embedding, model_id, generated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(conversation_id) DO UPDATE SET
                     abbreviation = excluded.abbreviation,
                     embedding = excluded.embedding,
                     model_id = excluded.model_id,
                     generated_at = excluded.generated_at",
                params![id, abbreviation, embedding_blob, model_id, generated_at],
            )?;
            tx.execute(
                "UPDATE conversations SET abbreviation = ?1, needs_abbreviation = ?2
                 WHERE id = ?3",
                params![abbreviation, needs_retry, id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get the current abbreviation record for a conversation.
pub async fn get_abbreviation(
    db: &Database,
    id: &ConversationId,
) -> Result<Option<AbbreviationRecord>, ColloquyError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, abbreviation, embedding, model_id, generated_at
                 FROM abbreviations WHERE conversation_id = ?1",
            )?;
            let record = stmt
                .query_row(params![id], |row| {
                    let blob: Option<Vec<u8>> = row.get(2)?;
                    Ok(AbbreviationRecord {
                        conversation_id: ConversationId(row.get(0)?),
                        abbreviation: row.get(1)?,
                        embedding: blob.map(|b| blob_to_vec(&b)),
                        model_id: row.get(3)?,
                        generated_at: row.get(4)?,
                    })
                })
                .optional()?;
            Ok(record)
        })
        .await
        .map_err(map_tr_err)
}

/// All embeddings produced by the given model (lightweight -- no text).
///
/// Rows written under a different model id are invisible here, which is what
/// keeps vectors from different models out of the same ranking.
pub async fn all_embeddings(
    db: &Database,
    model_id: &str,
) -> Result<Vec<(ConversationId, Vec<f32>)>, ColloquyError> {
    let model_id = model_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, embedding FROM abbreviations
                 WHERE embedding IS NOT NULL AND model_id = ?1",
            )?;
            let results = stmt
                .query_map(params![model_id], |row| {
                    let id: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    Ok((ConversationId(id), blob_to_vec(&blob)))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(results)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::conversations::{
        create_conversation, get_conversation, make_conversation, set_needs_abbreviation,
    };
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        create_conversation(&db, &make_conversation("c1", "cli")).await.unwrap();
        (db, dir)
    }

    fn record(embedding: Option<Vec<f32>>) -> AbbreviationRecord {
        AbbreviationRecord {
            conversation_id: ConversationId("c1".into()),
            abbreviation: "Deploy status check with the ops bot.".into(),
            embedding,
            model_id: "model-a".into(),
            generated_at: "2026-02-01T00:00:00.000Z".into(),
        }
    }

    #[tokio::test]
    async fn store_clears_retry_flag_and_mirrors_text() {
        let (db, _dir) = setup_db().await;
        let id = ConversationId("c1".into());
        set_needs_abbreviation(&db, &id, true).await.unwrap();

        store_abbreviation(&db, &record(Some(vec![0.1; 8]))).await.unwrap();

        let conversation = get_conversation(&db, &id).await.unwrap().unwrap();
        assert!(!conversation.needs_abbreviation);
        assert_eq!(
            conversation.abbreviation.as_deref(),
            Some("Deploy status check with the ops bot.")
        );

        let stored = get_abbreviation(&db, &id).await.unwrap().unwrap();
        assert_eq!(stored.embedding.unwrap().len(), 8);
        assert_eq!(stored.model_id, "model-a");
    }

    #[tokio::test]
    async fn store_without_embedding_keeps_retry_flag() {
        let (db, _dir) = setup_db().await;
        let id = ConversationId("c1".into());

        store_abbreviation(&db, &record(None)).await.unwrap();

        let conversation = get_conversation(&db, &id).await.unwrap().unwrap();
        assert!(conversation.needs_abbreviation, "embedding retry stays flagged");
        // The text is still persisted for display.
        assert!(conversation.abbreviation.is_some());
    }

    #[tokio::test]
    async fn regeneration_replaces_the_record() {
        let (db, _dir) = setup_db().await;
        let id = ConversationId("c1".into());

        store_abbreviation(&db, &record(Some(vec![0.1; 8]))).await.unwrap();
        let mut newer = record(Some(vec![0.9; 8]));
        newer.abbreviation = "Updated summary.".into();
        store_abbreviation(&db, &newer).await.unwrap();

        let stored = get_abbreviation(&db, &id).await.unwrap().unwrap();
        assert_eq!(stored.abbreviation, "Updated summary.");
        assert!((stored.embedding.unwrap()[0] - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn all_embeddings_filters_by_model() {
        let (db, _dir) = setup_db().await;

        store_abbreviation(&db, &record(Some(vec![0.5; 8]))).await.unwrap();

        assert_eq!(all_embeddings(&db, "model-a").await.unwrap().len(), 1);
        assert!(all_embeddings(&db, "model-b").await.unwrap().is_empty());
    }
}
