// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword index row operations: one row per transcript turn line, plus the
//! BM25 query over the FTS5 virtual table.

use rusqlite::params;

use colloquy_core::ColloquyError;
use colloquy_core::types::{ConversationId, TurnLine, TurnRole};

use crate::database::{Database, map_tr_err};

/// A raw keyword match before fusion.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub conversation_id: ConversationId,
    /// BM25 score as reported by FTS5 (more negative = more relevant).
    pub score: f64,
    /// Content of the best-matching turn.
    pub snippet: String,
}

fn parse_role(s: &str) -> TurnRole {
    match s {
        "assistant" => TurnRole::Assistant,
        _ => TurnRole::User,
    }
}

/// Insert (or re-insert) one turn row. Idempotent so recovery can replay
/// transcript lines safely; the FTS index follows via triggers.
pub async fn insert_turn(
    db: &Database,
    id: &ConversationId,
    turn: &TurnLine,
) -> Result<(), ColloquyError> {
    let id = id.as_str().to_string();
    let role = turn.role.as_str().to_string();
    let content = turn.content.clone();
    let search_text = format!("{}: {}", turn.role.as_str(), turn.content);
    let turn_no = turn.turn as i64;
    let created_at = turn.at.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO turns (conversation_id, turn, role, content, search_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(conversation_id, turn, role) DO UPDATE SET
                     content = excluded.content,
                     search_text = excluded.search_text,
                     created_at = excluded.created_at",
                params![id, turn_no, role, content, search_text, created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Number of indexed rows for a conversation (recovery drift check).
pub async fn turn_row_count(db: &Database, id: &ConversationId) -> Result<u64, ColloquyError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM turns WHERE conversation_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch raw turns for an inclusive turn-number range, in order.
pub async fn fetch_turns(
    db: &Database,
    id: &ConversationId,
    from_turn: u64,
    to_turn: u64,
) -> Result<Vec<TurnLine>, ColloquyError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT turn, role, content, created_at FROM turns
                 WHERE conversation_id = ?1 AND turn >= ?2 AND turn <= ?3
                 ORDER BY turn ASC, CASE role WHEN 'user' THEN 0 ELSE 1 END ASC",
            )?;
            let turns = stmt
                .query_map(params![id, from_turn as i64, to_turn as i64], |row| {
                    let role: String = row.get(1)?;
                    Ok(TurnLine {
                        role: parse_role(&role),
                        content: row.get(2)?,
                        turn: row.get::<_, i64>(0)? as u64,
                        at: row.get(3)?,
                        channel: None,
                        sender: None,
                        usage: None,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(turns)
        })
        .await
        .map_err(map_tr_err)
}

/// BM25 keyword query, deduplicated to the best-ranked turn per
/// conversation.
///
/// The raw query is quoted token-by-token before hitting FTS5 so user
/// punctuation can never produce a MATCH syntax error.
pub async fn keyword_search(
    db: &Database,
    query: &str,
    limit: usize,
) -> Result<Vec<KeywordHit>, ColloquyError> {
    let match_expr = fts_match_expression(query);
    if match_expr.is_empty() {
        return Ok(vec![]);
    }
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT t.conversation_id, bm25(turns_fts) AS score, t.content
                 FROM turns_fts
                 JOIN turns t ON t.rowid = turns_fts.rowid
                 WHERE turns_fts MATCH ?1
                 ORDER BY bm25(turns_fts)
                 LIMIT ?2",
            )?;
            // Over-fetch so deduplication by conversation still fills `limit`.
            let rows = stmt
                .query_map(params![match_expr, (limit * 8) as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut hits: Vec<KeywordHit> = Vec::new();
            for (conversation_id, score, content) in rows {
                if hits.iter().any(|h| h.conversation_id.as_str() == conversation_id) {
                    continue;
                }
                hits.push(KeywordHit {
                    conversation_id: ConversationId(conversation_id),
                    score,
                    snippet: content,
                });
                if hits.len() >= limit {
                    break;
                }
            }
            Ok(hits)
        })
        .await
        .map_err(map_tr_err)
}

/// Quote each whitespace-separated token and join with OR. Tokens with no
/// alphanumeric content would quote to empty phrases and are dropped.
fn fts_match_expression(raw: &str) -> String {
    raw.split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::conversations::{create_conversation, make_conversation};
    use colloquy_core::types::now_rfc3339;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        create_conversation(&db, &make_conversation("c1", "cli")).await.unwrap();
        (db, dir)
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

    #[tokio::test]
    async fn insert_is_idempotent() {
        let (db, _dir) = setup_db().await;
        let id = ConversationId("c1".into());

        let line = turn(TurnRole::User, "hello there", 1);
        insert_turn(&db, &id, &line).await.unwrap();
        insert_turn(&db, &id, &line).await.unwrap();

        assert_eq!(turn_row_count(&db, &id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fetch_turns_orders_pairs() {
        let (db, _dir) = setup_db().await;
        let id = ConversationId("c1".into());

        insert_turn(&db, &id, &turn(TurnRole::User, "q1", 1)).await.unwrap();
        insert_turn(&db, &id, &turn(TurnRole::Assistant, "a1", 1)).await.unwrap();
        insert_turn(&db, &id, &turn(TurnRole::User, "q2", 2)).await.unwrap();

        let turns = fetch_turns(&db, &id, 1, 2).await.unwrap();
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2"]);
    }

    #[tokio::test]
    async fn keyword_search_matches_and_dedupes() {
        let (db, _dir) = setup_db().await;
        create_conversation(&db, &make_conversation("c2", "cli")).await.unwrap();
        let a = ConversationId("c1".into());
        let b = ConversationId("c2".into());

        insert_turn(&db, &a, &turn(TurnRole::User, "Hello", 1)).await.unwrap();
        insert_turn(&db, &a, &turn(TurnRole::Assistant, "Hi there", 1)).await.unwrap();
        insert_turn(&db, &b, &turn(TurnRole::User, "Server status?", 1)).await.unwrap();
        insert_turn(&db, &b, &turn(TurnRole::Assistant, "Server is all green", 1))
            .await
            .unwrap();

        let hits = keyword_search(&db, "server", 10).await.unwrap();
        assert_eq!(hits.len(), 1, "two matching turns collapse to one conversation");
        assert_eq!(hits[0].conversation_id, b);
        assert!(hits[0].snippet.to_lowercase().contains("server"));
    }

    #[tokio::test]
    async fn keyword_search_tolerates_punctuation() {
        let (db, _dir) = setup_db().await;
        let id = ConversationId("c1".into());
        insert_turn(&db, &id, &turn(TurnRole::User, "what about the deploy?", 1))
            .await
            .unwrap();

        // Quotes and operators in the raw query must not break MATCH.
        let hits = keyword_search(&db, "deploy\" AND (", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn keyword_search_empty_query_returns_nothing() {
        let (db, _dir) = setup_db().await;
        let hits = keyword_search(&db, "   ", 10).await.unwrap();
        assert!(hits.is_empty());
    }
}
