// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable, append-only, per-conversation transcript log.
//!
//! One JSONL file per conversation, one [`TranscriptLine`] per line. Lines
//! are never mutated or deleted; every append is fsync'd before the call
//! returns. A corrupt line is skipped on read with a logged warning and does
//! not invalidate the rest of the file -- this is why serialization is
//! line-oriented rather than monolithic.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use colloquy_core::ColloquyError;
use colloquy_core::types::{CompressionEvent, ConversationId, MetaLine, TranscriptLine, TurnLine};

/// The most recent slice of a transcript, as returned by
/// [`TranscriptLog::read_tail`].
#[derive(Debug, Clone)]
pub struct TranscriptTail {
    /// The conversation's meta line, when present and parseable.
    pub meta: Option<MetaLine>,
    /// The last N turns, in log order.
    pub turns: Vec<TurnLine>,
    /// The latest compression event, if any.
    pub compression: Option<CompressionEvent>,
    /// True when the compression event was recorded at or after the oldest
    /// returned turn, i.e. its summary stands in for history preceding the
    /// tail.
    pub compression_follows_tail: bool,
}

/// Per-conversation append state: lines that failed to reach disk and are
/// retried ahead of the next append. Never dropped.
#[derive(Default)]
struct PendingLines {
    lines: Vec<String>,
}

/// Durable append-only store of transcript lines, one file per conversation.
pub struct TranscriptLog {
    root: PathBuf,
    /// Per-conversation state; the inner mutex serializes appends for one
    /// conversation while leaving other conversations fully parallel.
    conversations: DashMap<ConversationId, Arc<Mutex<PendingLines>>>,
}

impl TranscriptLog {
    /// Open (creating if necessary) the transcript root directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ColloquyError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(ColloquyError::transcript)?;
        Ok(Self {
            root,
            conversations: DashMap::new(),
        })
    }

    fn path_for(&self, id: &ConversationId) -> PathBuf {
        self.root.join(format!("{}.jsonl", id.as_str()))
    }

    /// Returns true when a transcript file exists for the conversation.
    pub fn exists(&self, id: &ConversationId) -> bool {
        self.path_for(id).exists()
    }

    fn entry(&self, id: &ConversationId) -> Arc<Mutex<PendingLines>> {
        self.conversations
            .entry(id.clone())
            .or_default()
            .value()
            .clone()
    }

    /// Append one line, durably, before returning.
    ///
    /// A failed write is retried once. If the retry also fails, the line
    /// (and any previously parked lines) stays in an in-memory pending
    /// buffer that is flushed ahead of the next append for this
    /// conversation, and the error is returned -- callers must be prepared
    /// to hold the turn and resubmit.
    pub async fn append(
        &self,
        id: &ConversationId,
        line: &TranscriptLine,
    ) -> Result<(), ColloquyError> {
        let encoded = serde_json::to_string(line)
            .map_err(|e| ColloquyError::Internal(format!("transcript line encode: {e}")))?;

        let state = self.entry(id);
        let mut state = state.lock().await;

        let mut payload = String::new();
        for pending in &state.lines {
            payload.push_str(pending);
            payload.push('\n');
        }
        payload.push_str(&encoded);
        payload.push('\n');

        let path = self.path_for(id);
        match append_payload(&path, &payload).await {
            Ok(()) => {
                state.lines.clear();
                Ok(())
            }
            Err(first) => {
                warn!(
                    conversation_id = %id,
                    error = %first,
                    "transcript append failed, retrying once"
                );
                match append_payload(&path, &payload).await {
                    Ok(()) => {
                        state.lines.clear();
                        Ok(())
                    }
                    Err(second) => {
                        state.lines.push(encoded);
                        warn!(
                            conversation_id = %id,
                            pending = state.lines.len(),
                            "transcript append retry failed, line parked for next attempt"
                        );
                        Err(ColloquyError::transcript(second))
                    }
                }
            }
        }
    }

    /// Stream the full log for a conversation.
    ///
    /// Corrupt lines are skipped with one warning each; surrounding lines
    /// remain valid.
    pub async fn read_all(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<TranscriptLine>, ColloquyError> {
        Ok(self.read_parsed(id).await?.into_iter().map(|(_, l)| l).collect())
    }

    /// Read the most recent `max_turns` turns plus the latest compression
    /// event and the meta line.
    pub async fn read_tail(
        &self,
        id: &ConversationId,
        max_turns: u64,
    ) -> Result<TranscriptTail, ColloquyError> {
        let lines = self.read_parsed(id).await?;

        let mut meta = None;
        let mut compression: Option<(usize, CompressionEvent)> = None;
        let mut turns: VecDeque<(usize, TurnLine)> = VecDeque::new();
        let mut kept_turn_numbers: VecDeque<u64> = VecDeque::new();

        for (pos, line) in lines {
            match line {
                TranscriptLine::Meta(m) => meta = Some(m),
                TranscriptLine::Compression(c) => compression = Some((pos, c)),
                TranscriptLine::Turn(t) => {
                    if kept_turn_numbers.back() != Some(&t.turn) {
                        kept_turn_numbers.push_back(t.turn);
                        if kept_turn_numbers.len() as u64 > max_turns {
                            let dropped = kept_turn_numbers.pop_front();
                            while turns
                                .front()
                                .map(|(_, t)| Some(&t.turn) == dropped.as_ref())
                                .unwrap_or(false)
                            {
                                turns.pop_front();
                            }
                        }
                    }
                    turns.push_back((pos, t));
                }
                _ => {}
            }
        }

        let oldest_turn_pos = turns.front().map(|(pos, _)| *pos);
        let compression_follows_tail = match (&compression, oldest_turn_pos) {
            (Some((event_pos, _)), Some(turn_pos)) => *event_pos >= turn_pos,
            (Some(_), None) => true,
            (None, _) => false,
        };

        Ok(TranscriptTail {
            meta,
            turns: turns.into_iter().map(|(_, t)| t).collect(),
            compression: compression.map(|(_, c)| c),
            compression_follows_tail,
        })
    }

    /// Enumerate every conversation with a transcript file.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationId>, ColloquyError> {
        let mut ids = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(ColloquyError::transcript)?;
        while let Some(entry) = dir.next_entry().await.map_err(ColloquyError::transcript)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(ConversationId(stem.to_string()));
            }
        }
        // Time-ordered ids make this chronological.
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    async fn read_parsed(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<(usize, TranscriptLine)>, ColloquyError> {
        let path = self.path_for(id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ColloquyError::NotFound(id.to_string()));
            }
            Err(e) => return Err(ColloquyError::transcript(e)),
        };

        let mut lines = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptLine>(trimmed) {
                Ok(parsed) => lines.push((idx, parsed)),
                Err(error) => {
                    warn!(
                        conversation_id = %id,
                        line = idx + 1,
                        %error,
                        "skipping corrupt transcript line"
                    );
                }
            }
        }
        debug!(conversation_id = %id, lines = lines.len(), "transcript read");
        Ok(lines)
    }
}

/// Render turn lines as `role: content` text for the summarizer.
pub fn render_text(lines: &[TranscriptLine]) -> String {
    lines
        .iter()
        .filter_map(TranscriptLine::as_turn)
        .map(|t| format!("{}: {}", t.role.as_str(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn append_payload(path: &Path, payload: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(payload.as_bytes()).await?;
    file.sync_data().await?;
    Ok(())
}
