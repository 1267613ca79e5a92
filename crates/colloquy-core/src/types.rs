// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Colloquy workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a conversation.
///
/// Ids are UUIDv7 -- stable, immutable, and time-ordered -- assigned once at
/// conversation creation and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Generate a fresh, time-ordered conversation id.
    pub fn generate() -> Self {
        ConversationId(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role of a transcript turn line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// Lifecycle state of a conversation.
///
/// There is no terminal state -- every conversation is resumable
/// indefinitely. `Idle` never blocks writes; any new turn returns the
/// conversation to `Active`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Created,
    Active,
    Compressed,
    Idle,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Created => "created",
            ConversationState::Active => "active",
            ConversationState::Compressed => "compressed",
            ConversationState::Idle => "idle",
        }
    }

    /// Parse from an index store string, defaulting unknown values to Created.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "active" => ConversationState::Active,
            "compressed" => ConversationState::Compressed,
            "idle" => ConversationState::Idle,
            _ => ConversationState::Created,
        }
    }
}

/// A conversation row as held in the index store.
///
/// Everything here is a derived projection of the transcript log; the row
/// can be rebuilt from the log at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Stable, immutable, time-ordered id.
    pub id: ConversationId,
    /// Channel the conversation was created on.
    pub channel: String,
    /// Display title; `None` until auto-naming assigns one.
    pub title: Option<String>,
    /// Topic tags derived alongside the title.
    pub topics: Vec<String>,
    /// Highest turn number assigned so far.
    pub turn_count: u64,
    /// Participant identifiers.
    pub participants: Vec<String>,
    /// Latest abbreviation text, mirrored from the abbreviation record.
    pub abbreviation: Option<String>,
    /// Retry flag: summarization or embedding is outstanding.
    pub needs_abbreviation: bool,
    /// Protection flag: the user named this conversation explicitly and
    /// auto-naming must not touch the title.
    pub manually_named: bool,
    /// Current lifecycle state.
    pub state: ConversationState,
    /// Turn count at the time of the last title assignment.
    pub last_renamed_turn: u64,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// Token/cost metadata optionally attached to a turn line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cost_usd: Option<f64>,
}

/// The first line of every transcript file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaLine {
    pub conversation_id: ConversationId,
    pub channel: String,
    pub created_at: String,
    pub participants: Vec<String>,
}

/// A single user or assistant message.
///
/// Turn numbers are shared by a user+assistant pair: the user line opens a
/// turn, the assistant line closes it. Numbers strictly increase per
/// conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnLine {
    pub role: TurnRole,
    pub content: String,
    pub turn: u64,
    pub at: String,
    /// Channel override when the turn arrived on a different channel than
    /// the conversation was created on.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usage: Option<TurnUsage>,
}

/// Title assignment event (auto-naming or explicit user rename).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleAssignedEvent {
    pub title: String,
    #[serde(default)]
    pub topics: Vec<String>,
    /// True for explicit user renames; rebuilds restore the
    /// `manually_named` protection flag from this.
    #[serde(default)]
    pub manual: bool,
    pub at: String,
}

/// Compression marker recorded by, not performed by, this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionEvent {
    /// Highest turn number covered by the summary.
    pub compressed_through: u64,
    pub summary: String,
    pub at: String,
}

/// Abbreviation event appended when the background pipeline completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbbreviationEvent {
    pub abbreviation: String,
    pub at: String,
}

/// Participant-list update event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaUpdateEvent {
    pub participants: Vec<String>,
    pub at: String,
}

/// One line of a transcript log file.
///
/// Serialized as one JSON object per line, tagged by `kind`. The set of
/// variants is closed; readers match exhaustively and skip lines that fail
/// to parse without invalidating the rest of the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptLine {
    Meta(MetaLine),
    Turn(TurnLine),
    TitleAssigned(TitleAssignedEvent),
    Compression(CompressionEvent),
    Abbreviation(AbbreviationEvent),
    MetaUpdate(MetaUpdateEvent),
}

impl TranscriptLine {
    /// Returns the inner turn line, if this is a turn.
    pub fn as_turn(&self) -> Option<&TurnLine> {
        match self {
            TranscriptLine::Turn(turn) => Some(turn),
            _ => None,
        }
    }
}

/// The current abbreviation record for a conversation.
///
/// Exactly one record exists per conversation; regeneration replaces it.
/// `embedding` is `None` when summarization succeeded but embedding failed --
/// the text is still useful for display, and the conversation stays flagged
/// for an embedding retry.
#[derive(Debug, Clone)]
pub struct AbbreviationRecord {
    pub conversation_id: ConversationId,
    pub abbreviation: String,
    pub embedding: Option<Vec<f32>>,
    /// Identifier of the embedding model that produced `embedding`. Vectors
    /// from different models are never mixed at query time.
    pub model_id: String,
    pub generated_at: String,
}

/// A ranked search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub conversation_id: ConversationId,
    pub title: Option<String>,
    pub channel: String,
    /// Fused RRF score.
    pub score: f32,
    /// Matched turn text when the hit came from the keyword side, else an
    /// abbreviation prefix.
    pub snippet: String,
    pub updated_at: String,
}

/// Filters accepted by `search`.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Restrict results to a single channel.
    pub channel: Option<String>,
    /// Maximum number of results to return.
    pub limit: Option<usize>,
}

/// Push notification toward the UI layer.
///
/// Delivery is fire-and-forget; a UI that misses an event reconciles
/// independently via pull.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    Created {
        id: ConversationId,
        channel: String,
    },
    Renamed {
        id: ConversationId,
        title: String,
    },
    StateChanged {
        id: ConversationId,
        state: ConversationState,
    },
}

/// Current time as an ISO 8601 UTC string with millisecond precision.
///
/// The format sorts lexicographically, which the index store relies on for
/// recency ordering.
pub fn now_rfc3339() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}
