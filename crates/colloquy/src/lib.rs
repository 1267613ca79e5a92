// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Colloquy: conversation persistence & hybrid retrieval core.
//!
//! Durably records every exchange between a user/agent pair across
//! communication channels, derives a keyword index (synchronously) and a
//! vector index (via a background abbreviation pipeline) from that record,
//! and reconstructs a bounded working context on demand. The append-only
//! transcript log is the single source of truth; every index is a
//! rebuildable projection of it, and startup recovery proves it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use colloquy::service::{AppendTurn, ConversationService};
//! use colloquy::testing::{HashEmbedder, StubSummarizer};
//! use colloquy_core::types::TurnRole;
//!
//! # async fn run() -> Result<(), colloquy_core::ColloquyError> {
//! let config = colloquy_config::load_and_validate().expect("config");
//! let service = ConversationService::new(
//!     config,
//!     Arc::new(StubSummarizer::new()),
//!     Arc::new(HashEmbedder),
//! )
//! .await?;
//! service.recover().await?;
//! service.start_background().await;
//!
//! let receipt = service
//!     .append_turn(AppendTurn {
//!         conversation_id: None,
//!         channel: "whatsapp".into(),
//!         role: TurnRole::User,
//!         content: "Server status?".into(),
//!         sender: Some("ops@example.com".into()),
//!         usage: None,
//!     })
//!     .await?;
//! let context = service.hydrate_context(&receipt.conversation_id).await?;
//! assert_eq!(context.turns.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod service;
pub mod testing;

pub use service::{AppendTurn, ConversationService, TurnReceipt};

// Re-export the workspace surface consumers actually need.
pub use colloquy_config::ColloquyConfig;
pub use colloquy_core::types::{
    Conversation, ConversationEvent, ConversationId, ConversationState, SearchFilters, SearchHit,
    TranscriptLine, TurnLine, TurnRole, TurnUsage,
};
pub use colloquy_core::{ColloquyError, EmbedderAdapter, SummarizerAdapter};
pub use colloquy_pipeline::RecoveryReport;
pub use colloquy_transcript::WorkingContext;
