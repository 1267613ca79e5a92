// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search indexes for the Colloquy conversation core.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`, holding:
//!
//! - conversation rows (a rebuildable projection of the transcript log)
//! - the keyword index (one FTS5/BM25 row per turn)
//! - the vector index (one embedding per conversation, model-versioned)
//!
//! plus the RRF search fusion that merges both retrieval signals.

pub mod database;
pub mod fusion;
pub mod keyword;
pub mod migrations;
pub mod queries;
pub mod store;
pub mod vector;

pub use database::Database;
pub use fusion::{SearchFusion, reciprocal_rank_fusion};
pub use keyword::KeywordIndexer;
pub use store::{IndexStore, KeywordHit};
pub use vector::{VectorIndex, blob_to_vec, cosine_similarity, vec_to_blob};
