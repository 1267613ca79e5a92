// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transcript persistence for the Colloquy conversation core.
//!
//! The transcript log is the source of truth for everything else in the
//! system: both search indexes and every conversation row are rebuildable
//! projections of it. Writes are line-oriented, append-only, and fsync'd;
//! reads tolerate corrupt lines.

pub mod hydrator;
pub mod log;

pub use hydrator::{ContextHydrator, WorkingContext};
pub use log::{TranscriptLog, TranscriptTail, render_text};
