// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background machinery for the Colloquy conversation core: the
//! abbreviation pipeline (serial worker + retry sweep), the lifecycle state
//! machine with idle timers, and startup recovery.

pub mod lifecycle;
pub mod recovery;
pub mod worker;

#[cfg(test)]
mod testing;

pub use lifecycle::{LifecycleManager, spawn_idle_ticker};
pub use recovery::{RecoveryManager, RecoveryReport};
pub use worker::{AbbreviationPipeline, PipelineWorker, abbreviation_pipeline, spawn_retry_sweep};
