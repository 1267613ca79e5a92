// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation lifecycle state machine and idle timers.
//!
//! States: `Created -> Active -> (Compressed <-> Active) -> Idle -> Active`.
//! There is no terminal state; every conversation is resumable
//! indefinitely. Idle never blocks writes -- any new turn implicitly cancels
//! idle status. The idle transition is edge-triggered: one timeout (or one
//! explicit switch-away) enqueues exactly one abbreviation task, and the
//! trigger re-arms only on new activity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use colloquy_config::model::LifecycleConfig;
use colloquy_core::ColloquyError;
use colloquy_core::types::{ConversationEvent, ConversationId, ConversationState};
use colloquy_index::IndexStore;

use crate::worker::AbbreviationPipeline;

struct ActivityEntry {
    last_activity: Instant,
    idle_notified: bool,
}

/// Owns the per-conversation state machine and its timers.
pub struct LifecycleManager {
    activity: DashMap<ConversationId, ActivityEntry>,
    idle_timeout: Duration,
    store: Arc<IndexStore>,
    pipeline: Arc<AbbreviationPipeline>,
    events: broadcast::Sender<ConversationEvent>,
}

impl LifecycleManager {
    pub fn new(
        config: &LifecycleConfig,
        store: Arc<IndexStore>,
        pipeline: Arc<AbbreviationPipeline>,
        events: broadcast::Sender<ConversationEvent>,
    ) -> Self {
        Self {
            activity: DashMap::new(),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            store,
            pipeline,
            events,
        }
    }

    /// Record turn activity: resets the idle deadline and returns the
    /// conversation to Active from any other state.
    pub async fn on_turn(
        &self,
        id: &ConversationId,
        prior_state: ConversationState,
    ) -> Result<(), ColloquyError> {
        self.activity.insert(
            id.clone(),
            ActivityEntry {
                last_activity: Instant::now(),
                idle_notified: false,
            },
        );

        if prior_state != ConversationState::Active {
            self.store.set_state(id, ConversationState::Active).await?;
            let _ = self.events.send(ConversationEvent::StateChanged {
                id: id.clone(),
                state: ConversationState::Active,
            });
            debug!(conversation_id = %id, from = %prior_state, "conversation active");
        }
        Ok(())
    }

    /// Record a compression marker state change.
    pub async fn on_compression(&self, id: &ConversationId) -> Result<(), ColloquyError> {
        self.store
            .set_state(id, ConversationState::Compressed)
            .await?;
        let _ = self.events.send(ConversationEvent::StateChanged {
            id: id.clone(),
            state: ConversationState::Compressed,
        });
        debug!(conversation_id = %id, "compression recorded");
        Ok(())
    }

    /// Explicit switch-away: same transition as the idle timeout, now.
    pub async fn switch_away(&self, id: &ConversationId) -> Result<(), ColloquyError> {
        self.transition_idle(id).await
    }

    /// One pass of the idle check. Conversations whose deadline has passed
    /// transition exactly once; the trigger re-arms on new activity.
    pub async fn check_idle_once(&self) {
        let now = Instant::now();
        let due: Vec<ConversationId> = self
            .activity
            .iter()
            .filter(|entry| {
                !entry.value().idle_notified
                    && now.duration_since(entry.value().last_activity) >= self.idle_timeout
            })
            .map(|entry| entry.key().clone())
            .collect();

        for id in due {
            if let Err(error) = self.transition_idle(&id).await {
                warn!(conversation_id = %id, %error, "idle transition failed");
            }
        }
    }

    async fn transition_idle(&self, id: &ConversationId) -> Result<(), ColloquyError> {
        {
            let mut entry = self.activity.entry(id.clone()).or_insert(ActivityEntry {
                last_activity: Instant::now(),
                idle_notified: false,
            });
            if entry.idle_notified {
                debug!(conversation_id = %id, "already idle, no re-trigger");
                return Ok(());
            }
            entry.idle_notified = true;
        }

        self.store.set_state(id, ConversationState::Idle).await?;
        let _ = self.events.send(ConversationEvent::StateChanged {
            id: id.clone(),
            state: ConversationState::Idle,
        });
        self.pipeline.enqueue(id).await;
        info!(conversation_id = %id, "conversation idle, abbreviation enqueued");
        Ok(())
    }
}

/// Spawn the idle ticker task.
pub fn spawn_idle_ticker(
    lifecycle: Arc<LifecycleManager>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            lifecycle.check_idle_once().await;
        }
    })
}
