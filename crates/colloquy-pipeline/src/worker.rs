// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background abbreviation pipeline.
//!
//! `enqueue` is non-blocking and idempotent: a conversation already queued
//! or in-flight is not queued twice. A single serial worker drains the
//! queue, which bounds external API load and guarantees per-conversation
//! serialization of summarize/embed calls. An abbreviation may describe a
//! transcript that has since grown -- it is a point-in-time summary, not a
//! live view.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use colloquy_config::model::{AbbreviationConfig, LifecycleConfig};
use colloquy_core::traits::{ConversationDigest, EmbeddingInput, SummaryInput};
use colloquy_core::types::{
    AbbreviationEvent, AbbreviationRecord, ConversationEvent, ConversationId,
    TitleAssignedEvent, TranscriptLine, now_rfc3339,
};
use colloquy_core::{ColloquyError, EmbedderAdapter, SummarizerAdapter};
use colloquy_index::IndexStore;
use colloquy_transcript::{TranscriptLog, render_text};

/// Handle for enqueueing abbreviation work. Cheap to clone via `Arc`.
pub struct AbbreviationPipeline {
    tx: mpsc::UnboundedSender<ConversationId>,
    /// Conversations currently queued. An entry is removed when the worker
    /// dequeues the task, so an enqueue arriving mid-flight schedules
    /// exactly one follow-up pass and further enqueues coalesce into it.
    queued: Arc<Mutex<HashSet<ConversationId>>>,
}

impl AbbreviationPipeline {
    /// Enqueue a conversation for re-abbreviation.
    ///
    /// Never blocks the caller; returns true when the conversation was
    /// newly queued, false when it coalesced into an existing entry.
    pub async fn enqueue(&self, id: &ConversationId) -> bool {
        let mut queued = self.queued.lock().await;
        if !queued.insert(id.clone()) {
            debug!(conversation_id = %id, "abbreviation already queued, coalescing");
            return false;
        }
        drop(queued);
        if self.tx.send(id.clone()).is_err() {
            warn!(conversation_id = %id, "abbreviation worker is gone, task dropped");
            return false;
        }
        debug!(conversation_id = %id, "abbreviation task enqueued");
        true
    }
}

/// The serial worker end of the pipeline. Run it with `tokio::spawn`.
pub struct PipelineWorker {
    rx: mpsc::UnboundedReceiver<ConversationId>,
    queued: Arc<Mutex<HashSet<ConversationId>>>,
    context: Arc<PipelineContext>,
}

impl PipelineWorker {
    /// Drain tasks one at a time until every pipeline handle is dropped.
    pub async fn run(mut self) {
        info!("abbreviation worker started");
        while let Some(id) = self.rx.recv().await {
            self.queued.lock().await.remove(&id);
            if let Err(error) = self.context.process(&id).await {
                warn!(conversation_id = %id, %error, "abbreviation task failed");
            }
        }
        debug!("abbreviation worker stopped");
    }
}

struct PipelineContext {
    log: Arc<TranscriptLog>,
    store: Arc<IndexStore>,
    summarizer: Arc<dyn SummarizerAdapter>,
    embedder: Arc<dyn EmbedderAdapter>,
    abbreviation: AbbreviationConfig,
    lifecycle: LifecycleConfig,
    events: broadcast::Sender<ConversationEvent>,
}

impl PipelineContext {
    /// One full abbreviation pass: read transcript, summarize, embed,
    /// atomically upsert, then auto-name if due.
    ///
    /// External-call failures are flagged and logged, never propagated --
    /// only index store failures bubble up to the worker loop.
    async fn process(&self, id: &ConversationId) -> Result<(), ColloquyError> {
        let lines = match self.log.read_all(id).await {
            Ok(lines) => lines,
            Err(ColloquyError::NotFound(_)) => {
                warn!(conversation_id = %id, "no transcript for queued conversation");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let transcript_text = render_text(&lines);
        if transcript_text.is_empty() {
            debug!(conversation_id = %id, "transcript has no turns yet, skipping");
            return Ok(());
        }

        let digest = match self
            .summarizer
            .summarize(SummaryInput {
                transcript_text,
                max_len: self.abbreviation.max_len,
            })
            .await
        {
            Ok(digest) => digest,
            Err(error) => {
                warn!(conversation_id = %id, %error, "summarization failed, flagged for retry");
                self.store.set_needs_abbreviation(id, true).await?;
                return Ok(());
            }
        };

        let abbreviation = truncate_chars(&digest.abbreviation, self.abbreviation.max_len);

        let embedding = match self
            .embedder
            .embed(EmbeddingInput {
                texts: vec![abbreviation.clone()],
            })
            .await
        {
            Ok(output) => output.embeddings.into_iter().next(),
            Err(error) => {
                // Keyword search keeps working and the text is worth
                // showing; only the vector side is retried later.
                warn!(
                    conversation_id = %id,
                    %error,
                    "embedding failed, abbreviation persisted without vector"
                );
                None
            }
        };

        let record = AbbreviationRecord {
            conversation_id: id.clone(),
            abbreviation: abbreviation.clone(),
            embedding,
            model_id: self.embedder.model_id().to_string(),
            generated_at: now_rfc3339(),
        };
        self.store.store_abbreviation(&record).await?;

        if let Err(error) = self
            .log
            .append(
                id,
                &TranscriptLine::Abbreviation(AbbreviationEvent {
                    abbreviation: abbreviation.clone(),
                    at: now_rfc3339(),
                }),
            )
            .await
        {
            warn!(conversation_id = %id, %error, "abbreviation event append failed");
        }

        self.maybe_autoname(id, &digest).await?;

        info!(conversation_id = %id, "abbreviation refreshed");
        Ok(())
    }

    /// Apply the digest's title when a naming trigger is due: first naming
    /// at `rename_at_turn`, re-naming every `rename_interval_turns` turns.
    /// Manually named conversations are never touched.
    async fn maybe_autoname(
        &self,
        id: &ConversationId,
        digest: &ConversationDigest,
    ) -> Result<(), ColloquyError> {
        let Some(conversation) = self.store.get_conversation(id).await? else {
            return Ok(());
        };
        if conversation.manually_named {
            return Ok(());
        }
        let title = digest.title.trim();
        if title.is_empty() {
            return Ok(());
        }

        let due = match conversation.title {
            None => conversation.turn_count >= self.lifecycle.rename_at_turn,
            Some(_) => {
                conversation.turn_count.saturating_sub(conversation.last_renamed_turn)
                    >= self.lifecycle.rename_interval_turns
            }
        };
        if !due {
            return Ok(());
        }

        let applied = self
            .store
            .try_autoname(id, title, &digest.topics, conversation.turn_count)
            .await?;
        if !applied {
            return Ok(());
        }

        if let Err(error) = self
            .log
            .append(
                id,
                &TranscriptLine::TitleAssigned(TitleAssignedEvent {
                    title: title.to_string(),
                    topics: digest.topics.clone(),
                    manual: false,
                    at: now_rfc3339(),
                }),
            )
            .await
        {
            warn!(conversation_id = %id, %error, "title event append failed");
        }
        let _ = self.events.send(ConversationEvent::Renamed {
            id: id.clone(),
            title: title.to_string(),
        });
        info!(conversation_id = %id, title, "conversation auto-named");
        Ok(())
    }
}

/// Build a pipeline handle and its worker.
#[allow(clippy::too_many_arguments)]
pub fn abbreviation_pipeline(
    log: Arc<TranscriptLog>,
    store: Arc<IndexStore>,
    summarizer: Arc<dyn SummarizerAdapter>,
    embedder: Arc<dyn EmbedderAdapter>,
    abbreviation: AbbreviationConfig,
    lifecycle: LifecycleConfig,
    events: broadcast::Sender<ConversationEvent>,
) -> (Arc<AbbreviationPipeline>, PipelineWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queued = Arc::new(Mutex::new(HashSet::new()));
    let pipeline = Arc::new(AbbreviationPipeline {
        tx,
        queued: queued.clone(),
    });
    let worker = PipelineWorker {
        rx,
        queued,
        context: Arc::new(PipelineContext {
            log,
            store,
            summarizer,
            embedder,
            abbreviation,
            lifecycle,
            events,
        }),
    };
    (pipeline, worker)
}

/// Spawn the periodic sweep that re-enqueues every conversation whose
/// `needs_abbreviation` flag is set.
pub fn spawn_retry_sweep(
    pipeline: Arc<AbbreviationPipeline>,
    store: Arc<IndexStore>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; recovery already covers startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.conversations_needing_abbreviation().await {
                Ok(ids) => {
                    for id in ids {
                        pipeline.enqueue(&id).await;
                    }
                }
                Err(error) => warn!(%error, "retry sweep query failed"),
            }
        }
    })
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        CountingSummarizer, FailingEmbedder, FailingSummarizer, GatedSummarizer, HashEmbedder,
        seed_conversation,
    };
    use tempfile::tempdir;

    struct Fixture {
        log: Arc<TranscriptLog>,
        store: Arc<IndexStore>,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let log = Arc::new(TranscriptLog::open(dir.path().join("transcripts")).unwrap());
        let store = Arc::new(
            IndexStore::open(&colloquy_config::model::StorageConfig {
                data_dir: dir.path().join("transcripts").to_string_lossy().into_owned(),
                database_path: dir.path().join("index.db").to_string_lossy().into_owned(),
                wal_mode: true,
            })
            .await
            .unwrap(),
        );
        Fixture {
            log,
            store,
            _dir: dir,
        }
    }

    fn pipeline_with(
        fixture: &Fixture,
        summarizer: Arc<dyn SummarizerAdapter>,
        embedder: Arc<dyn EmbedderAdapter>,
    ) -> (Arc<AbbreviationPipeline>, PipelineWorker) {
        let (events, _) = broadcast::channel(16);
        abbreviation_pipeline(
            fixture.log.clone(),
            fixture.store.clone(),
            summarizer,
            embedder,
            AbbreviationConfig::default(),
            LifecycleConfig::default(),
            events,
        )
    }

    async fn wait_for_abbreviation(store: &IndexStore, id: &ConversationId) {
        for _ in 0..200 {
            if store.get_abbreviation(id).await.unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("abbreviation never appeared for {id}");
    }

    #[tokio::test]
    async fn processes_enqueued_conversation() {
        let fixture = fixture().await;
        let id = seed_conversation(&fixture.log, &fixture.store, "c1", 3).await;

        let (pipeline, worker) = pipeline_with(
            &fixture,
            Arc::new(CountingSummarizer::default()),
            Arc::new(HashEmbedder),
        );
        tokio::spawn(worker.run());

        assert!(pipeline.enqueue(&id).await);
        wait_for_abbreviation(&fixture.store, &id).await;

        let record = fixture.store.get_abbreviation(&id).await.unwrap().unwrap();
        assert!(record.embedding.is_some());
        assert_eq!(record.model_id, "hash-v1");

        let conversation = fixture.store.get_conversation(&id).await.unwrap().unwrap();
        assert!(!conversation.needs_abbreviation);
        // The transcript carries the abbreviation event.
        let lines = fixture.log.read_all(&id).await.unwrap();
        assert!(
            lines
                .iter()
                .any(|l| matches!(l, TranscriptLine::Abbreviation(_)))
        );
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_while_in_flight() {
        let fixture = fixture().await;
        let id = seed_conversation(&fixture.log, &fixture.store, "c1", 2).await;

        let summarizer = Arc::new(GatedSummarizer::new());
        let (pipeline, worker) = pipeline_with(
            &fixture,
            summarizer.clone(),
            Arc::new(HashEmbedder),
        );
        tokio::spawn(worker.run());

        pipeline.enqueue(&id).await;
        summarizer.wait_until_in_flight().await;

        // Five enqueues while the first task is in-flight coalesce into one.
        for _ in 0..5 {
            pipeline.enqueue(&id).await;
        }
        summarizer.release();

        // Drain: wait until both passes have completed.
        for _ in 0..200 {
            if summarizer.calls() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            summarizer.calls(),
            2,
            "exactly one additional processing pass"
        );
    }

    #[tokio::test]
    async fn summarizer_failure_sets_retry_flag() {
        let fixture = fixture().await;
        let id = seed_conversation(&fixture.log, &fixture.store, "c1", 2).await;

        let (pipeline, worker) = pipeline_with(
            &fixture,
            Arc::new(FailingSummarizer),
            Arc::new(HashEmbedder),
        );
        tokio::spawn(worker.run());
        pipeline.enqueue(&id).await;

        for _ in 0..200 {
            let conversation = fixture.store.get_conversation(&id).await.unwrap().unwrap();
            if conversation.needs_abbreviation {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("needs_abbreviation was never set");
    }

    #[tokio::test]
    async fn embedder_failure_persists_text_and_keeps_flag() {
        let fixture = fixture().await;
        let id = seed_conversation(&fixture.log, &fixture.store, "c1", 2).await;

        let (pipeline, worker) = pipeline_with(
            &fixture,
            Arc::new(CountingSummarizer::default()),
            Arc::new(FailingEmbedder),
        );
        tokio::spawn(worker.run());
        pipeline.enqueue(&id).await;
        wait_for_abbreviation(&fixture.store, &id).await;

        let record = fixture.store.get_abbreviation(&id).await.unwrap().unwrap();
        assert!(record.embedding.is_none(), "vector missing after embed failure");
        assert!(!record.abbreviation.is_empty(), "text persisted anyway");

        let conversation = fixture.store.get_conversation(&id).await.unwrap().unwrap();
        assert!(conversation.needs_abbreviation, "embedding retry stays flagged");
    }

    #[tokio::test]
    async fn autoname_applies_at_rename_threshold() {
        let fixture = fixture().await;
        // Five turns: the first-naming trigger is due.
        let id = seed_conversation(&fixture.log, &fixture.store, "c1", 5).await;

        let (pipeline, worker) = pipeline_with(
            &fixture,
            Arc::new(CountingSummarizer::default()),
            Arc::new(HashEmbedder),
        );
        tokio::spawn(worker.run());
        pipeline.enqueue(&id).await;
        wait_for_abbreviation(&fixture.store, &id).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let conversation = fixture.store.get_conversation(&id).await.unwrap().unwrap();
        assert!(conversation.title.is_some());
        assert_eq!(conversation.last_renamed_turn, 5);
    }

    #[tokio::test]
    async fn autoname_waits_for_rename_threshold() {
        let fixture = fixture().await;
        // Two turns: too early to name.
        let id = seed_conversation(&fixture.log, &fixture.store, "c1", 2).await;

        let (pipeline, worker) = pipeline_with(
            &fixture,
            Arc::new(CountingSummarizer::default()),
            Arc::new(HashEmbedder),
        );
        tokio::spawn(worker.run());
        pipeline.enqueue(&id).await;
        wait_for_abbreviation(&fixture.store, &id).await;

        let conversation = fixture.store.get_conversation(&id).await.unwrap().unwrap();
        assert!(conversation.title.is_none(), "naming waits for turn 5");
    }

    #[tokio::test]
    async fn manual_title_survives_autoname() {
        let fixture = fixture().await;
        let id = seed_conversation(&fixture.log, &fixture.store, "c1", 8).await;
        fixture.store.set_title_manual(&id, "Ops Channel").await.unwrap();

        let (pipeline, worker) = pipeline_with(
            &fixture,
            Arc::new(CountingSummarizer::default()),
            Arc::new(HashEmbedder),
        );
        tokio::spawn(worker.run());
        pipeline.enqueue(&id).await;
        wait_for_abbreviation(&fixture.store, &id).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let conversation = fixture.store.get_conversation(&id).await.unwrap().unwrap();
        assert_eq!(conversation.title.as_deref(), Some("Ops Channel"));
    }

    #[tokio::test]
    async fn long_abbreviations_are_bounded() {
        let fixture = fixture().await;
        let id = seed_conversation(&fixture.log, &fixture.store, "c1", 2).await;

        let summarizer = Arc::new(CountingSummarizer::with_abbreviation("x".repeat(5000)));
        let (pipeline, worker) =
            pipeline_with(&fixture, summarizer, Arc::new(HashEmbedder));
        tokio::spawn(worker.run());
        pipeline.enqueue(&id).await;
        wait_for_abbreviation(&fixture.store, &id).await;

        let record = fixture.store.get_abbreviation(&id).await.unwrap().unwrap();
        assert_eq!(record.abbreviation.chars().count(), 1024);
    }

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
    }
}
