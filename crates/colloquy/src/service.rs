// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversation service: the narrow interface the rest of the system
//! consumes.
//!
//! Writes land in the transcript log, fan out synchronously to the keyword
//! indexer, and asynchronously (on idle/switch-away) to the abbreviation
//! pipeline feeding the vector index. Reads either hydrate a working
//! context from the log or query search fusion across both indexes. Every
//! index is a rebuildable projection of the log.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use colloquy_config::ColloquyConfig;
use colloquy_core::types::{
    AbbreviationRecord, CompressionEvent, Conversation, ConversationEvent, ConversationId,
    ConversationState, MetaLine, SearchFilters, SearchHit, TitleAssignedEvent, TranscriptLine,
    TurnLine, TurnRole, TurnUsage, now_rfc3339,
};
use colloquy_core::{ColloquyError, EmbedderAdapter, SummarizerAdapter};
use colloquy_index::{IndexStore, KeywordIndexer, SearchFusion};
use colloquy_pipeline::{
    AbbreviationPipeline, LifecycleManager, PipelineWorker, RecoveryManager, RecoveryReport,
    abbreviation_pipeline, spawn_idle_ticker, spawn_retry_sweep,
};
use colloquy_transcript::{ContextHydrator, TranscriptLog, WorkingContext};

/// A turn to append, as received from a channel connector or the UI.
#[derive(Debug, Clone)]
pub struct AppendTurn {
    /// Existing conversation, or `None` to start a new one.
    pub conversation_id: Option<ConversationId>,
    pub channel: String,
    pub role: TurnRole,
    pub content: String,
    pub sender: Option<String>,
    pub usage: Option<TurnUsage>,
}

/// Acknowledgement of a durable, indexed append.
#[derive(Debug, Clone)]
pub struct TurnReceipt {
    pub conversation_id: ConversationId,
    pub turn: u64,
}

/// The conversation persistence & hybrid retrieval core.
pub struct ConversationService {
    config: ColloquyConfig,
    log: Arc<TranscriptLog>,
    store: Arc<IndexStore>,
    keyword: KeywordIndexer,
    fusion: SearchFusion,
    hydrator: ContextHydrator,
    lifecycle: Arc<LifecycleManager>,
    pipeline: Arc<AbbreviationPipeline>,
    recovery: RecoveryManager,
    events: broadcast::Sender<ConversationEvent>,
    /// Per-conversation append lock: turn numbers are totally ordered
    /// within a conversation while independent conversations append in
    /// parallel.
    append_locks: DashMap<ConversationId, Arc<Mutex<()>>>,
    worker: Mutex<Option<PipelineWorker>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConversationService {
    /// Wire up the core against its two external collaborators.
    pub async fn new(
        config: ColloquyConfig,
        summarizer: Arc<dyn SummarizerAdapter>,
        embedder: Arc<dyn EmbedderAdapter>,
    ) -> Result<Self, ColloquyError> {
        let log = Arc::new(TranscriptLog::open(&config.storage.data_dir)?);
        let store = Arc::new(IndexStore::open(&config.storage).await?);
        let (events, _) = broadcast::channel(256);

        let (pipeline, worker) = abbreviation_pipeline(
            log.clone(),
            store.clone(),
            summarizer,
            embedder.clone(),
            config.abbreviation.clone(),
            config.lifecycle.clone(),
            events.clone(),
        );
        let lifecycle = Arc::new(LifecycleManager::new(
            &config.lifecycle,
            store.clone(),
            pipeline.clone(),
            events.clone(),
        ));
        let recovery = RecoveryManager::new(
            log.clone(),
            store.clone(),
            pipeline.clone(),
            embedder.model_id().to_string(),
        );
        let fusion = SearchFusion::new(store.clone(), embedder, config.retrieval.clone());
        let hydrator = ContextHydrator::new(log.clone(), config.context.max_turns);
        let keyword = KeywordIndexer::new(store.clone());

        info!(
            data_dir = %config.storage.data_dir,
            database = %config.storage.database_path,
            "conversation service ready"
        );
        Ok(Self {
            config,
            log,
            store,
            keyword,
            fusion,
            hydrator,
            lifecycle,
            pipeline,
            recovery,
            events,
            append_locks: DashMap::new(),
            worker: Mutex::new(Some(worker)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the background machinery: the abbreviation worker, the idle
    /// ticker, and the retry sweep. Idempotent; the worker runs once.
    pub async fn start_background(&self) {
        let mut tasks = self.tasks.lock().await;
        if let Some(worker) = self.worker.lock().await.take() {
            tasks.push(tokio::spawn(worker.run()));
            tasks.push(spawn_idle_ticker(
                self.lifecycle.clone(),
                std::time::Duration::from_secs(self.config.lifecycle.idle_tick_secs),
            ));
            tasks.push(spawn_retry_sweep(
                self.pipeline.clone(),
                self.store.clone(),
                std::time::Duration::from_secs(self.config.lifecycle.retry_sweep_secs),
            ));
            debug!("background tasks started");
        }
    }

    /// Reconcile the indexes against the transcript log and re-enqueue
    /// unfinished background work. Call once on startup.
    pub async fn recover(&self) -> Result<RecoveryReport, ColloquyError> {
        self.recovery.recover().await
    }

    /// Stop background tasks and checkpoint the index store.
    pub async fn shutdown(&self) -> Result<(), ColloquyError> {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.store.close().await
    }

    /// Subscribe to fire-and-forget push notifications. A receiver that
    /// lags past the channel capacity misses events and reconciles via
    /// pull.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    /// Append one turn. Returns after the turn is durably on disk and
    /// keyword-indexed; this is the only operation allowed to fail loudly,
    /// and only once the log's internal retry is exhausted.
    pub async fn append_turn(&self, request: AppendTurn) -> Result<TurnReceipt, ColloquyError> {
        let id = match &request.conversation_id {
            Some(id) => id.clone(),
            None => self.create_conversation(&request).await?,
        };

        let lock = self
            .append_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let _guard = lock.lock().await;

        let conversation = self
            .store
            .get_conversation(&id)
            .await?
            .ok_or_else(|| ColloquyError::NotFound(id.to_string()))?;

        // A user line opens the next turn; an assistant line closes the
        // current one.
        let turn = match request.role {
            TurnRole::User => conversation.turn_count + 1,
            TurnRole::Assistant => conversation.turn_count.max(1),
        };

        let line = TurnLine {
            role: request.role,
            content: request.content.clone(),
            turn,
            at: now_rfc3339(),
            channel: (request.channel != conversation.channel)
                .then(|| request.channel.clone()),
            sender: request.sender.clone(),
            usage: request.usage.clone(),
        };
        self.log.append(&id, &TranscriptLine::Turn(line.clone())).await?;
        // Synchronous fan-out: keyword search reflects this turn within the
        // same request cycle. Failure is non-fatal (repaired on recovery).
        self.keyword.on_turn_appended(&id, &line).await;

        self.store
            .record_turn_count(&id, turn.max(conversation.turn_count))
            .await?;
        self.lifecycle.on_turn(&id, conversation.state).await?;

        Ok(TurnReceipt {
            conversation_id: id,
            turn,
        })
    }

    /// Rebuild a bounded working context for the conversational engine.
    pub async fn hydrate_context(
        &self,
        id: &ConversationId,
    ) -> Result<WorkingContext, ColloquyError> {
        self.hydrator.hydrate(id).await
    }

    /// Record a compression marker. This core records the event; it does
    /// not itself compress anything, and there is no other side effect.
    pub async fn on_compression(
        &self,
        id: &ConversationId,
        compressed_through: u64,
        summary: &str,
    ) -> Result<(), ColloquyError> {
        self.log
            .append(
                id,
                &TranscriptLine::Compression(CompressionEvent {
                    compressed_through,
                    summary: summary.to_string(),
                    at: now_rfc3339(),
                }),
            )
            .await?;
        self.lifecycle.on_compression(id).await
    }

    /// Hybrid search over both indexes, fused with RRF.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>, ColloquyError> {
        self.fusion.search(query, filters).await
    }

    /// Raw turns for an inclusive range, for deep-dive after search.
    pub async fn fetch_turns(
        &self,
        id: &ConversationId,
        from_turn: u64,
        to_turn: u64,
    ) -> Result<Vec<TurnLine>, ColloquyError> {
        self.store.fetch_turns(id, from_turn, to_turn).await
    }

    /// Explicit user rename: applies the title and protects it from
    /// auto-naming for good.
    pub async fn rename(&self, id: &ConversationId, title: &str) -> Result<(), ColloquyError> {
        self.store.set_title_manual(id, title).await?;
        self.log
            .append(
                id,
                &TranscriptLine::TitleAssigned(TitleAssignedEvent {
                    title: title.to_string(),
                    topics: vec![],
                    manual: true,
                    at: now_rfc3339(),
                }),
            )
            .await?;
        let _ = self.events.send(ConversationEvent::Renamed {
            id: id.clone(),
            title: title.to_string(),
        });
        info!(conversation_id = %id, title, "conversation renamed by user");
        Ok(())
    }

    /// The conversation was switched away from: transition to Idle now and
    /// enqueue one abbreviation task. Never blocks on the pipeline.
    pub async fn switch_away(&self, id: &ConversationId) -> Result<(), ColloquyError> {
        self.lifecycle.switch_away(id).await
    }

    /// Pull access for UI reconciliation.
    pub async fn conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, ColloquyError> {
        self.store.get_conversation(id).await
    }

    /// All conversations, most recently updated first.
    pub async fn conversations(&self) -> Result<Vec<Conversation>, ColloquyError> {
        self.store.list_conversations().await
    }

    /// Current abbreviation record, if the pipeline has produced one.
    pub async fn abbreviation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<AbbreviationRecord>, ColloquyError> {
        self.store.get_abbreviation(id).await
    }

    async fn create_conversation(
        &self,
        request: &AppendTurn,
    ) -> Result<ConversationId, ColloquyError> {
        let id = ConversationId::generate();
        let now = now_rfc3339();
        let participants: Vec<String> = request.sender.iter().cloned().collect();

        self.log
            .append(
                &id,
                &TranscriptLine::Meta(MetaLine {
                    conversation_id: id.clone(),
                    channel: request.channel.clone(),
                    created_at: now.clone(),
                    participants: participants.clone(),
                }),
            )
            .await?;
        self.store
            .create_conversation(&Conversation {
                id: id.clone(),
                channel: request.channel.clone(),
                title: None,
                topics: vec![],
                turn_count: 0,
                participants,
                abbreviation: None,
                needs_abbreviation: false,
                manually_named: false,
                state: ConversationState::Created,
                last_renamed_turn: 0,
                created_at: now.clone(),
                updated_at: now,
            })
            .await?;

        let _ = self.events.send(ConversationEvent::Created {
            id: id.clone(),
            channel: request.channel.clone(),
        });
        info!(conversation_id = %id, channel = %request.channel, "conversation created");
        Ok(id)
    }
}
