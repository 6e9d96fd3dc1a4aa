//! Retrieval orchestrator
//!
//! One pass runs these stages strictly in order:
//!
//! 1. Build the speaker-labeled query from recent turns
//! 2. Query the store for an overfetched candidate set
//! 3. Dedup
//! 4. Score
//! 5. Threshold
//! 6. Same-scene expansion
//! 7. Merge and dedup again
//! 8. Drop echoes of the protected message window
//! 9. Importance boost
//! 10. Optional rerank
//! 11. Truncate to the insert count
//! 12. Presentation order
//! 13. Format through the template
//!
//! Cancellation is checked once, on entry. Failures of the store query end
//! the pass with [`RetrievalOutcome::Failed`]; failures of scene expansion
//! and reranking only degrade it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{RetrievalConfig, ScoringMethod};
use crate::injection::{Injector, format_results};
use crate::memory::conversation::{
    ConversationTurn, build_query_text, normalize_message, protected_window,
};
use crate::memory::types::{ChunkBehavior, MemoryChunk, RetrievalResult};
use crate::rerank::{RerankOutcome, RerankerService, rerank_documents};
use crate::retrieval::dedup::dedupe_results;
use crate::retrieval::ordering::order_for_presentation;
use crate::scoring::{apply_importance_boost, score_candidates};
use crate::storage::{
    ChunkRecord, ListOptions, MetadataFilter, QueryParams, ScoredRecord, VectorStore,
    collection_id_for,
};

/// Kind of generation that triggered the pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationType {
    #[default]
    Normal,
    Continue,
    Swipe,
    Regenerate,
    Impersonate,
    /// Background generation; never retrieves
    Quiet,
}

/// Input for one retrieval pass
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub conversation_id: String,
    pub turns: Vec<ConversationTurn>,
    pub generation: GenerationType,
}

impl RetrievalRequest {
    pub fn new(conversation_id: impl Into<String>, turns: Vec<ConversationTurn>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            turns,
            generation: GenerationType::Normal,
        }
    }

    pub fn with_generation(mut self, generation: GenerationType) -> Self {
        self.generation = generation;
        self
    }
}

/// Why a pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    QuietGeneration,
    Disabled,
    MissingCollection,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::QuietGeneration => "quiet generation",
            SkipReason::Disabled => "retrieval disabled",
            SkipReason::MissingCollection => "no collection for conversation",
            SkipReason::Cancelled => "cancelled",
        };
        f.write_str(reason)
    }
}

/// Result of one pass
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    Injected {
        text: String,
        results: Vec<RetrievalResult>,
    },
    Empty,
    Skipped(SkipReason),
    Failed(String),
}

impl RetrievalOutcome {
    pub fn injected_text(&self) -> Option<&str> {
        match self {
            RetrievalOutcome::Injected { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            RetrievalOutcome::Injected { results, .. } => {
                format!("injected {} chunks", results.len())
            }
            RetrievalOutcome::Empty => "empty".to_string(),
            RetrievalOutcome::Skipped(reason) => format!("skipped: {reason}"),
            RetrievalOutcome::Failed(reason) => format!("failed: {reason}"),
        }
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    QueryText,
    StoreQuery,
    Dedup,
    Score,
    Threshold,
    SceneExpansion,
    MergeDedup,
    ProtectedWindow,
    ImportanceBoost,
    Rerank,
    Truncate,
    Order,
    Format,
}

/// Receives every stage's output as the pass runs
pub trait StageObserver: Send {
    fn on_query(&mut self, _query: &str) {}

    fn on_stage(
        &mut self,
        stage: Stage,
        input_count: usize,
        results: &[RetrievalResult],
        elapsed: Duration,
    );
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn on_stage(&mut self, _: Stage, _: usize, _: &[RetrievalResult], _: Duration) {}
}

/// Runs retrieval passes against one store
pub struct RetrievalOrchestrator {
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
    injector: Arc<dyn Injector>,
    reranker: Option<Arc<dyn RerankerService>>,
}

impl RetrievalOrchestrator {
    pub fn new(
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
        injector: Arc<dyn Injector>,
    ) -> Self {
        Self {
            store,
            config,
            injector,
            reranker: None,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn RerankerService>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Run a pass and update the injector. Anything but an injection clears it.
    pub async fn retrieve(
        &self,
        request: &RetrievalRequest,
        cancel: &CancellationToken,
    ) -> RetrievalOutcome {
        let outcome = self.evaluate(request, cancel, &mut NoopObserver).await;
        match &outcome {
            RetrievalOutcome::Injected { text, .. } => self.injector.inject(text.clone()).await,
            _ => self.injector.clear().await,
        }
        debug!("Retrieval for {}: {}", request.conversation_id, outcome.label());
        outcome
    }

    /// Run a pass without touching the injector.
    pub async fn evaluate(
        &self,
        request: &RetrievalRequest,
        cancel: &CancellationToken,
        observer: &mut dyn StageObserver,
    ) -> RetrievalOutcome {
        if cancel.is_cancelled() {
            return RetrievalOutcome::Skipped(SkipReason::Cancelled);
        }
        if request.generation == GenerationType::Quiet {
            return RetrievalOutcome::Skipped(SkipReason::QuietGeneration);
        }
        if !self.config.enabled {
            return RetrievalOutcome::Skipped(SkipReason::Disabled);
        }
        let Some(collection_id) = collection_id_for(&request.conversation_id) else {
            return RetrievalOutcome::Skipped(SkipReason::MissingCollection);
        };

        // 1. query text
        let started = Instant::now();
        let query = build_query_text(&request.turns, self.config.query_turns);
        observer.on_query(&query);
        observer.on_stage(Stage::QueryText, request.turns.len(), &[], started.elapsed());
        if query.is_empty() {
            return RetrievalOutcome::Empty;
        }

        // 2. store query
        let started = Instant::now();
        let params = self.query_params();
        let records = match self.query_store(&collection_id, &query, &params).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Store query failed for {}: {}", collection_id, e);
                return RetrievalOutcome::Failed(e.to_string());
            }
        };
        let candidates = to_results(records);
        debug!("Store returned {} candidates (top_k {})", candidates.len(), params.top_k);
        observer.on_stage(Stage::StoreQuery, params.top_k, &candidates, started.elapsed());

        // 3. dedup
        let results = run_stage(observer, Stage::Dedup, candidates, dedupe_results);

        // 4. score
        let results = run_stage(observer, Stage::Score, results, |r| {
            score_candidates(&r, &query, &self.config.scoring, params.hybrid)
        });

        // 5. threshold
        let threshold = self.config.score_threshold;
        let results = run_stage(observer, Stage::Threshold, results, |mut r| {
            r.retain(|c| c.score >= threshold);
            r
        });

        // 6. scene expansion
        let started = Instant::now();
        let input_count = results.len();
        let expanded = self.expand_scenes(&collection_id, &results).await;
        observer.on_stage(Stage::SceneExpansion, input_count, &expanded, started.elapsed());

        // 7. merge
        let results = run_stage(observer, Stage::MergeDedup, results, |mut r| {
            r.extend(expanded);
            dedupe_results(r)
        });

        // 8. protected window
        let protected = protected_window(&request.turns, self.config.protected_messages);
        let results = run_stage(observer, Stage::ProtectedWindow, results, |mut r| {
            r.retain(|c| !protected.contains(&normalize_message(&c.chunk.text)));
            r
        });

        // 9. importance
        let results = run_stage(observer, Stage::ImportanceBoost, results, apply_importance_boost);

        // 10. rerank
        let started = Instant::now();
        let input_count = results.len();
        let results = self.rerank(&query, results).await;
        observer.on_stage(Stage::Rerank, input_count, &results, started.elapsed());

        // 11. truncate
        let insert_count = self.config.insert_count;
        let results = run_stage(observer, Stage::Truncate, results, |mut r| {
            r.truncate(insert_count);
            r
        });

        // 12. order
        let results = run_stage(observer, Stage::Order, results, order_for_presentation);

        // 13. format
        let started = Instant::now();
        let text = format_results(&self.config.template, &results);
        observer.on_stage(Stage::Format, results.len(), &results, started.elapsed());

        match text {
            Some(text) => RetrievalOutcome::Injected { text, results },
            None => RetrievalOutcome::Empty,
        }
    }

    fn query_params(&self) -> QueryParams {
        let want_hybrid = self.config.scoring.method == ScoringMethod::Hybrid;
        self.store.backend().profile().query_params(
            self.config.insert_count,
            self.config.score_threshold,
            want_hybrid,
            self.config.overfetch,
        )
    }

    async fn query_store(
        &self,
        collection_id: &str,
        query: &str,
        params: &QueryParams,
    ) -> crate::error::Result<Vec<ScoredRecord>> {
        if params.hybrid {
            self.store
                .hybrid_query(collection_id, query, params.top_k, params.threshold)
                .await
        } else {
            self.store
                .query(collection_id, query, params.top_k, params.threshold)
                .await
        }
    }

    /// Same-scene chunks for the scene codes among `results`.
    ///
    /// Each added chunk takes the score of the result that carried its scene
    /// code. A failed scene lookup skips that scene only.
    async fn expand_scenes(
        &self,
        collection_id: &str,
        results: &[RetrievalResult],
    ) -> Vec<RetrievalResult> {
        let expansion = &self.config.scene_expansion;
        if !expansion.enabled || expansion.max_chunks == 0 {
            return Vec::new();
        }

        let mut scenes: Vec<(&str, f32)> = Vec::new();
        for result in results {
            if !matches!(
                result.chunk.behavior(),
                ChunkBehavior::Cumulative | ChunkBehavior::Legacy
            ) {
                continue;
            }
            if let Some(code) = result.chunk.scene_code() {
                if !scenes.iter().any(|(c, _)| *c == code) {
                    scenes.push((code, result.score));
                }
            }
        }

        let mut present: HashSet<u64> = results.iter().map(|r| r.chunk.hash).collect();
        let mut budget = expansion.max_chunks;
        let mut expanded = Vec::new();

        for (scene_code, score) in scenes {
            if budget == 0 {
                break;
            }
            let filter = MetadataFilter::new()
                .with_behaviors(vec![ChunkBehavior::Cumulative, ChunkBehavior::Legacy])
                .with_scene_code(scene_code);
            let records = match self
                .store
                .list(collection_id, &ListOptions::default().with_filter(filter))
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    warn!("Scene expansion for {} failed: {}", scene_code, e);
                    continue;
                }
            };

            for record in records {
                if budget == 0 {
                    break;
                }
                if present.contains(&record.hash) {
                    continue;
                }
                let Some(chunk) = to_chunk(record) else {
                    continue;
                };
                present.insert(chunk.hash);
                expanded.push(RetrievalResult::new(chunk, score));
                budget -= 1;
            }
        }

        debug!("Scene expansion added {} chunks", expanded.len());
        expanded
    }

    async fn rerank(&self, query: &str, results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
        let Some(reranker) = &self.reranker else {
            return results;
        };
        if results.is_empty() {
            return results;
        }

        let documents: Vec<String> = results.iter().map(|r| r.chunk.text.clone()).collect();
        match rerank_documents(reranker.as_ref(), query, &documents).await {
            RerankOutcome::Success { order, scores } => {
                let mut slots: Vec<Option<RetrievalResult>> = results.into_iter().map(Some).collect();
                order
                    .into_iter()
                    .filter_map(|i| {
                        let mut result = slots.get_mut(i)?.take()?;
                        if let Some(score) = scores.get(i).copied().flatten() {
                            result.score = score;
                        }
                        Some(result)
                    })
                    .collect()
            }
            RerankOutcome::Failure { reason, .. } => {
                debug!("Keeping score order after rerank failure: {}", reason);
                results
            }
        }
    }
}

fn run_stage(
    observer: &mut dyn StageObserver,
    stage: Stage,
    input: Vec<RetrievalResult>,
    f: impl FnOnce(Vec<RetrievalResult>) -> Vec<RetrievalResult>,
) -> Vec<RetrievalResult> {
    let started = Instant::now();
    let input_count = input.len();
    let output = f(input);
    debug!("Stage {:?}: {} -> {}", stage, input_count, output.len());
    observer.on_stage(stage, input_count, &output, started.elapsed());
    output
}

fn to_chunk(record: ChunkRecord) -> Option<MemoryChunk> {
    let hash = record.hash;
    match MemoryChunk::try_from(record) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            warn!("Skipping stored chunk {} with unreadable metadata: {}", hash, e);
            None
        }
    }
}

fn to_results(records: Vec<ScoredRecord>) -> Vec<RetrievalResult> {
    records
        .into_iter()
        .filter_map(|scored| {
            let score = scored.score;
            to_chunk(scored.record).map(|chunk| RetrievalResult::new(chunk, score))
        })
        .collect()
}
