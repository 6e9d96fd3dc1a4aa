//! Retrieval debug harness
//!
//! Replays the orchestrator pipeline through a recording observer. The pass
//! reads the store but never writes it, and the injector is never called.
//! Each run owns its recorder, so concurrent runs share nothing mutable.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::memory::types::RetrievalResult;
use crate::retrieval::{
    RetrievalOrchestrator, RetrievalOutcome, RetrievalRequest, Stage, StageObserver,
};

/// One stage as observed during a debug run
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub input_count: usize,
    pub output_count: usize,
    pub elapsed_ms: f64,
    /// Deep copy of the stage output
    pub snapshot: Vec<RetrievalResult>,
}

/// Full trace of a debug run
#[derive(Debug, Clone, Serialize)]
pub struct DebugReport {
    pub run_id: Uuid,
    pub conversation_id: String,
    pub query: String,
    /// Outcome label, e.g. `injected 3 chunks` or `skipped: quiet generation`
    pub outcome: String,
    /// Text the pass would have injected
    pub would_inject: Option<String>,
    pub stages: Vec<StageRecord>,
}

#[derive(Default)]
struct Recorder {
    query: String,
    stages: Vec<StageRecord>,
}

impl StageObserver for Recorder {
    fn on_query(&mut self, query: &str) {
        self.query = query.to_string();
    }

    fn on_stage(
        &mut self,
        stage: Stage,
        input_count: usize,
        results: &[RetrievalResult],
        elapsed: Duration,
    ) {
        self.stages.push(StageRecord {
            stage,
            input_count,
            output_count: results.len(),
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            snapshot: results.to_vec(),
        });
    }
}

/// Side-effect-free replay of retrieval passes
pub struct DebugHarness {
    orchestrator: Arc<RetrievalOrchestrator>,
}

impl DebugHarness {
    pub fn new(orchestrator: Arc<RetrievalOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn run(&self, request: &RetrievalRequest) -> DebugReport {
        let mut recorder = Recorder::default();
        let outcome = self
            .orchestrator
            .evaluate(request, &CancellationToken::new(), &mut recorder)
            .await;

        let would_inject = match &outcome {
            RetrievalOutcome::Injected { text, .. } => Some(text.clone()),
            _ => None,
        };

        DebugReport {
            run_id: Uuid::new_v4(),
            conversation_id: request.conversation_id.clone(),
            query: recorder.query,
            outcome: outcome.label(),
            would_inject,
            stages: recorder.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LifecycleConfig, RetrievalConfig};
    use crate::injection::{InjectionSlot, Injector};
    use crate::lifecycle::Reconciler;
    use crate::memory::conversation::{ConversationTurn, Role};
    use crate::retrieval::GenerationType;
    use crate::storage::{InMemoryStore, VectorStore, collection_id_for};
    use crate::testing::BagOfWordsEmbedder;

    async fn harness() -> (DebugHarness, Arc<InMemoryStore>, Arc<InjectionSlot>) {
        let store = Arc::new(InMemoryStore::new(Arc::new(BagOfWordsEmbedder::new())));
        let collection = collection_id_for("chat").expect("collection");
        Reconciler::new(store.clone(), LifecycleConfig::default())
            .index_summary(
                &collection,
                "### TONE\nwary\n### EVENTS\n- the bell rang at dusk [S1:1]",
                0,
                10,
                &[],
            )
            .await
            .expect("index");

        let slot = Arc::new(InjectionSlot::new());
        let orchestrator =
            RetrievalOrchestrator::new(store.clone(), RetrievalConfig::default(), slot.clone());
        (DebugHarness::new(Arc::new(orchestrator)), store, slot)
    }

    fn request() -> RetrievalRequest {
        RetrievalRequest::new("chat", vec![ConversationTurn::new(Role::User, "did the bell ring?")])
    }

    #[tokio::test]
    async fn test_report_captures_all_stages() {
        let (harness, _, _) = harness().await;
        let report = harness.run(&request()).await;

        assert_eq!(report.stages.len(), 13);
        assert_eq!(report.query, "User: did the bell ring?");
        assert!(report.outcome.starts_with("injected"));
        let text = report.would_inject.expect("would inject");
        assert!(text.contains("the bell rang at dusk"));

        let store_stage = &report.stages[1];
        assert_eq!(store_stage.stage, Stage::StoreQuery);
        assert_eq!(store_stage.output_count, store_stage.snapshot.len());
    }

    #[tokio::test]
    async fn test_run_has_no_side_effects() {
        let (harness, store, slot) = harness().await;
        slot.inject("untouched".to_string()).await;
        let collection = collection_id_for("chat").expect("collection");
        let before = store.stats(&collection).await.expect("stats");

        harness.run(&request()).await;
        harness.run(&request()).await;

        assert_eq!(store.stats(&collection).await.expect("stats"), before);
        assert_eq!(slot.current().await.as_deref(), Some("untouched"));
    }

    #[tokio::test]
    async fn test_runs_get_distinct_ids() {
        let (harness, _, _) = harness().await;
        let a = harness.run(&request()).await;
        let b = harness.run(&request()).await;
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.stages.len(), b.stages.len());
    }

    #[tokio::test]
    async fn test_skipped_run_reports_reason() {
        let (harness, _, _) = harness().await;
        let report = harness
            .run(&request().with_generation(GenerationType::Quiet))
            .await;
        assert_eq!(report.outcome, "skipped: quiet generation");
        assert!(report.stages.is_empty());
        assert!(report.would_inject.is_none());
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let (harness, _, _) = harness().await;
        let report = harness.run(&request()).await;
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["stages"][0]["stage"], "query_text");
        assert!(json["run_id"].is_string());
    }
}
