//! End-to-end retrieval against a LanceDB store
//!
//! LanceDB has no native hybrid query, so these passes exercise the
//! client-side fusion path.

use std::sync::Arc;
use std::time::Duration;

use chronicle_memory::config::{
    LifecycleConfig, RerankMode, RerankerConfig, RetrievalConfig, ScoringConfig, ScoringMethod,
};
use chronicle_memory::debug::{DebugHarness, DebugReport};
use chronicle_memory::embedding::EmbeddingProvider;
use chronicle_memory::injection::InjectionSlot;
use chronicle_memory::lifecycle::{Reconciler, purge_conversation};
use chronicle_memory::memory::conversation::{ConversationTurn, Role};
use chronicle_memory::memory::types::RetrievalResult;
use chronicle_memory::rerank::HttpReranker;
use chronicle_memory::retrieval::{
    RetrievalOrchestrator, RetrievalOutcome, RetrievalRequest, Stage,
};
use chronicle_memory::storage::{LanceStore, collection_id_for};
use chronicle_memory::testing::{BagOfWordsEmbedder, FlakyEmbedder};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONVERSATION: &str = "tavern-night";

const SUMMARY: &str = "### TONE\nwary\n\
### EVENTS\n\
- the bell rang at dusk\n\
- the harbor froze overnight";

async fn indexed_store(embedder: Arc<dyn EmbeddingProvider>) -> (Arc<LanceStore>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LanceStore::connect(temp_dir.path(), embedder).await.unwrap());
    let collection = collection_id_for(CONVERSATION).unwrap();
    Reconciler::new(store.clone(), LifecycleConfig::default())
        .index_summary(&collection, SUMMARY, 0, 12, &[])
        .await
        .unwrap();
    (store, temp_dir)
}

fn request(message: &str) -> RetrievalRequest {
    RetrievalRequest::new(CONVERSATION, vec![ConversationTurn::new(Role::User, message)])
}

fn snapshot(report: &DebugReport, stage: Stage) -> &[RetrievalResult] {
    &report
        .stages
        .iter()
        .find(|s| s.stage == stage)
        .unwrap_or_else(|| panic!("missing stage {stage:?}"))
        .snapshot
}

fn proxied_reranker(server: &MockServer) -> Arc<HttpReranker> {
    let config = RerankerConfig {
        enabled: true,
        mode: RerankMode::Proxied,
        proxy_url: format!("{}/api/rerank", server.uri()),
        ..Default::default()
    };
    Arc::new(
        HttpReranker::new(&config)
            .unwrap()
            .with_backoff(Duration::from_millis(5)),
    )
}

#[tokio::test]
async fn test_retrieve_injects_from_lance() {
    let (store, _dir) = indexed_store(Arc::new(BagOfWordsEmbedder::new())).await;
    let slot = Arc::new(InjectionSlot::new());
    let orchestrator = RetrievalOrchestrator::new(store, RetrievalConfig::default(), slot.clone());

    let outcome = orchestrator
        .retrieve(&request("did the bell ring?"), &CancellationToken::new())
        .await;

    let text = outcome.injected_text().unwrap().to_string();
    assert!(text.starts_with("[Past events]\n"));
    assert!(text.contains("the bell rang at dusk"));
    assert_eq!(slot.current().await, Some(text.clone()));

    let wary = text.find("wary").unwrap();
    let bell = text.find("the bell rang at dusk").unwrap();
    assert!(wary < bell, "superseding snapshot leads");
}

#[tokio::test]
async fn test_threshold_holds_after_scoring() {
    let (store, _dir) = indexed_store(Arc::new(BagOfWordsEmbedder::new())).await;
    let config = RetrievalConfig {
        score_threshold: 0.5,
        scoring: ScoringConfig {
            method: ScoringMethod::Keyword,
            ..Default::default()
        },
        ..Default::default()
    };
    let orchestrator = RetrievalOrchestrator::new(store, config, Arc::new(InjectionSlot::new()));
    let harness = DebugHarness::new(Arc::new(orchestrator));

    let report = harness.run(&request("the bell rang at dusk")).await;

    let kept = snapshot(&report, Stage::Threshold);
    assert!(!kept.is_empty());
    assert!(kept.iter().all(|r| r.score >= 0.5));
}

#[tokio::test]
async fn test_reranker_reorders_and_rescores() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"index": 1, "relevance_score": 0.9},
                {"index": 0, "relevance_score": 0.1}
            ]
        })))
        .mount(&server)
        .await;

    let (store, _dir) = indexed_store(Arc::new(BagOfWordsEmbedder::new())).await;
    // Keyword scoring lets the threshold drop the unrelated tone chunk
    let config = RetrievalConfig {
        score_threshold: 0.1,
        scoring: ScoringConfig {
            method: ScoringMethod::Keyword,
            ..Default::default()
        },
        ..Default::default()
    };
    let orchestrator = RetrievalOrchestrator::new(store, config, Arc::new(InjectionSlot::new()))
        .with_reranker(proxied_reranker(&server));
    let harness = DebugHarness::new(Arc::new(orchestrator));

    let report = harness.run(&request("the bell and the harbor")).await;

    let before = snapshot(&report, Stage::ImportanceBoost);
    let after = snapshot(&report, Stage::Rerank);
    assert_eq!(before.len(), 2, "both event chunks reach the reranker");
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].chunk.text, before[1].chunk.text);
    assert_eq!(after[1].chunk.text, before[0].chunk.text);
    assert!((after[0].score - 0.9).abs() < 1e-6);
    assert!((after[1].score - 0.1).abs() < 1e-6);
}

#[tokio::test]
async fn test_reranker_failure_still_injects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rerank"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let (store, _dir) = indexed_store(Arc::new(BagOfWordsEmbedder::new())).await;
    let slot = Arc::new(InjectionSlot::new());
    let orchestrator = RetrievalOrchestrator::new(store, RetrievalConfig::default(), slot.clone())
        .with_reranker(proxied_reranker(&server));

    let outcome = orchestrator
        .retrieve(&request("did the bell ring?"), &CancellationToken::new())
        .await;

    assert!(matches!(outcome, RetrievalOutcome::Injected { .. }));
    assert!(slot.current().await.unwrap().contains("the bell rang at dusk"));
}

#[tokio::test]
async fn test_embedding_failure_fails_and_clears() {
    let embedder = Arc::new(FlakyEmbedder::new());
    let (store, _dir) = indexed_store(embedder.clone()).await;
    let slot = Arc::new(InjectionSlot::new());
    let orchestrator = RetrievalOrchestrator::new(store, RetrievalConfig::default(), slot.clone());

    let first = orchestrator
        .retrieve(&request("did the bell ring?"), &CancellationToken::new())
        .await;
    assert!(matches!(first, RetrievalOutcome::Injected { .. }));

    embedder.set_failing(true);
    let outcome = orchestrator
        .retrieve(&request("did the bell ring?"), &CancellationToken::new())
        .await;

    match outcome {
        RetrievalOutcome::Failed(reason) => {
            assert!(reason.contains("embedding service unavailable"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(slot.current().await.is_none(), "failed pass clears the injection");
}

#[tokio::test]
async fn test_purged_conversation_retrieves_nothing() {
    let (store, _dir) = indexed_store(Arc::new(BagOfWordsEmbedder::new())).await;
    let collection = collection_id_for(CONVERSATION).unwrap();

    let outcomes = purge_conversation(store.as_ref(), &[collection]).await;
    assert!(outcomes.iter().all(|o| o.is_ok()));

    let orchestrator =
        RetrievalOrchestrator::new(store, RetrievalConfig::default(), Arc::new(InjectionSlot::new()));
    let outcome = orchestrator
        .retrieve(&request("did the bell ring?"), &CancellationToken::new())
        .await;
    assert_eq!(outcome, RetrievalOutcome::Empty);
}
