//! External reranking
//!
//! The service returns whatever JSON the upstream produced; the adapter
//! resolves it into a permutation of the input documents. Adapter failures
//! never propagate: they become [`RerankOutcome::Failure`] carrying the
//! original order.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::{ChronicleError, Result};

pub use http::{HttpReranker, RerankTransport};

const RESULT_ARRAY_KEYS: &[&str] = &["results", "data"];
const INDEX_KEYS: &[&str] = &["index", "document_index", "corpus_id"];
const SCORE_KEYS: &[&str] = &[
    "relevance_score",
    "relevanceScore",
    "score",
    "rerank_score",
    "logit",
];

/// Upstream reranking service
#[async_trait]
pub trait RerankerService: Send + Sync {
    /// Raw response body for ranking `documents` against `query`.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Value>;

    fn name(&self) -> &str;
}

/// Adapter result
#[derive(Debug, Clone, PartialEq)]
pub enum RerankOutcome {
    /// `order` lists original indices, best first; `scores` is indexed by
    /// original position.
    Success {
        order: Vec<usize>,
        scores: Vec<Option<f32>>,
    },
    /// Reranking failed; `order` is the identity permutation.
    Failure { reason: String, order: Vec<usize> },
}

impl RerankOutcome {
    pub fn order(&self) -> &[usize] {
        match self {
            RerankOutcome::Success { order, .. } | RerankOutcome::Failure { order, .. } => order,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RerankOutcome::Success { .. })
    }

    fn failure(reason: impl Into<String>, count: usize) -> Self {
        RerankOutcome::Failure {
            reason: reason.into(),
            order: (0..count).collect(),
        }
    }
}

/// Rerank `documents`, degrading to the original order on any failure.
pub async fn rerank_documents(
    service: &dyn RerankerService,
    query: &str,
    documents: &[String],
) -> RerankOutcome {
    if documents.is_empty() {
        return RerankOutcome::Success {
            order: Vec::new(),
            scores: Vec::new(),
        };
    }

    let response = match service.rerank(query, documents).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Reranker {} failed: {}", service.name(), e);
            return RerankOutcome::failure(e.to_string(), documents.len());
        }
    };

    match resolve_order(&response, documents.len()) {
        Ok((order, scores)) => RerankOutcome::Success { order, scores },
        Err(e) => {
            warn!("Reranker {} returned unusable response: {}", service.name(), e);
            RerankOutcome::failure(e.to_string(), documents.len())
        }
    }
}

/// Resolve an upstream response into `(order, scores)` over `count` documents.
///
/// Scored documents come first by descending score. Documents that are
/// unscored or never mentioned follow in original order. Out-of-range and
/// repeated indices are ignored.
pub fn resolve_order(response: &Value, count: usize) -> Result<(Vec<usize>, Vec<Option<f32>>)> {
    let entries = result_array(response)
        .ok_or_else(|| ChronicleError::Rerank("No result array in response".to_string()))?;

    let mut scores: Vec<Option<f32>> = vec![None; count];
    let mut seen = vec![false; count];
    for (position, entry) in entries.iter().enumerate() {
        let index = match entry_index(entry) {
            Some(index) => index,
            // Bare score arrays are positional
            None if entry.is_number() => position,
            None => continue,
        };
        if index >= count || seen[index] {
            continue;
        }
        seen[index] = true;
        scores[index] = entry_score(entry);
    }

    let mut scored: Vec<usize> = (0..count).filter(|&i| scores[i].is_some()).collect();
    scored.sort_by(|&a, &b| {
        let (sa, sb) = (scores[a].unwrap_or(f32::MIN), scores[b].unwrap_or(f32::MIN));
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut order = scored;
    order.extend((0..count).filter(|&i| scores[i].is_none()));

    Ok((order, scores))
}

fn result_array(response: &Value) -> Option<&Vec<Value>> {
    if let Some(array) = response.as_array() {
        return Some(array);
    }
    RESULT_ARRAY_KEYS
        .iter()
        .find_map(|key| response.get(*key).and_then(Value::as_array))
}

fn entry_index(entry: &Value) -> Option<usize> {
    INDEX_KEYS.iter().find_map(|key| {
        let value = entry.get(*key)?;
        value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
            .map(|i| i as usize)
    })
}

fn entry_score(entry: &Value) -> Option<f32> {
    entry
        .as_f64()
        .or_else(|| {
            SCORE_KEYS
                .iter()
                .find_map(|key| entry.get(*key).and_then(Value::as_f64))
        })
        .map(|score| score as f32)
        .filter(|score| score.is_finite())
}
