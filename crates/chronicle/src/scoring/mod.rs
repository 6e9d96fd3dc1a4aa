//! Candidate scoring
//!
//! Scoring is pure: it takes the candidate batch returned by the store and
//! returns a rescored, re-sorted copy. The BM25 corpus is always the batch
//! itself, never the whole collection.

pub mod fusion;
pub mod keyword;

use crate::config::{FusionMethod, ScoringConfig, ScoringMethod};
use crate::lexical::{Bm25Index, tokenize};
use crate::memory::types::RetrievalResult;

pub use fusion::{min_max_normalize, rank_positions, rrf_fuse, rrf_score, weighted_fuse};
pub use keyword::keyword_boost;

/// Rescore `candidates` for `query` with the configured method.
///
/// `native_hybrid` means the incoming scores are already fused by the
/// backend, so hybrid scoring keeps them as they are.
pub fn score_candidates(
    candidates: &[RetrievalResult],
    query: &str,
    config: &ScoringConfig,
    native_hybrid: bool,
) -> Vec<RetrievalResult> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let priors: Vec<f32> = candidates.iter().map(|c| c.score).collect();
    let bm25 = || {
        Bm25Index::new(
            candidates.iter().map(|c| c.chunk.text.as_str()),
            config.bm25_k1,
            config.bm25_b,
        )
    };

    let scores: Vec<f32> = match config.method {
        ScoringMethod::Keyword => {
            let query_tokens = tokenize(query);
            candidates
                .iter()
                .map(|c| c.score + keyword_boost(&query_tokens, &c.chunk, config))
                .collect()
        }
        ScoringMethod::Bm25 => bm25().normalized_scores(query),
        ScoringMethod::Blended => priors
            .iter()
            .zip(bm25().normalized_scores(query))
            .map(|(prior, lexical)| config.alpha * prior + config.beta * lexical)
            .collect(),
        ScoringMethod::Hybrid if native_hybrid => priors,
        ScoringMethod::Hybrid => {
            let lexical = bm25().scores(query);
            match config.fusion {
                FusionMethod::Rrf => rrf_fuse(&priors, &lexical, config.rrf_k),
                FusionMethod::Weighted => {
                    weighted_fuse(&priors, &lexical, config.alpha, config.beta)
                }
            }
        }
    };

    let mut scored: Vec<RetrievalResult> = candidates
        .iter()
        .zip(scores)
        .map(|(c, score)| RetrievalResult::new(c.chunk.clone(), score))
        .collect();
    sort_by_score(&mut scored);
    scored
}

/// Additive boost for a chunk importance on the 0-100 scale.
pub fn importance_boost(importance: u8) -> f32 {
    (f32::from(importance) - 50.0) / 500.0
}

/// Add the importance boost to every result and re-sort.
pub fn apply_importance_boost(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut boosted: Vec<RetrievalResult> = results
        .into_iter()
        .map(|mut r| {
            r.score += importance_boost(r.chunk.importance());
            r
        })
        .collect();
    sort_by_score(&mut boosted);
    boosted
}

/// Stable sort by score, best first.
pub fn sort_by_score(results: &mut [RetrievalResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
