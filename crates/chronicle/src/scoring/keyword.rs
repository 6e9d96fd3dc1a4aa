//! Token-overlap keyword boost
//!
//! Each distinct query token earns at most one credit: an exact hit in the
//! chunk's keyword list, else an exact hit in its text, else a partial
//! substring hit against either.

use std::collections::HashSet;

use crate::config::ScoringConfig;
use crate::lexical::tokenize;
use crate::memory::types::MemoryChunk;

/// Shortest token allowed to earn partial credit
const MIN_PARTIAL_LEN: usize = 3;

pub fn keyword_boost(query_tokens: &[String], chunk: &MemoryChunk, config: &ScoringConfig) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }

    let keyword_tokens: HashSet<String> = chunk
        .metadata
        .keywords
        .iter()
        .flat_map(|k| tokenize(k))
        .collect();
    let text_tokens: HashSet<String> = tokenize(&chunk.text).into_iter().collect();

    let mut seen = HashSet::new();
    let mut boost = 0.0;
    for token in query_tokens {
        if !seen.insert(token.as_str()) {
            continue;
        }
        if keyword_tokens.contains(token) {
            boost += config.keyword_field_boost;
        } else if text_tokens.contains(token) {
            boost += config.keyword_token_boost;
        } else if partial_match(token, keyword_tokens.iter().chain(&text_tokens)) {
            boost += config.keyword_partial_boost;
        }
    }
    boost
}

fn partial_match<'a>(token: &str, candidates: impl IntoIterator<Item = &'a String>) -> bool {
    if token.len() < MIN_PARTIAL_LEN {
        return false;
    }
    candidates.into_iter().any(|candidate| {
        candidate.len() >= MIN_PARTIAL_LEN
            && (candidate.contains(token) || token.contains(candidate.as_str()))
    })
}
