//! Behavior-aware deduplication
//!
//! Exact `(hash, text)` duplicates are dropped first. Then only the freshest
//! superseding chunk survives, and only the freshest chunk per rolling
//! identity. Cumulative and legacy chunks pass through.

use std::collections::{HashMap, HashSet};

use crate::memory::types::{ChunkBehavior, RetrievalResult, RollingIdentity};

/// Drop exact `(hash, text)` repeats, keeping the first occurrence.
pub fn dedupe_exact(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert((r.chunk.hash, r.chunk.text.clone())))
        .collect()
}

/// Exact dedup followed by the superseding and rolling collapse.
///
/// Survivors keep their relative order. On equal freshness the earlier
/// candidate wins.
pub fn dedupe_results(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let results = dedupe_exact(results);

    let mut freshest_superseding: Option<usize> = None;
    let mut freshest_rolling: HashMap<RollingIdentity, usize> = HashMap::new();

    for (i, result) in results.iter().enumerate() {
        match result.chunk.behavior() {
            ChunkBehavior::Superseding => {
                let fresher = freshest_superseding
                    .is_none_or(|best| result.chunk.freshness() > results[best].chunk.freshness());
                if fresher {
                    freshest_superseding = Some(i);
                }
            }
            ChunkBehavior::Rolling => {
                let Some(identity) = result.chunk.metadata.rolling_identity() else {
                    continue;
                };
                let best = freshest_rolling.entry(identity).or_insert(i);
                if result.chunk.freshness() > results[*best].chunk.freshness() {
                    *best = i;
                }
            }
            ChunkBehavior::Cumulative | ChunkBehavior::Legacy => {}
        }
    }

    let keep: HashSet<usize> = freshest_superseding
        .into_iter()
        .chain(freshest_rolling.into_values())
        .collect();

    results
        .into_iter()
        .enumerate()
        .filter(|(i, r)| match r.chunk.behavior() {
            ChunkBehavior::Superseding => keep.contains(i),
            ChunkBehavior::Rolling if r.chunk.metadata.rolling_identity().is_some() => {
                keep.contains(i)
            }
            _ => true,
        })
        .map(|(_, r)| r)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{ChunkMetadata, MemoryChunk, SectionType};

    fn result(behavior: ChunkBehavior, text: &str, freshness: u64) -> RetrievalResult {
        let metadata = ChunkMetadata::new(behavior, 0, freshness);
        RetrievalResult::new(MemoryChunk::new(text.to_string(), 0, metadata), 0.5)
    }

    fn rolling(entity: &str, text: &str, freshness: u64) -> RetrievalResult {
        let mut metadata = ChunkMetadata::new(ChunkBehavior::Rolling, 0, freshness);
        metadata.section_type = Some(SectionType::Callbacks);
        metadata.entity_key = Some(entity.to_string());
        RetrievalResult::new(MemoryChunk::new(text.to_string(), 0, metadata), 0.5)
    }

    #[test]
    fn test_exact_duplicates_collapse_to_one() {
        let a = result(ChunkBehavior::Cumulative, "the bell rang", 10);
        let deduped = dedupe_results(vec![a.clone(), a]);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn test_freshest_superseding_wins() {
        let old = result(ChunkBehavior::Superseding, "Tone: calm", 10);
        let new = result(ChunkBehavior::Superseding, "Tone: tense", 20);
        let deduped = dedupe_results(vec![old, new]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].chunk.freshness(), 20);
    }

    #[test]
    fn test_freshest_rolling_per_identity() {
        let deduped = dedupe_results(vec![
            rolling("the bell", "the bell | status: OPEN", 20),
            rolling("the map", "the map | status: OPEN", 5),
            rolling("the bell", "the bell | status: RINGING", 10),
        ]);
        let texts: Vec<&str> = deduped.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["the bell | status: OPEN", "the map | status: OPEN"]);
    }

    #[test]
    fn test_cumulative_and_legacy_pass_through() {
        let deduped = dedupe_results(vec![
            result(ChunkBehavior::Cumulative, "one", 10),
            result(ChunkBehavior::Cumulative, "two", 20),
            result(ChunkBehavior::Legacy, "three", 5),
        ]);
        assert_eq!(deduped.len(), 3);
    }

    #[test]
    fn test_equal_freshness_keeps_first() {
        let deduped = dedupe_results(vec![
            result(ChunkBehavior::Superseding, "first", 10),
            result(ChunkBehavior::Superseding, "second", 10),
        ]);
        assert_eq!(deduped[0].chunk.text, "first");
    }
}
