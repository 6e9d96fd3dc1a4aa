//! Presentation order for injected chunks
//!
//! Order: the superseding snapshot, then scenes in chronological order with
//! each scene's chunks ascending by freshness, then scene-less cumulative
//! chunks ascending by freshness, then rolling entries by score, then the
//! rest by score.

use crate::memory::types::{ChunkBehavior, RetrievalResult};
use crate::retrieval::dedup::dedupe_exact;
use crate::scoring::sort_by_score;

pub fn order_for_presentation(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut superseding = Vec::new();
    // (scene code, chunks) in first-appearance order
    let mut scenes: Vec<(String, Vec<RetrievalResult>)> = Vec::new();
    let mut sceneless = Vec::new();
    let mut rolling = Vec::new();
    let mut remainder = Vec::new();

    for result in results {
        match result.chunk.behavior() {
            ChunkBehavior::Superseding => superseding.push(result),
            ChunkBehavior::Cumulative => match result.chunk.scene_code().map(str::to_string) {
                Some(code) => match scenes.iter_mut().find(|(c, _)| *c == code) {
                    Some((_, chunks)) => chunks.push(result),
                    None => scenes.push((code, vec![result])),
                },
                None => sceneless.push(result),
            },
            ChunkBehavior::Rolling => rolling.push(result),
            ChunkBehavior::Legacy => remainder.push(result),
        }
    }

    for (_, chunks) in &mut scenes {
        chunks.sort_by_key(|r| r.chunk.freshness());
    }
    scenes.sort_by_key(|(_, chunks)| chunks.first().map(|r| r.chunk.freshness()).unwrap_or(0));
    sceneless.sort_by_key(|r| r.chunk.freshness());

    rolling.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let key = |r: &RetrievalResult| r.chunk.metadata.section_type.map(|s| s.key());
                key(a).cmp(&key(b))
            })
    });
    sort_by_score(&mut remainder);

    let ordered = superseding
        .into_iter()
        .chain(scenes.into_iter().flat_map(|(_, chunks)| chunks))
        .chain(sceneless)
        .chain(rolling)
        .chain(remainder)
        .collect();
    dedupe_exact(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{ChunkMetadata, MemoryChunk, SectionType};

    fn make(
        behavior: ChunkBehavior,
        text: &str,
        freshness: u64,
        scene: Option<&str>,
        score: f32,
    ) -> RetrievalResult {
        let mut metadata = ChunkMetadata::new(behavior, 0, freshness);
        metadata.scene_code = scene.map(str::to_string);
        RetrievalResult::new(MemoryChunk::new(text.to_string(), 0, metadata), score)
    }

    fn texts(results: &[RetrievalResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk.text.as_str()).collect()
    }

    #[test]
    fn test_full_presentation_order() {
        let mut rolling_low = make(ChunkBehavior::Rolling, "rolling low", 5, None, 0.2);
        rolling_low.chunk.metadata.section_type = Some(SectionType::Callbacks);
        let mut rolling_high = make(ChunkBehavior::Rolling, "rolling high", 5, None, 0.9);
        rolling_high.chunk.metadata.section_type = Some(SectionType::LooseThreads);

        let input = vec![
            make(ChunkBehavior::Legacy, "legacy", 1, None, 0.4),
            rolling_low,
            make(ChunkBehavior::Cumulative, "s2 late", 40, Some("S2:1"), 0.9),
            make(ChunkBehavior::Cumulative, "loose", 15, None, 0.1),
            make(ChunkBehavior::Cumulative, "s1 late", 30, Some("S1:1"), 0.8),
            make(ChunkBehavior::Superseding, "snapshot", 50, None, 0.1),
            make(ChunkBehavior::Cumulative, "s2 early", 12, Some("S2:1"), 0.3),
            make(ChunkBehavior::Cumulative, "s1 early", 20, Some("S1:1"), 0.7),
            rolling_high,
        ];

        let ordered = order_for_presentation(input);
        assert_eq!(
            texts(&ordered),
            vec![
                "snapshot",
                "s2 early",
                "s2 late",
                "s1 early",
                "s1 late",
                "loose",
                "rolling high",
                "rolling low",
                "legacy"
            ]
        );
    }

    #[test]
    fn test_rolling_ties_break_by_section() {
        let mut threads = make(ChunkBehavior::Rolling, "thread", 5, None, 0.5);
        threads.chunk.metadata.section_type = Some(SectionType::LooseThreads);
        let mut callbacks = make(ChunkBehavior::Rolling, "callback", 5, None, 0.5);
        callbacks.chunk.metadata.section_type = Some(SectionType::Callbacks);

        let ordered = order_for_presentation(vec![threads, callbacks]);
        assert_eq!(texts(&ordered), vec!["callback", "thread"]);
    }

    #[test]
    fn test_final_pass_drops_exact_duplicates() {
        let a = make(ChunkBehavior::Legacy, "same", 1, None, 0.4);
        let ordered = order_for_presentation(vec![a.clone(), a]);
        assert_eq!(ordered.len(), 1);
    }
}
