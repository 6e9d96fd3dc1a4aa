//! Summary classification
//!
//! Turns a structured summary into typed memory chunks. Superseding sections
//! collapse into one composite chunk, cumulative items are grouped by scene
//! code, and rolling items become one chunk per tracked entity.

pub mod items;
pub mod sections;

use tracing::debug;

use crate::memory::types::{
    ChunkBehavior, ChunkMetadata, MemoryChunk, ResolvedEntity, RollingIdentity, SectionType,
};

pub use items::{
    extract_scene_code, parse_status, priority_weight, split_items, strip_presentation_tokens,
};
pub use sections::{Section, split_sections};

const SUPERSEDING_BASE_IMPORTANCE: u8 = 65;
const ITEM_BASE_IMPORTANCE: u8 = 60;
const LEGACY_IMPORTANCE: u8 = 50;

/// Output of classifying one summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub chunks: Vec<MemoryChunk>,
    pub resolved_entities: Vec<ResolvedEntity>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

struct SceneGroup {
    scene_code: Option<String>,
    /// Items per section, sections kept in first-appearance order
    sections: Vec<(SectionType, Vec<String>)>,
}

impl SceneGroup {
    fn push(&mut self, section: SectionType, item: String) {
        match self.sections.iter_mut().find(|(s, _)| *s == section) {
            Some((_, items)) => items.push(item),
            None => self.sections.push((section, vec![item])),
        }
    }

    fn render(&self) -> String {
        if let [(_, items)] = self.sections.as_slice() {
            return items.join("\n");
        }
        self.sections
            .iter()
            .map(|(section, items)| format!("{}:\n{}", section.label(), items.join("\n")))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

struct RollingItem {
    section: SectionType,
    entity_key: String,
    status: Option<String>,
    text: String,
}

/// Classify a `### HEADER` delimited summary covering `[start_index, end_index]`.
///
/// Returns an empty classification when no known section is present; the
/// caller then indexes the text with [`classify_legacy`].
pub fn classify_summary(
    text: &str,
    start_index: u64,
    end_index: u64,
    keywords: &[String],
) -> Classification {
    let sections = split_sections(text);
    if sections.is_empty() {
        debug!("No recognized sections in summary [{}, {}]", start_index, end_index);
        return Classification::default();
    }

    let mut superseding: Vec<&Section> = Vec::new();
    let mut scene_groups: Vec<SceneGroup> = Vec::new();
    let mut rolling: Vec<RollingItem> = Vec::new();

    for section in &sections {
        if section.body.is_empty() {
            continue;
        }
        match section.section_type.behavior() {
            ChunkBehavior::Superseding => superseding.push(section),
            ChunkBehavior::Cumulative | ChunkBehavior::Legacy => {
                for item in split_items(&section.body) {
                    let scene_code = extract_scene_code(&item);
                    match scene_groups.iter_mut().find(|g| g.scene_code == scene_code) {
                        Some(group) => group.push(section.section_type, item),
                        None => {
                            let mut group = SceneGroup {
                                scene_code,
                                sections: Vec::new(),
                            };
                            group.push(section.section_type, item);
                            scene_groups.push(group);
                        }
                    }
                }
            }
            ChunkBehavior::Rolling => {
                for item in split_items(&section.body) {
                    if let Some(parsed) = parse_rolling_item(section.section_type, item) {
                        // a later line for the same entity supersedes the earlier one
                        rolling.retain(|r| {
                            !(r.section == parsed.section && r.entity_key == parsed.entity_key)
                        });
                        rolling.push(parsed);
                    }
                }
            }
        }
    }

    let mut chunks = Vec::new();
    let mut next_position = start_index;
    let mut position = || {
        let p = next_position;
        next_position += 1;
        p
    };

    if !superseding.is_empty() {
        let text = superseding
            .iter()
            .map(|s| render_superseding_section(s))
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut metadata = ChunkMetadata::new(ChunkBehavior::Superseding, start_index, end_index);
        metadata.section_types = superseding.iter().map(|s| s.section_type).collect();
        metadata.importance = SUPERSEDING_BASE_IMPORTANCE.max(priority_weight(&text));
        metadata.keywords = matching_keywords(&text, keywords);
        chunks.push(MemoryChunk::new(text, position(), metadata));
    }

    for group in &scene_groups {
        let text = group.render();
        let mut metadata = ChunkMetadata::new(ChunkBehavior::Cumulative, start_index, end_index);
        metadata.scene_code = group.scene_code.clone();
        metadata.section_types = group.sections.iter().map(|(s, _)| *s).collect();
        if let [(only, _)] = group.sections.as_slice() {
            metadata.section_type = Some(*only);
        }
        metadata.importance = ITEM_BASE_IMPORTANCE.max(priority_weight(&text));
        metadata.keywords = matching_keywords(&text, keywords);
        chunks.push(MemoryChunk::new(text, position(), metadata));
    }

    let mut resolved_entities: Vec<ResolvedEntity> = Vec::new();
    for item in rolling {
        let mut metadata = ChunkMetadata::new(ChunkBehavior::Rolling, start_index, end_index);
        metadata.section_type = Some(item.section);
        metadata.section_types = vec![item.section];
        metadata.entity_key = Some(item.entity_key.clone());
        metadata.status = item.status.clone();
        metadata.scene_code = extract_scene_code(&item.text);
        metadata.importance = ITEM_BASE_IMPORTANCE.max(priority_weight(&item.text));
        metadata.keywords = matching_keywords(&item.text, keywords);

        let terminal = item.section.terminal_status();
        if let Some(status) = item.status.as_deref().filter(|s| terminal == Some(*s)) {
            let identity = RollingIdentity::new(item.section, item.entity_key.clone());
            if !resolved_entities.iter().any(|r| r.identity() == identity) {
                resolved_entities.push(ResolvedEntity {
                    section_type: item.section,
                    entity_key: item.entity_key.clone(),
                    status: status.to_string(),
                });
            }
        }

        chunks.push(MemoryChunk::new(item.text, position(), metadata));
    }

    debug!(
        "Classified summary [{}, {}] into {} chunks ({} resolved entities)",
        start_index,
        end_index,
        chunks.len(),
        resolved_entities.len()
    );

    Classification {
        chunks,
        resolved_entities,
    }
}

/// Whole-text fallback chunk for summaries without recognized structure.
pub fn classify_legacy(
    text: &str,
    start_index: u64,
    end_index: u64,
    keywords: &[String],
) -> MemoryChunk {
    let text = text.trim().to_string();
    let mut metadata = ChunkMetadata::new(ChunkBehavior::Legacy, start_index, end_index);
    metadata.importance = LEGACY_IMPORTANCE;
    metadata.keywords = matching_keywords(&text, keywords);
    MemoryChunk::new(text, start_index, metadata)
}

fn render_superseding_section(section: &Section) -> String {
    if section.body.contains('\n') {
        format!("{}:\n{}", section.section_type.label(), section.body)
    } else {
        format!("{}: {}", section.section_type.label(), section.body)
    }
}

fn parse_rolling_item(section: SectionType, item: String) -> Option<RollingItem> {
    let entity_key = match section {
        SectionType::RelationshipShifts => items::relationship_key(&item),
        _ => items::leading_field_key(&item),
    };
    let Some(entity_key) = entity_key else {
        debug!("Dropping {} item without entity key", section.key());
        return None;
    };
    Some(RollingItem {
        section,
        entity_key,
        status: parse_status(&item),
        text: item,
    })
}

/// Keywords occurring case-insensitively in `text`, deduplicated.
fn matching_keywords(text: &str, keywords: &[String]) -> Vec<String> {
    let haystack = text.to_lowercase();
    let mut found: Vec<String> = Vec::new();
    for keyword in keywords {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() || found.iter().any(|k| k.to_lowercase() == needle) {
            continue;
        }
        if haystack.contains(&needle) {
            found.push(keyword.trim().to_string());
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_and_event_scenario() {
        let text = "### TONE\nfoo\n### EVENTS\n- bar [S1:1]";
        let result = classify_summary(text, 10, 20, &[]);

        assert_eq!(result.chunks.len(), 2);
        let superseding = &result.chunks[0];
        assert_eq!(superseding.behavior(), ChunkBehavior::Superseding);
        assert!(superseding.text.contains("foo"));
        assert_eq!(superseding.importance(), 65);
        assert_eq!(superseding.freshness(), 20);

        let cumulative = &result.chunks[1];
        assert_eq!(cumulative.behavior(), ChunkBehavior::Cumulative);
        assert_eq!(cumulative.scene_code(), Some("S1:1"));
        assert!(cumulative.text.contains("bar"));
        assert_eq!(cumulative.importance(), 60);
        assert_eq!(cumulative.position_index, 11);
    }

    #[test]
    fn test_callback_fired_scenario() {
        let result = classify_summary("### CALLBACKS\nthe bell | status: FIRED", 0, 5, &[]);

        assert_eq!(result.chunks.len(), 1);
        let chunk = &result.chunks[0];
        assert_eq!(chunk.behavior(), ChunkBehavior::Rolling);
        assert_eq!(chunk.metadata.entity_key.as_deref(), Some("the bell"));
        assert_eq!(chunk.metadata.status.as_deref(), Some("FIRED"));
        assert_eq!(
            result.resolved_entities,
            vec![ResolvedEntity {
                section_type: SectionType::Callbacks,
                entity_key: "the bell".to_string(),
                status: "FIRED".to_string(),
            }]
        );
    }

    #[test]
    fn test_no_sections_is_empty() {
        let result = classify_summary("Just a paragraph of prose.", 0, 3, &[]);
        assert!(result.is_empty());
        assert!(result.resolved_entities.is_empty());
    }

    #[test]
    fn test_superseding_sections_merge_into_one_chunk() {
        let text = "### TONE\nGrim\n### WORLD STATE\nWinter\n### VOICE\n🔴 Whispered";
        let result = classify_summary(text, 0, 9, &[]);

        assert_eq!(result.chunks.len(), 1);
        let chunk = &result.chunks[0];
        assert!(chunk.text.contains("Tone: Grim"));
        assert!(chunk.text.contains("World State: Winter"));
        assert_eq!(chunk.metadata.section_types.len(), 3);
        assert_eq!(chunk.importance(), 95);
    }

    #[test]
    fn test_cumulative_grouped_by_scene() {
        let text = "### EVENTS\n- a [S1:1]\n- b [S1:2]\n- c [S1:1]\n### KEY DIALOGUE\n- \"hi\" (S1:2)";
        let result = classify_summary(text, 0, 10, &[]);

        assert_eq!(result.chunks.len(), 2);
        assert_eq!(result.chunks[0].scene_code(), Some("S1:1"));
        assert!(result.chunks[0].text.contains("- a"));
        assert!(result.chunks[0].text.contains("- c"));
        assert_eq!(result.chunks[1].scene_code(), Some("S1:2"));
        assert_eq!(
            result.chunks[1].metadata.section_types,
            vec![SectionType::Events, SectionType::KeyDialogue]
        );
        assert!(result.chunks[1].metadata.section_type.is_none());
    }

    #[test]
    fn test_relationship_without_arrow_dropped() {
        let text = "### RELATIONSHIP SHIFTS\n- [Mira] -> [Ash] warmer\n- they argued";
        let result = classify_summary(text, 0, 4, &[]);

        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].metadata.entity_key.as_deref(), Some("mira->ash"));
    }

    #[test]
    fn test_duplicate_rolling_entity_keeps_last() {
        let text = "### LOOSE THREADS\n- the map | status: OPEN\n- the map | status: RESOLVED";
        let result = classify_summary(text, 0, 4, &[]);

        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].metadata.status.as_deref(), Some("RESOLVED"));
        assert_eq!(result.resolved_entities.len(), 1);
    }

    #[test]
    fn test_chunk_order_and_positions() {
        let text = "### CALLBACKS\n- bell | status: OPEN\n### EVENTS\n- x [S2:1]\n### TONE\ncalm";
        let result = classify_summary(text, 100, 120, &[]);

        let behaviors: Vec<_> = result.chunks.iter().map(|c| c.behavior()).collect();
        assert_eq!(
            behaviors,
            vec![ChunkBehavior::Superseding, ChunkBehavior::Cumulative, ChunkBehavior::Rolling]
        );
        let positions: Vec<_> = result.chunks.iter().map(|c| c.position_index).collect();
        assert_eq!(positions, vec![100, 101, 102]);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let text = "### TONE\nfoo\n### EVENTS\n- bar [S1:1]\n### CALLBACKS\nbell | status: OPEN";
        let first: Vec<u64> = classify_summary(text, 1, 2, &[]).chunks.iter().map(|c| c.hash).collect();
        let second: Vec<u64> = classify_summary(text, 1, 2, &[]).chunks.iter().map(|c| c.hash).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_keywords_attached_when_present() {
        let keywords = vec!["Bell".to_string(), "dragon".to_string()];
        let result = classify_summary("### EVENTS\n- the bell rang", 0, 1, &keywords);
        assert_eq!(result.chunks[0].metadata.keywords, vec!["Bell".to_string()]);
    }

    #[test]
    fn test_legacy_chunk() {
        let chunk = classify_legacy("  plain summary  ", 4, 8, &[]);
        assert_eq!(chunk.behavior(), ChunkBehavior::Legacy);
        assert_eq!(chunk.text, "plain summary");
        assert_eq!(chunk.importance(), 50);
        assert_eq!(chunk.position_index, 4);
    }
}
