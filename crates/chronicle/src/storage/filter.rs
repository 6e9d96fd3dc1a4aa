//! Filter types for chunk list operations
//!
//! Narrows a listing by behavior, scene code, section, or rolling entity.
//! The same filter renders to SQL for LanceDB and evaluates directly against
//! records for the in-memory store.

use crate::memory::types::{ChunkBehavior, SectionType};
use crate::storage::ChunkRecord;

/// Filter criteria over promoted chunk metadata.
///
/// All fields are optional - when `None`, that filter is not applied.
/// Multiple filters are combined with AND logic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    /// Filter by chunk behaviors (OR logic within this filter)
    pub behaviors: Option<Vec<ChunkBehavior>>,
    /// Exact scene code
    pub scene_code: Option<String>,
    /// Single section type
    pub section_type: Option<SectionType>,
    /// Rolling entity key
    pub entity_key: Option<String>,
}

impl MetadataFilter {
    /// Create a new empty filter (no filtering applied)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behaviors(mut self, behaviors: Vec<ChunkBehavior>) -> Self {
        self.behaviors = Some(behaviors);
        self
    }

    pub fn with_scene_code(mut self, scene_code: impl Into<String>) -> Self {
        self.scene_code = Some(scene_code.into());
        self
    }

    pub fn with_section_type(mut self, section_type: SectionType) -> Self {
        self.section_type = Some(section_type);
        self
    }

    pub fn with_entity_key(mut self, entity_key: impl Into<String>) -> Self {
        self.entity_key = Some(entity_key.into());
        self
    }

    /// Build a SQL WHERE clause from this filter.
    /// Returns `None` if no filters are set.
    pub fn to_sql_clause(&self) -> Option<String> {
        let mut conditions = Vec::new();

        if let Some(behaviors) = self.behaviors.as_ref().filter(|b| !b.is_empty()) {
            if let [only] = behaviors.as_slice() {
                conditions.push(format!("behavior = '{}'", only.as_str()));
            } else {
                let in_clause = behaviors
                    .iter()
                    .map(|b| format!("'{}'", b.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ");
                conditions.push(format!("behavior IN ({in_clause})"));
            }
        }

        if let Some(ref scene_code) = self.scene_code {
            conditions.push(format!("scene_code = '{}'", escape(scene_code)));
        }

        if let Some(section_type) = self.section_type {
            conditions.push(format!("section_type = '{}'", section_type.key()));
        }

        if let Some(ref entity_key) = self.entity_key {
            conditions.push(format!("entity_key = '{}'", escape(entity_key)));
        }

        if conditions.is_empty() {
            None
        } else {
            Some(conditions.join(" AND "))
        }
    }

    /// Evaluate the filter against a record's metadata map.
    pub fn matches(&self, record: &ChunkRecord) -> bool {
        let field = |name: &str| record.metadata.get(name).and_then(|v| v.as_str());

        if let Some(behaviors) = self.behaviors.as_ref().filter(|b| !b.is_empty()) {
            let Some(behavior) = field("chunkBehavior").and_then(ChunkBehavior::parse) else {
                return false;
            };
            if !behaviors.contains(&behavior) {
                return false;
            }
        }

        let scene_ok = self
            .scene_code
            .as_deref()
            .is_none_or(|code| field("sceneCode") == Some(code));
        let section_ok = self
            .section_type
            .is_none_or(|section| field("sectionType") == Some(section.key()));
        let entity_ok = self
            .entity_key
            .as_deref()
            .is_none_or(|key| field("entityKey") == Some(key));

        scene_ok && section_ok && entity_ok
    }

    /// Check if this filter is empty (no conditions set)
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_none()
            && self.scene_code.is_none()
            && self.section_type.is_none()
            && self.entity_key.is_none()
    }
}

/// Double single quotes for a SQL string literal.
fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{ChunkMetadata, MemoryChunk};

    fn record(metadata: ChunkMetadata) -> ChunkRecord {
        ChunkRecord::try_from(&MemoryChunk::new("text".to_string(), 0, metadata))
            .expect("Failed to convert chunk")
    }

    #[test]
    fn test_empty_filter() {
        let filter = MetadataFilter::new();
        assert!(filter.is_empty());
        assert!(filter.to_sql_clause().is_none());
    }

    #[test]
    fn test_single_behavior_filter() {
        let filter = MetadataFilter::new().with_behaviors(vec![ChunkBehavior::Rolling]);
        assert_eq!(filter.to_sql_clause().as_deref(), Some("behavior = 'rolling'"));
    }

    #[test]
    fn test_multiple_behaviors_filter() {
        let filter = MetadataFilter::new()
            .with_behaviors(vec![ChunkBehavior::Cumulative, ChunkBehavior::Legacy]);
        assert_eq!(
            filter.to_sql_clause().as_deref(),
            Some("behavior IN ('cumulative', 'legacy')")
        );
    }

    #[test]
    fn test_combined_filters() {
        let filter = MetadataFilter::new()
            .with_scene_code("S1:2")
            .with_section_type(SectionType::Callbacks)
            .with_entity_key("o'brien's ring");

        let sql = filter.to_sql_clause().expect("clause");
        assert!(sql.contains("scene_code = 'S1:2'"));
        assert!(sql.contains("section_type = 'callbacks'"));
        assert!(sql.contains("entity_key = 'o''brien''s ring'"));
        assert!(sql.contains(" AND "));
    }

    #[test]
    fn test_matches_scene_and_behavior() {
        let mut metadata = ChunkMetadata::new(ChunkBehavior::Cumulative, 0, 10);
        metadata.scene_code = Some("S1:1".to_string());
        let rec = record(metadata);

        assert!(MetadataFilter::new().matches(&rec));
        assert!(MetadataFilter::new().with_scene_code("S1:1").matches(&rec));
        assert!(!MetadataFilter::new().with_scene_code("S1:2").matches(&rec));
        assert!(
            MetadataFilter::new()
                .with_behaviors(vec![ChunkBehavior::Cumulative, ChunkBehavior::Legacy])
                .matches(&rec)
        );
        assert!(
            !MetadataFilter::new()
                .with_behaviors(vec![ChunkBehavior::Rolling])
                .matches(&rec)
        );
    }

    #[test]
    fn test_matches_rolling_identity() {
        let mut metadata = ChunkMetadata::new(ChunkBehavior::Rolling, 0, 10);
        metadata.section_type = Some(SectionType::LooseThreads);
        metadata.entity_key = Some("the map".to_string());
        let rec = record(metadata);

        let filter = MetadataFilter::new()
            .with_section_type(SectionType::LooseThreads)
            .with_entity_key("the map");
        assert!(filter.matches(&rec));
        assert!(!filter.with_entity_key("the key").matches(&rec));
    }
}
