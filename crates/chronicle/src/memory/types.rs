//! Memory chunk types for the Chronicle system
//!
//! Defines the stored unit of condensed knowledge (`MemoryChunk`), its
//! classification metadata, and the ephemeral retrieval wrapper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::hash::chunk_hash;

/// Update semantics of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkBehavior {
    /// Latest version fully replaces every prior version
    Superseding,
    /// Append-only history, deduplicated by exact hash
    Cumulative,
    /// One live record per tracked entity
    Rolling,
    /// Unclassified whole-summary chunk
    Legacy,
}

impl ChunkBehavior {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkBehavior::Superseding => "superseding",
            ChunkBehavior::Cumulative => "cumulative",
            ChunkBehavior::Rolling => "rolling",
            ChunkBehavior::Legacy => "legacy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "superseding" => Some(ChunkBehavior::Superseding),
            "cumulative" => Some(ChunkBehavior::Cumulative),
            "rolling" => Some(ChunkBehavior::Rolling),
            "legacy" => Some(ChunkBehavior::Legacy),
            _ => None,
        }
    }
}

/// Canonical summary section keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionType {
    Tone,
    CurrentState,
    WorldState,
    CharacterNotes,
    Voice,
    Events,
    KeyDialogue,
    NsfwContent,
    Scenes,
    SceneBreaks,
    CharacterStates,
    Anchors,
    Developments,
    RelationshipShifts,
    Callbacks,
    LooseThreads,
}

impl SectionType {
    pub const ALL: [SectionType; 16] = [
        SectionType::Tone,
        SectionType::CurrentState,
        SectionType::WorldState,
        SectionType::CharacterNotes,
        SectionType::Voice,
        SectionType::Events,
        SectionType::KeyDialogue,
        SectionType::NsfwContent,
        SectionType::Scenes,
        SectionType::SceneBreaks,
        SectionType::CharacterStates,
        SectionType::Anchors,
        SectionType::Developments,
        SectionType::RelationshipShifts,
        SectionType::Callbacks,
        SectionType::LooseThreads,
    ];

    /// camelCase key used in stored metadata
    pub fn key(self) -> &'static str {
        match self {
            SectionType::Tone => "tone",
            SectionType::CurrentState => "currentState",
            SectionType::WorldState => "worldState",
            SectionType::CharacterNotes => "characterNotes",
            SectionType::Voice => "voice",
            SectionType::Events => "events",
            SectionType::KeyDialogue => "keyDialogue",
            SectionType::NsfwContent => "nsfwContent",
            SectionType::Scenes => "scenes",
            SectionType::SceneBreaks => "sceneBreaks",
            SectionType::CharacterStates => "characterStates",
            SectionType::Anchors => "anchors",
            SectionType::Developments => "developments",
            SectionType::RelationshipShifts => "relationshipShifts",
            SectionType::Callbacks => "callbacks",
            SectionType::LooseThreads => "looseThreads",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.key() == key)
    }

    /// Human-readable label used when rendering composite chunks
    pub fn label(self) -> &'static str {
        match self {
            SectionType::Tone => "Tone",
            SectionType::CurrentState => "Current State",
            SectionType::WorldState => "World State",
            SectionType::CharacterNotes => "Character Notes",
            SectionType::Voice => "Voice",
            SectionType::Events => "Events",
            SectionType::KeyDialogue => "Key Dialogue",
            SectionType::NsfwContent => "NSFW Content",
            SectionType::Scenes => "Scenes",
            SectionType::SceneBreaks => "Scene Breaks",
            SectionType::CharacterStates => "Character States",
            SectionType::Anchors => "Anchors",
            SectionType::Developments => "Developments",
            SectionType::RelationshipShifts => "Relationship Shifts",
            SectionType::Callbacks => "Callbacks",
            SectionType::LooseThreads => "Loose Threads",
        }
    }

    /// Fixed behavior class of each section
    pub fn behavior(self) -> ChunkBehavior {
        match self {
            SectionType::Tone
            | SectionType::CurrentState
            | SectionType::WorldState
            | SectionType::CharacterNotes
            | SectionType::Voice => ChunkBehavior::Superseding,
            SectionType::RelationshipShifts | SectionType::Callbacks | SectionType::LooseThreads => {
                ChunkBehavior::Rolling
            }
            _ => ChunkBehavior::Cumulative,
        }
    }

    /// Status that retires a rolling entity for good
    pub fn terminal_status(self) -> Option<&'static str> {
        match self {
            SectionType::Callbacks => Some("FIRED"),
            SectionType::LooseThreads => Some("RESOLVED"),
            _ => None,
        }
    }
}

/// Logical identity of a rolling entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RollingIdentity {
    pub section_type: SectionType,
    pub entity_key: String,
}

impl RollingIdentity {
    pub fn new(section_type: SectionType, entity_key: impl Into<String>) -> Self {
        Self {
            section_type,
            entity_key: entity_key.into(),
        }
    }
}

/// A rolling entity whose status reached its section's terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEntity {
    pub section_type: SectionType,
    pub entity_key: String,
    pub status: String,
}

impl ResolvedEntity {
    pub fn identity(&self) -> RollingIdentity {
        RollingIdentity::new(self.section_type, self.entity_key.clone())
    }
}

/// Classification metadata carried by every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub start_index: u64,
    pub end_index: u64,
    /// Recency ordinal used to resolve competing versions
    pub freshness_end_index: u64,
    pub chunk_behavior: ChunkBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_type: Option<SectionType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub section_types: Vec<SectionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Importance score 0-100
    pub importance: u8,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChunkMetadata {
    /// Metadata for a chunk covering `[start_index, end_index]`, fresh as of `end_index`.
    pub fn new(chunk_behavior: ChunkBehavior, start_index: u64, end_index: u64) -> Self {
        Self {
            start_index,
            end_index,
            freshness_end_index: end_index,
            chunk_behavior,
            scene_code: None,
            section_type: None,
            section_types: Vec::new(),
            entity_key: None,
            status: None,
            importance: 50,
            keywords: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Identity of a rolling chunk; `None` for every other behavior.
    pub fn rolling_identity(&self) -> Option<RollingIdentity> {
        if self.chunk_behavior != ChunkBehavior::Rolling {
            return None;
        }
        match (self.section_type, &self.entity_key) {
            (Some(section), Some(key)) => Some(RollingIdentity::new(section, key.clone())),
            _ => None,
        }
    }

    /// Part of the hash input that separates chunks of equal text.
    pub fn disambiguator(&self) -> String {
        let mut sections: Vec<&str> = self.section_types.iter().map(|s| s.key()).collect();
        sections.sort_unstable();
        match self.chunk_behavior {
            ChunkBehavior::Superseding => sections.join(","),
            ChunkBehavior::Cumulative => format!(
                "{}/{}",
                self.scene_code.as_deref().unwrap_or("-"),
                sections.join(",")
            ),
            ChunkBehavior::Rolling => format!(
                "{}:{}",
                self.section_type.map(|s| s.key()).unwrap_or("-"),
                self.entity_key.as_deref().unwrap_or("")
            ),
            ChunkBehavior::Legacy => "legacy".to_string(),
        }
    }
}

/// A stored retrievable unit of condensed knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryChunk {
    /// Content address (53 bits)
    pub hash: u64,
    pub text: String,
    pub position_index: u64,
    pub metadata: ChunkMetadata,
}

impl MemoryChunk {
    /// Create a chunk, deriving its content hash from text and metadata.
    pub fn new(text: String, position_index: u64, metadata: ChunkMetadata) -> Self {
        let hash = chunk_hash(
            metadata.chunk_behavior,
            &metadata.disambiguator(),
            &text,
            metadata.start_index,
            metadata.end_index,
        );
        Self {
            hash,
            text,
            position_index,
            metadata,
        }
    }

    pub fn behavior(&self) -> ChunkBehavior {
        self.metadata.chunk_behavior
    }

    pub fn freshness(&self) -> u64 {
        self.metadata.freshness_end_index
    }

    pub fn scene_code(&self) -> Option<&str> {
        self.metadata.scene_code.as_deref()
    }

    pub fn importance(&self) -> u8 {
        self.metadata.importance
    }
}

/// A chunk paired with an ephemeral ranking score. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk: MemoryChunk,
    pub score: f32,
}

impl RetrievalResult {
    pub fn new(chunk: MemoryChunk, score: f32) -> Self {
        Self { chunk, score }
    }
}
