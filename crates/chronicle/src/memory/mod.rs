//! Memory chunk data model
//!
//! Defines the chunk types, their content-addressed hash, and the
//! conversation turns retrieval is driven by.

pub mod conversation;
pub mod hash;
pub mod types;

pub use conversation::{ConversationTurn, Role, build_query_text, normalize_message, protected_window};
pub use hash::{MAX_CHUNK_HASH, chunk_hash, normalize_text};
pub use types::{
    ChunkBehavior, ChunkMetadata, MemoryChunk, ResolvedEntity, RetrievalResult, RollingIdentity,
    SectionType,
};
