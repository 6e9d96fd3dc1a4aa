//! Content addressing for memory chunks
//!
//! A chunk hash is XXH3-64 over `behavior|disambiguator|normalized text|start-end`,
//! masked to 53 bits so it survives storage backends that keep numbers as doubles.

use xxhash_rust::xxh3::xxh3_64;

use crate::memory::types::ChunkBehavior;

/// Largest representable chunk hash (2^53 - 1)
pub const MAX_CHUNK_HASH: u64 = (1 << 53) - 1;

/// Trim and collapse internal whitespace runs to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic 53-bit hash of a chunk's logical content.
pub fn chunk_hash(
    behavior: ChunkBehavior,
    disambiguator: &str,
    text: &str,
    start_index: u64,
    end_index: u64,
) -> u64 {
    let key = format!(
        "{}|{}|{}|{}-{}",
        behavior.as_str(),
        disambiguator,
        normalize_text(text),
        start_index,
        end_index
    );
    xxh3_64(key.as_bytes()) & MAX_CHUNK_HASH
}
