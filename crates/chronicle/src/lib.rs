//! Chronicle - long-term memory for long-running conversations
//!
//! Structured summaries are classified into typed chunks, reconciled into a
//! per-conversation vector store, and recalled by a staged retrieval
//! pipeline that scores, expands, reranks and orders them for injection.

pub mod classify;
pub mod config;
pub mod debug;
pub mod embedding;
pub mod error;
pub mod injection;
pub mod lexical;
pub mod lifecycle;
pub mod memory;
pub mod rerank;
pub mod retrieval;
pub mod scoring;
pub mod storage;
pub mod testing;

pub use config::Config;
pub use error::{ChronicleError, Result};
