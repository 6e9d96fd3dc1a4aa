//! Lexical engine: tokenizer, Porter stemmer, and batch-local BM25

pub mod bm25;
pub mod stemmer;
pub mod tokenize;

pub use bm25::Bm25Index;
pub use stemmer::stem;
pub use tokenize::{is_stopword, tokenize};
