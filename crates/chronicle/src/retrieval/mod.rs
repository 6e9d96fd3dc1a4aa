//! Memory retrieval
//!
//! [`RetrievalOrchestrator`] runs the staged pass from conversation turns to
//! injected text. The dedup and presentation-order passes are plain
//! functions so they can be tested and reused on their own.

pub mod dedup;
pub mod ordering;
pub mod pipeline;

pub use dedup::{dedupe_exact, dedupe_results};
pub use ordering::order_for_presentation;
pub use pipeline::{
    GenerationType, NoopObserver, RetrievalOrchestrator, RetrievalOutcome, RetrievalRequest,
    SkipReason, Stage, StageObserver,
};
