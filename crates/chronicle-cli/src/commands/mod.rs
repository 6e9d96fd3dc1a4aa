pub mod classify;
pub mod debug;
pub mod ingest;
pub mod purge;
pub mod retrieve;
pub mod stats;

pub use classify::ClassifyCommand;
pub use debug::DebugCommand;
pub use ingest::IngestCommand;
pub use purge::PurgeCommand;
pub use retrieve::RetrieveCommand;
pub use stats::StatsCommand;
