pub mod aggregate;
pub mod chat;
pub mod engine;
pub mod expansion;
pub mod identifiers;
pub mod rerank;
pub mod search;
pub mod signal_weighting;
pub mod truncate;

#[cfg(test)]
mod test_support;

pub use engine::{Engine, EngineOptions, IndexOutcome};
pub use search::{PipelineOptions, SearchOptions, SearchPipeline};
