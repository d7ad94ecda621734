//! Hybrid search + ranking for Sift.
//
// Combines the lexical index with dense-vector search, fuses the two ranked
// lists, and lets a cross-query reranker have the final word when present.

pub mod fusion;
mod orchestrator;
mod snapshot;
mod types;

pub use orchestrator::HybridSearcher;
pub use snapshot::{CorpusSnapshot, SnapshotCell};
pub use types::{Backend, Candidate, Degradation, Ranking, SearchHit, SearchOptions, SearchOutcome, Source};
