use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::fusion::DEFAULT_RRF_K;

/// Which first-pass backend produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
	Lexical,
	Vector,
}

impl fmt::Display for Source {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Source::Lexical => f.write_str("lexical"),
			Source::Vector => f.write_str("vector"),
		}
	}
}

/// A collaborator whose failure the orchestrator absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
	Lexical,
	Embedding,
	VectorStore,
	Reranker,
}

impl fmt::Display for Backend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Backend::Lexical => "lexical",
			Backend::Embedding => "embedding",
			Backend::VectorStore => "vector_store",
			Backend::Reranker => "reranker",
		};
		f.write_str(name)
	}
}

/// A backend failure that was recovered from by degrading the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Degradation {
	pub backend: Backend,
	pub reason: String,
}

/// Which ordering key produced the final ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ranking {
	Reranker,
	Fusion,
}

/// A hydrated document under consideration within one search call.
#[derive(Debug, Clone)]
pub struct Candidate {
	pub doc_id: String,
	pub text: String,
	pub metadata: BTreeMap<String, String>,
	pub sources: BTreeSet<Source>,
	pub fusion_score: f32,
	pub rerank_score: Option<f32>,
}

impl Candidate {
	/// Reranker score when one was assigned, otherwise the fusion score.
	pub fn active_score(&self) -> f32 {
		self.rerank_score.unwrap_or(self.fusion_score)
	}
}

/// One entry of the final ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
	pub id: String,
	pub text: String,
	pub metadata: BTreeMap<String, String>,
	pub score: f32,
	pub sources: Vec<Source>,
}

impl From<Candidate> for SearchHit {
	fn from(c: Candidate) -> Self {
		let score = c.active_score();
		Self {
			id: c.doc_id,
			text: c.text,
			metadata: c.metadata,
			score,
			sources: c.sources.into_iter().collect(),
		}
	}
}

/// Everything one search call produced, including what degraded.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
	pub hits: Vec<SearchHit>,
	pub degradations: Vec<Degradation>,
	pub ranking: Ranking,
	pub snapshot_version: u64,
	/// Hydrated candidates before truncation.
	pub merged_candidates: usize,
}

impl SearchOutcome {
	pub fn is_degraded(&self) -> bool {
		!self.degradations.is_empty()
	}

	pub fn degraded(&self, backend: Backend) -> bool {
		self.degradations.iter().any(|d| d.backend == backend)
	}
}

/// Tuning for the orchestrator.
#[derive(Debug, Clone)]
pub struct SearchOptions {
	/// Hits requested from each first-pass backend; never fewer than the limit.
	pub candidate_pool: usize,
	pub rrf_k: f32,
	/// Retries per remote call after a failure; anything above 1 is treated as 1.
	pub max_retries: u32,
	pub embed_timeout: Duration,
	pub vector_timeout: Duration,
	pub rerank_timeout: Duration,
	/// Ceiling for the whole call; on expiry the best partial result is returned.
	pub deadline: Duration,
}

impl Default for SearchOptions {
	fn default() -> Self {
		Self {
			candidate_pool: 20,
			rrf_k: DEFAULT_RRF_K,
			max_retries: 1,
			embed_timeout: Duration::from_secs(8),
			vector_timeout: Duration::from_secs(8),
			rerank_timeout: Duration::from_secs(8),
			deadline: Duration::from_secs(10),
		}
	}
}
