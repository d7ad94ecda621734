use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use embed::{Embedder, RerankerHandle};
use store::{Document, LexicalHit, StoreError, VectorHit, VectorStore};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::fusion;
use crate::snapshot::{CorpusSnapshot, SnapshotCell};
use crate::types::{Backend, Candidate, Degradation, Ranking, SearchHit, SearchOptions, SearchOutcome};

const DEADLINE_EXCEEDED: &str = "request deadline exceeded";

/// Answers queries over the current corpus snapshot.
///
/// Backend failures never fail a query: each one is recorded as a
/// [`Degradation`] and the result is built from whatever succeeded.
pub struct HybridSearcher {
	snapshots: SnapshotCell,
	embedder: Arc<dyn Embedder>,
	vectors: Arc<dyn VectorStore>,
	reranker: RerankerHandle,
	options: SearchOptions,
	reload_lock: Mutex<()>,
}

impl HybridSearcher {
	pub fn new(
		snapshot: CorpusSnapshot,
		embedder: Arc<dyn Embedder>,
		vectors: Arc<dyn VectorStore>,
		reranker: RerankerHandle,
		options: SearchOptions,
	) -> Self {
		Self {
			snapshots: SnapshotCell::new(snapshot),
			embedder,
			vectors,
			reranker,
			options,
			reload_lock: Mutex::new(()),
		}
	}

	pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
		self.snapshots.current()
	}

	pub fn reranker(&self) -> &RerankerHandle {
		&self.reranker
	}

	pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
		&self.vectors
	}

	pub fn options(&self) -> &SearchOptions {
		&self.options
	}

	/// Up to `limit` passages for `query`, best first.
	pub async fn hybrid_search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
		self.search(query, limit).await.hits
	}

	/// Like [`hybrid_search`](Self::hybrid_search), reporting what degraded along the way.
	pub async fn search(&self, query: &str, limit: usize) -> SearchOutcome {
		let limit = limit.max(1);
		let started = Instant::now();
		let deadline = started + self.options.deadline;
		let pool = self.options.candidate_pool.max(limit);

		// Pinned for the whole call; a concurrent reload cannot change it.
		let snapshot = self.snapshots.current();
		let mut degradations = Vec::new();

		let lexical = {
			let snapshot = snapshot.clone();
			let query = query.to_string();
			tokio::time::timeout_at(
				deadline,
				tokio::task::spawn_blocking(move || snapshot.lexical().search(&query, pool)),
			)
		};
		let embedded = AtomicBool::new(false);
		let remote = tokio::time::timeout_at(deadline, self.vector_branch(query, pool, &embedded));

		let (lexical, remote) = tokio::join!(lexical, remote);

		let lexical_hits: Vec<LexicalHit> = match lexical {
			Ok(Ok(Ok(hits))) => hits,
			Ok(Ok(Err(e))) => degrade(&mut degradations, Backend::Lexical, e.to_string()),
			Ok(Err(e)) => degrade(&mut degradations, Backend::Lexical, format!("lexical task failed: {}", e)),
			Err(_) => degrade(&mut degradations, Backend::Lexical, DEADLINE_EXCEEDED.to_string()),
		};

		let vector_hits: Vec<VectorHit> = match remote {
			Ok(Ok(hits)) => hits,
			Ok(Err(d)) => degrade(&mut degradations, d.backend, d.reason),
			Err(_) => {
				let backend = if embedded.load(Ordering::Relaxed) {
					Backend::VectorStore
				} else {
					Backend::Embedding
				};
				degrade(&mut degradations, backend, DEADLINE_EXCEEDED.to_string())
			}
		};

		let merged = fusion::merge(&lexical_hits, &vector_hits, self.options.rrf_k);
		let merged_len = merged.len();
		let mut candidates: Vec<Candidate> = merged
			.into_iter()
			.filter_map(|hit| {
				let doc = snapshot.documents().get(&hit.doc_id)?;
				Some(Candidate {
					doc_id: hit.doc_id,
					text: doc.text.clone(),
					metadata: doc.metadata.clone(),
					sources: hit.sources,
					fusion_score: hit.fusion_score,
					rerank_score: None,
				})
			})
			.collect();
		if candidates.len() < merged_len {
			log::debug!(
				"dropped {} candidates missing from snapshot {}",
				merged_len - candidates.len(),
				snapshot.version()
			);
		}
		let merged_candidates = candidates.len();

		let ranking = match self.rerank(query, &mut candidates, deadline).await {
			Ok(ranking) => ranking,
			Err(d) => {
				record(&mut degradations, d.backend, d.reason);
				Ranking::Fusion
			}
		};

		fusion::sort_candidates(&mut candidates);
		candidates.truncate(limit);
		let hits: Vec<SearchHit> = candidates.into_iter().map(SearchHit::from).collect();

		log::debug!(
			"query answered with {} of {} candidates in {:?} (ranking: {:?}, degraded: {})",
			hits.len(),
			merged_candidates,
			started.elapsed(),
			ranking,
			degradations.len()
		);

		SearchOutcome {
			hits,
			degradations,
			ranking,
			snapshot_version: snapshot.version(),
			merged_candidates,
		}
	}

	/// Embed the query, then ask the vector store for neighbours.
	async fn vector_branch(&self, query: &str, k: usize, embedded: &AtomicBool) -> Result<Vec<VectorHit>, Degradation> {
		let vector = self
			.call_with_retry(Backend::Embedding, self.options.embed_timeout, || self.embedder.embed(query))
			.await?;
		embedded.store(true, Ordering::Relaxed);

		self.call_with_retry(Backend::VectorStore, self.options.vector_timeout, || {
			self.vectors.nearest(&vector, k)
		})
		.await
	}

	/// Run `call` under `timeout`, retrying at most once on failure.
	async fn call_with_retry<T, E, F, Fut>(&self, backend: Backend, timeout: Duration, mut call: F) -> Result<T, Degradation>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: Display,
	{
		let attempts = 1 + self.options.max_retries.min(1);
		let mut reason = String::new();

		for attempt in 1..=attempts {
			match tokio::time::timeout(timeout, call()).await {
				Ok(Ok(value)) => return Ok(value),
				Ok(Err(e)) => reason = e.to_string(),
				Err(_) => reason = format!("{} timed out after {:?}", backend, timeout),
			}
			if attempt < attempts {
				log::debug!("{} attempt {} failed, retrying: {}", backend, attempt, reason);
			}
		}

		Err(Degradation { backend, reason })
	}

	/// Score candidates with the reranker, if one is available and there is time left.
	async fn rerank(&self, query: &str, candidates: &mut [Candidate], deadline: Instant) -> Result<Ranking, Degradation> {
		let RerankerHandle::Available(reranker) = &self.reranker else {
			return Ok(Ranking::Fusion);
		};
		if candidates.is_empty() {
			return Ok(Ranking::Fusion);
		}

		let unavailable = |reason: String| Degradation {
			backend: Backend::Reranker,
			reason,
		};

		let remaining = deadline.saturating_duration_since(Instant::now());
		if remaining.is_zero() {
			return Err(unavailable(DEADLINE_EXCEEDED.to_string()));
		}
		let timeout = self.options.rerank_timeout.min(remaining);

		let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
		let scores = match tokio::time::timeout(timeout, reranker.score(query, &texts)).await {
			Ok(Ok(scores)) => scores,
			Ok(Err(e)) => return Err(unavailable(e.to_string())),
			Err(_) if timeout < self.options.rerank_timeout => return Err(unavailable(DEADLINE_EXCEEDED.to_string())),
			Err(_) => return Err(unavailable(format!("{} timed out after {:?}", reranker.name(), timeout))),
		};

		if scores.len() != candidates.len() {
			return Err(unavailable(format!(
				"{} returned {} scores for {} candidates",
				reranker.name(),
				scores.len(),
				candidates.len()
			)));
		}

		for (candidate, score) in candidates.iter_mut().zip(scores) {
			candidate.rerank_score = Some(if score.is_nan() { f32::NEG_INFINITY } else { score });
		}
		Ok(Ranking::Reranker)
	}

	/// Build a snapshot for `documents` and publish it.
	///
	/// Queries already running keep the snapshot they started with. On failure
	/// the current snapshot stays in place.
	pub async fn reload(&self, documents: Vec<Document>) -> Result<u64, StoreError> {
		let _guard = self.reload_lock.lock().await;
		let current = self.snapshots.current();
		let version = current.version() + 1;
		let stemmer = current.stemmer();
		drop(current);

		let snapshot = tokio::task::spawn_blocking(move || CorpusSnapshot::build(version, documents, stemmer))
			.await
			.map_err(|e| StoreError::IndexBuild(format!("snapshot build task failed: {}", e)))??;

		let count = snapshot.len();
		self.snapshots.swap(Arc::new(snapshot));
		log::info!("swapped in corpus snapshot {} ({} documents)", version, count);
		Ok(version)
	}
}

fn record(degradations: &mut Vec<Degradation>, backend: Backend, reason: String) {
	log::warn!("{} degraded: {}", backend, reason);
	degradations.push(Degradation { backend, reason });
}

/// Record a failed first-pass backend; it contributes no hits.
fn degrade<T>(degradations: &mut Vec<Degradation>, backend: Backend, reason: String) -> Vec<T> {
	record(degradations, backend, reason);
	Vec::new()
}
