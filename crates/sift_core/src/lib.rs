//! Configuration, corpus loading and engine wiring for Sift.
//
// Turns a `SiftConfig` into a ready-to-serve `HybridSearcher`. Backends that
// cannot be constructed are replaced by stand-ins that report themselves
// unavailable, so a misconfigured model degrades queries instead of
// preventing startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use embed::{
	CrossEncoderModel, CrossEncoderReranker, Embedder, EmbeddingError, HttpEmbedder, HttpReranker, LocalEmbedder,
	RerankError, RerankerHandle,
};
use search::{CorpusSnapshot, HybridSearcher};
use store::{Document, LanceVectorStore, StoreError, VectorHit, VectorStore};

pub mod config;
pub mod corpus;
pub mod watch;

pub use config::{EmbeddingProvider, RerankerProvider, SiftConfig};
pub use corpus::{CorpusLoader, JsonlCorpusLoader};
pub use watch::CorpusWatcher;

/// Embedder used when the configured one could not be created.
struct OfflineEmbedder(String);

#[async_trait]
impl Embedder for OfflineEmbedder {
	async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
		Err(EmbeddingError::Unavailable(self.0.clone()))
	}
}

/// Vector store used when the configured one could not be opened.
struct OfflineVectorStore(String);

#[async_trait]
impl VectorStore for OfflineVectorStore {
	async fn nearest(&self, _vector: &[f32], _k: usize) -> store::Result<Vec<VectorHit>> {
		Err(StoreError::VectorStoreUnavailable(self.0.clone()))
	}

	async fn count(&self) -> usize {
		0
	}
}

/// Build the query embedder described by `config`.
pub fn build_embedder(config: &SiftConfig) -> Arc<dyn Embedder> {
	let settings = &config.embedding;
	let built = match settings.provider {
		EmbeddingProvider::Http => HttpEmbedder::new(&settings.url, Duration::from_secs(settings.timeout_secs))
			.map(|e| Arc::new(e) as Arc<dyn Embedder>),
		EmbeddingProvider::Local => match settings.model.as_deref() {
			None => LocalEmbedder::new().map(|e| Arc::new(e) as Arc<dyn Embedder>),
			Some(name) => match LocalEmbedder::parse_model(name) {
				Some(model) => LocalEmbedder::with_model(model).map(|e| Arc::new(e) as Arc<dyn Embedder>),
				None => Err(EmbeddingError::Unavailable(format!("unknown embedding model {:?}", name))),
			},
		},
	};

	built.unwrap_or_else(|e| {
		log::warn!("embedding disabled: {}", e);
		Arc::new(OfflineEmbedder(e.to_string()))
	})
}

/// Open the LanceDB store described by `config`.
pub async fn build_vector_store(config: &SiftConfig) -> Arc<dyn VectorStore> {
	let dir = config.vector_dir();
	match LanceVectorStore::new(dir.clone(), &config.vector.table, config.vector.distance).await {
		Ok(store) => Arc::new(store),
		Err(e) => {
			log::warn!("vector store at {} disabled: {}", dir.display(), e);
			Arc::new(OfflineVectorStore(e.to_string()))
		}
	}
}

/// Resolve the optional reranker; any load failure leaves it unavailable.
pub fn build_reranker(config: &SiftConfig) -> RerankerHandle {
	let settings = &config.reranker;
	let timeout = Duration::from_secs(settings.timeout_secs);
	match settings.provider {
		RerankerProvider::None => RerankerHandle::disabled(),
		RerankerProvider::Http => match settings.url.as_deref() {
			Some(url) => RerankerHandle::from_load(HttpReranker::new(url, timeout)),
			None => RerankerHandle::from_load::<HttpReranker>(Err(RerankError::Unavailable(
				"reranker.url is required for the http provider".into(),
			))),
		},
		RerankerProvider::Local => {
			let model = match settings.model.as_deref() {
				None => Ok(CrossEncoderModel::default()),
				Some(name) => CrossEncoderModel::parse(name)
					.ok_or_else(|| RerankError::Unavailable(format!("unknown reranker model {:?}", name))),
			};
			RerankerHandle::from_load(model.and_then(CrossEncoderReranker::new))
		}
	}
}

/// Documents from the configured corpus file; none when no corpus is configured.
pub fn load_documents(config: &SiftConfig) -> Result<Vec<Document>> {
	match config.corpus_path() {
		Some(path) => JsonlCorpusLoader::new(path).load(),
		None => {
			log::warn!("no corpus configured; serving an empty corpus");
			Ok(Vec::new())
		}
	}
}

/// Load the corpus and wire every backend into a searcher.
pub async fn open_searcher(config: &SiftConfig) -> Result<HybridSearcher> {
	let documents = load_documents(config)?;
	let stemmer = config.lexical.stemmer;
	let snapshot = tokio::task::spawn_blocking(move || CorpusSnapshot::build(1, documents, stemmer))
		.await
		.context("snapshot build task failed")??;
	log::info!("corpus snapshot 1 ready ({} documents)", snapshot.len());

	let embedder = build_embedder(config);
	let vectors = build_vector_store(config).await;
	let reranker = build_reranker(config);

	Ok(HybridSearcher::new(snapshot, embedder, vectors, reranker, config.search_options()))
}

/// Reload from `loader`; on failure the current snapshot keeps serving.
pub async fn reload_corpus(searcher: &HybridSearcher, loader: &dyn CorpusLoader) -> Result<u64> {
	let documents = loader.load()?;
	let version = searcher.reload(documents).await?;
	Ok(version)
}

/// Point-in-time view of a searcher's backends.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
	pub snapshot_version: u64,
	pub documents: usize,
	pub vector_rows: usize,
	pub reranker: String,
}

pub async fn status(searcher: &HybridSearcher) -> EngineStatus {
	let snapshot = searcher.snapshot();
	let reranker = match searcher.reranker() {
		RerankerHandle::Available(r) => format!("available ({})", r.name()),
		RerankerHandle::Unavailable(reason) => format!("unavailable: {}", reason),
	};
	EngineStatus {
		snapshot_version: snapshot.version(),
		documents: snapshot.len(),
		vector_rows: searcher.vector_store().count().await,
		reranker,
	}
}
