//! Model clients for Sift.
//
// Query embedding (remote service or local fastembed model) and the optional
// cross-query reranker.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use thiserror::Error;

mod http;
pub mod rerank;

pub use http::{HttpEmbedder, HttpReranker};
pub use rerank::{CrossEncoderModel, CrossEncoderReranker, RerankError, Reranker, RerankerHandle};

/// Failure to turn a query into a vector.
#[derive(Debug, Error)]
pub enum EmbeddingError {
	#[error("embedding unavailable: {0}")]
	Unavailable(String),
}

/// Trait for generating a query embedding.
///
/// Implementations make exactly one attempt; retries are the caller's call.
#[async_trait]
pub trait Embedder: Send + Sync {
	async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Local embedder using fastembed (runs entirely offline).
pub struct LocalEmbedder {
	model: Arc<Mutex<TextEmbedding>>,
}

impl LocalEmbedder {
	/// Create a new LocalEmbedder with the default model (all-MiniLM-L6-v2, 384 dimensions).
	pub fn new() -> Result<Self, EmbeddingError> {
		Self::with_model(EmbeddingModel::AllMiniLML6V2)
	}

	/// Create a LocalEmbedder with a specific model.
	pub fn with_model(model_name: EmbeddingModel) -> Result<Self, EmbeddingError> {
		let options = InitOptions::new(model_name).with_show_download_progress(true);
		let model = TextEmbedding::try_new(options)
			.map_err(|e| EmbeddingError::Unavailable(format!("failed to load embedding model: {}", e)))?;
		Ok(Self { model: Arc::new(Mutex::new(model)) })
	}

	/// Resolve a configured model name.
	pub fn parse_model(name: &str) -> Option<EmbeddingModel> {
		match name.to_lowercase().as_str() {
			"all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
			"bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
			"multilingual-e5-small" | "intfloat/multilingual-e5-small" => Some(EmbeddingModel::MultilingualE5Small),
			"paraphrase-multilingual-minilm-l12-v2" => Some(EmbeddingModel::ParaphraseMLMiniLML12V2),
			_ => None,
		}
	}
}

#[async_trait]
impl Embedder for LocalEmbedder {
	async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
		let model = self.model.clone();
		let text = text.to_string();

		// Inference is CPU-bound; keep it off the async workers.
		let embeddings = tokio::task::spawn_blocking(move || {
			let mut model = model.lock();
			model.embed(vec![text], None)
		})
		.await
		.map_err(|e| EmbeddingError::Unavailable(format!("embedding task failed: {}", e)))?
		.map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

		embeddings
			.into_iter()
			.next()
			.filter(|v| !v.is_empty())
			.ok_or_else(|| EmbeddingError::Unavailable("model returned no embedding".to_string()))
	}
}
