//! Cross-query reranking.
//!
//! A reranker scores each candidate passage jointly with the query. It is an
//! optional capability: [`RerankerHandle`] records whether one is usable, so a
//! model that failed to load is a configuration state rather than an error.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RerankError {
	#[error("reranker unavailable: {0}")]
	Unavailable(String),
}

/// Pairwise relevance scorer.
#[async_trait]
pub trait Reranker: Send + Sync {
	/// One score per text, same order as `texts`; higher is more relevant.
	async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RerankError>;

	fn name(&self) -> &str;
}

/// Whether a reranker can be consulted for this process.
#[derive(Clone)]
pub enum RerankerHandle {
	Available(Arc<dyn Reranker>),
	Unavailable(String),
}

impl RerankerHandle {
	pub fn available<R: Reranker + 'static>(reranker: R) -> Self {
		Self::Available(Arc::new(reranker))
	}

	/// Not configured at all.
	pub fn disabled() -> Self {
		Self::Unavailable("no reranker configured".to_string())
	}

	/// Wrap the outcome of loading a reranker; a load failure degrades to `Unavailable`.
	pub fn from_load<R: Reranker + 'static>(loaded: Result<R, RerankError>) -> Self {
		match loaded {
			Ok(reranker) => Self::available(reranker),
			Err(e) => {
				log::warn!("reranker disabled: {}", e);
				Self::Unavailable(e.to_string())
			}
		}
	}

	pub fn is_available(&self) -> bool {
		matches!(self, Self::Available(_))
	}
}

impl fmt::Debug for RerankerHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Available(r) => f.debug_tuple("Available").field(&r.name()).finish(),
			Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
		}
	}
}

/// Cross-encoder models runnable through fastembed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossEncoderModel {
	BgeRerankerBase,
	BgeRerankerV2M3,
	#[default]
	JinaRerankerV1TurboEn,
	JinaRerankerV2BaseMultilingual,
}

impl CrossEncoderModel {
	fn to_fastembed_model(self) -> RerankerModel {
		match self {
			CrossEncoderModel::BgeRerankerBase => RerankerModel::BGERerankerBase,
			CrossEncoderModel::BgeRerankerV2M3 => RerankerModel::BGERerankerV2M3,
			CrossEncoderModel::JinaRerankerV1TurboEn => RerankerModel::JINARerankerV1TurboEn,
			CrossEncoderModel::JinaRerankerV2BaseMultilingual => RerankerModel::JINARerankerV2BaseMultiligual,
		}
	}

	pub fn display_name(&self) -> &'static str {
		match self {
			CrossEncoderModel::BgeRerankerBase => "BAAI/bge-reranker-base",
			CrossEncoderModel::BgeRerankerV2M3 => "rozgo/bge-reranker-v2-m3",
			CrossEncoderModel::JinaRerankerV1TurboEn => "jinaai/jina-reranker-v1-turbo-en",
			CrossEncoderModel::JinaRerankerV2BaseMultilingual => "jinaai/jina-reranker-v2-base-multilingual",
		}
	}

	/// Parse a model name, with or without the hub prefix.
	pub fn parse(s: &str) -> Option<Self> {
		let lower = s.to_lowercase();
		let name = lower.rsplit('/').next().unwrap_or(&lower);
		match name.replace('_', "-").as_str() {
			"bge-reranker-base" => Some(CrossEncoderModel::BgeRerankerBase),
			"bge-reranker-v2-m3" => Some(CrossEncoderModel::BgeRerankerV2M3),
			"jina-reranker-v1-turbo-en" => Some(CrossEncoderModel::JinaRerankerV1TurboEn),
			"jina-reranker-v2-base-multilingual" => Some(CrossEncoderModel::JinaRerankerV2BaseMultilingual),
			_ => None,
		}
	}
}

/// Local cross-encoder reranker backed by a fastembed ONNX model.
pub struct CrossEncoderReranker {
	model: Arc<Mutex<TextRerank>>,
	kind: CrossEncoderModel,
	batch_size: Option<usize>,
}

impl CrossEncoderReranker {
	/// Load the model, downloading it if it is not cached locally.
	pub fn new(kind: CrossEncoderModel) -> Result<Self, RerankError> {
		log::info!("loading cross-encoder {}", kind.display_name());
		let options = RerankInitOptions::new(kind.to_fastembed_model()).with_show_download_progress(true);
		let model = TextRerank::try_new(options)
			.map_err(|e| RerankError::Unavailable(format!("failed to load {}: {}", kind.display_name(), e)))?;

		Ok(Self {
			model: Arc::new(Mutex::new(model)),
			kind,
			batch_size: Some(32),
		})
	}
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
	async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RerankError> {
		if texts.is_empty() {
			return Ok(vec![]);
		}

		let model = self.model.clone();
		let query = query.to_string();
		let texts = texts.to_vec();
		let batch_size = self.batch_size;

		tokio::task::spawn_blocking(move || {
			let documents: Vec<&str> = texts.iter().map(String::as_str).collect();
			let mut model = model.lock();
			let results = model
				.rerank(query.as_str(), documents, false, batch_size)
				.map_err(|e| RerankError::Unavailable(format!("inference failed: {}", e)))?;

			// fastembed returns results sorted by score; restore input order.
			let mut scores = vec![f32::NEG_INFINITY; texts.len()];
			for result in results {
				if let Some(slot) = scores.get_mut(result.index) {
					*slot = result.score;
				}
			}
			Ok(scores)
		})
		.await
		.map_err(|e| RerankError::Unavailable(format!("rerank task failed: {}", e)))?
	}

	fn name(&self) -> &str {
		self.kind.display_name()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Fixed;

	#[async_trait]
	impl Reranker for Fixed {
		async fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>, RerankError> {
			Ok(texts.iter().map(|t| t.len() as f32).collect())
		}

		fn name(&self) -> &str {
			"fixed"
		}
	}

	#[test]
	fn parse_accepts_prefixed_and_underscored_names() {
		assert_eq!(
			CrossEncoderModel::parse("jinaai/jina-reranker-v1-turbo-en"),
			Some(CrossEncoderModel::JinaRerankerV1TurboEn)
		);
		assert_eq!(CrossEncoderModel::parse("bge_reranker_base"), Some(CrossEncoderModel::BgeRerankerBase));
		assert_eq!(CrossEncoderModel::parse("ms-marco"), None);
	}

	#[test]
	fn failed_load_becomes_unavailable() {
		let handle = RerankerHandle::from_load::<Fixed>(Err(RerankError::Unavailable("no weights".into())));
		assert!(!handle.is_available());
		assert!(format!("{:?}", handle).contains("no weights"));
	}

	#[tokio::test]
	async fn available_handle_scores() {
		let handle = RerankerHandle::from_load(Ok(Fixed));
		let RerankerHandle::Available(reranker) = handle else {
			panic!("expected an available reranker");
		};
		let scores = reranker.score("q", &["a".to_string(), "abc".to_string()]).await.unwrap();
		assert_eq!(scores, vec![1.0, 3.0]);
	}
}
