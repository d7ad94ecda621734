//! HTTP clients for remote embedding and reranking services.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::rerank::{RerankError, Reranker};
use crate::{Embedder, EmbeddingError};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
	text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
	embedding: Vec<f32>,
}

/// Client for an embedding endpoint taking `{"text"}` and answering `{"embedding"}`.
pub struct HttpEmbedder {
	client: Client,
	url: String,
}

impl HttpEmbedder {
	pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EmbeddingError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| EmbeddingError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

		Ok(Self { client, url: url.into() })
	}
}

#[async_trait]
impl Embedder for HttpEmbedder {
	async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
		let response = self
			.client
			.post(&self.url)
			.json(&EmbedRequest { text })
			.send()
			.await
			.map_err(|e| EmbeddingError::Unavailable(describe(&self.url, &e)))?;

		let status = response.status();
		if !status.is_success() {
			return Err(EmbeddingError::Unavailable(format!("{} returned {}", self.url, status)));
		}

		let body: EmbedResponse = response
			.json()
			.await
			.map_err(|e| EmbeddingError::Unavailable(format!("malformed response from {}: {}", self.url, e)))?;

		if body.embedding.is_empty() {
			return Err(EmbeddingError::Unavailable(format!("{} returned an empty embedding", self.url)));
		}
		Ok(body.embedding)
	}
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
	query: &'a str,
	documents: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
	scores: Vec<f32>,
}

/// Client for a reranking endpoint taking `{"query", "documents"}` and answering `{"scores"}`.
pub struct HttpReranker {
	client: Client,
	url: String,
}

impl HttpReranker {
	pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RerankError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| RerankError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

		Ok(Self { client, url: url.into() })
	}
}

#[async_trait]
impl Reranker for HttpReranker {
	async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RerankError> {
		if texts.is_empty() {
			return Ok(vec![]);
		}

		let response = self
			.client
			.post(&self.url)
			.json(&RerankRequest { query, documents: texts })
			.send()
			.await
			.map_err(|e| RerankError::Unavailable(describe(&self.url, &e)))?;

		let status = response.status();
		if !status.is_success() {
			return Err(RerankError::Unavailable(format!("{} returned {}", self.url, status)));
		}

		let body: RerankResponse = response
			.json()
			.await
			.map_err(|e| RerankError::Unavailable(format!("malformed response from {}: {}", self.url, e)))?;
		Ok(body.scores)
	}

	fn name(&self) -> &str {
		"http"
	}
}

fn describe(url: &str, e: &reqwest::Error) -> String {
	if e.is_timeout() {
		format!("request to {} timed out", url)
	} else if e.is_connect() {
		format!("could not connect to {}: {}", url, e)
	} else {
		format!("request to {} failed: {}", url, e)
	}
}
