//! Corpus storage for Sift.
//!
//! The document store and lexical index form an immutable corpus snapshot.
//! The vector store is populated offline and queried by nearest neighbour;
//! LanceDB keeps it on disk with ANN search.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use serde::{Serialize, Deserialize};

use lancedb::connect;
use lancedb::query::{QueryBase, ExecutableQuery};
use lancedb::DistanceType;
use arrow_array::{
    RecordBatch, RecordBatchIterator, StringArray, Float32Array,
    ArrayRef, Array,
};
use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_schema::{Schema, Field, DataType};
use futures::TryStreamExt;
use tokio::sync::RwLock;

mod document;
mod error;
pub mod lexical;

pub use document::{Document, DocumentStore};
pub use error::{Result, StoreError};
pub use lexical::{LexicalHit, LexicalIndex, Stemmer};

/// A nearest-neighbour hit; lower distance means more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub doc_id: String,
    pub distance: f32,
}

/// A row written to the vector table.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub doc_id: String,
    /// Denormalized passage text, if the ingestion keeps it next to the vector.
    pub text: Option<String>,
    pub vector: Vec<f32>,
}

/// Distance metric used for nearest-neighbour queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    L2,
    Cosine,
    Dot,
}

impl From<DistanceMetric> for DistanceType {
    fn from(metric: DistanceMetric) -> Self {
        match metric {
            DistanceMetric::L2 => DistanceType::L2,
            DistanceMetric::Cosine => DistanceType::Cosine,
            DistanceMetric::Dot => DistanceType::Dot,
        }
    }
}

/// Trait for a dense-vector similarity store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `k` hits ordered by ascending distance. No neighbours is `Ok(vec![])`.
    async fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>>;
    async fn count(&self) -> usize;
}

pub const DEFAULT_TABLE_NAME: &str = "embeddings";

/// LanceDB-backed vector store.
/// Data is stored on disk with efficient ANN search.
pub struct LanceVectorStore {
    db: Arc<lancedb::Connection>,
    table_name: String,
    table: RwLock<Option<lancedb::Table>>,
    distance: DistanceMetric,
}

impl LanceVectorStore {
    /// Create or open a LanceDB store at the given directory.
    pub async fn new(data_dir: PathBuf, table_name: &str, distance: DistanceMetric) -> Result<Self> {
        std::fs::create_dir_all(&data_dir).map_err(unavailable)?;
        let db_path = data_dir.to_string_lossy().to_string();
        let db = connect(&db_path).execute().await.map_err(unavailable)?;

        // The table may not exist yet; it is looked up again at query time.
        let table = db.open_table(table_name).execute().await.ok();

        Ok(Self {
            db: Arc::new(db),
            table_name: table_name.to_string(),
            table: RwLock::new(table),
            distance,
        })
    }

    /// Return the table handle, opening it if ingestion created it since startup.
    async fn table(&self) -> Option<lancedb::Table> {
        if let Some(table) = self.table.read().await.as_ref() {
            return Some(table.clone());
        }

        let mut guard = self.table.write().await;
        if guard.is_none() {
            *guard = self.db.open_table(&self.table_name).execute().await.ok();
        }
        guard.clone()
    }

    /// Get the Arrow schema for a table of `dim`-dimensional vectors.
    fn schema(dim: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, true),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dim,
                ),
                false,
            ),
        ]))
    }

    /// Create a RecordBatch from vector rows of identical dimension.
    fn create_batch(records: &[VectorRecord], dim: i32) -> Result<RecordBatch> {
        let doc_ids = StringArray::from(records.iter().map(|r| r.doc_id.as_str()).collect::<Vec<_>>());
        let texts = StringArray::from(records.iter().map(|r| r.text.as_deref()).collect::<Vec<_>>());

        let mut list_builder = FixedSizeListBuilder::new(Float32Builder::new(), dim);
        for record in records {
            if record.vector.len() != dim as usize {
                return Err(StoreError::VectorStoreUnavailable(format!(
                    "vector for {} has dimension {}, expected {}",
                    record.doc_id,
                    record.vector.len(),
                    dim
                )));
            }
            list_builder.values().append_slice(&record.vector);
            list_builder.append(true);
        }
        let vectors = list_builder.finish();

        RecordBatch::try_new(
            Self::schema(dim),
            vec![
                Arc::new(doc_ids) as ArrayRef,
                Arc::new(texts) as ArrayRef,
                Arc::new(vectors) as ArrayRef,
            ],
        )
        .map_err(unavailable)
    }

    /// Append rows, creating the table on first write.
    pub async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let dim = first.vector.len() as i32;
        let batch = Self::create_batch(&records, dim)?;

        let mut table_guard = self.table.write().await;

        if let Some(ref table) = *table_guard {
            table.add(
                RecordBatchIterator::new(vec![Ok(batch)], Self::schema(dim))
            ).execute().await.map_err(unavailable)?;
        } else {
            let new_table = self.db.create_table(
                &self.table_name,
                RecordBatchIterator::new(vec![Ok(batch)], Self::schema(dim)),
            ).execute().await.map_err(unavailable)?;
            *table_guard = Some(new_table);
        }

        Ok(())
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let table = match self.table().await {
            Some(t) => t,
            None => return Ok(vec![]), // No table means no results
        };
        let rows = table.count_rows(None).await.map_err(unavailable)?;
        let k = k.min(rows);
        if k == 0 {
            return Ok(vec![]);
        }

        let results = table
            .vector_search(vector.to_vec())
            .map_err(unavailable)?
            .distance_type(self.distance.into())
            .limit(k)
            .execute()
            .await
            .map_err(unavailable)?
            .try_collect::<Vec<_>>()
            .await
            .map_err(unavailable)?;

        let mut hits = Vec::new();

        for batch in results {
            let doc_ids = batch
                .column_by_name("doc_id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            let (Some(doc_ids), Some(distances)) = (doc_ids, distances) else {
                return Err(StoreError::VectorStoreUnavailable(
                    "result batch is missing doc_id or _distance".to_string(),
                ));
            };

            for i in 0..batch.num_rows() {
                if doc_ids.is_null(i) || distances.is_null(i) {
                    continue;
                }
                hits.push(VectorHit {
                    doc_id: doc_ids.value(i).to_string(),
                    distance: distances.value(i),
                });
            }
        }

        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> usize {
        match self.table().await {
            Some(table) => table.count_rows(None).await.unwrap_or(0),
            None => 0,
        }
    }
}

/// Brute-force L2 store held in memory, for tests and small corpora.
#[derive(Default)]
pub struct InMemoryVectorStore {
    rows: RwLock<Vec<(String, Vec<f32>)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, doc_id: impl Into<String>, vector: Vec<f32>) {
        self.rows.write().await.push((doc_id.into(), vector));
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        let rows = self.rows.read().await;
        let mut hits = Vec::with_capacity(rows.len());
        for (doc_id, row) in rows.iter() {
            if row.len() != vector.len() {
                return Err(StoreError::VectorStoreUnavailable(format!(
                    "query has dimension {}, stored vectors have {}",
                    vector.len(),
                    row.len()
                )));
            }
            let distance = row
                .iter()
                .zip(vector)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            hits.push(VectorHit { doc_id: doc_id.clone(), distance });
        }

        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

/// Ascending distance, ties by ascending id.
fn sort_hits(hits: &mut [VectorHit]) {
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.doc_id.cmp(&b.doc_id)));
}

fn unavailable(e: impl std::fmt::Display) -> StoreError {
    StoreError::VectorStoreUnavailable(e.to_string())
}
