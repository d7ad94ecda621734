//! Immutable corpus snapshots and the cell that publishes them.
//!
//! A reload builds a complete [`CorpusSnapshot`] before it is published, so a
//! reader holds either the old snapshot or the new one, never a mix.

use std::sync::Arc;

use parking_lot::RwLock;
use store::{Document, DocumentStore, LexicalIndex, Stemmer, StoreError};

/// Document store plus lexical index over the same corpus.
pub struct CorpusSnapshot {
	version: u64,
	stemmer: Stemmer,
	documents: DocumentStore,
	lexical: LexicalIndex,
}

impl CorpusSnapshot {
	pub fn build(version: u64, documents: Vec<Document>, stemmer: Stemmer) -> Result<Self, StoreError> {
		let documents = DocumentStore::from_documents(documents);
		let lexical = LexicalIndex::build(&documents, stemmer)?;
		Ok(Self {
			version,
			stemmer,
			documents,
			lexical,
		})
	}

	/// Snapshot with no documents.
	pub fn empty(stemmer: Stemmer) -> Result<Self, StoreError> {
		Self::build(0, Vec::new(), stemmer)
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	pub fn stemmer(&self) -> Stemmer {
		self.stemmer
	}

	pub fn documents(&self) -> &DocumentStore {
		&self.documents
	}

	pub fn lexical(&self) -> &LexicalIndex {
		&self.lexical
	}

	pub fn len(&self) -> usize {
		self.documents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.documents.is_empty()
	}
}

/// Shared handle to the current snapshot.
///
/// The lock is only held to clone or replace the `Arc`.
pub struct SnapshotCell {
	current: RwLock<Arc<CorpusSnapshot>>,
}

impl SnapshotCell {
	pub fn new(snapshot: CorpusSnapshot) -> Self {
		Self {
			current: RwLock::new(Arc::new(snapshot)),
		}
	}

	pub fn current(&self) -> Arc<CorpusSnapshot> {
		self.current.read().clone()
	}

	/// Publish `next`, returning the snapshot it replaced.
	pub fn swap(&self, next: Arc<CorpusSnapshot>) -> Arc<CorpusSnapshot> {
		std::mem::replace(&mut *self.current.write(), next)
	}
}
