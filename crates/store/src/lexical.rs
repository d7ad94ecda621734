//! Lexical (full-text) search index using Tantivy.
//!
//! Provides BM25-based keyword search over a corpus snapshot. The index lives
//! in RAM and is never written after [`LexicalIndex::build`]; a corpus reload
//! builds a fresh index and swaps it in whole.

use serde::{Deserialize, Serialize};
use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED, STRING},
    tokenizer::{
        AsciiFoldingFilter, Language, LowerCaser, RemoveLongFilter, SimpleTokenizer,
        Stemmer as SnowballStemmer, TextAnalyzer,
    },
    DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument,
};

use crate::document::DocumentStore;
use crate::error::{Result, StoreError};

const TOKENIZER_NAME: &str = "corpus";
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Stemming language applied to indexed text and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stemmer {
    #[default]
    None,
    English,
    Spanish,
}

/// A term-matched document and its BM25 score.
///
/// Scores are only comparable within a single result list.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub doc_id: String,
    pub score: f32,
}

/// Immutable in-RAM BM25 index over one corpus snapshot.
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    doc_id_field: Field,
    content_field: Field,
    num_docs: usize,
}

impl LexicalIndex {
    /// Build an index over every document in `documents`.
    ///
    /// An empty store yields an index that answers every query with no hits.
    pub fn build(documents: &DocumentStore, stemmer: Stemmer) -> Result<Self> {
        let mut schema_builder = Schema::builder();

        // doc_id: exact-match key, stored so hits can be mapped back
        let doc_id_field = schema_builder.add_text_field("doc_id", STRING | STORED);

        // content: indexed only, full text is served from the DocumentStore
        let text_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER_NAME)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );
        let content_field = schema_builder.add_text_field("content", text_options);

        let index = Index::create_in_ram(schema_builder.build());
        index.tokenizers().register(TOKENIZER_NAME, analyzer(stemmer));

        if !documents.is_empty() {
            // Single indexing thread keeps doc addresses in insertion order.
            let mut writer: IndexWriter = index
                .writer_with_num_threads(1, WRITER_HEAP_BYTES)
                .map_err(build_error)?;

            for doc in documents.iter_sorted() {
                let mut tantivy_doc = TantivyDocument::default();
                tantivy_doc.add_text(doc_id_field, &doc.id);
                tantivy_doc.add_text(content_field, &doc.text);
                writer.add_document(tantivy_doc).map_err(build_error)?;
            }

            writer.commit().map_err(build_error)?;
        }

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(build_error)?;

        Ok(Self {
            index,
            reader,
            doc_id_field,
            content_field,
            num_docs: documents.len(),
        })
    }

    /// Search for documents matching `query_text`.
    ///
    /// Returns at most `limit` hits by descending score, ties ordered by
    /// ascending id. Text that matches no indexed term yields no hits.
    pub fn search(&self, query_text: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        if limit == 0 || self.num_docs == 0 || query_text.trim().is_empty() {
            return Ok(vec![]);
        }
        let limit = limit.min(self.num_docs);

        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.content_field]);

        // Natural-language questions carry stray quotes, colons and the like;
        // the lenient parser drops what it cannot interpret.
        let (query, errors) = query_parser.parse_query_lenient(query_text);
        if !errors.is_empty() {
            log::debug!("lexical query {:?} parsed with {} ignored fragment(s)", query_text, errors.len());
        }

        // Widen the window until the score at the limit boundary is no longer
        // tied with the last fetched hit, so the id tie-break sees every tie.
        let mut window = limit.saturating_add(1).min(self.num_docs);
        let top_docs: Vec<(f32, DocAddress)> = loop {
            let top = searcher
                .search(&query, &TopDocs::with_limit(window))
                .map_err(lexical_error)?;

            let boundary_tied = top.len() == window
                && window < self.num_docs
                && top.len() >= limit
                && top[window - 1].0 >= top[limit - 1].0;

            if !boundary_tied {
                break top;
            }
            window = window.saturating_mul(2).min(self.num_docs);
        };

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address).map_err(lexical_error)?;
            let doc_id = doc
                .get_first(self.doc_id_field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            if doc_id.is_empty() {
                continue;
            }
            hits.push(LexicalHit { doc_id, score });
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Number of indexed documents.
    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    pub fn is_empty(&self) -> bool {
        self.num_docs == 0
    }
}

fn analyzer(stemmer: Stemmer) -> TextAnalyzer {
    let builder = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(AsciiFoldingFilter);

    match stemmer {
        Stemmer::None => builder.build(),
        Stemmer::English => builder.filter(SnowballStemmer::new(Language::English)).build(),
        Stemmer::Spanish => builder.filter(SnowballStemmer::new(Language::Spanish)).build(),
    }
}

fn build_error(e: tantivy::TantivyError) -> StoreError {
    StoreError::IndexBuild(e.to_string())
}

fn lexical_error(e: tantivy::TantivyError) -> StoreError {
    StoreError::LexicalUnavailable(e.to_string())
}
