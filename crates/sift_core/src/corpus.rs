//! Corpus loading.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use store::Document;

/// Source of the documents a snapshot is built from.
pub trait CorpusLoader: Send + Sync {
    fn load(&self) -> Result<Vec<Document>>;
}

/// Reads one JSON object per line: `{"id", "text", "metadata"?}`.
#[derive(Debug, Clone)]
pub struct JsonlCorpusLoader {
    path: PathBuf,
}

impl JsonlCorpusLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse JSONL content; a later record with an already seen id replaces it.
    pub fn parse(content: &str) -> Result<Vec<Document>> {
        let mut documents: Vec<Document> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let document: Document =
                serde_json::from_str(line).with_context(|| format!("malformed corpus record on line {}", i + 1))?;

            match positions.get(&document.id) {
                Some(&at) => {
                    log::warn!("duplicate document id {:?} on line {}; keeping the later record", document.id, i + 1);
                    documents[at] = document;
                }
                None => {
                    positions.insert(document.id.clone(), documents.len());
                    documents.push(document);
                }
            }
        }

        Ok(documents)
    }
}

impl CorpusLoader for JsonlCorpusLoader {
    fn load(&self) -> Result<Vec<Document>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read corpus {}", self.path.display()))?;
        let documents = Self::parse(&content).with_context(|| format!("in {}", self.path.display()))?;
        log::info!("loaded {} documents from {}", documents.len(), self.path.display());
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_records_and_skips_blank_lines() {
        let content = r#"{"id": "faq-0", "text": "Las contraseñas expiran cada 90 días.", "metadata": {"source": "faq"}}

{"id": "faq-1", "text": "Use the portal to reset your password."}
"#;
        let docs = JsonlCorpusLoader::parse(content).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata.get("source").map(String::as_str), Some("faq"));
        assert!(docs[1].metadata.is_empty());
    }

    #[test]
    fn malformed_line_names_its_number() {
        let content = "{\"id\": \"a\", \"text\": \"ok\"}\n{\"id\": \"b\"}\n";
        let err = JsonlCorpusLoader::parse(content).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"), "{:#}", err);
    }

    #[test]
    fn later_duplicate_wins_in_place() {
        let content = r#"{"id": "x", "text": "first"}
{"id": "y", "text": "other"}
{"id": "x", "text": "second"}"#;
        let docs = JsonlCorpusLoader::parse(content).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "x");
        assert_eq!(docs[0].text, "second");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        fs::write(&path, "{\"id\": \"a\", \"text\": \"alpha\"}\n").unwrap();

        let docs = JsonlCorpusLoader::new(&path).load().unwrap();
        assert_eq!(docs, vec![Document::new("a", "alpha")]);

        let missing = JsonlCorpusLoader::new(dir.path().join("nope.jsonl")).load();
        assert!(missing.is_err());
    }
}
