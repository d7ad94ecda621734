//! Documents and the in-memory store used to hydrate search candidates.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// A unit of retrievable text, as supplied by the corpus loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry, builder style.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Immutable mapping from document id to document.
///
/// Built once per corpus snapshot; ids are unique, a later duplicate replaces
/// the earlier one.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: HashMap<String, Document>,
}

impl DocumentStore {
    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = Document>,
    {
        let mut docs = HashMap::new();
        for doc in documents {
            if let Some(previous) = docs.insert(doc.id.clone(), doc) {
                log::warn!("duplicate document id {:?}; keeping the later record", previous.id);
            }
        }
        Self { docs }
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.docs.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Documents in ascending id order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = &Document> {
        let mut docs: Vec<&Document> = self.docs.values().collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_duplicate_wins() {
        let store = DocumentStore::from_documents(vec![
            Document::new("a", "first"),
            Document::new("b", "other"),
            Document::new("a", "second"),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").unwrap().text, "second");
    }

    #[test]
    fn iter_sorted_is_ordered_by_id() {
        let store = DocumentStore::from_documents(vec![
            Document::new("c", ""),
            Document::new("a", ""),
            Document::new("b", ""),
        ]);
        let ids: Vec<&str> = store.iter_sorted().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn metadata_defaults_to_empty_when_deserializing() {
        let doc: Document = serde_json::from_str(r#"{"id":"x","text":"hello"}"#).unwrap();
        assert!(doc.metadata.is_empty());
        assert!(!DocumentStore::default().contains("x"));
    }
}
