//! Configuration file handling for Sift.
//!
//! Loads settings from `sift.config.toml` with the following search order:
//! 1. Current directory
//! 2. ~/.config/sift/sift.config.toml (Linux/macOS)
//! 3. %APPDATA%\sift\sift.config.toml (Windows)
//! 4. ~/.sift/sift.config.toml

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use search::SearchOptions;
use serde::{Deserialize, Serialize};
use store::{DistanceMetric, Stemmer, DEFAULT_TABLE_NAME};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SiftConfig {
    pub corpus: CorpusConfig,
    pub lexical: LexicalConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    pub reranker: RerankerConfig,
    pub search: SearchConfig,
}

/// Corpus source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// JSONL file with one `{"id", "text", "metadata"}` object per line.
    pub path: Option<PathBuf>,
    /// Reload the corpus when the file changes.
    pub watch: bool,
    /// Debounce delay in seconds.
    pub debounce_secs: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: None,
            watch: false,
            debounce_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LexicalConfig {
    pub stemmer: Stemmer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Http,
    Local,
}

/// Query embedding service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Endpoint for the `http` provider.
    pub url: String,
    /// Model name for the `local` provider.
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Http,
            url: "http://localhost:8000/embed".into(),
            model: None,
            timeout_secs: 8,
        }
    }
}

/// Vector similarity store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// LanceDB directory (default: platform data dir).
    pub path: Option<PathBuf>,
    pub table: String,
    pub distance: DistanceMetric,
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: DEFAULT_TABLE_NAME.into(),
            distance: DistanceMetric::L2,
            timeout_secs: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RerankerProvider {
    #[default]
    None,
    Local,
    Http,
}

/// Optional second-pass reranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub provider: RerankerProvider,
    /// Cross-encoder name for the `local` provider.
    pub model: Option<String>,
    /// Endpoint for the `http` provider.
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: RerankerProvider::None,
            model: None,
            url: None,
            timeout_secs: 8,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default number of results.
    pub limit: usize,
    /// Hits requested from each backend before fusion.
    pub candidate_pool: usize,
    pub rrf_k: f32,
    /// At most 1.
    pub max_retries: u32,
    /// Whole-request ceiling; defaults to the slowest remote timeout plus 2s.
    pub deadline_ms: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 3,
            candidate_pool: 20,
            rrf_k: search::fusion::DEFAULT_RRF_K,
            max_retries: 1,
            deadline_ms: None,
        }
    }
}

impl SiftConfig {
    /// Config file name.
    pub const FILENAME: &'static str = "sift.config.toml";

    /// Load configuration from file, searching standard locations.
    /// Returns default config if no file found.
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::find_config_file() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: SiftConfig =
            toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Find config file in standard locations.
    pub fn find_config_file() -> Option<PathBuf> {
        // 1. Current directory
        let current = PathBuf::from(Self::FILENAME);
        if current.exists() {
            return Some(current);
        }

        // 2. Config directory (~/.config/sift/ on Linux/macOS)
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("sift").join(Self::FILENAME);
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Home directory fallback
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".sift").join(Self::FILENAME);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Get the default config file path for the current platform.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sift").join(Self::FILENAME))
    }

    /// Corpus file, with `~` expanded.
    pub fn corpus_path(&self) -> Option<PathBuf> {
        self.corpus.path.as_deref().map(expand)
    }

    /// LanceDB directory (uses vector.path or the platform data dir).
    pub fn vector_dir(&self) -> PathBuf {
        match &self.vector.path {
            Some(path) => expand(path),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sift")
                .join("vectors"),
        }
    }

    /// Orchestrator tuning derived from this config.
    pub fn search_options(&self) -> SearchOptions {
        let embed_timeout = Duration::from_secs(self.embedding.timeout_secs);
        let vector_timeout = Duration::from_secs(self.vector.timeout_secs);
        let rerank_timeout = Duration::from_secs(self.reranker.timeout_secs);

        let deadline = match self.search.deadline_ms {
            Some(ms) => Duration::from_millis(ms),
            None => {
                let mut slowest = embed_timeout.max(vector_timeout);
                if self.reranker.provider != RerankerProvider::None {
                    slowest = slowest.max(rerank_timeout);
                }
                slowest + Duration::from_secs(2)
            }
        };

        // A non-positive k lets 1/(rank + k) blow up at the top ranks.
        let rrf_k = if self.search.rrf_k.is_finite() && self.search.rrf_k > 0.0 {
            self.search.rrf_k
        } else {
            log::warn!(
                "search.rrf_k = {} is not a positive number, using {}",
                self.search.rrf_k,
                search::fusion::DEFAULT_RRF_K
            );
            search::fusion::DEFAULT_RRF_K
        };

        SearchOptions {
            candidate_pool: self.search.candidate_pool.max(self.search.limit).max(1),
            rrf_k,
            max_retries: self.search.max_retries.min(1),
            embed_timeout,
            vector_timeout,
            rerank_timeout,
            deadline,
        }
    }

    /// Generate a default config file with comments.
    pub fn generate_default_config() -> String {
        r#"# Sift Configuration
# Place this file at:
#   - ./sift.config.toml (current directory)
#   - ~/.config/sift/sift.config.toml (Linux/macOS)
#   - %APPDATA%\sift\sift.config.toml (Windows)

[corpus]
# JSONL file, one {"id": ..., "text": ..., "metadata": {...}} per line
path = "~/sift/corpus.jsonl"

# Reload the corpus when the file changes (repl mode)
watch = false

# Debounce delay (seconds) - wait for file changes to settle
debounce_secs = 2

[lexical]
# Stemming language: "none", "english", or "spanish"
stemmer = "none"

[embedding]
# "http" (remote service) or "local" (fastembed model)
provider = "http"

# POST {"text": ...} -> {"embedding": [...]}
url = "http://localhost:8000/embed"

# Model for the local provider
# model = "all-MiniLM-L6-v2"

timeout_secs = 8

[vector]
# LanceDB directory (default: ~/.local/share/sift/vectors)
# path = "/custom/path/to/vectors"

table = "embeddings"

# "l2", "cosine", or "dot"
distance = "l2"

timeout_secs = 8

[reranker]
# "none", "local" (cross-encoder), or "http"
provider = "none"

# model = "jina-reranker-v1-turbo-en"
# url = "http://localhost:8000/rerank"

timeout_secs = 8

[search]
# Default number of results
limit = 3

# Hits fetched from each backend before fusion
candidate_pool = 20

# Reciprocal rank fusion constant
rrf_k = 60.0

# Retries for a failed embedding or vector call (0 or 1)
max_retries = 1

# Overall request ceiling in milliseconds (default: slowest timeout + 2000)
# deadline_ms = 10000
"#
        .to_string()
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SiftConfig::default();
        assert_eq!(config.search.limit, 3);
        assert_eq!(config.search.rrf_k, 60.0);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Http);
        assert_eq!(config.reranker.provider, RerankerProvider::None);
        assert_eq!(config.vector.table, "embeddings");
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
            [corpus]
            path = "/srv/kb/corpus.jsonl"

            [lexical]
            stemmer = "spanish"

            [vector]
            distance = "cosine"

            [reranker]
            provider = "local"
            model = "bge-reranker-base"
        "#;

        let config: SiftConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.corpus_path(), Some(PathBuf::from("/srv/kb/corpus.jsonl")));
        assert_eq!(config.lexical.stemmer, Stemmer::Spanish);
        assert_eq!(config.vector.distance, DistanceMetric::Cosine);
        assert_eq!(config.reranker.provider, RerankerProvider::Local);
        assert_eq!(config.embedding.timeout_secs, 8);
    }

    #[test]
    fn test_generated_template_parses() {
        let config: SiftConfig = toml::from_str(&SiftConfig::generate_default_config()).unwrap();
        assert_eq!(config.search.candidate_pool, 20);
        assert_eq!(config.corpus.debounce_secs, 2);
        assert!(config.corpus_path().is_some());
    }

    #[test]
    fn test_search_options_clamp_and_derive_deadline() {
        let mut config = SiftConfig::default();
        config.search.limit = 50;
        config.search.max_retries = 4;
        config.reranker.timeout_secs = 15;
        assert_eq!(config.search_options().deadline, Duration::from_secs(10));

        config.reranker.provider = RerankerProvider::Http;
        let options = config.search_options();
        assert_eq!(options.candidate_pool, 50);
        assert_eq!(options.max_retries, 1);
        assert_eq!(options.deadline, Duration::from_secs(17));

        config.search.deadline_ms = Some(1500);
        assert_eq!(config.search_options().deadline, Duration::from_millis(1500));
    }

    #[test]
    fn test_invalid_rrf_k_falls_back_to_default() {
        let mut config = SiftConfig::default();
        for bad in [-1.0, 0.0, -60.0, f32::NAN, f32::INFINITY] {
            config.search.rrf_k = bad;
            assert_eq!(config.search_options().rrf_k, search::fusion::DEFAULT_RRF_K, "rrf_k = {}", bad);
        }

        config.search.rrf_k = 10.0;
        assert_eq!(config.search_options().rrf_k, 10.0);

        let parsed: SiftConfig = toml::from_str("[search]\nrrf_k = -1.0\n").unwrap();
        assert_eq!(parsed.search_options().rrf_k, search::fusion::DEFAULT_RRF_K);
    }

    #[test]
    fn test_tilde_expansion() {
        let mut config = SiftConfig::default();
        config.vector.path = Some(PathBuf::from("~/vectors"));
        let dir = config.vector_dir();
        assert!(!dir.to_string_lossy().starts_with('~'));
        assert!(dir.ends_with("vectors"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SiftConfig::FILENAME);

        let mut config = SiftConfig::default();
        config.search.limit = 7;
        config.save_to(&path).unwrap();

        let loaded = SiftConfig::load_from(&path).unwrap();
        assert_eq!(loaded.search.limit, 7);
    }
}
