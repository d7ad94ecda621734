use std::fs;
use std::path::Path;

use anyhow::Result;
use search::Backend;
use sift_core::{open_searcher, reload_corpus, status, JsonlCorpusLoader, SiftConfig};

const CORPUS: &str = r#"{"id": "faq-0", "text": "Las contraseñas expiran cada 90 días.", "metadata": {"source": "faq"}}
{"id": "faq-1", "text": "Para restablecer la contraseña use el portal de autoservicio."}
{"id": "faq-2", "text": "El horario de la mesa de ayuda es de 8 a 18 horas."}
"#;

/// Config pointing at a local corpus, an empty LanceDB dir and an embedding port nobody listens on.
fn offline_config(dir: &Path) -> SiftConfig {
    let mut config = SiftConfig::default();
    config.corpus.path = Some(dir.join("corpus.jsonl"));
    config.vector.path = Some(dir.join("vectors"));
    config.embedding.url = "http://127.0.0.1:9/embed".into();
    config.embedding.timeout_secs = 1;
    config.search.deadline_ms = Some(3000);
    config
}

#[tokio::test]
async fn serves_lexical_results_when_embedding_is_down() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("corpus.jsonl"), CORPUS)?;
    let config = offline_config(dir.path());

    let searcher = open_searcher(&config).await?;
    let outcome = searcher.search("horario de ayuda", config.search.limit).await;

    assert_eq!(outcome.hits.first().map(|h| h.id.as_str()), Some("faq-2"));
    assert!(outcome.degraded(Backend::Embedding));
    assert_eq!(outcome.snapshot_version, 1);
    Ok(())
}

#[tokio::test]
async fn reload_picks_up_rewritten_corpus() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let corpus = dir.path().join("corpus.jsonl");
    fs::write(&corpus, CORPUS)?;
    let config = offline_config(dir.path());
    let searcher = open_searcher(&config).await?;

    fs::write(&corpus, "{\"id\": \"vpn-0\", \"text\": \"Conéctese a la VPN antes de abrir el portal.\"}\n")?;
    let version = reload_corpus(&searcher, &JsonlCorpusLoader::new(&corpus)).await?;
    assert_eq!(version, 2);

    let hits = searcher.hybrid_search("vpn", 3).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "vpn-0");
    assert!(searcher.hybrid_search("horario", 3).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_reload_keeps_serving_previous_corpus() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let corpus = dir.path().join("corpus.jsonl");
    fs::write(&corpus, CORPUS)?;
    let config = offline_config(dir.path());
    let searcher = open_searcher(&config).await?;

    fs::write(&corpus, "{\"id\": \"broken\"\n")?;
    assert!(reload_corpus(&searcher, &JsonlCorpusLoader::new(&corpus)).await.is_err());

    let engine = status(&searcher).await;
    assert_eq!(engine.snapshot_version, 1);
    assert_eq!(engine.documents, 3);
    assert_eq!(engine.vector_rows, 0);
    assert!(engine.reranker.starts_with("unavailable"));
    Ok(())
}

#[tokio::test]
async fn missing_corpus_file_is_a_startup_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    assert!(open_searcher(&config).await.is_err());
}
