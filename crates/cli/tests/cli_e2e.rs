use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::{Path, PathBuf};

const CORPUS: &str = r#"{"id": "faq-0", "text": "Las contraseñas expiran cada 90 días.", "metadata": {"source": "faq"}}
{"id": "faq-1", "text": "Para restablecer la contraseña use el portal de autoservicio."}
{"id": "faq-2", "text": "El horario de la mesa de ayuda es de 8 a 18 horas."}
"#;

/// Corpus plus a config whose embedding service is unreachable and whose vector dir is empty.
fn setup(dir: &Path) -> PathBuf {
    let corpus = dir.join("corpus.jsonl");
    fs::write(&corpus, CORPUS).unwrap();

    let config = dir.join("sift.config.toml");
    fs::write(
        &config,
        format!(
            r#"
[corpus]
path = {corpus:?}

[embedding]
url = "http://127.0.0.1:9/embed"
timeout_secs = 1

[vector]
path = {vectors:?}

[search]
deadline_ms = 3000
"#,
            corpus = corpus.to_string_lossy(),
            vectors = dir.join("vectors").to_string_lossy(),
        ),
    )
    .unwrap();
    config
}

#[test]
fn cli_e2e_search_status() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    let mut cmd = Command::cargo_bin("sift").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .args(["search", "horario de ayuda"])
        .assert()
        .success()
        .stdout(contains("1. faq-2"))
        .stderr(contains("degraded: embedding"));

    let mut cmd = Command::cargo_bin("sift").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .args(["search", "zebra"])
        .assert()
        .success()
        .stdout(contains("No relevant information found"));

    let mut cmd = Command::cargo_bin("sift").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(contains("documents: 3"))
        .stdout(contains("reranker:  unavailable"));
}

#[test]
fn cli_e2e_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    let output = Command::cargo_bin("sift")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .args(["search", "contraseña", "--limit", "5", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let hits = outcome["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], "faq-1");
    assert_eq!(hits[0]["sources"][0], "lexical");
    assert_eq!(outcome["ranking"], "fusion");
    assert_eq!(outcome["degradations"][0]["backend"], "embedding");
}

#[test]
fn cli_e2e_repl_reads_queries_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    let mut cmd = Command::cargo_bin("sift").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("repl")
        .write_stdin("portal\n\nhorario\n")
        .assert()
        .success()
        .stdout(contains("faq-1"))
        .stdout(contains("faq-2"));
}
