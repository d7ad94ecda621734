//! CLI entrypoint for Sift.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use search::{HybridSearcher, SearchOutcome};
use sift_core::{open_searcher, reload_corpus, CorpusWatcher, JsonlCorpusLoader, SiftConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

const NO_RESULTS: &str = "No relevant information found for this query.";
const SNIPPET_CHARS: usize = 200;

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Sift: hybrid lexical + semantic retrieval over a document corpus", long_about = None)]
struct Cli {
    /// Config file (default: sift.config.toml in the standard locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the corpus for a query
    Search {
        query: String,
        /// Number of results (default: search.limit)
        #[arg(long, short)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Answer queries read from stdin, one per line
    Repl {
        /// Reload the corpus when its file changes
        #[arg(long)]
        watch: bool,
        #[arg(long, short)]
        limit: Option<usize>,
    },
    /// Show corpus and backend status
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Write a default config file
    InitConfig {
        /// Destination (default: platform config dir)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig { path, force } => init_config(path, force),
        Commands::Search { query, limit, json } => {
            let config = load_config(cli.config.as_ref())?;
            let searcher = open_searcher(&config).await?;
            let outcome = searcher.search(&query, limit.unwrap_or(config.search.limit)).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
            Ok(())
        }
        Commands::Repl { watch, limit } => {
            let config = load_config(cli.config.as_ref())?;
            let searcher = Arc::new(open_searcher(&config).await?);
            if watch || config.corpus.watch {
                spawn_reloader(searcher.clone(), &config)?;
            }
            repl(&searcher, limit.unwrap_or(config.search.limit)).await
        }
        Commands::Status { json } => {
            let config = load_config(cli.config.as_ref())?;
            let searcher = open_searcher(&config).await?;
            let status = sift_core::status(&searcher).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("corpus:    {}", config.corpus_path().map(|p| p.display().to_string()).unwrap_or_else(|| "(none)".into()));
                println!("snapshot:  {}", status.snapshot_version);
                println!("documents: {}", status.documents);
                println!("vectors:   {} ({})", status.vector_rows, config.vector_dir().display());
                println!("reranker:  {}", status.reranker);
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SiftConfig> {
    match path {
        Some(path) => SiftConfig::load_from(path),
        None => SiftConfig::load(),
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path
        .or_else(SiftConfig::default_config_path)
        .unwrap_or_else(|| PathBuf::from(SiftConfig::FILENAME));
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, SiftConfig::generate_default_config())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

fn print_outcome(outcome: &SearchOutcome) {
    for d in &outcome.degradations {
        eprintln!("  degraded: {} ({})", d.backend, d.reason);
    }

    if outcome.hits.is_empty() {
        println!("{}", NO_RESULTS);
        return;
    }

    for (i, hit) in outcome.hits.iter().enumerate() {
        let sources: Vec<String> = hit.sources.iter().map(|s| s.to_string()).collect();
        println!("{}. {} (score {:.4}, {})", i + 1, hit.id, hit.score, sources.join("+"));
        println!("   {}", snippet(&hit.text));
    }
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > SNIPPET_CHARS {
        let truncated: String = flat.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", truncated)
    } else {
        flat
    }
}

async fn repl(searcher: &HybridSearcher, limit: usize) -> Result<()> {
    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if interactive {
            eprint!("> ");
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        let outcome = searcher.search(query, limit).await;
        print_outcome(&outcome);
        println!();
    }
    Ok(())
}

/// Reload the corpus in the background whenever its file changes.
fn spawn_reloader(searcher: Arc<HybridSearcher>, config: &SiftConfig) -> Result<()> {
    let path = config
        .corpus_path()
        .context("watch mode needs corpus.path in the config")?;
    let watcher = CorpusWatcher::new(&path, Duration::from_secs(config.corpus.debounce_secs))?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    // notify delivers on a std channel; bridge it from a plain thread.
    std::thread::spawn(move || {
        while watcher.wait_for_change().is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });

    let loader = JsonlCorpusLoader::new(path);
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            match reload_corpus(&searcher, &loader).await {
                Ok(version) => eprintln!("  reloaded corpus (snapshot {})", version),
                Err(e) => log::error!("reload failed, keeping the current corpus: {:#}", e),
            }
        }
    });
    Ok(())
}
