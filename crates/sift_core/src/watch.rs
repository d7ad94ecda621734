//! Watch mode for reloading the corpus when its file changes.
//!
//! Uses the `notify` crate on the corpus file's parent directory, since
//! editors and ingestion jobs often replace the file by renaming over it.
//! Changes are debounced so a burst of writes triggers a single reload.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Watches one corpus file.
pub struct CorpusWatcher {
    _watcher: RecommendedWatcher,
    receiver: Receiver<notify::Result<Event>>,
    corpus: PathBuf,
    debounce: Duration,
}

impl CorpusWatcher {
    pub fn new(corpus: &Path, debounce: Duration) -> Result<Self> {
        let corpus = corpus
            .canonicalize()
            .with_context(|| format!("cannot watch {}", corpus.display()))?;
        let dir = corpus
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        log::info!("watching {}", corpus.display());

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            corpus,
            debounce,
        })
    }

    pub fn path(&self) -> &Path {
        &self.corpus
    }

    /// Block until the corpus changes, then wait for `debounce` of quiet.
    pub fn wait_for_change(&self) -> Result<()> {
        // Wait for the first relevant event
        loop {
            let event = self.receiver.recv().context("watcher channel disconnected")?;
            if self.is_corpus_change(event) {
                break;
            }
        }

        // Debounce: absorb everything within the window
        loop {
            match self.receiver.recv_timeout(self.debounce) {
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return Ok(()),
                Err(RecvTimeoutError::Disconnected) => anyhow::bail!("watcher channel disconnected"),
            }
        }
    }

    fn is_corpus_change(&self, event: notify::Result<Event>) -> bool {
        let event = match event {
            Ok(e) => e,
            Err(e) => {
                log::warn!("watch error: {:?}", e);
                return false;
            }
        };

        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
            return false;
        }
        event.paths.iter().any(|p| self.names_corpus(p))
    }

    fn names_corpus(&self, path: &Path) -> bool {
        path == self.corpus || (path.file_name().is_some() && path.file_name() == self.corpus.file_name())
    }
}
