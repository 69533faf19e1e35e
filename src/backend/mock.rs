//! Scriptable in-memory media source for tests and development.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;

use super::{FetchPhase, FetchProgress, MediaSource, SourceError, TrackPreview};

/// A `MediaSource` whose behavior is scripted per URL.
///
/// By default every URL previews and fetches successfully. Builders add
/// playlist expansions, scripted failures (always or first-attempt-only),
/// a progress script replayed on every fetch, and an optional gate that
/// holds each fetch until the test releases a permit.
#[derive(Clone, Default)]
pub struct MockSource {
    playlists: HashMap<String, Vec<String>>,
    failing_previews: HashMap<String, String>,
    failing_fetches: HashMap<String, String>,
    flaky_fetches: HashMap<String, String>,
    progress_script: Vec<FetchProgress>,
    gate: Option<Arc<Semaphore>>,
    spent_failures: Arc<Mutex<HashSet<String>>>,
    fetch_counter: Arc<Mutex<u64>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand `url` into the given entries instead of itself.
    pub fn with_playlist(mut self, url: &str, entries: &[&str]) -> Self {
        self.playlists
            .insert(url.to_string(), entries.iter().map(|e| e.to_string()).collect());
        self
    }

    /// Previews of `url` always fail with `error`.
    pub fn with_failing_preview(mut self, url: &str, error: &str) -> Self {
        self.failing_previews
            .insert(url.to_string(), error.to_string());
        self
    }

    /// Fetches of `url` always fail with `error`.
    pub fn with_failing_fetch(mut self, url: &str, error: &str) -> Self {
        self.failing_fetches
            .insert(url.to_string(), error.to_string());
        self
    }

    /// The first fetch of `url` fails with `error`; later attempts succeed.
    pub fn with_flaky_fetch(mut self, url: &str, error: &str) -> Self {
        self.flaky_fetches
            .insert(url.to_string(), error.to_string());
        self
    }

    /// Progress events replayed, in order, on every successful fetch.
    pub fn with_progress_script(mut self, script: Vec<FetchProgress>) -> Self {
        self.progress_script = script;
        self
    }

    /// Hold every fetch until the returned semaphore receives a permit.
    /// Lets tests observe a job mid-drain deterministically.
    pub fn with_gate(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }
}

#[async_trait]
impl MediaSource for MockSource {
    async fn expand(&self, url: &str) -> Vec<String> {
        match self.playlists.get(url) {
            Some(entries) => entries.clone(),
            None => vec![url.to_string()],
        }
    }

    async fn preview(&self, url: &str) -> Result<TrackPreview, SourceError> {
        if let Some(error) = self.failing_previews.get(url) {
            return Err(SourceError::Tool(error.clone()));
        }
        Ok(TrackPreview {
            title: format!("Track for {url}"),
            duration_ms: Some(180_000),
            thumbnail: Some(format!("{url}/thumb.jpg")),
        })
    }

    async fn fetch(
        &self,
        url: &str,
        _quality_kbps: u32,
        progress: mpsc::Sender<FetchProgress>,
    ) -> Result<PathBuf, SourceError> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| SourceError::Tool("gate closed".to_string()))?;
            permit.forget();
        }

        if let Some(error) = self.failing_fetches.get(url) {
            return Err(SourceError::Tool(error.clone()));
        }
        if let Some(error) = self.flaky_fetches.get(url) {
            let mut spent = self
                .spent_failures
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if spent.insert(url.to_string()) {
                return Err(SourceError::Tool(error.clone()));
            }
        }

        for event in &self.progress_script {
            let _ = progress.send(*event).await;
        }
        let _ = progress
            .send(FetchProgress {
                percent: 100,
                phase: FetchPhase::Postprocessing,
            })
            .await;

        let serial = {
            let mut counter = self
                .fetch_counter
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *counter += 1;
            *counter
        };
        Ok(PathBuf::from(format!("mock-audio-{serial}.mp3")))
    }
}
