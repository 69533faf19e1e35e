//! Media source collaborators.
//!
//! The worker drives items through a `MediaSource`: playlist expansion,
//! a metadata-only preview probe, and the actual audio fetch. The shipped
//! implementation shells out to yt-dlp; tests script a `MockSource`.

pub mod mock;
pub mod ytdlp;

pub use mock::MockSource;
pub use ytdlp::YtDlpSource;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("media tool I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("media tool failed: {0}")]
    Tool(String),

    #[error("unreadable tool output: {0}")]
    Malformed(String),
}

/// Lightweight metadata probe of a URL before committing to a full fetch.
#[derive(Debug, Clone)]
pub struct TrackPreview {
    pub title: String,
    pub duration_ms: Option<u64>,
    pub thumbnail: Option<String>,
}

/// Which pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Downloading,
    Postprocessing,
}

/// Progress event emitted by a fetch over its reporting channel.
#[derive(Debug, Clone, Copy)]
pub struct FetchProgress {
    pub percent: u8,
    pub phase: FetchPhase,
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Expand a playlist URL into its entries, or return the URL itself for
    /// a single resource.
    ///
    /// Never fails: on any internal fault the original URL comes back as a
    /// single-element result so the item still surfaces as an ordinary
    /// failure later in the pipeline.
    async fn expand(&self, url: &str) -> Vec<String>;

    /// Fetch title/duration/thumbnail without downloading any audio.
    async fn preview(&self, url: &str) -> Result<TrackPreview, SourceError>;

    /// Download and transcode the audio for `url`, emitting zero or more
    /// progress events on `progress`, and return the path of the produced
    /// file. The sender is dropped when the fetch resolves, which closes
    /// the reporting channel.
    async fn fetch(
        &self,
        url: &str,
        quality_kbps: u32,
        progress: mpsc::Sender<FetchProgress>,
    ) -> Result<PathBuf, SourceError>;
}
