//! Media library collaborators.
//!
//! After a fetch completes, the worker extracts embedded tags and cover
//! art from the produced file and commits one library record per item.
//! The shipped implementation manages an id-addressed media folder; tests
//! use `MemoryLibrary`.

pub mod fs;
pub mod memory;

pub use fs::FsLibrary;
pub use memory::MemoryLibrary;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type SongId = i64;
pub type CoverId = i64;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("tag read failed: {0}")]
    TagRead(String),

    #[error("library I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog corrupted: {0}")]
    Catalog(String),
}

/// Tags read from a finished audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: Option<u32>,
    pub duration_ms: u64,
}

/// Embedded cover art as extracted from the file.
#[derive(Debug, Clone)]
pub struct CoverArt {
    pub data: Bytes,
    pub extension: String,
}

#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Read tags from the file. A file with missing or unreadable tags
    /// still yields metadata (title falls back to the file stem); only
    /// infrastructure faults are errors.
    async fn extract_metadata(&self, path: &Path) -> Result<TrackMetadata, LibraryError>;

    /// First embedded cover picture, if any.
    async fn extract_cover(&self, path: &Path) -> Result<Option<CoverArt>, LibraryError>;

    /// Store cover art and allocate its id.
    async fn persist_cover(&self, cover: CoverArt) -> Result<CoverId, LibraryError>;

    /// Allocate a library record, move the audio artifact into the managed
    /// media location, and durably commit the record. One logical commit
    /// per call; a failure leaves no partial record behind.
    async fn persist_song(
        &self,
        metadata: &TrackMetadata,
        cover_id: Option<CoverId>,
        audio_path: &Path,
    ) -> Result<SongId, LibraryError>;
}
