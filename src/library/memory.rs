//! In-memory library for tests and development.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CoverArt, CoverId, LibraryError, MediaLibrary, SongId, TrackMetadata};

/// Song record as captured by `MemoryLibrary::persist_song`.
#[derive(Debug, Clone)]
pub struct StoredSong {
    pub id: SongId,
    pub metadata: TrackMetadata,
    pub cover_id: Option<CoverId>,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
struct MemoryInner {
    songs: Vec<StoredSong>,
    covers: i64,
}

/// Library that records commits without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryLibrary {
    inner: Mutex<MemoryInner>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn songs(&self) -> Vec<StoredSong> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .songs
            .clone()
    }
}

#[async_trait]
impl MediaLibrary for MemoryLibrary {
    async fn extract_metadata(&self, path: &Path) -> Result<TrackMetadata, LibraryError> {
        Ok(TrackMetadata {
            title: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            artist: String::new(),
            album: String::new(),
            year: None,
            duration_ms: 0,
        })
    }

    async fn extract_cover(&self, _path: &Path) -> Result<Option<CoverArt>, LibraryError> {
        Ok(None)
    }

    async fn persist_cover(&self, _cover: CoverArt) -> Result<CoverId, LibraryError> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.covers += 1;
        Ok(inner.covers)
    }

    async fn persist_song(
        &self,
        metadata: &TrackMetadata,
        cover_id: Option<CoverId>,
        audio_path: &Path,
    ) -> Result<SongId, LibraryError> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = inner.songs.len() as SongId + 1;
        inner.songs.push(StoredSong {
            id,
            metadata: metadata.clone(),
            cover_id,
            path: audio_path.to_path_buf(),
        });
        Ok(id)
    }
}
