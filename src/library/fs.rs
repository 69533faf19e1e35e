//! Filesystem-backed media library.
//!
//! Completed songs live in the media folder under zero-padded id names
//! (`0001.mp3`), covers under `P0001.<ext>`, and every persisted record is
//! appended to a JSONL catalog. Ids are allocated max+1 from the catalog at
//! open time and only advance once the write they name has landed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use lofty::prelude::{Accessor, AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::LibraryConfig;

use super::{CoverArt, CoverId, LibraryError, MediaLibrary, SongId, TrackMetadata};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CatalogRecord {
    Song {
        id: SongId,
        file: String,
        title: String,
        artist: String,
        album: String,
        year: Option<u32>,
        duration_ms: u64,
        cover_id: Option<CoverId>,
        #[serde(with = "chrono::serde::ts_seconds")]
        added_at: chrono::DateTime<chrono::Utc>,
    },
    Cover {
        id: CoverId,
        file: String,
    },
}

#[derive(Debug)]
struct Counters {
    next_song_id: SongId,
    next_cover_id: CoverId,
}

pub struct FsLibrary {
    media_dir: PathBuf,
    covers_dir: PathBuf,
    catalog_path: PathBuf,
    // One commit at a time: the guard covers id allocation, the file move,
    // and the catalog append together.
    counters: Mutex<Counters>,
}

impl FsLibrary {
    /// Open the library, creating its folders and replaying the catalog to
    /// find the highest allocated ids.
    pub async fn open(config: &LibraryConfig) -> Result<Self, LibraryError> {
        tokio::fs::create_dir_all(&config.media_dir).await?;
        tokio::fs::create_dir_all(&config.covers_dir).await?;
        if let Some(parent) = config.catalog_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut max_song_id = 0;
        let mut max_cover_id = 0;
        if tokio::fs::try_exists(&config.catalog_path).await? {
            let raw = tokio::fs::read_to_string(&config.catalog_path).await?;
            for (number, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: CatalogRecord = serde_json::from_str(line).map_err(|err| {
                    LibraryError::Catalog(format!("line {}: {err}", number + 1))
                })?;
                match record {
                    CatalogRecord::Song { id, .. } => max_song_id = max_song_id.max(id),
                    CatalogRecord::Cover { id, .. } => max_cover_id = max_cover_id.max(id),
                }
            }
        }

        info!(
            media_dir = %config.media_dir.display(),
            songs = max_song_id,
            covers = max_cover_id,
            "opened media library"
        );

        Ok(Self {
            media_dir: config.media_dir.clone(),
            covers_dir: config.covers_dir.clone(),
            catalog_path: config.catalog_path.clone(),
            counters: Mutex::new(Counters {
                next_song_id: max_song_id + 1,
                next_cover_id: max_cover_id + 1,
            }),
        })
    }

    async fn append_record(&self, record: &CatalogRecord) -> Result<(), LibraryError> {
        let mut line = serde_json::to_string(record)
            .map_err(|err| LibraryError::Catalog(err.to_string()))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.catalog_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl MediaLibrary for FsLibrary {
    async fn extract_metadata(&self, path: &Path) -> Result<TrackMetadata, LibraryError> {
        let path = path.to_path_buf();
        let metadata = tokio::task::spawn_blocking(move || read_track_metadata(&path))
            .await
            .map_err(|err| LibraryError::TagRead(format!("tag reader died: {err}")))?;
        Ok(metadata)
    }

    async fn extract_cover(&self, path: &Path) -> Result<Option<CoverArt>, LibraryError> {
        let path = path.to_path_buf();
        let cover = tokio::task::spawn_blocking(move || read_cover(&path))
            .await
            .map_err(|err| LibraryError::TagRead(format!("tag reader died: {err}")))?;
        Ok(cover)
    }

    async fn persist_cover(&self, cover: CoverArt) -> Result<CoverId, LibraryError> {
        let mut counters = self.counters.lock().await;
        let id = counters.next_cover_id;
        let file = format!("P{id:04}.{}", cover.extension);
        tokio::fs::write(self.covers_dir.join(&file), &cover.data).await?;
        self.append_record(&CatalogRecord::Cover {
            id,
            file: file.clone(),
        })
        .await?;
        counters.next_cover_id += 1;
        debug!(id, %file, "cover persisted");
        Ok(id)
    }

    async fn persist_song(
        &self,
        metadata: &TrackMetadata,
        cover_id: Option<CoverId>,
        audio_path: &Path,
    ) -> Result<SongId, LibraryError> {
        let mut counters = self.counters.lock().await;
        let id = counters.next_song_id;
        let file = format!("{id:04}.mp3");
        move_file(audio_path, &self.media_dir.join(&file)).await?;
        self.append_record(&CatalogRecord::Song {
            id,
            file: file.clone(),
            title: metadata.title.clone(),
            artist: metadata.artist.clone(),
            album: metadata.album.clone(),
            year: metadata.year,
            duration_ms: metadata.duration_ms,
            cover_id,
            added_at: chrono::Utc::now(),
        })
        .await?;
        counters.next_song_id += 1;
        info!(id, %file, title = %metadata.title, "song persisted");
        Ok(id)
    }
}

/// Rename into place, falling back to copy+remove when the scratch dir is
/// on a different filesystem.
async fn move_file(src: &Path, dest: &Path) -> Result<(), LibraryError> {
    if tokio::fs::rename(src, dest).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(src, dest).await?;
    tokio::fs::remove_file(src).await?;
    Ok(())
}

/// Read tags from an audio file. Missing or unreadable tags degrade to a
/// file-stem title rather than failing the item.
fn read_track_metadata(path: &Path) -> TrackMetadata {
    let stem_title = || {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    };

    let tagged = match Probe::open(path).and_then(|probe| probe.read()) {
        Ok(tagged) => tagged,
        Err(err) => {
            debug!(path = %path.display(), %err, "tag read failed, using file stem");
            return TrackMetadata {
                title: stem_title(),
                artist: String::new(),
                album: String::new(),
                year: None,
                duration_ms: 0,
            };
        }
    };

    let duration_ms = tagged.properties().duration().as_millis() as u64;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());

    let mut title = tag
        .and_then(|tag| tag.title().map(|title| title.trim().to_string()))
        .unwrap_or_default();
    if title.is_empty() {
        title = stem_title();
    }

    TrackMetadata {
        title,
        artist: tag
            .and_then(|tag| tag.artist().map(|artist| artist.trim().to_string()))
            .unwrap_or_default(),
        album: tag
            .and_then(|tag| tag.album().map(|album| album.trim().to_string()))
            .unwrap_or_default(),
        year: tag.and_then(|tag| tag.year()),
        duration_ms,
    }
}

/// First embedded picture, if the file has readable tags at all.
fn read_cover(path: &Path) -> Option<CoverArt> {
    let tagged = Probe::open(path).and_then(|probe| probe.read()).ok()?;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag())?;
    let picture = tag.pictures().first()?;

    let extension = match picture.mime_type().map(|mime| mime.to_string()).as_deref() {
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        Some("image/gif") => "gif",
        Some("image/bmp") => "bmp",
        Some("image/tiff") => "tiff",
        _ => "jpg",
    };

    Some(CoverArt {
        data: Bytes::copy_from_slice(picture.data()),
        extension: extension.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(root: &Path) -> LibraryConfig {
        LibraryConfig {
            media_dir: root.join("media"),
            covers_dir: root.join("covers"),
            catalog_path: root.join("catalog.jsonl"),
        }
    }

    fn sample_metadata(title: &str) -> TrackMetadata {
        TrackMetadata {
            title: title.to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            year: Some(2021),
            duration_ms: 200_000,
        }
    }

    #[tokio::test]
    async fn persists_song_under_padded_id_name() {
        let root = TempDir::new().unwrap();
        let config = test_config(root.path());
        let library = FsLibrary::open(&config).await.unwrap();

        let source = root.path().join("incoming.mp3");
        tokio::fs::write(&source, b"not really audio").await.unwrap();

        let id = library
            .persist_song(&sample_metadata("First"), None, &source)
            .await
            .unwrap();

        assert_eq!(id, 1);
        assert!(config.media_dir.join("0001.mp3").exists());
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn ids_continue_from_existing_catalog() {
        let root = TempDir::new().unwrap();
        let config = test_config(root.path());

        {
            let library = FsLibrary::open(&config).await.unwrap();
            for n in 0..2 {
                let source = root.path().join(format!("in{n}.mp3"));
                tokio::fs::write(&source, b"x").await.unwrap();
                library
                    .persist_song(&sample_metadata("Track"), None, &source)
                    .await
                    .unwrap();
            }
        }

        // Reopen: the catalog replay must pick up where the ids left off.
        let library = FsLibrary::open(&config).await.unwrap();
        let source = root.path().join("in3.mp3");
        tokio::fs::write(&source, b"x").await.unwrap();
        let id = library
            .persist_song(&sample_metadata("Third"), None, &source)
            .await
            .unwrap();
        assert_eq!(id, 3);
        assert!(config.media_dir.join("0003.mp3").exists());
    }

    #[tokio::test]
    async fn persists_cover_with_prefix() {
        let root = TempDir::new().unwrap();
        let config = test_config(root.path());
        let library = FsLibrary::open(&config).await.unwrap();

        let id = library
            .persist_cover(CoverArt {
                data: Bytes::from_static(b"\x89PNG fake"),
                extension: "png".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(id, 1);
        assert!(config.covers_dir.join("P0001.png").exists());
    }

    #[tokio::test]
    async fn corrupted_catalog_is_reported() {
        let root = TempDir::new().unwrap();
        let config = test_config(root.path());
        tokio::fs::write(&config.catalog_path, "{not json}\n")
            .await
            .unwrap();

        let result = FsLibrary::open(&config).await;
        assert!(matches!(result, Err(LibraryError::Catalog(_))));
    }

    #[tokio::test]
    async fn unreadable_tags_fall_back_to_file_stem() {
        let root = TempDir::new().unwrap();
        let config = test_config(root.path());
        let library = FsLibrary::open(&config).await.unwrap();

        let source = root.path().join("Some Great Song.mp3");
        tokio::fs::write(&source, b"garbage bytes").await.unwrap();

        let metadata = library.extract_metadata(&source).await.unwrap();
        assert_eq!(metadata.title, "Some Great Song");
        assert!(metadata.artist.is_empty());
        assert_eq!(metadata.duration_ms, 0);

        let cover = library.extract_cover(&source).await.unwrap();
        assert!(cover.is_none());
    }
}
