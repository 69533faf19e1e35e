use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub library: LibraryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Upper bound for `/downloads/start` request bodies
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_max_request_bytes() -> usize {
    64 * 1024
}

/// Media source configuration (yt-dlp backend)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    /// Path to the yt-dlp binary
    #[serde(default = "default_ytdlp_bin")]
    pub ytdlp_bin: PathBuf,
    /// Working directory for in-flight downloads
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Bitrate used when a start request omits `quality_kbps`
    #[serde(default = "default_quality_kbps")]
    pub default_quality_kbps: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ytdlp_bin: default_ytdlp_bin(),
            scratch_dir: default_scratch_dir(),
            default_quality_kbps: default_quality_kbps(),
        }
    }
}

fn default_ytdlp_bin() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("data/scratch")
}

fn default_quality_kbps() -> u32 {
    192
}

/// Media library layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Final destination for completed audio files
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    /// Destination for extracted cover art
    #[serde(default = "default_covers_dir")]
    pub covers_dir: PathBuf,
    /// Append-only catalog of persisted songs and covers
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            media_dir: default_media_dir(),
            covers_dir: default_covers_dir(),
            catalog_path: default_catalog_path(),
        }
    }
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("data/media")
}

fn default_covers_dir() -> PathBuf {
    PathBuf::from("data/covers")
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("data/catalog.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.server.max_request_bytes, 64 * 1024);
        assert_eq!(config.media.default_quality_kbps, 192);
        assert_eq!(config.media.ytdlp_bin.to_str().unwrap(), "yt-dlp");
        assert_eq!(config.library.media_dir.to_str().unwrap(), "data/media");
    }
}
