//! yt-dlp subprocess media source.
//!
//! Expansion and preview run yt-dlp in JSON-dump mode; the fetch runs it
//! with audio extraction and parses `--newline` progress output into
//! events on the reporting channel.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MediaConfig;

use super::{FetchPhase, FetchProgress, MediaSource, SourceError, TrackPreview};

pub struct YtDlpSource {
    bin: PathBuf,
    scratch_dir: PathBuf,
}

impl YtDlpSource {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            bin: config.ytdlp_bin.clone(),
            scratch_dir: config.scratch_dir.clone(),
        }
    }

    /// Run yt-dlp in simulate mode and parse its single-JSON dump.
    async fn dump_json(&self, args: &[&str], url: &str) -> Result<Value, SourceError> {
        let output = Command::new(&self.bin)
            .args(args)
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(SourceError::Tool(last_line(&output.stderr)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|err| SourceError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn expand(&self, url: &str) -> Vec<String> {
        let info = match self
            .dump_json(&["--flat-playlist", "--dump-single-json"], url)
            .await
        {
            Ok(info) => info,
            Err(err) => {
                warn!(url, %err, "playlist expansion failed, treating as single item");
                return vec![url.to_string()];
            }
        };

        match info.get("entries").and_then(Value::as_array) {
            Some(entries) => {
                let urls: Vec<String> = entries
                    .iter()
                    .filter_map(|entry| entry.get("url").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect();
                if urls.is_empty() {
                    vec![url.to_string()]
                } else {
                    debug!(url, count = urls.len(), "expanded playlist");
                    urls
                }
            }
            None => vec![url.to_string()],
        }
    }

    async fn preview(&self, url: &str) -> Result<TrackPreview, SourceError> {
        let info = self
            .dump_json(&["--dump-single-json", "--no-playlist"], url)
            .await?;

        let title = info
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(url)
            .to_string();
        let duration_ms = info
            .get("duration")
            .and_then(Value::as_f64)
            .map(|seconds| (seconds * 1000.0) as u64);
        let thumbnail = info
            .get("thumbnail")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(TrackPreview {
            title,
            duration_ms,
            thumbnail,
        })
    }

    async fn fetch(
        &self,
        url: &str,
        quality_kbps: u32,
        progress: mpsc::Sender<FetchProgress>,
    ) -> Result<PathBuf, SourceError> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let stem = Uuid::new_v4().simple().to_string();
        let template = self.scratch_dir.join(format!("{stem}.%(ext)s"));
        let expected = self.scratch_dir.join(format!("{stem}.mp3"));

        let mut child = Command::new(&self.bin)
            .arg("-x")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--audio-quality")
            .arg(format!("{quality_kbps}K"))
            .arg("--embed-metadata")
            .arg("--embed-thumbnail")
            .arg("--no-playlist")
            .arg("--newline")
            .arg("-o")
            .arg(&template)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Malformed("child stdout unavailable".to_string()))?;

        // Progress lines must be drained even if the receiver went away,
        // or the child blocks on a full pipe.
        let mut destination = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(update) = parse_progress_line(&line) {
                let _ = progress.send(update).await;
            }
            if let Some(path) = parse_destination(&line) {
                let _ = progress
                    .send(FetchProgress {
                        percent: 100,
                        phase: FetchPhase::Postprocessing,
                    })
                    .await;
                destination = Some(path);
            }
        }

        let status = child.wait().await?;
        let stderr_buf = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(SourceError::Tool(format!(
                "yt-dlp exited with {status}: {}",
                last_line(&stderr_buf)
            )));
        }

        let produced = match destination {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => path,
            _ => expected,
        };
        if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
            return Err(SourceError::Tool("no audio file produced".to_string()));
        }
        Ok(produced)
    }
}

/// `[download]  42.3% of 3.45MiB at 1.2MiB/s` -> a downloading event.
/// Non-progress `[download]` lines (destinations, resume notices) parse to
/// nothing.
fn parse_progress_line(line: &str) -> Option<FetchProgress> {
    let rest = line.strip_prefix("[download]")?.trim_start();
    let percent_str = rest.split('%').next()?;
    let percent = percent_str.trim().parse::<f64>().ok()?;
    Some(FetchProgress {
        percent: percent.clamp(0.0, 100.0) as u8,
        phase: FetchPhase::Downloading,
    })
}

/// `[ExtractAudio] Destination: /path/file.mp3` -> final artifact path.
fn parse_destination(line: &str) -> Option<PathBuf> {
    let rest = line.strip_prefix("[ExtractAudio] Destination: ")?;
    Some(PathBuf::from(rest.trim()))
}

fn last_line(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("no diagnostic output")
        .to_string()
}
