//! Per-URL download item and its lifecycle.

use serde::{Deserialize, Serialize};

/// Lifecycle of a single download item.
///
/// ```text
/// pending -> queued -> downloading -> processing -> completed
/// queued | downloading | processing -> failed
/// failed -> pending        (explicit retry only)
/// ```
///
/// `completed` and `failed` are terminal for the worker; only a retry
/// request re-enters `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Queued,
    Downloading,
    Processing,
    Completed,
    Failed,
}

impl ItemState {
    /// True while the worker has the item between claim and a terminal state.
    pub fn is_mid_flight(self) -> bool {
        matches!(
            self,
            ItemState::Queued | ItemState::Downloading | ItemState::Processing
        )
    }

    /// Whether `self -> next` is a legal edge of the lifecycle.
    pub fn can_transition(self, next: ItemState) -> bool {
        matches!(
            (self, next),
            (ItemState::Pending, ItemState::Queued)
                | (ItemState::Queued, ItemState::Downloading)
                | (ItemState::Queued, ItemState::Failed)
                | (ItemState::Downloading, ItemState::Processing)
                | (ItemState::Downloading, ItemState::Failed)
                | (ItemState::Processing, ItemState::Completed)
                | (ItemState::Processing, ItemState::Failed)
                | (ItemState::Failed, ItemState::Pending)
        )
    }
}

/// One URL's progress through the preview/fetch/postprocess/persist pipeline.
///
/// Owned exclusively by the `JobRegistry`; the worker mutates items only
/// through the registry's synchronized accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadItem {
    pub url: String,
    pub state: ItemState,
    pub progress_percent: u8,
    pub title: Option<String>,
    pub duration_ms: Option<u64>,
    pub thumbnail: Option<String>,
    pub error: Option<String>,
    pub result_song_id: Option<i64>,
}

impl DownloadItem {
    pub fn new(url: String) -> Self {
        Self {
            url,
            state: ItemState::Pending,
            progress_percent: 0,
            title: None,
            duration_ms: None,
            thumbnail: None,
            error: None,
            result_song_id: None,
        }
    }

    /// Reset a failed item for another attempt.
    ///
    /// Progress and error are cleared; title/duration/thumbnail from a prior
    /// successful preview are kept as display hints and refreshed by the next
    /// preview fetch.
    pub fn reset_for_retry(&mut self) {
        self.state = ItemState::Pending;
        self.progress_percent = 0;
        self.error = None;
    }
}
