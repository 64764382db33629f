//! Core data models for the download pipeline.
//!
//! Defines the primary entities: [`QueueItem`], [`TrackMetadata`], and
//! [`DownloadResult`], plus the status state machine the queue enforces.
//!
//! # Status transitions
//!
//! Item statuses only move forward:
//!
//! ```text
//! Pending -> Downloading -> Processing -> Completed | Failed
//! Pending | Downloading -> Cancelled
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::quality::Quality;

/// Type of content a queue item refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Track,
    Album,
    Playlist,
    Artist,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Track => "track",
            ContentType::Album => "album",
            ContentType::Playlist => "playlist",
            ContentType::Artist => "artist",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "track" => Ok(ContentType::Track),
            "album" => Ok(ContentType::Album),
            "playlist" => Ok(ContentType::Playlist),
            "artist" => Ok(ContentType::Artist),
            other => Err(format!("unknown content type: {other}")),
        }
    }
}

/// Status of a download queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Downloading,
    Processing,
    Completed, // terminal
    Failed,    // terminal
    Cancelled, // terminal
}

impl QueueStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueStatus::Completed | QueueStatus::Failed | QueueStatus::Cancelled
        )
    }

    /// Returns true if the transition to `next` moves the state machine
    /// forward. Regressions and transitions out of a terminal state are
    /// rejected.
    pub fn can_transition_to(&self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, next),
            (Pending, Downloading)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Downloading, Processing)
                | (Downloading, Failed)
                | (Downloading, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Downloading => "downloading",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
            QueueStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single admitted download request.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Queue-assigned identifier
    pub id: u64,
    /// What kind of content this is
    pub content_type: ContentType,
    /// Catalog identifier of the content
    pub content_id: String,
    /// Quality tier the submitter asked for
    pub requested_quality: Quality,
    /// Current position in the state machine
    pub status: QueueStatus,
    /// Overall progress, 0-100
    pub progress_percent: u8,
    /// Display title; starts as the submitter's hint, refined once resolved
    pub title: Option<String>,
    /// Where the finished download landed (completed items)
    pub result_path: Option<PathBuf>,
    /// Why the item failed (failed items, kept for the item's lifetime)
    pub error_reason: Option<String>,
    /// When the item was admitted (Unix timestamp)
    pub created_at: i64,
    /// When the item reached a terminal state
    pub finished_at: Option<i64>,
}

impl QueueItem {
    pub fn new(
        id: u64,
        content_type: ContentType,
        content_id: impl Into<String>,
        requested_quality: Quality,
        title_hint: Option<String>,
    ) -> Self {
        Self {
            id,
            content_type,
            content_id: content_id.into(),
            requested_quality,
            status: QueueStatus::Pending,
            progress_percent: 0,
            title: title_hint,
            result_path: None,
            error_reason: None,
            created_at: chrono::Utc::now().timestamp(),
            finished_at: None,
        }
    }

    /// Returns true if this item still occupies its (type, id) slot, i.e.
    /// a new submission for the same content must be rejected.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Per-status item counts, as returned by the queue's `stats()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub downloading: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending
            + self.downloading
            + self.processing
            + self.completed
            + self.failed
            + self.cancelled
    }

    /// Items currently counted against the concurrency bound.
    pub fn in_flight(&self) -> usize {
        self.downloading + self.processing
    }
}

/// Canonical metadata for one track, merged from the track record and its
/// full album record. Built once per job and not mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub album_artist: String,
    pub album: String,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub total_tracks: Option<u32>,
    pub genre: Option<String>,
    pub label: Option<String>,
    pub isrc: Option<String>,
    /// Bit depth of the source; 16 when the record omits it
    pub bit_depth: u32,
    /// Sampling rate in Hz; 44100 when the record omits it
    pub sampling_rate_hz: u32,
    /// Derived: bit_depth > 16 or the record carries an explicit hi-res marker
    pub hires: bool,
    pub duration_secs: u32,
    pub cover_url: Option<String>,
    /// Plain lyrics text, filled in by the enricher when available
    pub lyrics_text: Option<String>,
}

/// What a single track's failure looked like, for batch reporting.
#[derive(Debug, Clone)]
pub struct TrackFailure {
    pub track_id: String,
    pub title: String,
    pub reason: String,
}

/// Outcome of one queue item's pipeline run.
///
/// For batch content (album/playlist/artist) the counts cover every expanded
/// track. `success` holds only when every track landed; a partial failure
/// keeps the aggregate counts and per-track reasons instead of discarding
/// the tracks that did finish.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub success: bool,
    /// Final path of the downloaded file (single track), or the batch folder
    pub file_path: Option<PathBuf>,
    /// Tier actually delivered; may be lower than requested after a cascade
    pub actual_quality: Option<Quality>,
    pub error: Option<String>,
    pub completed_tracks: usize,
    pub failed_tracks: usize,
    pub track_failures: Vec<TrackFailure>,
}

impl DownloadResult {
    /// A successful single-track result.
    pub fn track(path: PathBuf, actual_quality: Quality) -> Self {
        Self {
            success: true,
            file_path: Some(path),
            actual_quality: Some(actual_quality),
            error: None,
            completed_tracks: 1,
            failed_tracks: 0,
            track_failures: Vec::new(),
        }
    }

    /// A failed result with a terminal reason.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            file_path: None,
            actual_quality: None,
            error: Some(reason.into()),
            completed_tracks: 0,
            failed_tracks: 1,
            track_failures: Vec::new(),
        }
    }
}
