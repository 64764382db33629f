//! Lyrics lookup and time-coded sidecar output.
//!
//! Looks lyrics up by (title, artist, album, duration) against an
//! lrclib-compatible service. Synced lyrics are an ordered list of
//! (time offset, text) pairs; plain lyrics are a single block of text.
//! Synced results can additionally be written as an `.lrc` sidecar file
//! beside the audio.

use async_trait::async_trait;
use serde::Deserialize;

use super::EnrichError;
use crate::model::TrackMetadata;

/// One time-coded lyrics line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedLine {
    pub offset_ms: u64,
    pub text: String,
}

/// The two shapes lyrics come in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricsKind {
    /// Ordered time-coded lines
    Synced(Vec<SyncedLine>),
    /// Unsynced text block
    Plain(String),
}

/// A lyrics lookup result with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsRecord {
    pub kind: LyricsKind,
    /// Which service supplied the lyrics
    pub source: String,
}

impl LyricsRecord {
    /// The unsynced text form, regardless of kind. Used when embedding into
    /// tags, which carry plain text only.
    pub fn plain_text(&self) -> String {
        match &self.kind {
            LyricsKind::Plain(text) => text.clone(),
            LyricsKind::Synced(lines) => lines
                .iter()
                .map(|l| l.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn synced_lines(&self) -> Option<&[SyncedLine]> {
        match &self.kind {
            LyricsKind::Synced(lines) => Some(lines),
            LyricsKind::Plain(_) => None,
        }
    }
}

/// Lyrics lookup, as the pipeline consumes it.
#[async_trait]
pub trait LyricsApi: Send + Sync {
    /// Look up lyrics for a track. `Ok(None)` means the service answered
    /// but has nothing for this track.
    async fn lookup(&self, meta: &TrackMetadata) -> Result<Option<LyricsRecord>, EnrichError>;
}

/// What the lyrics service returns for a get-by-signature request.
#[derive(Debug, Deserialize)]
struct LyricsResponse {
    #[serde(rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
    #[serde(rename = "plainLyrics")]
    plain_lyrics: Option<String>,
}

/// lrclib-compatible lyrics client
pub struct LyricsClient {
    http_client: reqwest::Client,
    base_url: String,
}

/// Public lrclib instance
const DEFAULT_BASE_URL: &str = "https://lrclib.net";

impl LyricsClient {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create a client for testing with custom base URL
    #[cfg(test)]
    pub fn with_base_url(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl LyricsApi for LyricsClient {
    async fn lookup(&self, meta: &TrackMetadata) -> Result<Option<LyricsRecord>, EnrichError> {
        let url = format!("{}/api/get", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("track_name", meta.title.as_str()),
                ("artist_name", meta.artist.as_str()),
                ("album_name", meta.album.as_str()),
                ("duration", &meta.duration_secs.to_string()),
            ])
            .send()
            .await
            .map_err(|e| EnrichError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(EnrichError::Network(format!("HTTP {}", response.status())));
        }

        let body: LyricsResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::Parse(e.to_string()))?;

        // Synced lyrics win when both forms are present
        if let Some(synced) = body.synced_lyrics.filter(|s| !s.trim().is_empty()) {
            let lines = parse_lrc(&synced);
            if !lines.is_empty() {
                return Ok(Some(LyricsRecord {
                    kind: LyricsKind::Synced(lines),
                    source: "lrclib".to_string(),
                }));
            }
        }

        if let Some(plain) = body.plain_lyrics.filter(|s| !s.trim().is_empty()) {
            return Ok(Some(LyricsRecord {
                kind: LyricsKind::Plain(plain),
                source: "lrclib".to_string(),
            }));
        }

        Ok(None)
    }
}

/// Parse `[mm:ss.xx] text` lines into ordered synced lines. Lines that
/// don't carry a timestamp (headers, blanks) are skipped.
pub fn parse_lrc(text: &str) -> Vec<SyncedLine> {
    let mut lines: Vec<SyncedLine> = text.lines().filter_map(parse_lrc_line).collect();
    lines.sort_by_key(|l| l.offset_ms);
    lines
}

fn parse_lrc_line(line: &str) -> Option<SyncedLine> {
    let rest = line.trim().strip_prefix('[')?;
    let (stamp, text) = rest.split_once(']')?;

    let (minutes, seconds) = stamp.split_once(':')?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    if !(0.0..60.0).contains(&seconds) {
        return None;
    }

    Some(SyncedLine {
        offset_ms: minutes * 60_000 + (seconds * 1000.0).round() as u64,
        text: text.trim().to_string(),
    })
}

/// Render one offset as an LRC timestamp (`mm:ss.xx`, centisecond precision).
fn format_offset(offset_ms: u64) -> String {
    let minutes = offset_ms / 60_000;
    let seconds = (offset_ms % 60_000) / 1000;
    let centis = (offset_ms % 1000) / 10;
    format!("{minutes:02}:{seconds:02}.{centis:02}")
}

/// Render a full `.lrc` document: descriptive header fields followed by the
/// time-coded lines in offset order.
pub fn format_lrc(meta: &TrackMetadata, lines: &[SyncedLine]) -> String {
    let mut out = String::new();
    out.push_str(&format!("[ti:{}]\n", meta.title));
    out.push_str(&format!("[ar:{}]\n", meta.artist));
    out.push_str(&format!("[al:{}]\n", meta.album));
    out.push_str(&format!(
        "[length:{:02}:{:02}]\n",
        meta.duration_secs / 60,
        meta.duration_secs % 60
    ));
    out.push_str(&format!("[by:quaver v{}]\n\n", env!("CARGO_PKG_VERSION")));

    let mut ordered: Vec<&SyncedLine> = lines.iter().collect();
    ordered.sort_by_key(|l| l.offset_ms);
    for line in ordered {
        out.push_str(&format!("[{}] {}\n", format_offset(line.offset_ms), line.text));
    }
    out
}

/// Write the `.lrc` sidecar beside `audio_path` (same stem, `.lrc` suffix).
pub fn write_lrc_sidecar(
    audio_path: &std::path::Path,
    meta: &TrackMetadata,
    lines: &[SyncedLine],
) -> std::io::Result<std::path::PathBuf> {
    let path = audio_path.with_extension("lrc");
    std::fs::write(&path, format_lrc(meta, lines))?;
    Ok(path)
}
