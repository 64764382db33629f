//! Test utilities and fixtures for quaver tests.
//!
//! This module provides common fixtures and mock API implementations to
//! reduce boilerplate in tests: a synthetic FLAC builder, canned metadata,
//! and in-memory catalog/cover/lyrics/fetch substitutes.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::catalog::{dto, CatalogApi, CatalogError};
use crate::enricher::{CoverApi, CoverArt, EnrichError, LyricsRecord};
use crate::enricher::lyrics::LyricsApi;
use crate::model::TrackMetadata;
use crate::pipeline::fetch::{MediaFetch, ProgressFn};

/// A minimal valid FLAC file: signature, one 34-byte stream descriptor
/// block, then the given audio tail.
pub fn sample_flac_bytes(audio: &[u8]) -> Vec<u8> {
    let mut bytes = crate::tagger::flac::FLAC_MAGIC.to_vec();
    bytes.push(0x80); // STREAMINFO, last block
    bytes.extend_from_slice(&[0, 0, 34]);
    bytes.extend_from_slice(&[9u8; 34]);
    bytes.extend_from_slice(audio);
    bytes
}

/// Build a track DTO the way the API would return it.
pub fn track_dto(id: u64, title: &str, track_number: u32) -> dto::TrackResponse {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "title": title,
        "performer": {"name": "Test Artist"},
        "track_number": track_number,
        "duration": 200,
    }))
    .unwrap()
}

/// Build a full album DTO containing the given tracks.
pub fn album_dto(id: &str, title: &str, tracks: Vec<dto::TrackResponse>) -> dto::AlbumResponse {
    let total = tracks.len() as u32;
    let mut album: dto::AlbumResponse = serde_json::from_value(serde_json::json!({
        "id": id,
        "title": title,
        "artist": {"name": "Test Artist"},
        "genre": {"name": "Testcore"},
        "release_date_original": "2020-01-31",
        "tracks_count": total,
        "image": {"large": "https://img.test/cover_600.jpg"},
    }))
    .unwrap();
    album.tracks = Some(dto::ItemList {
        items: tracks,
        total: Some(total),
    });
    album
}

/// In-memory catalog with configurable stream denials.
#[derive(Default)]
pub struct MockCatalog {
    pub tracks: HashMap<String, dto::TrackResponse>,
    pub albums: HashMap<String, dto::AlbumResponse>,
    pub playlists: HashMap<String, dto::PlaylistResponse>,
    pub artists: HashMap<String, dto::ArtistResponse>,
    /// Track ids whose stream-url requests never yield a URL (all tiers)
    pub deny_stream: HashSet<String>,
}

impl MockCatalog {
    pub fn with_track(mut self, track: dto::TrackResponse) -> Self {
        self.tracks.insert(track.id.to_string(), track);
        self
    }

    pub fn with_album(mut self, album: dto::AlbumResponse) -> Self {
        if let Some(list) = &album.tracks {
            for track in &list.items {
                let mut track = track.clone();
                if track.album.is_none() {
                    let mut stub = album.clone();
                    stub.tracks = None;
                    track.album = Some(stub);
                }
                self.tracks.insert(track.id.to_string(), track);
            }
        }
        self.albums.insert(album.id.clone(), album);
        self
    }

    pub fn deny_stream_for(mut self, track_id: &str) -> Self {
        self.deny_stream.insert(track_id.to_string());
        self
    }
}

#[async_trait]
impl CatalogApi for MockCatalog {
    async fn get_track(&self, track_id: &str) -> Result<dto::TrackResponse, CatalogError> {
        self.tracks.get(track_id).cloned().ok_or(CatalogError::NotFound)
    }

    async fn get_album(&self, album_id: &str) -> Result<dto::AlbumResponse, CatalogError> {
        self.albums.get(album_id).cloned().ok_or(CatalogError::NotFound)
    }

    async fn get_playlist(&self, playlist_id: &str) -> Result<dto::PlaylistResponse, CatalogError> {
        self.playlists
            .get(playlist_id)
            .cloned()
            .ok_or(CatalogError::NotFound)
    }

    async fn get_artist(&self, artist_id: &str) -> Result<dto::ArtistResponse, CatalogError> {
        self.artists
            .get(artist_id)
            .cloned()
            .ok_or(CatalogError::NotFound)
    }

    async fn get_file_url(
        &self,
        track_id: &str,
        format_id: u32,
    ) -> Result<dto::FileUrlResponse, CatalogError> {
        if !self.tracks.contains_key(track_id) {
            return Err(CatalogError::NotFound);
        }
        if self.deny_stream.contains(track_id) {
            return Ok(dto::FileUrlResponse {
                url: None,
                format_id: Some(format_id),
                mime_type: None,
                sampling_rate: None,
                bit_depth: None,
                restrictions: vec![dto::Restriction {
                    code: "FormatRestrictedByFormatAvailability".to_string(),
                }],
            });
        }
        Ok(dto::FileUrlResponse {
            url: Some(format!("https://stream.test/{track_id}/{format_id}")),
            format_id: Some(format_id),
            mime_type: Some("audio/flac".to_string()),
            sampling_rate: None,
            bit_depth: None,
            restrictions: Vec::new(),
        })
    }
}

/// Cover lookup returning canned bytes or a canned error.
pub struct MockCover {
    pub result: Option<Vec<u8>>,
}

#[async_trait]
impl CoverApi for MockCover {
    async fn fetch_cover(&self, base_url: &str) -> Result<CoverArt, EnrichError> {
        match &self.result {
            Some(data) => Ok(CoverArt {
                data: data.clone(),
                mime_type: "image/jpeg".to_string(),
                url: base_url.to_string(),
            }),
            None => Err(EnrichError::NotFound),
        }
    }
}

/// Lyrics lookup returning a canned record.
pub struct MockLyrics {
    pub record: Option<LyricsRecord>,
}

#[async_trait]
impl LyricsApi for MockLyrics {
    async fn lookup(&self, _meta: &TrackMetadata) -> Result<Option<LyricsRecord>, EnrichError> {
        Ok(self.record.clone())
    }
}

/// A fetch that writes fixture bytes instead of hitting the network.
pub struct FixtureFetch {
    pub bytes: Vec<u8>,
}

impl FixtureFetch {
    /// A fixture serving a minimal valid FLAC file.
    pub fn flac() -> Self {
        Self {
            bytes: sample_flac_bytes(b"synthetic-audio-frames"),
        }
    }
}

#[async_trait]
impl MediaFetch for FixtureFetch {
    async fn stream(
        &self,
        _url: &str,
        dest: &Path,
        cancel: &AtomicBool,
        on_progress: ProgressFn<'_>,
    ) -> Result<(), crate::error::Error> {
        if cancel.load(Ordering::Relaxed) {
            return Err(crate::error::Error::Cancelled);
        }
        std::fs::write(dest, &self.bytes)?;
        on_progress(self.bytes.len() as u64, Some(self.bytes.len() as u64));
        Ok(())
    }
}
