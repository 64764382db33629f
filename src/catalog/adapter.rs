//! Adapter layer: convert catalog DTOs to domain models
//!
//! This is the ONLY place where DTO types become [`TrackMetadata`]. Track
//! records carry a thin album stub; when the full album record is available
//! its richer fields (genre, label, release date, cover) win over the stub.

use super::dto;
use crate::model::TrackMetadata;

/// Bit depth assumed when the record omits it
const DEFAULT_BIT_DEPTH: u32 = 16;

/// Sampling rate assumed when the record omits it
const DEFAULT_SAMPLING_RATE_HZ: u32 = 44_100;

/// Build canonical track metadata from a track record, merging in the full
/// album record when the caller fetched one.
pub fn track_metadata(
    track: &dto::TrackResponse,
    full_album: Option<&dto::AlbumResponse>,
) -> TrackMetadata {
    let album = full_album.or(track.album.as_ref());

    let artist = track
        .performer
        .as_ref()
        .map(|p| p.name.clone())
        .or_else(|| album.and_then(|a| a.artist.as_ref()).map(|a| a.name.clone()))
        .unwrap_or_default();

    let album_artist = album
        .and_then(|a| a.artist.as_ref())
        .map(|a| a.name.clone())
        .unwrap_or_else(|| artist.clone());

    let bit_depth = track.maximum_bit_depth.unwrap_or(DEFAULT_BIT_DEPTH);
    let sampling_rate_hz = track
        .maximum_sampling_rate
        .map(|khz| (khz * 1000.0).round() as u32)
        .unwrap_or(DEFAULT_SAMPLING_RATE_HZ);

    TrackMetadata {
        track_id: track.id.to_string(),
        title: full_title(track),
        artist,
        album_artist,
        album: album.map(|a| a.title.clone()).unwrap_or_default(),
        year: album
            .and_then(|a| a.release_date_original.as_deref())
            .and_then(parse_year),
        track_number: track.track_number,
        total_tracks: album.and_then(|a| a.tracks_count),
        genre: album.and_then(|a| a.genre.as_ref()).map(|g| g.name.clone()),
        label: album.and_then(|a| a.label.as_ref()).map(|l| l.name.clone()),
        isrc: track.isrc.clone(),
        bit_depth,
        sampling_rate_hz,
        hires: bit_depth > DEFAULT_BIT_DEPTH || track.hires.unwrap_or(false),
        duration_secs: track.duration.unwrap_or(0),
        cover_url: album.and_then(cover_url),
        lyrics_text: None,
    }
}

/// Track title with the version qualifier appended, the way the service
/// displays it ("Song Title (Remastered 2019)").
fn full_title(track: &dto::TrackResponse) -> String {
    match track.version.as_deref() {
        Some(v) if !v.is_empty() => format!("{} ({})", track.title, v),
        _ => track.title.clone(),
    }
}

/// Pull the year out of a YYYY-MM-DD (or bare YYYY) release date.
fn parse_year(date: &str) -> Option<u32> {
    date.get(..4)?.parse().ok()
}

/// Pick the largest rendered cover as the enrichment base URL.
fn cover_url(album: &dto::AlbumResponse) -> Option<String> {
    let image = album.image.as_ref()?;
    image
        .large
        .clone()
        .or_else(|| image.small.clone())
        .or_else(|| image.thumbnail.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_track() -> dto::TrackResponse {
        serde_json::from_value(serde_json::json!({
            "id": 9931,
            "title": "Re: Stacks",
            "performer": {"name": "Bon Iver"},
            "track_number": 9,
            "maximum_bit_depth": 24,
            "maximum_sampling_rate": 96.0,
            "isrc": "USJAG0700309",
            "duration": 405,
            "album": {
                "id": "alb-1",
                "title": "For Emma, Forever Ago",
                "artist": {"name": "Bon Iver"}
            }
        }))
        .unwrap()
    }

    fn full_album() -> dto::AlbumResponse {
        serde_json::from_value(serde_json::json!({
            "id": "alb-1",
            "title": "For Emma, Forever Ago",
            "artist": {"name": "Bon Iver"},
            "genre": {"name": "Indie Folk"},
            "label": {"name": "Jagjaguwar"},
            "release_date_original": "2008-02-19",
            "tracks_count": 9,
            "image": {"large": "https://img.example.com/alb-1_600.jpg"}
        }))
        .unwrap()
    }

    #[test]
    fn test_full_album_record_enriches_stub() {
        let meta = track_metadata(&stub_track(), Some(&full_album()));
        assert_eq!(meta.genre.as_deref(), Some("Indie Folk"));
        assert_eq!(meta.label.as_deref(), Some("Jagjaguwar"));
        assert_eq!(meta.year, Some(2008));
        assert_eq!(meta.total_tracks, Some(9));
        assert_eq!(
            meta.cover_url.as_deref(),
            Some("https://img.example.com/alb-1_600.jpg")
        );
    }

    #[test]
    fn test_stub_only_still_resolves() {
        let meta = track_metadata(&stub_track(), None);
        assert_eq!(meta.album, "For Emma, Forever Ago");
        assert_eq!(meta.album_artist, "Bon Iver");
        // Stub has no genre/label/date
        assert!(meta.genre.is_none());
        assert!(meta.year.is_none());
    }

    #[test]
    fn test_defaults_when_record_omits_depth_and_rate() {
        let track: dto::TrackResponse =
            serde_json::from_value(serde_json::json!({"id": 1, "title": "T"})).unwrap();
        let meta = track_metadata(&track, None);
        assert_eq!(meta.bit_depth, 16);
        assert_eq!(meta.sampling_rate_hz, 44_100);
        assert!(!meta.hires);
    }

    #[test]
    fn test_hires_derivation() {
        // From bit depth
        let meta = track_metadata(&stub_track(), None);
        assert!(meta.hires);
        assert_eq!(meta.sampling_rate_hz, 96_000);

        // From the explicit marker even at 16-bit
        let track: dto::TrackResponse = serde_json::from_value(
            serde_json::json!({"id": 2, "title": "T", "maximum_bit_depth": 16, "hires": true}),
        )
        .unwrap();
        assert!(track_metadata(&track, None).hires);
    }

    #[test]
    fn test_version_appended_to_title() {
        let track: dto::TrackResponse = serde_json::from_value(
            serde_json::json!({"id": 3, "title": "Holocene", "version": "Live"}),
        )
        .unwrap();
        assert_eq!(track_metadata(&track, None).title, "Holocene (Live)");
    }

    #[test]
    fn test_parse_year_variants() {
        assert_eq!(parse_year("2008-02-19"), Some(2008));
        assert_eq!(parse_year("1999"), Some(1999));
        assert_eq!(parse_year("n/a"), None);
        assert_eq!(parse_year(""), None);
    }
}
