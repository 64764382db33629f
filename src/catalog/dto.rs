//! Catalog API Data Transfer Objects
//!
//! These types match EXACTLY what the catalog API returns.
//! DO NOT add fields that aren't in the API response.
//! DO NOT use these types outside the catalog module - convert to domain
//! types via `adapter.rs`.
//!
//! Track records embed a thin album stub; the full album record (fetched
//! separately) additionally carries genre, label and original release date.

use serde::{Deserialize, Serialize};

/// A track record, either standalone or as an album/playlist item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackResponse {
    /// Catalog track ID
    pub id: u64,
    /// Track title
    pub title: String,
    /// Version qualifier (e.g. "Remastered 2019"), appended to the title
    pub version: Option<String>,
    /// Main performer
    pub performer: Option<PersonRef>,
    /// Album this track belongs to (stub on track records)
    pub album: Option<AlbumResponse>,
    /// Track number within its disc
    pub track_number: Option<u32>,
    /// Source bit depth (lossless tiers)
    pub maximum_bit_depth: Option<u32>,
    /// Source sampling rate in kHz (e.g. 44.1, 96.0)
    pub maximum_sampling_rate: Option<f64>,
    /// Explicit hi-res marker
    pub hires: Option<bool>,
    /// International Standard Recording Code
    pub isrc: Option<String>,
    /// Duration in seconds
    pub duration: Option<u32>,
    /// Whether the account may stream this track at all
    pub streamable: Option<bool>,
}

/// A person reference (performer, composer).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonRef {
    pub name: String,
}

/// An album record. Track records carry a stub of this; `album/get` returns
/// the full version including `tracks`, `genre`, `label` and release date.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumResponse {
    /// Catalog album ID
    pub id: String,
    /// Album title
    pub title: String,
    /// Album artist
    pub artist: Option<PersonRef>,
    /// Cover art URLs at the sizes the service renders
    pub image: Option<ImageSet>,
    /// Primary genre
    pub genre: Option<NamedRef>,
    /// Releasing label
    pub label: Option<NamedRef>,
    /// Original release date (YYYY-MM-DD)
    pub release_date_original: Option<String>,
    /// Number of tracks on the album
    pub tracks_count: Option<u32>,
    /// Track listing (full album record only)
    pub tracks: Option<ItemList<TrackResponse>>,
}

/// Cover art at the fixed sizes the service renders.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageSet {
    pub thumbnail: Option<String>,
    pub small: Option<String>,
    pub large: Option<String>,
}

/// A name-only reference (genre, label).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamedRef {
    pub name: String,
}

/// Generic paginated item container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub total: Option<u32>,
}

/// A playlist record with its track listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaylistResponse {
    pub id: u64,
    pub name: String,
    pub tracks: Option<ItemList<TrackResponse>>,
}

/// An artist record with its album listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistResponse {
    pub id: u64,
    pub name: String,
    pub albums: Option<ItemList<AlbumResponse>>,
}

/// Response to a signed stream-url request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileUrlResponse {
    /// The playable URL; absent when the tier is not available
    pub url: Option<String>,
    /// Format actually granted; may differ from the requested one
    pub format_id: Option<u32>,
    pub mime_type: Option<String>,
    pub sampling_rate: Option<f64>,
    pub bit_depth: Option<u32>,
    /// Reasons the request was restricted (e.g. a denied format)
    #[serde(default)]
    pub restrictions: Vec<Restriction>,
}

/// A restriction entry on a stream-url response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Restriction {
    pub code: String,
}

/// Error payload the API returns on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub message: String,
}
