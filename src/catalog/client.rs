//! Catalog HTTP client
//!
//! Handles communication with the catalog web service: record lookups and
//! signed stream-url issuance.
//!
//! IMPORTANT: stream-url requests are signed over a fixed concatenation of
//! request fields (see [`sign_stream_request`]). The field order is part of
//! the wire contract with the service and must not be reordered.

use std::time::Duration;

use async_trait::async_trait;

use super::dto;
use crate::catalog::CatalogError;

/// User agent string sent on every request
const USER_AGENT: &str = concat!("quaver/", env!("CARGO_PKG_VERSION"));

/// Fixed action name the stream-url endpoint signs under
const FILE_URL_ACTION: &str = "trackgetFileUrl";

/// API credentials for the catalog service.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
    pub user_auth_token: String,
}

/// Catalog lookups and stream-url issuance, as the pipeline consumes them.
///
/// Implement this trait to substitute a mock in tests; production code uses
/// [`CatalogClient`].
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn get_track(&self, track_id: &str) -> Result<dto::TrackResponse, CatalogError>;
    async fn get_album(&self, album_id: &str) -> Result<dto::AlbumResponse, CatalogError>;
    async fn get_playlist(&self, playlist_id: &str) -> Result<dto::PlaylistResponse, CatalogError>;
    async fn get_artist(&self, artist_id: &str) -> Result<dto::ArtistResponse, CatalogError>;
    async fn get_file_url(
        &self,
        track_id: &str,
        format_id: u32,
    ) -> Result<dto::FileUrlResponse, CatalogError>;
}

/// Catalog API client
pub struct CatalogClient {
    http_client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl CatalogClient {
    /// Create a new client. `metadata_deadline` bounds every record lookup
    /// and stream-url request; the media transfer itself uses a separate,
    /// longer deadline in the fetcher.
    pub fn new(base_url: impl Into<String>, credentials: Credentials, metadata_deadline: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(metadata_deadline)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http_client,
            base_url: base_url.into(),
            credentials,
        }
    }

    pub async fn get_track(&self, track_id: &str) -> Result<dto::TrackResponse, CatalogError> {
        let url = format!("{}/track/get?track_id={}", self.base_url, urlencoding::encode(track_id));
        self.get_json(&url).await
    }

    pub async fn get_album(&self, album_id: &str) -> Result<dto::AlbumResponse, CatalogError> {
        let url = format!("{}/album/get?album_id={}", self.base_url, urlencoding::encode(album_id));
        self.get_json(&url).await
    }

    pub async fn get_playlist(&self, playlist_id: &str) -> Result<dto::PlaylistResponse, CatalogError> {
        let url = format!(
            "{}/playlist/get?playlist_id={}&extra=tracks&limit=500",
            self.base_url,
            urlencoding::encode(playlist_id)
        );
        self.get_json(&url).await
    }

    pub async fn get_artist(&self, artist_id: &str) -> Result<dto::ArtistResponse, CatalogError> {
        let url = format!(
            "{}/artist/get?artist_id={}&extra=albums&limit=100",
            self.base_url,
            urlencoding::encode(artist_id)
        );
        self.get_json(&url).await
    }

    /// Request a playable stream URL for `track_id` at `format_id`.
    ///
    /// The request carries a timestamp and a keyed signature; the service
    /// rejects unsigned or reordered requests.
    pub async fn get_file_url(
        &self,
        track_id: &str,
        format_id: u32,
    ) -> Result<dto::FileUrlResponse, CatalogError> {
        let timestamp = chrono::Utc::now().timestamp();
        let signature =
            sign_stream_request(track_id, format_id, timestamp, &self.credentials.app_secret);

        let url = format!(
            "{}/track/getFileUrl?request_ts={}&request_sig={}&track_id={}&format_id={}&intent=stream",
            self.base_url,
            timestamp,
            signature,
            urlencoding::encode(track_id),
            format_id
        );

        self.get_json(&url).await
    }

    /// Send an authenticated GET and decode the JSON body.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        tracing::debug!(url, "catalog request");

        let response = self
            .http_client
            .get(url)
            .header("X-App-Id", &self.credentials.app_id)
            .header("X-User-Auth-Token", &self.credentials.user_auth_token)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(CatalogError::Unauthorized);
        }

        if !status.is_success() {
            // Try to surface the service's own error message
            if let Ok(error) = response.json::<dto::ApiError>().await {
                return Err(CatalogError::Api(error.message));
            }
            return Err(CatalogError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

#[async_trait]
impl CatalogApi for CatalogClient {
    async fn get_track(&self, track_id: &str) -> Result<dto::TrackResponse, CatalogError> {
        CatalogClient::get_track(self, track_id).await
    }

    async fn get_album(&self, album_id: &str) -> Result<dto::AlbumResponse, CatalogError> {
        CatalogClient::get_album(self, album_id).await
    }

    async fn get_playlist(&self, playlist_id: &str) -> Result<dto::PlaylistResponse, CatalogError> {
        CatalogClient::get_playlist(self, playlist_id).await
    }

    async fn get_artist(&self, artist_id: &str) -> Result<dto::ArtistResponse, CatalogError> {
        CatalogClient::get_artist(self, artist_id).await
    }

    async fn get_file_url(
        &self,
        track_id: &str,
        format_id: u32,
    ) -> Result<dto::FileUrlResponse, CatalogError> {
        CatalogClient::get_file_url(self, track_id, format_id).await
    }
}

fn map_transport_error(err: reqwest::Error) -> CatalogError {
    if err.is_timeout() {
        CatalogError::Timeout
    } else {
        CatalogError::Network(err.to_string())
    }
}

/// Compute the stream-url request signature.
///
/// The digest covers, in this exact order: action name, "format_id", the
/// format, "intent", "stream", "track_id", the track id, the timestamp, and
/// the shared secret. This ordering is the service's wire contract.
pub fn sign_stream_request(track_id: &str, format_id: u32, timestamp: i64, secret: &str) -> String {
    let payload = format!(
        "{FILE_URL_ACTION}format_id{format_id}intentstreamtrack_id{track_id}{timestamp}{secret}"
    );
    format!("{:x}", md5::compute(payload.as_bytes()))
}
