//! Optional per-track enrichment: cover art and lyrics.
//!
//! Everything in this module is best-effort. The pipeline treats a missing
//! cover or missing lyrics as a logged degradation, never a job failure.

pub mod lyrics;

use async_trait::async_trait;

pub use lyrics::{LyricsClient, LyricsKind, LyricsRecord, SyncedLine};

/// Errors from the enrichment lookups. All of them are non-fatal to a job.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EnrichError {
    #[error("not found")]
    NotFound,

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to parse response: {0}")]
    Parse(String),
}

/// Downloaded cover art
#[derive(Debug, Clone)]
pub struct CoverArt {
    /// Image data (JPEG or PNG)
    pub data: Vec<u8>,
    /// MIME type as reported by the server
    pub mime_type: String,
    /// URL the bytes actually came from
    pub url: String,
}

/// Cover art lookup, as the pipeline consumes it.
#[async_trait]
pub trait CoverApi: Send + Sync {
    /// Fetch cover art for the given base URL, preferring a
    /// higher-resolution variant when one can be derived.
    async fn fetch_cover(&self, base_url: &str) -> Result<CoverArt, EnrichError>;
}

/// Fetches cover art, upgrading the catalog's rendered size when possible.
pub struct CoverFetcher {
    http_client: reqwest::Client,
}

impl CoverFetcher {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Download an image, mapping 404 to [`EnrichError::NotFound`].
    async fn download_image(&self, url: &str) -> Result<CoverArt, EnrichError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| EnrichError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(EnrichError::NotFound);
        }

        if !status.is_success() {
            return Err(EnrichError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| EnrichError::Network(e.to_string()))?
            .to_vec();

        Ok(CoverArt {
            data,
            mime_type,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl CoverApi for CoverFetcher {
    async fn fetch_cover(&self, base_url: &str) -> Result<CoverArt, EnrichError> {
        if let Some(upgraded) = original_resolution_variant(base_url) {
            match self.download_image(&upgraded).await {
                Ok(cover) => return Ok(cover),
                Err(e) => {
                    tracing::debug!(url = %upgraded, error = %e, "high-res cover variant failed, retrying original");
                }
            }
        }
        self.download_image(base_url).await
    }
}

/// Derive the original-resolution variant of a rendered cover URL by
/// swapping the size token in the file name (`_600.jpg` -> `_org.jpg`) and
/// any size path segment (`/600/` -> `/org/`). Returns None when the URL
/// carries neither pattern.
fn original_resolution_variant(url: &str) -> Option<String> {
    let mut out = url.to_string();
    let mut changed = false;

    for size in ["_600.", "_230.", "_150.", "_50."] {
        if out.contains(size) {
            out = out.replace(size, "_org.");
            changed = true;
            break;
        }
    }

    for segment in ["/600/", "/230/", "/150/"] {
        if out.contains(segment) {
            out = out.replace(segment, "/org/");
            changed = true;
            break;
        }
    }

    changed.then_some(out)
}

/// Persist the cover next to the album's tracks (`cover.jpg` / `cover.png`).
pub fn save_cover_sidecar(
    folder: &std::path::Path,
    cover: &CoverArt,
) -> std::io::Result<std::path::PathBuf> {
    let ext = if cover.mime_type.contains("png") { "png" } else { "jpg" };
    let path = folder.join(format!("cover.{ext}"));
    std::fs::write(&path, &cover.data)?;
    Ok(path)
}
