//! Quality tiers and stream-url negotiation.
//!
//! The catalog offers four fidelity tiers, identified on the wire by their
//! format ids. When a lossless tier is not available for a track, the
//! negotiator walks a fixed cascade of lower lossless tiers, one attempt
//! per step. The lossy tier is never entered by cascade - only a direct
//! request reaches it.

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogApi, CatalogError};

/// A fidelity tier offered by the catalog, by ascending wire format id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Quality {
    /// Lossy ~320 kbps
    Mp3,
    /// Lossless 16-bit/44.1kHz
    Cd,
    /// Lossless up to 24-bit/96kHz
    HiRes96,
    /// Lossless up to 24-bit/192kHz
    HiRes192,
}

/// Cascade order for lossless requests, highest first. The chain floors at
/// CD quality: a lossless request never silently degrades to the lossy tier.
pub static LOSSLESS_CASCADE: [Quality; 3] = [Quality::HiRes192, Quality::HiRes96, Quality::Cd];

impl Quality {
    /// Wire format id for this tier.
    pub fn format_id(&self) -> u32 {
        match self {
            Quality::Mp3 => 5,
            Quality::Cd => 6,
            Quality::HiRes96 => 7,
            Quality::HiRes192 => 27,
        }
    }

    pub fn from_format_id(id: u32) -> Option<Self> {
        match id {
            5 => Some(Quality::Mp3),
            6 => Some(Quality::Cd),
            7 => Some(Quality::HiRes96),
            27 => Some(Quality::HiRes192),
            _ => None,
        }
    }

    pub fn is_lossless(&self) -> bool {
        !matches!(self, Quality::Mp3)
    }

    /// File extension for content delivered at this tier.
    pub fn extension(&self) -> &'static str {
        match self {
            Quality::Mp3 => "mp3",
            _ => "flac",
        }
    }

    /// Short human label, used in path templates and progress lines.
    pub fn label(&self) -> &'static str {
        match self {
            Quality::Mp3 => "MP3 320",
            Quality::Cd => "FLAC 16-44",
            Quality::HiRes96 => "FLAC 24-96",
            Quality::HiRes192 => "FLAC 24-192",
        }
    }

    /// The tiers to try for a request at this tier, in order. Lossless
    /// requests cascade downwards through [`LOSSLESS_CASCADE`]; a lossy
    /// request is a single direct attempt.
    pub fn cascade_chain(&self) -> &'static [Quality] {
        match self {
            Quality::Mp3 => &[Quality::Mp3],
            _ => {
                let start = LOSSLESS_CASCADE
                    .iter()
                    .position(|q| q == self)
                    .unwrap_or(LOSSLESS_CASCADE.len() - 1);
                &LOSSLESS_CASCADE[start..]
            }
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Cd
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u32 = s
            .parse()
            .map_err(|_| format!("quality must be a format id (5, 6, 7 or 27), got {s:?}"))?;
        Quality::from_format_id(id).ok_or_else(|| format!("unknown format id {id}"))
    }
}

impl TryFrom<u32> for Quality {
    type Error = String;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        Quality::from_format_id(id).ok_or_else(|| format!("unknown format id {id}"))
    }
}

impl From<Quality> for u32 {
    fn from(q: Quality) -> u32 {
        q.format_id()
    }
}

/// A negotiated, playable stream.
#[derive(Debug, Clone)]
pub struct StreamSource {
    pub url: String,
    /// Tier actually granted; may sit below the requested one
    pub quality: Quality,
    pub mime_type: Option<String>,
}

/// Resolve a playable stream URL for `track_id` at `requested`, walking the
/// cascade on failure. Each step is a single attempt; auth and missing-track
/// errors abort the walk immediately.
pub async fn negotiate_stream(
    api: &dyn CatalogApi,
    track_id: &str,
    requested: Quality,
) -> Result<StreamSource, CatalogError> {
    let mut last_err = CatalogError::StreamUnavailable {
        format_id: requested.format_id(),
    };

    for &tier in requested.cascade_chain() {
        match api.get_file_url(track_id, tier.format_id()).await {
            Ok(resp) => match resp.url {
                Some(url) if !url.is_empty() => {
                    let granted = resp
                        .format_id
                        .and_then(Quality::from_format_id)
                        .unwrap_or(tier);
                    if granted != requested {
                        tracing::info!(
                            track_id,
                            requested = requested.format_id(),
                            granted = granted.format_id(),
                            "quality cascade settled below request"
                        );
                    }
                    return Ok(StreamSource {
                        url,
                        quality: granted,
                        mime_type: resp.mime_type,
                    });
                }
                _ => {
                    tracing::debug!(
                        track_id,
                        format_id = tier.format_id(),
                        restrictions = resp.restrictions.len(),
                        "tier unavailable, cascading"
                    );
                    last_err = CatalogError::StreamUnavailable {
                        format_id: tier.format_id(),
                    };
                }
            },
            Err(e) if e.is_tier_recoverable() => {
                tracing::debug!(track_id, format_id = tier.format_id(), error = %e, "tier failed, cascading");
                last_err = e;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err)
}
