//! Remote catalog API integration.
//!
//! Fetches track/album/playlist/artist records and issues signed stream-url
//! requests. Split the way all API integrations here are:
//! - `dto.rs`: types matching the wire format exactly
//! - `client.rs`: HTTP client, request signing, status mapping
//! - `adapter.rs`: DTO to domain conversion (the only place that happens)

pub mod adapter;
pub mod client;
pub mod dto;

pub use client::{CatalogApi, CatalogClient, Credentials};

/// Errors from the catalog API boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("record not found")]
    NotFound,

    #[error("unauthorized - check app credentials and user token")]
    Unauthorized,

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("no playable stream for format {format_id}")]
    StreamUnavailable { format_id: u32 },
}

impl CatalogError {
    /// True if a quality cascade may recover from this error by trying a
    /// lower tier. Auth and missing-record failures are terminal no matter
    /// the tier.
    pub fn is_tier_recoverable(&self) -> bool {
        !matches!(self, CatalogError::NotFound | CatalogError::Unauthorized)
    }
}
