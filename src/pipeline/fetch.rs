//! Media byte-stream transfer.
//!
//! Streams the negotiated URL into a `.part` file next to the destination
//! and renames it into place once the body is complete, so a crash or
//! cancellation never leaves a half-written file at the final path.
//! Progress callbacks are throttled to whole-percent steps.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;

/// Progress callback: (loaded bytes, total bytes when known).
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Media transfer, as the pipeline consumes it. The production impl is
/// [`Fetcher`]; tests substitute one that writes fixture bytes.
#[async_trait]
pub trait MediaFetch: Send + Sync {
    /// Stream `url` to `dest`. Checks `cancel` at chunk boundaries.
    async fn stream(
        &self,
        url: &str,
        dest: &Path,
        cancel: &AtomicBool,
        on_progress: ProgressFn<'_>,
    ) -> Result<(), Error>;
}

/// Streams media over HTTP.
pub struct Fetcher {
    http_client: reqwest::Client,
}

impl Fetcher {
    /// `transfer_deadline` bounds the whole transfer including body read.
    pub fn new(transfer_deadline: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("quaver/", env!("CARGO_PKG_VERSION")))
            .timeout(transfer_deadline)
            .build()
            .expect("Failed to build HTTP client");
        Self { http_client }
    }
}

#[async_trait]
impl MediaFetch for Fetcher {
    async fn stream(
        &self,
        url: &str,
        dest: &Path,
        cancel: &AtomicBool,
        on_progress: ProgressFn<'_>,
    ) -> Result<(), Error> {
        let mut response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| transfer_error(dest, e))?;

        if !response.status().is_success() {
            return Err(Error::transfer(
                dest,
                format!("HTTP {} fetching media", response.status()),
            ));
        }

        let total = response.content_length();
        let part = part_path(dest);
        let mut file = std::fs::File::create(&part)?;

        let mut loaded: u64 = 0;
        let mut throttle = ProgressThrottle::new();

        loop {
            if cancel.load(Ordering::Relaxed) {
                drop(file);
                let _ = std::fs::remove_file(&part);
                return Err(Error::Cancelled);
            }

            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = std::fs::remove_file(&part);
                    return Err(transfer_error(dest, e));
                }
            };

            file.write_all(&chunk)?;
            loaded += chunk.len() as u64;
            if throttle.should_report(loaded, total) {
                on_progress(loaded, total);
            }
        }

        file.flush()?;
        drop(file);
        std::fs::rename(&part, dest)?;
        on_progress(loaded, total.or(Some(loaded)));
        Ok(())
    }
}

fn transfer_error(dest: &Path, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::transfer(dest, "media transfer timed out")
    } else {
        Error::transfer(dest, err.to_string())
    }
}

/// The in-flight twin of the destination path (`song.flac.part`).
pub fn part_path(dest: &Path) -> PathBuf {
    let mut s = dest.as_os_str().to_os_string();
    s.push(".part");
    PathBuf::from(s)
}

/// Limits progress callbacks to whole-percent steps, or 512 KiB strides
/// when the total size is unknown.
struct ProgressThrottle {
    last_percent: Option<u64>,
    last_bytes: u64,
}

const UNKNOWN_TOTAL_STRIDE: u64 = 512 * 1024;

impl ProgressThrottle {
    fn new() -> Self {
        Self {
            last_percent: None,
            last_bytes: 0,
        }
    }

    fn should_report(&mut self, loaded: u64, total: Option<u64>) -> bool {
        match total {
            Some(total) if total > 0 => {
                let percent = loaded * 100 / total;
                if self.last_percent != Some(percent) {
                    self.last_percent = Some(percent);
                    return true;
                }
                false
            }
            _ => {
                if loaded - self.last_bytes >= UNKNOWN_TOTAL_STRIDE {
                    self.last_bytes = loaded;
                    return true;
                }
                false
            }
        }
    }
}
