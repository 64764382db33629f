//! Per-job download sequencing.
//!
//! One admitted queue item runs through here:
//! resolve -> negotiate quality -> fetch -> enrich (cover/lyrics, non-fatal)
//! -> build paths -> rewrite tags. Batch content (album/playlist/artist)
//! expands to its track list inside the job and aggregates per-track
//! outcomes instead of failing the whole batch.

pub mod fetch;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fetch::{Fetcher, MediaFetch};

use crate::catalog::{adapter, dto, CatalogApi, CatalogClient, Credentials};
use crate::config::Config;
use crate::enricher::lyrics::LyricsApi;
use crate::enricher::{self, CoverApi, CoverArt, CoverFetcher, LyricsClient, LyricsRecord};
use crate::error::{Error, Result};
use crate::model::{ContentType, DownloadResult, QueueStatus, TrackFailure, TrackMetadata};
use crate::paths::PathBuilder;
use crate::quality::{negotiate_stream, Quality};
use crate::tagger::{TagMap, TagOutcome, TagWriter};

/// What one queue item asks for.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub content_type: ContentType,
    pub content_id: String,
    pub quality: Quality,
}

/// Callbacks a running job reports through. The queue wires these to item
/// updates and lifecycle events.
pub struct JobHooks {
    pub on_title: Box<dyn Fn(&str) + Send + Sync>,
    pub on_progress: Box<dyn Fn(u8, QueueStatus) + Send + Sync>,
}

impl JobHooks {
    pub fn noop() -> Self {
        Self {
            on_title: Box::new(|_| {}),
            on_progress: Box::new(|_, _| {}),
        }
    }
}

/// Download behavior switches.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub download_dir: PathBuf,
    pub embed_covers: bool,
    pub save_cover_file: bool,
    pub save_lyrics: bool,
}

/// Executes one job end to end. Owned by the queue and shared by every
/// in-flight job.
pub struct Pipeline {
    catalog: Arc<dyn CatalogApi>,
    cover: Arc<dyn CoverApi>,
    lyrics: Arc<dyn LyricsApi>,
    fetcher: Arc<dyn MediaFetch>,
    tagger: Arc<TagWriter>,
    paths: PathBuilder,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        cover: Arc<dyn CoverApi>,
        lyrics: Arc<dyn LyricsApi>,
        fetcher: Arc<dyn MediaFetch>,
        tagger: Arc<TagWriter>,
        paths: PathBuilder,
        options: PipelineOptions,
    ) -> Self {
        Self {
            catalog,
            cover,
            lyrics,
            fetcher,
            tagger,
            paths,
            options,
        }
    }

    /// Wire up the production clients from config.
    pub fn from_config(config: &Config) -> Self {
        let credentials = Credentials {
            app_id: config.credentials.app_id.clone(),
            app_secret: config.credentials.app_secret.clone(),
            user_auth_token: config.credentials.user_auth_token.clone(),
        };
        let catalog = CatalogClient::new(
            config.network.api_base_url.as_str(),
            credentials,
            config.network.metadata_deadline(),
        );

        let enrich_client = reqwest::Client::builder()
            .user_agent(concat!("quaver/", env!("CARGO_PKG_VERSION")))
            .timeout(config.network.metadata_deadline())
            .build()
            .expect("Failed to build HTTP client");

        Self::new(
            Arc::new(catalog),
            Arc::new(CoverFetcher::new(enrich_client.clone())),
            Arc::new(LyricsClient::new(enrich_client)),
            Arc::new(Fetcher::new(config.network.transfer_deadline())),
            Arc::new(TagWriter::new()),
            PathBuilder::new(
                config.download.folder_template.as_str(),
                config.download.file_template.as_str(),
            ),
            PipelineOptions {
                download_dir: config.download.directory.clone(),
                embed_covers: config.download.embed_covers,
                save_cover_file: config.download.save_cover_file,
                save_lyrics: config.download.save_lyrics,
            },
        )
    }

    /// Run one job to completion. `Err(Error::Cancelled)` reports a raised
    /// cancel flag; any other `Err` is the job's terminal failure reason.
    pub async fn run(
        &self,
        spec: &JobSpec,
        cancel: &AtomicBool,
        hooks: &JobHooks,
    ) -> Result<DownloadResult> {
        tracing::info!(
            content_type = %spec.content_type,
            content_id = %spec.content_id,
            quality = spec.quality.format_id(),
            "starting job"
        );
        match spec.content_type {
            ContentType::Track => self.run_track(spec, cancel, hooks).await,
            ContentType::Album => self.run_album(spec, cancel, hooks).await,
            ContentType::Playlist => self.run_playlist(spec, cancel, hooks).await,
            ContentType::Artist => self.run_artist(spec, cancel, hooks).await,
        }
    }

    async fn run_track(
        &self,
        spec: &JobSpec,
        cancel: &AtomicBool,
        hooks: &JobHooks,
    ) -> Result<DownloadResult> {
        let mut meta = self.resolve_track(&spec.content_id).await?;
        (hooks.on_title)(&format!("{} - {}", meta.artist, meta.title));

        let on_bytes = |loaded: u64, total: Option<u64>| {
            if let Some(total) = total.filter(|t| *t > 0) {
                let percent = (loaded * 90 / total).min(90) as u8;
                (hooks.on_progress)(percent, QueueStatus::Downloading);
            }
        };

        let (path, granted) = self
            .download_one(&mut meta, spec.quality, cancel, &on_bytes)
            .await?;
        (hooks.on_progress)(95, QueueStatus::Processing);

        Ok(DownloadResult::track(path, granted))
    }

    async fn run_album(
        &self,
        spec: &JobSpec,
        cancel: &AtomicBool,
        hooks: &JobHooks,
    ) -> Result<DownloadResult> {
        let album = self.catalog.get_album(&spec.content_id).await?;
        let album_artist = album
            .artist
            .as_ref()
            .map(|a| a.name.clone())
            .unwrap_or_default();
        (hooks.on_title)(&format!("{} - {}", album_artist, album.title));

        let items = album
            .tracks
            .as_ref()
            .map(|list| list.items.clone())
            .unwrap_or_default();
        if items.is_empty() {
            return Ok(DownloadResult::failure("album record has no tracks"));
        }

        let mut outcome = BatchOutcome::new(items.len());
        for (index, track) in items.iter().enumerate() {
            ensure_not_cancelled(cancel)?;
            let mut meta = adapter::track_metadata(track, Some(&album));
            let attempt = self
                .download_one(&mut meta, spec.quality, cancel, &|_, _| {})
                .await;
            outcome.record(track, attempt)?;
            (hooks.on_progress)(
                (((index + 1) * 100) / items.len()) as u8,
                QueueStatus::Downloading,
            );
        }

        (hooks.on_progress)(100, QueueStatus::Processing);
        Ok(outcome.into_result())
    }

    async fn run_playlist(
        &self,
        spec: &JobSpec,
        cancel: &AtomicBool,
        hooks: &JobHooks,
    ) -> Result<DownloadResult> {
        let playlist = self.catalog.get_playlist(&spec.content_id).await?;
        (hooks.on_title)(&playlist.name);

        let items = playlist
            .tracks
            .as_ref()
            .map(|list| list.items.clone())
            .unwrap_or_default();
        if items.is_empty() {
            return Ok(DownloadResult::failure("playlist has no tracks"));
        }

        // Playlists mix albums; fetch each full album record once
        let mut album_cache: HashMap<String, dto::AlbumResponse> = HashMap::new();
        let mut outcome = BatchOutcome::new(items.len());

        for (index, track) in items.iter().enumerate() {
            ensure_not_cancelled(cancel)?;
            let full_album = match &track.album {
                Some(stub) => {
                    if !album_cache.contains_key(&stub.id) {
                        match self.catalog.get_album(&stub.id).await {
                            Ok(full) => {
                                album_cache.insert(stub.id.clone(), full);
                            }
                            Err(e) => {
                                tracing::warn!(album_id = %stub.id, error = %e, "album lookup failed, using inline stub");
                            }
                        }
                    }
                    album_cache.get(&stub.id)
                }
                None => None,
            };

            let mut meta = adapter::track_metadata(track, full_album);
            let attempt = self
                .download_one(&mut meta, spec.quality, cancel, &|_, _| {})
                .await;
            outcome.record(track, attempt)?;
            (hooks.on_progress)(
                (((index + 1) * 100) / items.len()) as u8,
                QueueStatus::Downloading,
            );
        }

        (hooks.on_progress)(100, QueueStatus::Processing);
        Ok(outcome.into_result())
    }

    async fn run_artist(
        &self,
        spec: &JobSpec,
        cancel: &AtomicBool,
        hooks: &JobHooks,
    ) -> Result<DownloadResult> {
        let artist = self.catalog.get_artist(&spec.content_id).await?;
        (hooks.on_title)(&artist.name);

        let album_stubs = artist
            .albums
            .as_ref()
            .map(|list| list.items.clone())
            .unwrap_or_default();
        if album_stubs.is_empty() {
            return Ok(DownloadResult::failure("artist record has no albums"));
        }

        let mut outcome = BatchOutcome::new(0);
        for (index, stub) in album_stubs.iter().enumerate() {
            ensure_not_cancelled(cancel)?;
            let album = match self.catalog.get_album(&stub.id).await {
                Ok(album) => album,
                Err(e) => {
                    outcome.record_album_failure(stub, &e);
                    continue;
                }
            };
            let items = album
                .tracks
                .as_ref()
                .map(|list| list.items.clone())
                .unwrap_or_default();

            outcome.expected += items.len();
            for track in &items {
                ensure_not_cancelled(cancel)?;
                let mut meta = adapter::track_metadata(track, Some(&album));
                let attempt = self
                    .download_one(&mut meta, spec.quality, cancel, &|_, _| {})
                    .await;
                outcome.record(track, attempt)?;
            }
            (hooks.on_progress)(
                (((index + 1) * 100) / album_stubs.len()) as u8,
                QueueStatus::Downloading,
            );
        }

        (hooks.on_progress)(100, QueueStatus::Processing);
        Ok(outcome.into_result())
    }

    /// Fetch the track record and, when it references an album, the full
    /// album record (richer cover/genre/label/date than the inline stub).
    async fn resolve_track(&self, track_id: &str) -> Result<TrackMetadata> {
        let track = self.catalog.get_track(track_id).await?;
        let full_album = match &track.album {
            Some(stub) => match self.catalog.get_album(&stub.id).await {
                Ok(album) => Some(album),
                Err(e) => {
                    tracing::warn!(album_id = %stub.id, error = %e, "album lookup failed, using inline stub");
                    None
                }
            },
            None => None,
        };
        Ok(adapter::track_metadata(&track, full_album.as_ref()))
    }

    /// The per-track pipeline tail: negotiate, fetch, enrich, tag.
    async fn download_one(
        &self,
        meta: &mut TrackMetadata,
        quality: Quality,
        cancel: &AtomicBool,
        on_bytes: fetch::ProgressFn<'_>,
    ) -> Result<(PathBuf, Quality)> {
        ensure_not_cancelled(cancel)?;

        let stream = negotiate_stream(self.catalog.as_ref(), &meta.track_id, quality).await?;

        let folder = self
            .options
            .download_dir
            .join(self.paths.build_folder(meta, stream.quality));
        std::fs::create_dir_all(&folder)?;
        let dest = folder.join(self.paths.build_filename(
            meta,
            stream.quality,
            stream.quality.extension(),
        ));

        self.fetcher
            .stream(&stream.url, &dest, cancel, on_bytes)
            .await?;
        ensure_not_cancelled(cancel)?;

        // Cover and lyrics lookups are independent; run them together
        let (cover, lyrics) = futures::join!(self.fetch_cover(meta), self.lookup_lyrics(meta));
        if let Some(record) = &lyrics {
            meta.lyrics_text = Some(record.plain_text());
        }

        // The rewrite is blocking work (process spawns, file surgery)
        let tags = TagMap::from_metadata(meta);
        let tagger = self.tagger.clone();
        let tag_dest = dest.clone();
        let tag_cover = self.options.embed_covers.then(|| cover.clone()).flatten();
        let tag_lyrics = lyrics.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            tagger.rewrite_tags(&tag_dest, &tags, tag_cover.as_ref(), tag_lyrics.as_ref())
        })
        .await
        .map_err(|e| Error::config(format!("tag task panicked: {e}")))??;

        if let TagOutcome::Degraded { ref sidecar } = outcome {
            tracing::warn!(sidecar = %sidecar.display(), "tags degraded to sidecar");
        }

        if self.options.save_lyrics {
            if let Some(lines) = lyrics.as_ref().and_then(|r| r.synced_lines()) {
                if let Err(e) = enricher::lyrics::write_lrc_sidecar(&dest, meta, lines) {
                    tracing::warn!(error = %e, "failed to write lyrics sidecar");
                }
            }
        }

        if self.options.save_cover_file {
            if let Some(cover) = &cover {
                if let Err(e) = enricher::save_cover_sidecar(&folder, cover) {
                    tracing::warn!(error = %e, "failed to write cover file");
                }
            }
        }

        tracing::info!(path = %dest.display(), quality = %stream.quality, "track finished");
        Ok((dest, stream.quality))
    }

    /// Cover fetch; a miss is logged and the job moves on.
    async fn fetch_cover(&self, meta: &TrackMetadata) -> Option<CoverArt> {
        if !self.options.embed_covers && !self.options.save_cover_file {
            return None;
        }
        let url = meta.cover_url.as_deref()?;
        match self.cover.fetch_cover(url).await {
            Ok(cover) => Some(cover),
            Err(e) => {
                tracing::warn!(track = %meta.title, error = %e, "cover unavailable, continuing without");
                None
            }
        }
    }

    /// Lyrics lookup; a miss is logged and the job moves on.
    async fn lookup_lyrics(&self, meta: &TrackMetadata) -> Option<LyricsRecord> {
        if !self.options.save_lyrics {
            return None;
        }
        match self.lyrics.lookup(meta).await {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(track = %meta.title, error = %e, "lyrics lookup failed");
                None
            }
        }
    }
}

/// Aggregates per-track outcomes for batch jobs.
struct BatchOutcome {
    expected: usize,
    completed: usize,
    failures: Vec<TrackFailure>,
    folder: Option<PathBuf>,
    granted: Option<Quality>,
}

impl BatchOutcome {
    fn new(expected: usize) -> Self {
        Self {
            expected,
            completed: 0,
            failures: Vec::new(),
            folder: None,
            granted: None,
        }
    }

    /// Fold one track attempt in. Cancellation propagates; everything else
    /// becomes a per-track record.
    fn record(
        &mut self,
        track: &dto::TrackResponse,
        attempt: Result<(PathBuf, Quality)>,
    ) -> Result<()> {
        match attempt {
            Ok((path, granted)) => {
                self.completed += 1;
                self.folder = path.parent().map(|p| p.to_path_buf());
                self.granted.get_or_insert(granted);
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(track_id = track.id, error = %e, "track failed");
                self.failures.push(TrackFailure {
                    track_id: track.id.to_string(),
                    title: track.title.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    fn record_album_failure(&mut self, stub: &dto::AlbumResponse, error: &crate::catalog::CatalogError) {
        tracing::warn!(album_id = %stub.id, error = %error, "album skipped");
        self.expected += 1;
        self.failures.push(TrackFailure {
            track_id: stub.id.clone(),
            title: stub.title.clone(),
            reason: format!("album lookup failed: {error}"),
        });
    }

    fn into_result(self) -> DownloadResult {
        let failed = self.failures.len();
        let total = self.expected.max(self.completed + failed);
        DownloadResult {
            success: failed == 0,
            file_path: self.folder,
            actual_quality: self.granted,
            error: (failed > 0).then(|| format!("{failed} of {total} tracks failed")),
            completed_tracks: self.completed,
            failed_tracks: failed,
            track_failures: self.failures,
        }
    }
}

fn ensure_not_cancelled(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }
    Ok(())
}
