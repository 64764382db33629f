//! Container tag rewriting.
//!
//! Embeds the resolved metadata, cover art and lyrics into the downloaded
//! file. Three strategies, tried in order, and none of them may corrupt the
//! audio:
//!
//! 1. The external `metaflac` utility, when a version probe finds it
//! 2. A pure in-process rewrite of the FLAC metadata block chain
//! 3. A JSON sidecar next to the untouched audio file
//!
//! Lossy containers skip the block surgery and delegate to a lofty-based
//! writer with the same fallback posture.

pub mod external;
pub mod flac;
pub mod lossy;
pub mod sidecar;

use std::path::{Path, PathBuf};

pub use external::{CommandRunner, MetaflacTagger, SystemRunner};

use crate::enricher::{CoverArt, LyricsRecord};
use crate::model::TrackMetadata;

/// Errors from tag rewriting. The ladder recovers from all of them except
/// a failing sidecar write (which is a plain filesystem failure).
#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("file does not start with the FLAC signature")]
    NotFlac,

    #[error("malformed container: {0}")]
    Malformed(String),

    #[error("external utility error: {0}")]
    External(String),

    #[error("tag write failed: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered KEY=VALUE tag fields. Keys follow vorbis comment conventions;
/// empty values never enter the map.
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    fields: Vec<(String, String)>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field unless its value is empty.
    pub fn push_nonempty(&mut self, key: &str, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if !value.is_empty() {
            self.fields.push((key.to_string(), value.to_string()));
        }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The standard field set for a resolved track.
    pub fn from_metadata(meta: &TrackMetadata) -> Self {
        let mut map = TagMap::new();
        map.push_nonempty("TITLE", &meta.title);
        map.push_nonempty("ARTIST", &meta.artist);
        map.push_nonempty("ALBUM", &meta.album);
        map.push_nonempty("ALBUMARTIST", &meta.album_artist);
        if let Some(n) = meta.track_number {
            map.push_nonempty("TRACKNUMBER", n.to_string());
        }
        if let Some(n) = meta.total_tracks {
            map.push_nonempty("TRACKTOTAL", n.to_string());
        }
        if let Some(y) = meta.year {
            map.push_nonempty("DATE", y.to_string());
        }
        map.push_nonempty("GENRE", meta.genre.as_deref().unwrap_or(""));
        map.push_nonempty("LABEL", meta.label.as_deref().unwrap_or(""));
        map.push_nonempty("ISRC", meta.isrc.as_deref().unwrap_or(""));
        map
    }
}

/// Which strategy ended up embedding the tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStrategy {
    ExternalUtility,
    PureRewrite,
    Lossy,
}

/// Outcome of a rewrite: embedded in the container, or degraded to a
/// sidecar document beside the untouched audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    Embedded { strategy: TagStrategy },
    Degraded { sidecar: PathBuf },
}

/// The strategy ladder.
pub struct TagWriter {
    metaflac: MetaflacTagger<Box<dyn CommandRunner>>,
    vendor: String,
}

impl TagWriter {
    pub fn new() -> Self {
        Self::with_runner(Box::new(SystemRunner))
    }

    /// Inject a command runner (tests use a scripted one).
    pub fn with_runner(runner: Box<dyn CommandRunner>) -> Self {
        Self {
            metaflac: MetaflacTagger::new(runner),
            vendor: format!("quaver v{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Version string of the external utility, when present.
    pub fn external_utility_version(&self) -> Option<String> {
        self.metaflac.probe()
    }

    /// Rewrite the file's embedded metadata. Unsynced lyrics text joins the
    /// tag set here; synced sidecar output is the enricher's business.
    pub fn rewrite_tags(
        &self,
        path: &Path,
        tags: &TagMap,
        cover: Option<&CoverArt>,
        lyrics: Option<&LyricsRecord>,
    ) -> Result<TagOutcome, TagError> {
        let mut tags = tags.clone();
        if let Some(lyrics) = lyrics {
            tags.push_nonempty("LYRICS", lyrics.plain_text());
        }

        let embedded = if is_lossless_container(path) {
            self.embed_lossless(path, &tags, cover)
        } else {
            lossy::write(path, &tags, cover).map(|()| TagStrategy::Lossy)
        };

        match embedded {
            Ok(strategy) => Ok(TagOutcome::Embedded { strategy }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "tag embedding failed, writing sidecar");
                let sidecar = sidecar::write_tag_sidecar(
                    path,
                    &tags,
                    &format!("tag embedding failed: {e}"),
                )?;
                Ok(TagOutcome::Degraded { sidecar })
            }
        }
    }

    fn embed_lossless(
        &self,
        path: &Path,
        tags: &TagMap,
        cover: Option<&CoverArt>,
    ) -> Result<TagStrategy, TagError> {
        if let Some(version) = self.metaflac.probe() {
            tracing::debug!(%version, "external tag utility available");
            match self.metaflac.write_tags(path, tags.fields(), cover) {
                Ok(()) => return Ok(TagStrategy::ExternalUtility),
                Err(e) => {
                    tracing::warn!(error = %e, "external tag utility failed, trying pure rewrite");
                }
            }
        }

        self.pure_rewrite(path, tags, cover)?;
        Ok(TagStrategy::PureRewrite)
    }

    /// Strategy 2: parse, rebuild, serialize, atomically replace.
    fn pure_rewrite(
        &self,
        path: &Path,
        tags: &TagMap,
        cover: Option<&CoverArt>,
    ) -> Result<(), TagError> {
        let bytes = std::fs::read(path)?;

        let cover_parts = cover.map(|c| (normalize_image_mime(&c.mime_type), c.data.as_slice()));
        let rewritten = flac::rewrite(&bytes, &self.vendor, tags.fields(), cover_parts)?;

        // Full serialization first, rename after: a crash mid-write leaves
        // the original file intact.
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, &rewritten)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(TagError::Io(e));
        }
        Ok(())
    }
}

impl Default for TagWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// The lossless path handles `.flac`; everything else delegates to the
/// lossy writer.
fn is_lossless_container(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("flac"))
}

/// Collapse whatever the cover server reported into one of the two MIME
/// types the picture block declares.
fn normalize_image_mime(mime: &str) -> &'static str {
    if mime.contains("png") { "image/png" } else { "image/jpeg" }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::external::mocks::ScriptedRunner;
    use super::*;

    fn sample_flac(audio: &[u8]) -> Vec<u8> {
        let mut bytes = flac::FLAC_MAGIC.to_vec();
        bytes.push(0x80); // STREAMINFO, last block
        bytes.extend_from_slice(&[0, 0, 34]);
        bytes.extend_from_slice(&[9u8; 34]);
        bytes.extend_from_slice(audio);
        bytes
    }

    fn sample_meta() -> TrackMetadata {
        TrackMetadata {
            title: "Holocene".to_string(),
            artist: "Bon Iver".to_string(),
            album_artist: "Bon Iver".to_string(),
            album: "Bon Iver".to_string(),
            year: Some(2011),
            track_number: Some(3),
            total_tracks: Some(10),
            genre: Some("Indie".to_string()),
            isrc: Some("US38W1130103".to_string()),
            ..Default::default()
        }
    }

    fn comment_entries(bytes: &[u8]) -> Vec<String> {
        let parsed = flac::parse(bytes).unwrap();
        let block = parsed
            .blocks
            .iter()
            .find(|b| b.block_type == flac::BLOCK_VORBIS_COMMENT)
            .expect("comment block present");
        let payload = parsed.payload(block);

        let read_u32 = |at: usize| {
            u32::from_le_bytes([payload[at], payload[at + 1], payload[at + 2], payload[at + 3]])
                as usize
        };
        let mut cursor = 4 + read_u32(0);
        let count = read_u32(cursor);
        cursor += 4;
        let mut entries = Vec::new();
        for _ in 0..count {
            let len = read_u32(cursor);
            cursor += 4;
            entries.push(String::from_utf8(payload[cursor..cursor + len].to_vec()).unwrap());
            cursor += len;
        }
        entries
    }

    #[test]
    fn test_tag_map_order_and_omission() {
        let mut meta = sample_meta();
        meta.label = None;
        meta.lyrics_text = None;
        let map = TagMap::from_metadata(&meta);

        let keys: Vec<&str> = map.fields().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["TITLE", "ARTIST", "ALBUM", "ALBUMARTIST", "TRACKNUMBER", "TRACKTOTAL", "DATE", "GENRE", "ISRC"]
        );
    }

    #[test]
    fn test_push_nonempty_drops_blank_values() {
        let mut map = TagMap::new();
        map.push_nonempty("TITLE", "T");
        map.push_nonempty("GENRE", "");
        map.push_nonempty("LABEL", "   ");
        assert_eq!(map.fields().len(), 1);
    }

    #[test]
    fn test_pure_rewrite_embeds_when_utility_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.flac");
        let audio = b"frames".to_vec();
        std::fs::write(&path, sample_flac(&audio)).unwrap();

        let writer = TagWriter::with_runner(Box::new(ScriptedRunner::failing()));
        let outcome = writer
            .rewrite_tags(&path, &TagMap::from_metadata(&sample_meta()), None, None)
            .unwrap();

        assert_eq!(
            outcome,
            TagOutcome::Embedded { strategy: TagStrategy::PureRewrite }
        );

        let bytes = std::fs::read(&path).unwrap();
        let entries = comment_entries(&bytes);
        assert!(entries.contains(&"TITLE=Holocene".to_string()));
        let parsed = flac::parse(&bytes).unwrap();
        assert_eq!(parsed.audio_frames(), audio.as_slice());
    }

    #[test]
    fn test_external_utility_preferred_when_probe_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.flac");
        let original = sample_flac(b"frames");
        std::fs::write(&path, &original).unwrap();

        let runner = Arc::new(ScriptedRunner::succeeding());
        let writer = TagWriter::with_runner(Box::new(runner.clone()));
        let outcome = writer
            .rewrite_tags(&path, &TagMap::from_metadata(&sample_meta()), None, None)
            .unwrap();

        assert_eq!(
            outcome,
            TagOutcome::Embedded { strategy: TagStrategy::ExternalUtility }
        );
        // probe + clear + one call per field
        let calls = runner.recorded();
        assert_eq!(calls[0][1], "--version");
        assert!(calls[1].contains(&"--remove-all-tags".to_string()));
        // The scripted utility writes nothing; the file is untouched
        assert_eq!(std::fs::read(&path).unwrap(), original);
    }

    #[test]
    fn test_utility_failure_falls_back_to_pure_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.flac");
        std::fs::write(&path, sample_flac(b"frames")).unwrap();

        // probe succeeds, every later invocation fails
        let runner = ScriptedRunner {
            calls: Mutex::new(Vec::new()),
            script: vec![(true, "metaflac 1.4.3"), (false, "")],
        };
        let writer = TagWriter::with_runner(Box::new(runner));
        let outcome = writer
            .rewrite_tags(&path, &TagMap::from_metadata(&sample_meta()), None, None)
            .unwrap();

        assert_eq!(
            outcome,
            TagOutcome::Embedded { strategy: TagStrategy::PureRewrite }
        );
    }

    #[test]
    fn test_double_failure_degrades_to_sidecar_and_preserves_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.flac");
        // Not actually FLAC: the pure rewrite must refuse it
        let garbage = b"MP3\x00 definitely not a flac file".to_vec();
        std::fs::write(&path, &garbage).unwrap();

        let writer = TagWriter::with_runner(Box::new(ScriptedRunner::failing()));
        let tags = TagMap::from_metadata(&sample_meta());
        let outcome = writer.rewrite_tags(&path, &tags, None, None).unwrap();

        let TagOutcome::Degraded { sidecar } = outcome else {
            panic!("expected sidecar degradation");
        };
        assert!(sidecar.exists());

        let body = std::fs::read_to_string(&sidecar).unwrap();
        for (key, value) in tags.fields() {
            assert!(body.contains(key.as_str()), "sidecar missing {key}");
            assert!(body.contains(value.as_str()), "sidecar missing value for {key}");
        }

        // The audio bytes were never touched
        assert_eq!(std::fs::read(&path).unwrap(), garbage);
    }

    #[test]
    fn test_lyrics_join_the_comment_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.flac");
        std::fs::write(&path, sample_flac(b"a")).unwrap();

        let lyrics = LyricsRecord {
            kind: crate::enricher::LyricsKind::Plain("la la la".to_string()),
            source: "lrclib".to_string(),
        };
        let writer = TagWriter::with_runner(Box::new(ScriptedRunner::failing()));
        writer
            .rewrite_tags(&path, &TagMap::from_metadata(&sample_meta()), None, Some(&lyrics))
            .unwrap();

        let entries = comment_entries(&std::fs::read(&path).unwrap());
        assert!(entries.contains(&"LYRICS=la la la".to_string()));
    }

    #[test]
    fn test_cover_becomes_picture_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.flac");
        std::fs::write(&path, sample_flac(b"a")).unwrap();

        let cover = CoverArt {
            data: b"fakejpeg".to_vec(),
            mime_type: "image/jpeg; charset=binary".to_string(),
            url: String::new(),
        };
        let writer = TagWriter::with_runner(Box::new(ScriptedRunner::failing()));
        writer
            .rewrite_tags(&path, &TagMap::new(), Some(&cover), None)
            .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let parsed = flac::parse(&bytes).unwrap();
        assert!(parsed.blocks.iter().any(|b| b.block_type == flac::BLOCK_PICTURE));
    }

    #[test]
    fn test_lossy_path_uses_delegate_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.mp3");
        // Garbage mp3: the lofty writer fails, ladder degrades to sidecar
        std::fs::write(&path, b"not really an mp3").unwrap();

        let writer = TagWriter::with_runner(Box::new(ScriptedRunner::failing()));
        let outcome = writer
            .rewrite_tags(&path, &TagMap::from_metadata(&sample_meta()), None, None)
            .unwrap();

        assert!(matches!(outcome, TagOutcome::Degraded { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), b"not really an mp3");
    }

    #[test]
    fn test_container_detection() {
        assert!(is_lossless_container(Path::new("a.flac")));
        assert!(is_lossless_container(Path::new("a.FLAC")));
        assert!(!is_lossless_container(Path::new("a.mp3")));
        assert!(!is_lossless_container(Path::new("noext")));
    }
}
