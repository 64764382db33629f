//! Last-resort tag sidecar.
//!
//! When both embedding strategies fail, the tag set is persisted as a JSON
//! document next to the untouched audio file so nothing the pipeline
//! resolved is lost. A library scanner (or a later re-run) can pick it up.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::TagMap;

/// The sidecar document layout.
#[derive(Debug, Serialize)]
struct TagSidecar<'a> {
    generator: String,
    warning: &'a str,
    tags: Vec<SidecarField<'a>>,
}

#[derive(Debug, Serialize)]
struct SidecarField<'a> {
    key: &'a str,
    value: &'a str,
}

/// Write `<audio>.tags.json` beside the audio file and return its path.
pub fn write_tag_sidecar(
    audio_path: &Path,
    tags: &TagMap,
    warning: &str,
) -> std::io::Result<PathBuf> {
    let doc = TagSidecar {
        generator: format!("quaver v{}", env!("CARGO_PKG_VERSION")),
        warning,
        tags: tags
            .fields()
            .iter()
            .map(|(key, value)| SidecarField { key, value })
            .collect(),
    };

    let mut path = audio_path.as_os_str().to_os_string();
    path.push(".tags.json");
    let path = PathBuf::from(path);

    let json = serde_json::to_string_pretty(&doc).expect("sidecar document serializes");
    std::fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_lands_beside_audio() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("01 - Song.flac");
        std::fs::write(&audio, b"flac bytes").unwrap();

        let mut tags = TagMap::new();
        tags.push_nonempty("TITLE", "Song");
        tags.push_nonempty("ARTIST", "Artist");

        let path = write_tag_sidecar(&audio, &tags, "embedding failed").unwrap();
        assert_eq!(path, dir.path().join("01 - Song.flac.tags.json"));

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("embedding failed"));
        assert!(body.contains("\"TITLE\""));
        assert!(body.contains("\"Song\""));

        // Audio untouched
        assert_eq!(std::fs::read(&audio).unwrap(), b"flac bytes");
    }

    #[test]
    fn test_sidecar_preserves_field_order() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("t.flac");
        std::fs::write(&audio, b"x").unwrap();

        let mut tags = TagMap::new();
        tags.push_nonempty("TITLE", "zzz");
        tags.push_nonempty("ARTIST", "aaa");

        let path = write_tag_sidecar(&audio, &tags, "w").unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.find("TITLE").unwrap() < body.find("ARTIST").unwrap());
    }
}
