//! Tag writer for lossy containers (ID3 and friends).
//!
//! Uses the lofty crate for format-independent tag access; the fixed-frame
//! formats lossy containers carry are well served by it and need none of
//! the block surgery the lossless path does. Same enrichment and failure
//! posture as the lossless writer: the caller falls back to a sidecar when
//! this fails.

use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt};

use super::{TagError, TagMap};
use crate::enricher::CoverArt;

/// Write the tag set (and cover, when given) into a lossy container.
pub fn write(path: &Path, tags: &TagMap, cover: Option<&CoverArt>) -> Result<(), TagError> {
    let mut tagged_file = Probe::open(path)
        .map_err(|e| TagError::Write(format!("failed to open {}: {e}", path.display())))?
        .read()
        .map_err(|e| TagError::Write(format!("failed to read {}: {e}", path.display())))?;

    let tag_type = tagged_file.primary_tag_type();
    let tag = if let Some(tag) = tagged_file.tag_mut(tag_type) {
        tag
    } else {
        tagged_file.insert_tag(Tag::new(tag_type));
        tagged_file.tag_mut(tag_type).expect("Just inserted tag")
    };

    // Replace wholesale; existing tags and pictures are superseded
    tag.clear();

    for (key, value) in tags.fields() {
        apply_field(tag, key, value);
    }

    if let Some(cover) = cover {
        let mime = if cover.mime_type.contains("png") {
            MimeType::Png
        } else {
            MimeType::Jpeg
        };
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(mime),
            None,
            cover.data.clone(),
        ));
    }

    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| TagError::Write(format!("failed to write tags to {}: {e}", path.display())))?;

    Ok(())
}

/// Map one comment field onto the container's equivalent frame.
fn apply_field(tag: &mut Tag, key: &str, value: &str) {
    match key {
        "TITLE" => tag.set_title(value.to_string()),
        "ARTIST" => tag.set_artist(value.to_string()),
        "ALBUM" => tag.set_album(value.to_string()),
        "ALBUMARTIST" => {
            tag.insert_text(ItemKey::AlbumArtist, value.to_string());
        }
        "TRACKNUMBER" => {
            if let Ok(n) = value.parse() {
                tag.set_track(n);
            }
        }
        "TRACKTOTAL" => {
            if let Ok(n) = value.parse() {
                tag.set_track_total(n);
            }
        }
        "DATE" => {
            if let Ok(y) = value.parse() {
                tag.set_year(y);
            }
        }
        "GENRE" => tag.set_genre(value.to_string()),
        "LABEL" => {
            tag.insert_text(ItemKey::Label, value.to_string());
        }
        "ISRC" => {
            tag.insert_text(ItemKey::Isrc, value.to_string());
        }
        "LYRICS" => {
            tag.insert_text(ItemKey::Lyrics, value.to_string());
        }
        _ => {
            tag.insert_text(ItemKey::Comment, format!("{key}={value}"));
        }
    }
}
