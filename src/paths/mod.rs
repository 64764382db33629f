//! Destination folder and file name construction.
//!
//! Renders folder and file names from token-substitution templates like
//! `{album_artist}/{album} [{quality}]` and `{track_number} - {title}`.
//! Every substituted token is sanitized for the filesystem before it enters
//! the path; slashes in the template itself are path separators.
//!
//! Tokens: `{artist}`, `{album_artist}`, `{album}`, `{year}`, `{quality}`,
//! `{track_number}`, `{title}`.

use std::path::PathBuf;

use crate::model::TrackMetadata;
use crate::quality::Quality;

/// Characters stripped from every substituted token
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maximum length of one substituted token, in characters
const MAX_COMPONENT_LEN: usize = 128;

/// Fallback for tokens whose value is empty or unset
const UNKNOWN: &str = "Unknown";

/// Default folder layout under the download root
pub const DEFAULT_FOLDER_TEMPLATE: &str = "{album_artist}/{album} [{quality}]";

/// Default file name (the extension is appended by the builder)
pub const DEFAULT_FILE_TEMPLATE: &str = "{track_number} - {title}";

/// Renders destination paths from templates.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    folder_template: String,
    file_template: String,
}

impl PathBuilder {
    pub fn new(folder_template: impl Into<String>, file_template: impl Into<String>) -> Self {
        Self {
            folder_template: folder_template.into(),
            file_template: file_template.into(),
        }
    }

    /// Render the album folder (relative to the download root).
    pub fn build_folder(&self, meta: &TrackMetadata, quality: Quality) -> PathBuf {
        PathBuf::from(render(&self.folder_template, meta, quality))
    }

    /// Render the file name, appending the given extension.
    pub fn build_filename(&self, meta: &TrackMetadata, quality: Quality, extension: &str) -> String {
        format!("{}.{}", render(&self.file_template, meta, quality), extension)
    }
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_FOLDER_TEMPLATE, DEFAULT_FILE_TEMPLATE)
    }
}

/// Substitute every token with its sanitized value.
fn render(template: &str, meta: &TrackMetadata, quality: Quality) -> String {
    let track_num = meta
        .track_number
        .map(|n| format!("{:02}", n))
        .unwrap_or_else(|| "00".to_string());

    let year = meta.year.map(|y| y.to_string()).unwrap_or_default();

    template
        .replace("{artist}", &sanitize_component(&meta.artist))
        .replace("{album_artist}", &sanitize_component(&meta.album_artist))
        .replace("{album}", &sanitize_component(&meta.album))
        .replace("{year}", &sanitize_component(&year))
        .replace("{quality}", &sanitize_component(quality.label()))
        .replace("{track_number}", &track_num)
        .replace("{title}", &sanitize_component(&meta.title))
}

/// Sanitize one path component: strip characters the common filesystems
/// reject, collapse whitespace runs, trim, cap the length, and substitute
/// "Unknown" when nothing is left.
pub fn sanitize_component(name: &str) -> String {
    let stripped: String = name.chars().filter(|c| !ILLEGAL_CHARS.contains(c)).collect();

    // split_whitespace both collapses runs and trims the ends
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    let capped: String = collapsed.chars().take(MAX_COMPONENT_LEN).collect();
    let capped = capped.trim_end().to_string();

    // "." and ".." would change the path's shape instead of naming a folder
    if capped.is_empty() || capped == "." || capped == ".." {
        UNKNOWN.to_string()
    } else {
        capped
    }
}
