//! External tag utility strategy.
//!
//! Shells out to `metaflac` (part of the FLAC tools) when it is installed,
//! which has seen every container quirk in the wild. The process boundary
//! sits behind [`CommandRunner`] so the strategy is unit-testable without a
//! real process, and so the probe/apply sequence is identical in tests and
//! production.
//!
//! Install metaflac:
//! - Windows: download from https://xiph.org/flac/download.html
//! - macOS: `brew install flac`
//! - Linux: `apt install flac` or equivalent

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::Output;

use super::TagError;
use crate::enricher::CoverArt;

/// Runs one external command to completion. Implemented over
/// `std::process::Command` in production and by recording fakes in tests.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[OsString]) -> std::io::Result<Output>;
}

/// Real process execution.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[OsString]) -> std::io::Result<Output> {
        std::process::Command::new(program).args(args).output()
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for Box<T> {
    fn run(&self, program: &str, args: &[OsString]) -> std::io::Result<Output> {
        (**self).run(program, args)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<T> {
    fn run(&self, program: &str, args: &[OsString]) -> std::io::Result<Output> {
        (**self).run(program, args)
    }
}

/// The utility probed for and invoked
const METAFLAC: &str = "metaflac";

/// Tag application via the metaflac utility.
pub struct MetaflacTagger<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> MetaflacTagger<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Probe for the utility. Returns its version line when present.
    pub fn probe(&self) -> Option<String> {
        let output = self.runner.run(METAFLAC, &[OsString::from("--version")]).ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Apply the full tag set: clear everything (comments and pictures),
    /// set each tag individually, then import the cover from a temporary
    /// file. The temporary file is deleted when this function returns,
    /// success or not.
    pub fn write_tags(
        &self,
        path: &Path,
        fields: &[(String, String)],
        cover: Option<&CoverArt>,
    ) -> Result<(), TagError> {
        self.invoke(&[
            OsString::from("--remove-all-tags"),
            OsString::from("--remove"),
            OsString::from("--block-type=PICTURE"),
            path.as_os_str().to_os_string(),
        ])?;

        for (key, value) in fields {
            self.invoke(&[
                OsString::from(format!("--set-tag={key}={value}")),
                path.as_os_str().to_os_string(),
            ])?;
        }

        if let Some(cover) = cover {
            // NamedTempFile removes itself on drop, covering every exit path
            let mut tmp = tempfile::NamedTempFile::new().map_err(TagError::Io)?;
            tmp.write_all(&cover.data).map_err(TagError::Io)?;
            tmp.flush().map_err(TagError::Io)?;

            self.invoke(&[
                OsString::from(format!(
                    "--import-picture-from={}",
                    tmp.path().to_string_lossy()
                )),
                path.as_os_str().to_os_string(),
            ])?;
        }

        Ok(())
    }

    fn invoke(&self, args: &[OsString]) -> Result<(), TagError> {
        let output = self
            .runner
            .run(METAFLAC, args)
            .map_err(|e| TagError::External(format!("failed to run {METAFLAC}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TagError::External(format!(
                "{METAFLAC} failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}
