//! Download sink
//!
//! Moves finished downloads from the browser's staging directory into the
//! report directory. Target paths longer than [`MAX_PATH_LEN`] characters get
//! their file name shortened by dropping the first [`TRUNCATE_PREFIX_CHARS`]
//! characters of the base name; the extension is kept.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::SavedFile;
use crate::infrastructure::browser::PendingDownload;

/// Longest full path (in characters) written without shortening
pub const MAX_PATH_LEN: usize = 259;

/// Characters removed from the front of an over-long base name
pub const TRUNCATE_PREFIX_CHARS: usize = 24;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to prepare download directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to save {name} to {path:?}: {source}")]
    Save {
        name: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No file name for {name} fits under {directory:?}")]
    NameTooLong { name: String, directory: PathBuf },
}

/// Split a file name into base and extension the way most tools do:
/// the extension starts at the last dot, unless that dot only leads the name
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if file_name[..idx].chars().any(|c| c != '.') => {
            (&file_name[..idx], &file_name[idx..])
        }
        _ => (file_name, ""),
    }
}

fn path_len(dir: &Path, name: &str) -> usize {
    dir.join(name).to_string_lossy().chars().count()
}

/// Name a suggested file is saved under in `dir`; `None` when shortening leaves no base name
pub fn fit_file_name(dir: &Path, suggested: &str) -> Option<String> {
    if path_len(dir, suggested) <= MAX_PATH_LEN {
        return Some(suggested.to_string());
    }
    let (base, ext) = split_extension(suggested);
    let kept: String = base.chars().skip(TRUNCATE_PREFIX_CHARS).collect();
    if kept.is_empty() {
        return None;
    }
    Some(format!("{kept}{ext}"))
}

/// `base` plus `suffix`, dropping leading characters of `base` until the path fits
fn suffixed_name(dir: &Path, base: &str, suffix: &str) -> Option<String> {
    let fixed = path_len(dir, suffix);
    let room = MAX_PATH_LEN.checked_sub(fixed)?;
    let base_len = base.chars().count();
    let kept: String = base.chars().skip(base_len.saturating_sub(room)).collect();
    if kept.is_empty() {
        return None;
    }
    Some(format!("{kept}{suffix}"))
}

/// Report directory shared by every run
#[derive(Debug, Clone)]
pub struct DownloadSink {
    directory: PathBuf,
}

impl DownloadSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the directory if needed and open a per-run writer with its own staging area
    pub async fn open_run(&self) -> Result<RunSink, SinkError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| SinkError::Directory {
                path: self.directory.clone(),
                source,
            })?;

        // Staging lives inside the target directory so the final move is a rename
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.directory)
            .map_err(|source| SinkError::Directory {
                path: self.directory.clone(),
                source,
            })?;

        Ok(RunSink {
            directory: self.directory.clone(),
            staging,
            claimed: HashMap::new(),
        })
    }
}

/// Writer for a single run; removes its staging area when dropped
#[derive(Debug)]
pub struct RunSink {
    directory: PathBuf,
    staging: TempDir,
    /// final name -> suggested name it was saved for
    claimed: HashMap<String, String>,
}

/// Result of a save: the file plus whether a collision had to be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub file: SavedFile,
    pub collided_with: Option<String>,
}

impl RunSink {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Pick a final name for `suggested`, de-duplicating shortened names that
    /// collide with a different file saved earlier in this run
    fn claim_name(&mut self, suggested: &str) -> Result<(String, Option<String>), SinkError> {
        let too_long = || SinkError::NameTooLong {
            name: suggested.to_string(),
            directory: self.directory.clone(),
        };
        let fitted = fit_file_name(&self.directory, suggested).ok_or_else(too_long)?;
        if fitted == suggested {
            self.claimed.insert(fitted.clone(), suggested.to_string());
            return Ok((fitted, None));
        }

        let mut candidate = fitted.clone();
        let mut collided_with = None;
        let mut n = 1;
        while let Some(owner) = self.claimed.get(&candidate) {
            if owner == suggested {
                break;
            }
            collided_with.get_or_insert_with(|| owner.clone());
            let (base, ext) = split_extension(&fitted);
            candidate = suffixed_name(&self.directory, base, &format!(" ({n}){ext}"))
                .ok_or_else(too_long)?;
            n += 1;
        }
        self.claimed.insert(candidate.clone(), suggested.to_string());
        Ok((candidate, collided_with))
    }

    /// Move a finished download into the report directory
    pub async fn save(&mut self, pending: PendingDownload) -> Result<SaveOutcome, SinkError> {
        let (final_name, collided_with) = self.claim_name(&pending.suggested_filename)?;
        let target = self.directory.join(&final_name);

        if let Some(other) = &collided_with {
            warn!(
                "Shortened name {} collides with {}; saving as {}",
                pending.suggested_filename, other, final_name
            );
        }

        if let Err(rename_err) = tokio::fs::rename(&pending.path, &target).await {
            // Fall back to copy when the staging file sits on another device
            debug!("Rename failed ({}), copying instead", rename_err);
            tokio::fs::copy(&pending.path, &target)
                .await
                .map_err(|source| SinkError::Save {
                    name: final_name.clone(),
                    path: target.clone(),
                    source,
                })?;
            if let Err(e) = tokio::fs::remove_file(&pending.path).await {
                debug!("Could not remove staged file {:?}: {}", pending.path, e);
            }
        }

        Ok(SaveOutcome {
            file: SavedFile {
                suggested_name: pending.suggested_filename,
                final_name,
                path: target,
            },
            collided_with,
        })
    }
}
