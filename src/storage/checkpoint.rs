//! Checkpoint file for resumable crawling
//!
//! The checkpoint is a pretty-printed JSON [`CrawlState`]. Writes go to a
//! temporary sibling file which is fsynced and renamed over the checkpoint, so
//! the file on disk is always a complete snapshot.
//!
//! If the final persist of a run fails, the state is written to a recovery file
//! next to the checkpoint instead. The next load merges both.

use crate::state::CrawlState;
use chrono::Utc;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while writing a checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checkpoint task failed: {0}")]
    Task(String),
}

/// Reads and writes the checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    recovery_path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let recovery_path = path.with_extension("recovery.json");
        Self {
            path,
            recovery_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn recovery_path(&self) -> &Path {
        &self.recovery_path
    }

    /// Loads the state for `category_url`
    ///
    /// Never fails: a missing or unreadable checkpoint yields an empty state. A
    /// recovery file, if present, is merged in. Checkpoints written for another
    /// category are ignored.
    pub fn load(&self, category_url: &str) -> CrawlState {
        let primary = read_state(&self.path, category_url);
        let recovery = read_state(&self.recovery_path, category_url);

        let mut state = match (primary, recovery) {
            (Some(mut primary), Some(recovery)) => {
                tracing::info!(
                    path = %self.recovery_path.display(),
                    "Merging recovery checkpoint"
                );
                primary.merge(recovery);
                primary
            }
            (Some(state), None) | (None, Some(state)) => state,
            (None, None) => return CrawlState::new(category_url),
        };

        let fixed = state.repair();
        if fixed > 0 {
            tracing::warn!(fixed, "Repaired inconsistent checkpoint entries");
        }

        let (lists, details) = state.pending_counts();
        tracing::info!(
            processed = state.processed.len(),
            listings = state.listings.len(),
            failed = state.failed.len(),
            pending_lists = lists,
            pending_details = details,
            "Loaded checkpoint"
        );

        state.category_url = category_url.to_string();
        state
    }

    /// Atomically writes `state` to the checkpoint
    ///
    /// Stamps `saved_at`. On success any recovery file is removed, since the
    /// state it held was merged at load time.
    pub async fn persist(&self, state: &mut CrawlState) -> Result<(), CheckpointError> {
        state.saved_at = Some(Utc::now());
        let bytes = serde_json::to_vec_pretty(&*state)?;

        let path = self.path.clone();
        let recovery = self.recovery_path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), CheckpointError> {
            write_atomic(&path, &bytes)?;
            if recovery.exists() {
                fs::remove_file(&recovery).map_err(|source| CheckpointError::Io {
                    path: recovery.clone(),
                    source,
                })?;
            }
            Ok(())
        })
        .await
        .map_err(|e| CheckpointError::Task(e.to_string()))??;

        tracing::debug!(
            path = %self.path.display(),
            processed = state.processed.len(),
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Final persist of a run, falling back to the recovery file
    ///
    /// # Returns
    ///
    /// The path the state was written to.
    pub async fn persist_final(&self, state: &mut CrawlState) -> Result<PathBuf, CheckpointError> {
        match self.persist(state).await {
            Ok(()) => Ok(self.path.clone()),
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Final checkpoint failed, writing recovery file"
                );
                let bytes = serde_json::to_vec_pretty(&*state)?;
                let recovery = self.recovery_path.clone();
                tokio::task::spawn_blocking(move || write_atomic(&recovery, &bytes))
                    .await
                    .map_err(|e| CheckpointError::Task(e.to_string()))??;
                Ok(self.recovery_path.clone())
            }
        }
    }
}

fn read_state(path: &Path, category_url: &str) -> Option<CrawlState> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot open checkpoint, ignoring it");
            return None;
        }
    };

    let state: CrawlState = match serde_json::from_reader(BufReader::new(file)) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Corrupt checkpoint, ignoring it");
            return None;
        }
    };

    if !state.category_url.is_empty() && !same_category(&state.category_url, category_url) {
        tracing::warn!(
            path = %path.display(),
            checkpoint_category = %state.category_url,
            "Checkpoint belongs to another category, ignoring it"
        );
        return None;
    }

    Some(state)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError {
    let path = path.to_path_buf();
    move |source| CheckpointError::Io { path, source }
}

fn same_category(a: &str, b: &str) -> bool {
    a.trim().trim_end_matches('/') == b.trim().trim_end_matches('/')
}

/// Writes `bytes` to a temporary sibling, fsyncs it and renames it over `path`
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp).map_err(io_err(&tmp))?;
    file.write_all(bytes).map_err(io_err(&tmp))?;
    file.sync_all().map_err(io_err(&tmp))?;
    drop(file);

    fs::rename(&tmp, path).map_err(io_err(path))
}
