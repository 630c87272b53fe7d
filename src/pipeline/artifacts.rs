//! Transient transaction files.
//!
//! Every pipeline run opens one [`ArtifactScope`]. All files created through
//! the scope share a run stem (`<prefix>-<timestamp>-<random>`) and are
//! removed when the scope is released or dropped, whichever comes first.
//! The store tracks open stems so a sweep only touches orphaned files.

use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

/// Local file failure while handling an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to prepare artifact directory {path}: {source}")]
    Directory { path: PathBuf, source: io::Error },

    #[error("failed to create artifact {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("failed to write artifact {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read artifact {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// Outcome of a bulk file removal.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ClearReport {
    pub cleared: Vec<String>,
    pub errors: Vec<ClearFailure>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClearFailure {
    pub file: String,
    pub error: String,
}

/// Scratch directory for transient transaction files.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    directory: PathBuf,
    prefix: String,
    // Stems of runs whose scope is still open.
    open_runs: Arc<Mutex<HashSet<String>>>,
}

impl ArtifactStore {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            open_runs: Arc::default(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Open a scope for one run with a fresh, collision-free stem.
    pub async fn begin_run(&self) -> Result<ArtifactScope, ArtifactError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| ArtifactError::Directory {
                path: self.directory.clone(),
                source,
            })?;

        let stem = format!(
            "{}-{}-{}",
            self.prefix,
            Utc::now().format("%Y%m%d-%H%M%S%3f"),
            &Uuid::new_v4().simple().to_string()[..12]
        );
        lock(&self.open_runs).insert(stem.clone());
        Ok(ArtifactScope {
            directory: self.directory.clone(),
            stem,
            live: BTreeSet::new(),
            open_runs: self.open_runs.clone(),
        })
    }

    /// Number of runs whose scope has not been dropped yet.
    pub fn open_runs(&self) -> usize {
        lock(&self.open_runs).len()
    }

    /// Remove every `*.json` in the scratch directory that does not belong
    /// to an open run, e.g. files orphaned by a crash.
    pub async fn sweep(&self) -> ClearReport {
        let mut report = ClearReport::default();
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
            Err(e) => {
                report.errors.push(ClearFailure {
                    file: self.directory.display().to_string(),
                    error: e.to_string(),
                });
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    report.errors.push(ClearFailure {
                        file: self.directory.display().to_string(),
                        error: e.to_string(),
                    });
                    break;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.belongs_to_open_run(&name) {
                tracing::debug!(file = %name, "Skipping artifact of an open run");
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => report.cleared.push(path.display().to_string()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => report.errors.push(ClearFailure {
                    file: path.display().to_string(),
                    error: e.to_string(),
                }),
            }
        }
        report
    }

    fn belongs_to_open_run(&self, file_name: &str) -> bool {
        lock(&self.open_runs).iter().any(|stem| {
            file_name
                .strip_prefix(stem.as_str())
                .is_some_and(|rest| rest.starts_with('-'))
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reference to one artifact file inside a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    path: PathBuf,
}

impl ArtifactHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as a CLI argument.
    pub fn arg(&self) -> String {
        self.path.display().to_string()
    }

    pub async fn write(&self, bytes: impl AsRef<[u8]>) -> Result<(), ArtifactError> {
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|source| ArtifactError::Write {
                path: self.path.clone(),
                source,
            })
    }

    pub async fn read(&self) -> Result<Vec<u8>, ArtifactError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|source| ArtifactError::Read {
                path: self.path.clone(),
                source,
            })
    }
}

/// All artifacts of one run. Releases whatever is still live on drop.
#[derive(Debug)]
pub struct ArtifactScope {
    directory: PathBuf,
    stem: String,
    live: BTreeSet<PathBuf>,
    open_runs: Arc<Mutex<HashSet<String>>>,
}

impl ArtifactScope {
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Allocate `<stem>-<label>.json` and create its (empty) backing file.
    pub async fn create(&mut self, label: &str) -> Result<ArtifactHandle, ArtifactError> {
        let path = self.directory.join(format!("{}-{}.json", self.stem, label));
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| ArtifactError::Create {
                path: path.clone(),
                source,
            })?;
        self.live.insert(path.clone());
        Ok(ArtifactHandle { path })
    }

    /// Delete the backing file. Releasing twice, or a file that is already
    /// gone, is not an error.
    pub fn release(&mut self, handle: &ArtifactHandle) -> io::Result<()> {
        self.live.remove(&handle.path);
        remove_if_present(&handle.path)
    }

    /// Number of artifacts created and not yet released.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Release everything still live, logging failures.
    pub fn release_all(&mut self) {
        for path in std::mem::take(&mut self.live) {
            if let Err(e) = remove_if_present(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove artifact");
            }
        }
    }
}

impl Drop for ArtifactScope {
    fn drop(&mut self) {
        self.release_all();
        lock(&self.open_runs).remove(&self.stem);
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
