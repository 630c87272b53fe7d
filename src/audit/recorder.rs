//! JSONL audit recorder.

use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::audit::record::AuditRecord;
use crate::pipeline::{ClearFailure, ClearReport};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Log file not found")]
    NotFound,

    #[error("audit recorder is closed")]
    Closed,

    #[error("audit log I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable, append-only log of gateway requests.
#[derive(Debug)]
pub struct AuditRecorder {
    path: PathBuf,
    // Serializes appends and clears within this process.
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl AuditRecorder {
    /// Open (creating if needed) the log file and its parent directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        tracing::info!(path = %path.display(), "Audit log opened");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line and sync it to disk.
    pub async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AuditError::Closed);
        }
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Last `tail` lines of the log (all when `tail <= 0`), parsed, with
    /// malformed lines dropped and an optional case-insensitive keyword
    /// filter on each record's serialized form.
    pub async fn query(&self, tail: i64, keyword: Option<&str>) -> Result<Vec<Value>, AuditError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(AuditError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<&str> = content.lines().collect();
        let start = match usize::try_from(tail) {
            Ok(n) if n > 0 => lines.len().saturating_sub(n),
            _ => 0,
        };
        let keyword = keyword
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase);

        let records = lines[start..]
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter(|record| match &keyword {
                Some(k) => record.to_string().to_lowercase().contains(k),
                None => true,
            })
            .collect();
        Ok(records)
    }

    /// Truncate the log, leaving it present and empty.
    pub async fn clear(&self) -> ClearReport {
        let _guard = self.write_lock.lock().await;
        let file = self.path.display().to_string();
        let result = async {
            let handle = tokio::fs::File::create(&self.path).await?;
            handle.sync_all().await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(path = %file, "Audit log cleared");
                ClearReport {
                    cleared: vec![file],
                    errors: Vec::new(),
                }
            }
            Err(e) => {
                tracing::error!(path = %file, error = %e, "Failed to clear audit log");
                ClearReport {
                    cleared: Vec::new(),
                    errors: vec![ClearFailure {
                        file,
                        error: e.to_string(),
                    }],
                }
            }
        }
    }

    /// Stop accepting appends. Waits for an in-flight append to finish.
    pub async fn close(&self) {
        let _guard = self.write_lock.lock().await;
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(path = %self.path.display(), "Audit log closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
