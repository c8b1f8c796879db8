//! Media Sinks
//!
//! Where acquired bytes end up. The pipeline only knows the [`MediaSink`]
//! trait; [`FileSink`] and [`MemorySink`] cover the CLI and tests.

use crate::acquire::stream::MediaStream;
use crate::acquire::types::MediaKind;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("media stream broke off after {written} bytes: {source}")]
    Stream {
        written: u64,
        source: std::io::Error,
    },

    #[error("no output directory available: {0}")]
    NoDirectory(String),
}

/// Receipt for stored media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkHandle {
    /// File path, or `memory:<index>` for in-memory records
    pub location: String,
    pub kind: MediaKind,
    pub bytes: u64,
}

#[async_trait]
pub trait MediaSink: Send + Sync {
    async fn write(&self, stream: MediaStream, kind: MediaKind) -> Result<SinkHandle, SinkError>;
}

/// Writes each media item to `<dir>/<stem>.<ext>`.
///
/// Bytes go to a `.part` file first and are renamed on completion, so a
/// broken stream never leaves a truncated file under the final name.
pub struct FileSink {
    dir: PathBuf,
    counter: AtomicU64,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Sink in the per-user cache directory.
    pub fn in_default_dir() -> Result<Self, SinkError> {
        default_dir()
            .map(Self::new)
            .ok_or_else(|| SinkError::NoDirectory("could not determine cache directory".into()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_stem(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", Utc::now().format("%Y%m%d-%H%M%S%3f"))
    }
}

/// `<cache dir>/media`, e.g. `~/.cache/mediagrab/media` on Linux.
pub fn default_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "mediagrab").map(|dirs| dirs.cache_dir().join("media"))
}

#[async_trait]
impl MediaSink for FileSink {
    async fn write(
        &self,
        mut stream: MediaStream,
        kind: MediaKind,
    ) -> Result<SinkHandle, SinkError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self
            .dir
            .join(format!("{}.{}", self.next_stem(), kind.extension()));
        let partial = path.with_extension(format!("{}.part", kind.extension()));

        let mut file = tokio::fs::File::create(&partial).await?;
        let mut guard = PartialFile::new(partial);
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| SinkError::Stream { written, source })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(guard.path(), &path).await?;
        guard.keep();

        tracing::info!(path = %path.display(), %kind, bytes = written, "media written");
        Ok(SinkHandle {
            location: path.display().to_string(),
            kind,
            bytes: written,
        })
    }
}

/// Removes the `.part` file on drop unless the write completed.
///
/// Covers stream errors, failed writes and a write future dropped mid-way
/// (the pipeline budget expiring during a download).
struct PartialFile {
    path: PathBuf,
    done: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, done: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(&mut self) {
        self.done = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "could not remove partial file"
            ),
        }
    }
}

/// One item held by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRecord {
    pub kind: MediaKind,
    pub bytes: Bytes,
}

/// Keeps everything in memory.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<SinkRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl MediaSink for MemorySink {
    async fn write(
        &self,
        mut stream: MediaStream,
        kind: MediaKind,
    ) -> Result<SinkHandle, SinkError> {
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| SinkError::Stream {
                written: buf.len() as u64,
                source,
            })?;
            buf.extend_from_slice(&chunk);
        }

        let bytes = buf.len() as u64;
        let mut records = self.records.lock();
        records.push(SinkRecord {
            kind,
            bytes: Bytes::from(buf),
        });
        Ok(SinkHandle {
            location: format!("memory:{}", records.len() - 1),
            kind,
            bytes,
        })
    }
}
