//! Archive writer: file naming, the write primitive, and the write session.
//!
//! Every file write goes through an [`ArchiveSink`], the "write bytes at path,
//! overwrite if it exists" primitive, followed by an `erase_history` call for
//! the same path. A session brackets a batch of writes with notifications
//! turned off; [`NotificationGate`] counts holders so overlapping sessions
//! only switch notifications back on when the last one ends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{BackupError, Result};
use crate::model::{ContentDetail, ContentType, IndexEntry};

pub const INDEX_FILE: &str = "index.json";

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").expect("valid regex"));

/// File name for one archived item, shared by the index and the writer.
///
/// `[YYYY-MM-DD_]<title>_<id>.json`: the date prefix only for published items
/// with a known publish date, the title lower-cased with every character
/// outside `[a-zA-Z0-9]` replaced by `_`, `untitled` when empty.
pub fn derive_file_name(
    title: Option<&str>,
    id: i64,
    content_type: ContentType,
    published_at: Option<DateTime<Utc>>,
) -> String {
    let title = title.filter(|t| !t.is_empty()).unwrap_or("untitled");
    let stem = NON_ALNUM.replace_all(title, "_").to_ascii_lowercase();
    let prefix = match (content_type, published_at) {
        (ContentType::Published, Some(date)) => format!("{}_", date.format("%Y-%m-%d")),
        _ => String::new(),
    };
    format!("{}{}_{}.json", prefix, stem, id)
}

/// Re-serialize a body as pretty JSON, rejecting anything that does not parse.
pub fn render_body(id: i64, body: &str) -> Result<Vec<u8>> {
    let value: Value =
        serde_json::from_str(body).map_err(|source| BackupError::MalformedBody { id, source })?;
    serde_json::to_vec_pretty(&value).map_err(|source| BackupError::MalformedBody { id, source })
}

#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Write `bytes` at `path`, replacing any existing file.
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Drop the user-visible trace of a completed write.
    async fn erase_history(&self, path: &Path) -> Result<()>;

    async fn set_notifications(&self, enabled: bool) -> Result<()>;
}

/// Writes archive files below a root directory.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArchiveSink for FsSink {
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Write next to the target and rename so readers never see a torn file.
        let mut partial = target.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);
        fs::write(&partial, bytes).await?;
        fs::rename(&partial, &target).await?;
        Ok(())
    }

    async fn erase_history(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "no download history to erase");
        Ok(())
    }

    async fn set_notifications(&self, enabled: bool) -> Result<()> {
        debug!(enabled, "filesystem sink has no notifications");
        Ok(())
    }
}

/// Reference-counted "notifications off" switch shared by every session.
pub struct NotificationGate {
    sink: Arc<dyn ArchiveSink>,
    holders: Mutex<usize>,
}

impl NotificationGate {
    pub fn new(sink: Arc<dyn ArchiveSink>) -> Self {
        Self {
            sink,
            holders: Mutex::new(0),
        }
    }

    pub async fn acquire(&self) {
        let mut holders = self.holders.lock().await;
        if *holders == 0 {
            if let Err(err) = self.sink.set_notifications(false).await {
                warn!(%err, "failed to disable notifications");
            }
        }
        *holders += 1;
    }

    pub async fn release(&self) {
        let mut holders = self.holders.lock().await;
        *holders = holders.saturating_sub(1);
        if *holders == 0 {
            if let Err(err) = self.sink.set_notifications(true).await {
                warn!(%err, "failed to re-enable notifications");
            }
        }
    }

    #[cfg(test)]
    async fn holders(&self) -> usize {
        *self.holders.lock().await
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub written: Vec<i64>,
    pub failed: Vec<i64>,
    pub skipped: Vec<i64>,
}

impl WriteReport {
    pub fn failed_ids(&self) -> HashSet<i64> {
        self.failed.iter().copied().collect()
    }
}

pub struct ArchiveWriter {
    sink: Arc<dyn ArchiveSink>,
    gate: Arc<NotificationGate>,
    settle_before: Duration,
    settle_after: Duration,
}

impl ArchiveWriter {
    pub fn new(
        sink: Arc<dyn ArchiveSink>,
        gate: Arc<NotificationGate>,
        settle_before: Duration,
        settle_after: Duration,
    ) -> Self {
        Self {
            sink,
            gate,
            settle_before,
            settle_after,
        }
    }

    /// Start a write session. Every call must be paired with [`close_session`].
    ///
    /// [`close_session`]: ArchiveWriter::close_session
    pub async fn open_session(&self) {
        self.gate.acquire().await;
        if !self.settle_before.is_zero() {
            tokio::time::sleep(self.settle_before).await;
        }
    }

    pub async fn close_session(&self) {
        if !self.settle_after.is_zero() {
            tokio::time::sleep(self.settle_after).await;
        }
        self.gate.release().await;
    }

    /// Write one file per item that has a body. Failures are logged per item.
    #[instrument(skip_all, fields(content_type = %content_type, dir = %dir))]
    pub async fn write_items(
        &self,
        dir: &str,
        content_type: ContentType,
        items: &[ContentDetail],
    ) -> WriteReport {
        let mut report = WriteReport::default();
        for item in items {
            let Some(body) = item.body.as_deref() else {
                debug!(id = item.id, "no body, nothing to write");
                report.skipped.push(item.id);
                continue;
            };
            let file_name =
                derive_file_name(item.title.as_deref(), item.id, content_type, item.published_at);
            let path = Path::new(dir).join(&file_name);
            let outcome = match render_body(item.id, body) {
                Ok(bytes) => self.write_with_cleanup(&path, &bytes).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => report.written.push(item.id),
                Err(err) => {
                    warn!(%err, id = item.id, file = %file_name, "failed to write item");
                    report.failed.push(item.id);
                }
            }
        }
        info!(
            written = report.written.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "wrote archive files"
        );
        report
    }

    /// Overwrite `<dir>/index.json` with the pretty-printed index.
    pub async fn write_index(&self, dir: &str, entries: &[IndexEntry]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|err| BackupError::Storage(format!("failed to serialize index: {}", err)))?;
        let path = Path::new(dir).join(INDEX_FILE);
        self.write_with_cleanup(&path, &bytes).await?;
        info!(entries = entries.len(), path = %path.display(), "wrote index");
        Ok(())
    }

    async fn write_with_cleanup(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.sink.write_file(path, bytes).await?;
        if let Err(err) = self.sink.erase_history(path).await {
            debug!(%err, path = %path.display(), "failed to erase history entry");
        }
        Ok(())
    }
}
