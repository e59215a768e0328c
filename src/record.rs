//! record.rs — append-only plain-text audit log of sent notifications.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt::Display;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::listing::ListingRecord;

pub const DEFAULT_RECORD_PATH: &str = "recordFile.txt";

#[async_trait::async_trait]
pub trait AuditRecorder: Send + Sync {
    async fn append(&self, record: &ListingRecord, now: DateTime<Utc>) -> Result<()>;
}

/// Appends to a file, creating it on first use. Never truncates.
pub struct FileRecorder {
    path: PathBuf,
}

impl FileRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl AuditRecorder for FileRecorder {
    async fn append(&self, record: &ListingRecord, now: DateTime<Utc>) -> Result<()> {
        let entry = format_entry(record, &now.with_timezone(&Local));
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening audit log {}", self.path.display()))?;
        f.write_all(entry.as_bytes())
            .await
            .with_context(|| format!("writing audit log {}", self.path.display()))?;
        f.flush().await.context("flushing audit log")?;
        Ok(())
    }
}

/// One log block: header line plus four indented `key: value` lines.
pub fn format_entry<Tz>(record: &ListingRecord, ts: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "Notification Sent: {}\n    Study Info: {}\n    Credits: {}\n    Description: {}\n    Eligibility: {}\n",
        ts.format("%l:%M %p %z on %b %d, %Y"),
        record.identity,
        record.credits,
        record.description,
        record.eligibility,
    )
}
