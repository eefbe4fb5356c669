//! Report sinks for finished measurement records.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::record::Record;

/// Consumer of completed measurement records.
#[async_trait::async_trait(?Send)]
pub trait Reporter {
    async fn open(&mut self) -> Result<()>;
    async fn write_entry(&mut self, record: &Record) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Appends one JSON-serialized record per line to a file.
pub struct FileReporter {
    path: PathBuf,
    file: Option<File>,
}

impl FileReporter {
    pub fn new(path: impl Into<PathBuf>) -> FileReporter {
        FileReporter {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait(?Send)]
impl Reporter for FileReporter {
    /// Open (or create) the report file. Idempotent; fails if the parent
    /// directory does not exist.
    async fn open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open report file {}", self.path.display()))?;
        debug!(path = %self.path.display(), "report opened");
        self.file = Some(file);
        Ok(())
    }

    async fn write_entry(&mut self, record: &Record) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .context("write_entry called before open")?;
        let mut line = serde_json::to_string(record).context("failed to serialize record")?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to write to {}", self.path.display()))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.context("failed to flush report")?;
            debug!(path = %self.path.display(), "report closed");
        }
        Ok(())
    }
}
