//! Append-only file transport

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{Transport, WriteOutcome};
use crate::error::TransportError;

/// Appends one line-terminated message per record to a local file
///
/// The file is opened lazily on the first write. Parent directories are
/// never created: a missing directory is a delivery failure like any other.
#[derive(Debug)]
pub struct FileTransport {
    path: PathBuf,
    file: Option<File>,
}

impl FileTransport {
    /// Create a transport for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// File being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&mut self, message: &[u8]) -> std::io::Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            self.file = Some(file);
        }

        let mut line = Vec::with_capacity(message.len() + 1);
        line.extend_from_slice(message);
        line.push(b'\n');

        if let Some(file) = self.file.as_mut() {
            file.write_all(&line).await?;
            file.flush().await?;
        }
        Ok(())
    }

    /// Name for the file moved aside on recycle: `<file>.<yyyyMMdd-HHmmssSSS>`
    async fn backup_path(&self) -> std::io::Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S%3f");
        let base = format!("{}.{}", self.path.display(), stamp);

        let mut candidate = PathBuf::from(&base);
        let mut counter = 1;
        while fs::try_exists(&candidate).await? {
            candidate = PathBuf::from(format!("{}.{}", base, counter));
            counter += 1;
        }
        Ok(candidate)
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn write(&mut self, message: &[u8]) -> Result<WriteOutcome, TransportError> {
        match self.append(message).await {
            Ok(()) => Ok(WriteOutcome::Written),
            Err(e) => {
                self.file = None;
                Err(e.into())
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush().await {
                tracing::debug!(path = %self.path.display(), "Flush on close failed: {}", e);
            }
        }
    }

    async fn recycle(&mut self) -> Result<(), TransportError> {
        self.close().await;

        let has_content = match fs::metadata(&self.path).await {
            Ok(meta) => meta.len() > 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if has_content {
            let backup = self.backup_path().await?;
            fs::rename(&self.path, &backup).await?;
            tracing::info!(
                path = %self.path.display(),
                backup = %backup.display(),
                "Audit log file moved aside"
            );
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
