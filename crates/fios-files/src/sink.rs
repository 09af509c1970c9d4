//! Receive-side file output.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::FileError;

/// Append-only destination for received data.
///
/// Creating a sink truncates any existing file at the path. Chunks are
/// written in the order they are handed in; nothing is buffered in user
/// space, so a successful [`write_chunk`](Self::write_chunk) means the
/// kernel has the bytes.
#[derive(Debug)]
pub struct FileSink {
    file: Option<File>,
    path: PathBuf,
    written: u64,
}

impl FileSink {
    /// Create or truncate `path` for writing
    ///
    /// # Errors
    ///
    /// Returns `FileError::Create` if the file cannot be opened.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, FileError> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| FileError::Create {
                path: path.clone(),
                source,
            })?;

        tracing::debug!("Created {} for writing", path.display());

        Ok(Self {
            file: Some(file),
            path,
            written: 0,
        })
    }

    /// Append `data` to the file
    ///
    /// # Errors
    ///
    /// Returns `FileError::Closed` after [`close`](Self::close) and
    /// `FileError::Write` if the write fails.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<(), FileError> {
        let file = self.file.as_mut().ok_or(FileError::Closed)?;

        file.write_all(data).map_err(|source| FileError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.written += data.len() as u64;
        Ok(())
    }

    /// Flush file contents and metadata to stable storage
    ///
    /// # Errors
    ///
    /// Returns `FileError::Closed` after [`close`](Self::close) and
    /// `FileError::Write` if the sync fails.
    pub fn sync(&mut self) -> Result<(), FileError> {
        let file = self.file.as_mut().ok_or(FileError::Closed)?;

        file.sync_all().map_err(|source| FileError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!("Synced {} ({} bytes)", self.path.display(), self.written);
        Ok(())
    }

    /// Bytes written so far
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Destination path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file handle is still held
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Release the file handle. Returns `false` if it was already released.
    pub fn close(&mut self) -> bool {
        self.file.take().is_some()
    }
}
