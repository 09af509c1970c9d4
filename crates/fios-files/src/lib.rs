//! # FIOS Files
//!
//! Local file access for the FIOS protocol engine.
//!
//! This crate provides:
//! - Chunked sequential reads with size discovery ([`FileChunker`])
//! - Create/truncate sinks with ordered appends ([`FileSink`])
//! - File metadata for display ([`FileMetadata`])
//!
//! Neither type knows anything about the wire format; the engine decides
//! chunk sizes and limits and passes them in.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod sink;

use std::io;
use std::path::{Path, PathBuf};

pub use chunker::FileChunker;
pub use sink::FileSink;

/// Default chunk size (8 KiB), matching the largest payload frame
pub const DEFAULT_CHUNK_SIZE: usize = 0x2000;

/// Local file errors
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// The file could not be opened for reading
    #[error("failed to open {} for reading: {source}", .path.display())]
    Open {
        /// File path
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// The file could not be created or truncated
    #[error("failed to create {}: {source}", .path.display())]
    Create {
        /// File path
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Reading from the file failed
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Writing to the file failed
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        /// File path
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// The file is larger than the allowed maximum
    #[error("{} is too large: {size} bytes (limit {limit})", .path.display())]
    TooLarge {
        /// File path
        path: PathBuf,
        /// Actual size in bytes
        size: u64,
        /// Allowed maximum in bytes
        limit: u64,
    },

    /// The file ended before its declared size was read
    #[error("{} ended after {read} of {expected} bytes", .path.display())]
    Truncated {
        /// File path
        path: PathBuf,
        /// Bytes successfully read
        read: u64,
        /// Size discovered when the file was opened
        expected: u64,
    },

    /// A chunk size of zero was requested
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// The handle was already closed
    #[error("file handle is closed")]
    Closed,
}

/// File metadata for transfers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// File name (last path component)
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// Number of chunks at the given chunk size
    pub chunk_count: u64,
}

impl FileMetadata {
    /// Read metadata for `path` without opening it for I/O
    ///
    /// # Errors
    ///
    /// Returns `FileError::Open` if the file cannot be stat'ed, or
    /// `FileError::InvalidChunkSize` for a zero chunk size.
    pub fn from_path(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self, FileError> {
        let path = path.as_ref();
        if chunk_size == 0 {
            return Err(FileError::InvalidChunkSize(chunk_size));
        }

        let size = std::fs::metadata(path)
            .map_err(|source| FileError::Open {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let name = path
            .file_name()
            .map_or_else(|| "unknown".to_string(), |n| n.to_string_lossy().into_owned());

        Ok(Self {
            name,
            size,
            chunk_count: size.div_ceil(chunk_size as u64),
        })
    }
}
