//! File chunking.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::FileError;

/// Reads a file front to back in fixed-size pieces.
///
/// The size is captured when the file is opened and the chunker never reads
/// past it, even if the file grows afterwards. A file that shrinks while
/// being read is reported as [`FileError::Truncated`].
#[derive(Debug)]
pub struct FileChunker {
    file: Option<File>,
    path: PathBuf,
    size: u64,
    chunk_size: usize,
    offset: u64,
}

impl FileChunker {
    /// Open `path` for reading, rejecting files larger than `max_size`
    ///
    /// # Errors
    ///
    /// Returns `FileError::InvalidChunkSize` for a zero chunk size,
    /// `FileError::Open` if the file cannot be opened or stat'ed, and
    /// `FileError::TooLarge` if it exceeds `max_size`.
    pub fn open(
        path: impl AsRef<Path>,
        chunk_size: usize,
        max_size: u64,
    ) -> Result<Self, FileError> {
        let path = path.as_ref().to_path_buf();
        if chunk_size == 0 {
            return Err(FileError::InvalidChunkSize(chunk_size));
        }

        let open_err = |source| FileError::Open {
            path: path.clone(),
            source,
        };
        let file = File::open(&path).map_err(open_err)?;
        let size = file.metadata().map_err(open_err)?.len();

        if size > max_size {
            return Err(FileError::TooLarge {
                path,
                size,
                limit: max_size,
            });
        }

        tracing::debug!(
            "Opened {} for reading ({} bytes, {} byte chunks)",
            path.display(),
            size,
            chunk_size
        );

        Ok(Self {
            file: Some(file),
            path,
            size,
            chunk_size,
            offset: 0,
        })
    }

    /// File size captured at open time
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get chunk size
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Calculate number of chunks for this file
    #[must_use]
    pub fn chunk_count(&self) -> u64 {
        self.size.div_ceil(self.chunk_size as u64)
    }

    /// Bytes handed out so far
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes left to read
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.size - self.offset
    }

    /// Path the chunker was opened from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next chunk into `buf`, replacing its contents.
    ///
    /// Returns the chunk length, which is `chunk_size` except for the last
    /// chunk, and `0` once the whole file has been read.
    ///
    /// # Errors
    ///
    /// Returns `FileError::Closed` after [`close`](Self::close),
    /// `FileError::Truncated` if the file ends early, and `FileError::Read`
    /// for other I/O failures.
    pub fn read_chunk(&mut self, buf: &mut Vec<u8>) -> Result<usize, FileError> {
        if self.file.is_none() {
            return Err(FileError::Closed);
        }

        let want = usize::try_from(self.remaining())
            .unwrap_or(usize::MAX)
            .min(self.chunk_size);
        buf.clear();
        buf.resize(want, 0);

        if want == 0 {
            return Ok(0);
        }

        let file = self.file.as_mut().ok_or(FileError::Closed)?;
        match file.read_exact(buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                buf.clear();
                return Err(FileError::Truncated {
                    path: self.path.clone(),
                    read: self.offset,
                    expected: self.size,
                });
            }
            Err(source) => {
                buf.clear();
                return Err(FileError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        }

        self.offset += want as u64;
        tracing::trace!(
            "Read chunk of {} bytes from {} ({}/{})",
            want,
            self.path.display(),
            self.offset,
            self.size
        );

        Ok(want)
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
