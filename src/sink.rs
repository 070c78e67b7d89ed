//! Append-mode byte sink backing the active part file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::ArchiveError;
use crate::fsx;

/// Scoped handle on one part file, opened in binary-append mode.
///
/// The handle is released exactly once on every exit path: either through
/// [`PartSink::close`] or through `Drop`. Size queries restat the file, since
/// a cached length would go stale across external writes.
#[derive(Debug)]
pub struct PartSink {
    file: File,
    path: PathBuf,
}

impl PartSink {
    /// Opens `path` for appending, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| ArchiveError::SinkOpen { path: path.to_path_buf(), source: e })?;
        Ok(PartSink { file, path: path.to_path_buf() })
    }

    /// Writes as much of `buf` as the OS accepts and returns the byte count.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    /// Writes the whole of `buf`.
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    /// Current on-disk size of the part, obtained by restatting.
    pub fn size(&self) -> io::Result<u64> {
        fsx::metadata(&self.path).map(|m| m.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and releases the handle.
    pub fn close(mut self) -> io::Result<()> {
        self.file.flush()
    }
}
