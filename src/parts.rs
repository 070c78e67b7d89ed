//! Multi-part output management.
//!
//! A split archive is written as `<base>.j01`, `<base>.j02`, ... with the
//! terminal part carrying the canonical extension (`.jpa` / `.jps`). The
//! part manager maintains the invariant `size(current_part) <= part_size`
//! except inside a single indivisible write, and rolls over to the next part
//! on request.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::ArchiveError;
use crate::fsx;
use crate::sink::PartSink;

/// Mode bits for freshly created part files.
const PART_FILE_MODE: u32 = 0o666;

/// Owns the active [`PartSink`] and the part numbering sequence.
#[derive(Debug)]
pub struct PartManager {
    /// Target path carrying the canonical extension.
    final_path: PathBuf,
    /// Maximum part size in bytes; 0 disables splitting.
    part_size: u64,
    /// Number of parts created so far.
    part_count: u16,
    sink: Option<PartSink>,
}

impl PartManager {
    /// Creates the first part and opens a sink on it.
    ///
    /// In split mode the first part is named `<base>.j01`; the terminal
    /// part only receives the canonical extension at finalization.
    pub fn create(target: &Path, part_size: u64) -> Result<Self, ArchiveError> {
        let first = if part_size > 0 {
            numbered_part(target, 1)
        } else {
            target.to_path_buf()
        };
        fsx::create_with_mode(&first, PART_FILE_MODE)
            .map_err(|e| ArchiveError::SinkOpen { path: first.clone(), source: e })?;
        let sink = PartSink::open(&first)?;
        Ok(PartManager {
            final_path: target.to_path_buf(),
            part_size,
            part_count: 1,
            sink: Some(sink),
        })
    }

    pub fn split_enabled(&self) -> bool {
        self.part_size > 0
    }

    pub fn part_count(&self) -> u16 {
        self.part_count
    }

    /// Path of the first part, where Format-A rewrites its standard header.
    pub fn first_part_path(&self) -> PathBuf {
        if self.part_count <= 1 {
            self.current_path()
        } else {
            numbered_part(&self.final_path, 1)
        }
    }

    pub fn current_path(&self) -> PathBuf {
        self.sink
            .as_ref()
            .map(|s| s.path().to_path_buf())
            .unwrap_or_else(|| self.final_path.clone())
    }

    /// Residual capacity of the current part; `u64::MAX` when splitting is
    /// disabled.
    pub fn free_space(&self) -> Result<u64, ArchiveError> {
        if !self.split_enabled() {
            return Ok(u64::MAX);
        }
        let sink = self.sink.as_ref().ok_or(ArchiveError::InvalidState("free_space"))?;
        let used = sink.size().map_err(|e| ArchiveError::Io {
            path: sink.path().to_path_buf(),
            source: e,
        })?;
        Ok(self.part_size.saturating_sub(used))
    }

    /// Rolls over to the next part if the current one cannot hold `n` more
    /// bytes. A part that is still empty is never abandoned, so an
    /// over-sized indivisible write lands in a fresh part and may exceed
    /// `part_size` on its own.
    pub fn ensure_room(&mut self, n: u64) -> Result<(), ArchiveError> {
        if !self.split_enabled() {
            return Ok(());
        }
        let free = self.free_space()?;
        if free < n && free < self.part_size {
            self.rollover(false)?;
        }
        Ok(())
    }

    /// Closes the current sink, creates the next part file and opens a sink
    /// on it. With `final_part` the new part takes the canonical extension.
    pub fn rollover(&mut self, final_part: bool) -> Result<(), ArchiveError> {
        if let Some(sink) = self.sink.take() {
            sink.close().map_err(|e| ArchiveError::Io {
                path: self.final_path.clone(),
                source: e,
            })?;
        }
        let next_index = self.part_count + 1;
        let next = if final_part {
            self.final_path.clone()
        } else {
            numbered_part(&self.final_path, next_index)
        };
        fsx::create_with_mode(&next, PART_FILE_MODE)
            .map_err(|e| ArchiveError::Rollover { path: next.clone(), source: e })?;
        let sink = match PartSink::open(&next) {
            Ok(sink) => sink,
            Err(ArchiveError::SinkOpen { path, source }) => {
                return Err(ArchiveError::Rollover { path, source })
            }
            Err(e) => return Err(e),
        };
        self.sink = Some(sink);
        self.part_count = next_index;
        Ok(())
    }

    /// Writes an indivisible byte group, rolling over first when it would
    /// not fit.
    pub fn write_atomic(&mut self, buf: &[u8]) -> Result<(), ArchiveError> {
        self.ensure_room(buf.len() as u64)?;
        self.write_all(buf)
    }

    /// Writes `buf` allowing it to straddle part boundaries: fills the
    /// residual capacity of the current part, rolls over and continues.
    pub fn write_split(&mut self, buf: &[u8]) -> Result<(), ArchiveError> {
        self.write_split_observed(buf, |_| {})
    }

    /// Like [`PartManager::write_split`], invoking `observer` on every slice
    /// in the order it reaches the disk. Callers use this to digest the
    /// byte stream exactly as written.
    pub fn write_split_observed<F>(&mut self, buf: &[u8], mut observer: F) -> Result<(), ArchiveError>
    where
        F: FnMut(&[u8]),
    {
        let mut off = 0usize;
        while off < buf.len() {
            let free = self.free_space()?;
            if free == 0 {
                self.rollover(false)?;
                continue;
            }
            let want = ((buf.len() - off) as u64).min(free) as usize;
            let sink = self.sink.as_mut().ok_or(ArchiveError::InvalidState("write"))?;
            let written = sink.write(&buf[off..off + want]).map_err(|e| ArchiveError::Io {
                path: sink.path().to_path_buf(),
                source: e,
            })?;
            if written == 0 {
                return Err(ArchiveError::Io {
                    path: sink.path().to_path_buf(),
                    source: io::Error::new(io::ErrorKind::WriteZero, "sink accepted no bytes"),
                });
            }
            observer(&buf[off..off + written]);
            off += written;
        }
        Ok(())
    }

    /// Writes without any boundary bookkeeping. Callers must have already
    /// reserved room via [`PartManager::ensure_room`].
    pub(crate) fn write_unchecked(&mut self, buf: &[u8]) -> Result<(), ArchiveError> {
        self.write_all(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), ArchiveError> {
        let sink = self.sink.as_mut().ok_or(ArchiveError::InvalidState("write"))?;
        sink.write_all(buf).map_err(|e| ArchiveError::Io {
            path: sink.path().to_path_buf(),
            source: e,
        })
    }

    /// Ensures the current (terminal) part carries the canonical extension,
    /// renaming and reopening the sink when it does not.
    pub fn finalize_rename(&mut self) -> Result<(), ArchiveError> {
        let current = self.current_path();
        if current == self.final_path {
            return Ok(());
        }
        if let Some(sink) = self.sink.take() {
            sink.close().map_err(|e| ArchiveError::Io {
                path: current.clone(),
                source: e,
            })?;
        }
        fsx::rename(&current, &self.final_path).map_err(|e| ArchiveError::FinalRename {
            from: current,
            to: self.final_path.clone(),
            source: e,
        })?;
        self.sink = Some(PartSink::open(&self.final_path)?);
        Ok(())
    }

    /// Flushes and releases the active sink.
    pub fn close(&mut self) -> Result<(), ArchiveError> {
        if let Some(sink) = self.sink.take() {
            sink.close().map_err(|e| ArchiveError::Io {
                path: self.final_path.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

fn numbered_part(base: &Path, index: u16) -> PathBuf {
    base.with_extension(format!("j{:02}", index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsplit_manager_writes_to_target_directly() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.jpa");
        let mut parts = PartManager::create(&target, 0).unwrap();
        assert_eq!(parts.free_space().unwrap(), u64::MAX);
        parts.write_atomic(b"abc").unwrap();
        parts.close().unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"abc");
    }

    #[test]
    fn split_manager_numbers_parts_and_renames_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.jpa");
        let mut parts = PartManager::create(&target, 4).unwrap();
        assert_eq!(parts.current_path(), dir.path().join("out.j01"));

        parts.write_split(b"0123456789").unwrap();
        assert_eq!(parts.part_count(), 3);
        parts.finalize_rename().unwrap();
        parts.close().unwrap();

        assert_eq!(std::fs::read(dir.path().join("out.j01")).unwrap(), b"0123");
        assert_eq!(std::fs::read(dir.path().join("out.j02")).unwrap(), b"4567");
        assert_eq!(std::fs::read(&target).unwrap(), b"89");
    }

    #[test]
    fn ensure_room_rolls_over_before_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.jpa");
        let mut parts = PartManager::create(&target, 8).unwrap();
        parts.write_atomic(b"abcdef").unwrap();

        // 2 bytes left; a 4-byte atomic group must land in part 2 whole.
        parts.write_atomic(b"wxyz").unwrap();
        assert_eq!(parts.part_count(), 2);
        parts.close().unwrap();
        assert_eq!(std::fs::read(dir.path().join("out.j01")).unwrap(), b"abcdef");
        assert_eq!(std::fs::read(dir.path().join("out.j02")).unwrap(), b"wxyz");
    }

    #[test]
    fn observer_sees_bytes_in_disk_order() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.jpa");
        let mut parts = PartManager::create(&target, 4).unwrap();

        let mut seen = Vec::new();
        parts
            .write_split_observed(b"abcdefgh", |s| seen.extend_from_slice(s))
            .unwrap();
        assert_eq!(seen, b"abcdefgh");
        parts.close().unwrap();
    }
}
