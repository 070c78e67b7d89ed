//! Common types shared between the writer engine and the CLI front end.
// Entry metadata, path normalization, etc.

use std::path::{Path, PathBuf};

use crate::error::ArchiveError;
use crate::fsx;

/// The kind of filesystem object an entry describes. The discriminants match
/// the on-disk `file_type` byte of both container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory = 0,
    File = 1,
    Symlink = 2,
}

/// Where an entry's payload bytes come from.
#[derive(Debug, Clone)]
pub enum EntrySource {
    /// Payload is read from this on-disk path at write time.
    Disk(PathBuf),
    /// Payload is supplied in memory ("virtual" entry).
    Buffer(Vec<u8>),
}

/// Metadata for a single file, directory or symlink entry to be archived.
///
/// `stored_path` is taken as authoritative: the writer performs no
/// normalization beyond appending a trailing `/` to directory paths when
/// building the record.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub stored_path: String,
    pub kind: EntryKind,
    pub source: EntrySource,
    /// POSIX mode bits.
    pub perms: u32,
    /// Seconds since the epoch; 0 suppresses the timestamp on the wire.
    pub mtime: u32,
    /// Uncompressed payload size in bytes.
    pub size: u64,
}

impl ArchiveEntry {
    /// Builds an entry from an on-disk object.
    ///
    /// With `dereference_symlinks` a link is archived as whatever it points
    /// at; otherwise the link itself is stored and its payload is the
    /// readlink target bytes.
    pub fn from_path(
        abs_path: &Path,
        stored_path: &str,
        dereference_symlinks: bool,
    ) -> Result<Self, ArchiveError> {
        let lmeta = fsx::symlink_metadata(abs_path).map_err(|e| ArchiveError::UnreadableFile {
            path: abs_path.to_path_buf(),
            source: e,
        })?;

        if lmeta.file_type().is_symlink() && !dereference_symlinks {
            let target = fsx::read_link(abs_path).map_err(|e| ArchiveError::UnreadableFile {
                path: abs_path.to_path_buf(),
                source: e,
            })?;
            let target_bytes = path_bytes(&target);
            let len = target_bytes.len() as u64;
            return Ok(ArchiveEntry {
                stored_path: stored_path.to_string(),
                kind: EntryKind::Symlink,
                source: EntrySource::Buffer(target_bytes),
                perms: fsx::unix_mode(&lmeta),
                mtime: 0,
                size: len,
            });
        }

        // Regular file or directory; a dereferenced link resolves here too.
        let meta = fsx::metadata(abs_path).map_err(|e| ArchiveError::UnreadableFile {
            path: abs_path.to_path_buf(),
            source: e,
        })?;
        let kind = if meta.is_dir() { EntryKind::Directory } else { EntryKind::File };
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        Ok(ArchiveEntry {
            stored_path: stored_path.to_string(),
            kind,
            source: EntrySource::Disk(abs_path.to_path_buf()),
            perms: fsx::unix_mode(&meta),
            mtime,
            size: if meta.is_dir() { 0 } else { meta.len() },
        })
    }

    /// Builds a virtual entry backed by an in-memory buffer.
    pub fn virtual_buf(stored_path: &str, content: Vec<u8>) -> Self {
        let size = content.len() as u64;
        ArchiveEntry {
            stored_path: stored_path.to_string(),
            kind: EntryKind::File,
            source: EntrySource::Buffer(content),
            perms: 0o755,
            mtime: chrono::Utc::now().timestamp() as u32,
            size,
        }
    }
}

fn path_bytes(path: &Path) -> Vec<u8> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    }
    #[cfg(not(unix))]
    {
        path.to_string_lossy().replace('\\', "/").into_bytes()
    }
}

/// Normalize a stored path: unify separators, strip a leading `./` and
/// collapse doubled slashes.
/// Example: "./dir1//dir2/file.txt" becomes "dir1/dir2/file.txt"
pub fn normalize_path(path: &str) -> String {
    let s = path.replace('\\', "/");
    let trimmed = s.strip_prefix("./").unwrap_or(&s);
    let mut collapsed = trimmed.to_string();
    while collapsed.contains("//") {
        collapsed = collapsed.replace("//", "/");
    }
    collapsed.trim_start_matches('/').to_string()
}
