//! # The JPA Container Format
//!
//! Wire encoding of the plain (unencrypted) container. An archive is a
//! standard header, an optional split header, then one entity record per
//! entry:
//!
//! ```text
//! "JPA" header_len:u16 major:u8 minor:u8 entries:u32 uncompressed:u32 compressed:u32
//! [ "JP\x01\x01" extra_len:u16=4 total_parts:u16 ]          -- split archives only
//! "JPF" block_len:u16 path_len:u16 path ... payload
//! ```
//!
//! All integers are little-endian. The standard header is written with zero
//! counters at initialization and rewritten in place at finalization; on
//! split archives the rewrite targets the first part.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::{ArchiveEntry, EntryKind, EntrySource};
use crate::compress::{self, Method, CHUNK_BYTES};
use crate::error::ArchiveError;
use crate::fsx;
use crate::parts::PartManager;

use super::EntryStats;

const SIG_STD: &[u8; 3] = b"JPA";
const SIG_ENTITY: &[u8; 3] = b"JPF";
const SIG_SPLIT: &[u8; 4] = b"JP\x01\x01";

const VERSION_MAJOR: u8 = 1;
const VERSION_MINOR: u8 = 2;

/// Standard header length: 19 bytes, or 27 with the split header appended.
const STD_HEADER_LEN: u16 = 19;
const STD_HEADER_LEN_SPLIT: u16 = 27;

fn build_std_header(split: bool, entries: u32, uncompressed: u32, compressed: u32, total_parts: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(STD_HEADER_LEN_SPLIT as usize);
    out.extend_from_slice(SIG_STD);
    let header_len = if split { STD_HEADER_LEN_SPLIT } else { STD_HEADER_LEN };
    out.extend_from_slice(&header_len.to_le_bytes());
    out.push(VERSION_MAJOR);
    out.push(VERSION_MINOR);
    out.extend_from_slice(&entries.to_le_bytes());
    out.extend_from_slice(&uncompressed.to_le_bytes());
    out.extend_from_slice(&compressed.to_le_bytes());
    if split {
        out.extend_from_slice(SIG_SPLIT);
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&total_parts.to_le_bytes());
    }
    out
}

/// Writes the placeholder standard header into a freshly created archive.
pub(crate) fn write_std_header(parts: &mut PartManager, split: bool) -> Result<(), ArchiveError> {
    parts.write_atomic(&build_std_header(split, 0, 0, 0, 0))
}

/// Rewrites the standard header in place with the final counters.
pub(crate) fn rewrite_std_header(
    first_part: &Path,
    split: bool,
    entries: u32,
    uncompressed: u64,
    compressed: u64,
    total_parts: u16,
) -> Result<(), ArchiveError> {
    let header = build_std_header(split, entries, uncompressed as u32, compressed as u32, total_parts);
    let mut file = fsx::OpenOptions::new()
        .write(true)
        .open(first_part)
        .map_err(|e| ArchiveError::Io { path: first_part.to_path_buf(), source: e })?;
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.write_all(&header))
        .map_err(|e| ArchiveError::Io { path: first_part.to_path_buf(), source: e })
}

fn build_entry_header(
    wire_path: &[u8],
    kind: EntryKind,
    method: Method,
    compressed_len: u32,
    uncompressed_len: u32,
    perms: u32,
    mtime: u32,
) -> Vec<u8> {
    let mut block_len = 21u16 + wire_path.len() as u16;
    if mtime > 0 {
        block_len += 8;
    }
    let mut out = Vec::with_capacity(block_len as usize);
    out.extend_from_slice(SIG_ENTITY);
    out.extend_from_slice(&block_len.to_le_bytes());
    out.extend_from_slice(&(wire_path.len() as u16).to_le_bytes());
    out.extend_from_slice(wire_path);
    out.push(kind as u8);
    out.push(method.wire_id());
    out.extend_from_slice(&compressed_len.to_le_bytes());
    out.extend_from_slice(&uncompressed_len.to_le_bytes());
    out.extend_from_slice(&perms.to_le_bytes());
    if mtime > 0 {
        // Timestamp extra field.
        out.extend_from_slice(b"\x00\x01");
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&mtime.to_le_bytes());
    }
    out
}

/// Writes one entity record. The header is an indivisible group; payload
/// bytes are free to straddle part boundaries.
pub(crate) fn write_entry(
    parts: &mut PartManager,
    entry: &ArchiveEntry,
    wire_path: &[u8],
) -> Result<EntryStats, ArchiveError> {
    match entry.kind {
        EntryKind::Directory => {
            let header =
                build_entry_header(wire_path, entry.kind, Method::Store, 0, 0, entry.perms, entry.mtime);
            parts.write_atomic(&header)?;
            Ok(EntryStats::default())
        }
        EntryKind::Symlink => {
            let target = match &entry.source {
                EntrySource::Buffer(bytes) => bytes.as_slice(),
                EntrySource::Disk(path) => {
                    return Err(ArchiveError::UnreadableFile {
                        path: path.clone(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::InvalidInput,
                            "symlink entry without a resolved target",
                        ),
                    })
                }
            };
            let len = target.len() as u32;
            let header =
                build_entry_header(wire_path, entry.kind, Method::Store, len, len, entry.perms, entry.mtime);
            parts.write_atomic(&header)?;
            parts.write_split(target)?;
            Ok(EntryStats { uncompressed: len as u64, compressed: len as u64 })
        }
        EntryKind::File => match &entry.source {
            EntrySource::Buffer(data) => write_buffered(parts, entry, wire_path, data),
            EntrySource::Disk(path) => {
                if compress::choose_method(EntryKind::File, entry.size) == Method::Deflate {
                    let data = fsx::read(path).map_err(|e| ArchiveError::UnreadableFile {
                        path: path.clone(),
                        source: e,
                    })?;
                    if data.len() as u64 != entry.size {
                        return Err(ArchiveError::SizeChanged {
                            path: path.clone(),
                            expected: entry.size,
                            actual: data.len() as u64,
                        });
                    }
                    write_buffered(parts, entry, wire_path, &data)
                } else {
                    write_stored_stream(parts, entry, wire_path, path)
                }
            }
        },
    }
}

/// In-memory path: deflate unless the policy or an expansion says store.
fn write_buffered(
    parts: &mut PartManager,
    entry: &ArchiveEntry,
    wire_path: &[u8],
    data: &[u8],
) -> Result<EntryStats, ArchiveError> {
    let mut method = compress::choose_method(EntryKind::File, data.len() as u64);
    let packed;
    let payload: &[u8] = if method == Method::Deflate {
        packed = compress::deflate(data)?;
        if packed.len() < data.len() {
            &packed
        } else {
            method = Method::Store;
            data
        }
    } else {
        data
    };

    let header = build_entry_header(
        wire_path,
        EntryKind::File,
        method,
        payload.len() as u32,
        data.len() as u32,
        entry.perms,
        entry.mtime,
    );
    parts.write_atomic(&header)?;
    parts.write_split(payload)?;
    Ok(EntryStats { uncompressed: data.len() as u64, compressed: payload.len() as u64 })
}

/// Streaming store path for large files: the payload is copied through a
/// bounded buffer and may straddle parts. Once the header is committed a
/// short source read is unrecoverable.
fn write_stored_stream(
    parts: &mut PartManager,
    entry: &ArchiveEntry,
    wire_path: &[u8],
    path: &Path,
) -> Result<EntryStats, ArchiveError> {
    let mut file = fsx::File::open(path)
        .map_err(|e| ArchiveError::UnreadableFile { path: path.to_path_buf(), source: e })?;
    let current = file
        .metadata()
        .map_err(|e| ArchiveError::UnreadableFile { path: path.to_path_buf(), source: e })?
        .len();
    if current != entry.size {
        return Err(ArchiveError::SizeChanged {
            path: path.to_path_buf(),
            expected: entry.size,
            actual: current,
        });
    }

    let header = build_entry_header(
        wire_path,
        EntryKind::File,
        Method::Store,
        entry.size as u32,
        entry.size as u32,
        entry.perms,
        entry.mtime,
    );
    parts.write_atomic(&header)?;

    let mut buf = vec![0u8; CHUNK_BYTES.min(entry.size as usize).max(1)];
    let mut remaining = entry.size;
    while remaining > 0 {
        let want = (remaining as usize).min(buf.len());
        let n = file
            .read(&mut buf[..want])
            .map_err(|e| ArchiveError::Io { path: path.to_path_buf(), source: e })?;
        if n == 0 {
            return Err(ArchiveError::ShortRead {
                path: path.to_path_buf(),
                expected: entry.size,
                actual: entry.size - remaining,
            });
        }
        parts.write_split(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(EntryStats { uncompressed: entry.size, compressed: entry.size })
}
