//! # The JPS Container Format
//!
//! Wire encoding of the AES-encrypted container. An archive is a standard
//! header, a key-derivation header, one record per entry, and an end
//! header:
//!
//! ```text
//! "JPS" major:u8=2 minor:u8=0 is_split:u8
//! extra_len:u16=76 "JH\x00\x01" field_len:u16=76 algo:u8 iterations:u32
//!     has_static_salt:u8 static_salt:[u8;64]
//! "JPF" enc_header_len:u16 dec_header_len:u16 encrypted(entry header)
//!     ( enc_len:u32 dec_len:u32 encrypted(chunk) )*
//! "JPE" total_parts:u16 entries:u32 uncompressed:u32 compressed:u32
//! ```
//!
//! Every encrypted blob is `IV || AES-128-CBC(plaintext)`. Regular-file
//! payloads are deflated in fixed 65535-byte chunks regardless of the
//! store heuristic; directories carry no data blocks and symlink targets
//! are encrypted raw.

use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::common::{ArchiveEntry, EntryKind, EntrySource};
use crate::compress::{self, MAX_COMPRESS_CHUNK};
use crate::crypto::CryptoCore;
use crate::error::ArchiveError;
use crate::fsx;
use crate::parts::PartManager;

use super::EntryStats;

const SIG_STD: &[u8; 3] = b"JPS";
const SIG_ENTITY: &[u8; 3] = b"JPF";
const SIG_END: &[u8; 3] = b"JPE";
const SIG_KEY_HEADER: &[u8; 4] = b"JH\x00\x01";

const VERSION_MAJOR: u8 = 2;
const VERSION_MINOR: u8 = 0;

/// Key header length on the wire: 12 fixed bytes plus the 64-byte salt slot.
const KEY_HEADER_LEN: u16 = 76;
const END_HEADER_LEN: u64 = 17;

/// Writes the standard header and the key-derivation header.
pub(crate) fn write_std_header(
    parts: &mut PartManager,
    split: bool,
    crypto: &CryptoCore,
    static_salt: Option<&[u8; 64]>,
) -> Result<(), ArchiveError> {
    let mut out = Vec::with_capacity(6 + 2 + KEY_HEADER_LEN as usize);
    out.extend_from_slice(SIG_STD);
    out.push(VERSION_MAJOR);
    out.push(VERSION_MINOR);
    out.push(split as u8);

    out.extend_from_slice(&KEY_HEADER_LEN.to_le_bytes());
    out.extend_from_slice(SIG_KEY_HEADER);
    out.extend_from_slice(&KEY_HEADER_LEN.to_le_bytes());
    out.push(crypto.algorithm().wire_id());
    out.extend_from_slice(&crypto.iterations().to_le_bytes());
    out.push(static_salt.is_some() as u8);
    match static_salt {
        Some(salt) => out.extend_from_slice(salt),
        // The salt slot is fixed-width; zero-fill when per-record salts are in use.
        None => out.extend_from_slice(&[0u8; 64]),
    }
    parts.write_atomic(&out)
}

/// Appends the end header to the terminal part, rolling over first if the
/// current part cannot hold it, and gives the terminal part its canonical
/// extension.
pub(crate) fn write_end_header(
    parts: &mut PartManager,
    entries: u32,
    uncompressed: u64,
    compressed: u64,
) -> Result<(), ArchiveError> {
    parts.ensure_room(END_HEADER_LEN)?;
    parts.finalize_rename()?;

    let mut out = Vec::with_capacity(END_HEADER_LEN as usize);
    out.extend_from_slice(SIG_END);
    out.extend_from_slice(&parts.part_count().to_le_bytes());
    out.extend_from_slice(&entries.to_le_bytes());
    out.extend_from_slice(&(uncompressed as u32).to_le_bytes());
    out.extend_from_slice(&(compressed as u32).to_le_bytes());
    parts.write_unchecked(&out)
}

fn build_header_payload(entry: &ArchiveEntry, wire_path: &[u8]) -> Vec<u8> {
    let compression: u8 = match entry.kind {
        EntryKind::File => 1,
        EntryKind::Directory | EntryKind::Symlink => 0,
    };
    let mut out = Vec::with_capacity(16 + wire_path.len());
    out.extend_from_slice(&(wire_path.len() as u16).to_le_bytes());
    out.extend_from_slice(wire_path);
    out.push(entry.kind as u8);
    out.push(compression);
    out.extend_from_slice(&(entry.size as u32).to_le_bytes());
    out.extend_from_slice(&entry.perms.to_le_bytes());
    out.extend_from_slice(&entry.mtime.to_le_bytes());
    out
}

/// Writes one record: the encrypted entry header followed by the entry's
/// data blocks.
pub(crate) fn write_entry(
    parts: &mut PartManager,
    crypto: &CryptoCore,
    entry: &ArchiveEntry,
    wire_path: &[u8],
) -> Result<EntryStats, ArchiveError> {
    // For disk-backed files, validate the source before the header is
    // committed; afterwards a short read is unrecoverable.
    let mut reader: Option<fsx::File> = None;
    if let (EntryKind::File, EntrySource::Disk(path)) = (entry.kind, &entry.source) {
        let file = fsx::File::open(path)
            .map_err(|e| ArchiveError::UnreadableFile { path: path.clone(), source: e })?;
        let current = file
            .metadata()
            .map_err(|e| ArchiveError::UnreadableFile { path: path.clone(), source: e })?
            .len();
        if current != entry.size {
            return Err(ArchiveError::SizeChanged {
                path: path.clone(),
                expected: entry.size,
                actual: current,
            });
        }
        reader = Some(file);
    }
    // Symlink targets must arrive pre-resolved into a buffer.
    if let (EntryKind::Symlink, EntrySource::Disk(path)) = (entry.kind, &entry.source) {
        return Err(ArchiveError::UnreadableFile {
            path: path.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "symlink entry without a resolved target",
            ),
        });
    }

    let header_payload = build_header_payload(entry, wire_path);
    let enc_header = crypto.encrypt_record(&header_payload);
    if enc_header.len() > u16::MAX as usize {
        return Err(ArchiveError::PathTooLong { path: entry.stored_path.clone() });
    }

    let mut record_head = Vec::with_capacity(7 + enc_header.len());
    record_head.extend_from_slice(SIG_ENTITY);
    record_head.extend_from_slice(&(enc_header.len() as u16).to_le_bytes());
    record_head.extend_from_slice(&(header_payload.len() as u16).to_le_bytes());
    record_head.extend_from_slice(&enc_header);
    parts.write_atomic(&record_head)?;

    let mut compressed_total = 0u64;
    match entry.kind {
        EntryKind::Directory => {}
        EntryKind::Symlink => {
            if let EntrySource::Buffer(bytes) = &entry.source {
                compressed_total += write_data_block(parts, crypto, bytes)?;
            }
        }
        EntryKind::File => match &entry.source {
            EntrySource::Buffer(data) => {
                for chunk in data.chunks(MAX_COMPRESS_CHUNK) {
                    let deflated = compress::deflate(chunk)?;
                    compressed_total += write_data_block(parts, crypto, &deflated)?;
                }
            }
            EntrySource::Disk(path) => {
                let file = reader.take().expect("opened above");
                compressed_total += stream_file_blocks(parts, crypto, file, path, entry.size)?;
            }
        },
    }

    Ok(EntryStats { uncompressed: entry.size, compressed: compressed_total })
}

/// Deflates and encrypts a disk file in fixed-size chunks.
fn stream_file_blocks(
    parts: &mut PartManager,
    crypto: &CryptoCore,
    mut file: fsx::File,
    path: &Path,
    size: u64,
) -> Result<u64, ArchiveError> {
    let mut buf = vec![0u8; MAX_COMPRESS_CHUNK.min(size as usize).max(1)];
    let mut remaining = size;
    let mut compressed_total = 0u64;
    while remaining > 0 {
        let want = (remaining as usize).min(MAX_COMPRESS_CHUNK);
        let mut filled = 0usize;
        while filled < want {
            let n = file
                .read(&mut buf[filled..want])
                .map_err(|e| ArchiveError::Io { path: path.to_path_buf(), source: e })?;
            if n == 0 {
                return Err(ArchiveError::ShortRead {
                    path: path.to_path_buf(),
                    expected: size,
                    actual: size - remaining + filled as u64,
                });
            }
            filled += n;
        }
        let deflated = compress::deflate(&buf[..want])?;
        compressed_total += write_data_block(parts, crypto, &deflated)?;
        remaining -= want as u64;
    }
    Ok(compressed_total)
}

/// Writes one data block: the 8-byte length prefix is indivisible, the
/// ciphertext body may straddle parts. The MD5 of the ciphertext as it
/// reaches the disk must match the pre-split digest.
fn write_data_block(
    parts: &mut PartManager,
    crypto: &CryptoCore,
    plain: &[u8],
) -> Result<u64, ArchiveError> {
    let enc = crypto.encrypt_record(plain);

    let mut prefix = Vec::with_capacity(8);
    prefix.extend_from_slice(&(enc.len() as u32).to_le_bytes());
    prefix.extend_from_slice(&(plain.len() as u32).to_le_bytes());
    parts.write_atomic(&prefix)?;

    let expected = Md5::digest(&enc);
    let mut hasher = Md5::new();
    parts.write_split_observed(&enc, |slice| hasher.update(slice))?;
    if hasher.finalize() != expected {
        return Err(ArchiveError::EncodingCorruption(
            "written ciphertext does not reassemble to the pre-split buffer".into(),
        ));
    }
    Ok(enc.len() as u64)
}
