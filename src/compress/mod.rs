//! # Payload Compression
//!
//! Both container formats store payloads either verbatim ("store") or as a
//! raw DEFLATE bitstream, equivalent to zlib output with the 2-byte header
//! and 4-byte Adler-32 trailer removed. This module provides the encoder
//! and the per-file store/deflate policy.

use std::io::{self, Write};

use flate2::write::DeflateEncoder;
use flate2::Compression;
use sysinfo::System;

use crate::common::EntryKind;

/// Files at or above this size are stored rather than compressed, so their
/// on-disk length is known without buffering the whole compressed result.
pub const COMPRESSION_THRESHOLD: u64 = 24 * 1024 * 1024;

/// Read granularity for streaming large stored payloads.
pub const CHUNK_BYTES: usize = 10 * 1024 * 1024;

/// Fixed plaintext chunk size for encrypted data blocks.
pub const MAX_COMPRESS_CHUNK: usize = 65_535;

/// Fraction of available memory a compression input may occupy before the
/// policy falls back to store.
const MEMORY_BUDGET_FRACTION: f64 = 0.4;

/// On-disk compression method byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Payload bytes written verbatim.
    Store = 0,
    /// Raw DEFLATE bitstream.
    Deflate = 1,
}

impl Method {
    pub fn wire_id(self) -> u8 {
        self as u8
    }
}

/// Compresses `data` into a raw DEFLATE bitstream.
pub fn deflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2 + 64), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Store/deflate policy for one entry.
///
/// Directories and symlinks are always stored. Regular files are stored when
/// they are large enough that buffering the compressed result would be
/// unreasonable, either in absolute terms or against the machine's available
/// memory; everything else is deflated. Callers still fall back to store
/// when the deflated form does not shrink.
pub fn choose_method(kind: EntryKind, size: u64) -> Method {
    match kind {
        EntryKind::Directory | EntryKind::Symlink => Method::Store,
        EntryKind::File => {
            if size >= COMPRESSION_THRESHOLD {
                return Method::Store;
            }
            if let Some(avail) = available_memory() {
                if size as f64 > avail as f64 * MEMORY_BUDGET_FRACTION {
                    return Method::Store;
                }
            }
            Method::Deflate
        }
    }
}

fn available_memory() -> Option<u64> {
    let mut sys = System::new();
    sys.refresh_memory();
    let avail = sys.available_memory();
    if avail == 0 {
        None
    } else {
        Some(avail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        DeflateDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn deflate_roundtrips_and_shrinks_repetitive_input() {
        let input = vec![b'A'; 4096];
        let packed = deflate(&input).unwrap();
        assert!(packed.len() < input.len());
        assert_eq!(inflate(&packed), input);
    }

    #[test]
    fn deflate_of_empty_input_roundtrips() {
        let packed = deflate(b"").unwrap();
        assert_eq!(inflate(&packed), b"");
    }

    #[test]
    fn directories_and_symlinks_are_always_stored() {
        assert_eq!(choose_method(EntryKind::Directory, 0), Method::Store);
        assert_eq!(choose_method(EntryKind::Symlink, 12), Method::Store);
    }

    #[test]
    fn oversized_files_are_stored() {
        assert_eq!(choose_method(EntryKind::File, COMPRESSION_THRESHOLD), Method::Store);
        assert_eq!(choose_method(EntryKind::File, u64::MAX), Method::Store);
    }

    #[test]
    fn small_files_are_deflated() {
        assert_eq!(choose_method(EntryKind::File, 1024), Method::Deflate);
    }
}
