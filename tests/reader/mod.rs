//! Minimal conformant reader used by the integration tests to invert the
//! on-disk formats, including archives split across parts.
#![allow(dead_code)]

use std::io::Read;
use std::path::{Path, PathBuf};

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use flate2::read::DeflateDecoder;

use jparch::crypto::{derive_key, KdfAlgorithm, AES_KEY_SIZE, IV_SIZE, RECORD_SALT_ROUNDS};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

#[derive(Debug)]
pub struct ReadEntry {
    pub path: String,
    pub file_type: u8,
    pub compression: u8,
    pub compressed_len: u64,
    pub uncompressed_len: u64,
    pub perms: u32,
    pub mtime: u32,
    /// Decompressed (and decrypted) payload bytes.
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct JpaArchive {
    pub header_len: u16,
    pub total_entries: u32,
    pub total_uncompressed: u32,
    pub total_compressed: u32,
    pub total_parts: Option<u16>,
    pub entries: Vec<ReadEntry>,
}

#[derive(Debug)]
pub struct JpsArchive {
    pub is_split: bool,
    pub algorithm: u8,
    pub iterations: u32,
    pub has_static_salt: bool,
    pub static_salt: [u8; 64],
    pub total_parts: u16,
    pub total_entries: u32,
    pub total_uncompressed: u32,
    pub total_compressed: u32,
    pub entries: Vec<ReadEntry>,
}

/// All parts of an archive in read order: `<base>.j01`, `.j02`, ... then the
/// canonically named terminal part.
pub fn collect_parts(final_path: &Path) -> Vec<PathBuf> {
    let mut parts = Vec::new();
    for index in 1..=u16::MAX {
        let numbered = final_path.with_extension(format!("j{:02}", index));
        if numbered.exists() {
            parts.push(numbered);
        } else {
            break;
        }
    }
    parts.push(final_path.to_path_buf());
    parts
}

/// The archive byte stream reassembled from all its parts.
pub fn read_concatenated(final_path: &Path) -> Vec<u8> {
    let mut out = Vec::new();
    for part in collect_parts(final_path) {
        out.extend_from_slice(&std::fs::read(&part).unwrap());
    }
    out
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> &'a [u8] {
    let slice = &bytes[*pos..*pos + n];
    *pos += n;
    slice
}

fn take_u16(bytes: &[u8], pos: &mut usize) -> u16 {
    u16::from_le_bytes(take(bytes, pos, 2).try_into().unwrap())
}

fn take_u32(bytes: &[u8], pos: &mut usize) -> u32 {
    u32::from_le_bytes(take(bytes, pos, 4).try_into().unwrap())
}

fn inflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    DeflateDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

pub fn read_jpa(final_path: &Path) -> JpaArchive {
    let bytes = read_concatenated(final_path);
    let mut pos = 0usize;

    assert_eq!(take(&bytes, &mut pos, 3), b"JPA");
    let header_len = take_u16(&bytes, &mut pos);
    assert_eq!(take(&bytes, &mut pos, 2), &[1, 2], "format version");
    let total_entries = take_u32(&bytes, &mut pos);
    let total_uncompressed = take_u32(&bytes, &mut pos);
    let total_compressed = take_u32(&bytes, &mut pos);

    let total_parts = if header_len == 27 {
        assert_eq!(take(&bytes, &mut pos, 4), b"JP\x01\x01");
        assert_eq!(take_u16(&bytes, &mut pos), 4);
        Some(take_u16(&bytes, &mut pos))
    } else {
        assert_eq!(header_len, 19);
        None
    };

    let mut entries = Vec::new();
    while pos < bytes.len() {
        assert_eq!(take(&bytes, &mut pos, 3), b"JPF");
        let block_len = take_u16(&bytes, &mut pos);
        let path_len = take_u16(&bytes, &mut pos);
        let path = String::from_utf8(take(&bytes, &mut pos, path_len as usize).to_vec()).unwrap();
        let file_type = take(&bytes, &mut pos, 1)[0];
        let compression = take(&bytes, &mut pos, 1)[0];
        let compressed_len = take_u32(&bytes, &mut pos);
        let uncompressed_len = take_u32(&bytes, &mut pos);
        let perms = take_u32(&bytes, &mut pos);

        let mut mtime = 0u32;
        if block_len == 21 + path_len + 8 {
            assert_eq!(take(&bytes, &mut pos, 2), b"\x00\x01");
            assert_eq!(take_u16(&bytes, &mut pos), 8);
            mtime = take_u32(&bytes, &mut pos);
        } else {
            assert_eq!(block_len, 21 + path_len);
        }

        let payload = take(&bytes, &mut pos, compressed_len as usize);
        let data = if compression == 1 { inflate(payload) } else { payload.to_vec() };
        assert_eq!(data.len() as u32, uncompressed_len);

        entries.push(ReadEntry {
            path,
            file_type,
            compression,
            compressed_len: compressed_len as u64,
            uncompressed_len: uncompressed_len as u64,
            perms,
            mtime,
            data,
        });
    }

    JpaArchive {
        header_len,
        total_entries,
        total_uncompressed,
        total_compressed,
        total_parts,
        entries,
    }
}

fn decrypt_blob(
    blob: &[u8],
    password: &[u8],
    algorithm: KdfAlgorithm,
    static_key: Option<[u8; AES_KEY_SIZE]>,
) -> Vec<u8> {
    let iv: [u8; IV_SIZE] = blob[..IV_SIZE].try_into().unwrap();
    let key = match static_key {
        Some(key) => key,
        None => {
            let derived = derive_key(password, &iv, RECORD_SALT_ROUNDS, algorithm);
            derived[..AES_KEY_SIZE].try_into().unwrap()
        }
    };
    Aes128CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&blob[IV_SIZE..])
        .expect("bad padding")
}

pub fn read_jps(final_path: &Path, password: &[u8]) -> JpsArchive {
    let bytes = read_concatenated(final_path);
    let mut pos = 0usize;

    assert_eq!(take(&bytes, &mut pos, 3), b"JPS");
    assert_eq!(take(&bytes, &mut pos, 2), &[2, 0], "format version");
    let is_split = take(&bytes, &mut pos, 1)[0] != 0;

    assert_eq!(take_u16(&bytes, &mut pos), 76);
    assert_eq!(take(&bytes, &mut pos, 4), b"JH\x00\x01");
    assert_eq!(take_u16(&bytes, &mut pos), 76);
    let algorithm = take(&bytes, &mut pos, 1)[0];
    let iterations = take_u32(&bytes, &mut pos);
    let has_static_salt = take(&bytes, &mut pos, 1)[0] != 0;
    let static_salt: [u8; 64] = take(&bytes, &mut pos, 64).try_into().unwrap();

    let kdf = KdfAlgorithm::from_wire(algorithm).expect("unknown KDF algorithm");
    let static_key: Option<[u8; AES_KEY_SIZE]> = if has_static_salt {
        let derived = derive_key(password, &static_salt, iterations, kdf);
        Some(derived[..AES_KEY_SIZE].try_into().unwrap())
    } else {
        None
    };

    let mut archive = JpsArchive {
        is_split,
        algorithm,
        iterations,
        has_static_salt,
        static_salt,
        total_parts: 0,
        total_entries: 0,
        total_uncompressed: 0,
        total_compressed: 0,
        entries: Vec::new(),
    };

    loop {
        let sig = take(&bytes, &mut pos, 3);
        if sig == b"JPE" {
            archive.total_parts = take_u16(&bytes, &mut pos);
            archive.total_entries = take_u32(&bytes, &mut pos);
            archive.total_uncompressed = take_u32(&bytes, &mut pos);
            archive.total_compressed = take_u32(&bytes, &mut pos);
            break;
        }
        assert_eq!(sig, b"JPF");
        let enc_header_len = take_u16(&bytes, &mut pos);
        let dec_header_len = take_u16(&bytes, &mut pos);
        let header = decrypt_blob(
            take(&bytes, &mut pos, enc_header_len as usize),
            password,
            kdf,
            static_key,
        );
        assert_eq!(header.len(), dec_header_len as usize);

        let mut hpos = 0usize;
        let path_len = take_u16(&header, &mut hpos);
        let path = String::from_utf8(take(&header, &mut hpos, path_len as usize).to_vec()).unwrap();
        let file_type = take(&header, &mut hpos, 1)[0];
        let compression = take(&header, &mut hpos, 1)[0];
        let uncompressed_len = take_u32(&header, &mut hpos);
        let perms = take_u32(&header, &mut hpos);
        let mtime = take_u32(&header, &mut hpos);

        let mut data = Vec::new();
        let mut compressed_len = 0u64;
        // Directories carry no blocks; symlinks carry one raw block; files
        // carry deflated chunks until the advertised size is reassembled.
        if file_type == 2 {
            let (block, enc_len) = read_data_block(&bytes, &mut pos, password, kdf, static_key);
            compressed_len += enc_len;
            data = block;
        } else if file_type == 1 {
            while (data.len() as u32) < uncompressed_len {
                let (block, enc_len) = read_data_block(&bytes, &mut pos, password, kdf, static_key);
                compressed_len += enc_len;
                data.extend_from_slice(&inflate(&block));
            }
        }
        assert_eq!(data.len() as u32, uncompressed_len);

        archive.entries.push(ReadEntry {
            path,
            file_type,
            compression,
            compressed_len,
            uncompressed_len: uncompressed_len as u64,
            perms,
            mtime,
            data,
        });
    }

    archive
}

fn read_data_block(
    bytes: &[u8],
    pos: &mut usize,
    password: &[u8],
    kdf: KdfAlgorithm,
    static_key: Option<[u8; AES_KEY_SIZE]>,
) -> (Vec<u8>, u64) {
    let enc_len = take_u32(bytes, pos);
    let dec_len = take_u32(bytes, pos);
    let plain = decrypt_blob(take(bytes, pos, enc_len as usize), password, kdf, static_key);
    assert_eq!(plain.len(), dec_len as usize);
    (plain, enc_len as u64)
}
