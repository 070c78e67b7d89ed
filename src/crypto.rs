//! Cryptography module for the encrypted (.jps) container.
//!
//! Key derivation is PBKDF2-HMAC over a selectable digest; record encryption
//! is AES-128-CBC with PKCS#7 padding and a fresh random IV per record. The
//! emitted ciphertext is `IV || AES-CBC(plaintext)`.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

pub const AES_BLOCK: usize = 16;
pub const IV_SIZE: usize = 16;
/// PBKDF2 output size; the first 16 bytes are the AES-128 key, the rest is
/// reserved for future HMAC use.
pub const KEY_SIZE: usize = 32;
pub const AES_KEY_SIZE: usize = 16;
pub const STATIC_SALT_SIZE: usize = 64;

/// Iteration count when a static archive-wide salt is in use.
pub const STATIC_SALT_ROUNDS: u32 = 128_000;
/// Iteration count for per-record (IV-derived) salts.
pub const RECORD_SALT_ROUNDS: u32 = 2_500;

/// Digest underlying PBKDF2-HMAC. Discriminants match the wire `algo` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfAlgorithm {
    Sha1 = 0,
    Sha256 = 1,
    Sha512 = 2,
}

impl KdfAlgorithm {
    pub fn wire_id(self) -> u8 {
        self as u8
    }

    pub fn from_wire(id: u8) -> Option<Self> {
        match id {
            0 => Some(KdfAlgorithm::Sha1),
            1 => Some(KdfAlgorithm::Sha256),
            2 => Some(KdfAlgorithm::Sha512),
            _ => None,
        }
    }
}

/// Length of the emitted ciphertext for `plain_len` input bytes:
/// a 16-byte IV followed by whole padded AES blocks.
pub fn encrypted_len(plain_len: usize) -> usize {
    IV_SIZE + AES_BLOCK * (plain_len / AES_BLOCK + 1)
}

pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

pub fn generate_static_salt() -> [u8; STATIC_SALT_SIZE] {
    let mut salt = [0u8; STATIC_SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    rounds: u32,
    algorithm: KdfAlgorithm,
) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    match algorithm {
        KdfAlgorithm::Sha1 => pbkdf2_hmac::<Sha1>(password, salt, rounds, &mut key),
        KdfAlgorithm::Sha256 => pbkdf2_hmac::<Sha256>(password, salt, rounds, &mut key),
        KdfAlgorithm::Sha512 => pbkdf2_hmac::<Sha512>(password, salt, rounds, &mut key),
    }
    key
}

/// Per-archive encryption state.
///
/// With a static salt the AES key is derived once up front; otherwise each
/// record derives its own key using that record's random IV as the salt.
#[derive(Debug)]
pub struct CryptoCore {
    algorithm: KdfAlgorithm,
    iterations: u32,
    password: Vec<u8>,
    static_key: Option<[u8; AES_KEY_SIZE]>,
}

impl CryptoCore {
    pub fn new(
        password: &[u8],
        algorithm: KdfAlgorithm,
        static_salt: Option<&[u8; STATIC_SALT_SIZE]>,
    ) -> Self {
        match static_salt {
            Some(salt) => {
                let derived = derive_key(password, salt, STATIC_SALT_ROUNDS, algorithm);
                let mut key = [0u8; AES_KEY_SIZE];
                key.copy_from_slice(&derived[..AES_KEY_SIZE]);
                CryptoCore {
                    algorithm,
                    iterations: STATIC_SALT_ROUNDS,
                    password: password.to_vec(),
                    static_key: Some(key),
                }
            }
            None => CryptoCore {
                algorithm,
                iterations: RECORD_SALT_ROUNDS,
                password: password.to_vec(),
                static_key: None,
            },
        }
    }

    pub fn algorithm(&self) -> KdfAlgorithm {
        self.algorithm
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn uses_static_salt(&self) -> bool {
        self.static_key.is_some()
    }

    /// Encrypts one record, returning `IV || ciphertext`.
    pub fn encrypt_record(&self, plaintext: &[u8]) -> Vec<u8> {
        let iv = generate_iv();
        let key = match self.static_key {
            Some(key) => key,
            None => {
                // Record mode: the fresh IV doubles as the PBKDF2 salt.
                let derived = derive_key(&self.password, &iv, self.iterations, self.algorithm);
                let mut key = [0u8; AES_KEY_SIZE];
                key.copy_from_slice(&derived[..AES_KEY_SIZE]);
                key
            }
        };

        let ciphertext =
            Aes128CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out
    }
}
