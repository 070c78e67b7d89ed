//! # Archive Writer Engine
//!
//! The streaming encoder that owns the output part files, assembles
//! per-entry headers, compresses and optionally encrypts payload blocks and
//! enforces part-boundary rules while producing the byte-exact on-disk
//! layout of the two container formats:
//!
//! - **JPA** (`.jpa`): the plain container ([`jpa`]).
//! - **JPS** (`.jps`): the AES-encrypted container ([`jps`]).
//!
//! A writer is single-threaded and synchronous; entries appear in the
//! archive in the exact order they are submitted. Non-fatal conditions are
//! queued as warnings and the offending entry is skipped; fatal conditions
//! park the writer in a terminal failed state.

pub mod jpa;
pub mod jps;

use std::collections::VecDeque;
use std::path::Path;

use crate::common::{ArchiveEntry, EntryKind};
use crate::crypto::{CryptoCore, KdfAlgorithm, STATIC_SALT_SIZE};
use crate::error::ArchiveError;
use crate::parts::PartManager;

/// Which container format the writer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Plain container, canonical extension `.jpa`.
    Jpa,
    /// AES-encrypted container, canonical extension `.jps`.
    Jps,
}

impl ArchiveFormat {
    pub fn canonical_extension(self) -> &'static str {
        match self {
            ArchiveFormat::Jpa => "jpa",
            ArchiveFormat::Jps => "jps",
        }
    }
}

/// Configuration consumed by [`ArchiveWriter::new`]. All knobs travel here;
/// the writer reads no environment and no process-wide state.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub format: ArchiveFormat,
    /// Maximum size of each part file in bytes; 0 disables splitting.
    pub part_size: u64,
    /// Archive the target of a symlink instead of the link itself.
    pub dereference_symlinks: bool,
    /// Password for `.jps` output; ignored for `.jpa`.
    pub password: Option<Vec<u8>>,
    /// Digest for PBKDF2 key derivation.
    pub kdf_algorithm: KdfAlgorithm,
    /// Archive-wide salt. When set, key derivation happens once with
    /// 128 000 rounds; when absent each record derives its own key from its
    /// IV with 2 500 rounds.
    pub static_salt: Option<[u8; STATIC_SALT_SIZE]>,
}

impl WriterOptions {
    pub fn new(format: ArchiveFormat) -> Self {
        WriterOptions {
            format,
            part_size: 0,
            dereference_symlinks: false,
            password: None,
            kdf_algorithm: KdfAlgorithm::Sha1,
            static_salt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Fresh,
    Initialized,
    Writing,
    Finalized,
    Failed,
}

/// Per-entry byte accounting reported by the format backends.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EntryStats {
    pub uncompressed: u64,
    pub compressed: u64,
}

/// A writer responsible for producing one archive.
///
/// Lifecycle: [`ArchiveWriter::initialize`] once, any number of
/// `add_*` calls, [`ArchiveWriter::finalize`] once. Every mutating
/// operation reports success as a boolean; diagnostics accumulate in the
/// warning and error queues and are handed out through the `drain_*`
/// methods.
pub struct ArchiveWriter {
    opts: WriterOptions,
    state: WriterState,
    parts: Option<PartManager>,
    crypto: Option<CryptoCore>,
    total_entries: u32,
    total_uncompressed: u64,
    total_compressed: u64,
    warnings: VecDeque<String>,
    errors: VecDeque<String>,
}

impl ArchiveWriter {
    pub fn new(opts: WriterOptions) -> Self {
        ArchiveWriter {
            opts,
            state: WriterState::Fresh,
            parts: None,
            crypto: None,
            total_entries: 0,
            total_uncompressed: 0,
            total_compressed: 0,
            warnings: VecDeque::new(),
            errors: VecDeque::new(),
        }
    }

    /// Creates the first part file and writes the format's standard header.
    pub fn initialize(&mut self, target: &Path) -> bool {
        let result = self.try_initialize(target);
        self.absorb(result).is_some()
    }

    /// Submits one prepared entry. Returns true iff the entry landed in the
    /// archive; a skipped entry queues a warning and returns false.
    pub fn add_entry(&mut self, entry: ArchiveEntry) -> bool {
        let result = self.try_add(entry);
        self.absorb(result).is_some()
    }

    /// Builds an entry from an on-disk object and submits it.
    pub fn add_entry_from_path(&mut self, abs_path: &Path, stored_path: &str) -> bool {
        let dereference = self.opts.dereference_symlinks;
        match ArchiveEntry::from_path(abs_path, stored_path, dereference) {
            Ok(entry) => self.add_entry(entry),
            Err(e) => {
                self.absorb::<()>(Err(e));
                false
            }
        }
    }

    /// Submits an in-memory ("virtual") entry.
    pub fn add_virtual_entry(&mut self, stored_path: &str, content: &[u8]) -> bool {
        self.add_entry(ArchiveEntry::virtual_buf(stored_path, content.to_vec()))
    }

    /// Submits a batch of entries in order. Warnings skip individual
    /// entries; the first fatal error stops the batch. Returns true iff no
    /// fatal error occurred.
    pub fn add_entries<I>(&mut self, entries: I) -> bool
    where
        I: IntoIterator<Item = ArchiveEntry>,
    {
        for entry in entries {
            self.add_entry(entry);
            if self.state == WriterState::Failed {
                return false;
            }
        }
        true
    }

    /// Completes the archive: renames the terminal part to its canonical
    /// extension and writes/rewrites the final headers. Calling this on an
    /// already finalized writer is a no-op reporting success.
    pub fn finalize(&mut self) -> bool {
        if self.state == WriterState::Finalized {
            return true;
        }
        let result = self.try_finalize();
        self.absorb(result).is_some()
    }

    pub fn drain_warnings(&mut self) -> Vec<String> {
        self.warnings.drain(..).collect()
    }

    pub fn drain_errors(&mut self) -> Vec<String> {
        self.errors.drain(..).collect()
    }

    /// Count of entries that were actually added.
    pub fn total_entries(&self) -> u32 {
        self.total_entries
    }

    pub fn total_uncompressed(&self) -> u64 {
        self.total_uncompressed
    }

    pub fn total_compressed(&self) -> u64 {
        self.total_compressed
    }

    pub fn total_parts(&self) -> u16 {
        self.parts.as_ref().map(|p| p.part_count()).unwrap_or(0)
    }

    // ----------------------------------------------------------------
    // Internals
    // ----------------------------------------------------------------

    /// Routes an internal result into the diagnostic queues: warnings keep
    /// the writer alive, everything else parks it in the failed state.
    fn absorb<T>(&mut self, result: Result<T, ArchiveError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) if e.is_warning() => {
                self.warnings.push_back(e.to_string());
                None
            }
            Err(e) => {
                self.errors.push_back(e.to_string());
                self.state = WriterState::Failed;
                None
            }
        }
    }

    fn try_initialize(&mut self, target: &Path) -> Result<(), ArchiveError> {
        if self.state != WriterState::Fresh {
            return Err(ArchiveError::InvalidState("initialize"));
        }

        if self.opts.format == ArchiveFormat::Jps {
            let password = match &self.opts.password {
                Some(p) => p.clone(),
                None => {
                    return Err(ArchiveError::CryptoUnavailable(
                        "an encrypted archive requires a password".into(),
                    ))
                }
            };
            if password.is_empty() {
                self.warnings.push_back(ArchiveError::EmptyPassword.to_string());
            }
            self.crypto = Some(CryptoCore::new(
                &password,
                self.opts.kdf_algorithm,
                self.opts.static_salt.as_ref(),
            ));
        }

        let mut parts = PartManager::create(target, self.opts.part_size)?;
        let split = parts.split_enabled();
        match self.opts.format {
            ArchiveFormat::Jpa => jpa::write_std_header(&mut parts, split)?,
            ArchiveFormat::Jps => {
                let crypto = self.crypto.as_ref().expect("crypto initialized above");
                jps::write_std_header(&mut parts, split, crypto, self.opts.static_salt.as_ref())?;
            }
        }
        self.parts = Some(parts);
        self.state = WriterState::Initialized;
        Ok(())
    }

    fn try_add(&mut self, entry: ArchiveEntry) -> Result<(), ArchiveError> {
        if !matches!(self.state, WriterState::Initialized | WriterState::Writing) {
            return Err(ArchiveError::InvalidState("add_entry"));
        }

        let wire_path = wire_path_bytes(&entry);
        // The path length and the record block length both travel as u16;
        // the block length adds up to 29 bytes of fixed fields.
        if wire_path.len() > u16::MAX as usize - 29 {
            return Err(ArchiveError::PathTooLong { path: entry.stored_path.clone() });
        }

        self.state = WriterState::Writing;
        let parts = self.parts.as_mut().ok_or(ArchiveError::InvalidState("add_entry"))?;
        let stats = match self.opts.format {
            ArchiveFormat::Jpa => jpa::write_entry(parts, &entry, &wire_path)?,
            ArchiveFormat::Jps => {
                let crypto = self.crypto.as_ref().ok_or(ArchiveError::InvalidState("add_entry"))?;
                jps::write_entry(parts, crypto, &entry, &wire_path)?
            }
        };

        self.total_entries += 1;
        self.total_uncompressed += stats.uncompressed;
        self.total_compressed += stats.compressed;
        Ok(())
    }

    fn try_finalize(&mut self) -> Result<(), ArchiveError> {
        if !matches!(self.state, WriterState::Initialized | WriterState::Writing) {
            return Err(ArchiveError::InvalidState("finalize"));
        }
        let parts = self.parts.as_mut().ok_or(ArchiveError::InvalidState("finalize"))?;

        match self.opts.format {
            ArchiveFormat::Jpa => {
                parts.finalize_rename()?;
                let split = parts.split_enabled();
                let total_parts = parts.part_count();
                let first = parts.first_part_path();
                parts.close()?;
                jpa::rewrite_std_header(
                    &first,
                    split,
                    self.total_entries,
                    self.total_uncompressed,
                    self.total_compressed,
                    total_parts,
                )?;
            }
            ArchiveFormat::Jps => {
                jps::write_end_header(
                    parts,
                    self.total_entries,
                    self.total_uncompressed,
                    self.total_compressed,
                )?;
                parts.close()?;
            }
        }
        self.state = WriterState::Finalized;
        Ok(())
    }
}

/// The path bytes as they appear on the wire: directories carry a trailing
/// slash.
fn wire_path_bytes(entry: &ArchiveEntry) -> Vec<u8> {
    let mut bytes = entry.stored_path.as_bytes().to_vec();
    if entry.kind == EntryKind::Directory && !bytes.ends_with(b"/") {
        bytes.push(b'/');
    }
    bytes
}
