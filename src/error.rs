use std::io;
use std::path::PathBuf;

/// The primary error type for all operations in the `jparch` crate.
///
/// Variants split into two classes: *warnings* (the offending entry is
/// skipped, the archive stays well-formed) and *fatal errors* (the archive
/// is considered corrupt and the writer refuses further work). Use
/// [`ArchiveError::is_warning`] to tell them apart.
#[derive(Debug)]
pub enum ArchiveError {
    /// The target (or next part) file could not be opened for appending.
    SinkOpen { path: PathBuf, source: io::Error },

    /// Creating or opening the next part during a rollover failed.
    Rollover { path: PathBuf, source: io::Error },

    /// Renaming the last part to its canonical extension failed.
    FinalRename { from: PathBuf, to: PathBuf, source: io::Error },

    /// Encryption was requested but no usable key material is available.
    CryptoUnavailable(String),

    /// A source file delivered fewer bytes than its committed header promised.
    ShortRead { path: PathBuf, expected: u64, actual: u64 },

    /// A single source file could not be read; the entry is skipped.
    UnreadableFile { path: PathBuf, source: io::Error },

    /// A source file changed size between stat and read; the entry is skipped.
    SizeChanged { path: PathBuf, expected: u64, actual: u64 },

    /// A stored path exceeds the 65535-byte wire limit; the entry is skipped.
    PathTooLong { path: String },

    /// The split-ciphertext consistency digest did not match.
    EncodingCorruption(String),

    /// An empty password was supplied for an encrypted archive.
    EmptyPassword,

    /// An operation was invoked in a state that does not permit it.
    InvalidState(&'static str),

    /// An I/O error that does not fit a more specific variant.
    Io { path: PathBuf, source: io::Error },
}

impl ArchiveError {
    /// True for the non-fatal class: the current entry is skipped and the
    /// archive remains well-formed.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ArchiveError::UnreadableFile { .. }
                | ArchiveError::SizeChanged { .. }
                | ArchiveError::PathTooLong { .. }
                | ArchiveError::EmptyPassword
        )
    }
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveError::SinkOpen { path, source } => {
                write!(f, "Cannot write to target '{}': {}", path.display(), source)
            }
            ArchiveError::Rollover { path, source } => {
                write!(f, "Cannot create next part '{}': {}", path.display(), source)
            }
            ArchiveError::FinalRename { from, to, source } => write!(
                f,
                "Cannot rename '{}' to '{}': {}",
                from.display(),
                to.display(),
                source
            ),
            ArchiveError::CryptoUnavailable(msg) => write!(f, "Encryption unavailable: {}", msg),
            ArchiveError::ShortRead { path, expected, actual } => write!(
                f,
                "Source file '{}' shrank mid-write: expected {} bytes, read {}",
                path.display(),
                expected,
                actual
            ),
            ArchiveError::UnreadableFile { path, source } => {
                write!(f, "Skipping unreadable file '{}': {}", path.display(), source)
            }
            ArchiveError::SizeChanged { path, expected, actual } => write!(
                f,
                "Skipping '{}': size changed during read ({} -> {} bytes)",
                path.display(),
                expected,
                actual
            ),
            ArchiveError::PathTooLong { path } => {
                let head: String = path.chars().take(80).collect();
                write!(f, "Skipping entry: stored path longer than 65535 bytes ({}...)", head)
            }
            ArchiveError::EncodingCorruption(msg) => {
                write!(f, "Ciphertext split consistency check failed: {}", msg)
            }
            ArchiveError::EmptyPassword => {
                write!(f, "Empty password supplied; the archive will be trivially decryptable")
            }
            ArchiveError::InvalidState(op) => {
                write!(f, "Operation '{}' not permitted in the writer's current state", op)
            }
            ArchiveError::Io { path, source } => {
                if path.as_os_str().is_empty() {
                    write!(f, "I/O error: {}", source)
                } else {
                    write!(f, "I/O error on path '{}': {}", path.display(), source)
                }
            }
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveError::SinkOpen { source, .. }
            | ArchiveError::Rollover { source, .. }
            | ArchiveError::FinalRename { source, .. }
            | ArchiveError::UnreadableFile { source, .. }
            | ArchiveError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

// Generic IO error conversion that doesn't require a path
impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        ArchiveError::Io { path: PathBuf::new(), source: err }
    }
}
