//! Cross-platform filesystem shim used throughout jparch.
//!
//! For now this is a *very* thin wrapper around `std::fs` so the rest of the
//! codebase can simply `use crate::fsx as fs;` and stay platform-agnostic.
//!
//! * On **all** platforms we publicly re-export every symbol from `std::fs` so
//!   things like `fs::File` or `fs::rename` work out of the box.
//! * On Unix we add `create_with_mode()` which creates a file with an explicit
//!   POSIX mode, and `unix_mode()` which extracts the full mode bits from
//!   file metadata.
//! * On Windows (and any non-Unix target) the mode parameter is ignored and
//!   `unix_mode()` synthesizes conventional bits.

use std::io;
use std::path::Path;

// Re-export the whole standard fs module so callers can write `fs::File` etc.
pub use std::fs::*;

// --------------------------------------------------------------------------
// Unix-specific helpers
// --------------------------------------------------------------------------
#[cfg(unix)]
pub fn create_with_mode(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

#[cfg(unix)]
pub fn unix_mode(meta: &Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

// --------------------------------------------------------------------------
// Non-Unix stubs (Windows, wasm, etc.)
// --------------------------------------------------------------------------
#[cfg(not(unix))]
pub fn create_with_mode(path: &Path, _mode: u32) -> io::Result<File> {
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(not(unix))]
pub fn unix_mode(meta: &Metadata) -> u32 {
    if meta.is_dir() {
        0o755
    } else {
        0o644
    }
}
