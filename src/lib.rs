//! # jparch Core Library
//!
//! This crate provides the core functionality for the `jparch` archiver.
//!
//! It is designed to be used by the `jparch` command-line application, but its public API
//! can also be used to programmatically produce `.jpa` and `.jps` backup archives.
//!
//! ## Key Modules
//!
//! - [`archive`]: The streaming archive writer engine and the two container formats.
//! - [`compress`]: Raw-DEFLATE payload compression and the store/deflate policy.
//! - [`crypto`]: PBKDF2 key derivation and AES-128-CBC record encryption for `.jps`.
//! - [`parts`]: Multi-part (`.j01`, `.j02`, ...) output management.
//! - [`sink`]: The append-mode byte sink backing the active part file.

pub mod archive;
pub mod cli;
pub mod common;
pub mod compress;

pub mod crypto;
pub mod error;
pub use error::ArchiveError;

pub mod parts;
pub mod sink;

// Cross-platform filesystem wrapper
pub mod fsx;
