use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create a new archive from specified files and directories.
    #[command(alias = "c")]
    Create {
        /// One or more input files or directories to add to the archive.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// The path for the output archive. A `.jps` extension selects the
        /// encrypted container and requires --password.
        #[arg(short, long)]
        output: PathBuf,

        /// Password for encrypted (.jps) output.
        #[arg(long)]
        password: Option<String>,

        /// Split the archive into parts of at most this size, e.g. "2M",
        /// "512K" or a plain byte count.
        #[arg(long)]
        part_size: Option<String>,

        /// Derive one archive-wide key from a random static salt instead of
        /// a fresh key per record. Much faster for many small files.
        #[arg(long)]
        static_salt: bool,

        /// Archive whatever symlinks point at instead of the links themselves.
        #[arg(long)]
        dereference: bool,
    },
}

/// Parses command-line arguments.
pub fn run() -> Result<Commands, clap::Error> {
    Args::try_parse().map(|args| args.command)
}

/// Parses a human-readable size: a decimal integer with an optional
/// case-insensitive `K`/`M`/`G` suffix (powers of 1024).
pub fn parse_part_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    let last = trimmed.chars().last().ok_or_else(|| "empty size".to_string())?;
    let (digits, multiplier) = match last {
        'k' | 'K' => (&trimmed[..trimmed.len() - 1], 1024u64),
        'm' | 'M' => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        'g' | 'G' => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
        _ => (trimmed, 1),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size '{}'", input))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' overflows", input))
}
