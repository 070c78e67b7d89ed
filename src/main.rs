//! Main entry point for the jparch CLI app

use std::path::{Path, PathBuf};

use jparch::archive::{ArchiveFormat, ArchiveWriter, WriterOptions};
use jparch::cli::{self, Commands};
use jparch::common::normalize_path;
use jparch::crypto;
use walkdir::WalkDir;

fn main() -> std::process::ExitCode {
    if let Err(e) = run_app() {
        if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
            let _ = clap_err.print();
            if !clap_err.use_stderr() {
                return std::process::ExitCode::SUCCESS;
            }
        } else {
            eprintln!("Error: {}", e);
        }
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

fn run_app() -> Result<(), Box<dyn std::error::Error>> {
    let command = cli::run()?;

    match &command {
        Commands::Create { inputs, output, password, part_size, static_salt, dereference } => {
            let format = detect_format(output);
            if format == ArchiveFormat::Jps && password.is_none() {
                return Err("--password is required for .jps output".into());
            }

            let part_size = match part_size {
                Some(text) => cli::parse_part_size(text)
                    .map_err(|e| format!("Invalid --part-size: {}", e))?,
                None => 0,
            };

            let mut opts = WriterOptions::new(format);
            opts.part_size = part_size;
            opts.dereference_symlinks = *dereference;
            opts.password = password.as_ref().map(|p| p.as_bytes().to_vec());
            if *static_salt {
                opts.static_salt = Some(crypto::generate_static_salt());
            }

            let mut writer = ArchiveWriter::new(opts);
            if !writer.initialize(output) {
                return Err(drain_failure(&mut writer));
            }

            for input in inputs {
                add_tree(&mut writer, input, *dereference)?;
            }

            report_warnings(&mut writer);
            if !writer.finalize() {
                return Err(drain_failure(&mut writer));
            }
            report_warnings(&mut writer);

            println!(
                "Archived {} entries ({} bytes raw, {} bytes stored) into {} part(s)",
                writer.total_entries(),
                writer.total_uncompressed(),
                writer.total_compressed(),
                writer.total_parts(),
            );
        }
    }

    Ok(())
}

fn detect_format(output: &Path) -> ArchiveFormat {
    match output.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("jps") => ArchiveFormat::Jps,
        _ => ArchiveFormat::Jpa,
    }
}

/// Walks one input and feeds every object to the writer, directories before
/// their contents. Traversal hiccups are reported and skipped.
fn add_tree(
    writer: &mut ArchiveWriter,
    input: &PathBuf,
    dereference: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let base = if input.is_dir() {
        input.clone()
    } else {
        input.parent().map(Path::to_path_buf).unwrap_or_else(|| input.clone())
    };

    for entry in WalkDir::new(input).follow_links(dereference).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                eprintln!("Warning: {}", e);
                continue;
            }
        };
        let rel = entry.path().strip_prefix(&base).unwrap_or(entry.path());
        if rel.as_os_str().is_empty() {
            continue;
        }
        let stored = normalize_path(&rel.to_string_lossy());
        writer.add_entry_from_path(entry.path(), &stored);

        report_warnings(writer);
        let errors = writer.drain_errors();
        if !errors.is_empty() {
            return Err(errors.join("; ").into());
        }
    }
    Ok(())
}

fn report_warnings(writer: &mut ArchiveWriter) {
    for warning in writer.drain_warnings() {
        eprintln!("Warning: {}", warning);
    }
}

fn drain_failure(writer: &mut ArchiveWriter) -> Box<dyn std::error::Error> {
    let errors = writer.drain_errors();
    if errors.is_empty() {
        "archive creation failed".into()
    } else {
        errors.join("; ").into()
    }
}
