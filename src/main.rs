//! Bigfile CLI - Command-line tool for Big File game archives.
//!
//! This is the main entry point for the Bigfile command-line application.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use bigfile::archive::{header::derived_offsets, BuildReport, ExtractReport};
use bigfile::prelude::*;

/// Largest accepted `--chunk-size-mib` (64 GiB).
const MAX_CHUNK_SIZE_MIB: u64 = 64 * 1024;

fn mib_to_bytes(mib: u64) -> u64 {
    mib * 1024 * 1024
}

/// Bigfile - Big File game archive extraction tool
#[derive(Parser)]
#[command(name = "bigfile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that opens a container.
#[derive(Args)]
struct ReadArgs {
    /// Container is big-endian
    #[arg(long)]
    big_endian: bool,

    /// Bytes resident in memory at once, in MiB
    #[arg(long, default_value_t = 512, value_parser = clap::value_parser!(u64).range(1..=MAX_CHUNK_SIZE_MIB))]
    chunk_size_mib: u64,
}

impl ReadArgs {
    fn endian(&self) -> Endian {
        Endian::from_little(!self.big_endian)
    }

    fn chunk_size(&self) -> u64 {
        mib_to_bytes(self.chunk_size_mib)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract files from a Big File container
    Extract {
        /// Path to the .bf file
        #[arg(short, long, env = "INPUT_BF")]
        input: PathBuf,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,

        /// Also create directories that hold no files
        #[arg(long)]
        include_empty_dirs: bool,

        /// Replace an existing metadata.json
        #[arg(long)]
        force_metadata: bool,

        /// Known distribution, as NAME=FILE_COUNT (repeatable)
        #[arg(long = "variant", value_name = "NAME=FILE_COUNT")]
        variants: Vec<VariantSignature>,

        #[command(flatten)]
        read: ReadArgs,
    },

    /// Rebuild a container from an extraction directory
    Build {
        /// Path to the original .bf file
        #[arg(short, long, env = "INPUT_BF")]
        input: PathBuf,

        /// Extraction directory containing metadata.json
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        extracted: PathBuf,

        /// Destination container
        #[arg(short, long)]
        output: PathBuf,

        /// Replace an existing destination
        #[arg(long)]
        force: bool,

        /// Bytes resident in memory at once, in MiB
        #[arg(long, default_value_t = 512, value_parser = clap::value_parser!(u64).range(1..=MAX_CHUNK_SIZE_MIB))]
        chunk_size_mib: u64,
    },

    /// List contents of a Big File container
    List {
        /// Path to the .bf file
        #[arg(short, long, env = "INPUT_BF")]
        input: PathBuf,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,

        #[command(flatten)]
        read: ReadArgs,
    },

    /// Show the header of a Big File container
    Info {
        /// Path to the .bf file
        #[arg(short, long, env = "INPUT_BF")]
        input: PathBuf,

        /// Known distribution, as NAME=FILE_COUNT (repeatable)
        #[arg(long = "variant", value_name = "NAME=FILE_COUNT")]
        variants: Vec<VariantSignature>,

        #[command(flatten)]
        read: ReadArgs,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            input,
            output,
            include_empty_dirs,
            force_metadata,
            variants,
            read,
        } => {
            let options = ExtractOptions {
                endian: read.endian(),
                include_empty_dirs,
                overwrite_metadata: force_metadata,
                chunk_size: read.chunk_size(),
                known_variants: variants,
            };
            let report = cmd_extract(&input, &output, &options)?;
            if !report.is_success() {
                eprintln!("{} files could not be written", report.files_failed);
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Build {
            input,
            extracted,
            output,
            force,
            chunk_size_mib,
        } => {
            let options = BuildOptions {
                chunk_size: mib_to_bytes(chunk_size_mib),
                overwrite: force,
            };
            cmd_build(&input, &extracted, &output, &options)?;
        }
        Commands::List {
            input,
            filter,
            detailed,
            read,
        } => {
            cmd_list(&input, filter.as_deref(), detailed, &read)?;
        }
        Commands::Info {
            input,
            variants,
            read,
        } => {
            cmd_info(&input, &variants, &read)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_extract(input: &Path, output: &Path, options: &ExtractOptions) -> Result<ExtractReport> {
    println!("Extracting {} -> {}", input.display(), output.display());

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let report = bigfile::archive::extract_with_progress(input, output, options, |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    })
    .context("Failed to extract archive")?;
    pb.finish_with_message("Done");

    if let Some(variant) = &report.variant {
        println!("Variant: {variant}");
    }
    println!(
        "Extracted {} files in {:?} ({} skipped, {} failed)",
        report.files_extracted,
        start.elapsed(),
        report.files_skipped,
        report.files_failed
    );
    println!(
        "Directories: {} created, {} already present",
        report.dirs_created, report.dirs_skipped
    );
    if !report.metadata_written {
        println!("Kept existing metadata snapshot (use --force-metadata to replace it)");
    }

    Ok(report)
}

fn cmd_build(
    input: &Path,
    extracted: &Path,
    output: &Path,
    options: &BuildOptions,
) -> Result<BuildReport> {
    println!("Building {} from {}", output.display(), extracted.display());

    let start = Instant::now();
    let report = build(input, extracted, output, options).context("Failed to build archive")?;

    println!(
        "Wrote {} files ({} rebuilt, {} copied), {} directories, {} bytes in {:?}",
        report.files_total,
        report.files_rebuilt,
        report.files_copied,
        report.directories_written,
        report.bytes_written,
        start.elapsed()
    );

    Ok(report)
}

fn cmd_list(input: &Path, filter: Option<&str>, detailed: bool, read: &ReadArgs) -> Result<()> {
    let pattern = filter
        .map(glob::Pattern::new)
        .transpose()
        .context("Invalid filter pattern")?;

    let archive = BigArchive::open(input, read.endian(), read.chunk_size())
        .context("Failed to open archive")?;
    let tree = archive.directory_tree("")?;
    let files = archive.reconstruct_files(&tree)?;

    let mut count = 0;
    for file in &files {
        let path = file.path();
        if let Some(pattern) = &pattern {
            if !pattern.matches(&path) {
                continue;
            }
        }

        if detailed {
            println!(
                "{:>12} {:>12} {:>10} {}",
                file.size, file.data_offset, file.unix_timestamp, path
            );
        } else {
            println!("{path}");
        }
        count += 1;
    }

    println!("\nTotal: {count} files");
    archive.close();

    Ok(())
}

fn cmd_info(input: &Path, variants: &[VariantSignature], read: &ReadArgs) -> Result<()> {
    let archive = BigArchive::open(input, read.endian(), read.chunk_size())
        .context("Failed to open archive")?;
    let header = archive.header();

    println!("Format version:        {:#x}", header.format_version);
    println!(
        "Files:                 {} (duplicate {})",
        header.file_count, header.file_count2
    );
    println!(
        "Directories:           {} (duplicate {})",
        header.directory_count, header.directory_count2
    );
    println!(
        "Offset table:          {} slots at {}",
        header.offset_table_max_length, header.offset_table_offset
    );
    let (files_at, dirs_at) =
        derived_offsets(header.offset_table_offset, header.offset_table_max_length);
    println!("File metadata at:      {files_at}");
    println!("Directory metadata at: {dirs_at}");
    println!("Tables end at:         {}", header.tables_end());
    println!("Initial key:           {:#010x}", header.initial_key);

    match header.classify(variants) {
        Some(variant) => println!("Variant:               {variant}"),
        None => println!("Variant:               unknown"),
    }

    archive.close();
    Ok(())
}
