//! Archive extraction to disk.
//!
//! Extraction runs header -> tables -> tree -> write -> snapshot, in that
//! order. Anything that fails before the write phase aborts the run with
//! no files written. During the write phase a file that cannot be written
//! is logged and counted, and the run carries on. Existing output is
//! never overwritten, so re-running an extraction only fills in gaps.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use bigfile_common::{Endian, DEFAULT_CHUNK_SIZE};
use tracing::{debug, info, warn};

use crate::archive::{BigArchive, ReconstructedFile};
use crate::header::VariantSignature;
use crate::snapshot::{ArchiveMetadataSnapshot, METADATA_FILE_NAME};
use crate::tree::validate_name;
use crate::{Error, Result};

/// Required extension of container files.
pub const CONTAINER_EXTENSION: &str = "bf";

/// Subdirectory of the output directory receiving the extracted tree.
pub const EXTRACTED_DIR: &str = "extracted-files";

/// Extraction settings.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub endian: Endian,
    /// Create directories that own no files.
    pub include_empty_dirs: bool,
    /// Replace an existing metadata snapshot.
    pub overwrite_metadata: bool,
    pub chunk_size: u64,
    /// Known distributions to report, matched by file count.
    pub known_variants: Vec<VariantSignature>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            endian: Endian::Little,
            include_empty_dirs: false,
            overwrite_metadata: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            known_variants: Vec::new(),
        }
    }
}

/// Counts reported by an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub files_extracted: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub dirs_created: usize,
    pub dirs_skipped: usize,
    pub metadata_written: bool,
    pub variant: Option<String>,
}

impl ExtractReport {
    /// Whether every file was extracted or already present.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.files_failed == 0
    }
}

/// Extract `input` into `output`.
pub fn extract<P, Q>(input: P, output: Q, options: &ExtractOptions) -> Result<ExtractReport>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    extract_with_progress(input, output, options, |_, _| {})
}

/// Extract `input` into `output`, calling `progress(done, total)` after
/// every file.
pub fn extract_with_progress<P, Q, F>(
    input: P,
    output: Q,
    options: &ExtractOptions,
    mut progress: F,
) -> Result<ExtractReport>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: FnMut(usize, usize),
{
    let input = input.as_ref();
    let output = output.as_ref();

    validate_input(input)?;
    let extracted_root = output.join(EXTRACTED_DIR);
    let mut fresh_root = (!extracted_root.is_dir()).then(|| extracted_root.clone());
    fs::create_dir_all(&extracted_root)?;

    let mut archive = BigArchive::open(input, options.endian, options.chunk_size)?;
    let mut report = ExtractReport {
        variant: archive
            .header()
            .classify(&options.known_variants)
            .map(|v| v.name.clone()),
        ..Default::default()
    };
    if let Some(variant) = &report.variant {
        info!(variant = %variant, "recognised distribution");
    }

    let tree = archive.directory_tree(EXTRACTED_DIR)?;
    let files = archive.reconstruct_files(&tree)?;
    info!(
        files = files.len(),
        directories = tree.len(),
        output = %output.display(),
        "extracting"
    );

    let total = files.len();
    let mut done = 0;
    let mut claimed = HashSet::new();
    for dir in &tree {
        if dir.file_indexes.is_empty() && !options.include_empty_dirs {
            continue;
        }

        let dir_path = output.join(&dir.path);
        if fresh_root.as_deref() == Some(dir_path.as_path()) {
            fresh_root = None;
            report.dirs_created += 1;
        } else if dir_path.is_dir() {
            report.dirs_skipped += 1;
        } else if let Err(e) = fs::create_dir_all(&dir_path) {
            warn!(path = %dir_path.display(), error = %e, "failed to create directory");
            report.files_failed += dir.file_indexes.len();
            done += dir.file_indexes.len();
            progress(done, total);
            continue;
        } else {
            report.dirs_created += 1;
        }

        for &index in &dir.file_indexes {
            write_file(&mut archive, &files[index], &dir_path, &mut claimed, &mut report);
            done += 1;
            progress(done, total);
        }
    }

    let snapshot = ArchiveMetadataSnapshot::capture(&archive, tree, options.include_empty_dirs);
    report.metadata_written = snapshot.save(
        output.join(METADATA_FILE_NAME),
        options.overwrite_metadata,
    )?;
    archive.close();

    info!(
        extracted = report.files_extracted,
        skipped = report.files_skipped,
        failed = report.files_failed,
        dirs_created = report.dirs_created,
        dirs_skipped = report.dirs_skipped,
        "extraction finished"
    );
    Ok(report)
}

fn validate_input(input: &Path) -> Result<()> {
    if !input.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input archive not found: {}", input.display()),
        )));
    }

    let has_extension = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(CONTAINER_EXTENSION));
    if !has_extension {
        return Err(Error::InvalidExtension {
            path: input.to_path_buf(),
            expected: CONTAINER_EXTENSION,
        });
    }
    Ok(())
}

/// Write one file unless an earlier run already did.
///
/// `claimed` holds every destination seen in this run; a second file
/// mapping to the same path is a failure, not a skip.
fn write_file(
    archive: &mut BigArchive,
    file: &ReconstructedFile,
    dir_path: &Path,
    claimed: &mut HashSet<PathBuf>,
    report: &mut ExtractReport,
) {
    if let Err(e) = validate_name(&file.name, "file", file.index) {
        warn!(error = %e, "skipping file");
        report.files_failed += 1;
        return;
    }

    let dest = dir_path.join(&file.name);
    if !claimed.insert(dest.clone()) {
        warn!(
            path = %dest.display(),
            index = file.index,
            "another file in this archive already uses this path"
        );
        report.files_failed += 1;
        return;
    }
    if dest.is_file() {
        debug!(path = %dest.display(), "already extracted");
        report.files_skipped += 1;
        return;
    }
    if dest.exists() {
        warn!(path = %dest.display(), "destination exists and is not a file");
        report.files_failed += 1;
        return;
    }

    let result = archive
        .read_file(file)
        .and_then(|data| fs::write(&dest, data).map_err(Error::from));
    match result {
        Ok(()) => report.files_extracted += 1,
        Err(e) => {
            warn!(path = %dest.display(), error = %e, "failed to extract file");
            if dest.exists() {
                let _ = fs::remove_file(&dest);
            }
            report.files_failed += 1;
        }
    }
}
