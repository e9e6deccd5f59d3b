//! Container rebuilding from an extraction directory.
//!
//! A build reads the metadata snapshot written by an extraction, swaps in
//! any files found under `rebuilt-files/`, lays the data region out again
//! and writes a complete container. Bytes the format does not describe
//! (header reserved fields, gaps around the tables) are copied from the
//! original container unchanged.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bigfile_common::DEFAULT_CHUNK_SIZE;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive::BigArchive;
use crate::header::{patch_counts, HEADER_SIZE};
use crate::snapshot::{ArchiveMetadataSnapshot, METADATA_FILE_NAME};
use crate::tables::{encode_entries, DirectoryMetadataEntry, FileMetadataEntry, NO_INDEX};
use crate::tree::build_tree;
use crate::{Error, Result};

/// Subdirectory of an extraction directory holding replacement files.
pub const REBUILT_DIR: &str = "rebuilt-files";

/// Build settings.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub chunk_size: u64,
    /// Replace an existing destination file.
    pub overwrite: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overwrite: false,
        }
    }
}

/// Counts reported by a build run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub files_total: usize,
    pub files_rebuilt: usize,
    pub files_copied: usize,
    pub directories_written: usize,
    pub bytes_written: u64,
}

/// Where a file's payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Original { payload_offset: u64 },
    Rebuilt(PathBuf),
}

/// Compute sequential data offsets.
///
/// The first file keeps `first`; each following one starts right after the
/// previous file's size prefix and payload.
pub fn plan_offsets(first: u32, sizes: &[u32]) -> Result<Vec<u32>> {
    let mut offsets = Vec::with_capacity(sizes.len());
    let mut next = first;
    for (index, &size) in sizes.iter().enumerate() {
        offsets.push(next);
        next = next
            .checked_add(size)
            .and_then(|n| n.checked_add(4))
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "data region overflows 32-bit offsets at file {index}"
                ))
            })?;
    }
    Ok(offsets)
}

/// Indices of directories that own a file, plus all their ancestors, ascending.
pub fn select_directories(
    directories: &[DirectoryMetadataEntry],
    files: &[FileMetadataEntry],
) -> Result<Vec<usize>> {
    let count = directories.len();
    let mut keep = vec![false; count];

    for (index, file) in files.iter().enumerate() {
        let mut current = usize::try_from(file.directory_index)
            .ok()
            .filter(|&d| d < count)
            .ok_or_else(|| {
                Error::CorruptArchive(format!(
                    "file {index} references directory {} of {count}",
                    file.directory_index
                ))
            })?;

        // Each step marks a new directory, so the walk is bounded by `count`.
        while !keep[current] {
            keep[current] = true;
            let parent = directories[current].parent_index;
            if parent == NO_INDEX {
                break;
            }
            current = usize::try_from(parent)
                .ok()
                .filter(|&p| p < count)
                .ok_or_else(|| {
                    Error::CorruptArchive(format!(
                        "directory {current} references parent {parent} of {count}"
                    ))
                })?;
        }
    }

    Ok((0..count).filter(|&i| keep[i]).collect())
}

/// Rewrite directory links and file owners for a reduced directory set.
///
/// Links to a dropped directory follow the same link on the dropped entry
/// until a kept directory (or the end of the chain) is reached.
pub fn remap_directories(
    directories: &[DirectoryMetadataEntry],
    files: &mut [FileMetadataEntry],
    kept: &[usize],
) -> Result<Vec<DirectoryMetadataEntry>> {
    let mut new_index = vec![None; directories.len()];
    for (new, &old) in kept.iter().enumerate() {
        new_index[old] = Some(new as i32);
    }

    let resolve = |start: i32, link: fn(&DirectoryMetadataEntry) -> i32| -> i32 {
        let mut current = start;
        for _ in 0..=directories.len() {
            let Some(slot) = usize::try_from(current).ok().filter(|&c| c < directories.len())
            else {
                return NO_INDEX;
            };
            if let Some(new) = new_index[slot] {
                return new;
            }
            current = link(&directories[slot]);
        }
        NO_INDEX
    };

    let remapped = kept
        .iter()
        .map(|&old| {
            let dir = &directories[old];
            DirectoryMetadataEntry {
                first_file_index: dir.first_file_index,
                first_subdir_index: resolve(dir.first_subdir_index, |d| d.next_index),
                next_index: resolve(dir.next_index, |d| d.next_index),
                previous_index: resolve(dir.previous_index, |d| d.previous_index),
                parent_index: resolve(dir.parent_index, |d| d.parent_index),
                dirname: dir.dirname.clone(),
            }
        })
        .collect();

    for (index, file) in files.iter_mut().enumerate() {
        file.directory_index = usize::try_from(file.directory_index)
            .ok()
            .and_then(|d| new_index.get(d).copied().flatten())
            .ok_or_else(|| {
                Error::CorruptArchive(format!(
                    "file {index} belongs to dropped directory {}",
                    file.directory_index
                ))
            })?;
    }

    Ok(remapped)
}

/// Rebuild a container.
///
/// `original` supplies unmodified payloads and the bytes around the tables;
/// `extract_dir` holds `metadata.json` and optionally `rebuilt-files/`.
pub fn build<P, Q, R>(
    original: P,
    extract_dir: Q,
    destination: R,
    options: &BuildOptions,
) -> Result<BuildReport>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    let original = original.as_ref();
    let extract_dir = extract_dir.as_ref();
    let destination = destination.as_ref();

    let snapshot = ArchiveMetadataSnapshot::load(extract_dir.join(METADATA_FILE_NAME))?;
    let endian = snapshot.endian();

    if destination.exists() {
        if !options.overwrite {
            return Err(Error::OutputExists(destination.to_path_buf()));
        }
        if fs::canonicalize(destination)? == fs::canonicalize(original)? {
            return Err(Error::InvalidFormat(format!(
                "destination {} is the original container",
                destination.display()
            )));
        }
    }

    let rebuilt = find_rebuilt(&snapshot, &extract_dir.join(REBUILT_DIR))?;
    let mut archive = BigArchive::open(original, endian, options.chunk_size)?;

    let result = File::create(destination)
        .map_err(Error::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            let report = write_container(&mut archive, &snapshot, &rebuilt, &mut writer)?;
            writer.flush()?;
            Ok(report)
        });
    archive.close();

    match result {
        Ok(report) => {
            info!(
                destination = %destination.display(),
                files = report.files_total,
                rebuilt = report.files_rebuilt,
                directories = report.directories_written,
                bytes = report.bytes_written,
                "build finished"
            );
            Ok(report)
        }
        Err(e) => {
            let _ = fs::remove_file(destination);
            Err(e)
        }
    }
}

/// Map each file under `rebuilt_root` to the file index it replaces.
fn find_rebuilt(
    snapshot: &ArchiveMetadataSnapshot,
    rebuilt_root: &Path,
) -> Result<HashMap<usize, PathBuf>> {
    let mut rebuilt = HashMap::new();
    if !rebuilt_root.is_dir() {
        debug!(path = %rebuilt_root.display(), "no rebuilt files");
        return Ok(rebuilt);
    }

    let tree = build_tree(&snapshot.directories, "")?;
    let by_path: HashMap<String, usize> = snapshot
        .files
        .iter()
        .enumerate()
        .filter_map(|(index, file)| {
            let dir = tree.get(usize::try_from(file.directory_index).ok()?)?;
            Some((format!("{}{}", dir.path, file.filename), index))
        })
        .collect();

    for entry in WalkDir::new(rebuilt_root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::Io(
                e.into_io_error()
                    .unwrap_or_else(|| io::Error::other("directory walk failed")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(rebuilt_root) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        match by_path.get(&key) {
            Some(&index) => {
                debug!(file = %key, index, "using rebuilt file");
                rebuilt.insert(index, entry.into_path());
            }
            None => warn!(file = %key, "rebuilt file matches nothing in the archive"),
        }
    }

    info!(count = rebuilt.len(), "found rebuilt files");
    Ok(rebuilt)
}

fn write_container<W: Write>(
    archive: &mut BigArchive,
    snapshot: &ArchiveMetadataSnapshot,
    rebuilt: &HashMap<usize, PathBuf>,
    out: &mut W,
) -> Result<BuildReport> {
    let endian = snapshot.endian();
    let header = &snapshot.header;
    let capacity = header.offset_table_max_length as usize;
    let mut files = snapshot.files.clone();

    if files.len() > capacity || files.len() > snapshot.offsets.len() {
        return Err(Error::InvalidFormat(format!(
            "{} files do not fit an offset table of {capacity}",
            files.len()
        )));
    }

    let mut sources = Vec::with_capacity(files.len());
    for (index, file) in files.iter_mut().enumerate() {
        match rebuilt.get(&index) {
            Some(path) => {
                let len = fs::metadata(path)?.len();
                file.file_size = u32::try_from(len).map_err(|_| {
                    Error::InvalidFormat(format!(
                        "rebuilt file {} is too large ({len} bytes)",
                        path.display()
                    ))
                })?;
                sources.push(Source::Rebuilt(path.clone()));
            }
            None => sources.push(Source::Original {
                payload_offset: snapshot.offsets[index].payload_offset(),
            }),
        }
    }

    let directories = if snapshot.include_empty_dirs {
        snapshot.directories.clone()
    } else {
        let kept = select_directories(&snapshot.directories, &files)?;
        if kept.len() < snapshot.directories.len() {
            info!(
                kept = kept.len(),
                dropped = snapshot.directories.len() - kept.len(),
                "dropping empty directories"
            );
        }
        remap_directories(&snapshot.directories, &mut files, &kept)?
    };
    if directories.len() > capacity {
        return Err(Error::InvalidFormat(format!(
            "{} directories do not fit a table of {capacity}",
            directories.len()
        )));
    }

    let tables_end = header.tables_end();
    let first_data = snapshot
        .offsets
        .first()
        .filter(|_| !files.is_empty())
        .map_or(tables_end, |o| u64::from(o.data_offset));
    if (header.offset_table_offset as usize) < HEADER_SIZE || first_data < tables_end {
        return Err(Error::CorruptArchive(format!(
            "tables [{}, {tables_end}) overlap the header or the data at {first_data}",
            header.offset_table_offset
        )));
    }

    let sizes: Vec<u32> = files.iter().map(|f| f.file_size).collect();
    let mut offsets = snapshot.offsets.clone();
    for (slot, offset) in offsets.iter_mut().zip(plan_offsets(first_data as u32, &sizes)?) {
        slot.data_offset = offset;
    }

    let mut raw_header = snapshot.raw_header_bytes()?;
    patch_counts(
        &mut raw_header,
        files.len() as u32,
        directories.len() as u32,
        endian,
    )?;

    let mut written = 0u64;
    out.write_all(&raw_header[..HEADER_SIZE])?;
    written += HEADER_SIZE as u64;
    written += copy_original(
        archive,
        HEADER_SIZE as u64,
        u64::from(header.offset_table_offset),
        out,
    )?;

    for table in [
        encode_entries(&offsets, capacity, endian)?,
        encode_entries(&files, capacity, endian)?,
        encode_entries(&directories, capacity, endian)?,
    ] {
        out.write_all(&table)?;
        written += table.len() as u64;
    }
    written += copy_original(archive, tables_end, first_data, out)?;

    let mut report = BuildReport {
        files_total: files.len(),
        directories_written: directories.len(),
        ..Default::default()
    };
    for (index, (file, source)) in files.iter().zip(&sources).enumerate() {
        out.write_all(&endian.u32_bytes(file.file_size))?;
        let size = u64::from(file.file_size);
        let copied = match source {
            Source::Rebuilt(path) => {
                report.files_rebuilt += 1;
                io::copy(&mut File::open(path)?.take(size), out)?
            }
            Source::Original { payload_offset } => {
                report.files_copied += 1;
                archive.copy_range_to(*payload_offset, size, out)?
            }
        };
        if copied != size {
            return Err(Error::CorruptArchive(format!(
                "file {index} ({}) supplied {copied} of {size} bytes",
                file.filename
            )));
        }
        written += 4 + size;
    }

    report.bytes_written = written;
    Ok(report)
}

/// Copy original bytes in `[start, end)` verbatim.
fn copy_original<W: Write>(
    archive: &mut BigArchive,
    start: u64,
    end: u64,
    out: &mut W,
) -> Result<u64> {
    if end <= start {
        return Ok(0);
    }
    let copied = archive.copy_range_to(start, end - start, out)?;
    if copied != end - start {
        return Err(Error::CorruptArchive(format!(
            "original container ends inside [{start}, {end})"
        )));
    }
    Ok(copied)
}
