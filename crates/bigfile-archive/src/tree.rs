//! Directory tree reconstruction from parent-linked directory records.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tables::{DirectoryMetadataEntry, FileMetadataEntry, NO_INDEX};
use crate::{Error, Result};

/// A directory with its full path and the files it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructedDirectory {
    pub name: String,
    /// `/`-separated path with a trailing `/`, starting at the tree root.
    pub path: String,
    pub file_indexes: Vec<usize>,
}

/// Resolve the full path of every directory.
///
/// Roots (`parentIndex == -1`) map to `root`; every other directory is its
/// parent's path plus its own name. Parents may appear after their
/// children in the table. A parent index out of range or a parent cycle is
/// a [`Error::CorruptArchive`].
pub fn build_tree(
    directories: &[DirectoryMetadataEntry],
    root: &str,
) -> Result<Vec<ReconstructedDirectory>> {
    let count = directories.len();
    let root_path = root_path(root);
    let mut paths: Vec<Option<String>> = vec![None; count];
    let mut visiting = vec![false; count];

    for start in 0..count {
        if paths[start].is_some() {
            continue;
        }

        // Walk up until a root or an already resolved ancestor.
        let mut chain = Vec::new();
        let mut current = start;
        let mut base = root_path.clone();
        loop {
            if let Some(path) = &paths[current] {
                base = path.clone();
                break;
            }
            if visiting[current] {
                return Err(Error::CorruptArchive(format!(
                    "directory {start} has a parent cycle through directory {current}"
                )));
            }
            visiting[current] = true;
            chain.push(current);

            let parent = directories[current].parent_index;
            if parent == NO_INDEX {
                break;
            }
            current = parent_slot(parent, current, count)?;
        }

        for &index in chain.iter().rev() {
            let dir = &directories[index];
            let path = if dir.is_root() {
                root_path.clone()
            } else {
                validate_name(&dir.dirname, "directory", index)?;
                format!("{base}{}/", dir.dirname)
            };
            base = path.clone();
            paths[index] = Some(path);
        }
    }

    let tree = directories
        .iter()
        .zip(paths)
        .map(|(dir, path)| ReconstructedDirectory {
            name: dir.dirname.clone(),
            path: path.unwrap_or_default(),
            file_indexes: Vec::new(),
        })
        .collect::<Vec<_>>();
    debug!(directories = tree.len(), "built directory tree");
    Ok(tree)
}

/// Append every file's index to its owning directory.
pub fn link_files(
    tree: &mut [ReconstructedDirectory],
    files: &[FileMetadataEntry],
) -> Result<()> {
    let count = tree.len();
    for (index, file) in files.iter().enumerate() {
        let dir = usize::try_from(file.directory_index)
            .ok()
            .and_then(|d| tree.get_mut(d))
            .ok_or_else(|| {
                Error::CorruptArchive(format!(
                    "file {index} ({}) references directory {} of {}",
                    file.filename,
                    file.directory_index,
                    count
                ))
            })?;
        dir.file_indexes.push(index);
    }
    Ok(())
}

/// Reject names that would escape their parent directory on disk.
pub(crate) fn validate_name(name: &str, kind: &str, index: usize) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::CorruptArchive(format!(
            "{kind} {index} has unsafe name {name:?}"
        )));
    }
    Ok(())
}

fn root_path(root: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        String::new()
    } else {
        format!("{root}/")
    }
}

fn parent_slot(parent: i32, child: usize, count: usize) -> Result<usize> {
    usize::try_from(parent)
        .ok()
        .filter(|&p| p < count)
        .ok_or_else(|| {
            Error::CorruptArchive(format!(
                "directory {child} references parent {parent} of {count}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(name: &str, parent: i32) -> DirectoryMetadataEntry {
        DirectoryMetadataEntry {
            first_file_index: NO_INDEX,
            first_subdir_index: NO_INDEX,
            next_index: NO_INDEX,
            previous_index: NO_INDEX,
            parent_index: parent,
            dirname: name.to_string(),
        }
    }

    fn file(name: &str, directory: i32) -> FileMetadataEntry {
        FileMetadataEntry {
            directory_index: directory,
            filename: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_nested_paths() {
        let dirs = [dir("root", -1), dir("Bin", 0), dir("Sound", 1)];
        let tree = build_tree(&dirs, "root").unwrap();

        assert_eq!(tree[0].path, "root/");
        assert_eq!(tree[1].path, "root/Bin/");
        assert_eq!(tree[2].path, "root/Bin/Sound/");
        assert_eq!(tree[2].name, "Sound");
    }

    #[test]
    fn test_empty_root_prefix() {
        let dirs = [dir("ROOT", -1), dir("Maps", 0)];
        let tree = build_tree(&dirs, "").unwrap();

        assert_eq!(tree[0].path, "");
        assert_eq!(tree[1].path, "Maps/");
    }

    #[test]
    fn test_out_of_order_parents() {
        // Children listed before their parents.
        let dirs = [dir("Sound", 2), dir("root", -1), dir("Bin", 1), dir("Music", 0)];
        let tree = build_tree(&dirs, "out/").unwrap();

        assert_eq!(tree[0].path, "out/Bin/Sound/");
        assert_eq!(tree[1].path, "out/");
        assert_eq!(tree[2].path, "out/Bin/");
        assert_eq!(tree[3].path, "out/Bin/Sound/Music/");
    }

    #[test]
    fn test_parent_out_of_range() {
        let dirs = [dir("root", -1), dir("Bin", 7)];
        assert!(matches!(build_tree(&dirs, "r"), Err(Error::CorruptArchive(_))));

        let dirs = [dir("root", -1), dir("Bin", -3)];
        assert!(matches!(build_tree(&dirs, "r"), Err(Error::CorruptArchive(_))));
    }

    #[test]
    fn test_parent_cycle() {
        let dirs = [dir("root", -1), dir("a", 2), dir("b", 1)];
        assert!(matches!(build_tree(&dirs, "r"), Err(Error::CorruptArchive(_))));
    }

    #[test]
    fn test_unsafe_names() {
        let dirs = [dir("root", -1), dir("..", 0)];
        assert!(matches!(build_tree(&dirs, "r"), Err(Error::CorruptArchive(_))));

        let dirs = [dir("root", -1), dir("a/b", 0)];
        assert!(build_tree(&dirs, "r").is_err());
    }

    #[test]
    fn test_empty_dirname_is_not_merged_into_parent() {
        let dirs = [dir("root", -1), dir("", 0)];
        assert!(matches!(build_tree(&dirs, "r"), Err(Error::CorruptArchive(_))));

        // An unnamed root is fine: its name never reaches a path.
        let tree = build_tree(&[dir("", -1), dir("Bin", 0)], "r").unwrap();
        assert_eq!(tree[1].path, "r/Bin/");
    }

    #[test]
    fn test_link_files() {
        let dirs = [dir("root", -1), dir("Bin", 0)];
        let mut tree = build_tree(&dirs, "root").unwrap();
        let files = [file("a", 1), file("b", 0), file("c", 1)];

        link_files(&mut tree, &files).unwrap();
        assert_eq!(tree[0].file_indexes, vec![1]);
        assert_eq!(tree[1].file_indexes, vec![0, 2]);
    }

    #[test]
    fn test_link_files_bad_directory() {
        let mut tree = build_tree(&[dir("root", -1)], "root").unwrap();

        let err = link_files(&mut tree, &[file("a", 3)]).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
        assert!(link_files(&mut tree, &[file("a", -1)]).is_err());
    }
}
