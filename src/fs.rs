//! Filesystem helpers used when adding files and directories

use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn exists(path: &Path) -> bool {
    path.exists()
}

pub fn is_file(path: &Path) -> bool {
    path.is_file()
}

pub fn is_dir(path: &Path) -> bool {
    path.is_dir()
}

/// Remove a file, or a directory with its content
pub fn remove(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Last component of `path`, lossily converted
pub fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Regular files under `root`, sorted by path
///
/// Only direct children are listed unless `recurse` is set. Entries that
/// cannot be read are skipped with a warning.
pub fn files_in_dir(root: &Path, recurse: bool) -> Vec<PathBuf> {
    let max_depth = if recurse { usize::MAX } else { 1 };

    WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("skipping unreadable entry under '{}': {}", root.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// Archive name of `file` relative to `root`, with `/` separators
pub fn relative_name(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_files_in_dir_recursion() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.txt"), b"b").unwrap();

        let all: Vec<_> = files_in_dir(dir.path(), true)
            .iter()
            .map(|p| relative_name(dir.path(), p))
            .collect();
        assert_eq!(all, ["a.txt", "sub/b.txt"]);

        let top: Vec<_> = files_in_dir(dir.path(), false)
            .iter()
            .map(|p| relative_name(dir.path(), p))
            .collect();
        assert_eq!(top, ["a.txt"]);
    }

    #[test]
    fn test_file_name_and_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.zip");
        std::fs::write(&path, b"x").unwrap();
        assert!(exists(&path) && is_file(&path) && !is_dir(&path));
        assert_eq!(file_name(&path).as_deref(), Some("gone.zip"));

        remove(&path).unwrap();
        assert!(!exists(&path));
    }
}
