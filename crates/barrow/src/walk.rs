//! Source tree enumeration.

use std::path::Path;

use walkdir::WalkDir;

/// Invoke `on_file` for every regular file reachable from `path`.
///
/// A path naming a regular file yields exactly that file. Directories are
/// traversed recursively; non-regular entries (including symlinks to
/// directories, which are not followed) and unreadable subtrees are skipped.
pub fn enumerate_files<F>(path: &Path, mut on_file: F)
where
    F: FnMut(&Path),
{
    if path.is_file() {
        on_file(path);
        return;
    }
    if !path.is_dir() {
        return;
    }

    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            on_file(entry.path());
        }
    }
}
