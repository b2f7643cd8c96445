//! Path normalization utilities.
//!
//! Registry keys, watched directories and notify event paths must agree
//! byte for byte, so every path entering the engine goes through
//! `normalize_path` first.

use std::path::{Component, Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Canonical parent joined with the file name (file not created yet)
/// - Lexically cleaned absolute path otherwise
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };
    let absolute = clean(&absolute);

    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map_or_else(|_| absolute.clone(), |p| p.join(name)),
        _ => absolute,
    }
}

/// Drop `.` and resolve `..` without touching the filesystem.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Directory that has to be watched to observe `file`.
pub fn watch_dir_of(file: &Path) -> PathBuf {
    file.parent()
        .map_or_else(|| file.to_path_buf(), Path::to_path_buf)
}
