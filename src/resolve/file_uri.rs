use std::path::PathBuf;

use super::layout::is_build_output;
use super::{Identifier, PathResolver};

/// Resolves `file:` URIs and absolute paths that already point at an
/// editable file.
///
/// Files inside a build output tree are skipped: they are overwritten by the
/// build, not edited, and the layout strategies handle them.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileUriResolver;

impl PathResolver for FileUriResolver {
    fn resolve(&self, identifier: &str) -> Option<PathBuf> {
        match Identifier::parse(identifier) {
            Identifier::File(path) if path.is_file() && !is_build_output(&path) => Some(path),
            _ => None,
        }
    }
}
