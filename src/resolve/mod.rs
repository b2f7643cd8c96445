//! Stylesheet identifier → source file resolution.
//!
//! A running application refers to its stylesheets through identifiers
//! (`file:` URIs into build output, bare resource names, ...). Editing
//! happens on the *source* copy, so each identifier is mapped back to the
//! file a developer actually saves:
//!
//! ```text
//! file:///proj/target/classes/app.css ──► MavenLayout ──► /proj/src/main/resources/app.css
//! ```
//!
//! Strategies are tried in order and the first hit wins. An identifier no
//! strategy understands is simply not watched.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use url::Url;

use crate::path::normalize_path;

// Build-tool layouts (Maven, Gradle).
mod layout;
// Direct `file:` references.
mod file_uri;


pub use file_uri::FileUriResolver;
pub use layout::BuildLayout;

// =============================================================================
// Strategy trait
// =============================================================================

/// A single identifier → path strategy.
///
/// Implementations must not have side effects: resolution is re-run every
/// time an owner's stylesheet list changes.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, identifier: &str) -> Option<PathBuf>;
}

impl<F> PathResolver for F
where
    F: Fn(&str) -> Option<PathBuf> + Send + Sync,
{
    fn resolve(&self, identifier: &str) -> Option<PathBuf> {
        self(identifier)
    }
}

/// Built-in strategies, selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolverKind {
    Maven,
    Gradle,
    FileUri,
}

impl ResolverKind {
    /// Default chain order.
    pub const DEFAULTS: [ResolverKind; 3] =
        [ResolverKind::Maven, ResolverKind::Gradle, ResolverKind::FileUri];

    /// Instantiate the strategy for a project rooted at `root`.
    pub fn build(self, root: &Path) -> Arc<dyn PathResolver> {
        match self {
            ResolverKind::Maven => Arc::new(BuildLayout::maven(root)),
            ResolverKind::Gradle => Arc::new(BuildLayout::gradle(root)),
            ResolverKind::FileUri => Arc::new(FileUriResolver),
        }
    }
}

// =============================================================================
// Chain
// =============================================================================

/// Ordered, duplicate-free list of strategies.
#[derive(Clone, Default)]
pub struct ResolverChain {
    strategies: Vec<Arc<dyn PathResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain made of `kinds`, in order, for a project rooted at `root`.
    ///
    /// A kind listed twice keeps its first position.
    pub fn from_kinds(kinds: impl IntoIterator<Item = ResolverKind>, root: &Path) -> Self {
        let mut seen = FxHashSet::default();
        let mut chain = Self::new();
        for kind in kinds {
            if seen.insert(kind) {
                chain.push(kind.build(root));
            }
        }
        chain
    }

    /// Append a strategy. Returns `false` if this exact instance is
    /// already part of the chain.
    pub fn push(&mut self, strategy: Arc<dyn PathResolver>) -> bool {
        if self.contains(&strategy) {
            return false;
        }
        self.strategies.push(strategy);
        true
    }

    /// Append every strategy of `other`, skipping duplicates.
    pub fn extend(&mut self, other: &ResolverChain) {
        for strategy in &other.strategies {
            self.push(Arc::clone(strategy));
        }
    }

    pub fn contains(&self, strategy: &Arc<dyn PathResolver>) -> bool {
        self.strategies
            .iter()
            .any(|s| std::ptr::addr_eq(Arc::as_ptr(s), Arc::as_ptr(strategy)))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Resolve `identifier` to a normalized absolute path.
    ///
    /// The first strategy returning `Some` wins; later strategies are not
    /// consulted.
    pub fn resolve(&self, identifier: &str) -> Option<PathBuf> {
        let found = self
            .strategies
            .iter()
            .find_map(|strategy| strategy.resolve(identifier));

        match found {
            Some(path) => {
                let path = normalize_path(&path);
                crate::debug!("resolve"; "{} -> {}", identifier, path.display());
                Some(path)
            }
            None => {
                crate::debug!("resolve"; "no source file for {}", identifier);
                None
            }
        }
    }
}

impl fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverChain")
            .field("strategies", &self.strategies.len())
            .finish()
    }
}

// =============================================================================
// Identifier parsing
// =============================================================================

/// Shape of a stylesheet identifier, as far as resolution cares.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Identifier {
    /// `file:` URI or absolute path.
    File(PathBuf),
    /// Bare resource name such as `styles/app.css`.
    Relative(PathBuf),
    /// Any other scheme (`jar:`, `http:`, `data:`, ...).
    Opaque,
}

impl Identifier {
    pub(crate) fn parse(identifier: &str) -> Self {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Identifier::Opaque;
        }

        let path = Path::new(identifier);
        if path.is_absolute() {
            return Identifier::File(path.to_path_buf());
        }

        match Url::parse(identifier) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_or(Identifier::Opaque, Identifier::File),
            Ok(_) => Identifier::Opaque,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Identifier::Relative(identifier.trim_start_matches("./").into())
            }
            Err(_) => Identifier::Opaque,
        }
    }
}
