//! Graphical toolkit seam.
//!
//! The engine never sees a concrete toolkit. Windows, scenes and nodes are
//! all `StyleOwner`s: something that carries an ordered list of stylesheet
//! identifiers, may have children, and can re-apply a stylesheet.
//!
//! ```text
//! WindowSource ──► Window ──► Scene ──► Node ──► Node ...
//!                    │          │         │
//!                    └──────────┴─────────┴── stylesheets(): ["app.css", ...]
//! ```
//!
//! Every owner embeds a [`Lifeline`]; dropping the owner is how the engine
//! learns it is gone.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub use crate::liveness::Lifeline;

/// Identity of one graphical owner, stable for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    Window,
    Scene,
    Node,
}

/// A graphical object carrying stylesheets.
pub trait StyleOwner: Send + Sync {
    /// Liveness handle embedded in the owner.
    fn lifeline(&self) -> &Lifeline;

    fn kind(&self) -> OwnerKind;

    /// Current stylesheet identifiers, in application order.
    fn stylesheets(&self) -> Vec<String>;

    /// Direct children (a window's scene, a scene's root node, ...).
    fn children(&self) -> Vec<Arc<dyn StyleOwner>>;

    /// Re-apply a stylesheet whose source changed on disk.
    ///
    /// Always invoked through the configured [`UiExecutor`], never directly
    /// from a watch worker.
    ///
    /// [`UiExecutor`]: crate::dispatch::UiExecutor
    fn apply_stylesheet(&self, sheet: &Stylesheet) -> anyhow::Result<()>;

    /// Register for structural change notifications on this owner.
    fn observe(&self, observer: Weak<dyn OwnerObserver>);

    fn id(&self) -> OwnerId {
        self.lifeline().id()
    }
}

/// Receiver of toolkit change notifications.
pub trait OwnerObserver: Send + Sync {
    /// The stylesheet list of `owner` was mutated.
    fn stylesheets_changed(&self, owner: OwnerId);

    /// `owner` (and its subtree) entered the monitored scope: a new window,
    /// a scene set on a window, a child added to a node.
    fn owner_attached(&self, owner: Arc<dyn StyleOwner>);

    /// `owner` (and its subtree) left the monitored scope.
    fn owner_detached(&self, owner: Arc<dyn StyleOwner>);
}

/// The set of top-level windows of an application, current and future.
pub trait WindowSource: Send + Sync {
    fn windows(&self) -> Vec<Arc<dyn StyleOwner>>;

    /// Future windows are reported through `owner_attached`.
    fn observe(&self, observer: Weak<dyn OwnerObserver>);
}

/// Fresh content of a stylesheet, handed to [`StyleOwner::apply_stylesheet`].
#[derive(Debug, Clone)]
pub struct Stylesheet {
    /// Identifier as it appears in the owner's stylesheet list.
    pub source: String,
    /// Source file on disk.
    pub path: PathBuf,
    /// `file://` URI of `path`.
    pub uri: String,
    pub content: Arc<str>,
}

impl Stylesheet {
    pub fn new(source: impl Into<String>, path: &Path, content: Arc<str>) -> Self {
        let uri = url::Url::from_file_path(path)
            .map_or_else(|()| format!("file://{}", path.display()), |u| u.to_string());
        Self {
            source: source.into(),
            path: path.to_path_buf(),
            uri,
            content,
        }
    }
}
