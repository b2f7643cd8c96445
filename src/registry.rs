//! Watch registry: one entry per physical file.
//!
//! Many owners may use the same stylesheet (every window of an application
//! loading `app.css`). The registry collapses them onto a single
//! [`WatchEntry`], attaches one filesystem watch when the first subscriber
//! arrives, and detaches it when the last one leaves.
//!
//! All mutations happen under one mutex. Attach/detach are issued while it
//! is held, so a subscribe racing an unsubscribe for the same path can never
//! leave a watch behind or lose one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::owner::{OwnerId, StyleOwner};

// =============================================================================
// Types
// =============================================================================

/// Identity of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(u64);

impl RefId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// One stylesheet identifier as used by one owner.
///
/// Holds the owner weakly: a subscription never keeps a window alive.
#[derive(Clone)]
pub struct Subscriber {
    pub id: RefId,
    pub source: String,
    pub path: PathBuf,
    pub owner_id: OwnerId,
    owner: Weak<dyn StyleOwner>,
}

impl Subscriber {
    pub fn new(source: impl Into<String>, path: PathBuf, owner: &Arc<dyn StyleOwner>) -> Self {
        Self {
            id: RefId::next(),
            source: source.into(),
            path,
            owner_id: owner.id(),
            owner: Arc::downgrade(owner),
        }
    }

    /// The owner, if it has not been dropped yet.
    pub fn owner(&self) -> Option<Arc<dyn StyleOwner>> {
        self.owner.upgrade()
    }

    pub(crate) fn owner_weak(&self) -> Weak<dyn StyleOwner> {
        Weak::clone(&self.owner)
    }

    pub fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("path", &self.path)
            .field("owner_id", &self.owner_id)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Per-path record.
#[derive(Debug)]
pub struct WatchEntry {
    pub path: PathBuf,
    pub subscribers: Vec<Subscriber>,
    pub last_modified: Option<SystemTime>,
}

/// Outcome of [`WatchRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscribed {
    /// First subscriber: a filesystem watch was attached.
    NewWatch,
    /// Joined an existing entry, now with this many subscribers.
    Joined(usize),
    /// This exact subscription was already registered.
    Duplicate,
}

/// Outcome of [`WatchRegistry::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsubscribed {
    /// Subscribers remain on the entry.
    Remaining(usize),
    /// Last subscriber left: the entry and its watch are gone.
    Cancelled,
    NotFound,
}

/// Filesystem side of the registry.
pub trait PathWatch: Send + Sync {
    fn attach(&self, file: &Path);
    fn detach(&self, file: &Path);
}

// =============================================================================
// Registry
// =============================================================================

pub struct WatchRegistry {
    entries: Mutex<FxHashMap<PathBuf, WatchEntry>>,
    watch: Arc<dyn PathWatch>,
}

impl WatchRegistry {
    pub fn new(watch: Arc<dyn PathWatch>) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            watch,
        }
    }

    pub fn subscribe(&self, subscriber: Subscriber) -> Subscribed {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(&subscriber.path) {
            if entry.subscribers.iter().any(|s| s.id == subscriber.id) {
                return Subscribed::Duplicate;
            }
            entry.subscribers.push(subscriber);
            return Subscribed::Joined(entry.subscribers.len());
        }

        let path = subscriber.path.clone();
        crate::debug!("registry"; "watching {}", path.display());
        self.watch.attach(&path);
        entries.insert(
            path.clone(),
            WatchEntry {
                path,
                subscribers: vec![subscriber],
                last_modified: None,
            },
        );
        Subscribed::NewWatch
    }

    pub fn unsubscribe(&self, path: &Path, id: RefId) -> Unsubscribed {
        let mut entries = self.entries.lock();

        let Some(entry) = entries.get_mut(path) else {
            return Unsubscribed::NotFound;
        };
        let before = entry.subscribers.len();
        entry.subscribers.retain(|s| s.id != id);
        if entry.subscribers.len() == before {
            return Unsubscribed::NotFound;
        }
        if !entry.subscribers.is_empty() {
            return Unsubscribed::Remaining(entry.subscribers.len());
        }

        entries.remove(path);
        self.watch.detach(path);
        crate::debug!("registry"; "stopped watching {}", path.display());
        Unsubscribed::Cancelled
    }

    /// Drop subscribers whose owner is gone. Returns how many were removed.
    pub fn prune(&self, path: &Path, ids: &[RefId]) -> usize {
        ids.iter()
            .filter(|id| self.unsubscribe(path, **id) != Unsubscribed::NotFound)
            .count()
    }

    /// Copy of the current subscribers of `path`.
    pub fn snapshot(&self, path: &Path) -> Option<Vec<Subscriber>> {
        self.entries
            .lock()
            .get(path)
            .map(|entry| entry.subscribers.clone())
    }

    pub fn record_modified(&self, path: &Path, at: SystemTime) {
        if let Some(entry) = self.entries.lock().get_mut(path) {
            entry.last_modified = Some(at);
        }
    }

    pub fn last_modified(&self, path: &Path) -> Option<SystemTime> {
        self.entries.lock().get(path).and_then(|e| e.last_modified)
    }

    pub fn subscriber_count(&self, path: &Path) -> usize {
        self.entries
            .lock()
            .get(path)
            .map_or(0, |entry| entry.subscribers.len())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.lock().contains_key(path)
    }

    /// Watched paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.entries.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove every entry, detaching every watch.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        for path in entries.keys() {
            self.watch.detach(path);
        }
        entries.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
