//! Monitor controller - wires the engine to a live owner tree.
//!
//! # Responsibility
//!
//! - Walk the configured scope once at start and subscribe every resolved
//!   stylesheet
//! - Follow structural changes pushed by the toolkit (new windows, added
//!   or removed children, edited stylesheet lists)
//! - Release an owner's subscriptions when the owner is dropped
//! - Own the background workers and tear them down on stop
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────── owner_attached / stylesheets_changed ◄── toolkit
//!                 ▼
//! ResolverChain ─► Session ──subscribe──► WatchRegistry ──attach──► FileWatchLoop
//!                   │  ▲                        ▲                        │
//!             track │  └── owner_reclaimed ──┐  └──── ReloadDispatcher ◄─┘
//!                   ▼                        │              │
//!            LivenessTracker ────────────────┘          UiExecutor
//! ```
//!
//! # Locking
//!
//! Lock order is session → registry → watch set. Collaborator methods
//! (`stylesheets`, `children`, `observe`) are never called while the
//! session lock is held: a toolkit may notify synchronously from inside
//! them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::dispatch::{ReloadDispatcher, UiExecutor};
use crate::error::Result;
use crate::liveness::{LivenessTracker, TrackId};
use crate::owner::{OwnerId, OwnerObserver, StyleOwner};
use crate::path::normalize_path;
use crate::registry::{PathWatch, Subscriber, WatchRegistry};
use crate::resolve::ResolverChain;
use crate::watch::{FileWatchLoop, WatchHandle};

mod builder;

#[cfg(test)]
mod tests;

pub use builder::{MonitorBuilder, Scope, StopHandle};

/// Lifecycle of a [`MonitorController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Created,
    Running,
    /// Terminal.
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MonitorState::Created => "created",
            MonitorState::Running => "running",
            MonitorState::Stopped => "stopped",
        })
    }
}

// =============================================================================
// Session state
// =============================================================================

/// Background machinery, alive only while running.
struct Runtime {
    registry: Arc<WatchRegistry>,
    watch: FileWatchLoop,
    watch_handle: WatchHandle,
    dispatcher: Arc<ReloadDispatcher>,
    tracker: LivenessTracker,
}

/// What the controller knows about one monitored owner.
struct OwnerRecord {
    owner: Weak<dyn StyleOwner>,
    /// Current subscriptions, in stylesheet order.
    refs: Vec<Subscriber>,
    track: TrackId,
    /// Registered with the owner. Dropped with the record, which silences
    /// the owner once it leaves the scope.
    _observer: Arc<dyn OwnerObserver>,
}

struct Session {
    state: MonitorState,
    /// Consumed by `start`.
    scope: Option<Scope>,
    runtime: Option<Runtime>,
    owners: FxHashMap<OwnerId, OwnerRecord>,
}

struct Inner {
    me: Weak<Inner>,
    chain: ResolverChain,
    executor: Arc<dyn UiExecutor>,
    session: Mutex<Session>,
}

// =============================================================================
// Controller
// =============================================================================

/// Handle to one monitoring session. Cheap to clone.
///
/// Created by [`MonitorBuilder`]; the session runs from [`start`] until
/// [`stop`], independently of how many handles exist.
///
/// [`start`]: Self::start
/// [`stop`]: Self::stop
#[derive(Clone)]
pub struct MonitorController {
    inner: Arc<Inner>,
}

impl MonitorController {
    pub(crate) fn new(
        scope: Option<Scope>,
        chain: ResolverChain,
        executor: Arc<dyn UiExecutor>,
    ) -> Self {
        let inner = Arc::new_cyclic(|me| Inner {
            me: Weak::clone(me),
            chain,
            executor,
            session: Mutex::new(Session {
                state: MonitorState::Created,
                scope,
                runtime: None,
                owners: FxHashMap::default(),
            }),
        });
        Self { inner }
    }

    /// `Created → Running`: start the workers and subscribe the scope.
    ///
    /// A no-op in any other state.
    pub fn start(&self) -> Result<()> {
        let scope = {
            let mut session = self.inner.session.lock();
            if session.state != MonitorState::Created {
                crate::debug!("monitor"; "start ignored: already {}", session.state);
                return Ok(());
            }
            session.runtime = Some(self.inner.start_runtime()?);
            session.state = MonitorState::Running;
            session.scope.take()
        };

        match scope {
            Some(Scope::AllWindows(source)) => {
                source.observe(self.inner.observer());
                for window in source.windows() {
                    self.inner.discover(window);
                }
            }
            Some(Scope::Window(root) | Scope::Scene(root) | Scope::Node(root)) => {
                self.inner.discover(root);
            }
            None => crate::warn!("monitor"; "started without a scope: nothing to monitor"),
        }

        crate::info!(
            "monitor";
            "monitoring {} stylesheet(s) in {} owner(s)",
            self.watched_paths().len(), self.owner_count()
        );
        Ok(())
    }

    /// `→ Stopped`: cancel every watch and stop both workers.
    ///
    /// Idempotent. Reclamation notices queued before the call still run.
    pub fn stop(&self) {
        let runtime = {
            let mut session = self.inner.session.lock();
            if session.state == MonitorState::Stopped {
                return;
            }
            session.state = MonitorState::Stopped;
            session.scope = None;
            session.owners.clear();
            session.runtime.take()
        };

        // Workers may be waiting on the session lock: shut them down only
        // after releasing it.
        let Some(runtime) = runtime else {
            crate::debug!("monitor"; "stopped before start");
            return;
        };
        let watched = runtime.registry.len();
        runtime.registry.clear();
        runtime.watch.shutdown();
        runtime.tracker.shutdown();
        crate::info!("monitor"; "stopped, released {} watch(es)", watched);
    }

    pub fn state(&self) -> MonitorState {
        self.inner.session.lock().state
    }

    /// Every watched source file, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.inner
            .with_runtime(|rt| rt.registry.paths())
            .unwrap_or_default()
    }

    /// Live subscriptions to `path`.
    pub fn subscriber_count(&self, path: &Path) -> usize {
        let path = normalize_path(path);
        self.inner
            .with_runtime(|rt| rt.registry.subscriber_count(&path))
            .unwrap_or(0)
    }

    /// Whether the directory of `path` currently has a filesystem watch.
    pub fn is_watch_attached(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        self.inner
            .with_runtime(|rt| rt.watch_handle.is_attached(&path))
            .unwrap_or(false)
    }

    /// Number of live directory watches.
    pub fn attached_watch_count(&self) -> usize {
        self.inner
            .with_runtime(|rt| rt.watch_handle.attached_count())
            .unwrap_or(0)
    }

    /// Owners currently monitored.
    pub fn owner_count(&self) -> usize {
        self.inner.session.lock().owners.len()
    }
}

impl fmt::Debug for MonitorController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorController")
            .field("state", &self.state())
            .field("chain", &self.inner.chain)
            .finish()
    }
}

// =============================================================================
// Engine
// =============================================================================

impl Inner {
    fn observer(&self) -> Weak<dyn OwnerObserver> {
        self.me.clone()
    }

    fn with_runtime<T>(&self, f: impl FnOnce(&Runtime) -> T) -> Option<T> {
        self.session.lock().runtime.as_ref().map(f)
    }

    fn start_runtime(&self) -> Result<Runtime> {
        // The watch worker keeps the session alive until `stop`.
        let on_change_target = self.me.upgrade();
        let watch = FileWatchLoop::start(move |path| {
            if let Some(inner) = &on_change_target {
                inner.on_path_modified(&path);
            }
        })?;
        let watch_handle = watch.handle();
        let registry = Arc::new(WatchRegistry::new(
            Arc::new(watch_handle.clone()) as Arc<dyn PathWatch>
        ));
        let dispatcher = Arc::new(ReloadDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&self.executor),
        ));
        let tracker = LivenessTracker::start()?;

        Ok(Runtime {
            registry,
            watch,
            watch_handle,
            dispatcher,
            tracker,
        })
    }

    fn on_path_modified(&self, path: &Path) {
        let Some(dispatcher) = self.with_runtime(|rt| Arc::clone(&rt.dispatcher)) else {
            return;
        };
        dispatcher.on_path_modified(path);
    }

    /// Subscribe `root` and its whole subtree.
    fn discover(&self, root: Arc<dyn StyleOwner>) {
        let mut stack = vec![root];
        while let Some(owner) = stack.pop() {
            stack.extend(owner.children().into_iter().rev());
            self.attach_owner(&owner);
        }
    }

    /// Subscribe `owner`, or re-sync it if already monitored.
    ///
    /// The list is re-read after each sync until it is stable, so a
    /// concurrent edit that synced first is never overwritten by an older
    /// list.
    fn attach_owner(&self, owner: &Arc<dyn StyleOwner>) {
        let id = owner.id();
        let mut sheets = owner.stylesheets();
        let mut first = true;

        loop {
            let resolved = self.resolve_all(&sheets);
            let observer = {
                let mut session = self.session.lock();
                let Session {
                    state,
                    runtime,
                    owners,
                    ..
                } = &mut *session;
                let (MonitorState::Running, Some(runtime)) = (*state, runtime.as_ref()) else {
                    return;
                };
                // Released since the last pass: stay released.
                if !first && !owners.contains_key(&id) {
                    return;
                }

                let mut observer = None;
                let record = owners.entry(id).or_insert_with(|| {
                    let scoped: Arc<dyn OwnerObserver> = Arc::new(ScopedObserver {
                        owner: id,
                        inner: self.me.clone(),
                    });
                    observer = Some(Arc::downgrade(&scoped));
                    self.new_record(owner, runtime, scoped)
                });
                sync_refs(record, owner, resolved, &runtime.registry);
                observer
            };

            if let Some(observer) = observer {
                owner.observe(observer);
            }

            let current = owner.stylesheets();
            if current == sheets {
                return;
            }
            crate::debug!("monitor"; "owner {} stylesheets changed during sync", id);
            sheets = current;
            first = false;
        }
    }

    fn new_record(
        &self,
        owner: &Arc<dyn StyleOwner>,
        runtime: &Runtime,
        observer: Arc<dyn OwnerObserver>,
    ) -> OwnerRecord {
        let id = owner.id();
        let weak = self.me.clone();
        let track = runtime.tracker.track(owner.lifeline(), move || {
            if let Some(inner) = weak.upgrade() {
                inner.owner_reclaimed(id);
            }
        });
        crate::debug!("monitor"; "{:?} {} attached", owner.kind(), id);
        OwnerRecord {
            owner: Arc::downgrade(owner),
            refs: Vec::new(),
            track,
            _observer: observer,
        }
    }

    fn is_monitored(&self, id: OwnerId) -> bool {
        self.session.lock().owners.contains_key(&id)
    }

    /// Release `root` and its whole subtree.
    fn detach_subtree(&self, root: Arc<dyn StyleOwner>) {
        let mut stack = vec![root];
        while let Some(owner) = stack.pop() {
            stack.extend(owner.children());
            self.release_owner(owner.id(), true);
        }
    }

    fn owner_reclaimed(&self, id: OwnerId) {
        crate::debug!("monitor"; "owner {} reclaimed", id);
        self.release_owner(id, false);
    }

    /// Drop every subscription of `id`.
    fn release_owner(&self, id: OwnerId, untrack: bool) {
        let mut session = self.session.lock();
        let session = &mut *session;
        let Some(record) = session.owners.remove(&id) else {
            return;
        };
        let Some(runtime) = session.runtime.as_ref() else {
            return;
        };
        if untrack {
            runtime.tracker.untrack(record.track);
        }
        for sub in &record.refs {
            runtime.registry.unsubscribe(&sub.path, sub.id);
        }
    }

    fn resolve_all(&self, identifiers: &[String]) -> Vec<(String, PathBuf)> {
        identifiers
            .iter()
            .filter_map(|source| {
                let path = self.chain.resolve(source)?;
                Some((source.clone(), path))
            })
            .collect()
    }
}

/// Bring `record.refs` in line with `resolved`.
///
/// Unchanged `(identifier, path)` pairs keep their subscription. New ones
/// are subscribed before stale ones are released, so a path present on
/// both sides never loses its watch.
fn sync_refs(
    record: &mut OwnerRecord,
    owner: &Arc<dyn StyleOwner>,
    resolved: Vec<(String, PathBuf)>,
    registry: &WatchRegistry,
) {
    let mut stale = std::mem::take(&mut record.refs);
    let mut refs = Vec::with_capacity(resolved.len());

    for (source, path) in resolved {
        if let Some(pos) = stale
            .iter()
            .position(|s| s.source == source && s.path == path)
        {
            refs.push(stale.swap_remove(pos));
            continue;
        }
        let sub = Subscriber::new(source, path, owner);
        registry.subscribe(sub.clone());
        refs.push(sub);
    }

    for sub in stale {
        crate::debug!("monitor"; "owner {} no longer uses {}", sub.owner_id, sub.source);
        registry.unsubscribe(&sub.path, sub.id);
    }
    record.refs = refs;
}

// =============================================================================
// Toolkit notifications
// =============================================================================

/// Window-level notifications, registered with the [`WindowSource`].
///
/// [`WindowSource`]: crate::owner::WindowSource
impl OwnerObserver for Inner {
    fn stylesheets_changed(&self, owner: OwnerId) {
        let weak = {
            let session = self.session.lock();
            match session.owners.get(&owner) {
                Some(record) => Weak::clone(&record.owner),
                None => return,
            }
        };
        if let Some(owner) = weak.upgrade() {
            self.attach_owner(&owner);
        }
    }

    fn owner_attached(&self, owner: Arc<dyn StyleOwner>) {
        self.discover(owner);
    }

    fn owner_detached(&self, owner: Arc<dyn StyleOwner>) {
        self.detach_subtree(owner);
    }
}

/// Notifications from one monitored owner.
///
/// Structural changes are only followed while that owner is itself in
/// scope: a detached subtree the application keeps around is ignored.
struct ScopedObserver {
    owner: OwnerId,
    inner: Weak<Inner>,
}

impl ScopedObserver {
    fn monitored(&self) -> Option<Arc<Inner>> {
        self.inner
            .upgrade()
            .filter(|inner| inner.is_monitored(self.owner))
    }
}

impl OwnerObserver for ScopedObserver {
    fn stylesheets_changed(&self, owner: OwnerId) {
        if let Some(inner) = self.monitored() {
            inner.stylesheets_changed(owner);
        }
    }

    fn owner_attached(&self, owner: Arc<dyn StyleOwner>) {
        if let Some(inner) = self.monitored() {
            inner.discover(owner);
        } else {
            crate::debug!("monitor"; "ignoring child {} of detached owner {}", owner.id(), self.owner);
        }
    }

    fn owner_detached(&self, owner: Arc<dyn StyleOwner>) {
        if let Some(inner) = self.monitored() {
            inner.detach_subtree(owner);
        }
    }
}
