//! In-crate toolkit double for tests.
//!
//! `MockNode` plays window, scene or node; `MockWindows` plays the
//! application's window list. Both notify observers synchronously on the
//! calling thread, like a UI toolkit firing change listeners.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::owner::{Lifeline, OwnerId, OwnerKind, OwnerObserver, StyleOwner, Stylesheet, WindowSource};
use crate::registry::PathWatch;

/// How `apply_stylesheet` misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    None,
    Error,
    Panic,
}

type Observers = Mutex<Vec<Weak<dyn OwnerObserver>>>;

fn live_observers(observers: &Observers) -> Vec<Arc<dyn OwnerObserver>> {
    let mut observers = observers.lock();
    observers.retain(|o| o.strong_count() > 0);
    observers.iter().filter_map(Weak::upgrade).collect()
}

// =============================================================================
// MockNode
// =============================================================================

pub(crate) struct MockNode {
    lifeline: Lifeline,
    kind: OwnerKind,
    sheets: Mutex<Vec<String>>,
    children: Mutex<Vec<Arc<MockNode>>>,
    observers: Observers,
    applied: Mutex<Vec<Stylesheet>>,
    failure: Mutex<Failure>,
}

impl MockNode {
    pub(crate) fn new(kind: OwnerKind, sheets: &[&str]) -> Arc<Self> {
        Self::with_children(kind, sheets, Vec::new())
    }

    pub(crate) fn with_children(
        kind: OwnerKind,
        sheets: &[&str],
        children: Vec<Arc<MockNode>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            lifeline: Lifeline::new(),
            kind,
            sheets: Mutex::new(sheets.iter().map(|s| s.to_string()).collect()),
            children: Mutex::new(children),
            observers: Mutex::new(Vec::new()),
            applied: Mutex::new(Vec::new()),
            failure: Mutex::new(Failure::None),
        })
    }

    pub(crate) fn add_child(&self, child: Arc<MockNode>) {
        self.children.lock().push(Arc::clone(&child));
        for observer in live_observers(&self.observers) {
            observer.owner_attached(child.clone());
        }
    }

    /// Detach a child and hand it back to the caller.
    pub(crate) fn remove_child(&self, id: OwnerId) -> Option<Arc<MockNode>> {
        let child = {
            let mut children = self.children.lock();
            let pos = children.iter().position(|c| c.id() == id)?;
            children.remove(pos)
        };
        for observer in live_observers(&self.observers) {
            observer.owner_detached(child.clone());
        }
        Some(child)
    }

    /// Detach a child without telling anyone, like a toolkit removal path
    /// that fires no listener.
    pub(crate) fn forget_child(&self, id: OwnerId) -> Option<Arc<MockNode>> {
        let mut children = self.children.lock();
        let pos = children.iter().position(|c| c.id() == id)?;
        Some(children.remove(pos))
    }

    pub(crate) fn set_stylesheets(&self, sheets: &[&str]) {
        *self.sheets.lock() = sheets.iter().map(|s| s.to_string()).collect();
        for observer in live_observers(&self.observers) {
            observer.stylesheets_changed(self.id());
        }
    }

    pub(crate) fn set_failure(&self, failure: Failure) {
        *self.failure.lock() = failure;
    }

    pub(crate) fn applied(&self) -> Vec<Stylesheet> {
        self.applied.lock().clone()
    }

    pub(crate) fn observer_count(&self) -> usize {
        live_observers(&self.observers).len()
    }
}

impl StyleOwner for MockNode {
    fn lifeline(&self) -> &Lifeline {
        &self.lifeline
    }

    fn kind(&self) -> OwnerKind {
        self.kind
    }

    fn stylesheets(&self) -> Vec<String> {
        self.sheets.lock().clone()
    }

    fn children(&self) -> Vec<Arc<dyn StyleOwner>> {
        self.children
            .lock()
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn StyleOwner>)
            .collect()
    }

    fn apply_stylesheet(&self, sheet: &Stylesheet) -> anyhow::Result<()> {
        match *self.failure.lock() {
            Failure::None => {}
            Failure::Error => anyhow::bail!("malformed stylesheet {}", sheet.source),
            Failure::Panic => panic!("toolkit exploded"),
        }
        self.applied.lock().push(sheet.clone());
        Ok(())
    }

    fn observe(&self, observer: Weak<dyn OwnerObserver>) {
        self.observers.lock().push(observer);
    }
}

// =============================================================================
// MockWindows
// =============================================================================

pub(crate) struct MockWindows {
    windows: Mutex<Vec<Arc<MockNode>>>,
    observers: Observers,
}

impl MockWindows {
    pub(crate) fn new(windows: Vec<Arc<MockNode>>) -> Arc<Self> {
        Arc::new(Self {
            windows: Mutex::new(windows),
            observers: Mutex::new(Vec::new()),
        })
    }

    /// Show a new window.
    pub(crate) fn open(&self, window: Arc<MockNode>) {
        self.windows.lock().push(Arc::clone(&window));
        for observer in live_observers(&self.observers) {
            observer.owner_attached(window.clone());
        }
    }

    /// Close a window and hand it back to the caller.
    pub(crate) fn close(&self, id: OwnerId) -> Option<Arc<MockNode>> {
        let window = {
            let mut windows = self.windows.lock();
            let pos = windows.iter().position(|w| w.id() == id)?;
            windows.remove(pos)
        };
        for observer in live_observers(&self.observers) {
            observer.owner_detached(window.clone());
        }
        Some(window)
    }
}

impl WindowSource for MockWindows {
    fn windows(&self) -> Vec<Arc<dyn StyleOwner>> {
        self.windows
            .lock()
            .iter()
            .map(|w| Arc::clone(w) as Arc<dyn StyleOwner>)
            .collect()
    }

    fn observe(&self, observer: Weak<dyn OwnerObserver>) {
        self.observers.lock().push(observer);
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Watch seam that does nothing.
pub(crate) struct NullWatch;

impl PathWatch for NullWatch {
    fn attach(&self, _file: &Path) {}
    fn detach(&self, _file: &Path) {}
}

/// Write `content` to `dir/name` (creating parents) and return the
/// normalized path.
pub(crate) fn write_sheet(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path.canonicalize().unwrap()
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
