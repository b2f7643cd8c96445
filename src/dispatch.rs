//! Reload dispatch.
//!
//! Runs on the watch worker once a path has been quiet for the debounce
//! window. Reads the file once, then hands one re-apply task per live
//! subscriber to the toolkit's UI thread.
//!
//! ```text
//! watch worker                          UI thread
//! ────────────                          ─────────
//! on_path_modified(path)
//!   snapshot subscribers
//!   read file once
//!   for each live subscriber ──execute──► owner.apply_stylesheet(sheet)
//!   prune reclaimed subscribers
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{Error, panic_message};
use crate::owner::{StyleOwner, Stylesheet};
use crate::registry::WatchRegistry;

/// Work item handed to a [`UiExecutor`].
pub type UiTask = Box<dyn FnOnce() + Send>;

// =============================================================================
// Executors
// =============================================================================

/// Runs tasks on the toolkit's UI thread.
///
/// Every `apply_stylesheet` call goes through the executor. Tasks are
/// already panic-safe; an executor only has to run them in order.
pub trait UiExecutor: Send + Sync {
    fn execute(&self, task: UiTask);
}

/// Runs each task immediately on the calling thread.
///
/// For toolkits without thread affinity.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl UiExecutor for InlineExecutor {
    fn execute(&self, task: UiTask) {
        task();
    }
}

/// Queues tasks until the host's UI loop drains them with
/// [`run_pending`](Self::run_pending).
pub struct QueueExecutor {
    tx: Sender<UiTask>,
    rx: Receiver<UiTask>,
}

impl QueueExecutor {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    /// Run every queued task on the current thread. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for QueueExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl UiExecutor for QueueExecutor {
    fn execute(&self, task: UiTask) {
        // Receiver lives in self: send cannot fail.
        let _ = self.tx.send(task);
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

pub struct ReloadDispatcher {
    registry: Arc<WatchRegistry>,
    executor: Arc<dyn UiExecutor>,
}

impl ReloadDispatcher {
    pub fn new(registry: Arc<WatchRegistry>, executor: Arc<dyn UiExecutor>) -> Self {
        Self { registry, executor }
    }

    /// React to a debounced change of `path`.
    ///
    /// Returns the number of re-apply tasks scheduled. A read failure is
    /// logged and leaves the watch in place so the next save retries.
    pub fn on_path_modified(&self, path: &Path) -> usize {
        let Some(subscribers) = self.registry.snapshot(path) else {
            crate::debug!("reload"; "no subscribers for {}", path.display());
            return 0;
        };

        let (content, modified) = match read_sheet(path) {
            Ok(read) => read,
            Err(e) => {
                crate::error!("reload"; "{:#}", anyhow::Error::from(e));
                return 0;
            }
        };
        if let Some(at) = modified {
            self.registry.record_modified(path, at);
        }

        let mut reclaimed = Vec::new();
        let mut scheduled = 0;
        for subscriber in subscribers {
            if !subscriber.is_live() {
                reclaimed.push(subscriber.id);
                continue;
            }
            let sheet = Stylesheet::new(subscriber.source.as_str(), path, Arc::clone(&content));
            let owner = subscriber.owner_weak();
            self.executor.execute(Box::new(move || apply(&owner, &sheet)));
            scheduled += 1;
        }

        if !reclaimed.is_empty() {
            let pruned = self.registry.prune(path, &reclaimed);
            crate::debug!("reload"; "pruned {} reclaimed subscriber(s) of {}", pruned, path.display());
        }

        crate::info!("reload"; "{} changed, reloading in {} owner(s)", path.display(), scheduled);
        scheduled
    }
}

fn read_sheet(path: &Path) -> Result<(Arc<str>, Option<SystemTime>), Error> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
    Ok((Arc::from(content), modified))
}

/// UI-thread half of a reload.
fn apply(owner: &Weak<dyn StyleOwner>, sheet: &Stylesheet) {
    // Reclaimed between scheduling and running.
    let Some(owner) = owner.upgrade() else {
        return;
    };

    match catch_unwind(AssertUnwindSafe(|| owner.apply_stylesheet(sheet))) {
        Ok(Ok(())) => {
            crate::debug!("reload"; "applied {} to owner {}", sheet.source, owner.id());
        }
        Ok(Err(e)) => {
            crate::error!("reload"; "cannot apply {} to owner {}: {:#}", sheet.source, owner.id(), e);
        }
        Err(payload) => {
            crate::error!(
                "reload";
                "owner {} panicked applying {}: {}",
                owner.id(), sheet.source, panic_message(payload.as_ref())
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
