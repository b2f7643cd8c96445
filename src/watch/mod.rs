//! File watch loop
//!
//! Turns raw notify events into debounced "this stylesheet changed" calls.
//!
//! Architecture:
//! ```text
//! notify callback ─┐
//! attach/detach ───┼─► channel ─► worker: Debouncer ─► on_change(path)
//! shutdown ────────┘                 │
//!                                    └─► WatchSet: retry / re-attach dirs
//! ```
//!
//! The worker blocks on its channel. It only uses a timeout while a
//! debounce window or an attach retry is pending.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use notify::{EventKind, Watcher};
use parking_lot::Mutex;

use crate::error::{Error, Result, panic_message};
use crate::path::normalize_path;
use crate::registry::PathWatch;

// Pure timing and per-path deduplication.
mod debouncer;
// Directory watch attach/retry lifecycle.
mod watch_set;


pub use debouncer::DEBOUNCE_MS;

use debouncer::Debouncer;
use watch_set::WatchSet;

enum LoopMsg {
    Event(notify::Result<notify::Event>),
    /// Retry schedule changed.
    Wake,
    Shutdown,
}

// =============================================================================
// Handle
// =============================================================================

/// Cheap, cloneable access to the watched file set.
#[derive(Clone)]
pub struct WatchHandle {
    watches: Arc<Mutex<WatchSet>>,
    tx: Sender<LoopMsg>,
}

impl WatchHandle {
    pub fn is_watching(&self, file: &Path) -> bool {
        self.watches.lock().is_watched_file(file)
    }

    /// Whether the directory containing `file` currently has a live watch.
    pub fn is_attached(&self, file: &Path) -> bool {
        self.watches
            .lock()
            .is_attached(&crate::path::watch_dir_of(file))
    }

    pub fn file_count(&self) -> usize {
        self.watches.lock().file_count()
    }

    /// Number of live directory watches.
    pub fn attached_count(&self) -> usize {
        self.watches.lock().attached_count()
    }
}

impl PathWatch for WatchHandle {
    fn attach(&self, file: &Path) {
        let retry_scheduled = self.watches.lock().add_file(file);
        if retry_scheduled {
            let _ = self.tx.send(LoopMsg::Wake);
        }
    }

    fn detach(&self, file: &Path) {
        self.watches.lock().remove_file(file);
    }
}

// =============================================================================
// Loop
// =============================================================================

/// Background worker watching stylesheet files.
pub struct FileWatchLoop {
    handle: WatchHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FileWatchLoop {
    /// Start a loop backed by the platform's recommended watcher.
    ///
    /// `on_change` runs on the watch worker once per debounced change.
    pub fn start(on_change: impl Fn(PathBuf) + Send + 'static) -> Result<Self> {
        let (tx, rx) = channel::unbounded();

        let notify_tx = tx.clone();
        let watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(LoopMsg::Event(res));
        })?;

        Self::spawn(Box::new(watcher), tx, rx, Box::new(on_change))
    }

    fn spawn(
        watcher: Box<dyn Watcher + Send>,
        tx: Sender<LoopMsg>,
        rx: Receiver<LoopMsg>,
        on_change: Box<dyn Fn(PathBuf) + Send>,
    ) -> Result<Self> {
        let watches = Arc::new(Mutex::new(WatchSet::new(watcher)));

        let worker_watches = Arc::clone(&watches);
        let worker = std::thread::Builder::new()
            .name("restyle-watch".into())
            .spawn(move || run_worker(&rx, &worker_watches, on_change.as_ref()))
            .map_err(|source| Error::Spawn {
                name: "watch",
                source,
            })?;

        Ok(Self {
            handle: WatchHandle { watches, tx },
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn handle(&self) -> WatchHandle {
        self.handle.clone()
    }

    /// Detach every watch, stop the worker and wait for it.
    ///
    /// Idempotent. Does not join when called from the worker itself.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        self.handle.watches.lock().close();
        let _ = self.handle.tx.send(LoopMsg::Shutdown);
        if worker.thread().id() != std::thread::current().id() && worker.join().is_err() {
            crate::error!("watch"; "watch worker panicked");
        }
    }
}

impl Drop for FileWatchLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Worker
// =============================================================================

fn run_worker(rx: &Receiver<LoopMsg>, watches: &Mutex<WatchSet>, on_change: &dyn Fn(PathBuf)) {
    let mut debouncer = Debouncer::new();

    loop {
        let received = match next_wakeup(&debouncer, watches) {
            Some(timeout) => rx.recv_timeout(timeout),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(LoopMsg::Event(Ok(event))) => handle_event(&event, &mut debouncer, watches),
            Ok(LoopMsg::Event(Err(e))) => crate::warn!("watch"; "notify error: {}", e),
            Ok(LoopMsg::Wake) | Err(RecvTimeoutError::Timeout) => {}
            Ok(LoopMsg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        {
            let mut watches = watches.lock();
            watches.maintain(now);
            watches.retry_due(now);
        }

        for path in debouncer.take_ready(now) {
            // Detached while debouncing.
            if !watches.lock().is_watched_file(&path) {
                continue;
            }
            crate::debug!("watch"; "changed: {}", path.display());
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| on_change(path.clone()))) {
                crate::error!(
                    "watch";
                    "change handler panicked for {}: {}",
                    path.display(), panic_message(payload.as_ref())
                );
            }
        }
    }

    crate::debug!("watch"; "watch worker stopped");
}

/// How long the worker may block: until the next debounce deadline or
/// retry, whichever comes first. `None` blocks indefinitely.
fn next_wakeup(debouncer: &Debouncer, watches: &Mutex<WatchSet>) -> Option<std::time::Duration> {
    let now = Instant::now();
    let debounce = debouncer.sleep_duration(now);
    let retry = watches
        .lock()
        .next_retry()
        .map(|at| at.saturating_duration_since(now));

    match (debounce, retry) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn handle_event(event: &notify::Event, debouncer: &mut Debouncer, watches: &Mutex<WatchSet>) {
    let now = Instant::now();
    let mut watches = watches.lock();

    for raw in &event.paths {
        let path = normalize_path(raw);

        if matches!(event.kind, EventKind::Remove(_)) && watches.is_dir(&path) {
            watches.mark_lost(&path, now);
            continue;
        }

        if !Debouncer::is_relevant(&event.kind) || !watches.is_watched_file(&path) {
            continue;
        }

        crate::debug!("watch"; "event {:?}: {}", event.kind, path.display());
        debouncer.record(path, now);
    }
}
