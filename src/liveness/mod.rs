//! Reclamation-driven cleanup.
//!
//! Toolkits do not tell us when a window or node is gone for good, so
//! liveness is inferred from ownership instead: each owner embeds a
//! [`Lifeline`], and dropping the owner's last strong reference drops the
//! lifeline, which posts a notice to every tracker observing it.
//!
//! ```text
//! drop(Arc<Owner>) ──► Lifeline::drop ──► channel ──► cleanup worker ──► on_reclaimed()
//! ```
//!
//! The callback never runs on the dropping thread: the worker blocks on the
//! channel and runs callbacks one at a time, so a drop inside toolkit
//! internals cannot re-enter the engine.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result, panic_message};
use crate::owner::OwnerId;


type Callback = Box<dyn FnOnce() + Send>;
type Listeners = Mutex<Vec<(Sender<TrackerMsg>, TrackId)>>;

/// A pending callback and the lifeline list it is registered in.
struct Registration {
    callback: Callback,
    listeners: Weak<Listeners>,
}

type PendingMap = Arc<Mutex<FxHashMap<TrackId, Registration>>>;

/// Handle to one `track` registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(u64);

enum TrackerMsg {
    Reclaimed(TrackId),
    Shutdown,
}

// =============================================================================
// Lifeline
// =============================================================================

/// Drop notifier embedded in every [`StyleOwner`].
///
/// Holds no reference to the owner; it only knows who wants to hear about
/// the owner's end.
///
/// [`StyleOwner`]: crate::owner::StyleOwner
pub struct Lifeline {
    id: OwnerId,
    listeners: Arc<Listeners>,
}

impl Lifeline {
    pub fn new() -> Self {
        Self {
            id: OwnerId::next(),
            listeners: Arc::default(),
        }
    }

    pub fn id(&self) -> OwnerId {
        self.id
    }

    fn listen(&self, tx: Sender<TrackerMsg>, track: TrackId) -> Weak<Listeners> {
        self.listeners.lock().push((tx, track));
        Arc::downgrade(&self.listeners)
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Default for Lifeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Lifeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifeline").field("id", &self.id).finish()
    }
}

impl Drop for Lifeline {
    fn drop(&mut self) {
        for (tx, track) in self.listeners.lock().drain(..) {
            // Tracker already shut down: nothing left to clean.
            let _ = tx.send(TrackerMsg::Reclaimed(track));
        }
    }
}

// =============================================================================
// Tracker
// =============================================================================

/// Runs a callback once per tracked owner, after the owner is dropped.
pub struct LivenessTracker {
    tx: Sender<TrackerMsg>,
    pending: PendingMap,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl LivenessTracker {
    /// Spawn the cleanup worker.
    pub fn start() -> Result<Self> {
        let (tx, rx) = channel::unbounded();
        let pending = PendingMap::default();

        let worker_pending = Arc::clone(&pending);
        let worker = std::thread::Builder::new()
            .name("restyle-cleanup".into())
            .spawn(move || run_worker(&rx, &worker_pending))
            .map_err(|source| Error::Spawn {
                name: "cleanup",
                source,
            })?;

        Ok(Self {
            tx,
            pending,
            worker: Mutex::new(Some(worker)),
            next_id: AtomicU64::new(1),
        })
    }

    /// Run `on_reclaimed` once, on the cleanup worker, after the owner of
    /// `lifeline` is dropped.
    pub fn track(&self, lifeline: &Lifeline, on_reclaimed: impl FnOnce() + Send + 'static) -> TrackId {
        let id = TrackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listeners = lifeline.listen(self.tx.clone(), id);
        self.pending.lock().insert(
            id,
            Registration {
                callback: Box::new(on_reclaimed),
                listeners,
            },
        );
        crate::debug!("liveness"; "tracking owner {}", lifeline.id());
        id
    }

    /// Forget a registration without running it, and remove it from the
    /// owner's lifeline. Returns `false` if it already ran or was never
    /// known.
    pub fn untrack(&self, id: TrackId) -> bool {
        let Some(registration) = self.pending.lock().remove(&id) else {
            return false;
        };
        // Owner already dropped: its lifeline is gone with it.
        if let Some(listeners) = registration.listeners.upgrade() {
            listeners.lock().retain(|(_, track)| *track != id);
        }
        true
    }

    /// Registrations whose owner is still alive (or whose notice is queued).
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Stop the worker after it drains notices queued so far.
    ///
    /// Idempotent. Joins the worker unless called from the worker itself.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = self.tx.send(TrackerMsg::Shutdown);
        if worker.thread().id() != std::thread::current().id() && worker.join().is_err() {
            crate::error!("liveness"; "cleanup worker panicked");
        }
    }
}

impl Drop for LivenessTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(rx: &Receiver<TrackerMsg>, pending: &Mutex<FxHashMap<TrackId, Registration>>) {
    while let Ok(msg) = rx.recv() {
        let id = match msg {
            TrackerMsg::Reclaimed(id) => id,
            TrackerMsg::Shutdown => break,
        };

        // Removing first makes the callback at-most-once.
        let Some(registration) = pending.lock().remove(&id) else {
            continue;
        };

        if let Err(payload) = catch_unwind(AssertUnwindSafe(registration.callback)) {
            crate::error!("liveness"; "cleanup callback panicked: {}", panic_message(payload.as_ref()));
        }
    }
    crate::debug!("liveness"; "cleanup worker stopped");
}
