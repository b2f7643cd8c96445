use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::EventKind;
use notify::event::ModifyKind;
use rustc_hash::FxHashMap;

/// Quiet period after the last event for a path before it is reloaded.
///
/// A multi-step editor save (truncate, write, rename) becomes one reload.
pub const DEBOUNCE_MS: u64 = 300;

/// Pure debouncer: only handles timing and per-path deduplication.
/// No filesystem access, no global state.
pub(super) struct Debouncer {
    /// Path → time of its most recent event
    pub(super) pending: FxHashMap<PathBuf, Instant>,
    window: Duration,
}

impl Debouncer {
    pub(super) fn new() -> Self {
        Self {
            pending: FxHashMap::default(),
            window: Duration::from_millis(DEBOUNCE_MS),
        }
    }

    /// Whether an event of this kind can change a stylesheet's content.
    ///
    /// Metadata-only changes (mtime/atime/chmod) and removals are ignored:
    /// a removed file is reloaded when it comes back.
    pub(super) fn is_relevant(kind: &EventKind) -> bool {
        match kind {
            EventKind::Create(_) => true,
            EventKind::Modify(ModifyKind::Metadata(_)) => false,
            EventKind::Modify(_) => true,
            _ => false,
        }
    }

    /// Record an event for `path`, restarting its quiet period.
    pub(super) fn record(&mut self, path: PathBuf, at: Instant) {
        self.pending.insert(path, at);
    }

    /// Take every path whose quiet period has elapsed, sorted.
    pub(super) fn take_ready(&mut self, now: Instant) -> Vec<PathBuf> {
        let window = self.window;
        let mut ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, last)| now.saturating_duration_since(**last) >= window)
            .map(|(path, _)| path.clone())
            .collect();

        for path in &ready {
            self.pending.remove(path);
        }
        ready.sort();
        ready
    }

    /// Time until the next path becomes ready, `None` when idle.
    pub(super) fn sleep_duration(&self, now: Instant) -> Option<Duration> {
        self.pending
            .values()
            .map(|last| self.window.saturating_sub(now.saturating_duration_since(*last)))
            .min()
            .map(|d| d.max(Duration::from_millis(1)))
    }
}
