use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::path::watch_dir_of;

/// First retry delay after a failed attach.
pub(super) const RETRY_INITIAL: Duration = Duration::from_millis(500);
/// Retry delay ceiling.
pub(super) const RETRY_MAX: Duration = Duration::from_secs(30);

struct DirState {
    /// Watched files living in this directory.
    files: usize,
    attached: bool,
    backoff: Duration,
    next_attempt: Option<Instant>,
}

impl DirState {
    fn new() -> Self {
        Self {
            files: 0,
            attached: false,
            backoff: RETRY_INITIAL,
            next_attempt: None,
        }
    }
}

/// Watched files and the directory watches backing them.
///
/// Responsibility:
/// - One notify watch per directory, shared by every file inside it
/// - Retry directories that could not be attached, with backoff
/// - Re-attach directories that were removed and recreated
pub(super) struct WatchSet {
    watcher: Box<dyn Watcher + Send>,
    files: FxHashSet<PathBuf>,
    dirs: FxHashMap<PathBuf, DirState>,
    closed: bool,
}

impl WatchSet {
    pub(super) fn new(watcher: Box<dyn Watcher + Send>) -> Self {
        Self {
            watcher,
            files: FxHashSet::default(),
            dirs: FxHashMap::default(),
            closed: false,
        }
    }

    /// Start watching `file`. Returns `true` if a retry was scheduled and
    /// the worker should recompute its wake-up time.
    pub(super) fn add_file(&mut self, file: &Path) -> bool {
        if self.closed || !self.files.insert(file.to_path_buf()) {
            return false;
        }

        let dir = watch_dir_of(file);
        let state = self.dirs.entry(dir.clone()).or_insert_with(DirState::new);
        state.files += 1;
        if state.files > 1 {
            return false;
        }

        self.try_attach(&dir, Instant::now())
    }

    pub(super) fn remove_file(&mut self, file: &Path) {
        if !self.files.remove(file) {
            return;
        }

        let dir = watch_dir_of(file);
        let Some(state) = self.dirs.get_mut(&dir) else {
            return;
        };
        state.files -= 1;
        if state.files > 0 {
            return;
        }

        let attached = state.attached;
        self.dirs.remove(&dir);
        if attached && let Err(e) = self.watcher.unwatch(&dir) {
            crate::debug!("watch"; "unwatch {}: {}", dir.display(), e);
        }
    }

    /// Attach `dir`, scheduling a retry on failure. Returns `true` if a
    /// retry was scheduled.
    fn try_attach(&mut self, dir: &Path, now: Instant) -> bool {
        let Some(state) = self.dirs.get_mut(dir) else {
            return false;
        };

        match self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                if state.next_attempt.is_some() {
                    crate::info!("watch"; "watching {} again", dir.display());
                } else {
                    crate::debug!("watch"; "attached {}", dir.display());
                }
                state.attached = true;
                state.backoff = RETRY_INITIAL;
                state.next_attempt = None;
                false
            }
            Err(e) => {
                crate::warn!(
                    "watch";
                    "cannot watch {}: {}; retrying in {:?}",
                    dir.display(), e, state.backoff
                );
                state.attached = false;
                state.next_attempt = Some(now + state.backoff);
                state.backoff = (state.backoff * 2).min(RETRY_MAX);
                true
            }
        }
    }

    /// Retry every directory whose backoff has elapsed.
    pub(super) fn retry_due(&mut self, now: Instant) {
        let due: Vec<PathBuf> = self
            .dirs
            .iter()
            .filter(|(_, s)| !s.attached && s.next_attempt.is_some_and(|at| at <= now))
            .map(|(dir, _)| dir.clone())
            .collect();

        for dir in due {
            self.try_attach(&dir, now);
        }
    }

    /// A watched directory vanished: drop its watch and schedule re-attach.
    pub(super) fn mark_lost(&mut self, dir: &Path, now: Instant) {
        let Some(state) = self.dirs.get_mut(dir) else {
            return;
        };
        if !state.attached {
            return;
        }

        crate::warn!("watch"; "{} disappeared; waiting for it to come back", dir.display());
        state.attached = false;
        state.backoff = RETRY_INITIAL;
        state.next_attempt = Some(now + RETRY_INITIAL);
        let _ = self.watcher.unwatch(dir);
    }

    /// Drop stale handles for directories that no longer exist.
    pub(super) fn maintain(&mut self, now: Instant) {
        let lost: Vec<PathBuf> = self
            .dirs
            .iter()
            .filter(|(dir, s)| s.attached && !dir.exists())
            .map(|(dir, _)| dir.clone())
            .collect();

        for dir in lost {
            self.mark_lost(&dir, now);
        }
    }

    /// Earliest scheduled retry.
    pub(super) fn next_retry(&self) -> Option<Instant> {
        self.dirs.values().filter_map(|s| s.next_attempt).min()
    }

    pub(super) fn is_watched_file(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    pub(super) fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains_key(path)
    }

    pub(super) fn is_attached(&self, dir: &Path) -> bool {
        self.dirs.get(dir).is_some_and(|s| s.attached)
    }

    pub(super) fn file_count(&self) -> usize {
        self.files.len()
    }

    pub(super) fn attached_count(&self) -> usize {
        self.dirs.values().filter(|s| s.attached).count()
    }

    /// Detach everything and refuse further files.
    pub(super) fn close(&mut self) {
        for (dir, state) in self.dirs.drain() {
            if state.attached {
                let _ = self.watcher.unwatch(&dir);
            }
        }
        self.files.clear();
        self.closed = true;
    }
}
