//! Error types.
//!
//! Only startup problems reach the caller. Everything that happens while
//! monitoring (unresolvable identifiers, watch failures, reload failures,
//! panicking callbacks) is logged at the worker boundary instead.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The filesystem notification backend could not be created.
    #[error("cannot create file watcher")]
    Watcher(#[from] notify::Error),

    /// A worker thread could not be spawned.
    #[error("cannot spawn `{name}` worker")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Re-reading a watched stylesheet failed.
    #[error("cannot read `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Render a caught panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
