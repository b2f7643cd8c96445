//! Leveled logging with swappable backends.
//!
//! This module provides:
//! - `error!`, `warn!`, `info!`, `debug!` macros with a module prefix
//! - `LogLevel` filtering through a global atomic
//! - `LogBackend` selection (no-op, colored console, `tracing`)
//! - `LogSink` for hosts that route messages into their own logger
//!
//! Nothing is printed until a backend is installed: the default sink is a
//! no-op so an unconfigured host never sees output or a crash.
//!
//! # Example
//!
//! ```ignore
//! restyle::logger::init(LogLevel::Debug, LogBackend::Console);
//! warn!("watch"; "cannot watch {}: {}", dir.display(), err);
//! ```

use std::fmt;
use std::io::{Write, stderr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use owo_colors::OwoColorize;

// ============================================================================
// Levels and backends
// ============================================================================

/// Verbosity level, ordered from silent to chatty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    None = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::None,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            LogLevel::None => "NONE",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::None,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

/// Built-in output backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogBackend {
    /// Drop everything.
    Noop,
    /// Colored `[module]` prefix on stderr.
    Console,
    /// Forward to `tracing` events under the `restyle` target.
    Platform,
}

impl LogBackend {
    pub const NAMES: [&'static str; 3] = ["noop", "console", "platform"];
}

impl FromStr for LogBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "noop" => Ok(LogBackend::Noop),
            "console" => Ok(LogBackend::Console),
            "platform" => Ok(LogBackend::Platform),
            _ => Err(s.to_string()),
        }
    }
}

/// Destination for log records, for hosts with their own logging.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, module: &str, message: &str);
}

enum Sink {
    Noop,
    Console,
    Platform,
    Custom(Box<dyn LogSink>),
}

// ============================================================================
// Global state
// ============================================================================

static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Set once any backend or sink has been installed.
static INITIALIZED: AtomicBool = AtomicBool::new(false);

static SINK: LazyLock<ArcSwap<Sink>> = LazyLock::new(|| ArcSwap::from_pointee(Sink::Noop));

/// Install a level and built-in backend.
pub fn init(level: LogLevel, backend: LogBackend) {
    set_level(level);
    let sink = match backend {
        LogBackend::Noop => Sink::Noop,
        LogBackend::Console => Sink::Console,
        LogBackend::Platform => Sink::Platform,
    };
    SINK.store(Arc::new(sink));
    INITIALIZED.store(true, Ordering::SeqCst);
}

/// Route every record into a host-provided sink.
pub fn set_sink(sink: impl LogSink + 'static) {
    SINK.store(Arc::new(Sink::Custom(Box::new(sink))));
    INITIALIZED.store(true, Ordering::SeqCst);
}

/// Whether a backend or sink was installed explicitly.
pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::SeqCst)
}

pub fn set_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn level() -> LogLevel {
    LogLevel::from_u8(LEVEL.load(Ordering::Relaxed))
}

/// Check if a record at `level` would be emitted.
#[inline]
pub fn enabled(level: LogLevel) -> bool {
    level != LogLevel::None && level <= self::level()
}

// ============================================================================
// Log Macros
// ============================================================================

/// Log an error with a module prefix.
///
/// # Usage
/// ```ignore
/// error!("reload"; "cannot read {}: {}", path.display(), err);
/// ```
#[macro_export]
macro_rules! error {
    ($module:expr; $($arg:tt)*) => {
        $crate::__log_at!($crate::logger::LogLevel::Error, $module; $($arg)*)
    };
}

/// Log a warning with a module prefix.
#[macro_export]
macro_rules! warn {
    ($module:expr; $($arg:tt)*) => {
        $crate::__log_at!($crate::logger::LogLevel::Warn, $module; $($arg)*)
    };
}

/// Log an informational message with a module prefix.
#[macro_export]
macro_rules! info {
    ($module:expr; $($arg:tt)*) => {
        $crate::__log_at!($crate::logger::LogLevel::Info, $module; $($arg)*)
    };
}

/// Log a debug message (only formatted when DEBUG is enabled).
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {
        $crate::__log_at!($crate::logger::LogLevel::Debug, $module; $($arg)*)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_at {
    ($level:expr, $module:expr; $($arg:tt)*) => {{
        if $crate::logger::enabled($level) {
            $crate::logger::log($level, $module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Emit a record through the installed sink.
pub fn log(level: LogLevel, module: &str, message: &str) {
    if !enabled(level) {
        return;
    }

    match SINK.load().as_ref() {
        Sink::Noop => {}
        Sink::Console => {
            let prefix = colorize_prefix(level, module);
            let mut err = stderr().lock();
            writeln!(err, "{prefix} {message}").ok();
        }
        Sink::Platform => forward_to_tracing(level, module, message),
        Sink::Custom(sink) => sink.log(level, module, message),
    }
}

fn forward_to_tracing(level: LogLevel, module: &str, message: &str) {
    match level {
        LogLevel::None => {}
        LogLevel::Error => tracing::error!(target: "restyle", module, "{message}"),
        LogLevel::Warn => tracing::warn!(target: "restyle", module, "{message}"),
        LogLevel::Info => tracing::info!(target: "restyle", module, "{message}"),
        LogLevel::Debug => tracing::debug!(target: "restyle", module, "{message}"),
    }
}

/// Apply color to a module prefix based on severity
#[inline]
fn colorize_prefix(level: LogLevel, module: &str) -> String {
    let prefix = format!("[restyle:{module}]");
    match level {
        LogLevel::Error => prefix.bright_red().bold().to_string(),
        LogLevel::Warn => prefix.bright_yellow().bold().to_string(),
        LogLevel::Info => prefix.bright_green().bold().to_string(),
        LogLevel::Debug | LogLevel::None => prefix.dimmed().to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
