//! Environment switches.
//!
//! Read once when monitoring starts:
//!
//! | Variable            | Values                                  | Default   |
//! |---------------------|-----------------------------------------|-----------|
//! | `RESTYLE_DISABLE`   | `true`/`1`/`yes`/`on`                   | off       |
//! | `RESTYLE_LOG`       | `true`/`1`/`yes`/`on`                   | off       |
//! | `RESTYLE_LOG_LEVEL` | `NONE` `ERROR` `WARN` `INFO` `DEBUG`    | `INFO`    |
//! | `RESTYLE_LOG_TYPE`  | `noop` `console` `platform`             | `console` |
//!
//! Invalid values never abort startup: they are reported on stderr and the
//! default is used.

use std::fmt;

use owo_colors::OwoColorize;

use crate::logger::{self, LogBackend, LogLevel};

pub const ENV_DISABLE: &str = "RESTYLE_DISABLE";
pub const ENV_LOG: &str = "RESTYLE_LOG";
pub const ENV_LOG_LEVEL: &str = "RESTYLE_LOG_LEVEL";
pub const ENV_LOG_TYPE: &str = "RESTYLE_LOG_TYPE";

// =============================================================================
// Diagnostics
// =============================================================================

/// An environment value that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvProblem {
    pub var: &'static str,
    pub value: String,
    /// Accepted values.
    pub expected: String,
}

impl fmt::Display for EnvProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid value for {}, '{}' is not allowed. Select one in: {}",
            self.var, self.value, self.expected
        )
    }
}

// =============================================================================
// Switches
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSwitches {
    pub disabled: bool,
    /// Whether the host asked for logging at all.
    pub log: bool,
    pub log_level: LogLevel,
    pub log_backend: LogBackend,
    pub problems: Vec<EnvProblem>,
}

impl Default for EnvSwitches {
    fn default() -> Self {
        Self {
            disabled: false,
            log: false,
            log_level: LogLevel::Info,
            log_backend: LogBackend::Console,
            problems: Vec::new(),
        }
    }
}

impl EnvSwitches {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read switches through `lookup` (`None` = unset).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut switches = Self {
            disabled: lookup(ENV_DISABLE).is_some_and(|v| parse_flag(&v)),
            log: lookup(ENV_LOG).is_some_and(|v| parse_flag(&v)),
            ..Self::default()
        };

        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            match value.parse() {
                Ok(level) => switches.log_level = level,
                Err(_) => switches.problems.push(EnvProblem {
                    var: ENV_LOG_LEVEL,
                    value,
                    expected: join_labels(LogLevel::ALL.iter().map(|l| l.label())),
                }),
            }
        }

        if let Some(value) = lookup(ENV_LOG_TYPE) {
            match value.parse() {
                Ok(backend) => switches.log_backend = backend,
                Err(_) => switches.problems.push(EnvProblem {
                    var: ENV_LOG_TYPE,
                    value,
                    expected: join_labels(LogBackend::NAMES.iter().copied()),
                }),
            }
        }

        switches
    }

    /// Print every problem to stderr.
    pub fn report(&self) {
        for problem in &self.problems {
            eprintln!("{} {}", "[restyle]".red().bold(), problem);
        }
    }

    /// Install the logger described by these switches, unless the host
    /// already configured one.
    ///
    /// Returns `true` if the logger was configured here.
    pub fn configure_logger(&self) -> bool {
        if logger::is_initialized() {
            return false;
        }
        self.report();
        if self.log {
            logger::init(self.log_level, self.log_backend);
        } else {
            logger::init(LogLevel::None, LogBackend::Noop);
        }
        true
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn join_labels<'a>(labels: impl Iterator<Item = &'a str>) -> String {
    format!("[{}]", labels.collect::<Vec<_>>().join(", "))
}

// =============================================================================
// Tests
// =============================================================================
