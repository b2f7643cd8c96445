//! restyle - live stylesheet reload for running GUI applications.
//!
//! # Module Structure
//!
//! ```text
//! src/
//! ├── resolve/      # Identifier → source file strategies (Maven, Gradle, file:)
//! ├── liveness/     # Drop-driven cleanup worker
//! ├── registry      # One watch entry per physical file
//! ├── watch/        # notify loop, debounce, attach retry
//! ├── dispatch      # Re-read and re-apply on the UI thread
//! ├── monitor/      # Controller, builder, stop handle
//! ├── owner         # Toolkit seam (StyleOwner, WindowSource)
//! ├── config        # Environment switches
//! ├── logger        # Leveled logging backends
//! └── error         # Error types
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let stop = restyle::MonitorBuilder::new()
//!     .windows(app.windows())
//!     .executor(app.ui_executor())
//!     .start()?;
//!
//! // later
//! stop.stop();
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod liveness;
pub mod logger;
pub mod monitor;
pub mod owner;
pub mod path;
pub mod registry;
pub mod resolve;
pub mod watch;

#[cfg(test)]
mod testkit;

pub use config::EnvSwitches;
pub use dispatch::{InlineExecutor, QueueExecutor, ReloadDispatcher, UiExecutor, UiTask};
pub use error::{Error, Result};
pub use logger::{LogBackend, LogLevel, LogSink};
pub use monitor::{MonitorBuilder, MonitorController, MonitorState, Scope, StopHandle};
pub use owner::{Lifeline, OwnerId, OwnerKind, OwnerObserver, StyleOwner, Stylesheet, WindowSource};
pub use resolve::{PathResolver, ResolverChain, ResolverKind};
