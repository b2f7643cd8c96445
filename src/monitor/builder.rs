//! Monitoring configuration and the stop handle returned to the host.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use owo_colors::OwoColorize;

use super::MonitorController;
use crate::config::{ENV_DISABLE, EnvSwitches};
use crate::dispatch::{InlineExecutor, UiExecutor};
use crate::error::Result;
use crate::owner::{StyleOwner, WindowSource};
use crate::resolve::{PathResolver, ResolverChain, ResolverKind};

/// Part of the application to monitor.
#[derive(Clone)]
pub enum Scope {
    /// Every current and future window.
    AllWindows(Arc<dyn WindowSource>),
    Window(Arc<dyn StyleOwner>),
    Scene(Arc<dyn StyleOwner>),
    Node(Arc<dyn StyleOwner>),
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::AllWindows(_) => f.write_str("AllWindows"),
            Scope::Window(o) => write!(f, "Window({})", o.id()),
            Scope::Scene(o) => write!(f, "Scene({})", o.id()),
            Scope::Node(o) => write!(f, "Node({})", o.id()),
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Collects resolvers, scope and executor, then starts monitoring.
///
/// ```ignore
/// let stop = MonitorBuilder::new()
///     .windows(app.window_source())
///     .executor(app.ui_executor())
///     .start()?;
/// // ...
/// stop.stop();
/// ```
pub struct MonitorBuilder {
    /// Placed before the built-in strategies.
    resolvers: Vec<Arc<dyn PathResolver>>,
    kinds: Vec<ResolverKind>,
    project_root: Option<PathBuf>,
    windows: Option<Arc<dyn WindowSource>>,
    window: Option<Arc<dyn StyleOwner>>,
    scene: Option<Arc<dyn StyleOwner>>,
    node: Option<Arc<dyn StyleOwner>>,
    executor: Option<Arc<dyn UiExecutor>>,
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorBuilder {
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
            kinds: ResolverKind::DEFAULTS.to_vec(),
            project_root: None,
            windows: None,
            window: None,
            scene: None,
            node: None,
            executor: None,
        }
    }

    /// Add a custom strategy, consulted before the built-in ones.
    pub fn add_resolver(self, resolver: impl PathResolver + 'static) -> Self {
        self.add_shared_resolver(Arc::new(resolver))
    }

    /// Add a shared strategy. Adding the same instance twice has no effect.
    pub fn add_shared_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Drop the built-in strategies; only custom ones are consulted.
    pub fn no_default_resolvers(mut self) -> Self {
        self.kinds.clear();
        self
    }

    /// Replace the built-in strategies, in order.
    pub fn resolver_kinds(mut self, kinds: impl IntoIterator<Item = ResolverKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Project root used by the build-layout strategies. Defaults to the
    /// current directory.
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Monitor every window of `source`, including future ones.
    pub fn windows(mut self, source: Arc<dyn WindowSource>) -> Self {
        self.windows = Some(source);
        self
    }

    /// Restrict monitoring to one window.
    pub fn restrict_to_window(mut self, window: Arc<dyn StyleOwner>) -> Self {
        self.window = Some(window);
        self
    }

    /// Restrict monitoring to one scene.
    pub fn restrict_to_scene(mut self, scene: Arc<dyn StyleOwner>) -> Self {
        self.scene = Some(scene);
        self
    }

    /// Restrict monitoring to one node subtree.
    pub fn restrict_to_node(mut self, node: Arc<dyn StyleOwner>) -> Self {
        self.node = Some(node);
        self
    }

    /// Thread on which stylesheets are re-applied. Defaults to
    /// [`InlineExecutor`].
    pub fn executor(mut self, executor: Arc<dyn UiExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Effective scope: the first restriction set among window, scene and
    /// node, else all windows of the window source.
    pub fn scope(&self) -> Option<Scope> {
        if let Some(window) = &self.window {
            return Some(Scope::Window(Arc::clone(window)));
        }
        if let Some(scene) = &self.scene {
            return Some(Scope::Scene(Arc::clone(scene)));
        }
        if let Some(node) = &self.node {
            return Some(Scope::Node(Arc::clone(node)));
        }
        self.windows.as_ref().map(|s| Scope::AllWindows(Arc::clone(s)))
    }

    /// Custom strategies followed by the built-in ones.
    pub fn resolver_chain(&self) -> ResolverChain {
        let root = self
            .project_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut chain = ResolverChain::new();
        for resolver in &self.resolvers {
            chain.push(Arc::clone(resolver));
        }
        chain.extend(&ResolverChain::from_kinds(self.kinds.iter().copied(), &root));
        chain
    }

    /// Controller in the `Created` state.
    pub fn build(self) -> MonitorController {
        let scope = self.scope();
        let chain = self.resolver_chain();
        let executor = self.executor.unwrap_or_else(|| Arc::new(InlineExecutor));
        MonitorController::new(scope, chain, executor)
    }

    /// Read the environment switches and start monitoring.
    pub fn start(self) -> Result<StopHandle> {
        self.start_with(&EnvSwitches::from_env())
    }

    /// Start monitoring under explicit switches.
    ///
    /// When disabled, nothing is watched and an inert handle is returned.
    pub fn start_with(self, switches: &EnvSwitches) -> Result<StopHandle> {
        switches.configure_logger();

        if switches.disabled {
            eprintln!(
                "{} not started: disabled via {}",
                "[restyle]".yellow().bold(),
                ENV_DISABLE
            );
            return Ok(StopHandle::inert());
        }

        let controller = self.build();
        controller.start()?;
        Ok(StopHandle {
            controller: Some(controller),
        })
    }
}

// =============================================================================
// Stop handle
// =============================================================================

/// Ends a monitoring session.
///
/// Dropping the handle does not stop monitoring; call [`stop`](Self::stop).
#[derive(Debug, Clone)]
pub struct StopHandle {
    controller: Option<MonitorController>,
}

impl StopHandle {
    /// Handle with nothing to stop.
    pub fn inert() -> Self {
        Self { controller: None }
    }

    /// Stop monitoring. Idempotent.
    pub fn stop(&self) {
        if let Some(controller) = &self.controller {
            controller.stop();
        }
    }

    pub fn controller(&self) -> Option<&MonitorController> {
        self.controller.as_ref()
    }

    pub fn is_inert(&self) -> bool {
        self.controller.is_none()
    }
}
