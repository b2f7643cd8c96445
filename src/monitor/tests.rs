use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tempfile::TempDir;

use super::*;
use crate::config::EnvSwitches;
use crate::dispatch::{InlineExecutor, QueueExecutor};
use crate::owner::OwnerKind;
use crate::resolve::ResolverKind;
use crate::testkit::{MockNode, MockWindows, wait_until, write_sheet};
use crate::watch::DEBOUNCE_MS;

const WAIT: Duration = Duration::from_secs(5);

/// Maven-style project with one resource stylesheet.
struct Project {
    _temp: TempDir,
    root: PathBuf,
    style: PathBuf,
}

impl Project {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let style = write_sheet(&root, "src/main/resources/style.css", ".a { color: red; }");
        Self {
            _temp: temp,
            root,
            style,
        }
    }

    fn sheet(&self, name: &str, content: &str) -> PathBuf {
        write_sheet(&self.root, &format!("src/main/resources/{name}"), content)
    }

    fn builder(&self) -> MonitorBuilder {
        MonitorBuilder::new()
            .project_root(&self.root)
            .resolver_kinds([ResolverKind::Maven])
            .executor(Arc::new(InlineExecutor))
    }
}

fn as_owner(node: &Arc<MockNode>) -> Arc<dyn StyleOwner> {
    node.clone()
}

/// Let any in-flight debounce window expire.
fn settle() {
    std::thread::sleep(Duration::from_millis(DEBOUNCE_MS * 3));
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_resolved_file_change_reapplies_once() {
    let project = Project::new();
    let window = MockNode::new(OwnerKind::Window, &["style.css"]);
    let monitor = project.builder().restrict_to_window(as_owner(&window)).build();
    monitor.start().unwrap();

    assert_eq!(monitor.watched_paths(), vec![project.style.clone()]);

    std::fs::write(&project.style, ".a { color: blue; }").unwrap();
    assert!(wait_until(WAIT, || window.applied().len() == 1));
    settle();

    let applied = window.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].source, "style.css");
    assert_eq!(&*applied[0].content, ".a { color: blue; }");
    monitor.stop();
}

#[test]
fn test_shared_file_one_watch_two_reloads() {
    let project = Project::new();
    let a = MockNode::new(OwnerKind::Node, &["style.css"]);
    let b = MockNode::new(OwnerKind::Node, &["style.css"]);
    let scene = MockNode::with_children(OwnerKind::Scene, &[], vec![a.clone(), b.clone()]);
    let monitor = project.builder().restrict_to_scene(as_owner(&scene)).build();
    monitor.start().unwrap();

    assert_eq!(monitor.watched_paths().len(), 1);
    assert_eq!(monitor.subscriber_count(&project.style), 2);
    assert_eq!(monitor.attached_watch_count(), 1);

    std::fs::write(&project.style, ".b {}").unwrap();
    assert!(wait_until(WAIT, || a.applied().len() == 1 && b.applied().len() == 1));
    settle();
    assert_eq!(a.applied().len(), 1);
    assert_eq!(b.applied().len(), 1);
    monitor.stop();
}

#[test]
fn test_reclaimed_owner_releases_subscription() {
    let project = Project::new();
    let kept = MockNode::new(OwnerKind::Node, &["style.css"]);
    let dropped = MockNode::new(OwnerKind::Node, &["style.css"]);
    let scene = MockNode::with_children(OwnerKind::Scene, &[], vec![kept.clone(), dropped.clone()]);
    let monitor = project.builder().restrict_to_scene(as_owner(&scene)).build();
    monitor.start().unwrap();
    assert_eq!(monitor.subscriber_count(&project.style), 2);

    let id = dropped.id();
    drop(dropped);
    drop(scene.forget_child(id));
    assert!(wait_until(WAIT, || monitor.subscriber_count(&project.style) == 1));
    assert_eq!(monitor.watched_paths(), vec![project.style.clone()]);

    // Last subscriber gone: the watch is cancelled.
    let id = kept.id();
    drop(kept);
    drop(scene.forget_child(id));
    assert!(wait_until(WAIT, || monitor.watched_paths().is_empty()));
    assert!(!monitor.is_watch_attached(&project.style));
    assert_eq!(monitor.owner_count(), 1);
    monitor.stop();
}

#[test]
fn test_unresolvable_identifier_is_skipped() {
    let project = Project::new();
    let node = MockNode::new(
        OwnerKind::Node,
        &["missing.css", "jar:file:/app.jar!/theme.css", "https://cdn/x.css"],
    );
    let monitor = project.builder().restrict_to_node(as_owner(&node)).build();

    monitor.start().unwrap();
    assert_eq!(monitor.state(), MonitorState::Running);
    assert!(monitor.watched_paths().is_empty());
    assert_eq!(monitor.attached_watch_count(), 0);
    assert_eq!(monitor.owner_count(), 1);
    monitor.stop();
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_stop_is_idempotent() {
    let project = Project::new();
    let window = MockNode::new(OwnerKind::Window, &["style.css"]);
    let monitor = project.builder().restrict_to_window(as_owner(&window)).build();
    monitor.start().unwrap();

    monitor.stop();
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(monitor.watched_paths().is_empty());
    monitor.stop();
    assert_eq!(monitor.state(), MonitorState::Stopped);

    // Terminal: start does nothing.
    monitor.start().unwrap();
    assert_eq!(monitor.state(), MonitorState::Stopped);

    std::fs::write(&project.style, ".late {}").unwrap();
    settle();
    assert!(window.applied().is_empty());
}

#[test]
fn test_stop_before_start() {
    let monitor = MonitorBuilder::new().no_default_resolvers().build();
    assert_eq!(monitor.state(), MonitorState::Created);
    monitor.stop();
    monitor.stop();
    assert_eq!(monitor.state(), MonitorState::Stopped);
    monitor.start().unwrap();
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[test]
fn test_second_start_is_noop() {
    let project = Project::new();
    let node = MockNode::new(OwnerKind::Node, &["style.css"]);
    let monitor = project.builder().restrict_to_node(as_owner(&node)).build();
    monitor.start().unwrap();
    monitor.start().unwrap();
    assert_eq!(monitor.subscriber_count(&project.style), 1);
    assert_eq!(node.observer_count(), 1);
    monitor.stop();
}

#[test]
fn test_owner_dropped_after_stop_is_harmless() {
    let project = Project::new();
    let node = MockNode::new(OwnerKind::Node, &["style.css"]);
    let monitor = project.builder().restrict_to_node(as_owner(&node)).build();
    monitor.start().unwrap();
    monitor.stop();
    drop(node);
    assert_eq!(monitor.owner_count(), 0);
}

// =============================================================================
// Incremental discovery
// =============================================================================

#[test]
fn test_stylesheet_list_change_is_diffed() {
    let project = Project::new();
    let other = project.sheet("other.css", ".o {}");
    let node = MockNode::new(OwnerKind::Node, &["style.css"]);
    let monitor = project.builder().restrict_to_node(as_owner(&node)).build();
    monitor.start().unwrap();

    node.set_stylesheets(&["other.css"]);
    assert_eq!(monitor.watched_paths(), vec![other.clone()]);

    node.set_stylesheets(&["style.css", "other.css"]);
    let mut expected = vec![project.style.clone(), other.clone()];
    expected.sort();
    assert_eq!(monitor.watched_paths(), expected);

    // Unchanged entries keep their subscription.
    node.set_stylesheets(&["other.css", "style.css"]);
    assert_eq!(monitor.subscriber_count(&other), 1);
    assert_eq!(monitor.subscriber_count(&project.style), 1);

    node.set_stylesheets(&[]);
    assert!(monitor.watched_paths().is_empty());
    monitor.stop();
}

#[test]
fn test_children_added_and_removed() {
    let project = Project::new();
    let extra = project.sheet("extra.css", ".x {}");
    let window = MockNode::new(OwnerKind::Window, &["style.css"]);
    let monitor = project.builder().restrict_to_window(as_owner(&window)).build();
    monitor.start().unwrap();

    let leaf = MockNode::new(OwnerKind::Node, &["extra.css"]);
    let child = MockNode::with_children(OwnerKind::Scene, &[], vec![leaf.clone()]);
    window.add_child(child.clone());
    assert_eq!(monitor.subscriber_count(&extra), 1);
    assert_eq!(monitor.owner_count(), 3);

    // Nested additions are followed too.
    let nested = MockNode::new(OwnerKind::Node, &["style.css"]);
    leaf.add_child(nested.clone());
    assert_eq!(monitor.subscriber_count(&project.style), 2);

    let removed = window.remove_child(child.id()).unwrap();
    assert_eq!(monitor.subscriber_count(&extra), 0);
    assert_eq!(monitor.subscriber_count(&project.style), 1);
    assert_eq!(monitor.owner_count(), 1);

    // Re-attaching picks the subtree up again without duplicate observers.
    window.add_child(removed);
    assert_eq!(monitor.subscriber_count(&extra), 1);
    assert_eq!(leaf.observer_count(), 1);
    monitor.stop();
}

#[test]
fn test_detached_subtree_is_no_longer_followed() {
    let project = Project::new();
    let extra = project.sheet("extra.css", ".x {}");
    let window = MockNode::new(OwnerKind::Window, &[]);
    let monitor = project.builder().restrict_to_window(as_owner(&window)).build();
    monitor.start().unwrap();

    let panel = MockNode::new(OwnerKind::Node, &[]);
    window.add_child(panel.clone());
    assert_eq!(monitor.owner_count(), 2);

    // The application keeps the panel around after removing it.
    let removed = window.remove_child(panel.id()).unwrap();
    assert_eq!(removed.observer_count(), 0);

    removed.add_child(MockNode::new(OwnerKind::Node, &["style.css"]));
    removed.set_stylesheets(&["extra.css"]);
    assert_eq!(monitor.subscriber_count(&project.style), 0);
    assert_eq!(monitor.subscriber_count(&extra), 0);
    assert_eq!(monitor.owner_count(), 1);

    // Back in scope, it is followed again.
    window.add_child(removed.clone());
    assert_eq!(monitor.subscriber_count(&extra), 1);
    assert_eq!(monitor.subscriber_count(&project.style), 1);
    assert_eq!(monitor.owner_count(), 3);
    monitor.stop();
}

#[test]
fn test_edit_during_sync_keeps_latest_list() {
    let project = Project::new();
    let extra = project.sheet("extra.css", ".x {}");
    let other = project.sheet("other.css", ".o {}");
    let node = MockNode::new(OwnerKind::Node, &["style.css"]);

    // Resolving "extra.css" triggers a second edit that finishes first.
    let armed = Arc::new(AtomicBool::new(false));
    let target = Arc::downgrade(&node);
    let resources = project.root.join("src/main/resources");
    let trigger = Arc::clone(&armed);
    let monitor = project
        .builder()
        .no_default_resolvers()
        .add_resolver(move |id: &str| {
            if id == "extra.css"
                && trigger.swap(false, Ordering::SeqCst)
                && let Some(node) = target.upgrade()
            {
                node.set_stylesheets(&["other.css"]);
            }
            let path = resources.join(id);
            path.is_file().then_some(path)
        })
        .restrict_to_node(as_owner(&node))
        .build();
    monitor.start().unwrap();
    assert_eq!(monitor.watched_paths(), vec![project.style.clone()]);

    armed.store(true, Ordering::SeqCst);
    node.set_stylesheets(&["extra.css"]);

    assert_eq!(monitor.watched_paths(), vec![other]);
    assert_eq!(monitor.subscriber_count(&extra), 0);
    monitor.stop();
}

#[test]
fn test_future_windows_are_monitored() {
    let project = Project::new();
    let first = MockNode::new(OwnerKind::Window, &["style.css"]);
    let windows = MockWindows::new(vec![first.clone()]);
    let monitor = project.builder().windows(windows.clone()).build();
    monitor.start().unwrap();
    assert_eq!(monitor.subscriber_count(&project.style), 1);

    let later = MockNode::new(OwnerKind::Window, &["style.css"]);
    windows.open(later.clone());
    assert_eq!(monitor.subscriber_count(&project.style), 2);

    std::fs::write(&project.style, ".n {}").unwrap();
    assert!(wait_until(WAIT, || later.applied().len() == 1 && first.applied().len() == 1));

    windows.close(first.id());
    assert_eq!(monitor.subscriber_count(&project.style), 1);
    monitor.stop();
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_queue_executor_defers_reload() {
    let project = Project::new();
    let executor = Arc::new(QueueExecutor::new());
    let node = MockNode::new(OwnerKind::Node, &["style.css"]);
    let monitor = project
        .builder()
        .executor(executor.clone())
        .restrict_to_node(as_owner(&node))
        .build();
    monitor.start().unwrap();

    std::fs::write(&project.style, ".q {}").unwrap();
    assert!(wait_until(WAIT, || executor.pending() == 1));
    assert!(node.applied().is_empty());

    assert_eq!(executor.run_pending(), 1);
    assert_eq!(&*node.applied()[0].content, ".q {}");
    monitor.stop();
}

#[test]
fn test_custom_resolver_runs_first() {
    let project = Project::new();
    let theme = write_sheet(&project.root, "themes/dark.css", ".dark {}");
    let target = theme.clone();
    let node = MockNode::new(OwnerKind::Node, &["theme:dark", "style.css"]);
    let monitor = project
        .builder()
        .add_resolver(move |id: &str| (id == "theme:dark").then(|| target.clone()))
        .restrict_to_node(as_owner(&node))
        .build();
    monitor.start().unwrap();

    let mut expected = vec![theme, project.style.clone()];
    expected.sort();
    assert_eq!(monitor.watched_paths(), expected);
    monitor.stop();
}

#[test]
fn test_no_default_resolvers() {
    let project = Project::new();
    let node = MockNode::new(OwnerKind::Node, &["style.css"]);
    let monitor = project
        .builder()
        .no_default_resolvers()
        .restrict_to_node(as_owner(&node))
        .build();
    monitor.start().unwrap();
    assert!(monitor.watched_paths().is_empty());
    monitor.stop();
}

#[test]
fn test_scope_precedence() {
    let window = as_owner(&MockNode::new(OwnerKind::Window, &[]));
    let node = as_owner(&MockNode::new(OwnerKind::Node, &[]));
    let windows = MockWindows::new(Vec::new());

    let builder = MonitorBuilder::new()
        .windows(windows)
        .restrict_to_node(node.clone())
        .restrict_to_window(window.clone());
    assert!(matches!(builder.scope(), Some(Scope::Window(w)) if w.id() == window.id()));

    let builder = MonitorBuilder::new().restrict_to_node(node.clone());
    assert!(matches!(builder.scope(), Some(Scope::Node(_))));

    assert!(MonitorBuilder::new().scope().is_none());
}

#[test]
fn test_default_chain_puts_custom_first() {
    let builder = MonitorBuilder::new()
        .project_root("/proj")
        .add_resolver(|_: &str| None::<PathBuf>);
    assert_eq!(builder.resolver_chain().len(), 1 + ResolverKind::DEFAULTS.len());

    let shared: Arc<dyn crate::resolve::PathResolver> = Arc::new(|_: &str| None::<PathBuf>);
    let builder = MonitorBuilder::new()
        .no_default_resolvers()
        .add_shared_resolver(shared.clone())
        .add_shared_resolver(shared);
    assert_eq!(builder.resolver_chain().len(), 1);

    let builder = MonitorBuilder::new()
        .project_root("/proj")
        .resolver_kinds([ResolverKind::Maven, ResolverKind::Maven]);
    assert_eq!(builder.resolver_chain().len(), 1);
}

#[test]
fn test_disabled_returns_inert_handle() {
    let project = Project::new();
    let node = MockNode::new(OwnerKind::Node, &["style.css"]);
    let switches = EnvSwitches {
        disabled: true,
        ..EnvSwitches::default()
    };

    let handle = project
        .builder()
        .restrict_to_node(as_owner(&node))
        .start_with(&switches)
        .unwrap();
    assert!(handle.is_inert());
    assert_eq!(node.observer_count(), 0);
    handle.stop();
}

#[test]
fn test_stop_handle_stops_controller() {
    let project = Project::new();
    let node = MockNode::new(OwnerKind::Node, &["style.css"]);
    let handle = project
        .builder()
        .restrict_to_node(as_owner(&node))
        .start_with(&EnvSwitches::default())
        .unwrap();

    let controller = handle.controller().unwrap().clone();
    assert_eq!(controller.state(), MonitorState::Running);
    assert_eq!(controller.subscriber_count(Path::new(&project.style)), 1);

    handle.stop();
    handle.stop();
    assert_eq!(controller.state(), MonitorState::Stopped);
}
