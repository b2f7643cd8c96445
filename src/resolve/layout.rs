use std::path::{Component, Path, PathBuf};

use super::{Identifier, PathResolver, ResolverKind};

/// Build output directory → candidate source directories, in priority order.
type OutputMapping = (&'static str, &'static [&'static str]);

const MAVEN_OUTPUTS: &[OutputMapping] = &[
    ("target/classes", &["src/main/resources", "src/main/java"]),
    ("target/test-classes", &["src/test/resources", "src/test/java"]),
];

const GRADLE_OUTPUTS: &[OutputMapping] = &[
    ("build/resources/main", &["src/main/resources"]),
    ("build/resources/test", &["src/test/resources"]),
    ("out/production/resources", &["src/main/resources"]),
];

/// Directories searched for bare resource names, relative to the root.
const RESOURCE_DIRS: &[&str] = &["src/main/resources"];

/// Every known build output directory, for strategies that must skip them.
pub(super) fn is_build_output(path: &Path) -> bool {
    MAVEN_OUTPUTS
        .iter()
        .chain(GRADLE_OUTPUTS)
        .any(|(output, _)| split_at_output(path, output).is_some())
}

/// Maps files inside a build tool's output tree back to their sources.
///
/// Only candidates that exist on disk resolve, so a layout that does not
/// apply to the project falls through to the next strategy.
///
/// A source file created after its owner was attached is therefore not
/// watched until the owner's stylesheet list is resolved again (a
/// `stylesheets_changed` notification or a re-attach). Directory retry
/// only helps strategies that return paths which do not exist yet.
#[derive(Debug, Clone)]
pub struct BuildLayout {
    kind: ResolverKind,
    root: PathBuf,
    outputs: &'static [OutputMapping],
}

impl BuildLayout {
    /// `target/classes` style layout.
    pub fn maven(root: impl Into<PathBuf>) -> Self {
        Self {
            kind: ResolverKind::Maven,
            root: root.into(),
            outputs: MAVEN_OUTPUTS,
        }
    }

    /// `build/resources/main` style layout (including IDE output).
    pub fn gradle(root: impl Into<PathBuf>) -> Self {
        Self {
            kind: ResolverKind::Gradle,
            root: root.into(),
            outputs: GRADLE_OUTPUTS,
        }
    }

    pub fn kind(&self) -> ResolverKind {
        self.kind
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn from_output(&self, built: &Path) -> Option<PathBuf> {
        self.outputs.iter().find_map(|(output, sources)| {
            let (project, rest) = split_at_output(built, output)?;
            sources
                .iter()
                .map(|source| project.join(source).join(&rest))
                .find(|candidate| candidate.is_file())
        })
    }

    fn from_resource_name(&self, name: &Path) -> Option<PathBuf> {
        RESOURCE_DIRS
            .iter()
            .map(|dir| self.root.join(dir).join(name))
            .find(|candidate| candidate.is_file())
    }
}

impl PathResolver for BuildLayout {
    fn resolve(&self, identifier: &str) -> Option<PathBuf> {
        match Identifier::parse(identifier) {
            Identifier::File(path) => self.from_output(&path),
            Identifier::Relative(name) => self.from_resource_name(&name),
            Identifier::Opaque => None,
        }
    }
}

/// Split `path` around the last occurrence of the `output` directory
/// sequence, returning (project dir, path below output).
fn split_at_output(path: &Path, output: &str) -> Option<(PathBuf, PathBuf)> {
    let components: Vec<Component<'_>> = path.components().collect();
    let needle: Vec<Component<'_>> = Path::new(output).components().collect();
    if needle.is_empty() || components.len() <= needle.len() {
        return None;
    }

    let start = components
        .windows(needle.len())
        .rposition(|window| window == needle.as_slice())?;

    let project: PathBuf = components[..start].iter().collect();
    let rest: PathBuf = components[start + needle.len()..].iter().collect();
    if rest.as_os_str().is_empty() {
        return None;
    }
    Some((project, rest))
}
