//! Ambient state of one unit of pipeline work.
//!
//! An [`ExecutionContext`] carries the node the work runs on, the inherited
//! environment, the active [`EnvironmentExpander`], the console sink for
//! user-facing messages, and the chain of launcher decorators wrapping the
//! work (used to detect container execution).

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;

use crate::environment::{EnvConvention, Environment, EnvironmentExpander};
use crate::node::Node;

/// Destination for human-readable console lines of a unit of work.
pub trait OutputSink: Send + Sync {
    /// Print one line.
    fn println(&self, line: &str);
}

/// Writes console lines to the process stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl OutputSink for StderrSink {
    fn println(&self, line: &str) {
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }
}

/// Collects console lines in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines printed so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Whether any printed line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }
}

impl OutputSink for BufferSink {
    fn println(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// One decorator wrapping the launcher that starts processes for the work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherDecorator {
    id: String,
    isolated: bool,
}

impl LauncherDecorator {
    /// A decorator identified by `id`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            isolated: false,
        }
    }

    /// A decorator that declares it runs processes inside an isolated container.
    #[must_use]
    pub fn isolated(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            isolated: true,
        }
    }

    /// Decorator identity.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the decorator declared container isolation itself.
    #[must_use]
    pub fn is_isolated(&self) -> bool {
        self.isolated
    }
}

/// Chain of launcher decorators, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Launcher {
    decorators: Vec<LauncherDecorator>,
}

impl Launcher {
    /// A plain host launcher with no decorators.
    #[must_use]
    pub fn host() -> Self {
        Self::default()
    }

    /// Wrap the chain in one more (inner) decorator.
    #[must_use]
    pub fn with_decorator(mut self, decorator: LauncherDecorator) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Decorators, outermost first.
    #[must_use]
    pub fn decorators(&self) -> &[LauncherDecorator] {
        &self.decorators
    }
}

/// Decorator identities that mean "processes run inside a container".
///
/// Matching is exact on the decorator id; a decorator flagged as isolated
/// always counts as a container regardless of its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDecorators {
    identities: BTreeSet<String>,
}

impl Default for ContainerDecorators {
    fn default() -> Self {
        Self::new(["docker", "kubernetes"])
    }
}

impl ContainerDecorators {
    /// Recognize the given identities.
    #[must_use]
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identities: identities.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `decorator` runs processes in a container.
    #[must_use]
    pub fn is_container(&self, decorator: &LauncherDecorator) -> bool {
        decorator.is_isolated() || self.identities.contains(decorator.id())
    }

    /// Whether any decorator in `launcher` runs processes in a container.
    #[must_use]
    pub fn detect(&self, launcher: &Launcher) -> bool {
        launcher.decorators().iter().any(|d| {
            let container = self.is_container(d);
            tracing::trace!(decorator = d.id(), container, "Inspecting launcher decorator");
            container
        })
    }
}

/// Ambient state of one unit of pipeline work.
#[derive(Clone)]
pub struct ExecutionContext {
    node: Option<Arc<Node>>,
    environment: Environment,
    expander: Option<EnvironmentExpander>,
    console: Arc<dyn OutputSink>,
    launcher: Launcher,
}

impl ExecutionContext {
    /// Context with the given inherited environment and console, no node,
    /// no active expander and a plain host launcher.
    #[must_use]
    pub fn new(environment: Environment, console: Arc<dyn OutputSink>) -> Self {
        Self {
            node: None,
            environment,
            expander: None,
            console,
            launcher: Launcher::host(),
        }
    }

    /// Set the node the work runs on.
    #[must_use]
    pub fn with_node(mut self, node: Arc<Node>) -> Self {
        self.node = Some(node);
        self
    }

    /// Set the launcher decorator chain.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Set the active expander.
    #[must_use]
    pub fn with_expander(mut self, expander: EnvironmentExpander) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Node the work runs on, if it could be determined.
    #[must_use]
    pub fn node(&self) -> Option<&Arc<Node>> {
        self.node.as_ref()
    }

    /// Inherited environment, without the active expander applied.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Active expander contributed by enclosing scopes.
    #[must_use]
    pub fn expander(&self) -> Option<&EnvironmentExpander> {
        self.expander.as_ref()
    }

    /// Console sink.
    #[must_use]
    pub fn console(&self) -> &Arc<dyn OutputSink> {
        &self.console
    }

    /// Launcher decorator chain.
    #[must_use]
    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    /// Variable rules of the node, or of this machine when no node is known.
    #[must_use]
    pub fn env_convention(&self) -> EnvConvention {
        self.node
            .as_ref()
            .map_or_else(EnvConvention::host, |node| node.env_convention())
    }

    /// Environment visible to the work: the inherited environment with every
    /// enclosing overlay applied.
    #[must_use]
    pub fn effective_environment(&self) -> Environment {
        match &self.expander {
            Some(expander) => expander.apply(&self.environment, self.env_convention()),
            None => self.environment.clone(),
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("node", &self.node.as_ref().map(|n| n.name.clone()))
            .field("environment", &self.environment.len())
            .field("expander", &self.expander.as_ref().map(EnvironmentExpander::depth))
            .field("launcher", &self.launcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentOverlay;

    #[test]
    fn test_container_detection_exact_match() {
        let policy = ContainerDecorators::default();
        assert!(!policy.detect(&Launcher::host()));
        assert!(policy.detect(&Launcher::host().with_decorator(LauncherDecorator::new("docker"))));
        assert!(policy.detect(
            &Launcher::host()
                .with_decorator(LauncherDecorator::new("timestamps"))
                .with_decorator(LauncherDecorator::new("kubernetes"))
        ));
        // Identities are matched exactly, not by substring
        assert!(!policy.detect(&Launcher::host().with_decorator(LauncherDecorator::new("docker-compose-logs"))));
    }

    #[test]
    fn test_isolated_flag_counts_as_container() {
        let policy = ContainerDecorators::new(Vec::<String>::new());
        let launcher = Launcher::host().with_decorator(LauncherDecorator::isolated("podman"));
        assert!(policy.detect(&launcher));
    }

    #[test]
    fn test_effective_environment_applies_expander() {
        let mut env = Environment::new();
        env.set("PATH", "/usr/bin");
        let node = Arc::new(Node::new("agent", "/srv/agent"));
        let ctx = ExecutionContext::new(env, Arc::new(BufferSink::new()))
            .with_node(node)
            .with_expander(EnvironmentExpander::of(
                EnvironmentOverlay::new().with("PATH+X", "/opt/x"),
            ));

        assert_eq!(ctx.effective_environment().get("PATH"), Some("/opt/x:/usr/bin"));
        assert_eq!(ctx.environment().get("PATH"), Some("/usr/bin"));
    }

    #[test]
    fn test_buffer_sink_collects_lines() {
        let sink = BufferSink::new();
        sink.println("[withCodeQL] hello");
        assert_eq!(sink.lines(), vec!["[withCodeQL] hello".to_string()]);
        assert!(sink.contains("hello"));
    }
}
