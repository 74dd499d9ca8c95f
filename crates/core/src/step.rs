//! Scoped execution of nested work with a CodeQL installation on `PATH`.
//!
//! [`WithCodeQL`] resolves a named installation for the current node (or
//! skips resolution when no name is given or the work runs inside a
//! container), builds an [`EnvironmentOverlay`] exposing the installation,
//! and dispatches the nested work on its own task with the overlay composed
//! into the context's expander. [`WithCodeQL::start`] returns as soon as the
//! work is dispatched; the returned [`BodyExecution`] resolves exactly once
//! with the work's outcome.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::context::{ContainerDecorators, ExecutionContext};
use crate::environment::{EnvironmentExpander, EnvironmentOverlay};
use crate::node::Node;
use crate::tools::{ToolInstallation, ToolInstallations, ToolInstaller, home_overlay};
use crate::{Error, Result};

/// Failure raised by nested work, forwarded without wrapping.
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of nested work as reported by the wrapper. Success carries no value.
pub type Completion = std::result::Result<(), BodyError>;

/// Prefix of every console line printed by the wrapper.
const CONSOLE_PREFIX: &str = "[withCodeQL]";

/// Why no installation override is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No installation name was given
    NoInstallationName,
    /// The work runs inside a container where host installations are invisible
    InContainer,
}

/// Result of resolving the requested installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResolution {
    /// The installation was found and specialized for the node and environment
    Resolved(ToolInstallation),
    /// Resolution was skipped; the overlay carries empty values
    Skipped(SkipReason),
}

impl ToolResolution {
    /// Home exposed to nested work; empty when skipped.
    #[must_use]
    pub fn home(&self) -> &str {
        match self {
            Self::Resolved(installation) => installation.home(),
            Self::Skipped(_) => "",
        }
    }

    /// Overlay exposing the resolved home to nested work.
    ///
    /// Both keys are always present; they carry empty values when resolution
    /// was skipped.
    #[must_use]
    pub fn overlay(&self) -> EnvironmentOverlay {
        match self {
            Self::Resolved(installation) => installation.build_env_vars(),
            Self::Skipped(_) => home_overlay(""),
        }
    }
}

/// Wraps nested work so that a CodeQL installation is on its `PATH`.
pub struct WithCodeQL {
    installations: Arc<ToolInstallations>,
    containers: ContainerDecorators,
    installer: Option<Arc<dyn ToolInstaller>>,
}

impl WithCodeQL {
    /// Create a wrapper resolving names through `installations`.
    #[must_use]
    pub fn new(installations: Arc<ToolInstallations>) -> Self {
        Self {
            installations,
            containers: ContainerDecorators::default(),
            installer: None,
        }
    }

    /// Use a different set of container decorator identities.
    #[must_use]
    pub fn with_container_decorators(mut self, containers: ContainerDecorators) -> Self {
        self.containers = containers;
        self
    }

    /// Install installations that name an installer before using them.
    #[must_use]
    pub fn with_installer(mut self, installer: Arc<dyn ToolInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Resolve `installation_name` for the context, or decide to skip it.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if the installation is not registered or
    /// the context has no node, and an I/O fault if automatic installation
    /// fails.
    pub async fn resolve(
        &self,
        installation_name: Option<&str>,
        ctx: &ExecutionContext,
    ) -> Result<ToolResolution> {
        let with_container = self.containers.detect(ctx.launcher());
        debug!(installation = ?installation_name, with_container, "Setting up CodeQL");

        let name = match installation_name {
            Some(name) if !name.is_empty() => name,
            _ => {
                ctx.console()
                    .println(&format!("{CONSOLE_PREFIX} No CodeQL installation specified!"));
                info!("No CodeQL installation specified, relying on the default PATH");
                return Ok(ToolResolution::Skipped(SkipReason::NoInstallationName));
            }
        };

        if with_container {
            ctx.console().println(&format!(
                "{CONSOLE_PREFIX} WARNING: Specified CodeQL '{name}' cannot be installed, will be ignored. \
                 Step running within a container, tool installations are not available."
            ));
            warn!(installation = name, "Running in a container, ignoring CodeQL installation");
            return Ok(ToolResolution::Skipped(SkipReason::InContainer));
        }

        let installation = self.installations.resolve(name)?;
        let node = ctx.node().ok_or_else(|| {
            Error::node_unavailable("no node is associated with the current execution")
        })?;

        let installation = self
            .translate_for_node(&installation, node)
            .await?
            .for_environment(&ctx.effective_environment());

        ctx.console().println(&format!(
            "{CONSOLE_PREFIX} using CodeQL installation '{}'",
            installation.name()
        ));
        info!(
            installation = installation.name(),
            home = installation.home(),
            node = %node.name,
            "Resolved CodeQL installation"
        );
        Ok(ToolResolution::Resolved(installation))
    }

    /// Home of `installation` on `node`: the node's own location for it when
    /// configured, otherwise the result of automatic installation when the
    /// installation names an installer.
    async fn translate_for_node(
        &self,
        installation: &ToolInstallation,
        node: &Node,
    ) -> Result<ToolInstallation> {
        if node.tool_locations.contains_key(installation.name()) {
            return Ok(installation.for_node(node));
        }
        match (installation.installer(), &self.installer) {
            (Some(spec), Some(installer)) => {
                debug!(
                    installation = installation.name(),
                    id = %spec.id,
                    installer = installer.name(),
                    "Installing CodeQL before use"
                );
                let home = installer.perform_installation(installation, node).await?;
                Ok(installation.with_home(home.to_string_lossy()))
            }
            (Some(spec), None) => {
                warn!(
                    installation = installation.name(),
                    id = %spec.id,
                    "Installation names an installer but none is available"
                );
                Ok(installation.for_node(node))
            }
            (None, _) => Ok(installation.for_node(node)),
        }
    }

    /// Run `body` with the requested installation exposed in its environment.
    ///
    /// Resolution happens before anything is dispatched: if it fails the
    /// error is returned here and `body` never starts. Otherwise `body` is
    /// spawned with a child context whose expander includes the overlay, and
    /// the returned [`BodyExecution`] resolves with its outcome. The value
    /// produced by `body` is discarded; its error is forwarded unchanged.
    ///
    /// # Errors
    ///
    /// Returns any fault raised while resolving the installation.
    pub async fn start<F, Fut, T, E>(
        &self,
        installation_name: Option<&str>,
        ctx: &ExecutionContext,
        body: F,
    ) -> Result<BodyExecution>
    where
        F: FnOnce(ExecutionContext) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BodyError> + Send + 'static,
    {
        let resolution = self.resolve(installation_name, ctx).await?;
        let expander = EnvironmentExpander::merge(ctx.expander(), resolution.overlay());
        let child = ctx.clone().with_expander(expander);

        let (sender, receiver) = oneshot::channel();
        let task = tokio::spawn(async move {
            // Bound before the body so an aborted body is dropped first and
            // the receiver only observes cancellation once it is gone
            let reply = sender;
            let completion = match AssertUnwindSafe(body(child)).catch_unwind().await {
                Ok(Ok(_value)) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(payload) => {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_default();
                    Err(Box::new(Error::BodyPanicked { message }) as BodyError)
                }
            };
            if let Err(ref e) = completion {
                debug!(error = %e, "Nested execution failed");
            }
            let _ = reply.send(completion);
        });

        Ok(BodyExecution {
            receiver,
            abort: task.abort_handle(),
            resolution,
        })
    }
}

impl std::fmt::Debug for WithCodeQL {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WithCodeQL")
            .field("installations", &self.installations)
            .field("containers", &self.containers)
            .field("installer", &self.installer.as_ref().map(|i| i.name()))
            .finish()
    }
}

/// Handle to dispatched nested work.
///
/// Awaiting it yields the work's [`Completion`]. Dropping it does not stop
/// the work.
#[derive(Debug)]
pub struct BodyExecution {
    receiver: oneshot::Receiver<Completion>,
    abort: AbortHandle,
    resolution: ToolResolution,
}

impl BodyExecution {
    /// How the installation was resolved for this execution.
    #[must_use]
    pub fn resolution(&self) -> &ToolResolution {
        &self.resolution
    }

    /// Stop the nested work. The execution then completes with [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.abort.abort();
    }
}

impl Future for BodyExecution {
    type Output = Completion;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(completion)) => Poll::Ready(completion),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Box::new(Error::Cancelled))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BufferSink, Launcher, LauncherDecorator};
    use crate::environment::Environment;
    use crate::tools::{HOME_VARIABLE, PATH_ENTRY};

    fn context(sink: Arc<BufferSink>) -> ExecutionContext {
        let mut env = Environment::new();
        env.set("PATH", "/usr/bin");
        ExecutionContext::new(env, sink).with_node(Arc::new(Node::new("agent", "/srv/agent")))
    }

    fn wrapper() -> WithCodeQL {
        WithCodeQL::new(Arc::new(ToolInstallations::new(vec![ToolInstallation::new(
            "codeql",
            "/opt/codeql/",
        )])))
    }

    #[tokio::test]
    async fn test_resolved_overlay_reaches_body() {
        let sink = Arc::new(BufferSink::new());
        let ctx = context(sink.clone());

        let execution = wrapper()
            .start(Some("codeql"), &ctx, |child| async move {
                let env = child.effective_environment();
                assert_eq!(env.get("PATH"), Some("/opt/codeql:/usr/bin"));
                assert_eq!(env.get(HOME_VARIABLE), Some("/opt/codeql"));
                Ok::<_, BodyError>(42)
            })
            .await
            .unwrap();

        assert_eq!(execution.resolution().home(), "/opt/codeql");
        execution.await.unwrap();
        assert!(sink.contains("using CodeQL installation 'codeql'"));
        // The caller's context is untouched
        assert_eq!(ctx.effective_environment().get("PATH"), Some("/usr/bin"));
    }

    #[tokio::test]
    async fn test_skipped_resolution_overlay_is_empty() {
        let sink = Arc::new(BufferSink::new());
        let ctx = context(sink.clone());
        let resolution = wrapper().resolve(None, &ctx).await.unwrap();

        assert_eq!(resolution, ToolResolution::Skipped(SkipReason::NoInstallationName));
        let overlay = resolution.overlay();
        assert_eq!(overlay.get(PATH_ENTRY), Some(""));
        assert_eq!(overlay.get(HOME_VARIABLE), Some(""));
        assert!(sink.contains("No CodeQL installation specified!"));
    }

    #[tokio::test]
    async fn test_container_skips_resolution() {
        let sink = Arc::new(BufferSink::new());
        let ctx = context(sink.clone())
            .with_launcher(Launcher::host().with_decorator(LauncherDecorator::new("docker")));

        let resolution = wrapper().resolve(Some("missing"), &ctx).await.unwrap();
        assert_eq!(resolution, ToolResolution::Skipped(SkipReason::InContainer));
        assert!(sink.contains("WARNING: Specified CodeQL 'missing' cannot be installed"));
    }

    #[tokio::test]
    async fn test_missing_node_is_configuration_fault() {
        let ctx = ExecutionContext::new(Environment::new(), Arc::new(BufferSink::new()));
        let err = wrapper().resolve(Some("codeql"), &ctx).await.unwrap_err();
        assert!(matches!(err, Error::NodeUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_cancel_resolves_with_cancelled() {
        let ctx = context(Arc::new(BufferSink::new()));
        let execution = wrapper()
            .start(Some("codeql"), &ctx, |_| async {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok::<_, BodyError>(())
            })
            .await
            .unwrap();

        execution.cancel();
        let err = execution.await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_body_is_dropped_before_completion() {
        use std::sync::atomic::{AtomicBool, Ordering};

        struct SetOnDrop(Arc<AtomicBool>);

        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let resource = SetOnDrop(Arc::clone(&dropped));
        let ctx = context(Arc::new(BufferSink::new()));
        let execution = wrapper()
            .start(None, &ctx, move |_| async move {
                let _resource = resource;
                std::future::pending::<()>().await;
                Ok::<_, BodyError>(())
            })
            .await
            .unwrap();

        execution.cancel();
        assert!(execution.await.is_err());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_body_is_reported() {
        let ctx = context(Arc::new(BufferSink::new()));
        let execution = wrapper()
            .start(None, &ctx, |_| async {
                if true {
                    panic!("boom");
                }
                Ok::<_, BodyError>(())
            })
            .await
            .unwrap();

        let err = execution.await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::BodyPanicked { message }) if message == "boom"
        ));
    }
}
