//! Integration tests for scoped execution with a CodeQL installation.

use async_trait::async_trait;
use codeql_env_core::tools::{
    HOME_VARIABLE, PATH_ENTRY, ToolInstallation, ToolInstallations, ToolInstaller,
};
use codeql_env_core::{
    BodyError, BufferSink, ContainerDecorators, Environment, EnvironmentExpander,
    EnvironmentOverlay, Error, ExecutionContext, Launcher, LauncherDecorator, Node, SkipReason,
    ToolResolution, WithCodeQL,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug)]
struct AnalysisFailed(&'static str);

impl std::fmt::Display for AnalysisFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "analysis failed: {}", self.0)
    }
}

impl std::error::Error for AnalysisFailed {}

fn registry() -> Arc<ToolInstallations> {
    Arc::new(ToolInstallations::new(vec![
        ToolInstallation::new("codeql-2.9", "/opt/codeql/"),
        ToolInstallation::new("codeql-home", "${AGENT_HOME}/codeql"),
    ]))
}

fn agent() -> Arc<Node> {
    Arc::new(
        Node::new("agent-1", "/srv/agent")
            .with_system_property("os.name", "Linux")
            .with_tool_location("codeql-2.9", "/mnt/agent/codeql-2.9"),
    )
}

fn context(sink: &Arc<BufferSink>) -> ExecutionContext {
    let mut env = Environment::new();
    env.set("PATH", "/usr/local/bin:/usr/bin");
    env.set("AGENT_HOME", "/home/agent");
    ExecutionContext::new(env, sink.clone()).with_node(agent())
}

#[tokio::test]
async fn resolved_home_is_translated_for_node() {
    let sink = Arc::new(BufferSink::new());
    let resolution = WithCodeQL::new(registry())
        .resolve(Some("codeql-2.9"), &context(&sink))
        .await
        .unwrap();

    assert_eq!(resolution.home(), "/mnt/agent/codeql-2.9");
}

#[tokio::test]
async fn resolved_home_is_expanded_against_environment() {
    let sink = Arc::new(BufferSink::new());
    let resolution = WithCodeQL::new(registry())
        .resolve(Some("codeql-home"), &context(&sink))
        .await
        .unwrap();

    assert_eq!(resolution.home(), "/home/agent/codeql");
}

#[tokio::test]
async fn container_execution_never_resolves_and_overlay_is_empty() {
    let sink = Arc::new(BufferSink::new());
    let ctx = context(&sink).with_launcher(
        Launcher::host()
            .with_decorator(LauncherDecorator::new("timestamps"))
            .with_decorator(LauncherDecorator::new("kubernetes")),
    );
    // An empty registry would fail any lookup
    let wrapper = WithCodeQL::new(Arc::new(ToolInstallations::default()));

    for name in ["codeql-2.9", "does-not-exist"] {
        let resolution = wrapper.resolve(Some(name), &ctx).await.unwrap();
        assert_eq!(resolution, ToolResolution::Skipped(SkipReason::InContainer));
        let overlay = resolution.overlay();
        assert_eq!(overlay.len(), 2);
        assert_eq!(overlay.get(PATH_ENTRY), Some(""));
        assert_eq!(overlay.get(HOME_VARIABLE), Some(""));
    }
}

#[tokio::test]
async fn empty_name_skips_regardless_of_container() {
    let sink = Arc::new(BufferSink::new());
    let wrapper = WithCodeQL::new(registry());
    let host = context(&sink);
    let docker = context(&sink).with_launcher(Launcher::host().with_decorator(LauncherDecorator::new("docker")));

    for ctx in [&host, &docker] {
        for name in [None, Some("")] {
            let resolution = wrapper.resolve(name, ctx).await.unwrap();
            assert_eq!(resolution, ToolResolution::Skipped(SkipReason::NoInstallationName));
            assert_eq!(resolution.overlay().get(PATH_ENTRY), Some(""));
            assert_eq!(resolution.overlay().get(HOME_VARIABLE), Some(""));
        }
    }
}

#[tokio::test]
async fn skipped_overlay_leaves_path_and_clears_home_variable() {
    let sink = Arc::new(BufferSink::new());
    let mut env = Environment::new();
    env.set("PATH", "/usr/bin");
    env.set(HOME_VARIABLE, "/stale/codeql");
    let ctx = ExecutionContext::new(env, sink.clone());

    let execution = WithCodeQL::new(registry())
        .start(None, &ctx, |child| async move {
            let env = child.effective_environment();
            assert_eq!(env.get("PATH"), Some("/usr/bin"));
            assert!(!env.contains(HOME_VARIABLE));
            Ok::<_, BodyError>(())
        })
        .await
        .unwrap();

    execution.await.unwrap();
}

#[tokio::test]
async fn unknown_installation_fails_before_dispatch() {
    let sink = Arc::new(BufferSink::new());
    let dispatched = Arc::new(AtomicBool::new(false));
    let flag = dispatched.clone();

    let result = WithCodeQL::new(registry())
        .start(Some("codeql-3.0"), &context(&sink), move |_| async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, BodyError>(())
        })
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::InstallationNotFound { ref name } if name == "codeql-3.0"));
    assert!(err.is_configuration_fault());
    tokio::task::yield_now().await;
    assert!(!dispatched.load(Ordering::SeqCst));
}

#[tokio::test]
async fn success_discards_inner_value() {
    let sink = Arc::new(BufferSink::new());
    let execution = WithCodeQL::new(registry())
        .start(Some("codeql-2.9"), &context(&sink), |_| async {
            Ok::<_, BodyError>("sarif-results.sarif".to_string())
        })
        .await
        .unwrap();

    // The completion type carries no value, the SARIF path is dropped
    assert!(execution.await.is_ok());
}

#[tokio::test]
async fn failure_is_forwarded_unchanged() {
    let sink = Arc::new(BufferSink::new());
    let execution = WithCodeQL::new(registry())
        .start(Some("codeql-2.9"), &context(&sink), |_| async {
            Err::<(), _>(AnalysisFailed("database create"))
        })
        .await
        .unwrap();

    let err = execution.await.unwrap_err();
    assert_eq!(err.to_string(), "analysis failed: database create");
    let original = err.downcast_ref::<AnalysisFailed>().unwrap();
    assert_eq!(original.0, "database create");
}

#[tokio::test]
async fn outer_overlays_stay_visible_to_nested_work() {
    let sink = Arc::new(BufferSink::new());
    let outer = EnvironmentExpander::of(
        EnvironmentOverlay::new()
            .with("PATH+MAVEN", "/opt/maven/bin")
            .with("MAVEN_HOME", "/opt/maven")
            .with(HOME_VARIABLE, "/outer/codeql"),
    );
    let ctx = context(&sink).with_expander(outer);

    let execution = WithCodeQL::new(registry())
        .start(Some("codeql-2.9"), &ctx, |child| async move {
            let env = child.effective_environment();
            assert_eq!(
                env.get("PATH"),
                Some("/mnt/agent/codeql-2.9:/opt/maven/bin:/usr/local/bin:/usr/bin")
            );
            assert_eq!(env.get("MAVEN_HOME"), Some("/opt/maven"));
            assert_eq!(env.get(HOME_VARIABLE), Some("/mnt/agent/codeql-2.9"));
            Ok::<_, BodyError>(())
        })
        .await
        .unwrap();

    execution.await.unwrap();
    // The enclosing scope still sees its own binding
    assert_eq!(ctx.effective_environment().get(HOME_VARIABLE), Some("/outer/codeql"));
}

#[tokio::test]
async fn custom_container_identities_are_honored() {
    let sink = Arc::new(BufferSink::new());
    let ctx = context(&sink).with_launcher(Launcher::host().with_decorator(LauncherDecorator::new("docker")));
    let wrapper = WithCodeQL::new(registry()).with_container_decorators(ContainerDecorators::new(["podman"]));

    let resolution = wrapper.resolve(Some("codeql-2.9"), &ctx).await.unwrap();
    assert!(matches!(resolution, ToolResolution::Resolved(_)));
}

struct RecordingInstaller {
    calls: AtomicUsize,
}

#[async_trait]
impl ToolInstaller for RecordingInstaller {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn description(&self) -> &'static str {
        "Records installation requests"
    }

    async fn perform_installation(
        &self,
        installation: &ToolInstallation,
        node: &Node,
    ) -> codeql_env_core::Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(node.root().join("tools").join(installation.name()).join("codeql"))
    }
}

#[tokio::test]
async fn installer_provides_home_when_node_has_no_location() {
    let sink = Arc::new(BufferSink::new());
    let installer = Arc::new(RecordingInstaller {
        calls: AtomicUsize::new(0),
    });
    let installations = Arc::new(ToolInstallations::new(vec![
        ToolInstallation::new("auto", "").with_installer("2.9.0"),
        ToolInstallation::new("codeql-2.9", "/opt/codeql").with_installer("2.9.0"),
    ]));
    let wrapper = WithCodeQL::new(installations).with_installer(installer.clone());

    let resolution = wrapper.resolve(Some("auto"), &context(&sink)).await.unwrap();
    assert_eq!(resolution.home(), "/srv/agent/tools/auto/codeql");
    assert_eq!(installer.calls.load(Ordering::SeqCst), 1);

    // A node-specific location takes precedence over installing
    let resolution = wrapper.resolve(Some("codeql-2.9"), &context(&sink)).await.unwrap();
    assert_eq!(resolution.home(), "/mnt/agent/codeql-2.9");
    assert_eq!(installer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn windows_node_prepends_to_existing_path_spelling() {
    let sink = Arc::new(BufferSink::new());
    let mut env = Environment::new();
    env.set("Path", "C:\\Windows\\system32");
    let node = Node::new("win-1", "C:\\agent")
        .with_system_property("os.name", "Windows Server 2019");
    let ctx = ExecutionContext::new(env, sink).with_node(Arc::new(node));
    let installations = Arc::new(ToolInstallations::new(vec![ToolInstallation::new(
        "codeql",
        "C:\\codeql\\",
    )]));

    let execution = WithCodeQL::new(installations)
        .start(Some("codeql"), &ctx, |child| async move {
            let env = child.effective_environment();
            assert_eq!(env.get("Path"), Some("C:\\codeql;C:\\Windows\\system32"));
            assert!(!env.contains("PATH"));
            assert_eq!(env.get(HOME_VARIABLE), Some("C:\\codeql"));
            Ok::<_, BodyError>(())
        })
        .await
        .unwrap();

    execution.await.unwrap();
}
