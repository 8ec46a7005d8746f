//! Container lifecycle against the docker CLI.
//!
//! The gateway is the single source of truth for which workloads exist.
//! Nothing here is cached: every call re-queries the runtime.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use blackbox_core::{CONTAINER_PORT, DeployedWorkload, GpuClass, NAMESPACE_TAG, naming};

use crate::BoxFuture;
use crate::error::{RuntimeError, RuntimeResult};
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};

/// Label carrying the unsanitized model id.
pub const MODEL_ID_LABEL: &str = "blackbox.model_id";
/// Label carrying the GPU class the workload was provisioned for.
pub const GPU_CLASS_LABEL: &str = "blackbox.gpu_class";

/// Where the resource profile is mounted inside the container.
const PROFILE_MOUNT: &str = "/app/config.yaml";
const CACHE_MOUNT: &str = "/root/.cache/huggingface";

const LIST_FORMAT: &str =
    "{{.ID}}|{{.Names}}|{{.Status}}|{{.Ports}}|{{.Label \"blackbox.model_id\"}}|{{.Label \"blackbox.gpu_class\"}}";
const FIND_FORMAT: &str = "{{.ID}}|{{.Names}}|{{.Label \"blackbox.model_id\"}}";

/// Everything needed to start one model server.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionSpec {
    pub container_name: String,
    pub model_id: String,
    pub token: String,
    /// Host port mapped to the in-container server port.
    pub port: u16,
    /// Absolute path of the resource profile on the host.
    pub profile_path: PathBuf,
    pub gpu_class: GpuClass,
    /// Memory utilization ceiling (0.0–1.0) passed to the server.
    pub ceiling: f64,
}

/// Raw result of a provisioning command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutput {
    /// First line of stdout; the runtime prints the new container id there.
    pub container_id: String,
    /// Everything the command printed, for diagnostics.
    pub output: String,
}

/// A container found by exact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: String,
    pub name: String,
    /// Value of the model id label, when present.
    pub model_id: Option<String>,
}

/// Outcome of a stop or remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Done,
    /// The runtime has no such container.
    AlreadyAbsent,
    /// A failure other than absence, with captured output.
    Failed(String),
}

impl LifecycleOutcome {
    /// Done or already absent.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    fn from_output(output: &CommandOutput) -> Self {
        if output.success() {
            Self::Done
        } else if output.combined().contains("No such container") {
            Self::AlreadyAbsent
        } else {
            Self::Failed(output.combined())
        }
    }
}

/// Container runtime operations used by the orchestrator and control loop.
pub trait RuntimeGateway: Send + Sync {
    /// All managed workloads, running or not.
    fn list_workloads(&self) -> BoxFuture<'_, RuntimeResult<Vec<DeployedWorkload>>>;

    /// Look up a container by exact name, in any state.
    fn find_container<'a>(&'a self, name: &'a str)
    -> BoxFuture<'a, RuntimeResult<Option<ContainerRef>>>;

    fn stop<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LifecycleOutcome>;

    fn remove<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LifecycleOutcome>;

    /// Start a container. Fails only if the command itself fails.
    fn run<'a>(&'a self, spec: &'a ProvisionSpec) -> BoxFuture<'a, RuntimeResult<ProvisionOutput>>;

    /// Host pid of the container's main process.
    fn inspect_pid<'a>(&'a self, container_id: &'a str) -> BoxFuture<'a, RuntimeResult<u32>>;
}

/// [`RuntimeGateway`] over the `docker` CLI.
pub struct DockerGateway {
    executor: Arc<dyn CommandExecutor>,
    binary: String,
    image: String,
    cache_dir: Option<PathBuf>,
}

impl DockerGateway {
    pub fn new(executor: Arc<dyn CommandExecutor>, image: impl Into<String>) -> Self {
        Self {
            executor,
            binary: "docker".to_string(),
            image: image.into(),
            cache_dir: None,
        }
    }

    /// Mount a host model cache into every container.
    pub fn with_cache_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.cache_dir = dir;
        self
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.binary)
    }

    async fn exec(&self, spec: &CommandSpec) -> RuntimeResult<CommandOutput> {
        self.executor
            .execute(spec)
            .await
            .map_err(|source| RuntimeError::Spawn {
                command: spec.to_string(),
                source,
            })
    }

    async fn exec_checked(&self, spec: &CommandSpec) -> RuntimeResult<CommandOutput> {
        let output = self.exec(spec).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(RuntimeError::CommandFailed {
                command: spec.to_string(),
                output: output.combined(),
            })
        }
    }

    async fn lifecycle(&self, verb: &str, name: &str) -> LifecycleOutcome {
        let spec = self.command().args([verb, name]);
        match self.exec(&spec).await {
            Ok(output) => {
                let outcome = LifecycleOutcome::from_output(&output);
                debug!(container = %name, verb, outcome = ?outcome, "lifecycle command finished");
                outcome
            }
            Err(e) => LifecycleOutcome::Failed(e.to_string()),
        }
    }

    /// Argv for `docker run`.
    pub fn run_command(&self, spec: &ProvisionSpec) -> CommandSpec {
        let mut cmd = self
            .command()
            .args(["run", "-d", "--runtime", "nvidia", "--gpus", "all"]);
        if let Some(cache) = &self.cache_dir {
            cmd = cmd
                .arg("-v")
                .arg(format!("{}:{CACHE_MOUNT}", cache.display()));
        }
        cmd.arg("-v")
            .arg(format!("{}:{PROFILE_MOUNT}:ro", spec.profile_path.display()))
            .arg("--env")
            .arg(format!("HF_TOKEN={}", spec.token))
            .arg("-p")
            .arg(format!("{}:{CONTAINER_PORT}", spec.port))
            .arg("--ipc=host")
            .arg("--name")
            .arg(&spec.container_name)
            .arg("--label")
            .arg(format!("{MODEL_ID_LABEL}={}", spec.model_id))
            .arg("--label")
            .arg(format!("{GPU_CLASS_LABEL}={}", spec.gpu_class))
            .arg(&self.image)
            .arg("--model")
            .arg(&spec.model_id)
            .arg("--gpu-memory-utilization")
            .arg(spec.ceiling.to_string())
            .arg("--backend-config")
            .arg(PROFILE_MOUNT)
    }
}

impl RuntimeGateway for DockerGateway {
    fn list_workloads(&self) -> BoxFuture<'_, RuntimeResult<Vec<DeployedWorkload>>> {
        Box::pin(async move {
            let filter = format!("name={NAMESPACE_TAG}");
            let spec = self.command().args([
                "ps",
                "-a",
                "--filter",
                filter.as_str(),
                "--format",
                LIST_FORMAT,
            ]);
            let output = self.exec_checked(&spec).await?;
            Ok(output.stdout.lines().filter_map(parse_ps_line).collect())
        })
    }

    fn find_container<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, RuntimeResult<Option<ContainerRef>>> {
        Box::pin(async move {
            let filter = format!("name=^{name}$");
            let spec = self.command().args([
                "ps",
                "-a",
                "--filter",
                filter.as_str(),
                "--format",
                FIND_FORMAT,
            ]);
            let output = self.exec_checked(&spec).await?;
            Ok(output
                .stdout
                .lines()
                .filter_map(parse_find_line)
                .find(|c| c.name == name))
        })
    }

    fn stop<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LifecycleOutcome> {
        Box::pin(self.lifecycle("stop", name))
    }

    fn remove<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LifecycleOutcome> {
        Box::pin(self.lifecycle("rm", name))
    }

    fn run<'a>(&'a self, spec: &'a ProvisionSpec) -> BoxFuture<'a, RuntimeResult<ProvisionOutput>> {
        Box::pin(async move {
            let cmd = self.run_command(spec);
            let output = self.exec(&cmd).await?;
            if !output.success() {
                warn!(container = %spec.container_name, "docker run failed");
                return Err(RuntimeError::CommandFailed {
                    command: format!("docker run --name {}", spec.container_name),
                    output: output.combined(),
                });
            }
            Ok(ProvisionOutput {
                container_id: output.first_line().unwrap_or_default().to_string(),
                output: output.combined(),
            })
        })
    }

    fn inspect_pid<'a>(&'a self, container_id: &'a str) -> BoxFuture<'a, RuntimeResult<u32>> {
        Box::pin(async move {
            let spec = self
                .command()
                .args(["inspect", "--format", "{{.State.Pid}}", container_id]);
            let output = self.exec_checked(&spec).await?;
            let line = output.first_line().unwrap_or_default();
            line.parse::<u32>().map_err(|_| RuntimeError::Parse {
                command: spec.to_string(),
                detail: format!("pid `{line}`"),
            })
        })
    }
}

/// Parse one `docker ps` row in [`LIST_FORMAT`]. Rows outside the namespace are dropped.
pub fn parse_ps_line(line: &str) -> Option<DeployedWorkload> {
    let mut fields = line.trim().splitn(6, '|');
    let id = fields.next()?.trim();
    let name = fields.next()?.trim();
    let status = fields.next().unwrap_or_default().trim();
    let ports = fields.next().unwrap_or_default();
    let model_label = label_value(fields.next());
    let class_label = label_value(fields.next());

    if id.is_empty() || !naming::is_managed_name(name) {
        return None;
    }

    let model_id = model_label
        .or_else(|| naming::model_id_from_name(name).map(str::to_string))
        .unwrap_or_default();

    Some(DeployedWorkload {
        model_id,
        container_id: id.to_string(),
        container_name: name.to_string(),
        port: parse_host_port(ports).unwrap_or(CONTAINER_PORT),
        running: status.starts_with("Up"),
        gpu_class: class_label.map(GpuClass::new),
        peak_usage_percent: 0.0,
    })
}

fn parse_find_line(line: &str) -> Option<ContainerRef> {
    let mut fields = line.trim().splitn(3, '|');
    let id = fields.next()?.trim();
    let name = fields.next()?.trim();
    if id.is_empty() || name.is_empty() {
        return None;
    }
    Some(ContainerRef {
        id: id.to_string(),
        name: name.to_string(),
        model_id: label_value(fields.next()),
    })
}

fn label_value(field: Option<&str>) -> Option<String> {
    field
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "<no value>")
        .map(str::to_string)
}

/// Host port mapped to the server port, from a ports column like
/// `0.0.0.0:8001->8000/tcp, :::8001->8000/tcp`.
pub fn parse_host_port(ports: &str) -> Option<u16> {
    let target = format!("{CONTAINER_PORT}/");
    ports.split(',').find_map(|mapping| {
        let (host, container) = mapping.trim().split_once("->")?;
        if !container.starts_with(&target) {
            return None;
        }
        host.rsplit(':').next()?.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakeExecutor;

    fn gateway(executor: Arc<FakeExecutor>) -> DockerGateway {
        DockerGateway::new(executor, "vllm/vllm-openai:latest")
            .with_cache_dir(Some(PathBuf::from("/home/ops/.cache/huggingface")))
    }

    fn spec() -> ProvisionSpec {
        ProvisionSpec {
            container_name: "vllm-org-model".into(),
            model_id: "org/model".into(),
            token: "hf_secret".into(),
            port: 8001,
            profile_path: PathBuf::from("/srv/profiles/T4.yaml"),
            gpu_class: GpuClass::new("T4"),
            ceiling: 0.5,
        }
    }

    #[test]
    fn host_port_parsing() {
        assert_eq!(parse_host_port("0.0.0.0:8001->8000/tcp, :::8001->8000/tcp"), Some(8001));
        assert_eq!(parse_host_port("0.0.0.0:9000->9000/tcp, 0.0.0.0:8002->8000/tcp"), Some(8002));
        assert_eq!(parse_host_port("8000/tcp"), None);
        assert_eq!(parse_host_port(""), None);
    }

    #[test]
    fn ps_line_with_labels() {
        let w = parse_ps_line(
            "abc123def456|vllm-org-model|Up 3 minutes|0.0.0.0:8001->8000/tcp|org/model|A100",
        )
        .unwrap();
        assert_eq!(w.container_id, "abc123def456");
        assert_eq!(w.model_id, "org/model");
        assert_eq!(w.port, 8001);
        assert!(w.running);
        assert_eq!(w.gpu_class, Some(GpuClass::new("A100")));
    }

    #[test]
    fn ps_line_without_labels_falls_back_to_name() {
        let w = parse_ps_line("abc123def456|vllm-org-model|Exited (0) 2 hours ago|||").unwrap();
        assert_eq!(w.model_id, "org-model");
        assert_eq!(w.port, 8000);
        assert!(!w.running);
        assert!(w.gpu_class.is_none());

        let w = parse_ps_line("abc|vllm-x|Created||<no value>|<no value>").unwrap();
        assert_eq!(w.model_id, "x");
    }

    #[test]
    fn ps_line_outside_namespace_is_dropped() {
        // The name filter is a substring match, so strays can slip through.
        assert!(parse_ps_line("abc|my-vllm-proxy|Up 1 second|||").is_none());
        assert!(parse_ps_line("").is_none());
    }

    #[tokio::test]
    async fn list_workloads_parses_rows() {
        let exec = Arc::new(FakeExecutor::new());
        exec.respond(
            "docker ps -a --filter name=vllm-",
            CommandOutput::ok(
                "aaaaaaaaaaaa|vllm-a|Up 1 minute|0.0.0.0:8000->8000/tcp|a|T4\n\
                 bbbbbbbbbbbb|vllm-b|Exited (1) 5 seconds ago||b|T4\n",
            ),
        );
        let workloads = gateway(exec).list_workloads().await.unwrap();
        assert_eq!(workloads.len(), 2);
        assert!(workloads[0].running);
        assert!(!workloads[1].running);
    }

    #[tokio::test]
    async fn list_workloads_surfaces_runtime_failure() {
        let exec = Arc::new(FakeExecutor::new());
        exec.respond(
            "docker ps",
            CommandOutput::failed(1, "Cannot connect to the Docker daemon"),
        );
        let err = gateway(exec).list_workloads().await.unwrap_err();
        assert!(matches!(err, RuntimeError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn find_container_requires_exact_name() {
        let exec = Arc::new(FakeExecutor::new());
        exec.respond(
            "docker ps -a --filter name=^vllm-a$",
            CommandOutput::ok("aaaaaaaaaaaa|vllm-a|a\n"),
        );
        let gw = gateway(exec.clone());
        let found = gw.find_container("vllm-a").await.unwrap().unwrap();
        assert_eq!(found.id, "aaaaaaaaaaaa");
        assert_eq!(found.model_id.as_deref(), Some("a"));

        let calls = exec.calls();
        assert_eq!(calls[0].args[3], "name=^vllm-a$");
    }

    #[tokio::test]
    async fn stop_and_remove_outcomes() {
        let exec = Arc::new(FakeExecutor::new());
        exec.respond("docker stop vllm-a", CommandOutput::ok("vllm-a\n"));
        exec.respond(
            "docker rm vllm-a",
            CommandOutput::failed(1, "Error response from daemon: No such container: vllm-a"),
        );
        exec.respond(
            "docker stop vllm-b",
            CommandOutput::failed(1, "permission denied"),
        );
        let gw = gateway(exec);

        assert_eq!(gw.stop("vllm-a").await, LifecycleOutcome::Done);
        assert_eq!(gw.remove("vllm-a").await, LifecycleOutcome::AlreadyAbsent);
        let failed = gw.stop("vllm-b").await;
        assert!(!failed.is_ok());
        assert_eq!(failed, LifecycleOutcome::Failed("permission denied".into()));
    }

    #[test]
    fn run_command_layout() {
        let exec = Arc::new(FakeExecutor::new());
        let cmd = gateway(exec).run_command(&spec());
        let line = cmd.to_string();

        assert!(line.starts_with("docker run -d --runtime nvidia --gpus all"));
        assert!(line.contains("-v /home/ops/.cache/huggingface:/root/.cache/huggingface"));
        assert!(line.contains("-v /srv/profiles/T4.yaml:/app/config.yaml:ro"));
        assert!(line.contains("--env HF_TOKEN=hf_secret"));
        assert!(line.contains("-p 8001:8000"));
        assert!(line.contains("--name vllm-org-model"));
        assert!(line.contains("--label blackbox.model_id=org/model"));
        assert!(line.contains("vllm/vllm-openai:latest --model org/model"));
        assert!(line.contains("--gpu-memory-utilization 0.5"));
        assert!(line.ends_with("--backend-config /app/config.yaml"));
    }

    #[tokio::test]
    async fn run_returns_first_line_as_id() {
        let exec = Arc::new(FakeExecutor::new());
        exec.respond(
            "docker run",
            CommandOutput::ok("0123456789abcdef0123\n"),
        );
        let out = gateway(exec).run(&spec()).await.unwrap();
        assert_eq!(out.container_id, "0123456789abcdef0123");
    }

    #[tokio::test]
    async fn run_failure_carries_output() {
        let exec = Arc::new(FakeExecutor::new());
        exec.respond(
            "docker run",
            CommandOutput::failed(125, "Conflict. The container name is already in use"),
        );
        match gateway(exec).run(&spec()).await {
            Err(RuntimeError::CommandFailed { output, .. }) => {
                assert!(output.contains("already in use"));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inspect_pid_parses_integer() {
        let exec = Arc::new(FakeExecutor::new());
        exec.respond("docker inspect --format {{.State.Pid}} abc", CommandOutput::ok("4242\n"));
        exec.respond("docker inspect --format {{.State.Pid}} bad", CommandOutput::ok("n/a\n"));
        let gw = gateway(exec);
        assert_eq!(gw.inspect_pid("abc").await.unwrap(), 4242);
        assert!(matches!(
            gw.inspect_pid("bad").await,
            Err(RuntimeError::Parse { .. })
        ));
    }
}
