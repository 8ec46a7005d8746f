//! Scripted fakes for the runtime boundary.
//!
//! Enabled via `#[cfg(test)]` or the `testkit` feature.
//!
//! - [`FakeExecutor`] answers commands by argv prefix and records every call.
//! - [`FakeGateway`] keeps an in-memory container table with docker-like
//!   semantics (name conflicts, "no such container" on missing targets).

use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;

use blackbox_core::{DeployedWorkload, GpuClass, naming};

use crate::BoxFuture;
use crate::docker::{ContainerRef, LifecycleOutcome, ProvisionOutput, ProvisionSpec, RuntimeGateway};
use crate::error::{RuntimeError, RuntimeResult};
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};

// ---------------------------------------------------------------------------
// FakeExecutor
// ---------------------------------------------------------------------------

/// Executor returning scripted outputs.
///
/// The longest registered prefix of the rendered command line wins.
/// Unscripted commands fail with exit code 127.
#[derive(Default)]
pub struct FakeExecutor {
    responses: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: impl Into<String>, output: CommandOutput) {
        self.responses.lock().unwrap().push((prefix.into(), output));
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandExecutor for FakeExecutor {
    fn execute<'a>(&'a self, spec: &'a CommandSpec) -> BoxFuture<'a, io::Result<CommandOutput>> {
        self.calls.lock().unwrap().push(spec.clone());
        let line = spec.to_string();
        let output = self
            .responses
            .lock()
            .unwrap()
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| CommandOutput::failed(127, format!("unscripted command: {line}")));
        Box::pin(async move { Ok(output) })
    }
}

// ---------------------------------------------------------------------------
// FakeGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    model_id: String,
    port: u16,
    running: bool,
    gpu_class: Option<GpuClass>,
    pid: u32,
}

#[derive(Default)]
struct FakeState {
    containers: BTreeMap<String, FakeContainer>,
    provisioned: Vec<ProvisionSpec>,
    stops: Vec<String>,
    removes: Vec<String>,
    serial: u64,
    run_failure: Option<String>,
    /// Per-container run failures, keyed by container name.
    run_failures_for: BTreeMap<String, String>,
    run_id_override: Option<String>,
    list_failure: Option<String>,
    teardown_failure: Option<String>,
}

/// In-memory container runtime.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a workload for `model_id` as if it had been provisioned earlier.
    pub fn with_workload(self, model_id: &str, running: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.serial += 1;
            let serial = state.serial;
            state.containers.insert(
                naming::container_name(model_id),
                FakeContainer {
                    id: format!("{serial:064x}"),
                    model_id: model_id.to_string(),
                    port: 8000,
                    running,
                    gpu_class: Some(GpuClass::fallback()),
                    pid: 1000 + serial as u32,
                },
            );
        }
        self
    }

    /// Make every subsequent `run` fail with `output`.
    pub fn fail_runs(&self, output: impl Into<String>) {
        self.state.lock().unwrap().run_failure = Some(output.into());
    }

    /// Make `run` fail with `output` for the container `name` only.
    pub fn fail_runs_for(&self, name: &str, output: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .run_failures_for
            .insert(name.to_string(), output.into());
    }

    /// Make `run` print `id` instead of a well-formed container id.
    pub fn emit_run_id(&self, id: impl Into<String>) {
        self.state.lock().unwrap().run_id_override = Some(id.into());
    }

    pub fn fail_lists(&self, output: impl Into<String>) {
        self.state.lock().unwrap().list_failure = Some(output.into());
    }

    /// Make stop and remove report a hard failure.
    pub fn fail_teardown(&self, output: impl Into<String>) {
        self.state.lock().unwrap().teardown_failure = Some(output.into());
    }

    /// Remove a container behind the system's back.
    pub fn remove_out_of_band(&self, name: &str) {
        self.state.lock().unwrap().containers.remove(name);
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state.lock().unwrap().containers.keys().cloned().collect()
    }

    pub fn container_id(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map(|c| c.id.clone())
    }

    pub fn provisioned(&self) -> Vec<ProvisionSpec> {
        self.state.lock().unwrap().provisioned.clone()
    }

    pub fn stop_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().stops.clone()
    }

    pub fn remove_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().removes.clone()
    }
}

impl RuntimeGateway for FakeGateway {
    fn list_workloads(&self) -> BoxFuture<'_, RuntimeResult<Vec<DeployedWorkload>>> {
        let state = self.state.lock().unwrap();
        let result = match &state.list_failure {
            Some(output) => Err(RuntimeError::CommandFailed {
                command: "docker ps".to_string(),
                output: output.clone(),
            }),
            None => Ok(state
                .containers
                .iter()
                .map(|(name, c)| DeployedWorkload {
                    model_id: c.model_id.clone(),
                    container_id: c.id.clone(),
                    container_name: name.clone(),
                    port: c.port,
                    running: c.running,
                    gpu_class: c.gpu_class.clone(),
                    peak_usage_percent: 0.0,
                })
                .collect()),
        };
        Box::pin(async move { result })
    }

    fn find_container<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, RuntimeResult<Option<ContainerRef>>> {
        let found = self
            .state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map(|c| ContainerRef {
                id: c.id.clone(),
                name: name.to_string(),
                model_id: Some(c.model_id.clone()),
            });
        Box::pin(async move { Ok(found) })
    }

    fn stop<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LifecycleOutcome> {
        let mut state = self.state.lock().unwrap();
        state.stops.push(name.to_string());
        let outcome = if let Some(output) = &state.teardown_failure {
            LifecycleOutcome::Failed(output.clone())
        } else if let Some(c) = state.containers.get_mut(name) {
            c.running = false;
            LifecycleOutcome::Done
        } else {
            LifecycleOutcome::AlreadyAbsent
        };
        Box::pin(async move { outcome })
    }

    fn remove<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LifecycleOutcome> {
        let mut state = self.state.lock().unwrap();
        state.removes.push(name.to_string());
        let outcome = if let Some(output) = &state.teardown_failure {
            LifecycleOutcome::Failed(output.clone())
        } else if state.containers.remove(name).is_some() {
            LifecycleOutcome::Done
        } else {
            LifecycleOutcome::AlreadyAbsent
        };
        Box::pin(async move { outcome })
    }

    fn run<'a>(&'a self, spec: &'a ProvisionSpec) -> BoxFuture<'a, RuntimeResult<ProvisionOutput>> {
        let mut state = self.state.lock().unwrap();
        state.provisioned.push(spec.clone());
        let command = format!("docker run --name {}", spec.container_name);

        let failure = state
            .run_failure
            .clone()
            .or_else(|| state.run_failures_for.get(&spec.container_name).cloned());
        let result = if let Some(output) = failure {
            Err(RuntimeError::CommandFailed { command, output })
        } else if state.containers.contains_key(&spec.container_name) {
            Err(RuntimeError::CommandFailed {
                command,
                output: format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    spec.container_name
                ),
            })
        } else {
            state.serial += 1;
            let serial = state.serial;
            let id = state
                .run_id_override
                .clone()
                .unwrap_or_else(|| format!("{serial:064x}"));
            state.containers.insert(
                spec.container_name.clone(),
                FakeContainer {
                    id: id.clone(),
                    model_id: spec.model_id.clone(),
                    port: spec.port,
                    running: true,
                    gpu_class: Some(spec.gpu_class.clone()),
                    pid: 1000 + serial as u32,
                },
            );
            Ok(ProvisionOutput {
                container_id: id.clone(),
                output: id,
            })
        };
        Box::pin(async move { result })
    }

    fn inspect_pid<'a>(&'a self, container_id: &'a str) -> BoxFuture<'a, RuntimeResult<u32>> {
        let pid = self
            .state
            .lock()
            .unwrap()
            .containers
            .values()
            .find(|c| c.id == container_id)
            .map(|c| c.pid)
            .ok_or_else(|| RuntimeError::CommandFailed {
                command: format!("docker inspect {container_id}"),
                output: format!("Error: No such object: {container_id}"),
            });
        Box::pin(async move { pid })
    }
}
