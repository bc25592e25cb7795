//! Validate → (kill → wait)? → ensure input → launch.
//!
//! Every precondition is checked in [`plan`] before the orchestrator touches
//! an executor or a probe, so a failed validation leaves nothing behind.

use std::time::Duration;

use metrics::{counter, histogram};
use serde::Serialize;
use squall_core::{ResolvedSettings, ValidationError, BUILTIN_PROCESSORS};
use tracing::{debug, info, warn};

use crate::error::LaunchError;
use crate::exec::Executor;
use crate::locator::{resolve_spout, resolve_state, SpoutConfig, StateConfig};
use crate::probe::{probe_with_retry, BrokerAddr, RetryPolicy, TopicProbe};
use crate::synth::{Command, HostContext, Synthesizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Idle,
    Validating,
    Killing,
    Waiting,
    EnsuringInput,
    Launching,
    Done,
    Failed,
}

/// Kafka topic the orchestrator probes before launching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeTarget {
    pub broker: BrokerAddr,
    pub topic: String,
    pub retry: RetryPolicy,
}

/// Everything a run needs, computed without side effects.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchPlan {
    pub topology: String,
    pub dry_run: bool,
    pub spout: SpoutConfig,
    pub state: StateConfig,
    pub kill: Option<Command>,
    pub wait: Duration,
    pub probe: Option<ProbeTarget>,
    pub launch: Command,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchReport {
    pub topology: String,
    pub dry_run: bool,
    pub state: LifecycleState,
    pub transitions: Vec<LifecycleState>,
    pub kill_command: Option<String>,
    pub launch_command: String,
}

/// Numeric options fail here rather than deep inside the cluster.
fn check_numbers(settings: &ResolvedSettings) -> Result<(), ValidationError> {
    settings.parse::<u64>("wait")?;
    settings.parse::<u32>("parallelism")?;
    settings.parse::<u32>("input_parallelism")?;
    settings.parse::<u32>("kafka_partitions")?;
    settings.parse::<u64>("kafka_batch")?;
    settings.parse::<u32>("probe_attempts")?;
    settings.parse::<u64>("probe_timeout")?;
    settings.parse::<u16>("nimbus_port")?;
    settings.parse::<u32>("timeout")?;
    settings.parse::<u32>("workers")?;
    settings.parse::<u32>("ackers")?;
    settings.parse::<f64>("sample_rate")?;
    Ok(())
}

/// Every `|` stage must name a processor the stock worker knows.
fn check_dataflow(dataflow: &str) -> Result<(), ValidationError> {
    let known = |stage: &str| BUILTIN_PROCESSORS.contains(&stage.trim());
    if dataflow.split('|').all(known) {
        Ok(())
    } else {
        Err(ValidationError::UnknownDataflow(dataflow.to_string()))
    }
}

/// Check every precondition and synthesize the commands.
pub fn plan(settings: &ResolvedSettings, host: &HostContext) -> Result<LaunchPlan, ValidationError> {
    if settings.dataflow_name().is_none() && settings.get("bolt_command").is_none() {
        return Err(ValidationError::MissingWorker);
    }
    if let (Some(dataflow), None) = (settings.dataflow_name(), settings.get("bolt_command")) {
        check_dataflow(dataflow)?;
    }
    let topology = settings.topology_name().ok_or(ValidationError::MissingTopologyName)?.to_string();
    let input = settings.get("input").ok_or(ValidationError::MissingInput)?;
    let output = settings.get("output").ok_or(ValidationError::MissingOutput)?;

    check_numbers(settings)?;

    let spout = resolve_spout(input, settings);
    let probe = match &spout {
        SpoutConfig::Kafka { topic, .. } => {
            let hosts = settings.get("kafka_hosts").ok_or(ValidationError::MissingKafkaHosts)?;
            let retry = RetryPolicy {
                attempts: settings.parse("probe_attempts")?.unwrap_or(RetryPolicy::default().attempts),
                timeout: settings.parse("probe_timeout")?.map(Duration::from_secs).unwrap_or(RetryPolicy::default().timeout),
                ..RetryPolicy::default()
            };
            Some(ProbeTarget { broker: BrokerAddr::first_of(hosts)?, topic: topic.clone(), retry })
        }
        SpoutConfig::FileBlob { path, .. } => {
            if path.trim().is_empty() {
                return Err(ValidationError::MissingFilePath);
            }
            None
        }
        SpoutConfig::S3Blob { bucket, path, access_key, secret_key, region, endpoint, .. } => {
            if bucket.trim().is_empty() {
                return Err(ValidationError::MissingS3Bucket);
            }
            if path.trim().is_empty() {
                return Err(ValidationError::MissingS3Path);
            }
            if access_key.is_none() {
                return Err(ValidationError::MissingAwsKey);
            }
            if secret_key.is_none() {
                return Err(ValidationError::MissingAwsSecret);
            }
            if endpoint.is_none() {
                return Err(ValidationError::UnknownAwsRegion(region.clone().unwrap_or_default()));
            }
            None
        }
    };
    let state = resolve_state(output);

    let synth = Synthesizer::new(settings, host);
    let rm = settings.flag("rm");
    Ok(LaunchPlan {
        topology,
        dry_run: settings.flag("dry_run"),
        kill: rm.then(|| synth.kill_command()),
        wait: Duration::from_secs(settings.parse("wait")?.unwrap_or(0)),
        probe,
        launch: synth.launch_command(&spout, &state),
        spout,
        state,
    })
}

/// Drives one invocation through the lifecycle. Holds no state beyond the
/// current run.
pub struct Orchestrator<'a> {
    executor: &'a dyn Executor,
    probe: &'a dyn TopicProbe,
    state: LifecycleState,
    transitions: Vec<LifecycleState>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(executor: &'a dyn Executor, probe: &'a dyn TopicProbe) -> Self {
        Self { executor, probe, state: LifecycleState::Idle, transitions: vec![LifecycleState::Idle] }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn transitions(&self) -> &[LifecycleState] {
        &self.transitions
    }

    fn enter(&mut self, next: LifecycleState) {
        debug!(from = ?self.state, to = ?next, "lifecycle transition");
        self.state = next;
        self.transitions.push(next);
    }

    pub async fn run(&mut self, settings: &ResolvedSettings, host: &HostContext) -> Result<LaunchReport, LaunchError> {
        let started = std::time::Instant::now();
        counter!("launch_attempts", 1u64);
        match self.drive(settings, host).await {
            Ok(plan) => {
                self.enter(LifecycleState::Done);
                counter!("launch_ok", 1u64);
                histogram!("launch_latency_ms", started.elapsed().as_secs_f64() * 1000.0);
                Ok(LaunchReport {
                    topology: plan.topology,
                    dry_run: plan.dry_run,
                    state: self.state,
                    transitions: self.transitions.clone(),
                    kill_command: plan.kill.map(|c| c.render()),
                    launch_command: plan.launch.render(),
                })
            }
            Err(e) => {
                self.enter(LifecycleState::Failed);
                counter!("launch_err", 1u64);
                Err(e)
            }
        }
    }

    async fn drive(&mut self, settings: &ResolvedSettings, host: &HostContext) -> Result<LaunchPlan, LaunchError> {
        self.enter(LifecycleState::Validating);
        let plan = plan(settings, host)?;
        info!(topology = %plan.topology, dry_run = plan.dry_run, "launch plan ready");

        if let Some(kill) = &plan.kill {
            self.enter(LifecycleState::Killing);
            counter!("kill_attempts", 1u64);
            // A missing or already-stopped topology must not block the launch.
            match self.executor.execute(kill).await {
                Ok(0) => info!(topology = %plan.topology, "killed running topology"),
                Ok(code) => debug!(topology = %plan.topology, code, "kill exited non-zero; continuing"),
                Err(e) => warn!(topology = %plan.topology, error = %e, "kill command failed to run; continuing"),
            }
            if !plan.dry_run {
                self.enter(LifecycleState::Waiting);
                info!(seconds = plan.wait.as_secs(), "waiting for the cluster to release the topology");
                tokio::time::sleep(plan.wait).await;
            }
        }

        if let Some(target) = plan.probe.as_ref().filter(|_| !plan.dry_run) {
            self.enter(LifecycleState::EnsuringInput);
            probe_with_retry(self.probe, &target.broker, &target.topic, target.retry)
                .await
                .map_err(|cause| LaunchError::Probe { topic: target.topic.clone(), broker: target.broker.to_string(), cause })?;
        }

        self.enter(LifecycleState::Launching);
        let code = self
            .executor
            .execute(&plan.launch)
            .await
            .map_err(|cause| LaunchError::Exec { what: "launch", cause })?;
        if code != 0 && !plan.dry_run {
            return Err(LaunchError::LaunchFailed { topology: plan.topology, code });
        }
        info!(topology = %plan.topology, "topology launched");
        Ok(plan)
    }
}
