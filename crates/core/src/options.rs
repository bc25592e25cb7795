//! Declarative table of every setting squall recognizes.
//!
//! Group membership ("is this a native flag", "may the worker see this") is a
//! set-membership query over a descriptor's tags. Nothing else decides it.

use serde::{Deserialize, Serialize};

/// Namespace an option belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    /// Passed straight through to the cluster framework as `-D<native_key>=<value>`.
    Native,
    /// Re-serialized onto the worker command line as `--key=value`.
    WorkerForwardable,
    /// Interpreted by the orchestrator only; never reaches the worker.
    OrchestratorOnly,
}

/// One recognized setting. Immutable; lives in [`REGISTRY`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OptionDescriptor {
    pub key: &'static str,
    pub default: Option<&'static str>,
    pub tags: &'static [Tag],
    /// Dotted key in the cluster framework's configuration namespace.
    pub native_key: Option<&'static str>,
    /// Environment variable consulted before the default.
    pub env: Option<&'static str>,
    /// Takes no value on the command line (`--rm` means `--rm=true`).
    pub switch: bool,
    pub description: &'static str,
}

impl OptionDescriptor {
    pub fn has(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }
}

const NATIVE: &[Tag] = &[Tag::Native, Tag::OrchestratorOnly];
const ORCH: &[Tag] = &[Tag::OrchestratorOnly];
const FORWARD: &[Tag] = &[Tag::WorkerForwardable];

const fn opt(key: &'static str, default: Option<&'static str>, tags: &'static [Tag], description: &'static str) -> OptionDescriptor {
    OptionDescriptor { key, default, tags, native_key: None, env: None, switch: false, description }
}

const fn native(key: &'static str, native_key: &'static str, default: Option<&'static str>, description: &'static str) -> OptionDescriptor {
    OptionDescriptor { key, default, tags: NATIVE, native_key: Some(native_key), env: None, switch: false, description }
}

const fn with_env(mut d: OptionDescriptor, env: &'static str) -> OptionDescriptor {
    d.env = Some(env);
    d
}

const fn switch(mut d: OptionDescriptor) -> OptionDescriptor {
    d.switch = true;
    d
}

/// Lookup table over a static slice of descriptors.
#[derive(Debug, Clone, Copy)]
pub struct OptionRegistry {
    descriptors: &'static [OptionDescriptor],
}

impl OptionRegistry {
    pub const fn new(descriptors: &'static [OptionDescriptor]) -> Self {
        Self { descriptors }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static OptionDescriptor> {
        self.descriptors.iter()
    }

    pub fn lookup(&self, key: &str) -> Option<&'static OptionDescriptor> {
        self.descriptors.iter().find(|d| d.key == key)
    }

    pub fn tagged(&self, tag: Tag) -> impl Iterator<Item = &'static OptionDescriptor> {
        self.descriptors.iter().filter(move |d| d.has(tag))
    }

    /// Whether a setting may be forwarded to the worker. Keys the registry
    /// does not know are user extras and always forwardable.
    pub fn is_forwardable(&self, key: &str) -> bool {
        self.lookup(key).map(|d| !d.has(Tag::OrchestratorOnly)).unwrap_or(true)
    }
}

pub static REGISTRY: OptionRegistry = OptionRegistry::new(&[
    // worker reference
    opt("run", None, ORCH, "Name of the processor or dataflow to run"),
    opt("bolt_command", None, ORCH, "Command line to run within each bolt, used verbatim"),
    opt("command_prefix", None, ORCH, "Prefix inserted before the worker command"),
    // lifecycle
    opt("name", None, ORCH, "Name for the launched topology (defaults to the dataflow name)"),
    switch(opt("dry_run", Some("false"), ORCH, "Echo the commands that would run without running them")),
    switch(opt("rm", Some("false"), ORCH, "Kill a running topology of the same name before launching")),
    opt("wait", Some("300"), ORCH, "Seconds to wait after killing a topology"),
    opt("parallelism", Some("1"), ORCH, "Parallelism hint for the worker bolt"),
    // boundaries
    opt("input", None, ORCH, "Input locator: Kafka topic, file:// or s3:// URI"),
    opt("output", None, ORCH, "Output Kafka topic"),
    opt("kafka_hosts", Some("localhost"), ORCH, "Comma-separated list of Kafka brokers"),
    opt("zookeeper_hosts", Some("localhost"), ORCH, "Comma-separated list of ZooKeeper hosts"),
    switch(opt("from_beginning", Some("false"), ORCH, "Start reading input from the earliest position")),
    switch(opt("from_end", Some("false"), ORCH, "Start reading input from the latest position")),
    opt("offset", None, ORCH, "Explicit offset (Kafka) or marker (blob) to start reading from"),
    opt("kafka_partitions", Some("1"), ORCH, "Number of partitions on the input topic"),
    opt("kafka_batch", Some("1048576"), ORCH, "Fetch size in bytes when reading from Kafka"),
    opt("input_parallelism", Some("1"), ORCH, "Number of simultaneous threads reading input"),
    opt("aws_key", None, ORCH, "AWS access key for S3 input"),
    opt("aws_secret", None, ORCH, "AWS secret key for S3 input"),
    opt("aws_region", Some("us-east-1"), ORCH, "AWS region of the S3 input bucket"),
    opt("probe_attempts", Some("3"), ORCH, "Attempts when probing the Kafka input topic"),
    opt("probe_timeout", Some("10"), ORCH, "Seconds allowed for each input probe attempt"),
    // installation
    with_env(opt("storm_home", Some("/usr/lib/storm"), ORCH, "Path to the Storm installation"), "STORM_HOME"),
    opt("storm_runner", None, ORCH, "Explicit path to the storm executable"),
    with_env(opt("jar", None, ORCH, "Path to the topology submitter jar"), "SQUALL_JAR"),
    // native
    switch(native("debug", "topology.debug", None, "Run the topology in debug mode")),
    switch(native("optimize", "topology.optimize", None, "Let the cluster optimize the topology")),
    native("timeout", "topology.message.timeout.secs", None, "Seconds before an unacked tuple is replayed"),
    native("workers", "topology.workers", None, "Number of worker processes for the topology"),
    native("worker_opts", "topology.worker.childopts", None, "JVM options for worker processes"),
    native("ackers", "topology.acker.executors", None, "Number of acker executors"),
    native("sample_rate", "topology.stats.sample.rate", None, "Fraction of tuples sampled for statistics"),
    native("nimbus_host", "nimbus.host", Some("localhost"), "Nimbus host to submit to"),
    native("nimbus_port", "nimbus.thrift.port", Some("6627"), "Nimbus Thrift port"),
    // forwarded to the worker
    opt("environment", None, FORWARD, "Environment the dataflow runs in"),
    opt("delimiter", None, FORWARD, "Batch delimiter the worker emits"),
]);
