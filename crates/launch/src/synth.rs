//! Turn resolved settings into the exact command lines the cluster's
//! submitter expects.
//!
//! Everything here is a pure function of [`ResolvedSettings`] and a
//! [`HostContext`]: identical inputs render byte-identical commands.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use serde::Serialize;
use squall_core::{ResolvedSettings, Tag, REGISTRY};

use crate::locator::{SpoutConfig, StateConfig};

pub const RUNNER_BINARY: &str = "storm";
pub const WORKER_BINARY: &str = "squall-bolt";
pub const SUBMITTER_CLASS: &str = "com.infochimps.wukong.storm.TopologySubmitter";
pub const SUBMITTER_JAR: &str = "squall-storm.jar";

/// Cosmetic line continuation between launch command segments.
const LAUNCH_SEPARATOR: &str = " \\\n  ";

fn escape(value: &str) -> Cow<'_, str> {
    shell_escape::escape(Cow::Borrowed(value))
}

/// One `-D<key>=<value>` setting for the cluster framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeFlag {
    pub key: String,
    pub value: String,
}

impl NativeFlag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    pub fn to_token(&self) -> String {
        format!("-D{}={}", self.key, escape(&self.value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Kill,
    Launch,
}

/// One external process invocation, as ordered shell-ready segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub kind: CommandKind,
    pub segments: Vec<String>,
    #[serde(skip)]
    separator: &'static str,
}

impl Command {
    pub fn render(&self) -> String {
        self.segments.join(self.separator)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Facts about the launching host that feed the commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostContext {
    /// Directory the workers run in.
    pub working_dir: String,
    pub runner: String,
    pub jar: String,
}

impl HostContext {
    pub fn discover(settings: &ResolvedSettings) -> std::io::Result<Self> {
        let working_dir = std::env::current_dir()?.to_string_lossy().into_owned();
        Ok(Self { working_dir, runner: resolve_runner_path(settings), jar: resolve_jar_path(settings) })
    }
}

/// Explicit `--storm_runner`, else `<storm_home>/bin/storm` when it exists,
/// else a bare `storm` left to the search path.
pub fn resolve_runner_path(settings: &ResolvedSettings) -> String {
    if let Some(explicit) = settings.get("storm_runner") {
        return explicit.to_string();
    }
    if let Some(home) = settings.get("storm_home") {
        let candidate = Path::new(home).join("bin").join(RUNNER_BINARY);
        if candidate.is_file() {
            return candidate.to_string_lossy().into_owned();
        }
    }
    RUNNER_BINARY.to_string()
}

/// Explicit `--jar`, else the jar installed next to this executable.
pub fn resolve_jar_path(settings: &ResolvedSettings) -> String {
    if let Some(explicit) = settings.get("jar") {
        return explicit.to_string();
    }
    let installed = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .map(|dir| dir.join("..").join("share").join("squall").join(SUBMITTER_JAR))
        .unwrap_or_else(|| PathBuf::from(SUBMITTER_JAR));
    installed.to_string_lossy().into_owned()
}

pub struct Synthesizer<'a> {
    settings: &'a ResolvedSettings,
    host: &'a HostContext,
}

impl<'a> Synthesizer<'a> {
    pub fn new(settings: &'a ResolvedSettings, host: &'a HostContext) -> Self {
        Self { settings, host }
    }

    /// Registry options tagged native with a non-blank value, sorted by key.
    pub fn native_flags(&self) -> Vec<NativeFlag> {
        let mut flags: Vec<NativeFlag> = REGISTRY
            .tagged(Tag::Native)
            .filter_map(|d| {
                let native_key = d.native_key?;
                self.settings.get(d.key).map(|v| NativeFlag::new(native_key, v))
            })
            .collect();
        flags.sort_by(|a, b| a.key.cmp(&b.key));
        flags
    }

    /// Services, topology, spout, dataflow and state flags with blank values
    /// dropped, sorted by key.
    pub fn topology_flags(&self, spout: &SpoutConfig, state: &StateConfig) -> Vec<NativeFlag> {
        let s = self.settings;
        let mut pairs: Vec<(&str, Option<String>)> = vec![
            ("wukong.kafka.hosts", s.get("kafka_hosts").map(str::to_string)),
            ("wukong.zookeeper.hosts", s.get("zookeeper_hosts").map(str::to_string)),
            ("wukong.topology", s.topology_name().map(str::to_string)),
        ];
        pairs.extend(spout_pairs(spout));
        pairs.extend([
            ("wukong.directory", Some(self.host.working_dir.clone())),
            ("wukong.dataflow", s.dataflow_name().map(str::to_string)),
            ("wukong.command", Some(self.worker_commandline())),
            ("wukong.parallelism", s.get("parallelism").map(str::to_string)),
            ("wukong.environment", s.get("environment").map(str::to_string)),
        ]);
        match state {
            StateConfig::Kafka { topic } => pairs.push(("wukong.output.kafka.topic", Some(topic.clone()))),
        }

        let mut flags: Vec<NativeFlag> = pairs
            .into_iter()
            .filter_map(|(key, value)| value.filter(|v| !v.trim().is_empty()).map(|v| NativeFlag::new(key, v)))
            .collect();
        flags.sort_by(|a, b| a.key.cmp(&b.key));
        flags
    }

    /// Command line each bolt runs. An explicit `--bolt_command` wins verbatim.
    pub fn worker_commandline(&self) -> String {
        let s = self.settings;
        if let Some(explicit) = s.get("bolt_command") {
            return explicit.to_string();
        }
        let params: Vec<String> = s
            .forwardable(&REGISTRY)
            .map(|(key, value)| format!("--{}={}", key, escape(value)))
            .collect();
        [
            s.get("command_prefix").map(str::to_string),
            Some(WORKER_BINARY.to_string()),
            s.dataflow_name().map(|d| escape(d).into_owned()),
            Some(params.join(" ")),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn launch_command(&self, spout: &SpoutConfig, state: &StateConfig) -> Command {
        let mut segments = vec![
            escape(&self.host.runner).into_owned(),
            format!("jar {}", escape(&self.host.jar)),
            SUBMITTER_CLASS.to_string(),
        ];
        segments.extend(self.native_flags().iter().map(NativeFlag::to_token));
        segments.extend(self.topology_flags(spout, state).iter().map(NativeFlag::to_token));
        Command { kind: CommandKind::Launch, segments, separator: LAUNCH_SEPARATOR }
    }

    /// Kill output is discarded; only the exit status is ever looked at.
    pub fn kill_command(&self) -> Command {
        let topology = self.settings.topology_name().unwrap_or_default();
        let wait = self.settings.get("wait").unwrap_or("0");
        let segments = vec![
            escape(&self.host.runner).into_owned(),
            "kill".to_string(),
            escape(topology).into_owned(),
            "-w".to_string(),
            escape(wait).into_owned(),
            "> /dev/null 2>&1".to_string(),
        ];
        Command { kind: CommandKind::Kill, segments, separator: " " }
    }
}

fn spout_pairs(spout: &SpoutConfig) -> Vec<(&'static str, Option<String>)> {
    match spout {
        SpoutConfig::Kafka { topic, partitions, batch_size, parallelism, offset_policy } => vec![
            ("wukong.input.type", Some("kafka".to_string())),
            ("wukong.input.kafka.topic", Some(topic.clone())),
            ("wukong.input.kafka.partitions", partitions.clone()),
            ("wukong.input.kafka.batch", batch_size.clone()),
            ("wukong.input.parallelism", parallelism.clone()),
            ("wukong.input.kafka.offset", offset_policy.kafka_offset().map(str::to_string)),
        ],
        SpoutConfig::FileBlob { path, start_policy, marker } => vec![
            ("wukong.input.type", Some("blob".to_string())),
            ("wukong.input.blob.start", Some(start_policy.blob_start().to_string())),
            ("wukong.input.blob.marker", marker.clone()),
            ("wukong.input.blob.type", Some("file".to_string())),
            ("wukong.input.blob.path", Some(path.clone())),
        ],
        SpoutConfig::S3Blob { bucket, path, access_key, secret_key, endpoint, start_policy, marker, .. } => vec![
            ("wukong.input.type", Some("blob".to_string())),
            ("wukong.input.blob.start", Some(start_policy.blob_start().to_string())),
            ("wukong.input.blob.marker", marker.clone()),
            ("wukong.input.blob.type", Some("s3".to_string())),
            ("wukong.input.blob.path", Some(path.clone())),
            ("wukong.input.blob.s3_bucket", Some(bucket.clone())),
            ("wukong.input.blob.aws_key", access_key.clone()),
            ("wukong.input.blob.aws_secret", secret_key.clone()),
            ("wukong.input.blob.s3_endpoint", endpoint.map(str::to_string)),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::{resolve_spout, resolve_state};

    fn host() -> HostContext {
        HostContext { working_dir: "/srv/flows".into(), runner: "storm".into(), jar: "/opt/squall/squall-storm.jar".into() }
    }

    fn settings(pairs: &[(&str, &str)]) -> ResolvedSettings {
        ResolvedSettings::resolve_with(&REGISTRY, Some("identity".into()), pairs.iter().copied(), |_| None)
    }

    fn launch(pairs: &[(&str, &str)]) -> String {
        let s = settings(pairs);
        let h = host();
        let synth = Synthesizer::new(&s, &h);
        let spout = resolve_spout(s.get("input").unwrap_or_default(), &s);
        let state = resolve_state(s.get("output").unwrap_or_default());
        synth.launch_command(&spout, &state).render()
    }

    #[test]
    fn launch_names_jar_class_and_defaults() {
        let cmd = launch(&[("input", "foo"), ("output", "bar")]);
        assert!(cmd.starts_with("storm \\\n  jar /opt/squall/squall-storm.jar \\\n  com.infochimps.wukong.storm.TopologySubmitter"), "{cmd}");
        for needle in [
            "-Dnimbus.host=localhost",
            "-Dnimbus.thrift.port=6627",
            "-Dwukong.kafka.hosts=localhost",
            "-Dwukong.zookeeper.hosts=localhost",
            "-Dwukong.topology=identity",
            "-Dwukong.input.type=kafka",
            "-Dwukong.input.kafka.topic=foo",
            "-Dwukong.input.kafka.partitions=1",
            "-Dwukong.input.kafka.batch=1048576",
            "-Dwukong.input.parallelism=1",
            "-Dwukong.directory=/srv/flows",
            "-Dwukong.dataflow=identity",
            "-Dwukong.parallelism=1",
            "-Dwukong.output.kafka.topic=bar",
        ] {
            assert!(cmd.contains(needle), "missing {needle} in {cmd}");
        }
        assert!(!cmd.contains("wukong.input.kafka.offset"), "resume must leave the offset unset");
        assert!(!cmd.contains("wukong.environment"));
    }

    #[test]
    fn identical_settings_render_identical_commands() {
        let pairs = [("input", "foo"), ("output", "bar"), ("ackers", "10"), ("environment", "prod"), ("custom", "a b")];
        assert_eq!(launch(&pairs), launch(&pairs));
        let mut reversed = pairs;
        reversed.reverse();
        assert_eq!(launch(&pairs), launch(&reversed));
    }

    #[test]
    fn topology_flags_are_sorted_and_never_blank() {
        let s = settings(&[("input", "foo"), ("output", "bar"), ("zookeeper_hosts", "")]);
        let h = host();
        let synth = Synthesizer::new(&s, &h);
        let flags = synth.topology_flags(&resolve_spout("foo", &s), &resolve_state("bar"));
        let keys: Vec<_> = flags.iter().map(|f| f.key.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
        assert!(flags.iter().all(|f| !f.value.trim().is_empty()));
        assert!(!keys.contains(&"wukong.zookeeper.hosts"));
    }

    #[test]
    fn native_flags_map_friendly_names() {
        let s = settings(&[("ackers", "10"), ("timeout", "30"), ("worker_opts", "-Xmx1g -Xms1g")]);
        let h = host();
        let flags = Synthesizer::new(&s, &h).native_flags();
        assert!(flags.contains(&NativeFlag::new("topology.acker.executors", "10")));
        assert!(flags.contains(&NativeFlag::new("topology.message.timeout.secs", "30")));
        let opts = flags.iter().find(|f| f.key == "topology.worker.childopts").unwrap();
        assert_eq!(opts.to_token(), "-Dtopology.worker.childopts='-Xmx1g -Xms1g'");
        assert!(!flags.iter().any(|f| f.key == "topology.debug"));
    }

    #[test]
    fn kafka_offsets_follow_policy() {
        assert!(launch(&[("input", "foo"), ("output", "bar"), ("from_beginning", "true")]).contains("-Dwukong.input.kafka.offset=-2"));
        assert!(launch(&[("input", "foo"), ("output", "bar"), ("from_end", "true")]).contains("-Dwukong.input.kafka.offset=-1"));
        assert!(launch(&[("input", "foo"), ("output", "bar"), ("offset", "1234")]).contains("-Dwukong.input.kafka.offset=1234"));
    }

    #[test]
    fn file_spout_flags() {
        let cmd = launch(&[("input", "file:///foo/bar"), ("output", "baz"), ("offset", "bing-1")]);
        assert!(cmd.contains("-Dwukong.input.type=blob"));
        assert!(cmd.contains("-Dwukong.input.blob.type=file"));
        assert!(cmd.contains("-Dwukong.input.blob.path=/foo/bar"));
        assert!(cmd.contains("-Dwukong.input.blob.start=EXPLICIT"));
        assert!(cmd.contains("-Dwukong.input.blob.marker=bing-1"));
        assert!(!cmd.contains("wukong.input.kafka"));
    }

    #[test]
    fn blob_marker_survives_a_winning_start_policy() {
        let cmd = launch(&[("input", "file:///foo/bar"), ("output", "baz"), ("offset", "bing-1"), ("from_end", "true")]);
        assert!(cmd.contains("-Dwukong.input.blob.start=LATEST"), "{cmd}");
        assert!(cmd.contains("-Dwukong.input.blob.marker=bing-1"), "{cmd}");

        let cmd = launch(&[("input", "s3://foo/bar"), ("output", "baz"), ("aws_key", "k"), ("aws_secret", "s"), ("offset", "m-7"), ("from_beginning", "true")]);
        assert!(cmd.contains("-Dwukong.input.blob.start=EARLIEST"), "{cmd}");
        assert!(cmd.contains("-Dwukong.input.blob.marker=m-7"), "{cmd}");

        let cmd = launch(&[("input", "file:///foo/bar"), ("output", "baz")]);
        assert!(!cmd.contains("wukong.input.blob.marker"), "{cmd}");
    }

    #[test]
    fn s3_spout_flags() {
        let cmd = launch(&[
            ("input", "s3://foo/bar"),
            ("output", "baz"),
            ("aws_key", "key"),
            ("aws_secret", "secret"),
            ("aws_region", "us-west-1"),
        ]);
        for needle in [
            "-Dwukong.input.blob.type=s3",
            "-Dwukong.input.blob.path=bar",
            "-Dwukong.input.blob.s3_bucket=foo",
            "-Dwukong.input.blob.aws_key=key",
            "-Dwukong.input.blob.aws_secret=secret",
            "-Dwukong.input.blob.s3_endpoint=s3-us-west-1.amazonaws.com",
            "-Dwukong.input.blob.start=RESUME",
        ] {
            assert!(cmd.contains(needle), "missing {needle} in {cmd}");
        }
    }

    #[test]
    fn worker_commandline_forwards_only_worker_settings() {
        let s = settings(&[("input", "foo"), ("output", "bar"), ("aws_secret", "shh"), ("environment", "production"), ("greeting", "hi there")]);
        let h = host();
        let cmd = Synthesizer::new(&s, &h).worker_commandline();
        assert_eq!(cmd, "squall-bolt identity --environment=production --greeting='hi there'");
    }

    #[test]
    fn worker_commandline_honours_prefix_and_override() {
        let s = settings(&[("command_prefix", "bundle exec")]);
        let h = host();
        assert_eq!(Synthesizer::new(&s, &h).worker_commandline(), "bundle exec squall-bolt identity");

        let s = settings(&[("bolt_command", "uniq -c"), ("environment", "production")]);
        assert_eq!(Synthesizer::new(&s, &h).worker_commandline(), "uniq -c");
    }

    #[test]
    fn worker_command_is_embedded_escaped() {
        let cmd = launch(&[("input", "foo"), ("output", "bar"), ("command_prefix", "bundle exec")]);
        assert!(cmd.contains("-Dwukong.command='bundle exec squall-bolt identity'"), "{cmd}");
    }

    #[test]
    fn kill_command_shape() {
        let s = settings(&[("wait", "1")]);
        let h = host();
        assert_eq!(Synthesizer::new(&s, &h).kill_command().render(), "storm kill identity -w 1 > /dev/null 2>&1");
        let s = settings(&[("name", "myFlow")]);
        assert_eq!(Synthesizer::new(&s, &h).kill_command().render(), "storm kill myFlow -w 300 > /dev/null 2>&1");
    }

    #[test]
    fn runner_path_three_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().to_string_lossy().into_owned();

        let s = settings(&[("storm_home", home.as_str())]);
        assert_eq!(resolve_runner_path(&s), "storm");

        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin").join("storm"), b"#!/bin/sh\n").unwrap();
        let expected = dir.path().join("bin").join("storm").to_string_lossy().into_owned();
        assert_eq!(resolve_runner_path(&s), expected);

        let s = settings(&[("storm_home", home.as_str()), ("storm_runner", "/opt/bin/storm")]);
        assert_eq!(resolve_runner_path(&s), "/opt/bin/storm");
    }

    #[test]
    fn jar_override_wins() {
        let s = settings(&[("jar", "/tmp/x.jar")]);
        assert_eq!(resolve_jar_path(&s), "/tmp/x.jar");
        assert!(resolve_jar_path(&settings(&[])).ends_with(SUBMITTER_JAR));
    }
}
