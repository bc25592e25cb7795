//! Turns resolved settings into a running topology: locator resolution,
//! command synthesis, the optional kill/wait cycle, the input-topic probe
//! and the launch itself.

#![forbid(unsafe_code)]

pub mod error;
pub mod exec;
pub mod locator;
pub mod orchestrator;
pub mod probe;
pub mod synth;

pub use error::LaunchError;
pub use exec::{EchoExecutor, Executor, ShellExecutor};
pub use locator::{resolve_spout, resolve_state, OffsetPolicy, SpoutConfig, StateConfig};
pub use orchestrator::{plan, LaunchPlan, LaunchReport, LifecycleState, Orchestrator};
pub use probe::{default_probe, BrokerAddr, RetryPolicy, TcpProbe, TopicProbe};
pub use synth::{Command, CommandKind, HostContext, Synthesizer};
