use std::io;
use std::str::FromStr;

use anyhow::Result;
use clap::{Arg, ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};
use squall_core::{ResolvedSettings, Tag, REGISTRY};
use squall_launch::{default_probe, EchoExecutor, Executor, HostContext, LaunchError, LaunchReport, Orchestrator, ShellExecutor};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "squall-storm",
    version,
    about = "Launch a squall dataflow as a Storm topology",
    after_help = "Every setting can also be given as -s KEY=VALUE; settings squall does not know are passed to the worker."
)]
struct Cli {
    /// Processor or dataflow each bolt runs
    #[arg(value_name = "DATAFLOW|PROCESSOR")]
    dataflow: Option<String>,

    /// Output format
    #[arg(long = "format", value_enum, env = "SQUALL_FORMAT", default_value_t = Output::Human)]
    format: Output,

    /// Extra setting, repeatable
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE", value_parser = parse_pair)]
    set: Vec<(String, String)>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// One `--key` flag per registry option. Defaults stay in the registry, so
/// none are declared here.
fn registry_args() -> impl Iterator<Item = Arg> {
    REGISTRY.iter().map(|d| {
        let heading = if d.has(Tag::Native) { "Cluster options" } else { "Launch options" };
        let arg = Arg::new(d.key).long(d.key).help(d.description).help_heading(heading);
        if d.switch {
            arg.num_args(0..=1).require_equals(true).default_missing_value("true").value_name("BOOL")
        } else {
            arg.value_name("VALUE")
        }
    })
}

fn command() -> clap::Command {
    Cli::command().args(registry_args())
}

/// `-s` pairs first, so a dedicated flag for the same key wins.
fn explicit_settings(cli: &Cli, matches: &ArgMatches) -> Vec<(String, String)> {
    let mut explicit = cli.set.clone();
    for d in REGISTRY.iter() {
        if let Some(value) = matches.get_one::<String>(d.key) {
            explicit.retain(|(k, _)| k != d.key);
            explicit.push((d.key.to_string(), value.clone()));
        }
    }
    explicit
}

fn init_tracing() {
    let env = std::env::var("SQUALL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("SQUALL_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid SQUALL_METRICS_ADDR; expected host:port");
        }
    }
}

fn print_report(report: &LaunchReport, format: Output) -> Result<()> {
    match format {
        Output::Json => println!("{}", serde_json::to_string_pretty(report)?),
        // dry-run commands were already echoed by the executor
        Output::Human if report.dry_run => {}
        Output::Human => println!("launched topology {}", report.topology),
    }
    Ok(())
}

async fn run() -> Result<()> {
    let matches = command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;
    let settings = ResolvedSettings::resolve(cli.dataflow.clone(), explicit_settings(&cli, &matches));
    let host = HostContext::discover(&settings).map_err(LaunchError::from)?;

    let executor: Box<dyn Executor> = match (settings.flag("dry_run"), cli.format) {
        // keep stdout clean for the JSON report
        (true, Output::Json) => Box::new(EchoExecutor::new(Box::new(io::stderr()))),
        (true, Output::Human) => Box::new(EchoExecutor::stdout()),
        (false, _) => Box::new(ShellExecutor),
    };
    let probe = default_probe();

    let mut orchestrator = Orchestrator::new(executor.as_ref(), probe.as_ref());
    let report = orchestrator.run(&settings, &host).await?;
    info!(topology = %report.topology, state = ?report.state, "done");
    print_report(&report, cli.format)
}

#[tokio::main]
async fn main() {
    init_tracing();
    init_metrics();
    if let Err(e) = run().await {
        eprintln!("squall-storm: {e:#}");
        std::process::exit(1);
    }
}
