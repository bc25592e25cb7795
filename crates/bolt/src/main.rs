use std::io::{self, BufWriter};
use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use squall_bolt::{BoltDriver, Flow, FramingError, Params, ProcessorRegistry, DEFAULT_DELIMITER};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(
    name = "squall-bolt",
    version,
    about = "Run a processor flow as a bolt: one framed batch per input line",
    after_help = "Any other --key=value is passed to the processors as a parameter (e.g. --times=2 for repeat)."
)]
struct Args {
    /// Processor or flow to run, e.g. `identity` or `tokenize|upcase`
    #[arg(value_name = "PROCESSOR|FLOW")]
    processor: Option<String>,

    /// Processor or flow to run (when not given positionally)
    #[arg(long)]
    run: Option<String>,

    /// Line written after each input line's output
    #[arg(short = 't', long, default_value = DEFAULT_DELIMITER)]
    delimiter: String,
}

const OWN_FLAGS: &[&str] = &["run", "delimiter", "help", "version"];

/// Separate `--key=value` tokens this binary does not define; they become
/// processor parameters. A bare unknown `--flag` is forwarded as `true`.
fn split_forwarded<I: IntoIterator<Item = String>>(argv: I) -> (Vec<String>, Params) {
    let mut own = Vec::new();
    let mut params = Params::new();
    let mut passthrough = false;
    for arg in argv {
        if passthrough || arg == "--" {
            passthrough = true;
            own.push(arg);
            continue;
        }
        let Some(flag) = arg.strip_prefix("--") else {
            own.push(arg);
            continue;
        };
        let (key, value) = match flag.split_once('=') {
            Some((k, v)) => (k, v),
            None => (flag, "true"),
        };
        if OWN_FLAGS.contains(&key) {
            own.push(arg);
        } else {
            params.insert(key.to_string(), value.to_string());
        }
    }
    (own, params)
}

fn init_tracing() {
    let env = std::env::var("SQUALL_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // stdout carries the framing protocol
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

fn run() -> Result<()> {
    let (argv, params) = split_forwarded(std::env::args());
    let args = Args::parse_from(argv);
    init_tracing();

    let expr = args.processor.or(args.run).ok_or(FramingError::MissingProcessor)?;
    let flow = Flow::build(&ProcessorRegistry::builtin(), &expr, &params)?;
    info!(flow = %flow.label(), delimiter = %args.delimiter, params = ?params, "bolt starting");

    let mut driver = BoltDriver::new(flow, args.delimiter);
    let lines = driver.run(io::stdin().lock(), BufWriter::new(io::stdout().lock()))?;
    debug!(lines, "input closed");
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("squall-bolt: {e:#}");
        std::process::exit(1);
    }
}
