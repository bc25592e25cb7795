use thiserror::Error;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("provide a processor or dataflow to run (positional PROCESSOR|FLOW or --run)")]
    MissingProcessor,
    #[error("unknown processor '{name}' (available: {available})")]
    UnknownProcessor { name: String, available: String },
    #[error("flow '{0}' has an empty stage")]
    EmptyStage(String),
    #[error("invalid value for --{key}: '{value}' ({reason})")]
    InvalidParam { key: String, value: String, reason: String },
    #[error("stream ended after {0} record(s) without a delimiter")]
    Truncated(usize),
    #[error("framing stream i/o: {0}")]
    Io(#[from] std::io::Error),
}
