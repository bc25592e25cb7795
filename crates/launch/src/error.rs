use squall_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cannot determine launch environment: {0}")]
    Host(#[from] std::io::Error),
    #[error("input topic '{topic}' on {broker} is not available: {cause:#}")]
    Probe { topic: String, broker: String, cause: anyhow::Error },
    #[error("failed to run {what} command: {cause:#}")]
    Exec { what: &'static str, cause: anyhow::Error },
    #[error("failed to launch topology '{topology}' (exit status {code})")]
    LaunchFailed { topology: String, code: i32 },
}
