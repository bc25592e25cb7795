//! Squall core types: the option registry, per-invocation resolved settings,
//! and the validation errors every launch reports before touching the cluster.

#![forbid(unsafe_code)]

pub mod error;
pub mod options;
pub mod settings;

pub use error::ValidationError;
pub use options::{OptionDescriptor, OptionRegistry, Tag, REGISTRY};
pub use settings::ResolvedSettings;

/// Batch delimiter shared by the worker and the cluster-side supervisor.
pub const DEFAULT_DELIMITER: &str = "---";

/// Processors the stock `squall-bolt` worker can run, sorted by name.
pub const BUILTIN_PROCESSORS: &[&str] = &["extract", "identity", "repeat", "skip", "tokenize", "upcase"];

pub mod prelude {
    pub use super::{OptionDescriptor, OptionRegistry, ResolvedSettings, Tag, ValidationError, BUILTIN_PROCESSORS, DEFAULT_DELIMITER};
}
