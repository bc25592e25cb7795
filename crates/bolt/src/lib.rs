//! The squall worker.
//!
//! A bolt reads one record per line on stdin, runs it through a processor
//! flow and writes the results followed by a delimiter line, so the
//! cluster-side supervisor always knows when a record is fully handled.

#![forbid(unsafe_code)]

pub mod driver;
pub mod error;
pub mod processors;
pub mod reader;

pub use driver::{BoltDriver, Transform};
pub use error::FramingError;
pub use processors::{Flow, Params, Processor, ProcessorRegistry};
pub use reader::BatchReader;
pub use squall_core::DEFAULT_DELIMITER;
