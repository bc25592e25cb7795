//! Built-in record processors and flows (`a|b|c`) chaining them.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use tracing::warn;

use crate::driver::Transform;
use crate::error::FramingError;

/// Parameters forwarded on the worker command line as `--key=value`.
pub type Params = BTreeMap<String, String>;

pub trait Processor: Send {
    fn name(&self) -> &'static str;
    fn process(&mut self, record: String, emit: &mut dyn FnMut(String)) -> Result<()>;
}

type Factory = fn(&Params) -> Result<Box<dyn Processor>, FramingError>;

/// Name → constructor table for the processors a worker can run.
pub struct ProcessorRegistry {
    factories: BTreeMap<&'static str, Factory>,
}

impl ProcessorRegistry {
    pub fn empty() -> Self {
        Self { factories: BTreeMap::new() }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("identity", |_| Ok(Box::new(Identity)));
        registry.register("skip", |_| Ok(Box::new(Skip)));
        registry.register("tokenize", |_| Ok(Box::new(Tokenize)));
        registry.register("upcase", |_| Ok(Box::new(Upcase)));
        registry.register("repeat", |params| Ok(Box::new(Repeat { times: param_or(params, "times", 3)? })));
        registry.register("extract", |params| {
            let field = params.get("field").cloned().unwrap_or_else(|| "value".to_string());
            Ok(Box::new(Extract { field }))
        });
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: Factory) {
        self.factories.insert(name, factory);
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn build(&self, name: &str, params: &Params) -> Result<Box<dyn Processor>, FramingError> {
        match self.factories.get(name) {
            Some(factory) => factory(params),
            None => Err(FramingError::UnknownProcessor {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            }),
        }
    }
}

fn param_or<T>(params: &Params, key: &str, default: T) -> Result<T, FramingError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match params.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| FramingError::InvalidParam {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

struct Identity;

impl Processor for Identity {
    fn name(&self) -> &'static str { "identity" }
    fn process(&mut self, record: String, emit: &mut dyn FnMut(String)) -> Result<()> {
        emit(record);
        Ok(())
    }
}

struct Skip;

impl Processor for Skip {
    fn name(&self) -> &'static str { "skip" }
    fn process(&mut self, _record: String, _emit: &mut dyn FnMut(String)) -> Result<()> {
        Ok(())
    }
}

/// Whitespace-separated words with surrounding punctuation trimmed.
struct Tokenize;

impl Processor for Tokenize {
    fn name(&self) -> &'static str { "tokenize" }
    fn process(&mut self, record: String, emit: &mut dyn FnMut(String)) -> Result<()> {
        record
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .for_each(|w| emit(w.to_string()));
        Ok(())
    }
}

struct Upcase;

impl Processor for Upcase {
    fn name(&self) -> &'static str { "upcase" }
    fn process(&mut self, record: String, emit: &mut dyn FnMut(String)) -> Result<()> {
        emit(record.to_uppercase());
        Ok(())
    }
}

struct Repeat {
    times: usize,
}

impl Processor for Repeat {
    fn name(&self) -> &'static str { "repeat" }
    fn process(&mut self, record: String, emit: &mut dyn FnMut(String)) -> Result<()> {
        for _ in 0..self.times {
            emit(record.clone());
        }
        Ok(())
    }
}

/// Parses a JSON object and yields one member: strings verbatim, anything
/// else as compact JSON. Objects without the member yield nothing.
struct Extract {
    field: String,
}

impl Processor for Extract {
    fn name(&self) -> &'static str { "extract" }
    fn process(&mut self, record: String, emit: &mut dyn FnMut(String)) -> Result<()> {
        let value: serde_json::Value = serde_json::from_str(&record).context("record is not JSON")?;
        let object = value.as_object().ok_or_else(|| anyhow!("record is not a JSON object"))?;
        match object.get(&self.field) {
            Some(serde_json::Value::String(s)) => emit(s.clone()),
            Some(other) => emit(other.to_string()),
            None => {}
        }
        Ok(())
    }
}

/// Processors chained left to right. A failing stage drops the record
/// for the whole flow and is logged; it never reaches the driver.
pub struct Flow {
    label: String,
    stages: Vec<Box<dyn Processor>>,
}

impl Flow {
    /// `expr` is a single processor name or `a|b|c`.
    pub fn build(registry: &ProcessorRegistry, expr: &str, params: &Params) -> Result<Self, FramingError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(FramingError::MissingProcessor);
        }
        let stages = expr
            .split('|')
            .map(|name| match name.trim() {
                "" => Err(FramingError::EmptyStage(expr.to_string())),
                name => registry.build(name, params),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { label: expr.to_string(), stages })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn run_stages(&mut self, line: &str) -> Result<Vec<String>> {
        let mut records = vec![line.to_string()];
        for stage in self.stages.iter_mut() {
            let mut next = Vec::with_capacity(records.len());
            for record in records {
                stage
                    .process(record, &mut |r| next.push(r))
                    .with_context(|| format!("processor '{}'", stage.name()))?;
            }
            records = next;
        }
        Ok(records)
    }
}

impl Transform for Flow {
    fn transform(&mut self, line: &str, emit: &mut dyn FnMut(String)) {
        match self.run_stages(line) {
            Ok(records) => records.into_iter().for_each(|r| emit(r)),
            Err(e) => warn!(flow = %self.label, error = %format!("{e:#}"), "record dropped after processing error"),
        }
    }
}
