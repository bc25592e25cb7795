//! Fully-populated settings for one invocation.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ValidationError;
use crate::options::{OptionRegistry, REGISTRY};

/// Key/value settings with registry defaults applied. Owned by one run and
/// never mutated after [`ResolvedSettings::resolve`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedSettings {
    /// Positional DATAFLOW|PROCESSOR argument.
    dataflow: Option<String>,
    values: BTreeMap<String, String>,
}

impl ResolvedSettings {
    /// Resolve against the global registry and the process environment.
    pub fn resolve<I, K, V>(dataflow: Option<String>, explicit: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::resolve_with(&REGISTRY, dataflow, explicit, |var| std::env::var(var).ok())
    }

    /// Precedence: explicit value, then the descriptor's environment variable,
    /// then the registry default. Explicit empty values are kept so they can
    /// override a default.
    pub fn resolve_with<I, K, V, E>(registry: &OptionRegistry, dataflow: Option<String>, explicit: I, env: E) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        E: Fn(&str) -> Option<String>,
    {
        let mut values: BTreeMap<String, String> = explicit.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        for d in registry.iter() {
            if values.contains_key(d.key) { continue; }
            let from_env = d.env.and_then(|var| env(var)).filter(|v| !v.is_empty());
            if let Some(v) = from_env.or_else(|| d.default.map(str::to_string)) {
                values.insert(d.key.to_string(), v);
            }
        }
        let dataflow = dataflow.filter(|s| !s.trim().is_empty());
        Self { dataflow, values }
    }

    /// Non-blank value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(), Some("true" | "1" | "yes" | "on"))
    }

    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, ValidationError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| ValidationError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Name of the dataflow/processor: the positional argument, else `--run`.
    pub fn dataflow_name(&self) -> Option<&str> {
        self.dataflow.as_deref().or_else(|| self.get("run"))
    }

    /// Explicit `--name`, else the dataflow name.
    pub fn topology_name(&self) -> Option<&str> {
        self.get("name").or_else(|| self.dataflow_name())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Non-blank settings the worker is allowed to see, ordered by key.
    pub fn forwardable<'a>(&'a self, registry: &'a OptionRegistry) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.iter().filter(move |(k, v)| !v.trim().is_empty() && registry.is_forwardable(k))
    }
}
