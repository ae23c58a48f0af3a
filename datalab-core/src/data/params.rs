//! Keyword parameters for fetchers and their per-symbol resolution.
//!
//! Callers pass one `Kwargs` mapping for a whole batch. Each value is either
//! broadcast to every symbol or given per symbol; `select_symbol_kwargs`
//! resolves the mapping for one symbol into plain `FetchArgs`.

use super::provider::FetchError;
use crate::domain::Symbol;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A keyword value that applies to every symbol or only to listed symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum Override<T> {
    Broadcast(T),
    PerSymbol(BTreeMap<Symbol, T>),
}

impl<T> Override<T> {
    pub fn broadcast(value: T) -> Self {
        Override::Broadcast(value)
    }

    pub fn per_symbol<S: Into<Symbol>>(values: impl IntoIterator<Item = (S, T)>) -> Self {
        Override::PerSymbol(values.into_iter().map(|(s, v)| (s.into(), v)).collect())
    }

    /// Value for `symbol`, or `None` if a per-symbol override omits it.
    pub fn resolve(&self, symbol: &Symbol) -> Option<&T> {
        match self {
            Override::Broadcast(v) => Some(v),
            Override::PerSymbol(map) => map.get(symbol),
        }
    }
}

/// Unresolved keyword arguments for a batch of symbols.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kwargs(BTreeMap<String, Override<Value>>);

impl Kwargs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcast `value` under `name` to every symbol.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set `name` for `symbol` only.
    pub fn with_for(
        mut self,
        symbol: impl Into<Symbol>,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.set_for(symbol, name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), Override::Broadcast(value.into()));
    }

    /// Add a per-symbol value. A broadcast value under the same name is
    /// replaced; other per-symbol values are kept.
    pub fn set_for(
        &mut self,
        symbol: impl Into<Symbol>,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) {
        let symbol: Symbol = symbol.into();
        let value: Value = value.into();
        let entry = self
            .0
            .entry(name.into())
            .or_insert_with(|| Override::PerSymbol(BTreeMap::new()));
        if let Override::PerSymbol(map) = entry {
            map.insert(symbol, value);
            return;
        }
        *entry = Override::per_symbol([(symbol, value)]);
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Override<Value>) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Override<Value>> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Override<Value>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Keyword arguments resolved for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchArgs(BTreeMap<String, Value>);

impl FetchArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `self` overlaid with `other`; keys in both take `other`'s value.
    pub fn merged(&self, other: &FetchArgs) -> FetchArgs {
        let mut out = self.clone();
        out.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    pub fn str(&self, name: &str) -> Result<Option<&str>, FetchError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(name, "a string", other)),
        }
    }

    pub fn i64(&self, name: &str) -> Result<Option<i64>, FetchError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| mismatch(name, "an integer", v)),
        }
    }

    pub fn usize(&self, name: &str) -> Result<Option<usize>, FetchError> {
        match self.i64(name)? {
            None => Ok(None),
            Some(v) => usize::try_from(v)
                .map(Some)
                .map_err(|_| FetchError::invalid_argument(name, format!("{v} is negative"))),
        }
    }

    pub fn f64(&self, name: &str) -> Result<Option<f64>, FetchError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| mismatch(name, "a number", v)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>, FetchError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_bool().map(Some).ok_or_else(|| mismatch(name, "a boolean", v)),
        }
    }

    /// An array of strings, or one comma-separated string.
    pub fn string_list(&self, name: &str) -> Result<Option<Vec<String>>, FetchError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect(),
            )),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(mismatch(name, "a list of strings", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(mismatch(name, "a list of strings", other)),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FetchArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn mismatch(name: &str, expected: &str, got: &Value) -> FetchError {
    FetchError::invalid_argument(name, format!("expected {expected}, got {got}"))
}

/// Resolve `kwargs` for one symbol.
///
/// Broadcast values are included as they are. A per-symbol value is
/// included only if `symbol` is listed, so the fetcher's own default
/// applies otherwise.
pub fn select_symbol_kwargs(symbol: &Symbol, kwargs: &Kwargs) -> FetchArgs {
    kwargs
        .iter()
        .filter_map(|(name, value)| value.resolve(symbol).map(|v| (name.clone(), v.clone())))
        .collect()
}
