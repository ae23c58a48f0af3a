//! Symbols and the insertion-ordered symbol map.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Key identifying one per-entity series (a ticker, an account, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&Symbol> for Symbol {
    fn from(s: &Symbol) -> Self {
        s.clone()
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Map from symbol to value that remembers insertion order.
///
/// Alignment folds tables in this order, so "first table" always means the
/// first symbol inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolMap<T> {
    entries: Vec<(Symbol, T)>,
}

impl<T> Default for SymbolMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> SymbolMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    /// Insert or replace. A replaced entry keeps its original position.
    pub fn insert(&mut self, symbol: impl Into<Symbol>, value: T) -> Option<T> {
        let symbol = symbol.into();
        match self.position(symbol.as_str()) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((symbol, value));
                None
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&T> {
        self.position(symbol).map(|i| &self.entries[i].1)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.position(symbol).is_some()
    }

    pub fn position(&self, symbol: &str) -> Option<usize> {
        self.entries.iter().position(|(s, _)| s.as_str() == symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<(&Symbol, &T)> {
        self.entries.first().map(|(s, v)| (s, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.iter().map(|(s, _)| s)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &T)> {
        self.entries.iter().map(|(s, v)| (s, v))
    }

    pub fn map_values<U>(self, mut f: impl FnMut(T) -> U) -> SymbolMap<U> {
        SymbolMap {
            entries: self.entries.into_iter().map(|(s, v)| (s, f(v))).collect(),
        }
    }

    pub fn try_map_values<U, E>(
        self,
        mut f: impl FnMut(&Symbol, T) -> Result<U, E>,
    ) -> Result<SymbolMap<U>, E> {
        let mut out = SymbolMap::with_capacity(self.entries.len());
        for (s, v) in self.entries {
            let mapped = f(&s, v)?;
            out.entries.push((s, mapped));
        }
        Ok(out)
    }
}

impl<T> FromIterator<(Symbol, T)> for SymbolMap<T> {
    fn from_iter<I: IntoIterator<Item = (Symbol, T)>>(iter: I) -> Self {
        let mut map = SymbolMap::new();
        for (s, v) in iter {
            map.insert(s, v);
        }
        map
    }
}

impl<T> IntoIterator for SymbolMap<T> {
    type Item = (Symbol, T);
    type IntoIter = std::vec::IntoIter<(Symbol, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
