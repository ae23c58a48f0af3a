//! Cross-symbol projections.

use super::Coordinates;
use crate::domain::{nan_eq, ColumnKey, Layout, RowKey, Symbol, SymbolMap, SymbolTable};
use crate::error::DatasetError;

/// One column of a dataset, across all symbols.
///
/// With a single symbol this is a vector; otherwise a matrix whose second
/// axis ranges over symbols.
#[derive(Debug, Clone)]
pub struct Projection {
    column: ColumnKey,
    index: Vec<RowKey>,
    symbols: Vec<Symbol>,
    values: Vec<Vec<f64>>,
}

impl PartialEq for Projection {
    fn eq(&self, other: &Self) -> bool {
        self.column == other.column
            && self.index == other.index
            && self.symbols == other.symbols
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| nan_eq(a, b))
    }
}

impl Projection {
    pub fn column(&self) -> &ColumnKey {
        &self.column
    }

    pub fn index(&self) -> &[RowKey] {
        &self.index
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn is_vector(&self) -> bool {
        self.symbols.len() == 1
    }

    /// Values of one symbol.
    pub fn get(&self, symbol: &str) -> Option<&[f64]> {
        self.symbols
            .iter()
            .position(|s| s.as_str() == symbol)
            .map(|i| self.values[i].as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &[f64])> {
        self.symbols
            .iter()
            .zip(self.values.iter().map(Vec::as_slice))
    }

    /// As a table: a vector named after the column for one symbol, otherwise
    /// a matrix with one column per symbol.
    pub fn to_table(&self) -> Result<SymbolTable, DatasetError> {
        if self.is_vector() {
            SymbolTable::new(
                self.index.clone(),
                vec![self.column.clone()],
                Layout::Vector { named: true },
                self.values.clone(),
            )
        } else {
            SymbolTable::matrix(
                self.index.clone(),
                self.symbols
                    .iter()
                    .map(|s| ColumnKey::from(s.as_str()))
                    .collect(),
                self.values.clone(),
            )
        }
    }
}

/// All projections of a dataset, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatView {
    projections: Vec<Projection>,
}

impl ConcatView {
    pub(super) fn build(coords: &Coordinates, data: &SymbolMap<SymbolTable>) -> Self {
        let symbols: Vec<Symbol> = data.keys().cloned().collect();
        let projections = coords
            .columns()
            .iter()
            .enumerate()
            .map(|(j, column)| Projection {
                column: column.clone(),
                index: coords.index().to_vec(),
                symbols: symbols.clone(),
                values: data.values().map(|t| t.values()[j].clone()).collect(),
            })
            .collect();
        Self { projections }
    }

    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    pub fn get(&self, column: &ColumnKey) -> Option<&Projection> {
        self.projections.iter().find(|p| &p.column == column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnKey> {
        self.projections.iter().map(|p| &p.column)
    }

    pub fn len(&self) -> usize {
        self.projections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }
}

/// Which columns `Dataset::get` should return.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ColumnSelector {
    #[default]
    All,
    One(ColumnKey),
    Many(Vec<ColumnKey>),
}

impl From<&str> for ColumnSelector {
    fn from(s: &str) -> Self {
        ColumnSelector::One(ColumnKey::from(s))
    }
}

impl From<ColumnKey> for ColumnSelector {
    fn from(key: ColumnKey) -> Self {
        ColumnSelector::One(key)
    }
}

impl From<Vec<ColumnKey>> for ColumnSelector {
    fn from(keys: Vec<ColumnKey>) -> Self {
        ColumnSelector::Many(keys)
    }
}

impl From<Option<ColumnKey>> for ColumnSelector {
    fn from(key: Option<ColumnKey>) -> Self {
        key.map_or(ColumnSelector::All, ColumnSelector::One)
    }
}

/// Result of `Dataset::get`.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Table(SymbolTable),
    One(Projection),
    Many(Vec<Projection>),
}

impl Selection {
    pub fn into_table(self) -> Option<SymbolTable> {
        match self {
            Selection::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_projection(self) -> Option<Projection> {
        match self {
            Selection::One(p) => Some(p),
            _ => None,
        }
    }

    pub fn into_projections(self) -> Option<Vec<Projection>> {
        match self {
            Selection::Many(ps) => Some(ps),
            _ => None,
        }
    }
}
