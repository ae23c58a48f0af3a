//! Per-symbol tables.
//!
//! A `SymbolTable` is a row-indexed block of `f64` columns for one symbol.
//! Missing values use `NaN` as the null marker (no forward-fill). Tables are
//! stored column-major so column projection and reindexing are cheap.
//!
//! A `RawTable` is what a fetcher hands back: values with optional row keys
//! and optional column keys, not yet validated.

use super::key::{ColumnKey, KeyKind, RowKey};
use crate::error::DatasetError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// Rank of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rank", rename_all = "snake_case")]
pub enum Layout {
    /// Rank-1: exactly one column. `named` is false when the source series
    /// carried no name; its column key is then positional `0`.
    Vector { named: bool },
    /// Rank-2: any number of columns.
    Matrix,
}

impl Layout {
    pub fn is_vector(&self) -> bool {
        matches!(self, Layout::Vector { .. })
    }
}

/// Row-indexed values for a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolTable {
    index: Vec<RowKey>,
    columns: Vec<ColumnKey>,
    layout: Layout,
    #[serde(with = "nan_as_null")]
    values: Vec<Vec<f64>>,
}

impl SymbolTable {
    /// Build a table from column-major values, checking every invariant.
    pub fn new(
        index: Vec<RowKey>,
        columns: Vec<ColumnKey>,
        layout: Layout,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, DatasetError> {
        let table = Self {
            index,
            columns,
            layout,
            values,
        };
        table.validate()?;
        Ok(table)
    }

    pub fn vector(
        index: Vec<RowKey>,
        name: Option<ColumnKey>,
        values: Vec<f64>,
    ) -> Result<Self, DatasetError> {
        let named = name.is_some();
        let key = name.unwrap_or(ColumnKey::Pos(0));
        Self::new(index, vec![key], Layout::Vector { named }, vec![values])
    }

    pub fn matrix(
        index: Vec<RowKey>,
        columns: Vec<ColumnKey>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, DatasetError> {
        Self::new(index, columns, Layout::Matrix, values)
    }

    /// Check shape, key homogeneity, key uniqueness and time ordering.
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.columns.len() != self.values.len() {
            return Err(DatasetError::shape(format!(
                "{} column keys for {} value columns",
                self.columns.len(),
                self.values.len()
            )));
        }
        if self.layout.is_vector() && self.columns.len() != 1 {
            return Err(DatasetError::shape(format!(
                "vector table must have exactly one column, got {}",
                self.columns.len()
            )));
        }
        if let Some((key, col)) = self
            .columns
            .iter()
            .zip(&self.values)
            .find(|(_, col)| col.len() != self.index.len())
        {
            return Err(DatasetError::shape(format!(
                "column '{key}' has {} values for {} row keys",
                col.len(),
                self.index.len()
            )));
        }
        index_kind(&self.index)?;
        if let Some(dup) = first_duplicate(&self.index) {
            return Err(DatasetError::shape(format!("duplicate row key '{dup}'")));
        }
        if let Some(dup) = first_duplicate(&self.columns) {
            return Err(DatasetError::shape(format!("duplicate column key '{dup}'")));
        }
        if self.is_time_like() && self.index.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DatasetError::shape(
                "time-like row keys must be strictly increasing",
            ));
        }
        Ok(())
    }

    pub fn index(&self) -> &[RowKey] {
        &self.index
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Column-major values: `values()[column][row]`.
    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_vector(&self) -> bool {
        self.layout.is_vector()
    }

    /// Series name of a named vector.
    pub fn name(&self) -> Option<&ColumnKey> {
        match self.layout {
            Layout::Vector { named: true } => self.columns.first(),
            _ => None,
        }
    }

    pub fn row_kind(&self) -> Option<KeyKind> {
        self.index.first().map(RowKey::kind)
    }

    pub fn is_time_like(&self) -> bool {
        self.index.first().is_some_and(RowKey::is_time_like)
    }

    pub fn last_key(&self) -> Option<&RowKey> {
        self.index.last()
    }

    pub fn column_position(&self, key: &ColumnKey) -> Option<usize> {
        self.columns.iter().position(|c| c == key)
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&[f64]> {
        self.column_position(key).map(|i| self.values[i].as_slice())
    }

    pub fn row_position(&self, key: &RowKey) -> Option<usize> {
        self.index.iter().position(|k| k == key)
    }

    pub fn value(&self, row: &RowKey, column: &ColumnKey) -> Option<f64> {
        let r = self.row_position(row)?;
        let c = self.column_position(column)?;
        Some(self.values[c][r])
    }

    pub(crate) fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Map every row key, keeping values in place.
    pub(crate) fn try_map_index(
        mut self,
        f: impl FnMut(RowKey) -> Result<RowKey, DatasetError>,
    ) -> Result<Self, DatasetError> {
        self.index = self.index.into_iter().map(f).collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Place rows onto `target`; keys this table lacks become NaN rows.
    pub fn reindex_rows(&self, target: &[RowKey]) -> SymbolTable {
        let positions: HashMap<&RowKey, usize> =
            self.index.iter().enumerate().map(|(i, k)| (k, i)).collect();
        let rows: Vec<Option<usize>> = target.iter().map(|k| positions.get(k).copied()).collect();
        let values = self
            .values
            .iter()
            .map(|col| {
                rows.iter()
                    .map(|r| r.map_or(f64::NAN, |i| col[i]))
                    .collect()
            })
            .collect();
        SymbolTable {
            index: target.to_vec(),
            columns: self.columns.clone(),
            layout: self.layout,
            values,
        }
    }

    /// Place columns onto `target`; keys this table lacks become NaN columns.
    ///
    /// The result is a matrix unless `target` has a single key and this
    /// table is a vector.
    pub fn reindex_columns(&self, target: &[ColumnKey]) -> SymbolTable {
        let values = target
            .iter()
            .map(|key| match self.column(key) {
                Some(col) => col.to_vec(),
                None => vec![f64::NAN; self.n_rows()],
            })
            .collect();
        let layout = if target.len() == 1 && self.is_vector() {
            self.layout
        } else {
            Layout::Matrix
        };
        SymbolTable {
            index: self.index.clone(),
            columns: target.to_vec(),
            layout,
            values,
        }
    }

    /// Column subset in the requested order.
    pub fn select_columns(&self, keys: &[ColumnKey]) -> Result<SymbolTable, DatasetError> {
        if let Some(missing) = keys.iter().find(|k| self.column_position(k).is_none()) {
            return Err(DatasetError::UnknownColumn(missing.clone()));
        }
        if let Some(dup) = first_duplicate(keys) {
            return Err(DatasetError::shape(format!("column '{dup}' selected twice")));
        }
        Ok(self.reindex_columns(keys))
    }

    /// One column as a vector table named after the column.
    pub fn column_table(&self, key: &ColumnKey) -> Result<SymbolTable, DatasetError> {
        let col = self
            .column(key)
            .ok_or_else(|| DatasetError::UnknownColumn(key.clone()))?;
        let layout = match self.layout {
            Layout::Vector { named } => Layout::Vector { named },
            Layout::Matrix => Layout::Vector { named: true },
        };
        Ok(SymbolTable {
            index: self.index.clone(),
            columns: vec![key.clone()],
            layout,
            values: vec![col.to_vec()],
        })
    }

    /// Positional row slice; out-of-range bounds are clamped.
    pub fn take_rows(&self, range: Range<usize>) -> SymbolTable {
        let end = range.end.min(self.n_rows());
        let start = range.start.min(end);
        SymbolTable {
            index: self.index[start..end].to_vec(),
            columns: self.columns.clone(),
            layout: self.layout,
            values: self.values.iter().map(|c| c[start..end].to_vec()).collect(),
        }
    }

    pub(crate) fn pick_rows(&self, positions: &[usize]) -> SymbolTable {
        SymbolTable {
            index: positions.iter().map(|&i| self.index[i].clone()).collect(),
            columns: self.columns.clone(),
            layout: self.layout,
            values: self
                .values
                .iter()
                .map(|c| positions.iter().map(|&i| c[i]).collect())
                .collect(),
        }
    }

    /// Stable sort by row key when the index is time-like.
    pub(crate) fn sorted_by_time(self) -> SymbolTable {
        if !self.is_time_like() || self.index.windows(2).all(|w| w[0] <= w[1]) {
            return self;
        }
        let mut order: Vec<usize> = (0..self.n_rows()).collect();
        order.sort_by(|a, b| self.index[*a].cmp(&self.index[*b]));
        self.pick_rows(&order)
    }

    /// Append `incoming` below this table.
    ///
    /// Duplicate row keys keep the later (incoming) occurrence, at its own
    /// position. Time-like results are sorted afterwards.
    pub fn append(&self, incoming: &SymbolTable) -> Result<SymbolTable, DatasetError> {
        if self.columns != incoming.columns {
            return Err(DatasetError::shape(format!(
                "cannot append columns {:?} to columns {:?}",
                incoming.columns, self.columns
            )));
        }
        if let (Some(a), Some(b)) = (self.row_kind(), incoming.row_kind()) {
            if a != b {
                return Err(DatasetError::shape(format!(
                    "cannot append {b} row keys to {a} row keys"
                )));
            }
        }

        let stacked = SymbolTable {
            index: self.index.iter().chain(&incoming.index).cloned().collect(),
            columns: self.columns.clone(),
            layout: self.layout,
            values: self
                .values
                .iter()
                .zip(&incoming.values)
                .map(|(a, b)| a.iter().chain(b).copied().collect())
                .collect(),
        };

        let mut last_seen: HashMap<&RowKey, usize> = HashMap::with_capacity(stacked.n_rows());
        for (i, key) in stacked.index.iter().enumerate() {
            last_seen.insert(key, i);
        }
        let keep: Vec<usize> = (0..stacked.n_rows())
            .filter(|i| last_seen.get(&stacked.index[*i]) == Some(i))
            .collect();

        Ok(stacked.pick_rows(&keep).sorted_by_time())
    }
}

impl PartialEq for SymbolTable {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.columns == other.columns
            && self.layout == other.layout
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| nan_eq(a, b))
    }
}

/// Element-wise equality that treats two NaNs as equal.
pub fn nan_eq(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
}

/// Kind shared by every key of `keys`, or an error if kinds are mixed.
pub(crate) fn index_kind(keys: &[RowKey]) -> Result<Option<KeyKind>, DatasetError> {
    let Some(first) = keys.first() else {
        return Ok(None);
    };
    let kind = first.kind();
    match keys.iter().find(|k| k.kind() != kind) {
        Some(other) => Err(DatasetError::shape(format!(
            "row index mixes {kind} and {} keys",
            other.kind()
        ))),
        None => Ok(Some(kind)),
    }
}

fn first_duplicate<K: Eq + std::hash::Hash>(keys: &[K]) -> Option<&K> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter().find(|k| !seen.insert(*k))
}

/// Values as supplied by a fetcher.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValues {
    /// Rank-1 values.
    Vector(Vec<f64>),
    /// Rank-2 values, row-major.
    Rows(Vec<Vec<f64>>),
    /// Rank-2 values, column-major.
    Columns(Vec<Vec<f64>>),
}

/// Unvalidated per-symbol data, optionally carrying its own row keys.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    values: RawValues,
    index: Option<Vec<RowKey>>,
    columns: Option<Vec<ColumnKey>>,
}

impl RawTable {
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            values: RawValues::Vector(values),
            index: None,
            columns: None,
        }
    }

    /// Rank-2 values given row by row.
    pub fn matrix(rows: Vec<Vec<f64>>) -> Self {
        Self {
            values: RawValues::Rows(rows),
            index: None,
            columns: None,
        }
    }

    /// Rank-2 values given column by column, with their keys.
    pub fn from_columns(columns: Vec<ColumnKey>, data: Vec<Vec<f64>>) -> Self {
        Self {
            values: RawValues::Columns(data),
            index: None,
            columns: Some(columns),
        }
    }

    pub fn with_index(mut self, index: Vec<RowKey>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnKey>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Name a rank-1 table.
    pub fn with_name(self, name: impl Into<ColumnKey>) -> Self {
        self.with_columns(vec![name.into()])
    }

    pub fn values(&self) -> &RawValues {
        &self.values
    }

    pub fn index(&self) -> Option<&[RowKey]> {
        self.index.as_deref()
    }

    pub fn columns(&self) -> Option<&[ColumnKey]> {
        self.columns.as_deref()
    }

    pub fn is_vector(&self) -> bool {
        matches!(self.values, RawValues::Vector(_))
    }

    pub fn n_rows(&self) -> usize {
        match &self.values {
            RawValues::Vector(v) => v.len(),
            RawValues::Rows(rows) => rows.len(),
            RawValues::Columns(cols) => cols.first().map_or(0, Vec::len),
        }
    }

    /// Keep rows whose key is at or after `key`.
    ///
    /// Only keys of the same kind as `key` are compared. Tables without row
    /// keys are kept whole, and so are naive keys checked against an aware
    /// `key`: their zone is unknown until the dataset localizes them.
    pub fn since(self, key: &RowKey) -> RawTable {
        let Some(index) = &self.index else {
            return self;
        };
        let keep: Vec<bool> = index
            .iter()
            .map(|k| k.kind() != key.kind() || k >= key)
            .collect();
        if keep.iter().all(|k| *k) {
            return self;
        }
        let filter = |v: Vec<f64>| -> Vec<f64> {
            v.into_iter()
                .zip(&keep)
                .filter_map(|(x, k)| k.then_some(x))
                .collect()
        };
        let values = match self.values {
            RawValues::Vector(v) => RawValues::Vector(filter(v)),
            RawValues::Rows(rows) => RawValues::Rows(
                rows.into_iter()
                    .zip(&keep)
                    .filter_map(|(r, k)| k.then_some(r))
                    .collect(),
            ),
            RawValues::Columns(cols) => {
                RawValues::Columns(cols.into_iter().map(filter).collect())
            }
        };
        let index = self
            .index
            .map(|ix| {
                ix.into_iter()
                    .zip(&keep)
                    .filter_map(|(r, k)| k.then_some(r))
                    .collect()
            });
        RawTable {
            values,
            index,
            columns: self.columns,
        }
    }

    /// Validate and convert into a `SymbolTable`.
    ///
    /// `fallback_index` is called with the row count when the raw table
    /// carries no row keys of its own.
    pub(crate) fn into_table(
        self,
        fallback_index: impl FnOnce(usize) -> Result<Vec<RowKey>, DatasetError>,
    ) -> Result<SymbolTable, DatasetError> {
        let n_rows = self.n_rows();
        let (layout, data) = match self.values {
            RawValues::Vector(v) => (
                Layout::Vector {
                    named: self.columns.is_some(),
                },
                vec![v],
            ),
            RawValues::Rows(rows) => {
                let width = rows
                    .first()
                    .map(Vec::len)
                    .or_else(|| self.columns.as_ref().map(Vec::len))
                    .unwrap_or(0);
                if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
                    return Err(DatasetError::shape(format!(
                        "row {i} has {} values, expected {width}",
                        row.len()
                    )));
                }
                let mut cols: Vec<Vec<f64>> = vec![Vec::with_capacity(rows.len()); width];
                for row in &rows {
                    for (c, v) in row.iter().enumerate() {
                        cols[c].push(*v);
                    }
                }
                (Layout::Matrix, cols)
            }
            RawValues::Columns(cols) => {
                if let Some((i, col)) = cols.iter().enumerate().find(|(_, c)| c.len() != n_rows) {
                    return Err(DatasetError::shape(format!(
                        "column {i} has {} values, expected {n_rows}",
                        col.len()
                    )));
                }
                (Layout::Matrix, cols)
            }
        };

        let columns = match self.columns {
            Some(keys) if keys.len() != data.len() => {
                return Err(DatasetError::shape(format!(
                    "{} column keys for {} value columns",
                    keys.len(),
                    data.len()
                )));
            }
            Some(keys) => keys,
            None => (0..data.len()).map(|i| ColumnKey::Pos(i as i64)).collect(),
        };

        let index = match self.index {
            Some(ix) if ix.len() != n_rows => {
                return Err(DatasetError::shape(format!(
                    "{} row keys for {n_rows} rows",
                    ix.len()
                )));
            }
            Some(ix) => ix,
            None => fallback_index(n_rows)?,
        };

        let table = SymbolTable {
            index,
            columns,
            layout,
            values: data,
        };
        index_kind(table.index())?;
        let table = table.sorted_by_time();
        table.validate()?;
        Ok(table)
    }
}

/// `0..n` as integer row keys, offset by `start`.
///
/// `start + n - 1` must fit in an `i64`; callers continuing an existing
/// index check that first.
pub fn range_index(start: i64, n: usize) -> Vec<RowKey> {
    (0..n as i64).map(|i| RowKey::Int(start + i)).collect()
}

/// JSON has no NaN; encode the null marker as `null`.
mod nan_as_null {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[Vec<f64>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for col in values {
            let col: Vec<Option<f64>> = col.iter().map(|v| (!v.is_nan()).then_some(*v)).collect();
            seq.serialize_element(&col)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<f64>>, D::Error> {
        let raw: Vec<Vec<Option<f64>>> = Vec::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|col| col.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect())
    }
}
