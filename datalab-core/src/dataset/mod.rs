//! The multi-symbol dataset container.
//!
//! A `Dataset` owns one table per symbol, all sharing the same row keys,
//! column keys and layout (the coordinates). It is never mutated: `update`
//! and the slicing methods return new datasets.

mod merge;
mod persist;
mod view;

pub use persist::{FORMAT, FORMAT_VERSION};
pub use view::{ColumnSelector, ConcatView, Projection, Selection};

use crate::config::DatasetOptions;
use crate::data::align::{align_columns, align_rows};
use crate::data::download::fetch_all;
use crate::data::params::{select_symbol_kwargs, Kwargs};
use crate::data::provider::Fetcher;
use crate::domain::tz::normalize_table;
use crate::domain::{
    infer_frequency, range_index, ColumnKey, Frequency, Layout, RawTable, RowKey, Symbol,
    SymbolMap, SymbolTable,
};
use crate::error::DatasetError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Range;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Shared coordinate space of every table in a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    index: Vec<RowKey>,
    columns: Vec<ColumnKey>,
    layout: Layout,
    freq: Option<Frequency>,
}

impl Coordinates {
    fn of(table: &SymbolTable) -> Self {
        Self {
            index: table.index().to_vec(),
            columns: table.columns().to_vec(),
            layout: table.layout(),
            freq: infer_frequency(table.index()),
        }
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

    /// Constant row spacing, when the index has one.
    pub fn freq(&self) -> Option<Frequency> {
        self.freq
    }

    fn check(&self, symbol: &Symbol, table: &SymbolTable) -> Result<(), DatasetError> {
        if table.index() != self.index.as_slice() {
            return Err(DatasetError::shape(format!(
                "symbol '{symbol}' does not share the dataset row index"
            )));
        }
        if table.columns() != self.columns.as_slice() {
            return Err(DatasetError::shape(format!(
                "symbol '{symbol}' does not share the dataset columns"
            )));
        }
        if table.layout() != self.layout {
            return Err(DatasetError::shape(format!(
                "symbol '{symbol}' has a different rank than the first symbol"
            )));
        }
        Ok(())
    }
}

/// Aligned per-symbol tables plus the settings used to build them.
///
/// Deserializing runs `validate`, so a decoded dataset always holds its
/// shared-coordinate invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredDataset")]
pub struct Dataset {
    coords: Coordinates,
    data: SymbolMap<SymbolTable>,
    options: DatasetOptions,
    download_kwargs: Kwargs,
    #[serde(skip)]
    concat_memo: OnceLock<Arc<ConcatView>>,
}

/// Decoded fields of a `Dataset`, not yet validated.
#[derive(Deserialize)]
struct StoredDataset {
    coords: Coordinates,
    data: SymbolMap<SymbolTable>,
    options: DatasetOptions,
    download_kwargs: Kwargs,
}

impl TryFrom<StoredDataset> for Dataset {
    type Error = DatasetError;

    fn try_from(stored: StoredDataset) -> Result<Self, Self::Error> {
        let dataset = Dataset {
            coords: stored.coords,
            data: stored.data,
            options: stored.options,
            download_kwargs: stored.download_kwargs,
            concat_memo: OnceLock::new(),
        };
        dataset.validate()?;
        Ok(dataset)
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.coords == other.coords
            && self.data == other.data
            && self.options == other.options
            && self.download_kwargs == other.download_kwargs
    }
}

fn dedup_symbols<S: Into<Symbol>>(symbols: impl IntoIterator<Item = S>) -> Vec<Symbol> {
    let mut out: Vec<Symbol> = Vec::new();
    for symbol in symbols {
        let symbol = symbol.into();
        if !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}

impl Dataset {
    /// Fetch every symbol and align the results.
    ///
    /// Symbols keep the caller's order; duplicates are dropped. Any fetch
    /// error aborts the whole call and is returned unchanged.
    pub fn download<S: Into<Symbol>>(
        fetcher: &dyn Fetcher,
        symbols: impl IntoIterator<Item = S>,
        kwargs: Kwargs,
        options: DatasetOptions,
    ) -> Result<Self, DatasetError> {
        let symbols = dedup_symbols(symbols);
        if symbols.is_empty() {
            return Err(DatasetError::config("at least one symbol is required"));
        }
        info!(
            fetcher = fetcher.name(),
            symbols = symbols.len(),
            parallel = options.parallel,
            "downloading"
        );
        let raw = fetch_all(&symbols, options.parallel, |_, symbol| {
            fetcher.download_one(symbol, &select_symbol_kwargs(symbol, &kwargs))
        })?;
        Self::build(raw, options, kwargs)
    }

    /// Build from tables supplied by the caller.
    pub fn from_raw(
        raw: SymbolMap<RawTable>,
        options: DatasetOptions,
    ) -> Result<Self, DatasetError> {
        Self::build(raw, options, Kwargs::new())
    }

    fn build(
        raw: SymbolMap<RawTable>,
        options: DatasetOptions,
        kwargs: Kwargs,
    ) -> Result<Self, DatasetError> {
        if raw.is_empty() {
            return Err(DatasetError::config("at least one symbol is required"));
        }
        let tables = raw.try_map_values(|_, raw| {
            let table = raw.into_table(|n| Ok(range_index(0, n)))?;
            normalize_table(table, options.tz_localize, options.tz_convert)
        })?;
        Self::from_tables(tables, options, kwargs)
    }

    /// Align already-validated tables and wrap them.
    fn from_tables(
        tables: SymbolMap<SymbolTable>,
        options: DatasetOptions,
        kwargs: Kwargs,
    ) -> Result<Self, DatasetError> {
        let rows = align_rows(tables, options.missing_index)?;
        let cols = align_columns(rows.tables, options.missing_columns)?;
        Self::assemble(cols.tables, options, kwargs)
    }

    /// Wrap aligned tables, checking they share one coordinate space.
    fn assemble(
        data: SymbolMap<SymbolTable>,
        options: DatasetOptions,
        download_kwargs: Kwargs,
    ) -> Result<Self, DatasetError> {
        let (_, first) = data
            .first()
            .ok_or_else(|| DatasetError::config("at least one symbol is required"))?;
        let coords = Coordinates::of(first);
        for (symbol, table) in data.iter() {
            coords.check(symbol, table)?;
        }
        Ok(Self {
            coords,
            data,
            options,
            download_kwargs,
            concat_memo: OnceLock::new(),
        })
    }

    /// Check every invariant; used after deserializing.
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.data.is_empty() {
            return Err(DatasetError::config("dataset has no symbols"));
        }
        for (symbol, table) in self.data.iter() {
            table.validate()?;
            self.coords.check(symbol, table)?;
        }
        if self.coords.freq != infer_frequency(&self.coords.index) {
            return Err(DatasetError::shape("stored frequency does not match the index"));
        }
        Ok(())
    }

    /// Fetch increments for every symbol and merge them into a new dataset.
    ///
    /// Update arguments are resolved per symbol and laid over the symbol's
    /// original download arguments. `self` is left untouched, also on error.
    pub fn update(&self, fetcher: &dyn Fetcher, kwargs: &Kwargs) -> Result<Dataset, DatasetError> {
        merge::update(self, fetcher, kwargs)
    }

    pub fn coords(&self) -> &Coordinates {
        &self.coords
    }

    pub fn index(&self) -> &[RowKey] {
        &self.coords.index
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.coords.columns
    }

    pub fn layout(&self) -> Layout {
        self.coords.layout
    }

    pub fn freq(&self) -> Option<Frequency> {
        self.coords.freq
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.data.keys()
    }

    pub fn n_symbols(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &SymbolMap<SymbolTable> {
        &self.data
    }

    pub fn table(&self, symbol: &str) -> Result<&SymbolTable, DatasetError> {
        self.data
            .get(symbol)
            .ok_or_else(|| DatasetError::UnknownSymbol(Symbol::from(symbol)))
    }

    pub fn options(&self) -> &DatasetOptions {
        &self.options
    }

    /// Keyword arguments of the original download.
    pub fn download_kwargs(&self) -> &Kwargs {
        &self.download_kwargs
    }

    /// Per-column projections across symbols, computed once per dataset.
    pub fn concat(&self) -> Arc<ConcatView> {
        Arc::clone(
            self.concat_memo
                .get_or_init(|| Arc::new(ConcatView::build(&self.coords, &self.data))),
        )
    }

    /// Select data by column.
    ///
    /// A single-symbol dataset returns its table (column-sliced when asked).
    /// Otherwise projections from `concat` are returned; with only one
    /// column that projection is returned for any selector.
    pub fn get(&self, selector: impl Into<ColumnSelector>) -> Result<Selection, DatasetError> {
        let selector = selector.into();
        if let (1, Some((_, table))) = (self.data.len(), self.data.first()) {
            return match selector {
                ColumnSelector::All => Ok(Selection::Table(table.clone())),
                ColumnSelector::One(key) => table.column_table(&key).map(Selection::Table),
                ColumnSelector::Many(keys) => table.select_columns(&keys).map(Selection::Table),
            };
        }

        let concat = self.concat();
        if let [only] = concat.projections() {
            return Ok(Selection::One(only.clone()));
        }
        match selector {
            ColumnSelector::All => Ok(Selection::Many(concat.projections().to_vec())),
            ColumnSelector::One(key) => concat
                .get(&key)
                .cloned()
                .map(Selection::One)
                .ok_or(DatasetError::UnknownColumn(key)),
            ColumnSelector::Many(keys) => keys
                .iter()
                .map(|key| {
                    concat
                        .get(key)
                        .cloned()
                        .ok_or_else(|| DatasetError::UnknownColumn(key.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Selection::Many),
        }
    }

    fn map_tables(
        &self,
        mut f: impl FnMut(&SymbolTable) -> Result<SymbolTable, DatasetError>,
    ) -> Result<Dataset, DatasetError> {
        let data = self
            .data
            .iter()
            .map(|(symbol, table)| Ok((symbol.clone(), f(table)?)))
            .collect::<Result<SymbolMap<_>, DatasetError>>()?;
        Self::assemble(data, self.options.clone(), self.download_kwargs.clone())
    }

    /// Positional row range, clamped to the row count.
    pub fn slice_rows(&self, range: Range<usize>) -> Result<Dataset, DatasetError> {
        self.map_tables(|t| Ok(t.take_rows(range.clone())))
    }

    /// Rows whose key lies within `start..=end`; either bound may be open.
    pub fn slice_keys(
        &self,
        start: Option<&RowKey>,
        end: Option<&RowKey>,
    ) -> Result<Dataset, DatasetError> {
        let within = |key: &RowKey| {
            let after_start = start.map_or(true, |s| {
                matches!(key.loose_cmp(s), Some(Ordering::Greater | Ordering::Equal))
            });
            let before_end = end.map_or(true, |e| {
                matches!(key.loose_cmp(e), Some(Ordering::Less | Ordering::Equal))
            });
            after_start && before_end
        };
        let positions: Vec<usize> = self
            .index()
            .iter()
            .enumerate()
            .filter_map(|(i, k)| within(k).then_some(i))
            .collect();
        self.map_tables(|t| Ok(t.pick_rows(&positions)))
    }

    /// Column subset in the requested order.
    pub fn select_columns(&self, keys: &[ColumnKey]) -> Result<Dataset, DatasetError> {
        self.map_tables(|t| t.select_columns(keys))
    }
}
