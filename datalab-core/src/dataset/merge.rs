//! Incremental update: fetch increments, align them, append them to history.

use super::Dataset;
use crate::config::MissingPolicy;
use crate::data::align::{align_columns, align_rows};
use crate::data::download::fetch_all;
use crate::data::params::{select_symbol_kwargs, Kwargs};
use crate::data::provider::Fetcher;
use crate::domain::tz::normalize_table;
use crate::domain::{
    infer_frequency, range_index, Axis, ColumnKey, RowKey, Symbol, SymbolMap, SymbolTable,
};
use crate::error::DatasetError;
use tracing::{info, warn};

pub(super) fn update(
    dataset: &Dataset,
    fetcher: &dyn Fetcher,
    kwargs: &Kwargs,
) -> Result<Dataset, DatasetError> {
    let options = &dataset.options;
    let symbols: Vec<Symbol> = dataset.data.keys().cloned().collect();
    let histories: Vec<&SymbolTable> = dataset.data.values().collect();
    info!(
        fetcher = fetcher.name(),
        symbols = symbols.len(),
        parallel = options.parallel,
        "updating"
    );

    // Every fetch completes before anything is aligned or merged.
    let raw = fetch_all(&symbols, options.parallel, |i, symbol| {
        let args = select_symbol_kwargs(symbol, &dataset.download_kwargs)
            .merged(&select_symbol_kwargs(symbol, kwargs));
        fetcher.update_one(symbol, histories[i], &args)
    })?;

    let increments = raw.try_map_values(|symbol, raw| {
        let history = dataset.table(symbol.as_str())?;
        let table = raw.into_table(|n| continue_index(history, n))?;
        normalize_table(table, options.tz_localize, options.tz_convert)
    })?;

    let rows = align_rows(increments, options.missing_index)?;
    let cols = align_columns(rows.tables, options.missing_columns)?;

    let merged = cols.tables.try_map_values(|symbol, increment| {
        let history = dataset.table(symbol.as_str())?;
        let increment = conform_to_history(symbol, history, increment, options.missing_columns)?;
        history.append(&increment)
    })?;

    let updated = Dataset::assemble(
        merged,
        options.clone(),
        dataset.download_kwargs.clone(),
    )?;
    info!(
        rows_before = dataset.index().len(),
        rows_after = updated.index().len(),
        "update merged"
    );
    Ok(updated)
}

/// Row keys for an increment that came without its own, continuing after
/// the history's last key.
fn continue_index(history: &SymbolTable, n: usize) -> Result<Vec<RowKey>, DatasetError> {
    let Some(last) = history.last_key() else {
        return Ok(range_index(0, n));
    };
    match last {
        RowKey::Int(v) => {
            let overflow = || DatasetError::shape("integer row index overflows");
            let start = v.checked_add(1).ok_or_else(overflow)?;
            i64::try_from(n)
                .ok()
                .and_then(|n| v.checked_add(n))
                .ok_or_else(overflow)?;
            Ok(range_index(start, n))
        }
        RowKey::Naive(_) | RowKey::Aware(_) => {
            let freq = infer_frequency(history.index()).ok_or_else(|| {
                DatasetError::shape("cannot continue a time index without a constant frequency")
            })?;
            (1..=n as i64)
                .map(|k| {
                    last.advance(freq, k)
                        .ok_or_else(|| DatasetError::shape("time index overflows"))
                })
                .collect()
        }
        RowKey::Label(_) => Err(DatasetError::shape(
            "cannot continue a label index; the increment must carry its own row keys",
        )),
    }
}

/// Give an aligned increment the history's columns and layout.
///
/// History columns missing from the increment are filled with NaN and
/// increment-only columns are dropped, unless `policy` is `Raise`.
fn conform_to_history(
    symbol: &Symbol,
    history: &SymbolTable,
    increment: SymbolTable,
    policy: MissingPolicy,
) -> Result<SymbolTable, DatasetError> {
    if increment.columns() == history.columns() {
        return Ok(increment.with_layout(history.layout()));
    }
    let extra: Vec<&ColumnKey> = increment
        .columns()
        .iter()
        .filter(|c| history.column_position(c).is_none())
        .collect();
    let missing: Vec<&ColumnKey> = history
        .columns()
        .iter()
        .filter(|c| increment.column_position(c).is_none())
        .collect();

    if policy == MissingPolicy::Raise && !(extra.is_empty() && missing.is_empty()) {
        return Err(DatasetError::Alignment {
            axis: Axis::Columns,
            detail: format!(
                "increment for '{symbol}' has new columns {extra:?} and lacks columns {missing:?}"
            ),
        });
    }
    if !extra.is_empty() {
        warn!(%symbol, ?extra, "dropping increment columns absent from history");
    }
    if !missing.is_empty() {
        warn!(%symbol, ?missing, "setting history columns absent from increment to NaN");
    }
    Ok(increment
        .reindex_columns(history.columns())
        .with_layout(history.layout()))
}
