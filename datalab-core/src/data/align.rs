//! Multi-symbol alignment.
//!
//! Given one table per symbol, reconcile their row keys (and separately their
//! column keys) into a single shared sequence under a `MissingPolicy`.
//! Missing cells get strict NaN (no forward-fill).
//!
//! Tables are folded in symbol order against a running reference key set.
//! Time-like row keys stay sorted; other keys keep the first table's order
//! with newly seen keys appended in the order they are met.

use crate::config::MissingPolicy;
use crate::domain::{Axis, KeyKind, Layout, Symbol, SymbolMap, SymbolTable};
use crate::error::DatasetError;
use std::collections::HashSet;
use std::hash::Hash;
use tracing::warn;

/// A non-fatal alignment event: `symbol` did not match the keys seen so far
/// and `policy` resolved the mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignWarning {
    pub axis: Axis,
    pub policy: MissingPolicy,
    pub symbol: Symbol,
}

/// Aligned tables plus the warnings raised while aligning them.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignOutcome {
    pub tables: SymbolMap<SymbolTable>,
    pub warnings: Vec<AlignWarning>,
}

impl AlignOutcome {
    fn unchanged(tables: SymbolMap<SymbolTable>) -> Self {
        Self {
            tables,
            warnings: Vec::new(),
        }
    }
}

/// Reconcile row keys across symbols.
pub fn align_rows(
    tables: SymbolMap<SymbolTable>,
    policy: MissingPolicy,
) -> Result<AlignOutcome, DatasetError> {
    if tables.is_empty() {
        return Err(DatasetError::config("no symbols to align"));
    }
    let kind = shared_row_kind(&tables)?;
    if tables.len() == 1 {
        return Ok(AlignOutcome::unchanged(tables));
    }

    let time_like = matches!(kind, Some(KeyKind::Naive | KeyKind::Aware));
    let (reference, warnings) = fold_keys(
        Axis::Rows,
        policy,
        tables.iter().map(|(s, t)| (s, t.index())),
        time_like,
    )?;

    let tables = tables.map_values(|table| {
        if table.index() == reference.as_slice() {
            table
        } else {
            table.reindex_rows(&reference)
        }
    });
    Ok(AlignOutcome { tables, warnings })
}

/// Reconcile column keys across symbols.
///
/// Vector tables take part as one-column tables. The result is demoted back
/// to vectors only if a single column survives and no input was a matrix.
pub fn align_columns(
    tables: SymbolMap<SymbolTable>,
    policy: MissingPolicy,
) -> Result<AlignOutcome, DatasetError> {
    if tables.is_empty() {
        return Err(DatasetError::config("no symbols to align"));
    }
    if tables.len() == 1 {
        return Ok(AlignOutcome::unchanged(tables));
    }

    let any_matrix = tables.values().any(|t| !t.is_vector());
    let any_unnamed = tables
        .values()
        .any(|t| t.layout() == Layout::Vector { named: false });

    let (reference, warnings) = fold_keys(
        Axis::Columns,
        policy,
        tables.iter().map(|(s, t)| (s, t.columns())),
        false,
    )?;

    let layout = if reference.len() == 1 && !any_matrix {
        Layout::Vector {
            named: !any_unnamed,
        }
    } else {
        Layout::Matrix
    };

    let tables = tables.map_values(|table| {
        let table = if table.columns() == reference.as_slice() {
            table
        } else {
            table.reindex_columns(&reference)
        };
        table.with_layout(layout)
    });
    Ok(AlignOutcome { tables, warnings })
}

/// The row key kind shared by all non-empty tables.
fn shared_row_kind(tables: &SymbolMap<SymbolTable>) -> Result<Option<KeyKind>, DatasetError> {
    let mut expected: Option<(KeyKind, &Symbol)> = None;
    for (symbol, table) in tables.iter() {
        let Some(kind) = table.row_kind() else {
            continue;
        };
        match expected {
            None => expected = Some((kind, symbol)),
            Some((first, first_symbol)) if first != kind => {
                return Err(DatasetError::shape(format!(
                    "symbol '{symbol}' has {kind} row keys but '{first_symbol}' has {first} row keys"
                )));
            }
            Some(_) => {}
        }
    }
    Ok(expected.map(|(kind, _)| kind))
}

/// Fold key sequences into one reference sequence.
fn fold_keys<'a, K>(
    axis: Axis,
    policy: MissingPolicy,
    mut sets: impl Iterator<Item = (&'a Symbol, &'a [K])>,
    sorted: bool,
) -> Result<(Vec<K>, Vec<AlignWarning>), DatasetError>
where
    K: Clone + Eq + Hash + Ord + 'a,
{
    let Some((_, first)) = sets.next() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let mut reference: Vec<K> = first.to_vec();
    let mut warnings = Vec::new();

    for (symbol, keys) in sets {
        let current: HashSet<&K> = reference.iter().collect();
        if keys.len() == reference.len() && keys.iter().all(|k| current.contains(k)) {
            continue;
        }
        match policy {
            MissingPolicy::Raise => {
                let incoming: HashSet<&K> = keys.iter().collect();
                let extra = keys.iter().filter(|k| !current.contains(k)).count();
                let missing = reference.iter().filter(|k| !incoming.contains(k)).count();
                return Err(DatasetError::Alignment {
                    axis,
                    detail: format!(
                        "symbol '{symbol}' has {extra} key(s) not seen before and lacks {missing}"
                    ),
                });
            }
            MissingPolicy::Nan => {
                let new: Vec<K> = keys
                    .iter()
                    .filter(|k| !current.contains(k))
                    .cloned()
                    .collect();
                reference.extend(new);
                if sorted {
                    reference.sort();
                }
                warn!(%symbol, "symbols have mismatching {axis}; setting missing data points to NaN");
            }
            MissingPolicy::Drop => {
                let incoming: HashSet<&K> = keys.iter().collect();
                reference.retain(|k| incoming.contains(k));
                warn!(%symbol, "symbols have mismatching {axis}; dropping missing data points");
            }
        }
        warnings.push(AlignWarning {
            axis,
            policy,
            symbol: symbol.clone(),
        });
    }
    Ok((reference, warnings))
}
