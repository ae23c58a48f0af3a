//! Per-symbol fetch dispatch.
//!
//! Runs one fetch per symbol, sequentially or on the rayon pool, and joins
//! every result before returning. Nothing downstream sees a partial batch.

use super::provider::FetchError;
use crate::domain::{Symbol, SymbolMap};
use rayon::prelude::*;
use tracing::debug;

/// Call `fetch` once per symbol and collect the results in symbol order.
///
/// On failure the error of the first failing symbol (in symbol order) is
/// returned, whichever path ran. The sequential path stops at that symbol;
/// the parallel path waits for every task before reporting.
pub(crate) fn fetch_all<T, F>(
    symbols: &[Symbol],
    parallel: bool,
    fetch: F,
) -> Result<SymbolMap<T>, FetchError>
where
    T: Send,
    F: Fn(usize, &Symbol) -> Result<T, FetchError> + Sync,
{
    let total = symbols.len();
    let run_one = |i: usize, symbol: &Symbol| {
        debug!(%symbol, "[{}/{}] fetching", i + 1, total);
        fetch(i, symbol)
    };

    if !parallel {
        let mut out = SymbolMap::with_capacity(total);
        for (i, symbol) in symbols.iter().enumerate() {
            out.insert(symbol, run_one(i, symbol)?);
        }
        return Ok(out);
    }

    let results: Vec<Result<T, FetchError>> = symbols
        .par_iter()
        .enumerate()
        .map(|(i, symbol)| run_one(i, symbol))
        .collect();

    symbols
        .iter()
        .zip(results)
        .map(|(symbol, result)| result.map(|value| (symbol.clone(), value)))
        .collect::<Result<Vec<_>, _>>()
        .map(|entries| entries.into_iter().collect())
}
