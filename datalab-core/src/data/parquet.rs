//! Parquet directory fetcher.
//!
//! Layout: `{dir}/{SYMBOL}.parquet`. Files are read through polars.

use super::frame::read_parquet;
use super::params::FetchArgs;
use super::provider::{FetchError, Fetcher};
use crate::domain::{RawTable, Symbol, SymbolTable};
use std::path::{Path, PathBuf};

/// Reads one Parquet file per symbol from a directory.
///
/// Recognized arguments: `dir` (overrides the configured directory) and
/// `index_column` (row key column; without it rows get a range index).
#[derive(Debug, Clone)]
pub struct ParquetFetcher {
    dir: PathBuf,
}

impl ParquetFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Fetcher for ParquetFetcher {
    fn name(&self) -> &str {
        "parquet"
    }

    fn download_one(&self, symbol: &Symbol, args: &FetchArgs) -> Result<RawTable, FetchError> {
        let dir = match args.str("dir")? {
            Some(d) => PathBuf::from(d),
            None => self.dir.clone(),
        };
        let path = dir.join(format!("{symbol}.parquet"));
        if !path.is_file() {
            return Err(FetchError::symbol_not_found(symbol));
        }
        let df = read_parquet(&path).map_err(|e| FetchError::Source(e.to_string()))?;
        RawTable::from_dataframe(&df, args.str("index_column")?)
    }

    /// Rows at or after the existing last key.
    fn update_one(
        &self,
        symbol: &Symbol,
        existing: &SymbolTable,
        args: &FetchArgs,
    ) -> Result<RawTable, FetchError> {
        let raw = self.download_one(symbol, args)?;
        Ok(match existing.last_key() {
            Some(last) => raw.since(last),
            None => raw,
        })
    }
}
