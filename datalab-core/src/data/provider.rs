//! Fetcher trait and structured fetch errors.
//!
//! The Fetcher trait abstracts over data sources (synthetic generator, CSV
//! directory, Parquet directory) so a `Dataset` never knows where its data
//! comes from, and tests can swap in mocks.

use super::params::FetchArgs;
use crate::domain::{RawTable, Symbol, SymbolTable};
use thiserror::Error;

/// Errors returned by `Fetcher` implementations.
///
/// A `Dataset` passes these through unchanged inside `DatasetError::Fetch`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{fetcher} does not support {operation}")]
    Unsupported { fetcher: String, operation: String },

    #[error("data source error: {0}")]
    Source(String),
}

impl FetchError {
    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        FetchError::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn symbol_not_found(symbol: &Symbol) -> Self {
        FetchError::SymbolNotFound {
            symbol: symbol.to_string(),
        }
    }
}

/// A source of per-symbol data.
///
/// Implementations are called once per symbol; calls for different symbols
/// must be independent, since a dataset may dispatch them concurrently.
pub trait Fetcher: Send + Sync {
    /// Human-readable name of this fetcher.
    fn name(&self) -> &str;

    /// Full history for one symbol.
    fn download_one(&self, symbol: &Symbol, args: &FetchArgs) -> Result<RawTable, FetchError>;

    /// New rows for one symbol, given its current table.
    ///
    /// Must return only the increment, never the full history. Overlapping
    /// the last existing row key is allowed; the incoming row wins.
    fn update_one(
        &self,
        symbol: &Symbol,
        existing: &SymbolTable,
        args: &FetchArgs,
    ) -> Result<RawTable, FetchError> {
        let _ = (symbol, existing, args);
        Err(FetchError::Unsupported {
            fetcher: self.name().to_string(),
            operation: "update".to_string(),
        })
    }
}
