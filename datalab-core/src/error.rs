//! Error taxonomy for dataset construction, alignment, update and persistence.

use crate::data::provider::FetchError;
use crate::domain::{Axis, ColumnKey, Symbol};
use thiserror::Error;

/// Errors surfaced by `Dataset` operations.
///
/// Every variant aborts the whole batch call: no partial dataset is returned.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Invalid policy token, empty symbol set, unusable timezone setting.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A `raise` policy met mismatching row or column keys.
    #[error("symbols have mismatching {axis}: {detail}")]
    Alignment { axis: Axis, detail: String },

    /// Error returned by the fetcher, passed through unchanged.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Tables that cannot share one coordinate space.
    #[error("shape error: {0}")]
    Shape(String),

    #[error("unknown column: {0}")]
    UnknownColumn(ColumnKey),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(Symbol),

    #[error("persistence error: {0}")]
    Persist(String),
}

impl DatasetError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        DatasetError::Shape(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        DatasetError::Configuration(msg.into())
    }
}
