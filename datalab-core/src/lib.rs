//! DataLab Core: multi-symbol dataset container.
//!
//! This crate reconciles per-symbol tables into one shared coordinate space
//! and keeps it up to date:
//! - Domain types (row/column keys, symbols, per-symbol tables, time zones)
//! - Row and column alignment under `nan` / `drop` / `raise` policies
//! - Per-symbol keyword resolution for fetchers
//! - The `Fetcher` boundary plus synthetic, CSV and Parquet fetchers
//! - `Dataset`: download, incremental update and merge, views, slicing
//! - JSON persistence and polars interop

pub mod config;
pub mod data;
pub mod dataset;
pub mod domain;
pub mod error;

pub use config::{DatasetOptions, MissingPolicy};
pub use data::{
    align_columns, align_rows, select_symbol_kwargs, AlignOutcome, AlignWarning, CsvFetcher,
    FetchArgs, FetchError, Fetcher, Kwargs, Override, ParquetFetcher, SyntheticFetcher,
};
pub use dataset::{ColumnSelector, ConcatView, Coordinates, Dataset, Projection, Selection};
pub use domain::{
    Axis, ColumnKey, Frequency, KeyKind, Layout, RawTable, RowKey, Symbol, SymbolMap,
    SymbolTable, TimeZoneSpec,
};
pub use error::DatasetError;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: datasets and fetchers can cross threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Dataset>();
        require_sync::<Dataset>();
        require_send::<SymbolTable>();
        require_sync::<SymbolTable>();
        require_send::<ConcatView>();
        require_sync::<ConcatView>();
        require_send::<Kwargs>();
        require_sync::<Kwargs>();
        require_send::<DatasetError>();
        require_sync::<DatasetError>();

        require_send::<SyntheticFetcher>();
        require_sync::<SyntheticFetcher>();
        require_send::<CsvFetcher>();
        require_sync::<CsvFetcher>();
        require_send::<ParquetFetcher>();
        require_sync::<ParquetFetcher>();
    }

    /// The fetcher boundary is object safe.
    #[test]
    fn fetcher_is_object_safe() {
        let fetchers: Vec<Box<dyn Fetcher>> = vec![
            Box::new(SyntheticFetcher::new()),
            Box::new(CsvFetcher::new(".")),
            Box::new(ParquetFetcher::new(".")),
        ];
        let names: Vec<&str> = fetchers.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["synthetic", "csv", "parquet"]);
    }
}
