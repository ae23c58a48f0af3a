//! Alignment, fetch parameters, the fetcher boundary and reference fetchers.

pub mod align;
pub mod csv;
pub(crate) mod download;
pub mod frame;
pub mod params;
pub mod parquet;
pub mod provider;
pub mod synthetic;

pub use self::align::{align_columns, align_rows, AlignOutcome, AlignWarning};
pub use self::csv::CsvFetcher;
pub use self::frame::{read_parquet, write_parquet};
pub use self::params::{select_symbol_kwargs, FetchArgs, Kwargs, Override};
pub use self::parquet::ParquetFetcher;
pub use self::provider::{FetchError, Fetcher};
pub use self::synthetic::SyntheticFetcher;
