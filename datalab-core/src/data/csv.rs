//! CSV directory fetcher.
//!
//! Layout: `{dir}/{SYMBOL}.csv`, with a header row. The first column holds
//! row keys; every other column holds `f64` values (empty cell = NaN).

use super::params::FetchArgs;
use super::provider::{FetchError, Fetcher};
use crate::domain::{ColumnKey, RawTable, RowKey, Symbol, SymbolTable};
use std::path::{Path, PathBuf};

/// Reads one CSV file per symbol from a directory.
///
/// Recognized arguments: `dir` (overrides the configured directory) and
/// `delimiter` (a single character, default `,`).
#[derive(Debug, Clone)]
pub struct CsvFetcher {
    dir: PathBuf,
}

impl CsvFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn symbol_path(&self, symbol: &Symbol, args: &FetchArgs) -> Result<PathBuf, FetchError> {
        let dir = match args.str("dir")? {
            Some(d) => PathBuf::from(d),
            None => self.dir.clone(),
        };
        Ok(dir.join(format!("{symbol}.csv")))
    }
}

fn csv_err(e: csv::Error) -> FetchError {
    if e.is_io_error() {
        if let csv::ErrorKind::Io(io) = e.into_kind() {
            return FetchError::Io(io);
        }
        return FetchError::Parse("csv I/O error".into());
    }
    FetchError::Parse(e.to_string())
}

fn delimiter(args: &FetchArgs) -> Result<u8, FetchError> {
    match args.str("delimiter")? {
        None => Ok(b','),
        Some(d) if d.len() == 1 && d.is_ascii() => Ok(d.as_bytes()[0]),
        Some(d) => Err(FetchError::invalid_argument(
            "delimiter",
            format!("expected one ASCII character, got '{d}'"),
        )),
    }
}

/// Parse one CSV file into a raw table with its own row keys.
pub fn read_csv(path: &Path, delimiter: u8) -> Result<RawTable, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();
    if headers.len() < 2 {
        return Err(FetchError::Parse(format!(
            "{}: expected an index column and at least one value column",
            path.display()
        )));
    }
    let columns: Vec<ColumnKey> = headers
        .iter()
        .skip(1)
        .map(|h| h.trim().parse::<ColumnKey>().unwrap_or_else(|e| match e {}))
        .collect();

    let mut keys = Vec::new();
    let mut data: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        keys.push(RowKey::parse(record.get(0).unwrap_or_default()));
        for (c, values) in data.iter_mut().enumerate() {
            let cell = record.get(c + 1).unwrap_or_default().trim();
            let value = if cell.is_empty() {
                f64::NAN
            } else {
                cell.parse::<f64>().map_err(|e| {
                    FetchError::Parse(format!(
                        "{} row {row} column '{}': {e}",
                        path.display(),
                        columns[c]
                    ))
                })?
            };
            values.push(value);
        }
    }

    let raw = if columns.len() == 1 {
        let name = columns[0].clone();
        RawTable::vector(data.into_iter().next().unwrap_or_default()).with_name(name)
    } else {
        RawTable::from_columns(columns, data)
    };
    Ok(raw.with_index(keys))
}

impl Fetcher for CsvFetcher {
    fn name(&self) -> &str {
        "csv"
    }

    fn download_one(&self, symbol: &Symbol, args: &FetchArgs) -> Result<RawTable, FetchError> {
        let path = self.symbol_path(symbol, args)?;
        if !path.is_file() {
            return Err(FetchError::symbol_not_found(symbol));
        }
        read_csv(&path, delimiter(args)?)
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
