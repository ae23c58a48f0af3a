//! Polars interop: tables and projections to DataFrames, DataFrames to raw
//! tables, and Parquet I/O helpers.
//!
//! Row key encoding in a frame:
//! - integer keys: `Int64`
//! - naive timestamps: `Datetime(ms)`
//! - aware timestamps: RFC 3339 strings (keeps the offset)
//! - labels: strings

use super::provider::FetchError;
use crate::dataset::Projection;
use crate::domain::{ColumnKey, RawTable, RowKey, SymbolTable};
use crate::error::DatasetError;
use chrono::{DateTime, NaiveDate};
use polars::prelude::*;
use std::fs;
use std::path::Path;

impl SymbolTable {
    /// One index column followed by one `Float64` column per table column.
    pub fn to_dataframe(&self, index_name: &str) -> Result<DataFrame, DatasetError> {
        let mut cols = vec![index_column(index_name, self.index())?];
        for (key, values) in self.columns().iter().zip(self.values()) {
            cols.push(Column::new(key.to_string().into(), values.clone()));
        }
        DataFrame::new(cols).map_err(|e| DatasetError::shape(format!("dataframe creation: {e}")))
    }
}

impl Projection {
    /// One index column followed by one `Float64` column per symbol.
    pub fn to_dataframe(&self, index_name: &str) -> Result<DataFrame, DatasetError> {
        let mut cols = vec![index_column(index_name, self.index())?];
        for (symbol, values) in self.iter() {
            cols.push(Column::new(symbol.as_str().into(), values.to_vec()));
        }
        DataFrame::new(cols).map_err(|e| DatasetError::shape(format!("dataframe creation: {e}")))
    }
}

fn index_column(name: &str, keys: &[RowKey]) -> Result<Column, DatasetError> {
    let name: PlSmallStr = name.into();
    let column = match keys.first() {
        None | Some(RowKey::Int(_)) => {
            let ints: Vec<i64> = keys.iter().filter_map(RowKey::as_int).collect();
            Column::new(name, ints)
        }
        Some(RowKey::Naive(_)) => {
            let millis: Vec<i64> = keys
                .iter()
                .filter_map(|k| match k {
                    RowKey::Naive(t) => Some(t.and_utc().timestamp_millis()),
                    _ => None,
                })
                .collect();
            Column::new(name, millis)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .map_err(|e| DatasetError::shape(format!("datetime cast: {e}")))?
        }
        Some(RowKey::Aware(_) | RowKey::Label(_)) => {
            let text: Vec<String> = keys.iter().map(RowKey::to_string).collect();
            Column::new(name, text)
        }
    };
    if column.len() != keys.len() {
        return Err(DatasetError::shape("row index mixes key kinds"));
    }
    Ok(column)
}

fn is_value_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::UInt64
            | DataType::UInt32
    )
}

fn polars_err(context: &str) -> impl Fn(PolarsError) -> FetchError + '_ {
    move |e| FetchError::Parse(format!("{context}: {e}"))
}

/// Row keys from a frame column.
fn column_to_keys(col: &Column) -> Result<Vec<RowKey>, FetchError> {
    let null_key = |i: usize| FetchError::Parse(format!("null row key at row {i}"));
    match col.dtype() {
        DataType::Int64 | DataType::Int32 | DataType::UInt64 | DataType::UInt32 => {
            let cast = col.cast(&DataType::Int64).map_err(polars_err("index cast"))?;
            let ca = cast.i64().map_err(polars_err("index column type"))?;
            ca.into_iter()
                .enumerate()
                .map(|(i, v)| v.map(RowKey::Int).ok_or_else(|| null_key(i)))
                .collect()
        }
        DataType::Datetime(unit, tz) => {
            let unit = *unit;
            let aware = tz.is_some();
            let cast = col.cast(&DataType::Int64).map_err(polars_err("index cast"))?;
            let ca = cast.i64().map_err(polars_err("index column type"))?;
            ca.into_iter()
                .enumerate()
                .map(|(i, v)| {
                    let v = v.ok_or_else(|| null_key(i))?;
                    let t = match unit {
                        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(v),
                        TimeUnit::Microseconds => DateTime::from_timestamp_micros(v),
                        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(v)),
                    }
                    .ok_or_else(|| FetchError::Parse(format!("timestamp out of range at row {i}")))?;
                    Ok(if aware {
                        RowKey::Aware(t.fixed_offset())
                    } else {
                        RowKey::Naive(t.naive_utc())
                    })
                })
                .collect()
        }
        DataType::Date => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
                .ok_or_else(|| FetchError::Parse("epoch".into()))?;
            let cast = col.cast(&DataType::Int32).map_err(polars_err("index cast"))?;
            let ca = cast.i32().map_err(polars_err("index column type"))?;
            ca.into_iter()
                .enumerate()
                .map(|(i, v)| {
                    let days = v.ok_or_else(|| null_key(i))?;
                    epoch
                        .checked_add_signed(chrono::TimeDelta::days(days as i64))
                        .map(RowKey::date)
                        .ok_or_else(|| FetchError::Parse(format!("date out of range at row {i}")))
                })
                .collect()
        }
        DataType::String => {
            let ca = col.str().map_err(polars_err("index column type"))?;
            ca.into_iter()
                .enumerate()
                .map(|(i, v)| v.map(RowKey::parse).ok_or_else(|| null_key(i)))
                .collect()
        }
        other => Err(FetchError::invalid_argument(
            "index_column",
            format!("unsupported index dtype {other}"),
        )),
    }
}

impl RawTable {
    /// Build a raw table from a frame.
    ///
    /// `index_column` names the row key column; every other numeric column
    /// becomes a value column (nulls become NaN). One value column yields a
    /// named vector.
    pub fn from_dataframe(df: &DataFrame, index_column: Option<&str>) -> Result<RawTable, FetchError> {
        let keys = match index_column {
            Some(name) => {
                let col = df.column(name).map_err(|_| {
                    FetchError::invalid_argument("index_column", format!("no column named '{name}'"))
                })?;
                Some(column_to_keys(col)?)
            }
            None => None,
        };

        let mut names = Vec::new();
        let mut data = Vec::new();
        for col in df.get_columns() {
            if Some(col.name().as_str()) == index_column || !is_value_dtype(col.dtype()) {
                continue;
            }
            let cast = col.cast(&DataType::Float64).map_err(polars_err("value cast"))?;
            let ca = cast.f64().map_err(polars_err("value column type"))?;
            data.push(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect::<Vec<f64>>());
            names.push(col.name().as_str().parse::<ColumnKey>().unwrap_or_else(|e| match e {}));
        }
        if data.is_empty() {
            return Err(FetchError::Parse("frame has no numeric value columns".into()));
        }

        let raw = if data.len() == 1 {
            let values = data.into_iter().next().unwrap_or_default();
            let name = names.into_iter().next().unwrap_or(ColumnKey::Pos(0));
            RawTable::vector(values).with_name(name)
        } else {
            RawTable::from_columns(names, data)
        };
        Ok(match keys {
            Some(keys) => raw.with_index(keys),
            None => raw,
        })
    }
}

/// Write a DataFrame to Parquet atomically (write `.tmp`, rename into place).
pub fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DatasetError> {
    let persist = |what: &str, e: &dyn std::fmt::Display| {
        DatasetError::Persist(format!("{what} {}: {e}", path.display()))
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| persist("create dir for", &e))?;
    }
    let tmp = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp).map_err(|e| persist("create", &e))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| persist("write", &e))?;
    fs::rename(&tmp, path).map_err(|e| persist("rename into", &e))?;
    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<DataFrame, DatasetError> {
    let file = fs::File::open(path)
        .map_err(|e| DatasetError::Persist(format!("open {}: {e}", path.display())))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DatasetError::Persist(format!("read {}: {e}", path.display())))
}
