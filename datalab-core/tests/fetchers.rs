//! File-backed fetcher tests.
//!
//! 1. CSV: download, missing cells, per-symbol directories, updates
//!    (including updates of localized and converted indexes)
//! 2. Parquet: tables written through polars come back as datasets
//! 3. Export and reload of a projection

use datalab_core::data::{read_parquet, write_parquet};
use datalab_core::{
    ColumnKey, CsvFetcher, Dataset, DatasetError, DatasetOptions, FetchError, Frequency, Kwargs,
    Layout, MissingPolicy, ParquetFetcher, RawTable, RowKey, SymbolTable, TimeZoneSpec,
};
use std::fs;
use std::path::Path;

// ──── Helpers ────────────────────────────────────────────────────────

fn write_csv(dir: &Path, symbol: &str, body: &str) {
    fs::write(dir.join(format!("{symbol}.csv")), body).unwrap();
}

fn days(list: &[&str]) -> Vec<RowKey> {
    list.iter().map(|d| RowKey::parse(d)).collect()
}

fn hourly_csv(day: &str, start_hour: u32, values: &[f64]) -> String {
    let mut body = String::from("time,close\n");
    for (i, v) in values.iter().enumerate() {
        body.push_str(&format!("{day} {:02}:00:00,{v}\n", start_hour as usize + i));
    }
    body
}

fn rendered(keys: &[RowKey]) -> Vec<String> {
    keys.iter().map(ToString::to_string).collect()
}

fn ohlc(index: Vec<RowKey>, close: Vec<f64>) -> SymbolTable {
    let open = close.iter().map(|c| c - 0.5).collect();
    SymbolTable::matrix(index, vec!["open".into(), "close".into()], vec![open, close]).unwrap()
}

// ──── 1. CSV ─────────────────────────────────────────────────────────

#[test]
fn csv_download_aligns_symbols() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(
        dir.path(),
        "AAA",
        "date,open,close\n2024-01-01,1,1.5\n2024-01-02,2,2.5\n2024-01-03,3,3.5\n",
    );
    write_csv(
        dir.path(),
        "BBB",
        "date,open,close\n2024-01-02,20,20.5\n2024-01-03,,30.5\n",
    );

    let ds = Dataset::download(
        &CsvFetcher::new(dir.path()),
        ["AAA", "BBB"],
        Kwargs::new(),
        DatasetOptions::default(),
    )
    .unwrap();

    assert_eq!(ds.index(), days(&["2024-01-01", "2024-01-02", "2024-01-03"]).as_slice());
    assert_eq!(ds.columns(), &[ColumnKey::from("open"), ColumnKey::from("close")]);
    let b = ds.table("BBB").unwrap();
    let open = b.column(&"open".into()).unwrap();
    assert!(open[0].is_nan(), "row missing from BBB is NaN");
    assert!(open[2].is_nan(), "empty cell is NaN");
    assert_eq!(b.column(&"close".into()).unwrap()[1..], [20.5, 30.5]);
}

#[test]
fn csv_single_value_column_is_a_named_vector() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(dir.path(), "AAA", "date;close\n2024-01-01;1.0\n2024-01-02;2.0\n");
    let ds = Dataset::download(
        &CsvFetcher::new(dir.path()),
        ["AAA"],
        Kwargs::new().with("delimiter", ";"),
        DatasetOptions::default(),
    )
    .unwrap();
    assert_eq!(ds.layout(), Layout::Vector { named: true });
    assert_eq!(ds.columns(), &[ColumnKey::from("close")]);
}

#[test]
fn csv_directory_can_differ_per_symbol() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    write_csv(first.path(), "AAA", "i,v\n0,1\n1,2\n");
    write_csv(second.path(), "BBB", "i,v\n0,10\n1,20\n");

    let ds = Dataset::download(
        &CsvFetcher::new(first.path()),
        ["AAA", "BBB"],
        Kwargs::new().with_for("BBB", "dir", second.path().to_string_lossy().into_owned()),
        DatasetOptions::default(),
    )
    .unwrap();
    assert_eq!(ds.table("BBB").unwrap().values()[0], vec![10.0, 20.0]);
}

#[test]
fn csv_bad_cell_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(dir.path(), "AAA", "date,close\n2024-01-01,abc\n");
    let err = Dataset::download(
        &CsvFetcher::new(dir.path()),
        ["AAA"],
        Kwargs::new(),
        DatasetOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, DatasetError::Fetch(FetchError::Parse(_))));
}

#[test]
fn csv_update_picks_up_appended_rows() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(dir.path(), "AAA", "date,close\n2024-01-01,1\n2024-01-02,2\n");
    let fetcher = CsvFetcher::new(dir.path());
    let ds = Dataset::download(&fetcher, ["AAA"], Kwargs::new(), DatasetOptions::default())
        .unwrap();

    // The last row is revised and a new one arrives.
    write_csv(
        dir.path(),
        "AAA",
        "date,close\n2024-01-01,1\n2024-01-02,2.25\n2024-01-03,3\n",
    );
    let updated = ds.update(&fetcher, &Kwargs::new()).unwrap();
    assert_eq!(updated.index().len(), 3);
    assert_eq!(updated.table("AAA").unwrap().values()[0], vec![1.0, 2.25, 3.0]);
    assert_eq!(ds.table("AAA").unwrap().values()[0], vec![1.0, 2.0]);
}

#[test]
fn csv_update_keeps_new_rows_after_tz_convert() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(dir.path(), "AAA", &hourly_csv("2024-01-01", 0, &[0.0, 1.0, 2.0]));
    let fetcher = CsvFetcher::new(dir.path());
    let options = DatasetOptions::default()
        .with_tz_localize(TimeZoneSpec::utc())
        .with_tz_convert("+02:00".parse().unwrap());
    let ds = Dataset::download(&fetcher, ["AAA"], Kwargs::new(), options).unwrap();
    assert_eq!(ds.index()[2].to_string(), "2024-01-01T04:00:00+02:00");

    // 03:00 UTC reads as 03:00 in the file but sorts after the stored 04:00+02:00.
    write_csv(
        dir.path(),
        "AAA",
        &hourly_csv("2024-01-01", 0, &[0.0, 1.0, 2.0, 3.0, 4.0]),
    );
    let updated = ds.update(&fetcher, &Kwargs::new()).unwrap();

    assert_eq!(
        rendered(updated.index()),
        [
            "2024-01-01T02:00:00+02:00",
            "2024-01-01T03:00:00+02:00",
            "2024-01-01T04:00:00+02:00",
            "2024-01-01T05:00:00+02:00",
            "2024-01-01T06:00:00+02:00",
        ]
    );
    assert_eq!(updated.table("AAA").unwrap().values()[0], vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(updated.freq(), Some(Frequency::Millis(3_600_000)));
}

#[test]
fn csv_update_converts_to_named_zone_across_daylight_saving() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(
        dir.path(),
        "AAA",
        "time,close\n2021-03-27 23:00:00,1\n2021-03-28 00:00:00,2\n",
    );
    let fetcher = CsvFetcher::new(dir.path());
    let options = DatasetOptions::default()
        .with_tz_localize(TimeZoneSpec::utc())
        .with_tz_convert("Europe/Berlin".parse().unwrap());
    let ds = Dataset::download(&fetcher, ["AAA"], Kwargs::new(), options).unwrap();
    assert_eq!(
        rendered(ds.index()),
        ["2021-03-28T00:00:00+01:00", "2021-03-28T01:00:00+01:00"]
    );

    write_csv(dir.path(), "AAA", &hourly_csv("2021-03-28", 0, &[2.0, 3.0, 4.0]));
    let updated = ds.update(&fetcher, &Kwargs::new()).unwrap();

    assert_eq!(
        rendered(updated.index()),
        [
            "2021-03-28T00:00:00+01:00",
            "2021-03-28T01:00:00+01:00",
            "2021-03-28T03:00:00+02:00",
            "2021-03-28T04:00:00+02:00",
        ]
    );
    assert_eq!(updated.table("AAA").unwrap().values()[0], vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(updated.freq(), Some(Frequency::Millis(3_600_000)));
}

// ──── 2. Parquet ─────────────────────────────────────────────────────

#[test]
fn parquet_download_reads_written_tables() {
    let dir = tempfile::tempdir().unwrap();
    let a = ohlc(days(&["2024-01-01", "2024-01-02"]), vec![1.0, 2.0]);
    let b = ohlc(days(&["2024-01-02", "2024-01-03"]), vec![20.0, f64::NAN]);
    for (symbol, table) in [("AAA", &a), ("BBB", &b)] {
        let df = table.to_dataframe("date").unwrap();
        write_parquet(&df, &dir.path().join(format!("{symbol}.parquet"))).unwrap();
    }

    let ds = Dataset::download(
        &ParquetFetcher::new(dir.path()),
        ["AAA", "BBB"],
        Kwargs::new().with("index_column", "date"),
        DatasetOptions::default().with_missing_index(MissingPolicy::Drop),
    )
    .unwrap();
    assert_eq!(ds.index(), days(&["2024-01-02"]).as_slice());
    assert_eq!(ds.table("AAA").unwrap().column(&"close".into()).unwrap(), &[2.0]);
    assert_eq!(ds.table("BBB").unwrap().column(&"open".into()).unwrap(), &[19.5]);
}

#[test]
fn parquet_without_index_column_uses_a_range_index() {
    let dir = tempfile::tempdir().unwrap();
    let table = ohlc(days(&["2024-01-01", "2024-01-02"]), vec![1.0, 2.0]);
    let df = table.to_dataframe("date").unwrap();
    write_parquet(&df, &dir.path().join("AAA.parquet")).unwrap();

    let ds = Dataset::download(
        &ParquetFetcher::new(dir.path()),
        ["AAA"],
        Kwargs::new(),
        DatasetOptions::default(),
    )
    .unwrap();
    assert_eq!(ds.index(), &[RowKey::Int(0), RowKey::Int(1)]);
}

#[test]
fn parquet_missing_file_is_symbol_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = Dataset::download(
        &ParquetFetcher::new(dir.path()),
        ["ZZZ"],
        Kwargs::new(),
        DatasetOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        DatasetError::Fetch(FetchError::SymbolNotFound { .. })
    ));
}

// ──── 3. Export ──────────────────────────────────────────────────────

#[test]
fn projection_export_round_trips_through_parquet() {
    let dir = tempfile::tempdir().unwrap();
    let mut raw = datalab_core::SymbolMap::new();
    raw.insert(
        "AAA",
        RawTable::from_columns(
            vec!["open".into(), "close".into()],
            vec![vec![1.0, 2.0], vec![1.5, 2.5]],
        ),
    );
    raw.insert(
        "BBB",
        RawTable::from_columns(
            vec!["open".into(), "close".into()],
            vec![vec![10.0, 20.0], vec![10.5, f64::NAN]],
        ),
    );
    let ds = Dataset::from_raw(raw, DatasetOptions::default()).unwrap();
    let close = ds.get("close").unwrap().into_projection().unwrap();

    let path = dir.path().join("close.parquet");
    write_parquet(&close.to_dataframe("row").unwrap(), &path).unwrap();
    let df = read_parquet(&path).unwrap();
    let back = RawTable::from_dataframe(&df, Some("row")).unwrap();

    assert_eq!(back.columns(), Some(&[ColumnKey::from("AAA"), ColumnKey::from("BBB")][..]));
    assert_eq!(back.index(), Some(&[RowKey::Int(0), RowKey::Int(1)][..]));
}
