//! DataLab CLI: build, update, inspect and export multi-symbol datasets.
//!
//! Commands:
//! - `download`: fetch symbols from a source and save the aligned dataset
//! - `update`: fetch increments for a saved dataset and merge them
//! - `show`: print coordinates and the last rows of a saved dataset
//! - `export`: write one Parquet file per column projection

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use datalab_core::data::write_parquet;
use datalab_core::{
    ColumnKey, CsvFetcher, Dataset, DatasetOptions, Fetcher, Kwargs, MissingPolicy,
    ParquetFetcher, SyntheticFetcher, TimeZoneSpec,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "datalab",
    about = "DataLab CLI: multi-symbol dataset container"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch symbols and save the aligned dataset as JSON.
    Download {
        /// Symbols to fetch (e.g., AAPL MSFT).
        #[arg(required = true)]
        symbols: Vec<String>,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        options: OptionArgs,

        /// Output dataset file.
        #[arg(long)]
        out: PathBuf,
    },
    /// Fetch increments for a saved dataset and merge them.
    Update {
        /// Dataset file to update.
        #[arg(long)]
        dataset: PathBuf,

        #[command(flatten)]
        source: SourceArgs,

        /// Output file. Defaults to overwriting the input.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print coordinates and the last rows of a saved dataset.
    Show {
        /// Dataset file.
        #[arg(long)]
        dataset: PathBuf,

        /// Restrict to these columns (repeatable).
        #[arg(long = "column")]
        columns: Vec<String>,

        /// Number of trailing rows to print.
        #[arg(long, default_value_t = 5)]
        tail: usize,
    },
    /// Write one Parquet file per column projection.
    Export {
        /// Dataset file.
        #[arg(long)]
        dataset: PathBuf,

        /// Output directory.
        #[arg(long)]
        out_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    Synthetic,
    Csv,
    Parquet,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Data source.
    #[arg(long, value_enum, default_value_t = Source::Synthetic)]
    source: Source,

    /// Directory for the csv and parquet sources. Defaults to ./data.
    #[arg(long, default_value = "data")]
    dir: PathBuf,

    /// Fetch argument `KEY=VALUE`, or `SYMBOL:KEY=VALUE` for one symbol.
    /// Values parse as JSON when possible, otherwise as strings.
    #[arg(long = "param")]
    params: Vec<String>,
}

#[derive(clap::Args)]
struct OptionArgs {
    /// TOML file with dataset options. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Row policy: nan, drop or raise.
    #[arg(long)]
    missing_index: Option<String>,

    /// Column policy: nan, drop or raise.
    #[arg(long)]
    missing_columns: Option<String>,

    /// Attach this zone to naive timestamps (e.g., UTC, Europe/Berlin, +02:00).
    #[arg(long)]
    tz_localize: Option<String>,

    /// Convert aware timestamps to this zone.
    #[arg(long)]
    tz_convert: Option<String>,

    /// Fetch symbols concurrently.
    #[arg(long, default_value_t = false)]
    parallel: bool,
}

fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Download {
            symbols,
            source,
            options,
            out,
        } => run_download(symbols, &source, &options, &out),
        Commands::Update {
            dataset,
            source,
            out,
        } => run_update(&dataset, &source, out.as_deref()),
        Commands::Show {
            dataset,
            columns,
            tail,
        } => run_show(&dataset, &columns, tail),
        Commands::Export { dataset, out_dir } => run_export(&dataset, &out_dir),
    }
}

/// Log to stderr; `RUST_LOG` overrides the default `info` level.
fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn make_fetcher(args: &SourceArgs) -> Box<dyn Fetcher> {
    match args.source {
        Source::Synthetic => Box::new(SyntheticFetcher::new()),
        Source::Csv => Box::new(CsvFetcher::new(&args.dir)),
        Source::Parquet => Box::new(ParquetFetcher::new(&args.dir)),
    }
}

/// Parse `--param` entries into keyword arguments.
fn parse_params(params: &[String]) -> Result<Kwargs> {
    let mut kwargs = Kwargs::new();
    for param in params {
        let Some((target, raw_value)) = param.split_once('=') else {
            bail!("invalid --param '{param}': expected KEY=VALUE or SYMBOL:KEY=VALUE");
        };
        let value = serde_json::from_str::<Value>(raw_value)
            .unwrap_or_else(|_| Value::String(raw_value.to_string()));
        match target.split_once(':') {
            Some((symbol, key)) if !symbol.is_empty() && !key.is_empty() => {
                kwargs.set_for(symbol, key, value)
            }
            Some(_) => bail!("invalid --param '{param}': empty symbol or key"),
            None if target.is_empty() => bail!("invalid --param '{param}': empty key"),
            None => kwargs.set(target, value),
        }
    }
    Ok(kwargs)
}

fn build_options(args: &OptionArgs) -> Result<DatasetOptions> {
    let mut options = match &args.config {
        Some(path) => DatasetOptions::from_file(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => DatasetOptions::default(),
    };
    if let Some(policy) = &args.missing_index {
        options = options.with_missing_index(
            policy.parse::<MissingPolicy>().context("--missing-index")?,
        );
    }
    if let Some(policy) = &args.missing_columns {
        options = options.with_missing_columns(
            policy.parse::<MissingPolicy>().context("--missing-columns")?,
        );
    }
    if let Some(tz) = &args.tz_localize {
        options = options.with_tz_localize(tz.parse::<TimeZoneSpec>().context("--tz-localize")?);
    }
    if let Some(tz) = &args.tz_convert {
        options = options.with_tz_convert(tz.parse::<TimeZoneSpec>().context("--tz-convert")?);
    }
    if args.parallel {
        options = options.with_parallel(true);
    }
    Ok(options)
}

fn run_download(
    symbols: Vec<String>,
    source: &SourceArgs,
    option_args: &OptionArgs,
    out: &Path,
) -> Result<()> {
    let kwargs = parse_params(&source.params)?;
    let options = build_options(option_args)?;
    let fetcher = make_fetcher(source);

    let dataset = Dataset::download(fetcher.as_ref(), symbols, kwargs, options)
        .context("download failed")?;
    dataset
        .save(out)
        .with_context(|| format!("saving dataset to {}", out.display()))?;

    info!(path = %out.display(), "dataset saved");
    print_summary(&dataset);
    Ok(())
}

fn run_update(path: &Path, source: &SourceArgs, out: Option<&Path>) -> Result<()> {
    let dataset =
        Dataset::load(path).with_context(|| format!("loading dataset {}", path.display()))?;
    let kwargs = parse_params(&source.params)?;
    let fetcher = make_fetcher(source);

    let updated = dataset
        .update(fetcher.as_ref(), &kwargs)
        .context("update failed")?;
    let out = out.unwrap_or(path);
    updated
        .save(out)
        .with_context(|| format!("saving dataset to {}", out.display()))?;

    println!(
        "Rows: {} -> {} ({} added)",
        dataset.index().len(),
        updated.index().len(),
        updated.index().len().saturating_sub(dataset.index().len())
    );
    print_summary(&updated);
    Ok(())
}

fn run_show(path: &Path, columns: &[String], tail: usize) -> Result<()> {
    let mut dataset =
        Dataset::load(path).with_context(|| format!("loading dataset {}", path.display()))?;
    if !columns.is_empty() {
        let keys: Vec<ColumnKey> = columns
            .iter()
            .map(|c| c.parse::<ColumnKey>().unwrap_or_else(|e| match e {}))
            .collect();
        dataset = dataset.select_columns(&keys)?;
    }
    print_summary(&dataset);

    let n = dataset.index().len();
    let shown = dataset.slice_rows(n.saturating_sub(tail)..n)?;
    for projection in shown.concat().projections() {
        println!();
        println!("[{}]", projection.column());
        let header: Vec<String> = projection
            .symbols()
            .iter()
            .map(|s| format!("{:>12}", s.as_str()))
            .collect();
        println!("{:<26}{}", "index", header.join(""));
        for (row, key) in projection.index().iter().enumerate() {
            let cells: Vec<String> = projection
                .iter()
                .map(|(_, values)| format!("{:>12.4}", values[row]))
                .collect();
            println!("{:<26}{}", key.to_string(), cells.join(""));
        }
    }
    Ok(())
}

fn run_export(path: &Path, out_dir: &Path) -> Result<()> {
    let dataset =
        Dataset::load(path).with_context(|| format!("loading dataset {}", path.display()))?;
    let concat = dataset.concat();
    for projection in concat.projections() {
        let file = out_dir.join(format!("{}.parquet", projection.column()));
        let df = projection.to_dataframe("index")?;
        write_parquet(&df, &file).with_context(|| format!("writing {}", file.display()))?;
        println!("Wrote {}", file.display());
    }
    println!("Exported {} column(s) to {}", concat.len(), out_dir.display());
    Ok(())
}

fn print_summary(dataset: &Dataset) {
    let symbols: Vec<&str> = dataset.symbols().map(|s| s.as_str()).collect();
    let columns: Vec<String> = dataset.columns().iter().map(ToString::to_string).collect();
    println!("Symbols: {}", symbols.join(", "));
    println!("Columns: {}", columns.join(", "));
    match (dataset.index().first(), dataset.index().last()) {
        (Some(first), Some(last)) => println!(
            "Rows:    {} ({first} to {last})",
            dataset.index().len()
        ),
        _ => println!("Rows:    0"),
    }
    if let Some(freq) = dataset.freq() {
        println!("Freq:    {freq:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalab_core::Override;

    #[test]
    fn params_parse_json_then_string() {
        let kwargs = parse_params(&[
            "periods=5".to_string(),
            "columns=open,close".to_string(),
            "flag=true".to_string(),
        ])
        .unwrap();
        assert_eq!(
            kwargs.get("periods"),
            Some(&Override::Broadcast(Value::from(5)))
        );
        assert_eq!(
            kwargs.get("columns"),
            Some(&Override::Broadcast(Value::from("open,close")))
        );
        assert_eq!(kwargs.get("flag"), Some(&Override::Broadcast(Value::Bool(true))));
    }

    #[test]
    fn params_with_symbol_prefix_are_per_symbol() {
        let kwargs = parse_params(&["AAPL:periods=3".to_string(), "MSFT:periods=4".to_string()])
            .unwrap();
        assert_eq!(
            kwargs.get("periods"),
            Some(&Override::per_symbol([
                ("AAPL", Value::from(3)),
                ("MSFT", Value::from(4)),
            ]))
        );
    }

    #[test]
    fn malformed_params_are_rejected() {
        assert!(parse_params(&["periods".to_string()]).is_err());
        assert!(parse_params(&["=5".to_string()]).is_err());
        assert!(parse_params(&[":periods=5".to_string()]).is_err());
    }

    #[test]
    fn download_command_parses() {
        let cli = Cli::try_parse_from([
            "datalab",
            "download",
            "AAPL",
            "MSFT",
            "--source",
            "csv",
            "--dir",
            "quotes",
            "--param",
            "delimiter=;",
            "--missing-index",
            "drop",
            "--parallel",
            "--out",
            "ds.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Download {
                symbols,
                source,
                options,
                out,
            } => {
                assert_eq!(symbols, vec!["AAPL", "MSFT"]);
                assert_eq!(source.source, Source::Csv);
                assert_eq!(source.dir, PathBuf::from("quotes"));
                assert_eq!(source.params, vec!["delimiter=;"]);
                assert_eq!(out, PathBuf::from("ds.json"));

                let options = build_options(&options).unwrap();
                assert_eq!(options.missing_index, MissingPolicy::Drop);
                assert!(options.parallel);
            }
            _ => panic!("expected download"),
        }
    }

    #[test]
    fn bad_policy_flag_fails() {
        let cli = Cli::try_parse_from([
            "datalab",
            "download",
            "AAPL",
            "--missing-columns",
            "sometimes",
            "--out",
            "ds.json",
        ])
        .unwrap();
        let Commands::Download { options, .. } = cli.command else {
            panic!("expected download");
        };
        assert!(build_options(&options).is_err());
    }

    #[test]
    fn config_file_is_overridden_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("options.toml");
        std::fs::write(
            &config,
            "missing_index = \"raise\"\nmissing_columns = \"nan\"\ntz_localize = \"UTC\"\n",
        )
        .unwrap();
        let args = OptionArgs {
            config: Some(config),
            missing_index: Some("drop".into()),
            missing_columns: None,
            tz_localize: None,
            tz_convert: None,
            parallel: false,
        };
        let options = build_options(&args).unwrap();
        assert_eq!(options.missing_index, MissingPolicy::Drop);
        assert_eq!(options.missing_columns, MissingPolicy::Nan);
        assert_eq!(options.tz_localize, Some(TimeZoneSpec::utc()));
    }

    #[test]
    fn update_defaults_to_synthetic_source() {
        let cli = Cli::try_parse_from(["datalab", "update", "--dataset", "ds.json"]).unwrap();
        let Commands::Update { source, out, .. } = cli.command else {
            panic!("expected update");
        };
        assert_eq!(source.source, Source::Synthetic);
        assert!(out.is_none());
    }

    #[test]
    fn download_update_show_export_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ds.json");
        let source = SourceArgs {
            source: Source::Synthetic,
            dir: dir.path().to_path_buf(),
            params: vec!["periods=4".into(), "columns=open,close".into()],
        };
        let options = OptionArgs {
            config: None,
            missing_index: None,
            missing_columns: None,
            tz_localize: None,
            tz_convert: None,
            parallel: false,
        };
        run_download(vec!["AAA".into(), "BBB".into()], &source, &options, &path).unwrap();

        let update = SourceArgs {
            params: vec!["n=2".into()],
            ..source
        };
        run_update(&path, &update, None).unwrap();
        assert_eq!(Dataset::load(&path).unwrap().index().len(), 6);

        run_show(&path, &["close".to_string()], 3).unwrap();

        let out_dir = dir.path().join("export");
        run_export(&path, &out_dir).unwrap();
        assert!(out_dir.join("open.parquet").is_file());
        assert!(out_dir.join("close.parquet").is_file());
    }
}
