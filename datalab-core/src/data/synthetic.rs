//! Synthetic random-walk fetcher.
//!
//! Generates geometric random walks, one per column. Seeds are derived per
//! symbol via BLAKE3 so output does not depend on fetch order or thread
//! scheduling.

use super::params::FetchArgs;
use super::provider::{FetchError, Fetcher};
use crate::domain::{ColumnKey, Frequency, RawTable, RowKey, Symbol, SymbolTable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEFAULT_START: &str = "2020-01-01";

/// Seeded random-walk data source.
///
/// Recognized arguments: `start_value` (100.0), `mean` (0.0), `stdev`
/// (0.01), `periods` (10), `start` (`2020-01-01`), `freq_secs` (86400),
/// `index` (`"time"` or `"range"`), `columns`, `name`, `seed` (42) and, for
/// updates, `n` (1).
#[derive(Debug, Clone, Default)]
pub struct SyntheticFetcher;

impl SyntheticFetcher {
    pub fn new() -> Self {
        Self
    }
}

/// Derive a per-symbol seed from the base seed and a salt.
fn symbol_seed(seed: u64, symbol: &Symbol, salt: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(symbol.as_str().as_bytes());
    hasher.update(salt.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// One standard normal draw (Box-Muller).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

struct WalkParams {
    mean: f64,
    stdev: f64,
}

impl WalkParams {
    fn from_args(args: &FetchArgs) -> Result<Self, FetchError> {
        let stdev = args.f64("stdev")?.unwrap_or(0.01);
        if stdev.is_nan() || stdev < 0.0 {
            return Err(FetchError::invalid_argument("stdev", "must be non-negative"));
        }
        Ok(Self {
            mean: args.f64("mean")?.unwrap_or(0.0),
            stdev,
        })
    }

    /// `rows` values per column, each walk starting from its entry in `starts`.
    fn generate(&self, rng: &mut StdRng, starts: &[f64], rows: usize) -> Vec<Vec<f64>> {
        let mut cols: Vec<Vec<f64>> = starts.iter().map(|_| Vec::with_capacity(rows)).collect();
        let mut level = starts.to_vec();
        for _ in 0..rows {
            for (c, value) in level.iter_mut().enumerate() {
                *value *= 1.0 + self.mean + self.stdev * standard_normal(rng);
                cols[c].push(*value);
            }
        }
        cols
    }
}

fn time_frequency(args: &FetchArgs) -> Result<Frequency, FetchError> {
    let secs = args.i64("freq_secs")?.unwrap_or(86_400);
    if secs <= 0 {
        return Err(FetchError::invalid_argument("freq_secs", "must be positive"));
    }
    secs.checked_mul(1000)
        .map(Frequency::Millis)
        .ok_or_else(|| FetchError::invalid_argument("freq_secs", "too large"))
}

fn time_keys(start: &RowKey, freq: Frequency, n: usize) -> Result<Vec<RowKey>, FetchError> {
    (0..n as i64)
        .map(|i| {
            start
                .advance(freq, i)
                .ok_or_else(|| FetchError::invalid_argument("start", "time index overflows"))
        })
        .collect()
}

fn build_raw(columns: Option<Vec<ColumnKey>>, name: Option<ColumnKey>, data: Vec<Vec<f64>>) -> RawTable {
    match columns {
        Some(keys) => RawTable::from_columns(keys, data),
        None => {
            let values = data.into_iter().next().unwrap_or_default();
            match name {
                Some(name) => RawTable::vector(values).with_name(name),
                None => RawTable::vector(values),
            }
        }
    }
}

impl Fetcher for SyntheticFetcher {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn download_one(&self, symbol: &Symbol, args: &FetchArgs) -> Result<RawTable, FetchError> {
        let walk = WalkParams::from_args(args)?;
        let periods = args.usize("periods")?.unwrap_or(10);
        let start_value = args.f64("start_value")?.unwrap_or(100.0);
        let seed = args.i64("seed")?.unwrap_or(42) as u64;
        let columns: Option<Vec<ColumnKey>> = args
            .string_list("columns")?
            .map(|names| names.into_iter().map(ColumnKey::from).collect());
        let name = args.str("name")?.map(ColumnKey::from);

        let mut rng = StdRng::seed_from_u64(symbol_seed(seed, symbol, "download"));
        let width = columns.as_ref().map_or(1, Vec::len);
        let data = walk.generate(&mut rng, &vec![start_value; width], periods);
        let raw = build_raw(columns, name, data);

        match args.str("index")?.unwrap_or("time") {
            "range" => Ok(raw),
            "time" => {
                let start_text = args.str("start")?.unwrap_or(DEFAULT_START);
                let start = RowKey::parse(start_text);
                if !start.is_time_like() {
                    return Err(FetchError::invalid_argument(
                        "start",
                        format!("'{start_text}' is not a timestamp"),
                    ));
                }
                let keys = time_keys(&start, time_frequency(args)?, periods)?;
                Ok(raw.with_index(keys))
            }
            other => Err(FetchError::invalid_argument(
                "index",
                format!("expected 'time' or 'range', got '{other}'"),
            )),
        }
    }

    /// Continue each column's walk from the existing last row.
    ///
    /// Time-indexed tables get `n + 1` rows starting at the existing last
    /// key; the first row repeats the existing last values (NaN replaced by
    /// `start_value`). Range-indexed tables get `n` rows
    /// without keys and are placed after the existing rows.
    fn update_one(
        &self,
        symbol: &Symbol,
        existing: &SymbolTable,
        args: &FetchArgs,
    ) -> Result<RawTable, FetchError> {
        let walk = WalkParams::from_args(args)?;
        let n = args.usize("n")?.unwrap_or(1);
        let seed = args.i64("seed")?.unwrap_or(42) as u64;
        let start_value = args.f64("start_value")?.unwrap_or(100.0);
        let last = existing
            .last_key()
            .ok_or_else(|| FetchError::Source(format!("no existing rows for {symbol}")))?;

        let starts: Vec<f64> = existing
            .values()
            .iter()
            .map(|col| match col.last() {
                Some(v) if !v.is_nan() => *v,
                _ => start_value,
            })
            .collect();
        let mut rng = StdRng::seed_from_u64(symbol_seed(seed, symbol, &last.to_string()));

        let (columns, name) = if existing.is_vector() {
            (None, existing.name().cloned())
        } else {
            (Some(existing.columns().to_vec()), None)
        };

        if last.is_time_like() {
            let keys = time_keys(last, time_frequency(args)?, n + 1)?;
            let data = walk
                .generate(&mut rng, &starts, n)
                .into_iter()
                .zip(&starts)
                .map(|(col, start)| std::iter::once(*start).chain(col).collect())
                .collect();
            Ok(build_raw(columns, name, data).with_index(keys))
        } else {
            let data = walk.generate(&mut rng, &starts, n);
            Ok(build_raw(columns, name, data))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::range_index;

    #[test]
    fn download_is_deterministic_per_symbol() {
        let fetcher = SyntheticFetcher::new();
        let args = FetchArgs::new().with("periods", 5);
        let a1 = fetcher.download_one(&"A".into(), &args).unwrap();
        let a2 = fetcher.download_one(&"A".into(), &args).unwrap();
        let b = fetcher.download_one(&"B".into(), &args).unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(a1.n_rows(), 5);
        assert_eq!(a1.index().unwrap()[1], RowKey::parse("2020-01-02"));
    }

    #[test]
    fn columns_argument_builds_matrix() {
        let fetcher = SyntheticFetcher::new();
        let args = FetchArgs::new()
            .with("columns", "open,close")
            .with("index", "range");
        let raw = fetcher.download_one(&"A".into(), &args).unwrap();
        assert!(!raw.is_vector());
        assert!(raw.index().is_none());
        assert_eq!(raw.columns().unwrap(), &[ColumnKey::from("open"), ColumnKey::from("close")]);
    }

    #[test]
    fn time_update_overlaps_last_row() {
        let fetcher = SyntheticFetcher::new();
        let args = FetchArgs::new().with("periods", 3);
        let raw = fetcher.download_one(&"A".into(), &args).unwrap();
        let table = raw.into_table(|n| Ok(range_index(0, n))).unwrap();
        let inc = fetcher
            .update_one(&"A".into(), &table, &args.clone().with("n", 2))
            .unwrap();
        assert_eq!(inc.n_rows(), 3);
        assert_eq!(inc.index().unwrap()[0], *table.last_key().unwrap());
    }

    #[test]
    fn range_update_has_no_keys() {
        let fetcher = SyntheticFetcher::new();
        let args = FetchArgs::new().with("index", "range").with("n", 4);
        let table = fetcher
            .download_one(&"A".into(), &args)
            .unwrap()
            .into_table(|n| Ok(range_index(0, n)))
            .unwrap();
        let inc = fetcher.update_one(&"A".into(), &table, &args).unwrap();
        assert!(inc.index().is_none());
        assert_eq!(inc.n_rows(), 4);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        let fetcher = SyntheticFetcher::new();
        let args = FetchArgs::new().with("index", "weekly");
        assert!(matches!(
            fetcher.download_one(&"A".into(), &args),
            Err(FetchError::InvalidArgument { .. })
        ));
        let args = FetchArgs::new().with("start", "yesterday");
        assert!(matches!(
            fetcher.download_one(&"A".into(), &args),
            Err(FetchError::InvalidArgument { .. })
        ));
    }
}
