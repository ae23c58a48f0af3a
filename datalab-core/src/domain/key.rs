//! Row and column keys.
//!
//! A row index is a sequence of `RowKey`s of a single kind (integer position,
//! naive timestamp, offset-aware timestamp, or free-form label). Column keys
//! are either positional (`0`, `1`, ...) or named.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// One entry of a row index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RowKey {
    Int(i64),
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
    Label(String),
}

/// The kind of a row key. A row index never mixes kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Int,
    Naive,
    Aware,
    Label,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyKind::Int => "integer",
            KeyKind::Naive => "tz-naive timestamp",
            KeyKind::Aware => "tz-aware timestamp",
            KeyKind::Label => "label",
        };
        f.write_str(s)
    }
}

impl RowKey {
    pub fn kind(&self) -> KeyKind {
        match self {
            RowKey::Int(_) => KeyKind::Int,
            RowKey::Naive(_) => KeyKind::Naive,
            RowKey::Aware(_) => KeyKind::Aware,
            RowKey::Label(_) => KeyKind::Label,
        }
    }

    /// True for naive and offset-aware timestamps.
    pub fn is_time_like(&self) -> bool {
        matches!(self, RowKey::Naive(_) | RowKey::Aware(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            RowKey::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Naive timestamp at midnight of `date`.
    pub fn date(date: NaiveDate) -> Self {
        RowKey::Naive(date.and_time(chrono::NaiveTime::MIN))
    }

    /// Parse a key from text: integer first, then timestamp, else label.
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            return RowKey::Int(v);
        }
        parse_time_key(trimmed).unwrap_or_else(|| RowKey::Label(trimmed.to_string()))
    }

    /// Step this key forward by `steps` multiples of `freq`.
    ///
    /// Returns `None` if the frequency does not apply to this key kind or the
    /// result overflows.
    pub fn advance(&self, freq: Frequency, steps: i64) -> Option<RowKey> {
        match (self, freq) {
            (RowKey::Int(v), Frequency::Step(step)) => {
                Some(RowKey::Int(v.checked_add(step.checked_mul(steps)?)?))
            }
            (RowKey::Naive(t), Frequency::Millis(ms)) => {
                let delta = TimeDelta::try_milliseconds(ms.checked_mul(steps)?)?;
                t.checked_add_signed(delta).map(RowKey::Naive)
            }
            (RowKey::Aware(t), Frequency::Millis(ms)) => {
                let delta = TimeDelta::try_milliseconds(ms.checked_mul(steps)?)?;
                t.checked_add_signed(delta).map(RowKey::Aware)
            }
            _ => None,
        }
    }

    /// Order two keys, treating a naive timestamp and an aware one as
    /// comparable through the aware key's local wall-clock time.
    ///
    /// Returns `None` for keys of unrelated kinds.
    pub fn loose_cmp(&self, other: &RowKey) -> Option<Ordering> {
        match (self, other) {
            (RowKey::Naive(a), RowKey::Aware(b)) => Some(a.cmp(&b.naive_local())),
            (RowKey::Aware(a), RowKey::Naive(b)) => Some(a.naive_local().cmp(b)),
            (a, b) if a.kind() == b.kind() => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Int(v) => write!(f, "{v}"),
            RowKey::Naive(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            RowKey::Aware(t) => write!(f, "{}", t.to_rfc3339()),
            RowKey::Label(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RowKey {
    fn from(v: i64) -> Self {
        RowKey::Int(v)
    }
}

impl From<NaiveDateTime> for RowKey {
    fn from(t: NaiveDateTime) -> Self {
        RowKey::Naive(t)
    }
}

impl From<NaiveDate> for RowKey {
    fn from(d: NaiveDate) -> Self {
        RowKey::date(d)
    }
}

impl From<DateTime<FixedOffset>> for RowKey {
    fn from(t: DateTime<FixedOffset>) -> Self {
        RowKey::Aware(t)
    }
}

impl From<&str> for RowKey {
    fn from(s: &str) -> Self {
        RowKey::Label(s.to_string())
    }
}

/// Parse a timestamp in RFC 3339, `%Y-%m-%d %H:%M:%S`, `%Y-%m-%dT%H:%M:%S`
/// or `%Y-%m-%d` form.
pub fn parse_time_key(s: &str) -> Option<RowKey> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(RowKey::Aware(t));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(RowKey::Naive(t));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(RowKey::date)
}

/// Constant spacing of a row index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "step", rename_all = "snake_case")]
pub enum Frequency {
    /// Integer step between consecutive integer keys.
    Step(i64),
    /// Milliseconds between consecutive timestamps.
    Millis(i64),
}

/// Infer a constant, non-zero spacing from at least two keys.
pub fn infer_frequency(keys: &[RowKey]) -> Option<Frequency> {
    if keys.len() < 2 {
        return None;
    }
    let step = |a: &RowKey, b: &RowKey| -> Option<Frequency> {
        match (a, b) {
            (RowKey::Int(x), RowKey::Int(y)) => y.checked_sub(*x).map(Frequency::Step),
            (RowKey::Naive(x), RowKey::Naive(y)) => {
                Some(Frequency::Millis((*y - *x).num_milliseconds()))
            }
            (RowKey::Aware(x), RowKey::Aware(y)) => {
                Some(Frequency::Millis((*y - *x).num_milliseconds()))
            }
            _ => None,
        }
    };
    let first = step(&keys[0], &keys[1])?;
    if matches!(first, Frequency::Step(0) | Frequency::Millis(0)) {
        return None;
    }
    keys.windows(2)
        .all(|w| step(&w[0], &w[1]) == Some(first))
        .then_some(first)
}

/// One entry of a column index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnKey {
    Pos(i64),
    Name(String),
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKey::Pos(p) => write!(f, "{p}"),
            ColumnKey::Name(n) => f.write_str(n),
        }
    }
}

impl From<&str> for ColumnKey {
    fn from(s: &str) -> Self {
        ColumnKey::Name(s.to_string())
    }
}

impl From<String> for ColumnKey {
    fn from(s: String) -> Self {
        ColumnKey::Name(s)
    }
}

impl From<i64> for ColumnKey {
    fn from(p: i64) -> Self {
        ColumnKey::Pos(p)
    }
}

/// Numeric text becomes a positional key, anything else a name.
impl FromStr for ColumnKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i64>() {
            Ok(p) => ColumnKey::Pos(p),
            Err(_) => ColumnKey::Name(s.to_string()),
        })
    }
}

/// Table axis, used in alignment diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Rows,
    Columns,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Rows => f.write_str("index"),
            Axis::Columns => f.write_str("columns"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> RowKey {
        RowKey::date(NaiveDate::from_ymd_opt(2021, 1, d).unwrap())
    }

    #[test]
    fn parse_prefers_integers_then_times() {
        assert_eq!(RowKey::parse("42"), RowKey::Int(42));
        assert_eq!(RowKey::parse("2021-01-03"), day(3));
        assert!(matches!(
            RowKey::parse("2021-01-03T10:00:00+01:00"),
            RowKey::Aware(_)
        ));
        assert_eq!(RowKey::parse("AAPL"), RowKey::Label("AAPL".into()));
    }

    #[test]
    fn frequency_inferred_for_regular_index() {
        let keys: Vec<RowKey> = (1..=5).map(day).collect();
        assert_eq!(infer_frequency(&keys), Some(Frequency::Millis(86_400_000)));

        let ints: Vec<RowKey> = [0, 2, 4].into_iter().map(RowKey::Int).collect();
        assert_eq!(infer_frequency(&ints), Some(Frequency::Step(2)));
    }

    #[test]
    fn frequency_absent_for_irregular_or_short_index() {
        let keys = vec![day(1), day(2), day(4)];
        assert_eq!(infer_frequency(&keys), None);
        assert_eq!(infer_frequency(&[day(1)]), None);
    }

    #[test]
    fn advance_steps_time_keys() {
        let next = day(5).advance(Frequency::Millis(86_400_000), 2).unwrap();
        assert_eq!(next, day(7));
        assert_eq!(
            RowKey::Int(4).advance(Frequency::Step(1), 3),
            Some(RowKey::Int(7))
        );
        assert_eq!(day(1).advance(Frequency::Step(1), 1), None);
    }

    #[test]
    fn loose_cmp_bridges_naive_and_aware() {
        let aware = RowKey::parse("2021-01-03T00:00:00+02:00");
        assert_eq!(day(3).loose_cmp(&aware), Some(Ordering::Equal));
        assert_eq!(day(2).loose_cmp(&aware), Some(Ordering::Less));
        assert_eq!(RowKey::Int(1).loose_cmp(&day(1)), None);
    }

    #[test]
    fn column_key_from_str_detects_positions() {
        assert_eq!("1".parse::<ColumnKey>().unwrap(), ColumnKey::Pos(1));
        assert_eq!(
            "close".parse::<ColumnKey>().unwrap(),
            ColumnKey::Name("close".into())
        );
    }
}
