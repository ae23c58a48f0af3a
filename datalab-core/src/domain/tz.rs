//! Time zones for index normalization.
//!
//! A zone is either an IANA name (`Europe/Berlin`), resolved with its
//! daylight-saving rules through `chrono-tz`, or a fixed UTC offset. Keys
//! are always stored as `DateTime<FixedOffset>`: the offset in effect at
//! that instant.

use super::key::RowKey;
use super::table::SymbolTable;
use crate::error::DatasetError;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A time zone, written as an IANA name, `UTC`, `Z`, `+HH:MM`, `+HHMM`
/// or `+HH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeZoneSpec {
    Fixed(FixedOffset),
    Named(Tz),
}

impl TimeZoneSpec {
    pub fn utc() -> Self {
        TimeZoneSpec::Fixed(chrono::Utc.fix())
    }

    pub fn from_offset(offset: FixedOffset) -> Self {
        TimeZoneSpec::Fixed(offset)
    }

    pub fn named(tz: Tz) -> Self {
        TimeZoneSpec::Named(tz)
    }

    /// Attach this zone to a wall-clock time.
    ///
    /// `None` when the time is skipped or repeated by a daylight-saving
    /// transition.
    pub fn localize(&self, t: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            TimeZoneSpec::Fixed(offset) => offset.from_local_datetime(t).single(),
            TimeZoneSpec::Named(tz) => tz.from_local_datetime(t).single().map(|d| d.fixed_offset()),
        }
    }

    /// The same instant, expressed in this zone.
    pub fn convert(&self, t: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            TimeZoneSpec::Fixed(offset) => t.with_timezone(offset),
            TimeZoneSpec::Named(tz) => t.with_timezone(tz).fixed_offset(),
        }
    }
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl FromStr for TimeZoneSpec {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if matches!(s.to_ascii_uppercase().as_str(), "UTC" | "Z" | "GMT") {
            return Ok(Self::utc());
        }
        if s.starts_with(['+', '-']) {
            return parse_offset(s)
                .map(Self::from_offset)
                .ok_or_else(|| DatasetError::config(format!("invalid UTC offset '{s}'")));
        }
        s.parse::<Tz>()
            .map(Self::named)
            .map_err(|_| DatasetError::config(format!("unrecognized time zone '{s}'")))
    }
}

impl TryFrom<String> for TimeZoneSpec {
    type Error = DatasetError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeZoneSpec> for String {
    fn from(tz: TimeZoneSpec) -> Self {
        tz.to_string()
    }
}

impl fmt::Display for TimeZoneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let offset = match self {
            TimeZoneSpec::Named(tz) => return f.write_str(tz.name()),
            TimeZoneSpec::Fixed(offset) => offset,
        };
        let secs = offset.local_minus_utc();
        if secs == 0 {
            return f.write_str("UTC");
        }
        let sign = if secs < 0 { '-' } else { '+' };
        let secs = secs.abs();
        write!(f, "{sign}{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
    }
}

/// Localize naive keys, then convert aware keys.
///
/// Non-time keys pass through untouched. Converting a naive key without
/// localizing first is a configuration error, as is localizing a wall-clock
/// time that a daylight-saving transition skips or repeats.
pub fn normalize_key(
    key: RowKey,
    localize: Option<TimeZoneSpec>,
    convert: Option<TimeZoneSpec>,
) -> Result<RowKey, DatasetError> {
    let key = match (key, localize) {
        (RowKey::Naive(t), Some(tz)) => {
            let local = tz.localize(&t).ok_or_else(|| {
                DatasetError::config(format!("cannot localize {t} to {tz}"))
            })?;
            RowKey::Aware(local)
        }
        (key, _) => key,
    };
    match (key, convert) {
        (RowKey::Aware(t), Some(tz)) => Ok(RowKey::Aware(tz.convert(&t))),
        (RowKey::Naive(t), Some(tz)) => Err(DatasetError::config(format!(
            "cannot convert tz-naive key {t} to {tz}; set tz_localize first"
        ))),
        (key, _) => Ok(key),
    }
}

/// Apply `normalize_key` to every row key of `table`.
pub(crate) fn normalize_table(
    table: SymbolTable,
    localize: Option<TimeZoneSpec>,
    convert: Option<TimeZoneSpec>,
) -> Result<SymbolTable, DatasetError> {
    if localize.is_none() && convert.is_none() {
        return Ok(table);
    }
    table.try_map_index(|k| normalize_key(k, localize, convert))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn berlin() -> TimeZoneSpec {
        "Europe/Berlin".parse().unwrap()
    }

    #[test]
    fn parses_offsets() {
        assert_eq!("utc".parse::<TimeZoneSpec>().unwrap(), TimeZoneSpec::utc());
        let plus = "+05:30".parse::<TimeZoneSpec>().unwrap();
        assert_eq!(
            plus,
            TimeZoneSpec::from_offset(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert_eq!("-0800".parse::<TimeZoneSpec>().unwrap().to_string(), "-08:00");
        assert_eq!("+02".parse::<TimeZoneSpec>().unwrap().to_string(), "+02:00");
    }

    #[test]
    fn parses_named_zones() {
        assert_eq!(berlin(), TimeZoneSpec::named(Tz::Europe__Berlin));
        assert_eq!(berlin().to_string(), "Europe/Berlin");
        let ny: TimeZoneSpec = "America/New_York".parse().unwrap();
        assert_eq!(String::from(ny).parse::<TimeZoneSpec>().unwrap(), ny);
    }

    #[test]
    fn rejects_garbage() {
        for s in ["Mars/Olympus_Mons", "+5", "+05:75", ""] {
            assert!(
                matches!(s.parse::<TimeZoneSpec>(), Err(DatasetError::Configuration(_))),
                "{s} should be rejected"
            );
        }
    }

    #[test]
    fn localize_then_convert() {
        let naive = RowKey::date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        let key = normalize_key(
            naive,
            Some(TimeZoneSpec::utc()),
            Some("+02:00".parse().unwrap()),
        )
        .unwrap();
        assert_eq!(key.to_string(), "2021-01-01T02:00:00+02:00");
    }

    #[test]
    fn convert_to_named_zone_follows_daylight_saving() {
        // Berlin moves from +01:00 to +02:00 at 01:00 UTC on 2021-03-28.
        let before = normalize_key(
            RowKey::Naive(at(2021, 3, 28, 0)),
            Some(TimeZoneSpec::utc()),
            Some(berlin()),
        )
        .unwrap();
        let after = normalize_key(
            RowKey::Naive(at(2021, 3, 28, 1)),
            Some(TimeZoneSpec::utc()),
            Some(berlin()),
        )
        .unwrap();
        assert_eq!(before.to_string(), "2021-03-28T01:00:00+01:00");
        assert_eq!(after.to_string(), "2021-03-28T03:00:00+02:00");
        assert!(before < after);
    }

    #[test]
    fn localize_to_named_zone_follows_daylight_saving() {
        let winter = normalize_key(RowKey::Naive(at(2021, 1, 15, 12)), Some(berlin()), None).unwrap();
        let summer = normalize_key(RowKey::Naive(at(2021, 7, 15, 12)), Some(berlin()), None).unwrap();
        assert_eq!(winter.to_string(), "2021-01-15T12:00:00+01:00");
        assert_eq!(summer.to_string(), "2021-07-15T12:00:00+02:00");

        // 02:00 does not exist on the spring-forward day.
        let skipped = normalize_key(RowKey::Naive(at(2021, 3, 28, 2)), Some(berlin()), None);
        assert!(matches!(skipped, Err(DatasetError::Configuration(_))));
    }

    #[test]
    fn convert_naive_is_configuration_error() {
        let naive = RowKey::date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        let err = normalize_key(naive, None, Some(TimeZoneSpec::utc())).unwrap_err();
        assert!(matches!(err, DatasetError::Configuration(_)));
    }

    #[test]
    fn integer_keys_pass_through() {
        let key = normalize_key(RowKey::Int(3), Some(TimeZoneSpec::utc()), None).unwrap();
        assert_eq!(key, RowKey::Int(3));
    }
}
