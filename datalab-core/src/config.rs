//! Dataset configuration: time zone handling and alignment policies.

use crate::domain::TimeZoneSpec;
use crate::error::DatasetError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// What to do when symbols disagree on row or column keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MissingPolicy {
    /// Take the union and fill gaps with NaN.
    Nan,
    /// Take the intersection.
    Drop,
    /// Fail with an alignment error.
    Raise,
}

impl MissingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingPolicy::Nan => "nan",
            MissingPolicy::Drop => "drop",
            MissingPolicy::Raise => "raise",
        }
    }
}

impl FromStr for MissingPolicy {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nan" => Ok(MissingPolicy::Nan),
            "drop" => Ok(MissingPolicy::Drop),
            "raise" => Ok(MissingPolicy::Raise),
            _ => Err(DatasetError::config(format!(
                "invalid missing-data policy '{s}' (expected nan, drop or raise)"
            ))),
        }
    }
}

impl TryFrom<String> for MissingPolicy {
    type Error = DatasetError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MissingPolicy> for String {
    fn from(p: MissingPolicy) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options carried by a `Dataset` and reused by every `update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetOptions {
    /// Interpret naive row keys as wall-clock time in this zone.
    pub tz_localize: Option<TimeZoneSpec>,
    /// Shift aware row keys to this zone.
    pub tz_convert: Option<TimeZoneSpec>,
    pub missing_index: MissingPolicy,
    pub missing_columns: MissingPolicy,
    /// Dispatch per-symbol fetches on the rayon pool.
    pub parallel: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            tz_localize: None,
            tz_convert: None,
            missing_index: MissingPolicy::Nan,
            missing_columns: MissingPolicy::Raise,
            parallel: false,
        }
    }
}

impl DatasetOptions {
    pub fn from_toml(text: &str) -> Result<Self, DatasetError> {
        toml::from_str(text).map_err(|e| DatasetError::config(format!("invalid options: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self, DatasetError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DatasetError::config(format!("cannot read options {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String, DatasetError> {
        toml::to_string(self).map_err(|e| DatasetError::config(e.to_string()))
    }

    pub fn with_tz_localize(mut self, tz: TimeZoneSpec) -> Self {
        self.tz_localize = Some(tz);
        self
    }

    pub fn with_tz_convert(mut self, tz: TimeZoneSpec) -> Self {
        self.tz_convert = Some(tz);
        self
    }

    pub fn with_missing_index(mut self, policy: MissingPolicy) -> Self {
        self.missing_index = policy;
        self
    }

    pub fn with_missing_columns(mut self, policy: MissingPolicy) -> Self {
        self.missing_columns = policy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = DatasetOptions::default();
        assert_eq!(opts.missing_index, MissingPolicy::Nan);
        assert_eq!(opts.missing_columns, MissingPolicy::Raise);
        assert!(opts.tz_localize.is_none());
        assert!(!opts.parallel);
    }

    #[test]
    fn policy_tokens_are_case_insensitive() {
        assert_eq!("DROP".parse::<MissingPolicy>().unwrap(), MissingPolicy::Drop);
        assert!(matches!(
            "ignore".parse::<MissingPolicy>(),
            Err(DatasetError::Configuration(_))
        ));
    }

    #[test]
    fn loads_from_toml() {
        let opts = DatasetOptions::from_toml(
            r#"
            tz_localize = "UTC"
            tz_convert = "+02:00"
            missing_index = "drop"
            parallel = true
            "#,
        )
        .unwrap();
        assert_eq!(opts.missing_index, MissingPolicy::Drop);
        assert_eq!(opts.missing_columns, MissingPolicy::Raise);
        assert_eq!(opts.tz_convert.unwrap().to_string(), "+02:00");
        assert!(opts.parallel);
    }

    #[test]
    fn bad_token_in_toml_is_configuration_error() {
        let err = DatasetOptions::from_toml(r#"missing_columns = "ignore""#).unwrap_err();
        assert!(matches!(err, DatasetError::Configuration(_)));
    }

    #[test]
    fn toml_round_trip() {
        let opts = DatasetOptions::default()
            .with_tz_localize(TimeZoneSpec::utc())
            .with_missing_columns(MissingPolicy::Nan);
        let text = opts.to_toml().unwrap();
        assert_eq!(DatasetOptions::from_toml(&text).unwrap(), opts);
    }
}
