//! JSON persistence with an integrity checksum.
//!
//! Envelope: `{ format, version, checksum, dataset }`, where `checksum` is the
//! BLAKE3 hex digest of the canonical JSON of `dataset`. NaN is stored as
//! `null`. The concat memo is not stored.

use super::{Dataset, StoredDataset};
use crate::error::DatasetError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

pub const FORMAT: &str = "datalab.dataset";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    checksum: String,
    dataset: Value,
}

fn persist_err(context: &str, e: impl std::fmt::Display) -> DatasetError {
    DatasetError::Persist(format!("{context}: {e}"))
}

fn checksum(value: &Value) -> Result<String, DatasetError> {
    let canonical = serde_json::to_vec(value).map_err(|e| persist_err("canonical json", e))?;
    Ok(blake3::hash(&canonical).to_hex().to_string())
}

impl Dataset {
    pub fn to_bytes(&self) -> Result<Vec<u8>, DatasetError> {
        let dataset = serde_json::to_value(self).map_err(|e| persist_err("serialize", e))?;
        let envelope = Envelope {
            format: FORMAT.to_string(),
            version: FORMAT_VERSION,
            checksum: checksum(&dataset)?,
            dataset,
        };
        serde_json::to_vec_pretty(&envelope).map_err(|e| persist_err("serialize", e))
    }

    /// Decode, verify format, version and checksum, then re-check every
    /// dataset invariant.
    pub fn from_bytes(bytes: &[u8]) -> Result<Dataset, DatasetError> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| persist_err("deserialize", e))?;
        if envelope.format != FORMAT {
            return Err(DatasetError::Persist(format!(
                "unexpected format '{}'",
                envelope.format
            )));
        }
        if envelope.version != FORMAT_VERSION {
            return Err(DatasetError::Persist(format!(
                "unsupported version {} (expected {FORMAT_VERSION})",
                envelope.version
            )));
        }
        let actual = checksum(&envelope.dataset)?;
        if actual != envelope.checksum {
            return Err(DatasetError::Persist(format!(
                "checksum mismatch: stored {}, computed {actual}",
                envelope.checksum
            )));
        }
        let stored: StoredDataset =
            serde_json::from_value(envelope.dataset).map_err(|e| persist_err("decode dataset", e))?;
        Dataset::try_from(stored)
    }

    /// Write atomically: `.tmp` file, then rename into place.
    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        let bytes = self.to_bytes()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| persist_err(&format!("create {}", parent.display()), e))?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(|e| persist_err(&format!("write {}", tmp.display()), e))?;
        fs::rename(&tmp, path)
            .map_err(|e| persist_err(&format!("rename into {}", path.display()), e))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Dataset, DatasetError> {
        let bytes =
            fs::read(path).map_err(|e| persist_err(&format!("read {}", path.display()), e))?;
        Self::from_bytes(&bytes)
    }
}
