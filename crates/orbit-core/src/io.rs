//! JSON file helpers

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::{Error, Result};

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write `data` as indented JSON, creating parent directories.
///
/// The file is written next to its destination and renamed into place, so a
/// reader never observes a half-written checkpoint.
pub fn save_json<T: Serialize + ?Sized>(data: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let content = serde_json::to_string_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// `YYYYmmdd_HHMM` in local time, UTC when the local offset is unknown
pub fn timestamp(now: OffsetDateTime) -> Result<String> {
    now.format(format_description!("[year][month][day]_[hour][minute]"))
        .map_err(|e| Error::Other(anyhow::anyhow!("Failed to format timestamp: {}", e)))
}

/// `<dir>/<prefix>_<timestamp>_<suffix>.<extension>`, skipping absent parts
pub fn timestamped_path(
    dir: &Path,
    prefix: Option<&str>,
    suffix: Option<&str>,
    extension: &str,
) -> Result<PathBuf> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let stamp = timestamp(now)?;

    let parts: Vec<&str> = [prefix, Some(stamp.as_str()), suffix]
        .into_iter()
        .flatten()
        .collect();

    Ok(dir.join(format!("{}.{}", parts.join("_"), extension)))
}
