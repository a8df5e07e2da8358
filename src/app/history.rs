//! Activation history for the current session and its JSON export.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// One activated item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationHistoryEntry {
    pub timestamp: DateTime<Utc>,
    /// "role", "group" or "subscription role".
    pub kind: String,
    pub name: String,
    pub duration_hours: u32,
    pub justification: String,
    pub success: bool,
}

/// File name for an export taken at `at`, e.g. `history-20240131-142500.json`.
pub fn export_file_name(at: DateTime<Utc>) -> String {
    format!("history-{}.json", at.format("%Y%m%d-%H%M%S"))
}

/// Write `entries` as pretty JSON into `dir`, creating it if needed.
pub fn export_history(entries: &[ActivationHistoryEntry], dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;

    let path = dir.join(export_file_name(Utc::now()));
    let content =
        serde_json::to_string_pretty(entries).context("Failed to serialize activation history")?;
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    debug!("Exported {} history entries to {:?}", entries.len(), path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::env;

    fn entry(name: &str, success: bool) -> ActivationHistoryEntry {
        ActivationHistoryEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 31, 14, 25, 0).unwrap(),
            kind: "role".to_string(),
            name: name.to_string(),
            duration_hours: 4,
            justification: "incident 42".to_string(),
            success,
        }
    }

    #[test]
    fn test_export_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 14, 25, 0).unwrap();
        assert_eq!(export_file_name(at), "history-20240131-142500.json");
    }

    #[test]
    fn test_export_writes_json() {
        let dir = env::temp_dir().join(format!("pim-tui-history-{}", uuid::Uuid::new_v4()));
        let entries = vec![entry("Global Reader", true), entry("Ops", false)];

        let path = export_history(&entries, &dir).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(written.as_array().unwrap().len(), 2);
        assert_eq!(written[0]["name"], "Global Reader");
        assert_eq!(written[0]["durationHours"], 4);
        assert_eq!(written[1]["success"], false);

        let _ = fs::remove_dir_all(&dir);
    }
}
