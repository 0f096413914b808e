use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MergeError, Result};

/// Row accounting for one merged entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStats {
    pub sources: Vec<SourceCount>,
    /// Rows in the unified table before aggregation; always the sum of the
    /// source counts.
    pub unified_rows: u64,
    pub distinct_keys: u64,
    pub output_rows: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCount {
    pub path: String,
    pub rows: u64,
}

/// Summary of one full merge run, written next to the merged tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub nodes: TableStats,
    pub edges: TableStats,
}

impl MergeReport {
    /// Write atomically: write .tmp → fsync → rename.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MergeError::Report(format!("serialize error: {}", e)))?;

        std::fs::write(&tmp_path, json.as_bytes())?;

        let file = std::fs::File::open(&tmp_path)?;
        file.sync_all()?;

        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let report: MergeReport = serde_json::from_str(&data)
            .map_err(|e| MergeError::Report(format!("parse error: {}", e)))?;
        Ok(report)
    }
}
